//! Compiled units and result styles
//!
//! A [`CompiledUnit`] is the evaluable form of one typed node. Its
//! [`Evaluator`] fixes how results are delivered:
//!
//! - `Constant`: known at compile time
//! - `Value`: recomputed on each call
//! - `Iterable`: pushes tuples to a sink in one forward pass
//! - `List`: a shared, immutable list that may be scanned many times
//! - `MutableList`: a fresh list the caller owns and may sort or truncate
//!
//! Consumers ask for the weakest style they need. The adapters below
//! bridge the styles when a producer is weaker than its consumer.

use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::value::{Tuple, TupleList, Value, tuple_of};
use cubeql_model::{HierarchyId, LevelId, Member};
use cubeql_types::OlapType;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Receives tuples from an iterable; `Break` stops the producer early
pub type TupleSink<'a> =
    dyn FnMut(&mut EvaluationContext, &Tuple) -> EvalResult<ControlFlow<()>> + 'a;

pub type ValueFn = Arc<dyn Fn(&mut EvaluationContext) -> EvalResult<Value> + Send + Sync>;
pub type IterFn =
    Arc<dyn Fn(&mut EvaluationContext, &mut TupleSink<'_>) -> EvalResult<()> + Send + Sync>;
pub type ListFn = Arc<dyn Fn(&mut EvaluationContext) -> EvalResult<Arc<TupleList>> + Send + Sync>;
pub type MutableListFn = Arc<dyn Fn(&mut EvaluationContext) -> EvalResult<TupleList> + Send + Sync>;

/// How a unit delivers its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResultStyle {
    Value,
    Iterable,
    List,
    MutableList,
}

#[derive(Clone)]
pub enum Evaluator {
    Constant(Value),
    Value(ValueFn),
    Iterable(IterFn),
    List(ListFn),
    MutableList(MutableListFn),
}

/// One compiled expression node
#[derive(Clone)]
pub struct CompiledUnit {
    pub evaluator: Evaluator,
    pub result_type: OlapType,
    /// The result does not depend on any hierarchy's current member
    pub context_free: bool,
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let style = match &self.evaluator {
            Evaluator::Constant(v) => format!("Constant({:?})", v),
            _ => format!("{:?}", self.style()),
        };
        f.debug_struct("CompiledUnit")
            .field("style", &style)
            .field("result_type", &self.result_type)
            .field("context_free", &self.context_free)
            .finish()
    }
}

impl CompiledUnit {
    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn constant(ty: OlapType, value: Value) -> Self {
        Self {
            evaluator: Evaluator::Constant(value),
            result_type: ty,
            context_free: true,
        }
    }

    pub fn value(
        ty: OlapType,
        f: impl Fn(&mut EvaluationContext) -> EvalResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            evaluator: Evaluator::Value(Arc::new(f)),
            result_type: ty,
            context_free: false,
        }
    }

    pub fn iterable(
        ty: OlapType,
        f: impl Fn(&mut EvaluationContext, &mut TupleSink<'_>) -> EvalResult<()>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            evaluator: Evaluator::Iterable(Arc::new(f)),
            result_type: ty,
            context_free: false,
        }
    }

    pub fn list(
        ty: OlapType,
        f: impl Fn(&mut EvaluationContext) -> EvalResult<Arc<TupleList>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            evaluator: Evaluator::List(Arc::new(f)),
            result_type: ty,
            context_free: false,
        }
    }

    pub fn mutable_list(
        ty: OlapType,
        f: impl Fn(&mut EvaluationContext) -> EvalResult<TupleList> + Send + Sync + 'static,
    ) -> Self {
        Self {
            evaluator: Evaluator::MutableList(Arc::new(f)),
            result_type: ty,
            context_free: false,
        }
    }

    /// A unit that fails with `err` whenever it is evaluated
    pub fn failing(ty: OlapType, err: EvalError) -> Self {
        Self::value(ty, move |_| Err(err.clone()))
    }

    pub fn style(&self) -> ResultStyle {
        match &self.evaluator {
            Evaluator::Constant(Value::Set(_)) => ResultStyle::List,
            Evaluator::Constant(_) | Evaluator::Value(_) => ResultStyle::Value,
            Evaluator::Iterable(_) => ResultStyle::Iterable,
            Evaluator::List(_) => ResultStyle::List,
            Evaluator::MutableList(_) => ResultStyle::MutableList,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.evaluator, Evaluator::Constant(_))
    }

    /// Arity of set elements (1 for member sets)
    pub fn arity(&self) -> usize {
        self.result_type.arity().max(1)
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    pub fn evaluate(&self, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        match &self.evaluator {
            Evaluator::Constant(v) => Ok(v.clone()),
            Evaluator::Value(f) => f(ctx),
            Evaluator::Iterable(_) | Evaluator::List(_) | Evaluator::MutableList(_) => {
                Ok(Value::Set(self.evaluate_list(ctx)?))
            }
        }
    }

    /// Evaluate to a shared list
    pub fn evaluate_list(&self, ctx: &mut EvaluationContext) -> EvalResult<Arc<TupleList>> {
        match &self.evaluator {
            Evaluator::List(f) => f(ctx),
            Evaluator::MutableList(f) => f(ctx).map(Arc::new),
            Evaluator::Iterable(f) => {
                let mut list = TupleList::new(self.arity());
                f(ctx, &mut |_, tuple| {
                    list.push(tuple.clone());
                    Ok(ControlFlow::Continue(()))
                })?;
                Ok(Arc::new(list))
            }
            Evaluator::Constant(v) => self.value_to_list(v.clone()),
            Evaluator::Value(f) => {
                let value = f(ctx)?;
                self.value_to_list(value)
            }
        }
    }

    /// Evaluate to a list the caller owns; shared results are copied
    pub fn evaluate_mutable(&self, ctx: &mut EvaluationContext) -> EvalResult<TupleList> {
        match &self.evaluator {
            Evaluator::MutableList(f) => f(ctx),
            _ => {
                let shared = self.evaluate_list(ctx)?;
                Ok(Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone()))
            }
        }
    }

    /// Push every element to `sink` without materializing when possible
    pub fn for_each(
        &self,
        ctx: &mut EvaluationContext,
        sink: &mut TupleSink<'_>,
    ) -> EvalResult<()> {
        if let Evaluator::Iterable(f) = &self.evaluator {
            return f(ctx, sink);
        }
        let list = self.evaluate_list(ctx)?;
        for tuple in list.iter() {
            if sink(ctx, tuple)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    fn value_to_list(&self, value: Value) -> EvalResult<Arc<TupleList>> {
        match value {
            Value::Set(list) => Ok(list),
            Value::Member(m) if m.is_null() => Ok(Arc::new(TupleList::new(1))),
            Value::Member(m) => Ok(Arc::new(TupleList::from_members([m]))),
            Value::Tuple(t) if t.iter().any(Member::is_null) => {
                Ok(Arc::new(TupleList::new(t.len())))
            }
            Value::Tuple(t) => Ok(Arc::new(TupleList::from_tuples(t.len(), vec![t]))),
            Value::Null | Value::Empty => Ok(Arc::new(TupleList::new(self.arity()))),
            other => Err(EvalError::type_mismatch("Set", other.type_name())),
        }
    }

    pub fn evaluate_member(&self, ctx: &mut EvaluationContext) -> EvalResult<Member> {
        match self.evaluate(ctx)? {
            Value::Member(m) => Ok(m),
            Value::Tuple(t) if t.len() == 1 => Ok(t[0].clone()),
            Value::Null | Value::Empty => self.null_member(),
            other => Err(EvalError::type_mismatch("Member", other.type_name())),
        }
    }

    /// The null member of the statically known hierarchy
    pub fn null_member(&self) -> EvalResult<Member> {
        self.result_type
            .member_type()
            .hierarchy
            .map(Member::Null)
            .ok_or_else(|| EvalError::type_mismatch("Member", "Null"))
    }

    pub fn evaluate_tuple(&self, ctx: &mut EvaluationContext) -> EvalResult<Tuple> {
        match self.evaluate(ctx)? {
            Value::Tuple(t) => Ok(t),
            Value::Member(m) => Ok(tuple_of(m)),
            other => Err(EvalError::type_mismatch("Tuple", other.type_name())),
        }
    }

    /// Numeric result; `None` when absent
    pub fn evaluate_number(&self, ctx: &mut EvaluationContext) -> EvalResult<Option<f64>> {
        match self.evaluate(ctx)? {
            Value::Number(n) => Ok(Some(n)),
            Value::Boolean(b) => Ok(Some(if b { 1.0 } else { 0.0 })),
            Value::Null | Value::Empty => Ok(None),
            other => Err(EvalError::type_mismatch("Numeric", other.type_name())),
        }
    }

    pub fn evaluate_string(&self, ctx: &mut EvaluationContext) -> EvalResult<Option<String>> {
        match self.evaluate(ctx)? {
            Value::String(s) => Ok(Some(s)),
            Value::Null | Value::Empty => Ok(None),
            other => Err(EvalError::type_mismatch("String", other.type_name())),
        }
    }

    /// Truth value; absent counts as `None`
    pub fn evaluate_boolean(&self, ctx: &mut EvaluationContext) -> EvalResult<Option<bool>> {
        match self.evaluate(ctx)? {
            Value::Boolean(b) => Ok(Some(b)),
            Value::Number(n) => Ok(Some(n != 0.0)),
            Value::Null | Value::Empty => Ok(None),
            other => Err(EvalError::type_mismatch("Logical", other.type_name())),
        }
    }

    pub fn evaluate_level(&self, ctx: &mut EvaluationContext) -> EvalResult<LevelId> {
        match self.evaluate(ctx)? {
            Value::Level(l) => Ok(l),
            other => Err(EvalError::type_mismatch("Level", other.type_name())),
        }
    }

    pub fn evaluate_hierarchy(&self, ctx: &mut EvaluationContext) -> EvalResult<HierarchyId> {
        match self.evaluate(ctx)? {
            Value::Hierarchy(h) => Ok(h),
            other => Err(EvalError::type_mismatch("Hierarchy", other.type_name())),
        }
    }

    // ========================================================================
    // Adapters
    // ========================================================================

    /// Adapt to at least `style`; set-valued units only
    pub fn into_style(self, style: ResultStyle) -> Self {
        let current = self.style();
        let satisfied = match style {
            ResultStyle::Value | ResultStyle::Iterable => true,
            ResultStyle::List => matches!(current, ResultStyle::List),
            ResultStyle::MutableList => matches!(current, ResultStyle::MutableList),
        };
        if satisfied || self.is_constant() && style == ResultStyle::List {
            return self;
        }
        log::debug!(
            "inserting {:?} adapter over {:?} unit of type {}",
            style,
            current,
            self.result_type
        );
        let ty = self.result_type.clone();
        let context_free = self.context_free;
        let inner = self;
        let mut adapted = match style {
            ResultStyle::MutableList => {
                CompiledUnit::mutable_list(ty, move |ctx| inner.evaluate_mutable(ctx))
            }
            _ => CompiledUnit::list(ty, move |ctx| inner.evaluate_list(ctx)),
        };
        adapted.context_free = context_free;
        adapted
    }

    /// Cache the result in hoist slot `slot` until the slot is cleared
    pub(crate) fn hoisted(self, slot: u64) -> Self {
        let ty = self.result_type.clone();
        let is_set = matches!(ty, OlapType::Set(_));
        let inner = self;
        let mut unit = if is_set {
            CompiledUnit::list(ty, move |ctx| {
                if let Some(Value::Set(list)) = ctx.hoisted(slot) {
                    return Ok(list.clone());
                }
                let list = inner.evaluate_list(ctx)?;
                ctx.store_hoisted(slot, Value::Set(list.clone()));
                Ok(list)
            })
        } else {
            CompiledUnit::value(ty, move |ctx| {
                if let Some(value) = ctx.hoisted(slot) {
                    return Ok(value.clone());
                }
                let value = inner.evaluate(ctx)?;
                ctx.store_hoisted(slot, value.clone());
                Ok(value)
            })
        };
        unit.context_free = true;
        unit
    }

    /// Clear `slots` each time this unit is entered, keeping its style
    pub(crate) fn clearing(self, slots: Vec<u64>) -> Self {
        if slots.is_empty() {
            return self;
        }
        let slots: Arc<[u64]> = slots.into();
        let evaluator = match self.evaluator {
            Evaluator::Constant(v) => Evaluator::Constant(v),
            Evaluator::Value(f) => Evaluator::Value(Arc::new(move |ctx| {
                ctx.clear_hoisted(&slots);
                f(ctx)
            })),
            Evaluator::Iterable(f) => Evaluator::Iterable(Arc::new(move |ctx, sink| {
                ctx.clear_hoisted(&slots);
                f(ctx, sink)
            })),
            Evaluator::List(f) => Evaluator::List(Arc::new(move |ctx| {
                ctx.clear_hoisted(&slots);
                f(ctx)
            })),
            Evaluator::MutableList(f) => Evaluator::MutableList(Arc::new(move |ctx| {
                ctx.clear_hoisted(&slots);
                f(ctx)
            })),
        };
        Self { evaluator, ..self }
    }
}
