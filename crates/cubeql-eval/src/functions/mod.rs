//! Builtin function implementations
//!
//! Each family extends [`Compiler`] with one `compile_*` method that turns
//! a resolved call and its compiled arguments into a [`CompiledUnit`].
//! Arity and argument categories were checked by the validator, so the
//! implementations only branch on the overload actually chosen.

mod aggregate;
mod drill;
mod metadata;
mod navigation;
mod ordering;
mod scalar;
mod sets;
mod strings;
mod time;

use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::value::{Tuple, TupleList, Value};
use cubeql_model::Member;
use cubeql_types::OlapType;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Argument `index`, or a unit that reports the missing argument
pub(crate) fn arg(args: &[CompiledUnit], index: usize) -> CompiledUnit {
    args.get(index).cloned().unwrap_or_else(|| {
        CompiledUnit::failing(
            OlapType::Null,
            EvalError::internal(format!("missing argument #{}", index)),
        )
    })
}

/// Argument `index` when the chosen overload has it
pub(crate) fn optional_arg(args: &[CompiledUnit], index: usize) -> Option<CompiledUnit> {
    args.get(index).cloned()
}

/// Value of a single-member tuple as a member, otherwise as a tuple
pub(crate) fn element_value(tuple: &Tuple) -> Value {
    match tuple.as_slice() {
        [member] => Value::Member(member.clone()),
        _ => Value::Tuple(tuple.clone()),
    }
}

/// Saturating conversion of a count or index argument
pub(crate) fn to_count(n: f64) -> usize {
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        n as usize
    }
}

/// A set argument whose elements become the context one at a time
///
/// When the set is a direct named-set reference its cursor is positioned
/// on each element as well, so `Current` and `CurrentOrdinal` can see it.
#[derive(Clone)]
pub(crate) struct Iteration {
    set: CompiledUnit,
    cursor: Option<usize>,
}

impl Iteration {
    pub fn new(site: &CallSite<'_>, index: usize, set: CompiledUnit) -> Self {
        Self {
            set,
            cursor: site.named_set(index),
        }
    }

    pub fn arity(&self) -> usize {
        self.set.arity()
    }

    pub fn list(&self, ctx: &mut EvaluationContext) -> EvalResult<Arc<TupleList>> {
        self.set.evaluate_list(ctx)
    }

    /// Run `f` with `tuple` as the context
    pub fn bind<R>(
        &self,
        ctx: &mut EvaluationContext,
        tuple: &Tuple,
        ordinal: usize,
        f: impl FnOnce(&mut EvaluationContext) -> EvalResult<R>,
    ) -> EvalResult<R> {
        ctx.with_tuple(tuple, |ctx| match self.cursor {
            Some(index) => ctx.with_set_cursor(index, tuple, ordinal, f),
            None => f(ctx),
        })
    }

    /// Visit every element with its ordinal, polling between elements
    pub fn for_each(
        &self,
        ctx: &mut EvaluationContext,
        mut f: impl FnMut(&mut EvaluationContext, &Tuple, usize) -> EvalResult<ControlFlow<()>>,
    ) -> EvalResult<()> {
        let mut ordinal = 0;
        self.set.for_each(ctx, &mut |ctx, tuple| {
            ctx.poll()?;
            let flow = f(ctx, tuple, ordinal)?;
            ordinal += 1;
            Ok(flow)
        })
    }

    /// Every element paired with `body` evaluated in its context
    pub fn values(
        &self,
        ctx: &mut EvaluationContext,
        body: &CompiledUnit,
    ) -> EvalResult<Vec<(Tuple, Value)>> {
        let mut result = Vec::new();
        self.for_each(ctx, |ctx, tuple, ordinal| {
            let value = self.bind(ctx, tuple, ordinal, |ctx| body.evaluate(ctx))?;
            result.push((tuple.clone(), value));
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(result)
    }

    /// Every element paired with the cell value at it
    pub fn cells(&self, ctx: &mut EvaluationContext) -> EvalResult<Vec<(Tuple, Value)>> {
        let mut result = Vec::new();
        self.for_each(ctx, |ctx, tuple, ordinal| {
            let value = self.bind(ctx, tuple, ordinal, EvaluationContext::evaluate_cell)?;
            result.push((tuple.clone(), value));
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(result)
    }

    /// `body` when given, else the cell value, for every element
    pub fn values_or_cells(
        &self,
        ctx: &mut EvaluationContext,
        body: Option<&CompiledUnit>,
    ) -> EvalResult<Vec<(Tuple, Value)>> {
        match body {
            Some(body) => self.values(ctx, body),
            None => self.cells(ctx),
        }
    }
}

/// Is any member of the tuple the null member?
pub(crate) fn has_null(tuple: &[Member]) -> bool {
    tuple.iter().any(Member::is_null)
}

impl Compiler {
    pub(crate) fn compile_user(
        &mut self,
        site: &CallSite<'_>,
        index: u32,
        args: Vec<CompiledUnit>,
    ) -> CompiledUnit {
        let Some(function) = self.user_functions().get(index as usize).cloned() else {
            return CompiledUnit::failing(
                site.ty.clone(),
                EvalError::internal(format!(
                    "user function #{} ({}) is not registered",
                    index,
                    site.name()
                )),
            );
        };
        CompiledUnit::value(site.ty.clone(), move |ctx| {
            let values = args
                .iter()
                .map(|a| a.evaluate(ctx))
                .collect::<EvalResult<Vec<_>>>()?;
            function
                .invoke(&values)
                .map_err(|e| EvalError::user_function(function.name(), e.0))
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::compiler::{CompiledUnit, Compiler};
    use crate::context::EvaluationContext;
    use crate::error::EvalResult;
    use crate::options::EvaluationOptions;
    use crate::value::Value;
    use cubeql_ast::Expression;
    use cubeql_model::{CellReader, SchemaReader, sample};
    use cubeql_types::{Category, FunctionTable, QueryScope, Validator};
    use std::sync::Arc;

    /// The sample cube with its facts
    pub struct Fixture {
        pub schema: Arc<dyn SchemaReader>,
        pub cells: Arc<dyn CellReader>,
    }

    impl Fixture {
        pub fn new() -> Self {
            let cube = sample::sales_cube().unwrap();
            let facts = sample::sales_facts(&cube).unwrap();
            Self {
                schema: cube,
                cells: Arc::new(facts),
            }
        }

        pub fn s(&self) -> &dyn SchemaReader {
            self.schema.as_ref()
        }

        pub fn member(&self, name: &str) -> Expression {
            Expression::member(self.s(), name).unwrap()
        }

        pub fn level(&self, name: &str) -> Expression {
            Expression::level(self.s(), name).unwrap()
        }

        pub fn hierarchy(&self, name: &str) -> Expression {
            Expression::hierarchy(self.s(), name).unwrap()
        }

        pub fn context(&self) -> EvaluationContext {
            EvaluationContext::new(
                self.schema.clone(),
                self.cells.clone(),
                EvaluationOptions::default(),
            )
        }

        pub fn compile(&self, expr: &Expression, category: Category) -> CompiledUnit {
            let scope = QueryScope::new();
            let typed = Validator::new(FunctionTable::standard(), self.s(), &scope)
                .validate_as(expr, category)
                .unwrap();
            Compiler::new(self.schema.clone(), &EvaluationOptions::default()).compile(&typed)
        }

        pub fn eval(&self, expr: &Expression, category: Category) -> EvalResult<Value> {
            let unit = self.compile(expr, category);
            unit.evaluate(&mut self.context())
        }

        /// Unique names of a set expression's elements
        pub fn names(&self, expr: &Expression) -> Vec<String> {
            match self.eval(expr, Category::Set).unwrap() {
                Value::Set(list) => list
                    .iter()
                    .map(|t| {
                        t.iter()
                            .map(|m| self.s().member_unique_name(m).to_string())
                            .collect::<Vec<_>>()
                            .join(" x ")
                    })
                    .collect(),
                other => panic!("expected a set, got {:?}", other),
            }
        }

        pub fn number(&self, expr: &Expression) -> Option<f64> {
            match self.eval(expr, Category::Numeric).unwrap() {
                Value::Number(n) => Some(n),
                Value::Null | Value::Empty => None,
                other => panic!("expected a number, got {:?}", other),
            }
        }

        pub fn member_name(&self, expr: &Expression) -> String {
            match self.eval(expr, Category::Member).unwrap() {
                Value::Member(m) => self.s().member_unique_name(&m).to_string(),
                other => panic!("expected a member, got {:?}", other),
            }
        }
    }
}
