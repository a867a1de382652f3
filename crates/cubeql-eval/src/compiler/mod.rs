//! Compilation of typed expressions
//!
//! The [`Compiler`] walks a [`TypedExpression`] once and emits one
//! [`CompiledUnit`] per node. Calls are dispatched on their resolved
//! [`Builtin`]; the implementations live in [`crate::functions`], grouped
//! by family.
//!
//! # Hoisting
//!
//! A call that evaluates some of its arguments once per element of a set
//! (`Filter`, `Order`, `Sum(set, expr)`, ...) opens a hoist frame around
//! those arguments. A context-free sub-expression compiled inside a frame
//! is cached in a context slot the first time it is evaluated and the
//! owning call clears its slots each time it is entered. Disabling
//! hoisting changes evaluation cost only.

mod conversion;
mod unit;

pub use unit::*;

use crate::dependency;
use crate::error::EvalError;
use crate::options::EvaluationOptions;
use crate::user::UserFunctions;
use crate::value::Value;
use cubeql_model::{HierarchyId, SchemaReader};
use cubeql_types::{
    Builtin, DependencyRule, FunctionSignature, OlapType, TypedExpression, TypedKind,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SLOT: AtomicU64 = AtomicU64::new(0);

fn next_slot() -> u64 {
    NEXT_SLOT.fetch_add(1, Ordering::Relaxed)
}

/// One call being compiled: its overload, typed arguments and result type
pub(crate) struct CallSite<'a> {
    pub signature: &'a FunctionSignature,
    pub args: &'a [TypedExpression],
    pub ty: &'a OlapType,
}

impl CallSite<'_> {
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn builtin(&self) -> Builtin {
        self.signature.builtin
    }

    /// Upper-cased keyword at argument `index`
    pub fn symbol(&self, index: usize) -> Option<String> {
        self.args
            .get(index)
            .and_then(TypedExpression::as_symbol)
            .map(str::to_uppercase)
    }

    pub fn arg_type(&self, index: usize) -> Option<&OlapType> {
        self.args.get(index).map(|a| &a.ty)
    }

    /// Named set index when argument `index` references one directly
    pub fn named_set(&self, index: usize) -> Option<usize> {
        match self.args.get(index).map(|a| &a.kind) {
            Some(TypedKind::NamedSet { index, .. }) => Some(*index),
            _ => None,
        }
    }

    pub fn result_hierarchy(&self) -> Option<HierarchyId> {
        self.ty.member_type().hierarchy
    }

    pub fn invalid(&self, message: impl Into<String>) -> CompiledUnit {
        CompiledUnit::failing(
            self.ty.clone(),
            EvalError::invalid_argument(self.name(), message),
        )
    }
}

/// Compiles typed expressions into [`CompiledUnit`]s
pub struct Compiler {
    schema: Arc<dyn SchemaReader>,
    user_functions: Arc<UserFunctions>,
    hoist: bool,
    frames: Vec<Vec<u64>>,
    suppress: usize,
}

impl Compiler {
    pub fn new(schema: Arc<dyn SchemaReader>, options: &EvaluationOptions) -> Self {
        Self {
            schema,
            user_functions: Arc::new(UserFunctions::default()),
            hoist: options.hoist_constants,
            frames: Vec::new(),
            suppress: 0,
        }
    }

    pub fn with_user_functions(mut self, functions: Arc<UserFunctions>) -> Self {
        self.user_functions = functions;
        self
    }

    pub fn schema(&self) -> &Arc<dyn SchemaReader> {
        &self.schema
    }

    pub(crate) fn user_functions(&self) -> &Arc<UserFunctions> {
        &self.user_functions
    }

    /// Compile `expr` and adapt it to at least `style`
    pub fn compile_as(&mut self, expr: &TypedExpression, style: ResultStyle) -> CompiledUnit {
        self.compile(expr).into_style(style)
    }

    pub fn compile(&mut self, expr: &TypedExpression) -> CompiledUnit {
        let context_free = dependency::is_context_free(expr, self.schema.as_ref());
        let hoist = self.hoist
            && self.suppress == 0
            && !self.frames.is_empty()
            && context_free
            && !expr.is_literal();

        if hoist {
            self.suppress += 1;
        }
        let mut unit = self.compile_node(expr);
        unit.context_free = context_free;
        if !hoist {
            return unit;
        }
        self.suppress -= 1;
        if unit.is_constant() {
            return unit;
        }

        let slot = next_slot();
        log::debug!("hoisting {} into slot {}", expr.ty, slot);
        if let Some(frame) = self.frames.last_mut() {
            frame.push(slot);
        }
        unit.hoisted(slot)
    }

    fn compile_node(&mut self, expr: &TypedExpression) -> CompiledUnit {
        let ty = expr.ty.clone();
        match &expr.kind {
            TypedKind::Literal(lit) => CompiledUnit::constant(ty, Value::from_literal(lit)),
            TypedKind::Member(m) => CompiledUnit::constant(ty, Value::Member(m.clone())),
            TypedKind::Level(l) => CompiledUnit::constant(ty, Value::Level(*l)),
            TypedKind::Hierarchy(h) => CompiledUnit::constant(ty, Value::Hierarchy(*h)),
            TypedKind::Dimension(d) => CompiledUnit::constant(ty, Value::Dimension(*d)),
            TypedKind::NamedSet { index, .. } => {
                let index = *index;
                CompiledUnit::list(ty, move |ctx| ctx.named_set(index))
            }
            TypedKind::Conversion { step, operand } => {
                let inner = self.compile(operand);
                conversion::compile_conversion(self, step, operand, inner, ty)
            }
            TypedKind::Call { signature, args } => self.compile_call(signature, args, &expr.ty),
        }
    }

    fn compile_call(
        &mut self,
        signature: &Arc<FunctionSignature>,
        args: &[TypedExpression],
        ty: &OlapType,
    ) -> CompiledUnit {
        let body: Vec<usize> = match signature.dependency {
            DependencyRule::Iterating { body, .. } => body.to_vec(),
            DependencyRule::IteratingRest { set } => (0..args.len()).filter(|i| *i != set).collect(),
            _ => Vec::new(),
        };

        let mut compiled: Vec<Option<CompiledUnit>> = vec![None; args.len()];
        for (i, arg) in args.iter().enumerate() {
            if !body.contains(&i) {
                compiled[i] = Some(self.compile(arg));
            }
        }
        let mut slots = Vec::new();
        if !body.is_empty() {
            self.frames.push(Vec::new());
            for &i in &body {
                if let Some(arg) = args.get(i) {
                    compiled[i] = Some(self.compile(arg));
                }
            }
            slots = self.frames.pop().unwrap_or_default();
        }
        let compiled: Vec<CompiledUnit> = compiled.into_iter().flatten().collect();

        let site = CallSite {
            signature,
            args,
            ty,
        };
        self.compile_builtin(&site, compiled).clearing(slots)
    }

    fn compile_builtin(&mut self, site: &CallSite<'_>, args: Vec<CompiledUnit>) -> CompiledUnit {
        use Builtin as F;
        match site.builtin() {
            F::Parent
            | F::Children
            | F::FirstChild
            | F::LastChild
            | F::FirstSibling
            | F::LastSibling
            | F::Siblings
            | F::PrevMember
            | F::NextMember
            | F::Lag
            | F::Lead
            | F::Ancestor
            | F::Ancestors
            | F::Ascendants
            | F::Descendants
            | F::Cousin
            | F::Range
            | F::CurrentMember
            | F::DefaultMember
            | F::Members
            | F::AllMembers
            | F::Item
            | F::Current
            | F::CurrentOrdinal
            | F::IsLeaf
            | F::IsAncestor
            | F::IsSibling
            | F::Is
            | F::IsNull => self.compile_navigation(site, args),

            F::ParallelPeriod
            | F::OpeningPeriod
            | F::ClosingPeriod
            | F::PeriodsToDate
            | F::Ytd
            | F::Qtd
            | F::Mtd
            | F::Wtd
            | F::LastPeriods => self.compile_time(site, args),

            F::Level
            | F::Levels
            | F::Hierarchy
            | F::Dimension
            | F::Name
            | F::UniqueName
            | F::Caption
            | F::Ordinal
            | F::Properties => self.compile_metadata(site, args),

            F::SetConstructor
            | F::TupleConstructor
            | F::Crossjoin
            | F::Union
            | F::Intersect
            | F::Except
            | F::Distinct
            | F::Extract
            | F::Head
            | F::Tail
            | F::Subset
            | F::Filter
            | F::Generate
            | F::GenerateString
            | F::Hierarchize
            | F::Unorder
            | F::Count => self.compile_set(site, args),

            F::Order
            | F::Rank
            | F::TopCount
            | F::BottomCount
            | F::TopPercent
            | F::BottomPercent
            | F::TopSum
            | F::BottomSum => self.compile_ordering(site, args),

            F::VisualTotals
            | F::Exists
            | F::Existing
            | F::NonEmpty
            | F::DrilldownLevel
            | F::DrilldownMember
            | F::DrillupLevel
            | F::DrillupMember
            | F::AddCalculatedMembers
            | F::StripCalculatedMembers => self.compile_drill(site, args),

            F::Sum
            | F::Avg
            | F::Min
            | F::Max
            | F::Aggregate
            | F::Median
            | F::Var
            | F::VarP
            | F::Stdev
            | F::StdevP
            | F::Covariance
            | F::CovarianceN
            | F::Correlation
            | F::DistinctCount => self.compile_aggregate(site, args),

            F::Add
            | F::Subtract
            | F::Multiply
            | F::Divide
            | F::Negate
            | F::Equal
            | F::NotEqual
            | F::Less
            | F::LessOrEqual
            | F::Greater
            | F::GreaterOrEqual
            | F::And
            | F::Or
            | F::Xor
            | F::Not
            | F::IIf
            | F::CaseTest
            | F::CaseMatch
            | F::CoalesceEmpty
            | F::IsEmpty
            | F::Value
            | F::Abs
            | F::Round
            | F::Int
            | F::Sqrt => self.compile_scalar(site, args),

            F::Concat
            | F::Len
            | F::UCase
            | F::LCase
            | F::Left
            | F::Right
            | F::Mid
            | F::InStr
            | F::Trim => self.compile_string(site, args),

            F::User(index) => self.compile_user(site, index, args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use cubeql_ast::Expression;
    use cubeql_model::{EmptyCells, sample};
    use cubeql_types::{Category, FunctionTable, QueryScope, Validator};

    fn typed(schema: &dyn SchemaReader, expr: &Expression, category: Category) -> TypedExpression {
        let scope = QueryScope::new();
        Validator::new(FunctionTable::standard(), schema, &scope)
            .validate_as(expr, category)
            .unwrap()
    }

    #[test]
    fn test_literals_compile_to_constants() {
        let cube: Arc<dyn SchemaReader> = sample::sales_cube().unwrap();
        let mut compiler = Compiler::new(cube.clone(), &EvaluationOptions::default());
        let expr = typed(cube.as_ref(), &Expression::number(4.0), Category::Numeric);
        let unit = compiler.compile(&expr);
        assert!(unit.is_constant());
        assert!(unit.context_free);
    }

    #[test]
    fn test_hoisted_slots_belong_to_iterating_call() {
        let cube: Arc<dyn SchemaReader> = sample::sales_cube().unwrap();
        let usa = Expression::member(cube.as_ref(), "[Store].[USA]").unwrap();
        let children = Expression::property("Children", usa);
        let body = Expression::infix(">", Expression::number(2.0), Expression::number(1.0));
        let filter = Expression::function("Filter", vec![children, body]);
        let expr = typed(cube.as_ref(), &filter, Category::Set);

        let mut compiler = Compiler::new(cube.clone(), &EvaluationOptions::default());
        let unit = compiler.compile(&expr);
        assert!(compiler.frames.is_empty());
        assert_eq!(compiler.suppress, 0);

        let mut ctx = EvaluationContext::new(cube, Arc::new(EmptyCells), EvaluationOptions::default());
        let list = unit.evaluate_list(&mut ctx).unwrap();
        assert_eq!(list.len(), 3);
    }
}
