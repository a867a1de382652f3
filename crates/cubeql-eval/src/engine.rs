//! The engine facade
//!
//! [`CubeEngine`] ties one cube's metadata and cell reader to the function
//! table. Expressions are validated and compiled once by
//! [`CubeEngine::prepare`] and may then be evaluated any number of times,
//! each evaluation with its own [`EvaluationContext`].

use crate::compiler::{CompiledUnit, Compiler};
use crate::context::EvaluationContext;
use crate::dependency;
use crate::error::EvalResult;
use crate::options::EvaluationOptions;
use crate::query::{self, QueryEnvironment, QueryResult};
use crate::user::{UserFunction, UserFunctions};
use crate::value::Value;
use cubeql_ast::{Expression, QueryDefinition};
use cubeql_diagnostics::Result as CubeResult;
use cubeql_model::{CellReader, HierarchyId, SchemaReader};
use cubeql_types::{
    Builtin, Category, Dependency, FunctionTable, OlapType, QueryScope, TypeRule, TypedExpression,
    Validator,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A validated and compiled expression
#[derive(Debug, Clone)]
pub struct PreparedExpression {
    pub source: Expression,
    pub typed: TypedExpression,
    pub unit: CompiledUnit,
}

impl PreparedExpression {
    pub fn result_type(&self) -> &OlapType {
        &self.typed.ty
    }
}

/// Function table and user implementations, replaced together
#[derive(Clone)]
struct Registry {
    table: Arc<FunctionTable>,
    functions: Arc<UserFunctions>,
}

/// Compiles and evaluates expressions and queries over one cube
pub struct CubeEngine {
    schema: Arc<dyn SchemaReader>,
    cells: Arc<dyn CellReader>,
    options: EvaluationOptions,
    registry: RwLock<Registry>,
}

impl fmt::Debug for CubeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CubeEngine")
            .field("cube", &self.schema.cube_name())
            .field("options", &self.options)
            .field("user_functions", &self.registry.read().functions)
            .finish()
    }
}

impl CubeEngine {
    pub fn new(schema: Arc<dyn SchemaReader>, cells: Arc<dyn CellReader>) -> Self {
        Self {
            schema,
            cells,
            options: EvaluationOptions::default(),
            registry: RwLock::new(Registry {
                table: Arc::new(FunctionTable::standard().clone()),
                functions: Arc::new(UserFunctions::default()),
            }),
        }
    }

    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &Arc<dyn SchemaReader> {
        &self.schema
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// Add a user function; expressions prepared afterwards can call it
    pub fn register_function(&self, function: Arc<dyn UserFunction>) -> Builtin {
        let mut registry = self.registry.write();
        let mut table = (*registry.table).clone();
        let mut functions = (*registry.functions).clone();
        let builtin = table.register_user(
            function.name(),
            &function.params(),
            TypeRule::Fixed(function.returns()),
        );
        log::debug!("registered user function {} as {:?}", function.name(), builtin);
        functions.register(function);
        *registry = Registry {
            table: Arc::new(table),
            functions: Arc::new(functions),
        };
        builtin
    }

    fn registry(&self) -> Registry {
        self.registry.read().clone()
    }

    /// A context on every hierarchy's default member
    pub fn new_context(&self) -> EvaluationContext {
        EvaluationContext::new(self.schema.clone(), self.cells.clone(), self.options.clone())
    }

    fn validate(&self, table: &FunctionTable, expr: &Expression) -> CubeResult<TypedExpression> {
        let scope = QueryScope::new();
        Validator::new(table, self.schema.as_ref(), &scope)
            .validate(expr)
            .map_err(|e| e.into_cube_error(Some(expr.to_string())))
    }

    /// Validate and compile `expr` once for repeated evaluation
    pub fn prepare(&self, expr: &Expression) -> CubeResult<PreparedExpression> {
        let registry = self.registry();
        let typed = self.validate(&registry.table, expr)?;
        Ok(self.compile(registry, expr, typed))
    }

    /// Like [`Self::prepare`], converting the result to `category`
    pub fn prepare_as(
        &self,
        expr: &Expression,
        category: Category,
    ) -> CubeResult<PreparedExpression> {
        let registry = self.registry();
        let scope = QueryScope::new();
        let typed = Validator::new(&registry.table, self.schema.as_ref(), &scope)
            .validate_as(expr, category)
            .map_err(|e| e.into_cube_error(Some(expr.to_string())))?;
        Ok(self.compile(registry, expr, typed))
    }

    fn compile(
        &self,
        registry: Registry,
        expr: &Expression,
        typed: TypedExpression,
    ) -> PreparedExpression {
        let unit = Compiler::new(self.schema.clone(), &self.options)
            .with_user_functions(registry.functions)
            .compile(&typed);
        log::debug!("prepared {} as {:?}", expr, unit.style());
        PreparedExpression {
            source: expr.clone(),
            typed,
            unit,
        }
    }

    pub fn evaluate(
        &self,
        prepared: &PreparedExpression,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        ctx.start_timer();
        prepared.unit.evaluate(ctx)
    }

    /// Does `expr` depend on the current member of `hierarchy`?
    pub fn depends_on(&self, expr: &Expression, hierarchy: HierarchyId) -> CubeResult<Dependency> {
        let registry = self.registry();
        let typed = self.validate(&registry.table, expr)?;
        Ok(dependency::depends_on(&typed, hierarchy, self.schema.as_ref()))
    }

    /// Run a query in a fresh context
    pub fn execute_query(&self, query: &QueryDefinition) -> CubeResult<QueryResult> {
        let mut ctx = self.new_context();
        self.execute_query_in(&mut ctx, query)
    }

    /// Run a query in `ctx`, e.g. one carrying a cancellation token
    pub fn execute_query_in(
        &self,
        ctx: &mut EvaluationContext,
        query: &QueryDefinition,
    ) -> CubeResult<QueryResult> {
        let registry = self.registry();
        let env = QueryEnvironment {
            schema: &self.schema,
            table: &registry.table,
            user_functions: registry.functions.clone(),
        };
        query::execute(&env, ctx, query)
    }
}
