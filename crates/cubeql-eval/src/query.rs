//! Query execution
//!
//! A query runs in phases:
//!
//! 1. every formula, axis and the slicer is validated and compiled;
//!    resolution errors abort here
//! 2. named sets are materialized once, in definition order
//! 3. the slicer is evaluated and becomes the context and the existing
//!    tuple; several tuples collapse into one aggregate member per
//!    hierarchy
//! 4. axes are evaluated and `NON EMPTY` axes filtered
//! 5. every cell is evaluated, axis 0 varying fastest
//!
//! Evaluation errors in step 5 are stored on their cell. Anything else,
//! and any cancellation or timeout, fails the whole query.

use crate::compiler::{CompiledUnit, Compiler};
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::user::UserFunctions;
use crate::value::{Tuple, TupleList, Value};
use cubeql_ast::{Expression, Formula, QueryDefinition};
use cubeql_diagnostics::{CQ0211, CubeError, Diagnostic, Result as CubeResult};
use cubeql_model::{CalculatedMember, LevelId, Member, SchemaReader};
use cubeql_types::{Category, FunctionTable, QueryScope, ResolutionError, Validator};
use indexmap::IndexSet;
use std::sync::Arc;

/// One evaluated cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Position on each axis
    pub coordinates: Vec<usize>,
    pub value: Result<Value, EvalError>,
}

/// Axes, slicer and cells of an executed query
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub axes: Vec<Arc<TupleList>>,
    /// Members the slicer put in force, one per sliced hierarchy
    pub slicer: Tuple,
    pub cells: Vec<Cell>,
    /// Conditions worth reporting that did not fail the query
    pub warnings: Vec<Diagnostic>,
}

impl QueryResult {
    /// The cell at `coordinates`, one position per axis
    pub fn cell(&self, coordinates: &[usize]) -> Option<&Cell> {
        if coordinates.len() != self.axes.len() {
            return None;
        }
        let mut index = 0;
        let mut stride = 1;
        for (axis, &position) in self.axes.iter().zip(coordinates) {
            if position >= axis.len() {
                return None;
            }
            index += position * stride;
            stride *= axis.len();
        }
        self.cells.get(index)
    }

    /// Plain text grid: one line per row, columns separated by `|`
    pub fn render(&self, schema: &dyn SchemaReader) -> String {
        let label = |tuple: &Tuple| {
            tuple
                .iter()
                .map(|m| schema.member_unique_name(m))
                .collect::<Vec<_>>()
                .join(" x ")
        };
        let value = |cell: &Cell| match &cell.value {
            Ok(v) => v.describe(schema),
            Err(e) => format!("#ERR {}", e.code()),
        };

        let mut lines = Vec::new();
        match self.axes.as_slice() {
            [] => lines.extend(self.cells.first().map(value)),
            [columns] => {
                for (tuple, cell) in columns.iter().zip(&self.cells) {
                    lines.push(format!("{} | {}", label(tuple), value(cell)));
                }
            }
            [columns, rows, ..] => {
                let header: Vec<String> = columns.iter().map(label).collect();
                lines.push(format!(" | {}", header.join(" | ")));
                for (r, row) in rows.iter().enumerate() {
                    let values: Vec<String> = (0..columns.len())
                        .map(|c| {
                            let mut coordinates = vec![c, r];
                            coordinates.resize(self.axes.len(), 0);
                            self.cell(&coordinates).map(value).unwrap_or_default()
                        })
                        .collect();
                    lines.push(format!("{} | {}", label(row), values.join(" | ")));
                }
            }
        }
        lines.join("\n")
    }
}

/// What a query needs from the engine
pub(crate) struct QueryEnvironment<'a> {
    pub schema: &'a Arc<dyn SchemaReader>,
    pub table: &'a FunctionTable,
    pub user_functions: Arc<UserFunctions>,
}

struct CompiledQuery {
    sets: Vec<(usize, String, CompiledUnit)>,
    slicer: Option<CompiledUnit>,
    axes: Vec<(bool, CompiledUnit)>,
}

fn resolution(err: ResolutionError, expression: &Expression) -> CubeError {
    err.into_cube_error(Some(expression.to_string()))
}

/// Run `query` in `ctx`, replacing any previous query state it held
pub(crate) fn execute(
    env: &QueryEnvironment<'_>,
    ctx: &mut EvaluationContext,
    query: &QueryDefinition,
) -> CubeResult<QueryResult> {
    ctx.reset_query_state();
    ctx.start_timer();
    let compiled = compile(env, ctx, query)?;
    log::debug!(
        "compiled query: {} named sets, {} axes",
        compiled.sets.len(),
        compiled.axes.len()
    );
    run(env.schema.as_ref(), ctx, &compiled).map_err(CubeError::from)
}

fn compile(
    env: &QueryEnvironment<'_>,
    ctx: &mut EvaluationContext,
    query: &QueryDefinition,
) -> CubeResult<CompiledQuery> {
    let schema = env.schema.as_ref();
    let mut scope = QueryScope::new();
    for formula in &query.formulas {
        if let Formula::Member { member, expression } = formula {
            scope
                .define_member(&member.unique_name, Member::from(member.clone()))
                .map_err(|e| resolution(e, expression))?;
        }
    }

    let options = ctx.options().clone();
    let mut compiler = Compiler::new(env.schema.clone(), &options)
        .with_user_functions(env.user_functions.clone());
    let mut sets = Vec::new();

    for formula in &query.formulas {
        match formula {
            Formula::Set { name, expression } => {
                let typed = Validator::new(env.table, schema, &scope)
                    .validate_as(expression, Category::Set)
                    .map_err(|e| resolution(e, expression))?;
                let index = scope
                    .define_set(name, typed.ty.clone())
                    .map_err(|e| resolution(e, expression))?;
                sets.push((index, name.clone(), compiler.compile(&typed)));
            }
            Formula::Member { member, expression } => {
                let typed = Validator::new(env.table, schema, &scope)
                    .validate_as(expression, Category::Value)
                    .map_err(|e| resolution(e, expression))?;
                ctx.register_formula(&member.unique_name, compiler.compile(&typed));
                ctx.add_calculated_member(Member::from(member.clone()));
            }
        }
    }

    let validator = Validator::new(env.table, schema, &scope);
    let mut compile_set = |expression: &Expression| -> CubeResult<CompiledUnit> {
        let typed = validator
            .validate_as(expression, Category::Set)
            .map_err(|e| resolution(e, expression))?;
        Ok(compiler.compile(&typed))
    };
    let slicer = query.slicer.as_ref().map(&mut compile_set).transpose()?;
    let axes = query
        .axes
        .iter()
        .map(|axis| Ok((axis.non_empty, compile_set(&axis.expression)?)))
        .collect::<CubeResult<Vec<_>>>()?;

    Ok(CompiledQuery { sets, slicer, axes })
}

fn run(
    schema: &dyn SchemaReader,
    ctx: &mut EvaluationContext,
    query: &CompiledQuery,
) -> EvalResult<QueryResult> {
    for (index, name, unit) in &query.sets {
        let list = unit.evaluate_list(ctx)?;
        log::debug!("materialized named set {} with {} tuples", name, list.len());
        ctx.set_named_set(*index, list);
    }

    let mut sliced_out = false;
    let mut warnings = Vec::new();
    let slicer = match &query.slicer {
        Some(unit) => {
            let list = unit.evaluate_list(ctx)?;
            if list.is_empty() {
                log::warn!("slicer set is empty; every cell will be empty");
                sliced_out = true;
                warnings.push(Diagnostic::warning(CQ0211, "slicer set is empty"));
            }
            slicer_tuple(schema, &list)
        }
        None => Tuple::new(),
    };
    let existing = (!slicer.is_empty()).then(|| slicer.clone());

    let in_slicer = slicer.clone();
    ctx.with_tuple(&in_slicer, |ctx| ctx.with_existing(existing, |ctx| {
        let mut axes = Vec::with_capacity(query.axes.len());
        for (_, unit) in &query.axes {
            axes.push(unit.evaluate_list(ctx)?);
        }
        let unfiltered = axes.clone();
        for (i, (non_empty, _)) in query.axes.iter().enumerate() {
            if *non_empty {
                axes[i] = Arc::new(non_empty_axis(ctx, &unfiltered, i)?);
                log::debug!("NON EMPTY axis {} keeps {} tuples", i, axes[i].len());
            }
        }

        let cells = evaluate_cells(ctx, &axes, sliced_out)?;
        Ok(QueryResult {
            axes,
            slicer,
            cells,
            warnings,
        })
    }))
}

/// One member per sliced hierarchy; several distinct members become an
/// aggregate member over them
fn slicer_tuple(schema: &dyn SchemaReader, list: &TupleList) -> Tuple {
    (0..list.arity())
        .filter_map(|position| {
            let members: IndexSet<Member> = list
                .iter()
                .filter_map(|t| t.get(position).cloned())
                .collect();
            match members.len() {
                0 => None,
                1 => members.into_iter().next(),
                _ => Some(compound_member(schema, members.into_iter().collect())),
            }
        })
        .collect()
}

fn compound_member(schema: &dyn SchemaReader, members: Vec<Member>) -> Member {
    let hierarchy = members[0].hierarchy();
    let level = schema
        .member_level(&members[0])
        .unwrap_or(LevelId::new(hierarchy, 0));
    let unique_name = format!("{}.[*SLICER*]", schema.hierarchy_unique_name(hierarchy));
    log::debug!(
        "slicer aggregates {} members of {}",
        members.len(),
        schema.hierarchy_unique_name(hierarchy)
    );
    Member::from(CalculatedMember::aggregate(level, "*SLICER*", unique_name, members))
}

/// Keep the tuples of axis `index` with a non-empty cell somewhere on the
/// other axes
fn non_empty_axis(
    ctx: &mut EvaluationContext,
    axes: &[Arc<TupleList>],
    index: usize,
) -> EvalResult<TupleList> {
    let others: Vec<&TupleList> = axes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, a)| a.as_ref())
        .collect();
    let axis = &axes[index];
    let mut kept = TupleList::new(axis.arity());
    for tuple in axis.iter() {
        ctx.poll()?;
        let found = ctx.with_tuple(tuple, |ctx| any_cell(ctx, &others))?;
        if found {
            kept.push(tuple.clone());
        }
    }
    Ok(kept)
}

fn any_cell(ctx: &mut EvaluationContext, axes: &[&TupleList]) -> EvalResult<bool> {
    let Some((first, rest)) = axes.split_first() else {
        return Ok(!ctx.evaluate_cell()?.is_absent());
    };
    let mut found = false;
    for tuple in first.iter() {
        if ctx.with_tuple(tuple, |ctx| any_cell(ctx, rest))? {
            found = true;
            break;
        }
    }
    Ok(found)
}

fn evaluate_cells(
    ctx: &mut EvaluationContext,
    axes: &[Arc<TupleList>],
    sliced_out: bool,
) -> EvalResult<Vec<Cell>> {
    let total: usize = axes.iter().map(|a| a.len()).product();
    let mut cells = Vec::with_capacity(total);
    for index in 0..total {
        let mut coordinates = Vec::with_capacity(axes.len());
        let mut remainder = index;
        let mut tuple = Tuple::new();
        for axis in axes {
            let position = remainder % axis.len();
            remainder /= axis.len();
            coordinates.push(position);
            if let Some(t) = axis.get(position) {
                tuple.extend(t.iter().cloned());
            }
        }
        let value = if sliced_out {
            Ok(Value::Empty)
        } else {
            ctx.with_tuple(&tuple, EvaluationContext::evaluate_cell)
        };
        if let Err(err) = &value {
            if err.is_interruption() {
                return Err(err.clone());
            }
            log::trace!("cell {:?} failed: {}", coordinates, err);
        }
        cells.push(Cell { coordinates, value });
    }
    Ok(cells)
}
