//! Evaluation context
//!
//! One context per in-flight evaluation. It holds the current member of
//! every hierarchy, the cursors of named sets being iterated, the existing
//! (slicer) tuple, hoisted constants and the formulas of calculated members.
//!
//! Every override is scoped: the `with_*` methods run a closure and restore
//! the previous state on every exit path, errors included.

use crate::compiler::CompiledUnit;
use crate::error::{EvalError, EvalResult};
use crate::limits::{CancellationToken, ExecutionTimer, monotonic_now};
use crate::options::EvaluationOptions;
use crate::value::{Tuple, TupleList, Value};
use cubeql_model::{
    Aggregator, CalculatedBody, CalculatedMember, CellReader, HierarchyId, Member, SchemaReader,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Position of an iteration over a named set
#[derive(Debug, Clone, PartialEq)]
pub struct SetCursor {
    pub tuple: Tuple,
    /// Zero-based position within the set
    pub ordinal: usize,
}

/// Mutable state for evaluating compiled units
pub struct EvaluationContext {
    schema: Arc<dyn SchemaReader>,
    cells: Arc<dyn CellReader>,
    options: EvaluationOptions,
    /// Current member per hierarchy, indexed by hierarchy id
    current: Vec<Member>,
    cursors: HashMap<usize, SetCursor>,
    existing: Option<Tuple>,
    hoisted: HashMap<u64, Value>,
    formulas: HashMap<String, CompiledUnit>,
    named_sets: Vec<Option<Arc<TupleList>>>,
    calculated: Vec<Member>,
    depth: usize,
    token: Option<CancellationToken>,
    timer: ExecutionTimer,
}

impl EvaluationContext {
    /// A context positioned on every hierarchy's default member
    pub fn new(
        schema: Arc<dyn SchemaReader>,
        cells: Arc<dyn CellReader>,
        options: EvaluationOptions,
    ) -> Self {
        let hierarchies = schema.hierarchies();
        let size = hierarchies.iter().map(|h| h.index() + 1).max().unwrap_or(0);
        let mut current: Vec<Member> = (0..size)
            .map(|i| Member::Null(HierarchyId(i as u32)))
            .collect();
        for h in hierarchies {
            current[h.index()] = schema.default_member(h);
        }
        let timer = ExecutionTimer::new(
            options.timeout_ms.map(Duration::from_millis),
            options.check_interval,
        );
        Self {
            schema,
            cells,
            options,
            current,
            cursors: HashMap::new(),
            existing: None,
            hoisted: HashMap::new(),
            formulas: HashMap::new(),
            named_sets: Vec::new(),
            calculated: Vec::new(),
            depth: 0,
            token: None,
            timer,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn schema(&self) -> &Arc<dyn SchemaReader> {
        &self.schema
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    // ========================================================================
    // Current members
    // ========================================================================

    /// Current member of a hierarchy
    pub fn current_member(&self, hierarchy: HierarchyId) -> Member {
        self.current
            .get(hierarchy.index())
            .cloned()
            .unwrap_or(Member::Null(hierarchy))
    }

    /// The full coordinate: one member per hierarchy
    pub fn coordinate(&self) -> &[Member] {
        &self.current
    }

    /// Replace a hierarchy's current member, returning the previous one.
    /// Prefer the scoped [`Self::with_current_member`].
    pub fn set_current_member(&mut self, member: Member) -> Member {
        let index = member.hierarchy().index();
        if index >= self.current.len() {
            return Member::Null(member.hierarchy());
        }
        std::mem::replace(&mut self.current[index], member)
    }

    /// Run `f` with `member` as its hierarchy's current member
    pub fn with_current_member<R>(
        &mut self,
        member: Member,
        f: impl FnOnce(&mut Self) -> EvalResult<R>,
    ) -> EvalResult<R> {
        let previous = self.set_current_member(member);
        let result = f(self);
        self.set_current_member(previous);
        result
    }

    /// Run `f` with every member of `tuple` overlaid on the context
    pub fn with_tuple<R>(
        &mut self,
        tuple: &[Member],
        f: impl FnOnce(&mut Self) -> EvalResult<R>,
    ) -> EvalResult<R> {
        let saved: Tuple = tuple
            .iter()
            .map(|m| self.set_current_member(m.clone()))
            .collect();
        let result = f(self);
        for previous in saved.into_iter().rev() {
            self.set_current_member(previous);
        }
        result
    }

    // ========================================================================
    // Named set cursors
    // ========================================================================

    /// Run `f` with named set `index` positioned on `tuple`
    pub fn with_set_cursor<R>(
        &mut self,
        index: usize,
        tuple: &Tuple,
        ordinal: usize,
        f: impl FnOnce(&mut Self) -> EvalResult<R>,
    ) -> EvalResult<R> {
        let previous = self.cursors.insert(
            index,
            SetCursor {
                tuple: tuple.clone(),
                ordinal,
            },
        );
        let result = f(self);
        match previous {
            Some(cursor) => self.cursors.insert(index, cursor),
            None => self.cursors.remove(&index),
        };
        result
    }

    pub fn cursor(&self, index: usize) -> Option<&SetCursor> {
        self.cursors.get(&index)
    }

    // ========================================================================
    // Existing scope
    // ========================================================================

    pub fn existing(&self) -> Option<&Tuple> {
        self.existing.as_ref()
    }

    /// Run `f` with `tuple` as the compound filter in force
    pub fn with_existing<R>(
        &mut self,
        tuple: Option<Tuple>,
        f: impl FnOnce(&mut Self) -> EvalResult<R>,
    ) -> EvalResult<R> {
        let previous = std::mem::replace(&mut self.existing, tuple);
        let result = f(self);
        self.existing = previous;
        result
    }

    // ========================================================================
    // Hoisted constants
    // ========================================================================

    pub fn hoisted(&self, slot: u64) -> Option<&Value> {
        self.hoisted.get(&slot)
    }

    pub fn store_hoisted(&mut self, slot: u64, value: Value) {
        self.hoisted.insert(slot, value);
    }

    pub fn clear_hoisted(&mut self, slots: &[u64]) {
        for slot in slots {
            self.hoisted.remove(slot);
        }
    }

    // ========================================================================
    // Query state
    // ========================================================================

    /// Register the compiled formula of a calculated member
    pub fn register_formula(&mut self, unique_name: &str, unit: CompiledUnit) {
        self.formulas.insert(unique_name.to_uppercase(), unit);
    }

    pub fn has_formula(&self, unique_name: &str) -> bool {
        self.formulas.contains_key(&unique_name.to_uppercase())
    }

    pub fn set_named_set(&mut self, index: usize, list: Arc<TupleList>) {
        if self.named_sets.len() <= index {
            self.named_sets.resize(index + 1, None);
        }
        self.named_sets[index] = Some(list);
    }

    pub fn named_set(&self, index: usize) -> EvalResult<Arc<TupleList>> {
        self.named_sets
            .get(index)
            .and_then(Option::clone)
            .ok_or_else(|| {
                EvalError::internal(format!("named set #{} has not been evaluated", index))
            })
    }

    /// Make a calculated member visible to `AddCalculatedMembers` and
    /// `AllMembers`
    pub fn add_calculated_member(&mut self, member: Member) {
        if !self.calculated.contains(&member) {
            self.calculated.push(member);
        }
    }

    pub fn calculated_members(&self) -> &[Member] {
        &self.calculated
    }

    /// Forget per-query state so the context can run another query
    pub fn reset_query_state(&mut self) {
        self.cursors.clear();
        self.hoisted.clear();
        self.formulas.clear();
        self.named_sets.clear();
        self.calculated.clear();
        self.existing = None;
        self.depth = 0;
    }

    // ========================================================================
    // Limits
    // ========================================================================

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    /// Start the wall-clock budget from now
    pub fn start_timer(&mut self) {
        self.timer = ExecutionTimer::new(
            self.options.timeout_ms.map(Duration::from_millis),
            self.options.check_interval,
        );
        self.timer.start(monotonic_now());
    }

    /// Check for cancellation and count one unit of work against the clock
    pub fn poll(&mut self) -> EvalResult<()> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(EvalError::Cancelled);
        }
        self.timer.tick(1)
    }

    // ========================================================================
    // Cells
    // ========================================================================

    /// Value of the cell at the current coordinate
    ///
    /// The calculated member with the highest solve order decides how the
    /// cell is computed (the earliest hierarchy wins ties). Without one the
    /// cell reader is asked.
    pub fn evaluate_cell(&mut self) -> EvalResult<Value> {
        self.poll()?;
        let mut chosen: Option<&Member> = None;
        for member in &self.current {
            if let Member::Calculated(calc) = member {
                let better = match chosen.and_then(Member::calculated) {
                    Some(best) => calc.solve_order > best.solve_order,
                    None => true,
                };
                if better {
                    chosen = Some(member);
                }
            }
        }
        let Some(member) = chosen.cloned() else {
            log::trace!("reading cell from storage");
            return self
                .cells
                .cell_value(&self.current)
                .map(Value::from)
                .map_err(EvalError::from);
        };
        let Some(calc) = member.calculated() else {
            return Err(EvalError::internal("chosen member is not calculated"));
        };
        match &calc.body {
            CalculatedBody::Formula => self.evaluate_formula(calc),
            CalculatedBody::Aggregate(members) => self.aggregate_members(calc, members),
        }
    }

    fn evaluate_formula(&mut self, calc: &CalculatedMember) -> EvalResult<Value> {
        let unit = self
            .formulas
            .get(&calc.unique_name.to_uppercase())
            .cloned()
            .ok_or_else(|| {
                EvalError::invalid_argument(
                    calc.unique_name.clone(),
                    "calculated member has no registered formula",
                )
            })?;
        let limit = self.options.max_recursion_depth;
        if self.depth >= limit {
            log::warn!(
                "recursion limit {} reached evaluating {}",
                limit,
                calc.unique_name
            );
            return Err(EvalError::RecursionLimit {
                member: calc.unique_name.clone(),
                limit,
            });
        }
        self.depth += 1;
        let result = unit.evaluate(self);
        self.depth -= 1;
        result
    }

    /// Roll up `members` with the current measure's aggregator
    fn aggregate_members(&mut self, calc: &CalculatedMember, members: &[Member]) -> EvalResult<Value> {
        let measure = self.current_member(self.schema.measures_hierarchy());
        let aggregator = self
            .schema
            .measure_aggregator(&measure)
            .unwrap_or(Aggregator::Sum);
        if !aggregator.can_rollup() {
            log::warn!(
                "{} cannot roll up {}",
                calc.unique_name,
                self.schema.member_unique_name(&measure)
            );
            return Err(EvalError::AggregationNotSupported {
                measure: self.schema.member_unique_name(&measure).to_string(),
                aggregator: format!("{:?}", aggregator),
            });
        }
        let mut values = Vec::with_capacity(members.len());
        for member in members {
            let value = self.with_current_member(member.clone(), |ctx| ctx.evaluate_cell())?;
            if let Some(n) = value.as_number() {
                values.push(n);
            }
        }
        Ok(aggregator
            .rollup(&values)
            .map_or(Value::Empty, Value::Number))
    }
}
