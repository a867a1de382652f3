//! Runtime values
//!
//! Scalars follow the null/empty rules of the query language: `Null` is an
//! explicit null, `Empty` an empty cell. Both are "absent": additive
//! identities, multiplicative absorbers and unknown in three-valued logic.

use crate::error::{EvalError, EvalResult};
use crate::options::NullDivision;
use cubeql_ast::Literal;
use cubeql_model::{CellValue, DimensionId, HierarchyId, LevelId, Member, SchemaReader};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// One coordinate: at most one member per hierarchy
pub type Tuple = SmallVec<[Member; 4]>;

pub fn tuple_of(member: Member) -> Tuple {
    smallvec::smallvec![member]
}

/// A materialized set: tuples of one arity
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TupleList {
    arity: usize,
    tuples: Vec<Tuple>,
}

impl TupleList {
    pub fn new(arity: usize) -> Self {
        Self {
            arity,
            tuples: Vec::new(),
        }
    }

    pub fn with_capacity(arity: usize, capacity: usize) -> Self {
        Self {
            arity,
            tuples: Vec::with_capacity(capacity),
        }
    }

    pub fn from_members(members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            arity: 1,
            tuples: members.into_iter().map(tuple_of).collect(),
        }
    }

    pub fn from_tuples(arity: usize, tuples: Vec<Tuple>) -> Self {
        Self { arity, tuples }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    pub fn tuples_mut(&mut self) -> &mut Vec<Tuple> {
        &mut self.tuples
    }

    pub fn into_tuples(self) -> Vec<Tuple> {
        self.tuples
    }

    pub fn get(&self, index: usize) -> Option<&Tuple> {
        self.tuples.get(index)
    }

    pub fn push(&mut self, tuple: Tuple) {
        self.tuples.push(tuple);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.tuples.iter()
    }

    /// First member of every tuple
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.tuples.iter().filter_map(|t| t.first())
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.tuples.iter().any(|t| t == tuple)
    }

    /// Drop repeated tuples, keeping first occurrences in order
    pub fn dedup_in_place(&mut self) {
        let mut seen: HashSet<Tuple> = HashSet::with_capacity(self.tuples.len());
        self.tuples.retain(|t| seen.insert(t.clone()));
    }
}

impl<'a> IntoIterator for &'a TupleList {
    type Item = &'a Tuple;
    type IntoIter = std::slice::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null (the `NULL` literal, null results of functions)
    Null,
    /// An empty cell
    Empty,
    Number(f64),
    String(String),
    Boolean(bool),
    Member(Member),
    Tuple(Tuple),
    Set(Arc<TupleList>),
    Level(LevelId),
    Hierarchy(HierarchyId),
    Dimension(DimensionId),
    Symbol(String),
}

impl Value {
    /// Null or empty
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Null | Value::Empty)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Truth value; `None` for absent values
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Empty => "Empty",
            Value::Number(_) => "Numeric",
            Value::String(_) => "String",
            Value::Boolean(_) => "Logical",
            Value::Member(_) => "Member",
            Value::Tuple(_) => "Tuple",
            Value::Set(_) => "Set",
            Value::Level(_) => "Level",
            Value::Hierarchy(_) => "Hierarchy",
            Value::Dimension(_) => "Dimension",
            Value::Symbol(_) => "Symbol",
        }
    }

    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
            Literal::Symbol(s) => Value::Symbol(s.clone()),
        }
    }

    /// Render with metadata names, for diagnostics and tests
    pub fn describe(&self, schema: &dyn SchemaReader) -> String {
        let tuple = |t: &Tuple| {
            let names: Vec<&str> = t.iter().map(|m| schema.member_unique_name(m)).collect();
            format!("({})", names.join(", "))
        };
        match self {
            Value::Null => "NULL".to_string(),
            Value::Empty => "EMPTY".to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Member(m) => schema.member_unique_name(m).to_string(),
            Value::Tuple(t) => tuple(t),
            Value::Set(list) => {
                let items: Vec<String> = list
                    .iter()
                    .map(|t| match t.as_slice() {
                        [m] => schema.member_unique_name(m).to_string(),
                        _ => tuple(t),
                    })
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
            Value::Level(l) => schema.level_unique_name(*l).to_string(),
            Value::Hierarchy(h) => schema.hierarchy_unique_name(*h).to_string(),
            Value::Dimension(d) => schema.dimension_unique_name(*d).to_string(),
            Value::Symbol(s) => s.clone(),
        }
    }
}

impl From<CellValue> for Value {
    fn from(cell: CellValue) -> Self {
        match cell {
            CellValue::Empty => Value::Empty,
            CellValue::Number(n) => Value::Number(n),
            CellValue::String(s) => Value::String(s),
            CellValue::Boolean(b) => Value::Boolean(b),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Member> for Value {
    fn from(m: Member) -> Self {
        Value::Member(m)
    }
}

/// Integers print without a fraction
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

fn number(value: &Value) -> EvalResult<f64> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(EvalError::type_mismatch("Numeric", other.type_name())),
    }
}

/// Result of combining two absent operands
fn absent_pair(a: &Value, b: &Value) -> Value {
    if a.is_empty() || b.is_empty() {
        Value::Empty
    } else {
        Value::Null
    }
}

/// `a + b`; an absent operand is the identity
pub fn add(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a.is_absent(), b.is_absent()) {
        (true, true) => Ok(absent_pair(a, b)),
        (true, false) => Ok(Value::Number(number(b)?)),
        (false, true) => Ok(Value::Number(number(a)?)),
        (false, false) => Ok(Value::Number(number(a)? + number(b)?)),
    }
}

/// `a - b`; an absent operand is the identity, so `NULL - b` is `-b`
pub fn subtract(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a.is_absent(), b.is_absent()) {
        (true, true) => Ok(absent_pair(a, b)),
        (true, false) => Ok(Value::Number(-number(b)?)),
        (false, true) => Ok(Value::Number(number(a)?)),
        (false, false) => Ok(Value::Number(number(a)? - number(b)?)),
    }
}

/// `a * b`; an absent operand absorbs
pub fn multiply(a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_absent() || b.is_absent() {
        return Ok(if a.is_null() || b.is_null() {
            Value::Null
        } else {
            Value::Empty
        });
    }
    Ok(Value::Number(number(a)? * number(b)?))
}

/// `a / b`; division by an absent value or zero follows `mode`
pub fn divide(a: &Value, b: &Value, mode: NullDivision) -> EvalResult<Value> {
    if a.is_absent() {
        return Ok(a.clone());
    }
    let dividend = number(a)?;
    let divisor = if b.is_absent() { 0.0 } else { number(b)? };
    if divisor == 0.0 {
        return Ok(match mode {
            NullDivision::Infinity => Value::Number(dividend / 0.0),
            NullDivision::Null => Value::Null,
        });
    }
    Ok(Value::Number(dividend / divisor))
}

pub fn negate(a: &Value) -> EvalResult<Value> {
    if a.is_absent() {
        return Ok(a.clone());
    }
    Ok(Value::Number(-number(a)?))
}

// ============================================================================
// Comparison
// ============================================================================

/// Compare two scalars of one kind; `Null` when either is absent
pub fn compare(a: &Value, b: &Value) -> EvalResult<Option<Ordering>> {
    if a.is_absent() || b.is_absent() {
        return Ok(None);
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x.partial_cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(Some(x.cmp(y))),
        (Value::Boolean(x), Value::Boolean(y)) => Ok(Some(x.cmp(y))),
        (Value::Number(_), Value::Boolean(_)) | (Value::Boolean(_), Value::Number(_)) => {
            Ok(number(a)?.partial_cmp(&number(b)?))
        }
        _ => Err(EvalError::type_mismatch(a.type_name(), b.type_name())),
    }
}

/// Total order used for sorting: absent values first, then numbers,
/// strings and booleans
pub fn sort_compare(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null | Value::Empty => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Boolean(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ============================================================================
// Three-valued logic
// ============================================================================

fn truth(value: &Value) -> EvalResult<Option<bool>> {
    match value {
        Value::Null | Value::Empty => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Number(n) => Ok(Some(*n != 0.0)),
        other => Err(EvalError::type_mismatch("Logical", other.type_name())),
    }
}

fn logical(result: Option<bool>) -> Value {
    result.map_or(Value::Null, Value::Boolean)
}

pub fn and(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(logical(match (truth(a)?, truth(b)?) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }))
}

pub fn or(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(logical(match (truth(a)?, truth(b)?) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }))
}

pub fn xor(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(logical(match (truth(a)?, truth(b)?) {
        (Some(x), Some(y)) => Some(x != y),
        _ => None,
    }))
}

pub fn not(a: &Value) -> EvalResult<Value> {
    Ok(logical(truth(a)?.map(|b| !b)))
}
