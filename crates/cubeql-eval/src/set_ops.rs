//! Set algebra over materialized tuple lists
//!
//! Order is always significant: results keep the order of their left
//! operand and, for duplicates, the first occurrence.

use crate::error::{EvalError, EvalResult};
use crate::value::{Tuple, TupleList};
use cubeql_model::{HierarchyId, Member, SchemaReader};
use indexmap::IndexMap;
use std::collections::HashSet;

pub fn distinct(list: &TupleList) -> TupleList {
    let mut result = list.clone();
    result.dedup_in_place();
    result
}

/// `Union`: concatenation, made distinct unless `all`
pub fn union(left: &TupleList, right: &TupleList, all: bool) -> TupleList {
    let mut result = TupleList::with_capacity(left.arity(), left.len() + right.len());
    for tuple in left.iter().chain(right.iter()) {
        result.push(tuple.clone());
    }
    if !all {
        result.dedup_in_place();
    }
    result
}

/// `Intersect`: left tuples that also occur in `right`
///
/// With `all`, a tuple is kept as many times as it occurs in both
/// operands.
pub fn intersect(left: &TupleList, right: &TupleList, all: bool) -> TupleList {
    let mut counts: IndexMap<&Tuple, usize> = IndexMap::new();
    for tuple in right.iter() {
        *counts.entry(tuple).or_default() += 1;
    }
    let mut result = TupleList::new(left.arity());
    for tuple in left.iter() {
        if let Some(count) = counts.get_mut(tuple) {
            if *count > 0 {
                result.push(tuple.clone());
                if all {
                    *count -= 1;
                }
            }
        }
    }
    if !all {
        result.dedup_in_place();
    }
    result
}

/// `Except`: left tuples that do not occur in `right`
pub fn except(left: &TupleList, right: &TupleList, all: bool) -> TupleList {
    let excluded: HashSet<&Tuple> = right.iter().collect();
    let mut result = TupleList::new(left.arity());
    for tuple in left.iter() {
        if !excluded.contains(tuple) {
            result.push(tuple.clone());
        }
    }
    if !all {
        result.dedup_in_place();
    }
    result
}

/// Concatenate two tuples, refusing a hierarchy that appears in both
pub fn join_tuples(
    function: &str,
    schema: &dyn SchemaReader,
    left: &Tuple,
    right: &Tuple,
) -> EvalResult<Tuple> {
    for member in right {
        if left.iter().any(|m| m.hierarchy() == member.hierarchy()) {
            return Err(EvalError::DuplicateHierarchy {
                function: function.to_string(),
                hierarchy: schema.hierarchy_unique_name(member.hierarchy()).to_string(),
            });
        }
    }
    let mut joined = left.clone();
    joined.extend(right.iter().cloned());
    Ok(joined)
}

/// Cartesian product, left-major
pub fn crossjoin(
    schema: &dyn SchemaReader,
    left: &TupleList,
    right: &TupleList,
) -> EvalResult<TupleList> {
    let mut result =
        TupleList::with_capacity(left.arity() + right.arity(), left.len() * right.len());
    for l in left.iter() {
        for r in right.iter() {
            result.push(join_tuples("Crossjoin", schema, l, r)?);
        }
    }
    Ok(result)
}

/// Project every tuple onto `hierarchies`, dropping repeats
pub fn extract(list: &TupleList, hierarchies: &[HierarchyId]) -> TupleList {
    let mut result = TupleList::new(hierarchies.len());
    for tuple in list.iter() {
        let projected: Tuple = hierarchies
            .iter()
            .filter_map(|h| tuple.iter().find(|m| m.hierarchy() == *h).cloned())
            .collect();
        if projected.len() == hierarchies.len() {
            result.push(projected);
        }
    }
    result.dedup_in_place();
    result
}

pub fn head(list: &TupleList, count: usize) -> TupleList {
    let take = count.min(list.len());
    TupleList::from_tuples(list.arity(), list.tuples()[..take].to_vec())
}

pub fn tail(list: &TupleList, count: usize) -> TupleList {
    let skip = list.len().saturating_sub(count);
    TupleList::from_tuples(list.arity(), list.tuples()[skip..].to_vec())
}

/// `count` tuples starting at zero-based `start`; all the rest when `count`
/// is omitted
pub fn subset(list: &TupleList, start: usize, count: Option<usize>) -> TupleList {
    let start = start.min(list.len());
    let end = match count {
        Some(count) => start.saturating_add(count).min(list.len()),
        None => list.len(),
    };
    TupleList::from_tuples(list.arity(), list.tuples()[start..end].to_vec())
}

/// Hierarchical sort key of a member: sibling positions from the root,
/// with `post` placing each member after its descendants
fn member_key(schema: &dyn SchemaReader, member: &Member, post: bool) -> Vec<u32> {
    let mut path: Vec<u32> = schema.hierarchy_path(member).into_iter().collect();
    if post {
        path.push(u32::MAX);
    }
    path
}

/// Put members in hierarchical order, position by position
///
/// The sort is stable so equal tuples keep their relative order.
pub fn hierarchize(schema: &dyn SchemaReader, list: TupleList, post: bool) -> TupleList {
    let arity = list.arity();
    let mut keyed: Vec<(Vec<Vec<u32>>, Tuple)> = list
        .into_tuples()
        .into_iter()
        .map(|t| {
            let key = t.iter().map(|m| member_key(schema, m, post)).collect();
            (key, t)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    TupleList::from_tuples(arity, keyed.into_iter().map(|(_, t)| t).collect())
}

/// Tuples of `list` with every member on one ancestor chain with the
/// member of the same hierarchy in some tuple of `filter`
pub fn exists(schema: &dyn SchemaReader, list: &TupleList, filter: &TupleList) -> TupleList {
    let mut result = TupleList::new(list.arity());
    for tuple in list.iter() {
        if filter.iter().any(|f| related(schema, tuple, f)) {
            result.push(tuple.clone());
        }
    }
    result
}

/// Do the shared hierarchies of two tuples agree up to ancestry?
pub fn related(schema: &dyn SchemaReader, tuple: &[Member], filter: &[Member]) -> bool {
    tuple.iter().all(|member| {
        filter
            .iter()
            .filter(|f| f.hierarchy() == member.hierarchy())
            .all(|f| {
                let a = anchor(schema, member);
                let b = anchor(schema, f);
                crate::navigation::same_chain(schema, &a, &b)
            })
    })
}

/// The nearest stored member at or above `member`
fn anchor(schema: &dyn SchemaReader, member: &Member) -> Member {
    let mut current = member.clone();
    while current.is_calculated() {
        let Some(parent) = schema.parent(&current) else {
            return schema
                .all_member(member.hierarchy())
                .unwrap_or_else(|| member.clone());
        };
        current = parent;
    }
    current
}
