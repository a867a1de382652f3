//! Sorting, ranking and top/bottom selection

use super::{Iteration, arg, has_null, optional_arg, to_count};
use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::navigation as nav;
use crate::set_ops;
use crate::value::{Tuple, TupleList, Value, sort_compare, tuple_of};
use cubeql_model::{Member, SchemaReader};
use cubeql_types::Builtin;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::ControlFlow;

/// One `Order` key direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Direction {
    descending: bool,
    /// Sort siblings within their parent instead of the flattened set
    hierarchical: bool,
}

impl Direction {
    const ASC: Direction = Direction {
        descending: false,
        hierarchical: false,
    };

    fn parse(keyword: &str) -> Option<Self> {
        let (descending, hierarchical) = match keyword {
            "ASC" => (false, false),
            "DESC" => (true, false),
            "BASC" => (false, true),
            "BDESC" => (true, true),
            _ => return None,
        };
        Some(Self {
            descending,
            hierarchical,
        })
    }
}

/// How much of a sorted set `Top*`/`Bottom*` keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Take {
    Count,
    Percent,
    Sum,
}

/// An element with its keys at every node of its ancestor chain, root first
struct ChainRow {
    tuple: Tuple,
    chain: Vec<(Member, Vec<Value>)>,
}

impl Compiler {
    pub(crate) fn compile_ordering(
        &mut self,
        site: &CallSite<'_>,
        args: Vec<CompiledUnit>,
    ) -> CompiledUnit {
        let schema = self.schema().clone();
        let ty = site.ty.clone();

        match site.builtin() {
            Builtin::Order => {
                let iteration = Iteration::new(site, 0, arg(&args, 0));
                let mut keys = Vec::new();
                let mut directions = Vec::new();
                for (index, key) in args.iter().enumerate().skip(1).step_by(2) {
                    let direction = site
                        .symbol(index + 1)
                        .and_then(|s| Direction::parse(&s))
                        .unwrap_or(Direction::ASC);
                    keys.push(key.clone());
                    directions.push(direction);
                }
                // One B-prefixed key makes the whole sort hierarchical
                let hierarchical = directions.iter().any(|d| d.hierarchical);

                CompiledUnit::mutable_list(ty, move |ctx| {
                    let mut rows: Vec<(Tuple, Vec<Value>)> = Vec::new();
                    iteration.for_each(ctx, |ctx, tuple, ordinal| {
                        let values =
                            iteration.bind(ctx, tuple, ordinal, |ctx| key_values(ctx, &keys))?;
                        rows.push((tuple.clone(), values));
                        Ok(ControlFlow::Continue(()))
                    })?;

                    let arity = iteration.arity();
                    if !hierarchical {
                        rows.sort_by(|a, b| compare_keys(&a.1, &b.1, &directions));
                        return Ok(TupleList::from_tuples(
                            arity,
                            rows.into_iter().map(|(t, _)| t).collect(),
                        ));
                    }

                    let mut chained = chain_rows(ctx, schema.as_ref(), rows, &keys)?;
                    let first_seen = group_ordinals(&chained);
                    chained.sort_by(|a, b| compare_chains(a, b, &directions, &first_seen));
                    Ok(TupleList::from_tuples(
                        arity,
                        chained.into_iter().map(|row| row.tuple).collect(),
                    ))
                })
            }

            Builtin::Rank => {
                let target = arg(&args, 0);
                let iteration = Iteration::new(site, 1, arg(&args, 1));
                let key = optional_arg(&args, 2);
                CompiledUnit::value(ty, move |ctx| {
                    let tuple = match target.evaluate(ctx)? {
                        Value::Member(m) => tuple_of(m),
                        Value::Tuple(t) => t,
                        Value::Null | Value::Empty => return Ok(Value::Null),
                        other => {
                            return Err(EvalError::type_mismatch("Tuple", other.type_name()));
                        }
                    };
                    if tuple.is_empty() || has_null(&tuple) {
                        return Ok(Value::Null);
                    }
                    let list = iteration.list(ctx)?;
                    if list.is_empty() {
                        return Ok(Value::Number(1.0));
                    }
                    let Some(position) = list.iter().position(|t| *t == tuple) else {
                        return Ok(Value::Number(0.0));
                    };
                    let Some(key) = &key else {
                        return Ok(Value::Number((position + 1) as f64));
                    };

                    let mut values = Vec::with_capacity(list.len());
                    for (ordinal, element) in list.iter().enumerate() {
                        ctx.poll()?;
                        values.push(iteration.bind(ctx, element, ordinal, |ctx| key.evaluate(ctx))?);
                    }
                    let own = &values[position];
                    let ahead = values
                        .iter()
                        .filter(|v| sort_compare(v, own) == Ordering::Greater)
                        .count();
                    Ok(Value::Number((ahead + 1) as f64))
                })
            }

            Builtin::TopCount
            | Builtin::BottomCount
            | Builtin::TopPercent
            | Builtin::BottomPercent
            | Builtin::TopSum
            | Builtin::BottomSum => {
                let builtin = site.builtin();
                let top = matches!(
                    builtin,
                    Builtin::TopCount | Builtin::TopPercent | Builtin::TopSum
                );
                let take = match builtin {
                    Builtin::TopCount | Builtin::BottomCount => Take::Count,
                    Builtin::TopPercent | Builtin::BottomPercent => Take::Percent,
                    _ => Take::Sum,
                };
                let iteration = Iteration::new(site, 0, arg(&args, 0));
                let amount = arg(&args, 1);
                let key = optional_arg(&args, 2);

                CompiledUnit::mutable_list(ty, move |ctx| {
                    let amount = amount.evaluate_number(ctx)?.unwrap_or(0.0);
                    let Some(key) = &key else {
                        let list = iteration.list(ctx)?;
                        let count = to_count(amount);
                        return Ok(if top {
                            set_ops::head(&list, count)
                        } else {
                            set_ops::tail(&list, count)
                        });
                    };
                    let mut rows = iteration.values(ctx, key)?;
                    rows.sort_by(|a, b| {
                        let ordering = sort_compare(&a.1, &b.1);
                        if top { ordering.reverse() } else { ordering }
                    });
                    Ok(select(iteration.arity(), rows, take, amount))
                })
            }

            other => CompiledUnit::failing(
                ty,
                EvalError::internal(format!("{:?} is not an ordering function", other)),
            ),
        }
    }
}

fn key_values(ctx: &mut EvaluationContext, keys: &[CompiledUnit]) -> EvalResult<Vec<Value>> {
    keys.iter().map(|k| k.evaluate(ctx)).collect()
}

fn compare_keys(a: &[Value], b: &[Value], directions: &[Direction]) -> Ordering {
    for ((x, y), direction) in a.iter().zip(b).zip(directions) {
        let ordering = sort_compare(x, y);
        let ordering = if direction.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Attach key values for every ancestor of each element's first member
///
/// Ancestors are probed with the element's other members in place and
/// each probe is evaluated once.
fn chain_rows(
    ctx: &mut EvaluationContext,
    schema: &dyn SchemaReader,
    rows: Vec<(Tuple, Vec<Value>)>,
    keys: &[CompiledUnit],
) -> EvalResult<Vec<ChainRow>> {
    let mut memo: HashMap<Tuple, Vec<Value>> = HashMap::new();
    let mut result = Vec::with_capacity(rows.len());
    for (tuple, own) in rows {
        let Some(first) = tuple.first().cloned() else {
            result.push(ChainRow {
                tuple,
                chain: Vec::new(),
            });
            continue;
        };
        let mut ancestors = nav::ascendants(schema, &first);
        ancestors.reverse();
        let mut chain = Vec::with_capacity(ancestors.len());
        for node in ancestors {
            if node == first {
                chain.push((node, own.clone()));
                continue;
            }
            let mut probe = tuple.clone();
            probe[0] = node.clone();
            let values = match memo.get(&probe) {
                Some(values) => values.clone(),
                None => {
                    ctx.poll()?;
                    let values = ctx.with_tuple(&probe, |ctx| key_values(ctx, keys))?;
                    memo.insert(probe, values.clone());
                    values
                }
            };
            chain.push((node, values));
        }
        result.push(ChainRow { tuple, chain });
    }
    Ok(result)
}

/// Input position of the first element under each chain node
fn group_ordinals(rows: &[ChainRow]) -> HashMap<Member, usize> {
    let mut first_seen = HashMap::new();
    for (ordinal, row) in rows.iter().enumerate() {
        for (node, _) in &row.chain {
            first_seen.entry(node.clone()).or_insert(ordinal);
        }
    }
    first_seen
}

/// Groups stay together: the first differing ancestor decides, and an
/// ancestor comes before its descendants. Groups with equal keys keep the
/// order in which they first appear.
fn compare_chains(
    a: &ChainRow,
    b: &ChainRow,
    directions: &[Direction],
    first_seen: &HashMap<Member, usize>,
) -> Ordering {
    for ((ma, ka), (mb, kb)) in a.chain.iter().zip(&b.chain) {
        if ma == mb {
            continue;
        }
        return compare_keys(ka, kb, directions)
            .then_with(|| first_seen.get(ma).cmp(&first_seen.get(mb)));
    }
    a.chain.len().cmp(&b.chain.len())
}

/// Prefix of sorted rows by count, share of the total, or running sum
fn select(arity: usize, rows: Vec<(Tuple, Value)>, take: Take, amount: f64) -> TupleList {
    let mut result = TupleList::new(arity);
    let threshold = match take {
        Take::Count => {
            for (tuple, _) in rows.into_iter().take(to_count(amount)) {
                result.push(tuple);
            }
            return result;
        }
        Take::Percent => {
            let total: f64 = rows.iter().filter_map(|(_, v)| v.as_number()).sum();
            total * amount / 100.0
        }
        Take::Sum => amount,
    };
    let mut running = 0.0;
    for (tuple, value) in rows {
        if running >= threshold {
            break;
        }
        running += value.as_number().unwrap_or(0.0);
        result.push(tuple);
    }
    result
}
