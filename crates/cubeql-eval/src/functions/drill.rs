//! Visual totals, existence filters and drill operations

use super::{Iteration, arg, optional_arg};
use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::navigation as nav;
use crate::set_ops;
use crate::value::{Tuple, TupleList, tuple_of};
use cubeql_model::{CalculatedMember, Member, SchemaReader};
use cubeql_types::Builtin;
use std::collections::HashSet;
use std::ops::ControlFlow;

impl Compiler {
    pub(crate) fn compile_drill(&mut self, site: &CallSite<'_>, args: Vec<CompiledUnit>) -> CompiledUnit {
        let schema = self.schema().clone();
        let ty = site.ty.clone();
        let set = arg(&args, 0);
        let name = site.name().to_string();

        match site.builtin() {
            Builtin::VisualTotals => {
                let pattern = optional_arg(&args, 1);
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let list = set.evaluate_list(ctx)?;
                    let pattern = match &pattern {
                        Some(unit) => unit.evaluate_string(ctx)?,
                        None => None,
                    };
                    Ok(visual_totals(schema.as_ref(), &list, pattern.as_deref()))
                })
            }

            Builtin::Exists => {
                let filter = arg(&args, 1);
                let group = optional_arg(&args, 2);
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let list = set.evaluate_list(ctx)?;
                    let filter = filter.evaluate_list(ctx)?;
                    let Some(group) = &group else {
                        return Ok(set_ops::exists(schema.as_ref(), &list, &filter));
                    };
                    let group = group.evaluate_string(ctx)?.unwrap_or_default();
                    if !group.eq_ignore_ascii_case(schema.cube_name()) {
                        return Err(EvalError::invalid_argument(
                            name.clone(),
                            format!("unknown measure group '{}'", group),
                        ));
                    }
                    exists_with_data(ctx, schema.as_ref(), &list, &filter)
                })
            }

            Builtin::Existing => CompiledUnit::mutable_list(ty, move |ctx| {
                let list = set.evaluate_list(ctx)?;
                let Some(existing) = ctx.existing().cloned() else {
                    return Ok((*list).clone());
                };
                let mut result = TupleList::new(list.arity());
                for tuple in list.iter() {
                    if set_ops::related(schema.as_ref(), tuple, &existing) {
                        result.push(tuple.clone());
                    }
                }
                Ok(result)
            }),

            Builtin::NonEmpty => {
                let iteration = Iteration::new(site, 0, set);
                let filter = optional_arg(&args, 1);
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let filter = match &filter {
                        Some(unit) => Some(unit.evaluate_list(ctx)?),
                        None => None,
                    };
                    let mut result = TupleList::new(iteration.arity());
                    iteration.for_each(ctx, |ctx, tuple, ordinal| {
                        let keep = iteration.bind(ctx, tuple, ordinal, |ctx| match &filter {
                            Some(filter) => any_cell(ctx, filter),
                            None => Ok(!ctx.evaluate_cell()?.is_absent()),
                        })?;
                        if keep {
                            result.push(tuple.clone());
                        }
                        Ok(ControlFlow::Continue(()))
                    })?;
                    Ok(result)
                })
            }

            Builtin::DrilldownLevel | Builtin::DrillupLevel => {
                let level = optional_arg(&args, 1);
                let down = site.builtin() == Builtin::DrilldownLevel;
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let list = set.evaluate_list(ctx)?;
                    let (position, depth) = match &level {
                        Some(unit) => {
                            let level = unit.evaluate_level(ctx)?;
                            let position = list
                                .get(0)
                                .and_then(|t| t.iter().position(|m| m.hierarchy() == level.hierarchy));
                            let Some(position) = position else {
                                return Ok((*list).clone());
                            };
                            (position, i32::from(level.depth))
                        }
                        None => {
                            let deepest = list
                                .iter()
                                .filter_map(|t| t.first())
                                .map(|m| schema.depth(m))
                                .max();
                            let Some(deepest) = deepest else {
                                return Ok((*list).clone());
                            };
                            (0, if down { deepest } else { deepest - 1 })
                        }
                    };
                    Ok(if down {
                        drilldown_level(schema.as_ref(), &list, position, depth)
                    } else {
                        drillup_level(schema.as_ref(), &list, position, depth)
                    })
                })
            }

            Builtin::DrilldownMember => {
                let targets = arg(&args, 1);
                let recursive = site.symbol(2).as_deref() == Some("RECURSIVE");
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let list = set.evaluate_list(ctx)?;
                    let targets: HashSet<Member> =
                        targets.evaluate_list(ctx)?.members().cloned().collect();
                    let mut result = TupleList::new(list.arity());
                    for tuple in list.iter() {
                        ctx.poll()?;
                        drilldown_member(schema.as_ref(), tuple, &targets, recursive, &mut result);
                    }
                    Ok(result)
                })
            }

            Builtin::DrillupMember => {
                let targets = arg(&args, 1);
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let list = set.evaluate_list(ctx)?;
                    let present: HashSet<&Member> = list.members().collect();
                    let targets: Vec<Member> = targets
                        .evaluate_list(ctx)?
                        .members()
                        .filter(|m| present.contains(m))
                        .cloned()
                        .collect();
                    let mut result = TupleList::new(list.arity());
                    for tuple in list.iter() {
                        let collapsed = tuple.iter().any(|m| {
                            targets.iter().any(|t| nav::is_ancestor(schema.as_ref(), t, m))
                        });
                        if !collapsed {
                            result.push(tuple.clone());
                        }
                    }
                    Ok(result)
                })
            }

            Builtin::AddCalculatedMembers => CompiledUnit::mutable_list(ty, move |ctx| {
                let mut result = set.evaluate_mutable(ctx)?;
                if result.arity() != 1 {
                    return Ok(result);
                }
                let levels: HashSet<_> = result
                    .members()
                    .filter_map(|m| schema.member_level(m))
                    .collect();
                let extra: Vec<Member> = ctx
                    .calculated_members()
                    .iter()
                    .filter(|m| schema.member_level(m).is_some_and(|l| levels.contains(&l)))
                    .filter(|m| !result.members().any(|r| r == *m))
                    .cloned()
                    .collect();
                for member in extra {
                    result.push(tuple_of(member));
                }
                Ok(result)
            }),

            Builtin::StripCalculatedMembers => CompiledUnit::mutable_list(ty, move |ctx| {
                let mut result = set.evaluate_mutable(ctx)?;
                result
                    .tuples_mut()
                    .retain(|t| !t.iter().any(Member::is_calculated));
                Ok(result)
            }),

            other => CompiledUnit::failing(
                ty,
                EvalError::internal(format!("{:?} is not a drill function", other)),
            ),
        }
    }
}

/// Is any cell non-empty with one of `filter`'s tuples laid over the context?
fn any_cell(ctx: &mut EvaluationContext, filter: &TupleList) -> EvalResult<bool> {
    for tuple in filter.iter() {
        if !ctx.with_tuple(tuple, EvaluationContext::evaluate_cell)?.is_absent() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `Exists` with a measure group: related tuples that also have data
fn exists_with_data(
    ctx: &mut EvaluationContext,
    schema: &dyn SchemaReader,
    list: &TupleList,
    filter: &TupleList,
) -> EvalResult<TupleList> {
    let mut result = TupleList::new(list.arity());
    for tuple in list.iter() {
        ctx.poll()?;
        let mut keep = false;
        for f in filter.iter() {
            if !set_ops::related(schema, tuple, f) {
                continue;
            }
            let probe: Vec<Member> = f.iter().chain(tuple.iter()).cloned().collect();
            if !ctx.with_tuple(&probe, EvaluationContext::evaluate_cell)?.is_absent() {
                keep = true;
                break;
            }
        }
        if keep {
            result.push(tuple.clone());
        }
    }
    Ok(result)
}

/// Replace each member followed by a run of its descendants with a total
/// of that run
///
/// Only the visually adjacent descendants count, and a nested total rolls
/// up the totals beneath it, so the list is processed right to left.
pub(crate) fn visual_totals(
    schema: &dyn SchemaReader,
    list: &TupleList,
    pattern: Option<&str>,
) -> TupleList {
    let tuples = list.tuples();
    let mut replaced: Vec<Tuple> = tuples.to_vec();
    if list.arity() == 0 {
        return list.clone();
    }
    for i in (0..tuples.len()).rev() {
        let covers = |j: usize| {
            tuples[i][1..] == tuples[j][1..]
                && nav::is_ancestor(schema, &tuples[i][0], &tuples[j][0])
        };
        let run_end = (i + 1..tuples.len()).find(|j| !covers(*j)).unwrap_or(tuples.len());
        if run_end == i + 1 {
            continue;
        }

        // Members of the run not already under an earlier member of the run
        let mut summands = Vec::new();
        for j in i + 1..run_end {
            let nested = (i + 1..j).any(|k| nav::is_ancestor(schema, &tuples[k][0], &tuples[j][0]));
            if !nested {
                summands.push(replaced[j][0].clone());
            }
        }

        let member = &tuples[i][0];
        let Some(level) = schema.member_level(member) else {
            continue;
        };
        let caption = match pattern {
            Some(p) => p.replace('*', schema.member_caption(member)),
            None => schema.member_caption(member).to_string(),
        };
        let total = CalculatedMember::aggregate(
            level,
            schema.member_name(member),
            schema.member_unique_name(member),
            summands,
        )
        .with_parent(schema.parent(member))
        .with_caption(caption);
        replaced[i][0] = Member::from(total);
    }
    TupleList::from_tuples(list.arity(), replaced)
}

/// Insert the children of every member at `depth` right after it
fn drilldown_level(
    schema: &dyn SchemaReader,
    list: &TupleList,
    position: usize,
    depth: i32,
) -> TupleList {
    let mut result = TupleList::new(list.arity());
    for tuple in list.iter() {
        result.push(tuple.clone());
        let Some(member) = tuple.get(position) else {
            continue;
        };
        if schema.depth(member) != depth {
            continue;
        }
        for child in schema.children(member) {
            let mut drilled = tuple.clone();
            drilled[position] = child;
            result.push(drilled);
        }
    }
    result
}

/// Drop every tuple whose member sits below `depth`
fn drillup_level(
    schema: &dyn SchemaReader,
    list: &TupleList,
    position: usize,
    depth: i32,
) -> TupleList {
    let mut result = TupleList::new(list.arity());
    for tuple in list.iter() {
        let keep = tuple.get(position).is_none_or(|m| schema.depth(m) <= depth);
        if keep {
            result.push(tuple.clone());
        }
    }
    result
}

fn drilldown_member(
    schema: &dyn SchemaReader,
    tuple: &Tuple,
    targets: &HashSet<Member>,
    recursive: bool,
    out: &mut TupleList,
) {
    out.push(tuple.clone());
    let Some(position) = tuple.iter().position(|m| targets.contains(m)) else {
        return;
    };
    for child in schema.children(&tuple[position]) {
        let mut drilled = tuple.clone();
        drilled[position] = child;
        if recursive {
            drilldown_member(schema, &drilled, targets, recursive, out);
        } else {
            out.push(drilled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use cubeql_ast::Expression as E;
    use cubeql_types::Category;
    use pretty_assertions::assert_eq;

    fn list(f: &Fixture, names: &[&str]) -> TupleList {
        TupleList::from_members(names.iter().map(|n| f.s().lookup_member(n).unwrap()))
    }

    fn aggregated(f: &Fixture, tuple: &Tuple) -> Option<Vec<String>> {
        tuple[0].calculated().and_then(|c| c.aggregated_members()).map(|members| {
            members
                .iter()
                .map(|m| f.s().member_unique_name(m).to_string())
                .collect()
        })
    }

    #[test]
    fn test_visual_totals_use_adjacent_descendants_only() {
        let f = Fixture::new();
        let input = list(
            &f,
            &[
                "[Store].[USA]",
                "[Store].[USA].[CA]",
                "[Store].[USA].[CA].[SF]",
                "[Store].[USA].[WA]",
            ],
        );
        let result = visual_totals(f.s(), &input, Some("Total *"));
        let tuples = result.tuples();
        assert_eq!(
            aggregated(&f, &tuples[0]),
            Some(vec!["[Store].[USA].[CA]".to_string(), "[Store].[USA].[WA]".to_string()])
        );
        assert_eq!(
            aggregated(&f, &tuples[1]),
            Some(vec!["[Store].[USA].[CA].[SF]".to_string()])
        );
        assert_eq!(f.s().member_caption(&tuples[0][0]), "Total USA");
        assert!(!tuples[3][0].is_calculated());
    }

    #[test]
    fn test_visual_totals_later_repeat_is_untouched() {
        let f = Fixture::new();
        let input = list(
            &f,
            &[
                "[Store].[USA]",
                "[Store].[USA].[OR]",
                "[Store].[Mexico]",
                "[Store].[USA]",
            ],
        );
        let result = visual_totals(f.s(), &input, None);
        assert!(result.tuples()[0][0].is_calculated());
        assert!(!result.tuples()[3][0].is_calculated());
    }

    #[test]
    fn test_visual_total_cell_sums_the_run() {
        let f = Fixture::new();
        let set = E::braces(vec![
            f.member("[Store].[USA].[CA]"),
            f.member("[Store].[USA].[CA].[LA]"),
        ]);
        let total = E::function("Head", vec![E::function("VisualTotals", vec![set])]);
        let value = E::property("Value", E::function("Item", vec![total, E::number(0.0)]));
        // LA alone: 1997 unit sales with store weight 1
        assert_eq!(f.number(&value), Some(720.0));
    }

    #[test]
    fn test_existing_without_filter_is_identity() {
        let f = Fixture::new();
        let states = E::property("Children", f.member("[Store].[USA]"));
        let expr = E::prefix("Existing", states);
        assert_eq!(f.names(&expr).len(), 3);
    }

    #[test]
    fn test_exists_keeps_related_tuples() {
        let f = Fixture::new();
        let cities = E::property("Members", f.level("[Store].[City]"));
        let expr = E::function("Exists", vec![cities, E::braces(vec![f.member("[Store].[USA].[OR]")])]);
        assert_eq!(
            f.names(&expr),
            vec!["[Store].[USA].[OR].[Portland]", "[Store].[USA].[OR].[Salem]"]
        );
    }

    #[test]
    fn test_non_empty_drops_empty_cells() {
        let f = Fixture::new();
        let years = E::property("Members", f.level("[Time].[Year]"));
        let expr = E::function("NonEmpty", vec![years]);
        assert_eq!(f.names(&expr), vec!["[Time].[1997]"]);
    }

    #[test]
    fn test_drilldown_and_drillup_level() {
        let f = Fixture::new();
        let countries = E::property("Members", f.level("[Store].[Country]"));
        let down = E::function("DrilldownLevel", vec![countries]);
        assert_eq!(
            f.names(&down),
            vec![
                "[Store].[USA]",
                "[Store].[USA].[CA]",
                "[Store].[USA].[OR]",
                "[Store].[USA].[WA]",
                "[Store].[Mexico]",
                "[Store].[Mexico].[Mexico City]",
            ]
        );
        let up = E::function("DrillupLevel", vec![down, f.level("[Store].[Country]")]);
        assert_eq!(f.names(&up), vec!["[Store].[USA]", "[Store].[Mexico]"]);
    }

    #[test]
    fn test_drilldown_member_recursive() {
        let f = Fixture::new();
        let set = E::braces(vec![f.member("[Store].[USA]")]);
        let targets = E::braces(vec![f.member("[Store].[USA]"), f.member("[Store].[USA].[OR]")]);
        let expr = E::function("DrilldownMember", vec![set, targets, E::symbol("RECURSIVE")]);
        assert_eq!(
            f.names(&expr),
            vec![
                "[Store].[USA]",
                "[Store].[USA].[CA]",
                "[Store].[USA].[OR]",
                "[Store].[USA].[OR].[Portland]",
                "[Store].[USA].[OR].[Salem]",
                "[Store].[USA].[WA]",
            ]
        );
    }

    #[test]
    fn test_drillup_member_collapses_descendants() {
        let f = Fixture::new();
        let set = E::braces(vec![
            f.member("[Store].[USA]"),
            f.member("[Store].[USA].[CA]"),
            f.member("[Store].[Mexico]"),
            f.member("[Store].[Mexico].[Mexico City]"),
        ]);
        let expr = E::function(
            "DrillupMember",
            vec![set, E::braces(vec![f.member("[Store].[USA]")])],
        );
        assert_eq!(
            f.names(&expr),
            vec!["[Store].[USA]", "[Store].[Mexico]", "[Store].[Mexico].[Mexico City]"]
        );
    }

    #[test]
    fn test_strip_calculated_members() {
        let f = Fixture::new();
        let set = E::function(
            "VisualTotals",
            vec![E::braces(vec![
                f.member("[Store].[USA]"),
                f.member("[Store].[USA].[CA]"),
            ])],
        );
        let expr = E::function("StripCalculatedMembers", vec![set]);
        assert_eq!(f.names(&expr), vec!["[Store].[USA].[CA]"]);
        assert!(f.eval(&expr, Category::Set).is_ok());
    }
}
