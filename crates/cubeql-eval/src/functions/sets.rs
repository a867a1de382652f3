//! Set construction and set algebra

use super::{Iteration, arg, has_null, optional_arg, to_count};
use crate::compiler::{CallSite, CompiledUnit, Compiler, TupleSink};
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::set_ops;
use crate::value::{Tuple, TupleList, Value, tuple_of};
use cubeql_model::{HierarchyId, SchemaReader};
use cubeql_types::{Builtin, OlapType};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

impl Compiler {
    pub(crate) fn compile_set(&mut self, site: &CallSite<'_>, args: Vec<CompiledUnit>) -> CompiledUnit {
        let schema = self.schema().clone();
        let ty = site.ty.clone();

        match site.builtin() {
            Builtin::SetConstructor => compile_braces(site, args),
            Builtin::TupleConstructor => CompiledUnit::value(ty, move |ctx| {
                let mut tuple = Tuple::new();
                for item in &args {
                    tuple.extend(item.evaluate_tuple(ctx)?);
                }
                Ok(Value::Tuple(tuple))
            }),
            Builtin::Crossjoin => compile_crossjoin(site, schema, args),

            Builtin::Union | Builtin::Intersect | Builtin::Except => {
                let all = site.symbol(2).as_deref() == Some("ALL");
                let builtin = site.builtin();
                let (left, right) = (arg(&args, 0), arg(&args, 1));
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let l = left.evaluate_list(ctx)?;
                    let r = right.evaluate_list(ctx)?;
                    Ok(match builtin {
                        Builtin::Union => set_ops::union(&l, &r, all),
                        Builtin::Intersect => set_ops::intersect(&l, &r, all),
                        _ => set_ops::except(&l, &r, all),
                    })
                })
            }

            Builtin::Distinct => {
                let set = arg(&args, 0);
                CompiledUnit::iterable(ty, move |ctx, sink| {
                    let mut seen: HashSet<Tuple> = HashSet::new();
                    set.for_each(ctx, &mut |ctx, tuple| {
                        if seen.insert(tuple.clone()) {
                            sink(ctx, tuple)
                        } else {
                            Ok(ControlFlow::Continue(()))
                        }
                    })
                })
            }

            Builtin::Extract => {
                let set = arg(&args, 0);
                let hierarchies: Vec<CompiledUnit> = args.iter().skip(1).cloned().collect();
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let list = set.evaluate_list(ctx)?;
                    let wanted = hierarchies
                        .iter()
                        .map(|h| h.evaluate_hierarchy(ctx))
                        .collect::<EvalResult<Vec<HierarchyId>>>()?;
                    Ok(set_ops::extract(&list, &wanted))
                })
            }

            Builtin::Head | Builtin::Tail => {
                let set = arg(&args, 0);
                let count = optional_arg(&args, 1);
                let head = site.builtin() == Builtin::Head;
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let n = match &count {
                        Some(unit) => to_count(unit.evaluate_number(ctx)?.unwrap_or(0.0)),
                        None => 1,
                    };
                    let list = set.evaluate_list(ctx)?;
                    Ok(if head {
                        set_ops::head(&list, n)
                    } else {
                        set_ops::tail(&list, n)
                    })
                })
            }

            Builtin::Subset => {
                let set = arg(&args, 0);
                let start = arg(&args, 1);
                let count = optional_arg(&args, 2);
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let from = to_count(start.evaluate_number(ctx)?.unwrap_or(0.0));
                    let n = match &count {
                        Some(unit) => Some(to_count(unit.evaluate_number(ctx)?.unwrap_or(0.0))),
                        None => None,
                    };
                    let list = set.evaluate_list(ctx)?;
                    Ok(set_ops::subset(&list, from, n))
                })
            }

            Builtin::Filter => {
                let iteration = Iteration::new(site, 0, arg(&args, 0));
                let condition = arg(&args, 1);
                CompiledUnit::iterable(ty, move |ctx, sink| {
                    iteration.for_each(ctx, |ctx, tuple, ordinal| {
                        let keep = iteration.bind(ctx, tuple, ordinal, |ctx| {
                            condition.evaluate_boolean(ctx)
                        })?;
                        if keep == Some(true) {
                            sink(ctx, tuple)
                        } else {
                            Ok(ControlFlow::Continue(()))
                        }
                    })
                })
            }

            Builtin::Generate => {
                let iteration = Iteration::new(site, 0, arg(&args, 0));
                let body = arg(&args, 1);
                let all = site.symbol(2).as_deref() == Some("ALL");
                CompiledUnit::iterable(ty, move |ctx, sink| {
                    let mut seen: HashSet<Tuple> = HashSet::new();
                    iteration.for_each(ctx, |ctx, tuple, ordinal| {
                        let produced =
                            iteration.bind(ctx, tuple, ordinal, |ctx| body.evaluate_list(ctx))?;
                        for item in produced.iter() {
                            if !all && !seen.insert(item.clone()) {
                                continue;
                            }
                            if sink(ctx, item)?.is_break() {
                                return Ok(ControlFlow::Break(()));
                            }
                        }
                        Ok(ControlFlow::Continue(()))
                    })
                })
            }

            Builtin::GenerateString => {
                let iteration = Iteration::new(site, 0, arg(&args, 0));
                let body = arg(&args, 1);
                let delimiter = optional_arg(&args, 2);
                CompiledUnit::value(ty, move |ctx| {
                    let separator = match &delimiter {
                        Some(unit) => unit.evaluate_string(ctx)?.unwrap_or_default(),
                        None => String::new(),
                    };
                    let mut parts = Vec::new();
                    iteration.for_each(ctx, |ctx, tuple, ordinal| {
                        let part =
                            iteration.bind(ctx, tuple, ordinal, |ctx| body.evaluate_string(ctx))?;
                        parts.push(part.unwrap_or_default());
                        Ok(ControlFlow::Continue(()))
                    })?;
                    Ok(Value::String(parts.join(&separator)))
                })
            }

            Builtin::Hierarchize => {
                let set = arg(&args, 0);
                let post = site.symbol(1).as_deref() == Some("POST");
                CompiledUnit::mutable_list(ty, move |ctx| {
                    let list = set.evaluate_mutable(ctx)?;
                    Ok(set_ops::hierarchize(schema.as_ref(), list, post))
                })
            }

            // Order is never guaranteed, so the input is already an answer
            Builtin::Unorder => {
                let mut unit = arg(&args, 0);
                unit.result_type = ty;
                unit
            }

            Builtin::Count => {
                let iteration = Iteration::new(site, 0, arg(&args, 0));
                let exclude_empty = site.symbol(1).as_deref() == Some("EXCLUDEEMPTY");
                CompiledUnit::value(ty, move |ctx| {
                    if !exclude_empty {
                        return Ok(Value::Number(iteration.list(ctx)?.len() as f64));
                    }
                    let mut count = 0usize;
                    iteration.for_each(ctx, |ctx, tuple, ordinal| {
                        let cell = iteration.bind(ctx, tuple, ordinal, EvaluationContext::evaluate_cell)?;
                        if !cell.is_absent() {
                            count += 1;
                        }
                        Ok(ControlFlow::Continue(()))
                    })?;
                    Ok(Value::Number(count as f64))
                })
            }

            other => CompiledUnit::failing(
                ty,
                EvalError::internal(format!("{:?} is not a set function", other)),
            ),
        }
    }
}

/// `{a, b, ...}`: members, tuples and sets appended in order, duplicates
/// kept; null members and tuples containing one are skipped
fn compile_braces(site: &CallSite<'_>, args: Vec<CompiledUnit>) -> CompiledUnit {
    let arity = site.ty.arity().max(1);
    let items: Vec<(CompiledUnit, bool)> = args
        .into_iter()
        .map(|unit| {
            let is_set = matches!(unit.result_type, OlapType::Set(_));
            (unit, is_set)
        })
        .collect();
    CompiledUnit::mutable_list(site.ty.clone(), move |ctx| {
        let mut result = TupleList::new(arity);
        for (item, is_set) in &items {
            if *is_set {
                let list = item.evaluate_list(ctx)?;
                result.tuples_mut().extend(list.iter().cloned());
                continue;
            }
            let tuple = match item.evaluate(ctx)? {
                Value::Member(m) => tuple_of(m),
                Value::Tuple(t) => t,
                Value::Null | Value::Empty => continue,
                other => return Err(EvalError::type_mismatch("Member or Tuple", other.type_name())),
            };
            if !has_null(&tuple) {
                result.push(tuple);
            }
        }
        Ok(result)
    })
}

/// Crossjoin of two or more sets, streamed left-major
///
/// Hierarchies known from the argument types are checked up front so a
/// shared hierarchy fails even when an input is empty.
fn compile_crossjoin(
    site: &CallSite<'_>,
    schema: Arc<dyn SchemaReader>,
    args: Vec<CompiledUnit>,
) -> CompiledUnit {
    let mut seen: Vec<HierarchyId> = Vec::new();
    for index in 0..site.args.len() {
        let Some(ty) = site.arg_type(index) else {
            continue;
        };
        for hierarchy in ty.hierarchies().into_iter().flatten() {
            if seen.contains(&hierarchy) {
                return CompiledUnit::failing(
                    site.ty.clone(),
                    EvalError::DuplicateHierarchy {
                        function: site.name().to_string(),
                        hierarchy: schema.hierarchy_unique_name(hierarchy).to_string(),
                    },
                );
            }
            seen.push(hierarchy);
        }
    }

    let first = arg(&args, 0);
    let rest: Vec<CompiledUnit> = args.iter().skip(1).cloned().collect();
    CompiledUnit::iterable(site.ty.clone(), move |ctx, sink| {
        let rights = rest
            .iter()
            .map(|unit| unit.evaluate_list(ctx))
            .collect::<EvalResult<Vec<_>>>()?;
        if rights.iter().any(|list| list.is_empty()) {
            return Ok(());
        }
        first.for_each(ctx, &mut |ctx, tuple| {
            ctx.poll()?;
            product(ctx, schema.as_ref(), tuple, &rights, sink)
        })
    })
}

fn product(
    ctx: &mut EvaluationContext,
    schema: &dyn SchemaReader,
    prefix: &Tuple,
    rights: &[Arc<TupleList>],
    sink: &mut TupleSink<'_>,
) -> EvalResult<ControlFlow<()>> {
    let Some((next, rest)) = rights.split_first() else {
        return sink(ctx, prefix);
    };
    for tuple in next.iter() {
        let joined = set_ops::join_tuples("Crossjoin", schema, prefix, tuple)?;
        if product(ctx, schema, &joined, rest, sink)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use crate::error::EvalError;
    use cubeql_ast::Expression as E;
    use cubeql_types::Category;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn children(f: &Fixture, name: &str) -> E {
        E::property("Children", f.member(name))
    }

    #[test]
    fn test_braces_keep_duplicates_and_skip_nulls() {
        let f = Fixture::new();
        let ca = f.member("[Store].[USA].[CA]");
        let null = E::property("Parent", f.member("[Store].[All Stores]"));
        let expr = E::braces(vec![ca.clone(), null, ca]);
        assert_eq!(
            f.names(&expr),
            vec!["[Store].[USA].[CA]", "[Store].[USA].[CA]"]
        );
    }

    #[test]
    fn test_crossjoin_is_left_major() {
        let f = Fixture::new();
        let expr = E::function(
            "Crossjoin",
            vec![
                children(&f, "[Store].[USA].[CA]"),
                E::braces(vec![f.member("[Product].[Drink]"), f.member("[Product].[Food]")]),
            ],
        );
        assert_eq!(
            f.names(&expr),
            vec![
                "[Store].[USA].[CA].[LA] x [Product].[Drink]",
                "[Store].[USA].[CA].[LA] x [Product].[Food]",
                "[Store].[USA].[CA].[SF] x [Product].[Drink]",
                "[Store].[USA].[CA].[SF] x [Product].[Food]",
            ]
        );
    }

    #[test]
    fn test_crossjoin_shared_hierarchy_fails_even_when_empty() {
        let f = Fixture::new();
        let empty = E::function("Head", vec![children(&f, "[Store].[USA]"), E::number(0.0)]);
        let expr = E::function("Crossjoin", vec![empty, children(&f, "[Store].[USA].[CA]")]);
        let err = f.eval(&expr, Category::Set).unwrap_err();
        assert!(matches!(err, EvalError::DuplicateHierarchy { .. }));
    }

    #[rstest]
    #[case("Union", false, 4)]
    #[case("Union", true, 5)]
    #[case("Intersect", false, 1)]
    #[case("Except", false, 2)]
    fn test_set_algebra(#[case] function: &str, #[case] all: bool, #[case] expected: usize) {
        let f = Fixture::new();
        let left = children(&f, "[Store].[USA]");
        let right = E::braces(vec![
            f.member("[Store].[USA].[WA]"),
            f.member("[Store].[Mexico]"),
        ]);
        let mut args = vec![left, right];
        if all {
            args.push(E::symbol("ALL"));
        }
        assert_eq!(f.names(&E::function(function, args)).len(), expected);
    }

    #[test]
    fn test_head_tail_subset() {
        let f = Fixture::new();
        let states = children(&f, "[Store].[USA]");
        assert_eq!(
            f.names(&E::function("Head", vec![states.clone()])),
            vec!["[Store].[USA].[CA]"]
        );
        assert_eq!(
            f.names(&E::function("Tail", vec![states.clone(), E::number(2.0)])),
            vec!["[Store].[USA].[OR]", "[Store].[USA].[WA]"]
        );
        assert_eq!(
            f.names(&E::function("Subset", vec![states, E::number(1.0), E::number(1.0)])),
            vec!["[Store].[USA].[OR]"]
        );
    }

    #[test]
    fn test_filter_on_cell_values() {
        let f = Fixture::new();
        let cities = E::property("Members", f.level("[Store].[City]"));
        let sales = f.member("[Measures].[Unit Sales]");
        let condition = E::infix(">", sales, E::number(2000.0));
        let expr = E::function("Filter", vec![cities, condition]);
        assert_eq!(
            f.names(&expr),
            vec![
                "[Store].[USA].[OR].[Salem]",
                "[Store].[USA].[WA].[Seattle]",
                "[Store].[Mexico].[Mexico City]",
            ]
        );
    }

    #[test]
    fn test_generate_removes_duplicates_unless_all() {
        let f = Fixture::new();
        let states = E::braces(vec![f.member("[Store].[USA].[CA]"), f.member("[Store].[USA].[OR]")]);
        let body = E::braces(vec![f.member("[Product].[Drink]")]);
        let distinct = E::function("Generate", vec![states.clone(), body.clone()]);
        assert_eq!(f.names(&distinct), vec!["[Product].[Drink]"]);
        let all = E::function("Generate", vec![states, body, E::symbol("ALL")]);
        assert_eq!(f.names(&all).len(), 2);
    }

    #[test]
    fn test_generate_string_joins_with_delimiter() {
        let f = Fixture::new();
        let states = children(&f, "[Store].[USA]");
        let name = E::property("Name", E::property("CurrentMember", f.hierarchy("[Store]")));
        let expr = E::function("Generate", vec![states, name, E::string(", ")]);
        assert_eq!(
            f.eval(&expr, Category::String).unwrap(),
            crate::value::Value::String("CA, OR, WA".into())
        );
    }

    #[test]
    fn test_hierarchize_pre_and_post() {
        let f = Fixture::new();
        let set = E::braces(vec![
            f.member("[Store].[USA].[CA].[SF]"),
            f.member("[Store].[USA]"),
            f.member("[Store].[USA].[CA]"),
        ]);
        assert_eq!(
            f.names(&E::function("Hierarchize", vec![set.clone()])),
            vec!["[Store].[USA]", "[Store].[USA].[CA]", "[Store].[USA].[CA].[SF]"]
        );
        assert_eq!(
            f.names(&E::function("Hierarchize", vec![set, E::symbol("POST")])),
            vec!["[Store].[USA].[CA].[SF]", "[Store].[USA].[CA]", "[Store].[USA]"]
        );
    }

    #[test]
    fn test_count_forms() {
        let f = Fixture::new();
        let cities = E::property("Members", f.level("[Store].[City]"));
        assert_eq!(f.number(&E::property("Count", cities.clone())), Some(6.0));
        let nonempty = E::function("Count", vec![cities, E::symbol("EXCLUDEEMPTY")]);
        assert_eq!(f.number(&nonempty), Some(6.0));
    }

    #[test]
    fn test_extract_projects_and_dedups() {
        let f = Fixture::new();
        let cross = E::function(
            "Crossjoin",
            vec![
                children(&f, "[Store].[USA].[CA]"),
                E::braces(vec![f.member("[Product].[Drink]"), f.member("[Product].[Food]")]),
            ],
        );
        let expr = E::function("Extract", vec![cross, f.hierarchy("[Product]")]);
        assert_eq!(f.names(&expr), vec!["[Product].[Drink]", "[Product].[Food]"]);
    }
}
