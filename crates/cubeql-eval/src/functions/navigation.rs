//! Member navigation, member sets, items and member predicates

use super::{arg, element_value, has_null, optional_arg, to_count};
use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::error::EvalError;
use crate::navigation::{self as nav, DescendantsFlag};
use crate::value::{Tuple, TupleList, Value};
use cubeql_model::Member;
use cubeql_types::{Builtin, OlapType};
use std::sync::Arc;

/// How `Descendants` picks its target depth
#[derive(Clone, Copy)]
enum DescendantsTarget {
    /// `Descendants(m)`
    Own,
    Level,
    Distance,
}

impl Compiler {
    pub(crate) fn compile_navigation(
        &mut self,
        site: &CallSite<'_>,
        args: Vec<CompiledUnit>,
    ) -> CompiledUnit {
        let schema = self.schema().clone();
        let ty = site.ty.clone();
        let a = arg(&args, 0);

        match site.builtin() {
            Builtin::Parent => member_fn(ty, a, move |m| nav::parent(schema.as_ref(), &m)),
            Builtin::FirstChild => {
                member_fn(ty, a, move |m| nav::first_child(schema.as_ref(), &m))
            }
            Builtin::LastChild => member_fn(ty, a, move |m| nav::last_child(schema.as_ref(), &m)),
            Builtin::FirstSibling => {
                member_fn(ty, a, move |m| nav::first_sibling(schema.as_ref(), &m))
            }
            Builtin::LastSibling => {
                member_fn(ty, a, move |m| nav::last_sibling(schema.as_ref(), &m))
            }
            Builtin::PrevMember => {
                member_fn(ty, a, move |m| nav::level_offset(schema.as_ref(), &m, -1))
            }
            Builtin::NextMember => {
                member_fn(ty, a, move |m| nav::level_offset(schema.as_ref(), &m, 1))
            }
            Builtin::Children => members_fn(ty, a, move |m| schema.children(&m)),
            Builtin::Siblings => members_fn(ty, a, move |m| nav::siblings(schema.as_ref(), &m)),
            Builtin::Ascendants => {
                members_fn(ty, a, move |m| nav::ascendants(schema.as_ref(), &m))
            }

            Builtin::Lag | Builtin::Lead => {
                let sign = if site.builtin() == Builtin::Lead { -1.0 } else { 1.0 };
                let n = arg(&args, 1);
                CompiledUnit::value(ty, move |ctx| {
                    let member = a.evaluate_member(ctx)?;
                    let offset = n.evaluate_number(ctx)?.unwrap_or(0.0);
                    Ok(Value::Member(nav::lag(schema.as_ref(), &member, sign * offset)))
                })
            }

            Builtin::Ancestor | Builtin::Ancestors => {
                let by_level = matches!(site.arg_type(1), Some(OlapType::Level(_)));
                let as_set = site.builtin() == Builtin::Ancestors;
                let target = arg(&args, 1);
                let ancestor = move |ctx: &mut crate::context::EvaluationContext| {
                    let member = a.evaluate_member(ctx)?;
                    if by_level {
                        let level = target.evaluate_level(ctx)?;
                        return nav::ancestor_at_level(schema.as_ref(), &member, level);
                    }
                    Ok(match target.evaluate_number(ctx)? {
                        Some(n) => nav::ancestor_by_distance(schema.as_ref(), &member, n as i64),
                        None => Member::Null(member.hierarchy()),
                    })
                };
                if as_set {
                    CompiledUnit::list(ty, move |ctx| {
                        let member = ancestor(ctx)?;
                        let members = (!member.is_null()).then_some(member);
                        Ok(Arc::new(TupleList::from_members(members)))
                    })
                } else {
                    CompiledUnit::value(ty, move |ctx| Ok(Value::Member(ancestor(ctx)?)))
                }
            }

            Builtin::Descendants => self.compile_descendants(site, args),

            Builtin::Cousin => {
                let b = arg(&args, 1);
                CompiledUnit::value(ty, move |ctx| {
                    let member = a.evaluate_member(ctx)?;
                    let ancestor = b.evaluate_member(ctx)?;
                    Ok(Value::Member(nav::cousin(schema.as_ref(), &member, &ancestor)?))
                })
            }

            Builtin::Range => {
                let b = arg(&args, 1);
                CompiledUnit::list(ty, move |ctx| {
                    let from = a.evaluate_member(ctx)?;
                    let to = b.evaluate_member(ctx)?;
                    Ok(Arc::new(TupleList::from_members(nav::range(
                        schema.as_ref(),
                        &from,
                        &to,
                    )?)))
                })
            }

            Builtin::CurrentMember => CompiledUnit::value(ty, move |ctx| {
                let hierarchy = a.evaluate_hierarchy(ctx)?;
                Ok(Value::Member(ctx.current_member(hierarchy)))
            }),
            Builtin::DefaultMember => CompiledUnit::value(ty, move |ctx| {
                let hierarchy = a.evaluate_hierarchy(ctx)?;
                Ok(Value::Member(schema.default_member(hierarchy)))
            }),

            Builtin::Members | Builtin::AllMembers => {
                let of_level = matches!(site.arg_type(0), Some(OlapType::Level(_)));
                let with_calculated = site.builtin() == Builtin::AllMembers;
                CompiledUnit::list(ty, move |ctx| {
                    let mut members = if of_level {
                        let level = a.evaluate_level(ctx)?;
                        let mut members = schema.level_members(level);
                        if with_calculated {
                            members.extend(
                                ctx.calculated_members()
                                    .iter()
                                    .filter(|m| schema.member_level(m) == Some(level))
                                    .cloned(),
                            );
                        }
                        members
                    } else {
                        let hierarchy = a.evaluate_hierarchy(ctx)?;
                        let mut members = nav::hierarchy_members(schema.as_ref(), hierarchy);
                        if with_calculated {
                            members.extend(
                                ctx.calculated_members()
                                    .iter()
                                    .filter(|m| m.hierarchy() == hierarchy)
                                    .cloned(),
                            );
                        }
                        members
                    };
                    members.dedup();
                    Ok(Arc::new(TupleList::from_members(members)))
                })
            }

            Builtin::Item => {
                let index = arg(&args, 1);
                if matches!(site.arg_type(0), Some(OlapType::Tuple(_))) {
                    return CompiledUnit::value(ty, move |ctx| {
                        let tuple = a.evaluate_tuple(ctx)?;
                        let i = index.evaluate_number(ctx)?;
                        Ok(i.filter(|n| *n >= 0.0)
                            .and_then(|n| tuple.get(n as usize).cloned())
                            .map_or(Value::Null, Value::Member))
                    });
                }
                let missing = null_element(&ty);
                CompiledUnit::value(ty, move |ctx| {
                    let list = a.evaluate_list(ctx)?;
                    let i = index.evaluate_number(ctx)?;
                    Ok(i.filter(|n| *n >= 0.0)
                        .and_then(|n| list.get(n as usize))
                        .map_or_else(|| missing.clone(), element_value))
                })
            }

            Builtin::Current | Builtin::CurrentOrdinal => {
                let Some(index) = site.named_set(0) else {
                    return site.invalid("argument must be a named set");
                };
                let ordinal = site.builtin() == Builtin::CurrentOrdinal;
                let name = site.name().to_string();
                CompiledUnit::value(ty, move |ctx| {
                    let cursor = ctx.cursor(index).ok_or_else(|| {
                        EvalError::invalid_argument(
                            name.clone(),
                            "named set is not being iterated",
                        )
                    })?;
                    Ok(if ordinal {
                        Value::Number(cursor.ordinal as f64)
                    } else {
                        element_value(&cursor.tuple)
                    })
                })
            }

            Builtin::IsLeaf => CompiledUnit::value(ty, move |ctx| {
                let member = a.evaluate_member(ctx)?;
                Ok(Value::Boolean(nav::is_leaf(schema.as_ref(), &member)))
            }),
            Builtin::IsAncestor | Builtin::IsSibling => {
                let b = arg(&args, 1);
                let sibling = site.builtin() == Builtin::IsSibling;
                CompiledUnit::value(ty, move |ctx| {
                    let first = a.evaluate_member(ctx)?;
                    let second = b.evaluate_member(ctx)?;
                    Ok(Value::Boolean(if sibling {
                        nav::is_sibling(schema.as_ref(), &first, &second)
                    } else {
                        nav::is_ancestor(schema.as_ref(), &first, &second)
                    }))
                })
            }
            Builtin::Is => {
                let b = arg(&args, 1);
                CompiledUnit::value(ty, move |ctx| {
                    let left = a.evaluate(ctx)?;
                    let right = b.evaluate(ctx)?;
                    Ok(Value::Boolean(identical(&left, &right)))
                })
            }
            Builtin::IsNull => {
                let is_tuple = matches!(site.arg_type(0), Some(OlapType::Tuple(_)));
                CompiledUnit::value(ty, move |ctx| {
                    let null = if is_tuple {
                        has_null(&a.evaluate_tuple(ctx)?)
                    } else {
                        a.evaluate_member(ctx)?.is_null()
                    };
                    Ok(Value::Boolean(null))
                })
            }

            other => CompiledUnit::failing(
                ty,
                EvalError::internal(format!("{:?} is not a navigation function", other)),
            ),
        }
    }

    fn compile_descendants(&mut self, site: &CallSite<'_>, args: Vec<CompiledUnit>) -> CompiledUnit {
        let schema = self.schema().clone();
        let source = arg(&args, 0);
        let over_set = matches!(site.arg_type(0), Some(OlapType::Set(_)));
        let target = match site.arg_type(1) {
            None => DescendantsTarget::Own,
            Some(OlapType::Level(_)) => DescendantsTarget::Level,
            Some(_) => DescendantsTarget::Distance,
        };
        let flag = match site.symbol(2) {
            Some(keyword) => match DescendantsFlag::parse(&keyword) {
                Some(flag) => flag,
                None => return site.invalid(format!("unknown flag {}", keyword)),
            },
            None if matches!(target, DescendantsTarget::Own) => DescendantsFlag::SelfBeforeAfter,
            None => DescendantsFlag::SelfOnly,
        };
        let depth_arg = optional_arg(&args, 1);
        let name = site.name().to_string();

        CompiledUnit::list(site.ty.clone(), move |ctx| {
            let members: Vec<Member> = if over_set {
                let list = source.evaluate_list(ctx)?;
                if list.arity() > 1 {
                    return Err(EvalError::invalid_argument(
                        name.clone(),
                        "set must contain members, not tuples",
                    ));
                }
                list.members().cloned().collect()
            } else {
                vec![source.evaluate_member(ctx)?]
            };

            let mut result = Vec::new();
            for member in &members {
                let schema = schema.as_ref();
                let depth = match (target, &depth_arg) {
                    (DescendantsTarget::Level, Some(unit)) => {
                        let level = unit.evaluate_level(ctx)?;
                        if level.hierarchy != member.hierarchy() && !member.is_null() {
                            return Err(EvalError::hierarchy_mismatch(
                                name.clone(),
                                format!(
                                    "{} and {}",
                                    schema.member_unique_name(member),
                                    schema.level_unique_name(level)
                                ),
                            ));
                        }
                        Some(i32::from(level.depth))
                    }
                    (DescendantsTarget::Distance, Some(unit)) => {
                        match unit.evaluate_number(ctx)? {
                            Some(n) if n < 0.0 => None,
                            Some(n) => Some(schema.depth(member).saturating_add(to_count(n) as i32)),
                            None => Some(schema.depth(member)),
                        }
                    }
                    _ => Some(schema.depth(member)),
                };
                result.extend(nav::descendants(schema, member, depth, flag));
            }
            Ok(Arc::new(TupleList::from_members(result)))
        })
    }
}

fn member_fn(
    ty: OlapType,
    source: CompiledUnit,
    f: impl Fn(Member) -> Member + Send + Sync + 'static,
) -> CompiledUnit {
    CompiledUnit::value(ty, move |ctx| {
        let member = source.evaluate_member(ctx)?;
        Ok(Value::Member(f(member)))
    })
}

fn members_fn(
    ty: OlapType,
    source: CompiledUnit,
    f: impl Fn(Member) -> Vec<Member> + Send + Sync + 'static,
) -> CompiledUnit {
    CompiledUnit::list(ty, move |ctx| {
        let member = source.evaluate_member(ctx)?;
        Ok(Arc::new(TupleList::from_members(f(member))))
    })
}

/// Value of an out-of-range `Item`: the null member, or a tuple of them
fn null_element(ty: &OlapType) -> Value {
    let hierarchies = ty.hierarchies();
    if hierarchies.is_empty() || hierarchies.iter().any(Option::is_none) {
        return Value::Null;
    }
    let tuple: Tuple = hierarchies.into_iter().flatten().map(Member::Null).collect();
    element_value(&tuple)
}

/// `IS`: object identity, with single-member tuples equal to the member
fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Member(m), Value::Tuple(t)) | (Value::Tuple(t), Value::Member(m)) => {
            t.len() == 1 && &t[0] == m
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use cubeql_ast::Expression as E;
    use cubeql_model::sample::month_name;
    use cubeql_types::Category;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("Parent", "[Store].[USA].[CA].[SF]", "[Store].[USA].[CA]")]
    #[case("FirstChild", "[Store].[USA]", "[Store].[USA].[CA]")]
    #[case("LastChild", "[Store].[USA]", "[Store].[USA].[WA]")]
    #[case("FirstSibling", "[Store].[USA].[WA]", "[Store].[USA].[CA]")]
    #[case("LastSibling", "[Store].[USA].[CA]", "[Store].[USA].[WA]")]
    #[case("NextMember", "[Store].[USA].[CA].[SF]", "[Store].[USA].[OR].[Portland]")]
    #[case("PrevMember", "[Time].[1998].[Q1]", "[Time].[1997].[Q4]")]
    fn test_member_properties(#[case] property: &str, #[case] start: &str, #[case] expected: &str) {
        let f = Fixture::new();
        let expr = E::property(property, f.member(start));
        assert_eq!(f.member_name(&expr), expected);
    }

    #[test]
    fn test_parent_of_root_is_null() {
        let f = Fixture::new();
        let expr = E::postfix(
            "IS NULL",
            E::property("Parent", f.member("[Time].[1997]")),
        );
        assert_eq!(
            f.eval(&expr, Category::Logical).unwrap(),
            crate::value::Value::Boolean(true)
        );
    }

    #[test]
    fn test_lead_is_negated_lag() {
        let f = Fixture::new();
        let ca = f.member("[Store].[USA].[CA]");
        let lead = E::method("Lead", ca.clone(), vec![E::number(2.0)]);
        assert_eq!(f.member_name(&lead), "[Store].[USA].[WA]");
        let lag = E::method("Lag", ca, vec![E::number(-2.0)]);
        assert_eq!(f.member_name(&lag), "[Store].[USA].[WA]");
    }

    #[test]
    fn test_ancestor_by_level_and_distance() {
        let f = Fixture::new();
        let sf = f.member("[Store].[USA].[CA].[SF]");
        let by_level = E::function("Ancestor", vec![sf.clone(), f.level("[Store].[Country]")]);
        assert_eq!(f.member_name(&by_level), "[Store].[USA]");
        let by_distance = E::function("Ancestor", vec![sf.clone(), E::number(2.0)]);
        assert_eq!(f.member_name(&by_distance), "[Store].[USA]");
        let ancestors = E::function("Ancestors", vec![sf, E::number(1.0)]);
        assert_eq!(f.names(&ancestors), vec!["[Store].[USA].[CA]"]);
    }

    #[test]
    fn test_ancestor_of_other_hierarchy_fails() {
        let f = Fixture::new();
        let expr = E::function(
            "Ancestor",
            vec![f.member("[Store].[USA]"), f.level("[Time].[Year]")],
        );
        let err = f.eval(&expr, Category::Member).unwrap_err();
        assert!(matches!(err, crate::error::EvalError::HierarchyMismatch { .. }));
    }

    #[test]
    fn test_descendants_at_level() {
        let f = Fixture::new();
        let expr = E::function(
            "Descendants",
            vec![f.member("[Time].[1997]"), f.level("[Time].[Month]")],
        );
        let expected: Vec<String> = (1..=12).map(|m| month_name(1997, m)).collect();
        assert_eq!(f.names(&expr), expected);
    }

    #[test]
    fn test_descendants_by_distance_with_flag() {
        let f = Fixture::new();
        let expr = E::function(
            "Descendants",
            vec![f.member("[Store].[USA]"), E::number(1.0), E::symbol("SELF_AND_AFTER")],
        );
        assert_eq!(f.names(&expr).len(), 8);

        let leaves = E::function(
            "Descendants",
            vec![f.member("[Store].[USA]"), E::number(-1.0), E::symbol("LEAVES")],
        );
        assert_eq!(f.names(&leaves).len(), 5);
    }

    #[test]
    fn test_descendants_without_level_includes_self() {
        let f = Fixture::new();
        let expr = E::function("Descendants", vec![f.member("[Store].[USA].[CA]")]);
        assert_eq!(
            f.names(&expr),
            vec![
                "[Store].[USA].[CA]",
                "[Store].[USA].[CA].[LA]",
                "[Store].[USA].[CA].[SF]",
            ]
        );
    }

    #[test]
    fn test_range_and_members() {
        let f = Fixture::new();
        let range = E::infix(
            ":",
            f.member(&month_name(1997, 11)),
            f.member(&month_name(1998, 2)),
        );
        assert_eq!(f.names(&range).len(), 4);

        let quarters = E::property("Members", f.level("[Time].[Quarter]"));
        assert_eq!(f.names(&quarters).len(), 8);
    }

    #[test]
    fn test_current_member_defaults() {
        let f = Fixture::new();
        let store = E::property("CurrentMember", f.hierarchy("[Store]"));
        assert_eq!(f.member_name(&store), "[Store].[All Stores]");
    }

    #[test]
    fn test_item_out_of_range_is_null() {
        let f = Fixture::new();
        let children = E::property("Children", f.member("[Store].[USA]"));
        let second = E::method("Item", children.clone(), vec![E::number(1.0)]);
        assert_eq!(f.member_name(&second), "[Store].[USA].[OR]");
        let missing = E::postfix("IS NULL", E::method("Item", children, vec![E::number(9.0)]));
        assert_eq!(
            f.eval(&missing, Category::Logical).unwrap(),
            crate::value::Value::Boolean(true)
        );
    }

    #[rstest]
    #[case("IsAncestor", "[Store].[USA]", "[Store].[USA].[CA].[SF]", true)]
    #[case("IsAncestor", "[Store].[USA].[CA]", "[Store].[USA].[CA]", false)]
    #[case("IsSibling", "[Store].[USA].[CA]", "[Store].[USA].[WA]", true)]
    #[case("IsSibling", "[Store].[USA].[CA]", "[Store].[USA].[CA]", true)]
    #[case("IsSibling", "[Store].[USA].[CA]", "[Store].[Mexico]", false)]
    fn test_member_predicates(
        #[case] function: &str,
        #[case] a: &str,
        #[case] b: &str,
        #[case] expected: bool,
    ) {
        let f = Fixture::new();
        let expr = E::function(function, vec![f.member(a), f.member(b)]);
        assert_eq!(
            f.eval(&expr, Category::Logical).unwrap(),
            crate::value::Value::Boolean(expected)
        );
    }

    #[test]
    fn test_is_compares_identity() {
        let f = Fixture::new();
        let expr = E::infix(
            "IS",
            E::property("Parent", f.member("[Store].[USA].[CA]")),
            f.member("[Store].[USA]"),
        );
        assert_eq!(
            f.eval(&expr, Category::Logical).unwrap(),
            crate::value::Value::Boolean(true)
        );
    }
}
