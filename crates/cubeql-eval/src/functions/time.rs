//! Period functions over time hierarchies
//!
//! Every form without an explicit member works on the current member of the
//! result's hierarchy: the hierarchy of the level argument when there is
//! one, else the cube's first time hierarchy.

use super::{arg, optional_arg};
use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::navigation as nav;
use crate::value::{TupleList, Value};
use cubeql_model::{HierarchyId, LevelId, LevelKind, Member};
use cubeql_types::{Builtin, OlapType};
use std::sync::Arc;

/// Where a period function gets its member
#[derive(Clone)]
enum Anchor {
    Explicit(CompiledUnit),
    Current(HierarchyId),
}

impl Anchor {
    fn member(&self, ctx: &mut EvaluationContext) -> EvalResult<Member> {
        match self {
            Anchor::Explicit(unit) => unit.evaluate_member(ctx),
            Anchor::Current(hierarchy) => Ok(ctx.current_member(*hierarchy)),
        }
    }
}

impl Compiler {
    pub(crate) fn compile_time(&mut self, site: &CallSite<'_>, args: Vec<CompiledUnit>) -> CompiledUnit {
        let schema = self.schema().clone();
        let ty = site.ty.clone();

        // Position of the explicit member argument, per overload family
        let member_index = match site.builtin() {
            Builtin::ParallelPeriod => 2,
            Builtin::OpeningPeriod | Builtin::ClosingPeriod | Builtin::PeriodsToDate => 1,
            Builtin::Ytd | Builtin::Qtd | Builtin::Mtd | Builtin::Wtd => 0,
            _ => 1,
        };
        let anchor = match optional_arg(&args, member_index) {
            Some(unit) => Anchor::Explicit(unit),
            None => match site.result_hierarchy() {
                Some(hierarchy) => Anchor::Current(hierarchy),
                None => return site.invalid("the cube has no time dimension"),
            },
        };
        let has_level = !matches!(
            site.builtin(),
            Builtin::Ytd | Builtin::Qtd | Builtin::Mtd | Builtin::Wtd | Builtin::LastPeriods
        );
        let level_arg = if has_level { optional_arg(&args, 0) } else { None };
        let name = site.name().to_string();

        match site.builtin() {
            Builtin::ParallelPeriod => {
                let offset = optional_arg(&args, 1);
                CompiledUnit::value(ty, move |ctx| {
                    let member = anchor.member(ctx)?;
                    let Some(level) = level_or(ctx, &level_arg, || {
                        nav::parent_level(schema.as_ref(), &member)
                    })?
                    else {
                        return Ok(Value::Member(Member::Null(member.hierarchy())));
                    };
                    let offset = match &offset {
                        Some(unit) => unit.evaluate_number(ctx)?.unwrap_or(0.0),
                        None => 1.0,
                    };
                    Ok(Value::Member(nav::parallel_period(
                        schema.as_ref(),
                        level,
                        offset,
                        &member,
                    )?))
                })
            }

            Builtin::OpeningPeriod | Builtin::ClosingPeriod => {
                let last = site.builtin() == Builtin::ClosingPeriod;
                CompiledUnit::value(ty, move |ctx| {
                    let member = anchor.member(ctx)?;
                    let Some(level) = level_or(ctx, &level_arg, || {
                        let below = schema.depth(&member) + 1;
                        schema
                            .levels(member.hierarchy())
                            .into_iter()
                            .find(|l| i32::from(l.depth) == below)
                    })?
                    else {
                        return Ok(Value::Member(Member::Null(member.hierarchy())));
                    };
                    Ok(Value::Member(nav::boundary_period(
                        schema.as_ref(),
                        level,
                        &member,
                        last,
                    )?))
                })
            }

            Builtin::PeriodsToDate => CompiledUnit::list(ty, move |ctx| {
                let member = anchor.member(ctx)?;
                let Some(level) = level_or(ctx, &level_arg, || {
                    nav::parent_level(schema.as_ref(), &member)
                })?
                else {
                    return Ok(Arc::new(TupleList::new(1)));
                };
                let members = nav::periods_to_date(schema.as_ref(), level, &member)?;
                Ok(Arc::new(TupleList::from_members(members)))
            }),

            Builtin::Ytd | Builtin::Qtd | Builtin::Mtd | Builtin::Wtd => {
                let kind = match site.builtin() {
                    Builtin::Ytd => LevelKind::TimeYears,
                    Builtin::Qtd => LevelKind::TimeQuarters,
                    Builtin::Mtd => LevelKind::TimeMonths,
                    _ => LevelKind::TimeWeeks,
                };
                CompiledUnit::list(ty, move |ctx| {
                    let member = anchor.member(ctx)?;
                    if member.is_null() {
                        return Ok(Arc::new(TupleList::new(1)));
                    }
                    let level = nav::level_of_kind(schema.as_ref(), member.hierarchy(), kind)
                        .ok_or_else(|| {
                            EvalError::invalid_argument(
                                name.clone(),
                                format!(
                                    "hierarchy {} has no {:?} level",
                                    schema.hierarchy_unique_name(member.hierarchy()),
                                    kind
                                ),
                            )
                        })?;
                    let members = nav::periods_to_date(schema.as_ref(), level, &member)?;
                    Ok(Arc::new(TupleList::from_members(members)))
                })
            }

            Builtin::LastPeriods => {
                let count = arg(&args, 0);
                CompiledUnit::list(ty, move |ctx| {
                    let member = anchor.member(ctx)?;
                    let n = count.evaluate_number(ctx)?.unwrap_or(0.0);
                    Ok(Arc::new(TupleList::from_members(nav::last_periods(
                        schema.as_ref(),
                        n,
                        &member,
                    ))))
                })
            }

            other => CompiledUnit::failing(
                ty,
                EvalError::internal(format!("{:?} is not a period function", other)),
            ),
        }
    }
}

/// The level argument when given, otherwise `default`
fn level_or(
    ctx: &mut EvaluationContext,
    level: &Option<CompiledUnit>,
    default: impl FnOnce() -> Option<LevelId>,
) -> EvalResult<Option<LevelId>> {
    match level {
        Some(unit) => match unit.result_type {
            OlapType::Level(_) => unit.evaluate_level(ctx).map(Some),
            _ => Ok(default()),
        },
        None => Ok(default()),
    }
}
