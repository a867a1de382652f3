//! Runtime form of the implicit conversions inserted by the validator

use super::{CompiledUnit, Compiler};
use crate::error::EvalError;
use crate::navigation;
use crate::value::{Tuple, TupleList, Value, tuple_of};
use cubeql_model::Member;
use cubeql_types::{ConversionStep, OlapType, TypedExpression};
use smallvec::SmallVec;
use std::sync::Arc;

pub(super) fn compile_conversion(
    compiler: &Compiler,
    step: &ConversionStep,
    operand: &TypedExpression,
    inner: CompiledUnit,
    ty: OlapType,
) -> CompiledUnit {
    let schema = compiler.schema().clone();
    match step {
        ConversionStep::DimensionToHierarchy(h) => CompiledUnit::constant(ty, Value::Hierarchy(*h)),
        ConversionStep::HierarchyToMember => CompiledUnit::value(ty, move |ctx| {
            let hierarchy = inner.evaluate_hierarchy(ctx)?;
            Ok(Value::Member(ctx.current_member(hierarchy)))
        }),
        ConversionStep::MemberToTuple => CompiledUnit::value(ty, move |ctx| {
            let member = inner.evaluate_member(ctx)?;
            Ok(Value::Tuple(tuple_of(member)))
        }),
        ConversionStep::MemberToSet => CompiledUnit::iterable(ty, move |ctx, sink| {
            let member = inner.evaluate_member(ctx)?;
            if !member.is_null() {
                let _ = sink(ctx, &tuple_of(member))?;
            }
            Ok(())
        }),
        ConversionStep::TupleToSet => CompiledUnit::iterable(ty, move |ctx, sink| {
            let tuple = inner.evaluate_tuple(ctx)?;
            if !tuple.iter().any(Member::is_null) {
                let _ = sink(ctx, &tuple)?;
            }
            Ok(())
        }),
        ConversionStep::LevelToSet => CompiledUnit::list(ty, move |ctx| {
            let level = inner.evaluate_level(ctx)?;
            Ok(Arc::new(TupleList::from_members(schema.level_members(level))))
        }),
        ConversionStep::HierarchyToSet => CompiledUnit::list(ty, move |ctx| {
            let hierarchy = inner.evaluate_hierarchy(ctx)?;
            Ok(Arc::new(TupleList::from_members(
                navigation::hierarchy_members(schema.as_ref(), hierarchy),
            )))
        }),
        ConversionStep::ValueOf => {
            let is_tuple = matches!(operand.ty, OlapType::Tuple(_));
            CompiledUnit::value(ty, move |ctx| {
                let tuple: Tuple = if is_tuple {
                    inner.evaluate_tuple(ctx)?
                } else {
                    tuple_of(inner.evaluate_member(ctx)?)
                };
                if tuple.iter().any(Member::is_null) {
                    return Ok(Value::Null);
                }
                ctx.with_tuple(&tuple, |ctx| ctx.evaluate_cell())
            })
        }
        ConversionStep::NumericToLogical | ConversionStep::ScalarToLogical => {
            CompiledUnit::value(ty, move |ctx| {
                Ok(inner
                    .evaluate_boolean(ctx)?
                    .map_or(Value::Null, Value::Boolean))
            })
        }
        ConversionStep::ScalarToNumeric => CompiledUnit::value(ty, move |ctx| {
            match inner.evaluate(ctx)? {
                value @ (Value::Null | Value::Empty | Value::Number(_)) => Ok(value),
                Value::Boolean(b) => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Number)
                    .map_err(|_| EvalError::type_mismatch("Numeric", "String")),
                other => Err(EvalError::type_mismatch("Numeric", other.type_name())),
            }
        }),
        ConversionStep::ScalarToString => CompiledUnit::value(ty, move |ctx| {
            match inner.evaluate(ctx)? {
                value @ (Value::Null | Value::Empty | Value::String(_)) => Ok(value),
                Value::Number(n) => Ok(Value::String(crate::value::format_number(n))),
                Value::Boolean(b) => Ok(Value::String(if b { "true" } else { "false" }.into())),
                other => Err(EvalError::type_mismatch("String", other.type_name())),
            }
        }),
        ConversionStep::Reorder(perm) => {
            let perm = perm.clone();
            match operand.ty {
                OlapType::Set(_) => CompiledUnit::iterable(ty, move |ctx, sink| {
                    let perm = &perm;
                    inner.for_each(ctx, &mut |ctx, tuple| sink(ctx, &reorder(tuple, perm)))
                }),
                _ => CompiledUnit::value(ty, move |ctx| {
                    let tuple = inner.evaluate_tuple(ctx)?;
                    Ok(Value::Tuple(reorder(&tuple, &perm)))
                }),
            }
        }
    }
}

/// Position `i` of the result takes position `perm[i]` of `tuple`
fn reorder(tuple: &Tuple, perm: &SmallVec<[usize; 4]>) -> Tuple {
    perm.iter().filter_map(|&i| tuple.get(i).cloned()).collect()
}
