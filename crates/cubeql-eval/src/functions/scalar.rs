//! Arithmetic, comparison, logic and conditionals
//!
//! Absent operands follow the rules in [`crate::value`]: `Null` and
//! `Empty` propagate through arithmetic and make comparisons `Null`.
//! `IIf` and `CASE` evaluate only the branch they select.

use super::{arg, optional_arg};
use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::value::{self, Value};
use cubeql_types::{Builtin, OlapType};
use std::cmp::Ordering;

impl Compiler {
    pub(crate) fn compile_scalar(
        &mut self,
        site: &CallSite<'_>,
        args: Vec<CompiledUnit>,
    ) -> CompiledUnit {
        let ty = site.ty.clone();
        let builtin = site.builtin();
        let name = site.name().to_string();

        match builtin {
            Builtin::Add | Builtin::Subtract | Builtin::Multiply => {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                let op = match builtin {
                    Builtin::Add => value::add,
                    Builtin::Subtract => value::subtract,
                    _ => value::multiply,
                };
                CompiledUnit::value(ty, move |ctx| {
                    let left = a.evaluate(ctx)?;
                    let right = b.evaluate(ctx)?;
                    op(&left, &right)
                })
            }

            Builtin::Divide => {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                CompiledUnit::value(ty, move |ctx| {
                    let left = a.evaluate(ctx)?;
                    let right = b.evaluate(ctx)?;
                    value::divide(&left, &right, ctx.options().null_division)
                })
            }

            Builtin::Negate => {
                let a = arg(&args, 0);
                CompiledUnit::value(ty, move |ctx| value::negate(&a.evaluate(ctx)?))
            }

            Builtin::Equal
            | Builtin::NotEqual
            | Builtin::Less
            | Builtin::LessOrEqual
            | Builtin::Greater
            | Builtin::GreaterOrEqual => {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                CompiledUnit::value(ty, move |ctx| {
                    let left = a.evaluate(ctx)?;
                    let right = b.evaluate(ctx)?;
                    Ok(value::compare(&left, &right)?
                        .map_or(Value::Null, |o| Value::Boolean(holds(builtin, o))))
                })
            }

            Builtin::And | Builtin::Or | Builtin::Xor => {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                CompiledUnit::value(ty, move |ctx| {
                    let left = a.evaluate(ctx)?;
                    // FALSE AND x, TRUE OR x
                    match (builtin, left.as_boolean()) {
                        (Builtin::And, Some(false)) => return Ok(Value::Boolean(false)),
                        (Builtin::Or, Some(true)) => return Ok(Value::Boolean(true)),
                        _ => {}
                    }
                    let right = b.evaluate(ctx)?;
                    match builtin {
                        Builtin::And => value::and(&left, &right),
                        Builtin::Or => value::or(&left, &right),
                        _ => value::xor(&left, &right),
                    }
                })
            }

            Builtin::Not => {
                let a = arg(&args, 0);
                CompiledUnit::value(ty, move |ctx| value::not(&a.evaluate(ctx)?))
            }

            Builtin::IIf => {
                let condition = arg(&args, 0);
                let (then, otherwise) = (arg(&args, 1), arg(&args, 2));
                CompiledUnit::value(ty, move |ctx| {
                    if condition.evaluate_boolean(ctx)?.unwrap_or(false) {
                        then.evaluate(ctx)
                    } else {
                        otherwise.evaluate(ctx)
                    }
                })
            }

            Builtin::CaseTest => {
                let (branches, otherwise) = split_branches(args);
                CompiledUnit::value(ty, move |ctx| {
                    for (when, then) in &branches {
                        if when.evaluate_boolean(ctx)?.unwrap_or(false) {
                            return then.evaluate(ctx);
                        }
                    }
                    evaluate_otherwise(ctx, otherwise.as_ref())
                })
            }

            Builtin::CaseMatch => {
                let mut rest = args;
                let subject = if rest.is_empty() {
                    arg(&rest, 0)
                } else {
                    rest.remove(0)
                };
                let (branches, otherwise) = split_branches(rest);
                CompiledUnit::value(ty, move |ctx| {
                    let value = subject.evaluate(ctx)?;
                    for (when, then) in &branches {
                        let candidate = when.evaluate(ctx)?;
                        if same(&value, &candidate)? {
                            return then.evaluate(ctx);
                        }
                    }
                    evaluate_otherwise(ctx, otherwise.as_ref())
                })
            }

            Builtin::CoalesceEmpty => CompiledUnit::value(ty, move |ctx| {
                for a in &args {
                    let value = a.evaluate(ctx)?;
                    if !value.is_absent() {
                        return Ok(value);
                    }
                }
                Ok(Value::Empty)
            }),

            Builtin::IsEmpty => {
                let a = arg(&args, 0);
                CompiledUnit::value(ty, move |ctx| Ok(Value::Boolean(a.evaluate(ctx)?.is_absent())))
            }

            Builtin::Value => {
                let a = arg(&args, 0);
                CompiledUnit::value(ty, move |ctx| {
                    let tuple = a.evaluate_tuple(ctx)?;
                    ctx.with_tuple(&tuple, EvaluationContext::evaluate_cell)
                })
            }

            Builtin::Abs => unary(ty, arg(&args, 0), f64::abs),
            Builtin::Int => unary(ty, arg(&args, 0), f64::floor),

            Builtin::Sqrt => {
                let a = arg(&args, 0);
                CompiledUnit::value(ty, move |ctx| match a.evaluate_number(ctx)? {
                    Some(n) if n < 0.0 => Err(EvalError::invalid_argument(
                        name.clone(),
                        format!("square root of negative number {}", n),
                    )),
                    Some(n) => Ok(Value::Number(n.sqrt())),
                    None => Ok(Value::Null),
                })
            }

            Builtin::Round => {
                let a = arg(&args, 0);
                let digits = optional_arg(&args, 1);
                CompiledUnit::value(ty, move |ctx| {
                    let Some(n) = a.evaluate_number(ctx)? else {
                        return Ok(Value::Null);
                    };
                    let digits = match &digits {
                        Some(d) => d.evaluate_number(ctx)?.unwrap_or(0.0),
                        None => 0.0,
                    };
                    Ok(Value::Number(round(n, digits as i32)))
                })
            }

            other => CompiledUnit::failing(
                ty,
                EvalError::internal(format!("{:?} is not a scalar function", other)),
            ),
        }
    }
}

/// `CASE x WHEN y` equality; members and tuples match by identity
fn same(a: &Value, b: &Value) -> EvalResult<bool> {
    match (a, b) {
        (Value::Member(x), Value::Member(y)) => Ok(x == y),
        (Value::Tuple(x), Value::Tuple(y)) => Ok(x == y),
        _ => Ok(value::compare(a, b)? == Some(Ordering::Equal)),
    }
}

fn holds(builtin: Builtin, ordering: Ordering) -> bool {
    match builtin {
        Builtin::Equal => ordering == Ordering::Equal,
        Builtin::NotEqual => ordering != Ordering::Equal,
        Builtin::Less => ordering == Ordering::Less,
        Builtin::LessOrEqual => ordering != Ordering::Greater,
        Builtin::Greater => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }
}

/// Pair up `when`/`then` arguments; an odd one out is the `ELSE`
fn split_branches(
    args: Vec<CompiledUnit>,
) -> (Vec<(CompiledUnit, CompiledUnit)>, Option<CompiledUnit>) {
    let mut iter = args.into_iter();
    let mut branches = Vec::new();
    let mut otherwise = None;
    while let Some(when) = iter.next() {
        match iter.next() {
            Some(then) => branches.push((when, then)),
            None => otherwise = Some(when),
        }
    }
    (branches, otherwise)
}

fn evaluate_otherwise(
    ctx: &mut EvaluationContext,
    otherwise: Option<&CompiledUnit>,
) -> EvalResult<Value> {
    match otherwise {
        Some(unit) => unit.evaluate(ctx),
        None => Ok(Value::Null),
    }
}

fn unary(ty: OlapType, a: CompiledUnit, f: fn(f64) -> f64) -> CompiledUnit {
    CompiledUnit::value(ty, move |ctx| {
        Ok(a.evaluate_number(ctx)?.map_or(Value::Null, |n| Value::Number(f(n))))
    })
}

/// Half away from zero at `digits` decimals; negative digits round to tens
fn round(n: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (n * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use cubeql_ast::Expression as E;
    use cubeql_types::Category;
    use rstest::rstest;

    fn n(v: f64) -> E {
        E::number(v)
    }

    #[rstest]
    #[case(E::infix("+", n(2.0), n(3.0)), Some(5.0))]
    #[case(E::infix("-", E::null(), n(3.0)), Some(-3.0))]
    #[case(E::infix("*", E::null(), n(3.0)), None)]
    #[case(E::infix("/", n(9.0), n(3.0)), Some(3.0))]
    #[case(E::prefix("-", n(4.0)), Some(-4.0))]
    #[case(E::function("Abs", vec![n(-2.5)]), Some(2.5))]
    #[case(E::function("Int", vec![n(-2.5)]), Some(-3.0))]
    #[case(E::function("Sqrt", vec![n(16.0)]), Some(4.0))]
    #[case(E::function("Round", vec![n(2.5)]), Some(3.0))]
    #[case(E::function("Round", vec![n(-2.5)]), Some(-3.0))]
    #[case(E::function("Round", vec![n(1.2345), n(2.0)]), Some(1.23))]
    fn test_arithmetic(#[case] expr: E, #[case] expected: Option<f64>) {
        assert_eq!(Fixture::new().number(&expr), expected);
    }

    #[test]
    fn test_division_by_zero_follows_option() {
        let f = Fixture::new();
        let expr = E::infix("/", n(1.0), n(0.0));
        assert_eq!(f.number(&expr), Some(f64::INFINITY));
    }

    #[test]
    fn test_sqrt_of_negative_is_an_error() {
        let f = Fixture::new();
        let expr = E::function("Sqrt", vec![n(-1.0)]);
        assert!(matches!(
            f.eval(&expr, Category::Numeric),
            Err(EvalError::InvalidArgument { .. })
        ));
    }

    #[rstest]
    #[case("<", n(1.0), n(2.0), Value::Boolean(true))]
    #[case(">=", n(1.0), n(2.0), Value::Boolean(false))]
    #[case("<>", E::string("a"), E::string("b"), Value::Boolean(true))]
    #[case("=", E::null(), n(2.0), Value::Null)]
    fn test_comparisons(#[case] op: &str, #[case] a: E, #[case] b: E, #[case] expected: Value) {
        let f = Fixture::new();
        assert_eq!(f.eval(&E::infix(op, a, b), Category::Logical).unwrap(), expected);
    }

    #[test]
    fn test_logic_short_circuits() {
        let f = Fixture::new();
        let failing = E::infix(">", E::function("Sqrt", vec![n(-1.0)]), n(0.0));
        let and = E::infix("AND", E::boolean(false), failing.clone());
        assert_eq!(f.eval(&and, Category::Logical).unwrap(), Value::Boolean(false));
        let or = E::infix("OR", E::boolean(true), failing);
        assert_eq!(f.eval(&or, Category::Logical).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_iif_evaluates_selected_branch_only() {
        let f = Fixture::new();
        let expr = E::function(
            "IIf",
            vec![E::infix(">", n(2.0), n(1.0)), n(7.0), E::function("Sqrt", vec![n(-1.0)])],
        );
        assert_eq!(f.number(&expr), Some(7.0));
    }

    #[test]
    fn test_case_forms() {
        let f = Fixture::new();
        let test = E::case_test(
            vec![
                (E::infix(">", n(1.0), n(2.0)), E::string("first")),
                (E::infix("<", n(1.0), n(2.0)), E::string("second")),
            ],
            Some(E::string("else")),
        );
        assert_eq!(f.eval(&test, Category::Value).unwrap(), Value::String("second".into()));

        let matched = E::case_match(n(3.0), vec![(n(1.0), E::string("one"))], None);
        assert_eq!(f.eval(&matched, Category::Value).unwrap(), Value::Null);
    }

    #[test]
    fn test_coalesce_and_is_empty() {
        let f = Fixture::new();
        let expr = E::function("CoalesceEmpty", vec![E::null(), n(4.0), n(5.0)]);
        assert_eq!(f.number(&expr), Some(4.0));
        let empty = E::function("IsEmpty", vec![E::null()]);
        assert_eq!(f.eval(&empty, Category::Logical).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_value_reads_the_cell_at_a_tuple() {
        let f = Fixture::new();
        let tuple = E::tuple(vec![
            f.member("[Store].[USA].[CA].[LA]"),
            f.member("[Measures].[Unit Sales]"),
        ]);
        assert_eq!(f.number(&E::property("Value", tuple)), Some(720.0));
    }
}
