//! Numeric aggregation over sets
//!
//! Every form collects one value per element, either the given expression
//! or the cell value, and ignores elements whose value is empty. No
//! values at all gives an empty result.

use super::{Iteration, arg, optional_arg};
use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use crate::value::{Tuple, Value};
use cubeql_model::Aggregator;
use cubeql_types::Builtin;
use std::collections::HashSet;
use std::ops::ControlFlow;

impl Compiler {
    pub(crate) fn compile_aggregate(
        &mut self,
        site: &CallSite<'_>,
        args: Vec<CompiledUnit>,
    ) -> CompiledUnit {
        let ty = site.ty.clone();
        let builtin = site.builtin();
        let iteration = Iteration::new(site, 0, arg(&args, 0));

        match builtin {
            Builtin::Covariance | Builtin::CovarianceN | Builtin::Correlation => {
                let y = arg(&args, 1);
                let x = optional_arg(&args, 2);
                CompiledUnit::value(ty, move |ctx| {
                    let mut pairs = Vec::new();
                    iteration.for_each(ctx, |ctx, tuple, ordinal| {
                        let (vy, vx) = iteration.bind(ctx, tuple, ordinal, |ctx| {
                            let vy = y.evaluate(ctx)?;
                            let vx = match &x {
                                Some(x) => x.evaluate(ctx)?,
                                None => ctx.evaluate_cell()?,
                            };
                            Ok((vy, vx))
                        })?;
                        if let (Some(a), Some(b)) = (vx.as_number(), vy.as_number()) {
                            pairs.push((a, b));
                        }
                        Ok(ControlFlow::Continue(()))
                    })?;
                    let result = match builtin {
                        Builtin::Covariance => covariance(&pairs, false),
                        Builtin::CovarianceN => covariance(&pairs, true),
                        _ => correlation(&pairs),
                    };
                    Ok(number_or_empty(result))
                })
            }

            Builtin::DistinctCount => CompiledUnit::value(ty, move |ctx| {
                let mut seen: HashSet<Tuple> = HashSet::new();
                iteration.for_each(ctx, |ctx, tuple, ordinal| {
                    if seen.contains(tuple) {
                        return Ok(ControlFlow::Continue(()));
                    }
                    let cell = iteration.bind(ctx, tuple, ordinal, EvaluationContext::evaluate_cell)?;
                    if !cell.is_absent() {
                        seen.insert(tuple.clone());
                    }
                    Ok(ControlFlow::Continue(()))
                })?;
                Ok(Value::Number(seen.len() as f64))
            }),

            Builtin::Aggregate => {
                let body = optional_arg(&args, 1);
                CompiledUnit::value(ty, move |ctx| {
                    let numbers = collect_numbers(ctx, &iteration, body.as_ref())?;
                    let schema = ctx.schema().clone();
                    let measure = ctx.current_member(schema.measures_hierarchy());
                    let aggregator = schema.measure_aggregator(&measure).unwrap_or(Aggregator::Sum);
                    if !aggregator.can_rollup() {
                        return Err(unsupported(schema.member_unique_name(&measure), aggregator));
                    }
                    Ok(number_or_empty(aggregator.rollup(&numbers)))
                })
            }

            _ => {
                let body = optional_arg(&args, 1);
                CompiledUnit::value(ty, move |ctx| {
                    let numbers = collect_numbers(ctx, &iteration, body.as_ref())?;
                    Ok(number_or_empty(summarize(builtin, numbers)))
                })
            }
        }
    }
}

fn unsupported(measure: &str, aggregator: Aggregator) -> EvalError {
    log::warn!("cannot aggregate {} with {:?}", measure, aggregator);
    EvalError::AggregationNotSupported {
        measure: measure.to_string(),
        aggregator: format!("{:?}", aggregator),
    }
}

fn number_or_empty(result: Option<f64>) -> Value {
    result.map_or(Value::Empty, Value::Number)
}

/// Numeric values of `body` (or the cell) for every element
fn collect_numbers(
    ctx: &mut EvaluationContext,
    iteration: &Iteration,
    body: Option<&CompiledUnit>,
) -> EvalResult<Vec<f64>> {
    Ok(iteration
        .values_or_cells(ctx, body)?
        .into_iter()
        .filter_map(|(_, v)| v.as_number())
        .collect())
}

fn summarize(builtin: Builtin, mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    match builtin {
        Builtin::Sum => Some(sum),
        Builtin::Avg => Some(sum / n),
        Builtin::Min => values.iter().copied().reduce(f64::min),
        Builtin::Max => values.iter().copied().reduce(f64::max),
        Builtin::Median => {
            values.sort_by(f64::total_cmp);
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                Some((values[mid - 1] + values[mid]) / 2.0)
            } else {
                Some(values[mid])
            }
        }
        Builtin::Var => variance(&values, true),
        Builtin::VarP => variance(&values, false),
        Builtin::Stdev => variance(&values, true).map(f64::sqrt),
        Builtin::StdevP => variance(&values, false).map(f64::sqrt),
        _ => None,
    }
}

/// Sample (n - 1) or population (n) variance
fn variance(values: &[f64], sample: bool) -> Option<f64> {
    let n = values.len();
    let divisor = if sample { n.checked_sub(1)? } else { n };
    if divisor == 0 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let squares: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    Some(squares / divisor as f64)
}

fn covariance(pairs: &[(f64, f64)], sample: bool) -> Option<f64> {
    let n = pairs.len();
    let divisor = if sample { n.checked_sub(1)? } else { n };
    if divisor == 0 {
        return None;
    }
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n as f64;
    let products: f64 = pairs.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    Some(products / divisor as f64)
}

fn correlation(pairs: &[(f64, f64)]) -> Option<f64> {
    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let spread = variance(&xs, false)?.sqrt() * variance(&ys, false)?.sqrt();
    if spread == 0.0 {
        return None;
    }
    Some(covariance(pairs, false)? / spread)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use cubeql_ast::Expression as E;
    use cubeql_types::Category;
    use proptest::prelude::*;
    use rstest::rstest;

    fn states(f: &Fixture) -> E {
        E::property("Children", f.member("[Store].[USA]"))
    }

    // CA 1908, OR 3780, WA 2592
    #[rstest]
    #[case("Sum", 8280.0)]
    #[case("Avg", 2760.0)]
    #[case("Min", 1908.0)]
    #[case("Max", 3780.0)]
    #[case("Median", 2592.0)]
    #[case("Aggregate", 8280.0)]
    fn test_cell_aggregates(#[case] function: &str, #[case] expected: f64) {
        let f = Fixture::new();
        let expr = E::function(function, vec![states(&f)]);
        assert_eq!(f.number(&expr), Some(expected));
    }

    #[test]
    fn test_sum_of_expression() {
        let f = Fixture::new();
        let doubled = E::infix("*", f.member("[Measures].[Unit Sales]"), E::number(2.0));
        let expr = E::function("Sum", vec![states(&f), doubled]);
        assert_eq!(f.number(&expr), Some(16560.0));
    }

    #[test]
    fn test_sum_of_empty_cells_is_empty() {
        let f = Fixture::new();
        let months = E::property("Children", f.member("[Time].[1998].[Q1]"));
        assert_eq!(
            f.eval(&E::function("Sum", vec![months]), Category::Numeric).unwrap(),
            Value::Empty
        );
    }

    #[test]
    fn test_aggregate_refuses_distinct_count() {
        let f = Fixture::new();
        let unit = f.compile(&E::function("Aggregate", vec![states(&f)]), Category::Numeric);
        let measure = f.s().lookup_member("[Measures].[Store Count]").unwrap();
        let mut ctx = f.context();
        let result = ctx.with_current_member(measure, |ctx| unit.evaluate(ctx));
        assert!(matches!(result, Err(EvalError::AggregationNotSupported { .. })));
    }

    #[test]
    fn test_distinct_count_counts_non_empty_tuples() {
        let f = Fixture::new();
        let years = E::property("Members", f.level("[Time].[Year]"));
        let expr = E::function("DistinctCount", vec![years]);
        assert_eq!(f.number(&expr), Some(1.0));
    }

    #[test]
    fn test_variance_forms() {
        assert_eq!(variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], false), Some(4.0));
        assert_eq!(variance(&[1.0], true), None);
        assert_eq!(summarize(Builtin::StdevP, vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Some(2.0));
    }

    #[test]
    fn test_correlation_of_linear_data() {
        let pairs = [(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)];
        let r = correlation(&pairs).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(covariance(&pairs, true), Some(2.0));
    }

    proptest! {
        #[test]
        fn prop_population_variance_is_not_above_sample(values in prop::collection::vec(-1e6f64..1e6, 2..40)) {
            let population = variance(&values, false).unwrap();
            let sample = variance(&values, true).unwrap();
            prop_assert!(population >= 0.0);
            prop_assert!(population <= sample + 1e-6 * sample.abs().max(1.0));
        }

        #[test]
        fn prop_median_lies_between_min_and_max(values in prop::collection::vec(-1e6f64..1e6, 1..40)) {
            let median = summarize(Builtin::Median, values.clone()).unwrap();
            let min = summarize(Builtin::Min, values.clone()).unwrap();
            let max = summarize(Builtin::Max, values).unwrap();
            prop_assert!(min <= median && median <= max);
        }
    }
}
