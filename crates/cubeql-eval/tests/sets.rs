//! Set functions and aggregates evaluated against the sample facts
//!
//! City totals for 1997: LA 720, SF 1188, Portland 1656, Salem 2124,
//! Seattle 2592, Mexico City 3060. State totals: CA 1908, OR 3780, WA 2592.

mod common;

use common::{Sales, strings};
use cubeql_ast::Expression as E;
use cubeql_eval::{EvalError, Value};
use cubeql_types::Category;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn cities(sales: &Sales) -> E {
    E::property("Members", sales.level("[Store].[City]"))
}

fn states(sales: &Sales) -> E {
    E::property("Children", sales.member("[Store].[USA]"))
}

fn unit_sales(sales: &Sales) -> E {
    sales.member("[Measures].[Unit Sales]")
}

// ============================================================================
// Aggregates
// ============================================================================

#[rstest]
#[case("Sum", 11340.0)]
#[case("Avg", 1890.0)]
#[case("Min", 720.0)]
#[case("Max", 3060.0)]
#[case("Median", 1890.0)]
#[case("Aggregate", 11340.0)]
fn test_aggregates_over_cities(#[case] function: &str, #[case] expected: f64) {
    let sales = Sales::new();
    let expr = E::function(function, vec![cities(&sales)]);
    assert_eq!(sales.number(&expr), Some(expected));
}

#[test]
fn test_aggregate_with_measure_expression() {
    let sales = Sales::new();
    let expr = E::function(
        "Sum",
        vec![states(&sales), sales.member("[Measures].[Store Sales]")],
    );
    assert_eq!(sales.number(&expr), Some(8280.0 * 2.5));
}

#[test]
fn test_aggregates_of_empty_cells_are_empty() {
    let sales = Sales::new();
    let months_1998 = E::function(
        "Descendants",
        vec![sales.member("[Time].[1998]"), sales.level("[Time].[Month]")],
    );
    assert_eq!(sales.number(&E::function("Sum", vec![months_1998.clone()])), None);
    assert_eq!(sales.number(&E::function("Avg", vec![months_1998])), None);
}

#[test]
fn test_aggregate_rejects_distinct_count_measure() {
    let sales = Sales::new();
    let engine = &sales.engine;
    let prepared = engine
        .prepare(&E::function("Aggregate", vec![cities(&sales)]))
        .unwrap();
    let store_count = sales
        .schema()
        .lookup_member("[Measures].[Store Count]")
        .unwrap();
    let mut ctx = engine.new_context();
    ctx.set_current_member(store_count);
    let err = engine.evaluate(&prepared, &mut ctx).unwrap_err();
    assert!(matches!(err, EvalError::AggregationNotSupported { .. }));
}

#[test]
fn test_count_include_and_exclude_empty() {
    let sales = Sales::new();
    let years = E::property("Members", sales.level("[Time].[Year]"));
    let include = E::function("Count", vec![years.clone(), E::symbol("INCLUDEEMPTY")]);
    let exclude = E::function("Count", vec![years, E::symbol("EXCLUDEEMPTY")]);
    assert_eq!(sales.number(&include), Some(2.0));
    assert_eq!(sales.number(&exclude), Some(1.0));
}

// ============================================================================
// Set algebra and iteration
// ============================================================================

#[test]
fn test_crossjoin_cells_follow_both_members() {
    let sales = Sales::new();
    let stores = E::braces(vec![
        sales.member("[Store].[USA].[CA]"),
        sales.member("[Store].[USA].[OR]"),
    ]);
    let drink = E::braces(vec![sales.member("[Product].[Drink]")]);
    let set = E::function("Crossjoin", vec![stores, drink]);
    assert_eq!(
        sales.names(&set),
        strings(&[
            "[Store].[USA].[CA] x [Product].[Drink]",
            "[Store].[USA].[OR] x [Product].[Drink]",
        ])
    );
    // Drink rows sell 2 * month * store weight + 3 per store and month
    assert_eq!(sales.number(&E::function("Sum", vec![set])), Some(540.0 + 1164.0));
}

#[test]
fn test_crossjoin_same_hierarchy_is_an_error() {
    let sales = Sales::new();
    let expr = E::function("Crossjoin", vec![states(&sales), cities(&sales)]);
    let prepared = sales.engine.prepare_as(&expr, Category::Set).unwrap();
    let mut ctx = sales.engine.new_context();
    let err = sales.engine.evaluate(&prepared, &mut ctx).unwrap_err();
    assert!(matches!(err, EvalError::DuplicateHierarchy { .. }));
}

#[test]
fn test_filter_by_cell_value() {
    let sales = Sales::new();
    let condition = E::infix(">", unit_sales(&sales), E::number(2000.0));
    let expr = E::function("Filter", vec![cities(&sales), condition]);
    assert_eq!(
        sales.names(&expr),
        strings(&[
            "[Store].[USA].[OR].[Salem]",
            "[Store].[USA].[WA].[Seattle]",
            "[Store].[Mexico].[Mexico City]",
        ])
    );
}

#[test]
fn test_generate_follows_current_member() {
    let sales = Sales::new();
    let current = E::property("CurrentMember", sales.hierarchy("[Store]"));
    let first_child = E::function("Head", vec![E::property("Children", current)]);
    let expr = E::function("Generate", vec![states(&sales), first_child]);
    assert_eq!(
        sales.names(&expr),
        strings(&[
            "[Store].[USA].[CA].[LA]",
            "[Store].[USA].[OR].[Portland]",
            "[Store].[USA].[WA].[Seattle]",
        ])
    );
}

#[test]
fn test_union_except_intersect() {
    let sales = Sales::new();
    let a = E::braces(vec![
        sales.member("[Store].[USA].[CA]"),
        sales.member("[Store].[USA].[OR]"),
    ]);
    let b = E::braces(vec![
        sales.member("[Store].[USA].[OR]"),
        sales.member("[Store].[USA].[WA]"),
    ]);
    assert_eq!(
        sales.names(&E::infix("+", a.clone(), b.clone())),
        strings(&["[Store].[USA].[CA]", "[Store].[USA].[OR]", "[Store].[USA].[WA]"])
    );
    assert_eq!(
        sales.names(&E::infix("-", a.clone(), b.clone())),
        strings(&["[Store].[USA].[CA]"])
    );
    assert_eq!(
        sales.names(&E::function("Intersect", vec![a, b])),
        strings(&["[Store].[USA].[OR]"])
    );
}

// ============================================================================
// Ordering and ranking
// ============================================================================

#[test]
fn test_order_states_descending() {
    let sales = Sales::new();
    let expr = E::function(
        "Order",
        vec![states(&sales), unit_sales(&sales), E::symbol("BDESC")],
    );
    assert_eq!(
        sales.names(&expr),
        strings(&["[Store].[USA].[OR]", "[Store].[USA].[WA]", "[Store].[USA].[CA]"])
    );
}

#[test]
fn test_top_count_by_value() {
    let sales = Sales::new();
    let expr = E::function(
        "TopCount",
        vec![cities(&sales), E::number(2.0), unit_sales(&sales)],
    );
    assert_eq!(
        sales.names(&expr),
        strings(&["[Store].[Mexico].[Mexico City]", "[Store].[USA].[WA].[Seattle]"])
    );
}

#[test]
fn test_rank_by_value_and_by_position() {
    let sales = Sales::new();
    let wa = sales.member("[Store].[USA].[WA]");
    let by_value = E::function("Rank", vec![wa.clone(), states(&sales), unit_sales(&sales)]);
    assert_eq!(sales.number(&by_value), Some(2.0));
    let by_position = E::function("Rank", vec![wa, states(&sales)]);
    assert_eq!(sales.number(&by_position), Some(3.0));
}

#[test]
fn test_visual_totals_rolls_up_listed_children() {
    let sales = Sales::new();
    let set = E::braces(vec![
        sales.member("[Store].[USA]"),
        sales.member("[Store].[USA].[CA].[LA]"),
        sales.member("[Store].[USA].[OR]"),
    ]);
    let visual = E::function("VisualTotals", vec![set]);
    let total = E::method("Item", visual, vec![E::number(0.0)]);
    assert_eq!(sales.eval_as(&total, Category::Numeric), Value::Number(720.0 + 3780.0));
}
