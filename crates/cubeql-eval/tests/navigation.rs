//! Navigation over the sample cube through the engine facade
//!
//! Covers ragged and parent-child hierarchies, relative navigation across
//! year boundaries and the time-series functions driven by the current
//! member.

mod common;

use common::{Sales, strings};
use cubeql_ast::Expression as E;
use cubeql_eval::Value;
use cubeql_model::sample::month_name;
use pretty_assertions::assert_eq;
use rstest::rstest;

// ============================================================================
// Hierarchy shape
// ============================================================================

#[test]
fn test_descendants_of_year_at_month_level() {
    let sales = Sales::new();
    let expr = E::function(
        "Descendants",
        vec![sales.member("[Time].[1997]"), sales.level("[Time].[Month]")],
    );
    let expected: Vec<String> = (1..=12).map(|m| month_name(1997, m)).collect();
    assert_eq!(sales.names(&expr), expected);
}

#[test]
fn test_ragged_city_sits_under_country() {
    let sales = Sales::new();
    let city = sales.member("[Store].[Mexico].[Mexico City]");
    assert_eq!(
        sales.member_name(&E::property("Parent", city.clone())),
        "[Store].[Mexico]"
    );
    let level = E::property("Name", E::property("Level", city));
    assert_eq!(sales.eval(&level), Value::String("City".into()));
}

#[test]
fn test_cities_include_ragged_member() {
    let sales = Sales::new();
    let cities = E::property("Members", sales.level("[Store].[City]"));
    assert_eq!(
        sales.names(&cities),
        strings(&[
            "[Store].[USA].[CA].[LA]",
            "[Store].[USA].[CA].[SF]",
            "[Store].[USA].[OR].[Portland]",
            "[Store].[USA].[OR].[Salem]",
            "[Store].[USA].[WA].[Seattle]",
            "[Store].[Mexico].[Mexico City]",
        ])
    );
}

#[test]
fn test_parent_child_children_and_rollup() {
    let sales = Sales::new();
    let sheri = sales.member("[Employees].[Sheri Nowmer]");
    assert_eq!(
        sales.names(&E::property("Children", sheri.clone())),
        strings(&[
            "[Employees].[Sheri Nowmer].[Derrick Whelply]",
            "[Employees].[Sheri Nowmer].[Michael Spence]",
        ])
    );
    // Beverly (LA, Seattle) + Pedro (SF, Mexico City) + Michael (Portland)
    assert_eq!(sales.number(&sheri), Some(9216.0));
}

// ============================================================================
// Relative navigation
// ============================================================================

#[rstest]
#[case("[Time].[1997].[Q4].[12]", 1.0, "[Time].[1998].[Q1].[1]")]
#[case("[Time].[1997].[Q1].[1]", 1.0, "#null")]
#[case("[Time].[1998].[Q1].[2]", 3.0, "[Time].[1997].[Q4].[11]")]
#[case("[Time].[1997].[Q2].[5]", 0.0, "[Time].[1997].[Q2].[5]")]
#[case("[Time].[1997].[Q2].[5]", -2.0, "[Time].[1997].[Q3].[7]")]
fn test_lag_crosses_parents(#[case] start: &str, #[case] offset: f64, #[case] expected: &str) {
    let sales = Sales::new();
    let expr = E::method("Lag", sales.member(start), vec![E::number(offset)]);
    let result = match sales.eval_as(&expr, cubeql_types::Category::Member) {
        Value::Member(m) if m.is_null() => "#null".to_string(),
        Value::Member(m) => sales.schema().member_unique_name(&m).to_string(),
        other => panic!("expected a member, got {:?}", other),
    };
    assert_eq!(result, expected);
}

#[test]
fn test_ancestor_at_own_level_is_identity() {
    let sales = Sales::new();
    for name in ["[Store].[USA].[OR].[Salem]", "[Store].[Mexico].[Mexico City]"] {
        let member = sales.member(name);
        let expr = E::function(
            "Ancestor",
            vec![member.clone(), E::property("Level", member)],
        );
        assert_eq!(sales.member_name(&expr), name);
    }
}

#[test]
fn test_ancestor_past_root_is_null() {
    let sales = Sales::new();
    let expr = E::function(
        "Ancestor",
        vec![sales.member("[Store].[USA].[CA]"), E::number(5.0)],
    );
    match sales.eval_as(&expr, cubeql_types::Category::Member) {
        Value::Member(m) => assert!(m.is_null()),
        other => panic!("expected a member, got {:?}", other),
    }
}

#[test]
fn test_cousin_keeps_relative_position() {
    let sales = Sales::new();
    let expr = E::function(
        "Cousin",
        vec![
            sales.member("[Time].[1997].[Q1].[2]"),
            sales.member("[Time].[1997].[Q3]"),
        ],
    );
    assert_eq!(sales.member_name(&expr), "[Time].[1997].[Q3].[8]");
}

#[test]
fn test_range_spans_years() {
    let sales = Sales::new();
    let expr = E::infix(
        ":",
        sales.member("[Time].[1997].[Q4].[11]"),
        sales.member("[Time].[1998].[Q1].[2]"),
    );
    assert_eq!(
        sales.names(&expr),
        vec![
            month_name(1997, 11),
            month_name(1997, 12),
            month_name(1998, 1),
            month_name(1998, 2),
        ]
    );
}

// ============================================================================
// Time series
// ============================================================================

#[test]
fn test_ytd_sum_of_march() {
    let sales = Sales::new();
    let ytd = E::function("Ytd", vec![sales.member(&month_name(1997, 3))]);
    // Each month m of 1997 totals 126 * (m + 1)
    assert_eq!(
        sales.number(&E::function("Sum", vec![ytd])),
        Some(252.0 + 378.0 + 504.0)
    );
}

#[test]
fn test_parallel_period_of_year_is_empty() {
    let sales = Sales::new();
    let previous = E::function(
        "ParallelPeriod",
        vec![
            sales.level("[Time].[Year]"),
            E::number(-1.0),
            sales.member(&month_name(1997, 6)),
        ],
    );
    assert_eq!(sales.member_name(&previous), month_name(1998, 6));
    assert_eq!(sales.number(&previous), None);
}
