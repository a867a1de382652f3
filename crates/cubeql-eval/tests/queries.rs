//! Query execution
//!
//! Formulas, named sets, slicers, `NON EMPTY` axes, per-cell errors and
//! interruption of a running query.

mod common;

use common::{Sales, strings};
use cubeql_ast::{Expression as E, QueryDefinition};
use cubeql_diagnostics::{CQ0206, CQ0208, CQ0211, Severity};
use cubeql_eval::{CancellationToken, EvalError, QueryResult, Value};
use cubeql_model::{CalculatedMember, LevelId, Member, SchemaReader};
use pretty_assertions::assert_eq;

fn measure(sales: &Sales, name: &str, solve_order: i32) -> CalculatedMember {
    let measures = sales.schema().measures_hierarchy();
    CalculatedMember::formula(
        LevelId::new(measures, 0),
        name,
        format!("[Measures].[{}]", name),
    )
    .with_solve_order(solve_order)
}

fn reference(sales: &Sales, member: &CalculatedMember) -> E {
    E::from_member(sales.schema(), &Member::from(member.clone()))
}

fn numbers(result: &QueryResult) -> Vec<Option<f64>> {
    result
        .cells
        .iter()
        .map(|cell| match &cell.value {
            Ok(value) => value.as_number(),
            Err(err) => panic!("cell {:?} failed: {}", cell.coordinates, err),
        })
        .collect()
}

fn axis_names(sales: &Sales, result: &QueryResult, axis: usize) -> Vec<String> {
    result.axes[axis]
        .iter()
        .map(|tuple| {
            tuple
                .iter()
                .map(|m| sales.schema().member_unique_name(m).to_string())
                .collect::<Vec<_>>()
                .join(" x ")
        })
        .collect()
}

// ============================================================================
// Axes and cells
// ============================================================================

#[test]
fn test_two_axis_grid() {
    let sales = Sales::new();
    let query = QueryDefinition::new()
        .axis(E::braces(vec![
            sales.member("[Measures].[Unit Sales]"),
            sales.member("[Measures].[Store Sales]"),
        ]))
        .axis(E::property("Children", sales.member("[Store].[USA]")));
    let result = sales.engine.execute_query(&query).unwrap();

    assert_eq!(result.axes.len(), 2);
    assert_eq!(result.cells.len(), 6);
    // Axis 0 varies fastest
    assert_eq!(
        numbers(&result),
        vec![
            Some(1908.0),
            Some(4770.0),
            Some(3780.0),
            Some(9450.0),
            Some(2592.0),
            Some(6480.0),
        ]
    );
    let cell = result.cell(&[1, 2]).unwrap();
    assert_eq!(cell.coordinates, vec![1, 2]);
    assert_eq!(cell.value, Ok(Value::Number(6480.0)));
    assert!(result.cell(&[2, 0]).is_none());
}

#[test]
fn test_render_single_axis() {
    let sales = Sales::new();
    let query = QueryDefinition::new().axis(E::property("Children", sales.member("[Store].[USA]")));
    let result = sales.engine.execute_query(&query).unwrap();
    insta::assert_snapshot!(result.render(sales.schema()), @r"
    [Store].[USA].[CA] | 1908
    [Store].[USA].[OR] | 3780
    [Store].[USA].[WA] | 2592
    ");
}

#[test]
fn test_render_grid_header_and_rows() {
    let sales = Sales::new();
    let query = QueryDefinition::new()
        .axis(E::braces(vec![sales.member("[Product].[Drink]")]))
        .axis(E::braces(vec![sales.member("[Store].[USA].[CA].[LA]")]));
    let result = sales.engine.execute_query(&query).unwrap();
    assert_eq!(
        result.render(sales.schema()),
        " | [Product].[Drink]\n[Store].[USA].[CA].[LA] | 192"
    );
}

// ============================================================================
// Formulas
// ============================================================================

#[test]
fn test_calculated_measure_and_named_set() {
    let sales = Sales::new();
    let double = measure(&sales, "Double Units", 0);
    let formula = E::infix(
        "*",
        sales.member("[Measures].[Unit Sales]"),
        E::number(2.0),
    );
    let big_cities = E::function(
        "Filter",
        vec![
            E::property("Members", sales.level("[Store].[City]")),
            E::infix(">", sales.member("[Measures].[Unit Sales]"), E::number(2500.0)),
        ],
    );
    let query = QueryDefinition::new()
        .with_set("Big Cities", big_cities)
        .with_member(double.clone(), formula)
        .axis(E::braces(vec![reference(&sales, &double)]))
        .axis(E::named_set("Big Cities"));
    let result = sales.engine.execute_query(&query).unwrap();

    assert_eq!(
        axis_names(&sales, &result, 1),
        strings(&["[Store].[USA].[WA].[Seattle]", "[Store].[Mexico].[Mexico City]"])
    );
    assert_eq!(numbers(&result), vec![Some(5184.0), Some(6120.0)]);
}

#[test]
fn test_calculated_member_referencing_another() {
    let sales = Sales::new();
    let double = measure(&sales, "Double Units", 0);
    let quadruple = measure(&sales, "Quadruple Units", 0);
    let query = QueryDefinition::new()
        .with_member(
            double.clone(),
            E::infix("*", sales.member("[Measures].[Unit Sales]"), E::number(2.0)),
        )
        .with_member(
            quadruple.clone(),
            E::infix("*", reference(&sales, &double), E::number(2.0)),
        )
        .axis(E::braces(vec![reference(&sales, &quadruple)]));
    let result = sales.engine.execute_query(&query).unwrap();
    // Default Store member is All Stores, default Time member is 1997
    assert_eq!(numbers(&result), vec![Some(11340.0 * 4.0)]);
}

#[test]
fn test_named_set_sees_default_context_not_slicer() {
    let sales = Sales::new();
    let top = E::function(
        "TopCount",
        vec![
            E::property("Members", sales.level("[Product].[Family]")),
            E::number(1.0),
            sales.member("[Measures].[Unit Sales]"),
        ],
    );
    let query = QueryDefinition::new()
        .with_set("Top Family", top)
        .axis(E::named_set("Top Family"))
        .slicer(E::braces(vec![sales.member("[Store].[USA].[CA].[LA]")]));
    let result = sales.engine.execute_query(&query).unwrap();
    assert_eq!(axis_names(&sales, &result, 0), strings(&["[Product].[Food]"]));
    // Food at LA: 3 * month + (3 + 4 + 5) over twelve months
    assert_eq!(numbers(&result), vec![Some(378.0)]);
}

// ============================================================================
// Slicer
// ============================================================================

#[test]
fn test_single_member_slicer() {
    let sales = Sales::new();
    let query = QueryDefinition::new()
        .axis(E::property("Members", sales.level("[Product].[Family]")))
        .slicer(E::braces(vec![sales.member("[Store].[USA].[CA].[LA]")]));
    let result = sales.engine.execute_query(&query).unwrap();
    assert_eq!(numbers(&result), vec![Some(192.0), Some(378.0), Some(150.0)]);
    assert_eq!(result.slicer.len(), 1);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_multi_member_slicer_aggregates() {
    let sales = Sales::new();
    let query = QueryDefinition::new()
        .axis(E::braces(vec![sales.member("[Measures].[Unit Sales]")]))
        .slicer(E::braces(vec![
            sales.member("[Store].[USA].[CA]"),
            sales.member("[Store].[USA].[OR]"),
        ]));
    let result = sales.engine.execute_query(&query).unwrap();
    assert_eq!(numbers(&result), vec![Some(1908.0 + 3780.0)]);
    assert_eq!(
        sales.schema().member_unique_name(&result.slicer[0]),
        "[Store].[*SLICER*]"
    );
}

#[test]
fn test_empty_slicer_empties_every_cell() {
    let sales = Sales::new();
    let nothing = E::function(
        "Head",
        vec![E::property("Children", sales.member("[Store].[USA]")), E::number(0.0)],
    );
    let query = QueryDefinition::new()
        .axis(E::property("Members", sales.level("[Product].[Family]")))
        .slicer(nothing);
    let result = sales.engine.execute_query(&query).unwrap();
    assert_eq!(result.cells.len(), 3);
    assert!(result.cells.iter().all(|c| c.value == Ok(Value::Empty)));
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].severity, Severity::Warning);
    assert_eq!(result.warnings[0].code, CQ0211);
}

#[test]
fn test_existing_sees_slicer() {
    let sales = Sales::new();
    let cities = E::prefix(
        "Existing",
        E::property("Members", sales.level("[Store].[City]")),
    );
    let query = QueryDefinition::new()
        .axis(cities)
        .slicer(E::braces(vec![sales.member("[Store].[USA].[OR]")]));
    let result = sales.engine.execute_query(&query).unwrap();
    assert_eq!(
        axis_names(&sales, &result, 0),
        strings(&["[Store].[USA].[OR].[Portland]", "[Store].[USA].[OR].[Salem]"])
    );
}

// ============================================================================
// NON EMPTY
// ============================================================================

#[test]
fn test_non_empty_drops_years_without_facts() {
    let sales = Sales::new();
    let years = E::property("Members", sales.level("[Time].[Year]"));
    let query = QueryDefinition::new()
        .axis(E::braces(vec![sales.member("[Measures].[Unit Sales]")]))
        .non_empty_axis(years.clone());
    let result = sales.engine.execute_query(&query).unwrap();
    assert_eq!(axis_names(&sales, &result, 1), strings(&["[Time].[1997]"]));
    assert_eq!(numbers(&result), vec![Some(11340.0)]);

    let query = QueryDefinition::new()
        .axis(E::braces(vec![sales.member("[Measures].[Unit Sales]")]))
        .axis(years);
    let result = sales.engine.execute_query(&query).unwrap();
    assert_eq!(numbers(&result), vec![Some(11340.0), None]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_cell_errors_are_stored_per_cell() {
    let sales = Sales::new();
    let root = measure(&sales, "Root", 0);
    let formula = E::function(
        "Sqrt",
        vec![E::infix(
            "-",
            E::number(2000.0),
            sales.member("[Measures].[Unit Sales]"),
        )],
    );
    let query = QueryDefinition::new()
        .with_member(root.clone(), formula)
        .axis(E::braces(vec![reference(&sales, &root)]))
        .axis(E::braces(vec![
            sales.member("[Store].[USA].[CA]"),
            sales.member("[Store].[USA].[OR]"),
        ]));
    let result = sales.engine.execute_query(&query).unwrap();

    let ca = result.cell(&[0, 0]).unwrap();
    assert_eq!(ca.value, Ok(Value::Number(92.0f64.sqrt())));
    let or = result.cell(&[0, 1]).unwrap();
    let err = or.value.clone().unwrap_err();
    assert_eq!(err.code(), CQ0208);
    assert!(result.render(sales.schema()).contains("#ERR CQ0208"));
}

#[test]
fn test_recursive_formula_hits_depth_limit() {
    let sales = Sales::new();
    let looping = measure(&sales, "Loop", 0);
    let formula = E::infix("+", reference(&sales, &looping), E::number(1.0));
    let query = QueryDefinition::new()
        .with_member(looping.clone(), formula)
        .axis(E::braces(vec![reference(&sales, &looping)]));
    let result = sales.engine.execute_query(&query).unwrap();
    assert!(matches!(
        result.cells[0].value,
        Err(EvalError::RecursionLimit { .. })
    ));
}

#[test]
fn test_unknown_named_set_fails_resolution() {
    let sales = Sales::new();
    let query = QueryDefinition::new().axis(E::named_set("Missing"));
    let err = sales.engine.execute_query(&query).unwrap_err();
    assert!(err.message().contains("Missing"));
}

#[test]
fn test_cancelled_query_fails_as_a_whole() {
    let sales = Sales::new();
    let token = CancellationToken::new();
    let mut ctx = sales.engine.new_context().with_cancellation(token.clone());
    let query = QueryDefinition::new()
        .axis(E::property("Members", sales.level("[Store].[City]")));

    token.cancel();
    let err = sales.engine.execute_query_in(&mut ctx, &query).unwrap_err();
    assert_eq!(err.code(), CQ0206);

    token.reset();
    let result = sales.engine.execute_query_in(&mut ctx, &query).unwrap();
    assert_eq!(result.cells.len(), 6);
}
