//! Validation of resolved expressions against the sample cube

use cubeql_ast::Expression;
use cubeql_model::sample::sales_cube;
use cubeql_model::{Cube, SchemaReader};
use cubeql_types::{
    Builtin, Category, ConversionStep, FunctionTable, OlapType, QueryScope, ResolutionError,
    TypedExpression, TypedKind, Validator,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn cube() -> Arc<Cube> {
    sales_cube().expect("sample cube")
}

fn member(cube: &Cube, unique_name: &str) -> Expression {
    Expression::member(cube, unique_name).expect("member exists")
}

fn hierarchy(cube: &Cube, unique_name: &str) -> Expression {
    Expression::hierarchy(cube, unique_name).expect("hierarchy exists")
}

fn validate(cube: &Cube, expr: &Expression) -> Result<TypedExpression, ResolutionError> {
    let scope = QueryScope::new();
    Validator::new(FunctionTable::standard(), cube, &scope).validate(expr)
}

fn builtin(expr: &TypedExpression) -> Option<Builtin> {
    match &expr.kind {
        TypedKind::Call { signature, .. } => Some(signature.builtin),
        _ => None,
    }
}

// ============================================================================
// Calls and conversions
// ============================================================================

#[test]
fn test_current_member_of_hierarchy() {
    let cube = cube();
    let expr = Expression::property("CurrentMember", hierarchy(&cube, "[Store]"));
    let typed = validate(&cube, &expr).expect("valid");

    assert_eq!(builtin(&typed), Some(Builtin::CurrentMember));
    assert_eq!(
        typed.ty.member_type().hierarchy,
        cube.lookup_hierarchy("[Store]")
    );
}

#[test]
fn test_hierarchy_used_as_member_reads_current_member() {
    let cube = cube();
    let expr = Expression::property("Parent", hierarchy(&cube, "[Store]"));
    let typed = validate(&cube, &expr).expect("valid");

    let TypedKind::Call { args, .. } = &typed.kind else {
        panic!("expected a call");
    };
    assert!(matches!(
        &args[0].kind,
        TypedKind::Conversion { step: ConversionStep::HierarchyToMember, .. }
    ));
}

#[test]
fn test_lag_keeps_level() {
    let cube = cube();
    let q2 = member(&cube, "[Time].[1997].[Q2]");
    let typed = validate(
        &cube,
        &Expression::method("Lag", q2, vec![Expression::number(1.0)]),
    )
    .expect("valid");
    let level = cube.lookup_level("[Time].[Quarter]");
    assert_eq!(typed.ty.member_type().level, level);
}

#[test]
fn test_measure_arithmetic_reads_cells() {
    let cube = cube();
    let expr = Expression::infix(
        "/",
        member(&cube, "[Measures].[Store Sales]"),
        member(&cube, "[Measures].[Unit Sales]"),
    );
    let typed = validate(&cube, &expr).expect("valid");
    assert_eq!(typed.ty, OlapType::Numeric);
    assert_eq!(builtin(&typed), Some(Builtin::Divide));
}

#[test]
fn test_descendants_flag_is_checked() {
    let cube = cube();
    let usa = member(&cube, "[Store].[USA]");
    let level = Expression::level(cube.as_ref(), "[Store].[City]").expect("level");
    let ok = Expression::function(
        "Descendants",
        vec![usa.clone(), level.clone(), Expression::symbol("self_and_before")],
    );
    assert!(validate(&cube, &ok).is_ok());

    let bad = Expression::function("Descendants", vec![usa, level, Expression::symbol("SIDEWAYS")]);
    let err = validate(&cube, &bad).unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidFlag { ref flag, .. } if flag == "SIDEWAYS"));
}

// ============================================================================
// Tuples and sets
// ============================================================================

#[test]
fn test_tuple_with_duplicate_hierarchy() {
    let cube = cube();
    let expr = Expression::tuple(vec![
        member(&cube, "[Store].[USA]"),
        member(&cube, "[Product].[Drink]"),
        member(&cube, "[Store].[Mexico]"),
    ]);
    let err = validate(&cube, &expr).unwrap_err();
    assert_eq!(
        err,
        ResolutionError::DuplicateHierarchy {
            hierarchy: "[Store]".to_string()
        }
    );
}

#[test]
fn test_single_item_parentheses_group() {
    let cube = cube();
    let expr = Expression::tuple(vec![Expression::infix(
        "+",
        Expression::number(1.0),
        Expression::number(2.0),
    )]);
    assert_eq!(validate(&cube, &expr).expect("valid").ty, OlapType::Numeric);
}

#[test]
fn test_set_constructor_mixes_members_and_sets() {
    let cube = cube();
    let expr = Expression::braces(vec![
        member(&cube, "[Store].[USA]"),
        Expression::property("Children", member(&cube, "[Store].[Mexico]")),
    ]);
    let typed = validate(&cube, &expr).expect("valid");
    assert_eq!(typed.ty.hierarchies().to_vec(), vec![cube.lookup_hierarchy("[Store]")]);
}

#[test]
fn test_set_constructor_with_mixed_hierarchies() {
    let cube = cube();
    let expr = Expression::braces(vec![
        member(&cube, "[Store].[USA]"),
        member(&cube, "[Product].[Drink]"),
    ]);
    let err = validate(&cube, &expr).unwrap_err();
    assert!(matches!(err, ResolutionError::MismatchedHierarchies { .. }));
}

#[test]
fn test_union_reorders_tuple_positions() {
    let cube = cube();
    let left = Expression::braces(vec![Expression::tuple(vec![
        member(&cube, "[Store].[USA]"),
        member(&cube, "[Product].[Drink]"),
    ])]);
    let right = Expression::braces(vec![Expression::tuple(vec![
        member(&cube, "[Product].[Food]"),
        member(&cube, "[Store].[Mexico]"),
    ])]);
    let typed = validate(&cube, &Expression::function("Union", vec![left, right])).expect("valid");

    let TypedKind::Call { args, .. } = &typed.kind else {
        panic!("expected a call");
    };
    assert!(matches!(
        &args[1].kind,
        TypedKind::Conversion { step: ConversionStep::Reorder(perm), .. } if perm.as_slice() == [1, 0]
    ));
}

#[rstest]
#[case("Union")]
#[case("Intersect")]
#[case("Except")]
fn test_set_operations_require_same_hierarchies(#[case] function: &str) {
    let cube = cube();
    let left = Expression::braces(vec![member(&cube, "[Store].[USA]")]);
    let right = Expression::braces(vec![member(&cube, "[Product].[Drink]")]);
    let err = validate(&cube, &Expression::function(function, vec![left, right])).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("All arguments to function '{function}' must have same hierarchy")
    );
}

#[test]
fn test_crossjoin_type_concatenates() {
    let cube = cube();
    let expr = Expression::function(
        "Crossjoin",
        vec![
            Expression::property("Children", member(&cube, "[Store].[USA]")),
            Expression::property("Members", hierarchy(&cube, "[Product]")),
        ],
    );
    let typed = validate(&cube, &expr).expect("valid");
    assert_eq!(typed.ty.arity(), 2);
    assert_eq!(
        typed.ty.hierarchies().to_vec(),
        vec![cube.lookup_hierarchy("[Store]"), cube.lookup_hierarchy("[Product]")]
    );
}

// ============================================================================
// Names and CASE
// ============================================================================

#[test]
fn test_unknown_named_set() {
    let cube = cube();
    let err = validate(&cube, &Expression::named_set("Nowhere")).unwrap_err();
    assert_eq!(err, ResolutionError::UnknownNamedSet("Nowhere".to_string()));
}

#[test]
fn test_named_set_type_comes_from_scope() {
    let cube = cube();
    let mut scope = QueryScope::new();
    let ty = OlapType::set_of_members(cubeql_types::MemberType::of_hierarchy(
        cube.as_ref(),
        cube.lookup_hierarchy("[Store]").expect("store"),
    ));
    scope.define_set("Top", ty.clone()).expect("defined");
    let typed = Validator::new(FunctionTable::standard(), cube.as_ref(), &scope)
        .validate(&Expression::named_set("[Top]"))
        .expect("valid");
    assert_eq!(typed.ty, ty);
}

#[test]
fn test_case_with_cell_branch_is_scalar() {
    let cube = cube();
    let expr = Expression::case_test(
        vec![
            (Expression::boolean(true), Expression::number(1.0)),
            (Expression::boolean(false), Expression::null()),
        ],
        Some(member(&cube, "[Measures].[Unit Sales]")),
    );
    let typed = validate(&cube, &expr).expect("valid");
    assert_eq!(typed.ty, OlapType::Scalar);
}

#[test]
fn test_case_match_on_members() {
    let cube = cube();
    let expr = Expression::case_match(
        Expression::property("CurrentMember", hierarchy(&cube, "[Store]")),
        vec![(member(&cube, "[Store].[USA]"), Expression::string("domestic"))],
        Some(Expression::string("foreign")),
    );
    let typed = validate(&cube, &expr).expect("valid");
    assert_eq!(typed.ty, OlapType::String);
    let TypedKind::Call { args, .. } = &typed.kind else {
        panic!("expected a call");
    };
    assert!(matches!(args[0].ty, OlapType::Member(_)));
}

#[test]
fn test_validate_as_reports_type_mismatch() {
    let cube = cube();
    let scope = QueryScope::new();
    let err = Validator::new(FunctionTable::standard(), cube.as_ref(), &scope)
        .validate_as(&Expression::string("x"), Category::Set)
        .unwrap_err();
    assert_eq!(
        err,
        ResolutionError::TypeMismatch {
            expected: "Set".to_string(),
            found: "String".to_string()
        }
    );
}
