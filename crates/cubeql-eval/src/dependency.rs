//! Static dependency analysis
//!
//! [`depends_on`] answers "can the value of this expression change when
//! the current member of hierarchy H changes?" without evaluating it. The
//! answer is conservative: `No` is only returned when it is certain, so a
//! wrong answer can cost performance but never correctness.

use cubeql_model::{HierarchyId, SchemaReader};
use cubeql_types::{
    ConversionStep, Dependency, DependencyRule, OlapType, TypedExpression, TypedKind,
};

/// Does `expr` depend on the current member of `hierarchy`?
pub fn depends_on(
    expr: &TypedExpression,
    hierarchy: HierarchyId,
    schema: &dyn SchemaReader,
) -> Dependency {
    match &expr.kind {
        TypedKind::Literal(_)
        | TypedKind::Member(_)
        | TypedKind::Level(_)
        | TypedKind::NamedSet { .. } => Dependency::No,
        TypedKind::Hierarchy(h) => yes_if(*h == hierarchy),
        TypedKind::Dimension(d) => yes_if(schema.hierarchy_dimension(hierarchy) == *d),
        TypedKind::Conversion { step, operand } => {
            conversion_dependency(step, operand, hierarchy, schema)
        }
        TypedKind::Call { signature, args } => {
            call_dependency(signature.dependency, args, &expr.ty, hierarchy, schema)
        }
    }
}

/// True when `expr` depends on no hierarchy at all
pub fn is_context_free(expr: &TypedExpression, schema: &dyn SchemaReader) -> bool {
    schema
        .hierarchies()
        .into_iter()
        .all(|h| depends_on(expr, h, schema).is_no())
}

fn yes_if(condition: bool) -> Dependency {
    if condition {
        Dependency::Yes
    } else {
        Dependency::No
    }
}

/// Does a set or tuple type fix `hierarchy` in each of its elements?
fn pins(ty: &OlapType, hierarchy: HierarchyId) -> bool {
    ty.hierarchies().contains(&Some(hierarchy))
}

fn conversion_dependency(
    step: &ConversionStep,
    operand: &TypedExpression,
    hierarchy: HierarchyId,
    schema: &dyn SchemaReader,
) -> Dependency {
    let inner = depends_on(operand, hierarchy, schema);
    match step {
        ConversionStep::HierarchyToMember => match operand.ty.member_type().hierarchy {
            Some(h) if h != hierarchy => inner,
            _ => Dependency::Yes,
        },
        ConversionStep::ValueOf if !pins(&operand.ty, hierarchy) => Dependency::Yes,
        _ => inner,
    }
}

fn call_dependency(
    rule: DependencyRule,
    args: &[TypedExpression],
    ty: &OlapType,
    hierarchy: HierarchyId,
    schema: &dyn SchemaReader,
) -> Dependency {
    let arg = |i: usize| depends_on(&args[i], hierarchy, schema);
    let all = || {
        (0..args.len())
            .map(arg)
            .max()
            .unwrap_or(Dependency::No)
    };

    match rule {
        DependencyRule::Default => all(),
        DependencyRule::Iterating { set, body } => {
            let masked = args.get(set).is_some_and(|s| pins(&s.ty, hierarchy));
            (0..args.len())
                .filter(|i| !(masked && body.contains(i)))
                .map(arg)
                .max()
                .unwrap_or(Dependency::No)
        }
        DependencyRule::IteratingRest { set } => {
            let masked = args.get(set).is_some_and(|s| pins(&s.ty, hierarchy));
            (0..args.len())
                .filter(|i| *i == set || !masked)
                .map(arg)
                .max()
                .unwrap_or(Dependency::No)
        }
        DependencyRule::IteratingCell { set } => {
            if args.get(set).is_some_and(|s| pins(&s.ty, hierarchy)) {
                all()
            } else {
                Dependency::Yes
            }
        }
        DependencyRule::CurrentMember { arg: index } => {
            match args.get(index).and_then(|a| a.ty.member_type().hierarchy) {
                Some(h) if h != hierarchy => all(),
                _ => Dependency::Yes,
            }
        }
        DependencyRule::ImplicitCurrent => match ty.member_type().hierarchy {
            Some(h) if h != hierarchy => all(),
            _ => Dependency::Yes,
        },
        DependencyRule::Cursor => all().max(Dependency::Maybe),
        DependencyRule::Opaque => Dependency::Yes,
    }
}
