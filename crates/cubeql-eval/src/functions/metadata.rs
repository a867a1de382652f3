//! Metadata accessors: levels, hierarchies, dimensions, names and properties

use super::arg;
use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::error::{EvalError, EvalResult};
use crate::value::Value;
use cubeql_model::{Member, SchemaReader};
use cubeql_types::{Builtin, OlapType};

/// Which name accessor is being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Name,
    UniqueName,
    Caption,
}

impl Compiler {
    pub(crate) fn compile_metadata(
        &mut self,
        site: &CallSite<'_>,
        args: Vec<CompiledUnit>,
    ) -> CompiledUnit {
        let schema = self.schema().clone();
        let ty = site.ty.clone();
        let a = arg(&args, 0);
        let source = site.arg_type(0).cloned().unwrap_or(OlapType::Null);
        let name = site.name().to_string();

        match site.builtin() {
            Builtin::Level => CompiledUnit::value(ty, move |ctx| {
                let member = a.evaluate_member(ctx)?;
                Ok(schema.member_level(&member).map_or(Value::Null, Value::Level))
            }),

            Builtin::Levels => {
                let selector = arg(&args, 1);
                let by_name = matches!(site.arg_type(1), Some(OlapType::String));
                CompiledUnit::value(ty, move |ctx| {
                    let hierarchy = a.evaluate_hierarchy(ctx)?;
                    let levels = schema.levels(hierarchy);
                    let found = if by_name {
                        let wanted = selector.evaluate_string(ctx)?.unwrap_or_default();
                        levels
                            .into_iter()
                            .find(|l| schema.level_name(*l).eq_ignore_ascii_case(&wanted))
                    } else {
                        selector
                            .evaluate_number(ctx)?
                            .filter(|n| *n >= 0.0)
                            .and_then(|n| levels.get(n as usize).copied())
                    };
                    found.map(Value::Level).ok_or_else(|| {
                        EvalError::invalid_argument(
                            name.clone(),
                            format!(
                                "no such level in {}",
                                schema.hierarchy_unique_name(hierarchy)
                            ),
                        )
                    })
                })
            }

            Builtin::Hierarchy => CompiledUnit::value(ty, move |ctx| match a.evaluate(ctx)? {
                Value::Member(m) => Ok(Value::Hierarchy(m.hierarchy())),
                Value::Level(l) => Ok(Value::Hierarchy(l.hierarchy)),
                other => Err(EvalError::type_mismatch("Member or Level", other.type_name())),
            }),

            Builtin::Dimension => CompiledUnit::value(ty, move |ctx| {
                let hierarchy = match a.evaluate(ctx)? {
                    Value::Member(m) => m.hierarchy(),
                    Value::Level(l) => l.hierarchy,
                    Value::Hierarchy(h) => h,
                    other => {
                        return Err(EvalError::type_mismatch(
                            "Member, Level or Hierarchy",
                            other.type_name(),
                        ));
                    }
                };
                Ok(Value::Dimension(schema.hierarchy_dimension(hierarchy)))
            }),

            Builtin::Name | Builtin::UniqueName | Builtin::Caption => {
                let kind = match site.builtin() {
                    Builtin::Name => NameKind::Name,
                    Builtin::UniqueName => NameKind::UniqueName,
                    _ => NameKind::Caption,
                };
                CompiledUnit::value(ty, move |ctx| {
                    let value = match source {
                        OlapType::Member(_) => Value::Member(a.evaluate_member(ctx)?),
                        _ => a.evaluate(ctx)?,
                    };
                    name_of(schema.as_ref(), &value, kind).map(Value::String)
                })
            }

            Builtin::Ordinal => CompiledUnit::value(ty, move |ctx| match a.evaluate(ctx)? {
                Value::Level(l) => Ok(Value::Number(f64::from(l.depth))),
                Value::Member(m) => Ok(Value::Number(schema.ordinal(&m) as f64)),
                Value::Null | Value::Empty => Ok(Value::Number(-1.0)),
                other => Err(EvalError::type_mismatch("Member or Level", other.type_name())),
            }),

            Builtin::Properties => {
                let property = arg(&args, 1);
                CompiledUnit::value(ty, move |ctx| {
                    let member = a.evaluate_member(ctx)?;
                    let Some(wanted) = property.evaluate_string(ctx)? else {
                        return Ok(Value::Null);
                    };
                    member_property(schema.as_ref(), &member, &wanted, &name)
                })
            }

            other => CompiledUnit::failing(
                ty,
                EvalError::internal(format!("{:?} is not a metadata function", other)),
            ),
        }
    }
}

fn name_of(schema: &dyn SchemaReader, value: &Value, kind: NameKind) -> EvalResult<String> {
    let text = match (value, kind) {
        (Value::Member(m), NameKind::Name) => schema.member_name(m),
        (Value::Member(m), NameKind::UniqueName) => schema.member_unique_name(m),
        (Value::Member(m), NameKind::Caption) => schema.member_caption(m),
        (Value::Level(l), NameKind::UniqueName) => schema.level_unique_name(*l),
        (Value::Level(l), _) => schema.level_name(*l),
        (Value::Hierarchy(h), NameKind::UniqueName) => schema.hierarchy_unique_name(*h),
        (Value::Hierarchy(h), _) => schema.hierarchy_name(*h),
        (Value::Dimension(d), NameKind::UniqueName) => schema.dimension_unique_name(*d),
        (Value::Dimension(d), _) => schema.dimension_name(*d),
        (other, _) => {
            return Err(EvalError::type_mismatch(
                "Member, Level, Hierarchy or Dimension",
                other.type_name(),
            ));
        }
    };
    Ok(text.to_string())
}

/// Intrinsic properties first, then the member's own properties
fn member_property(
    schema: &dyn SchemaReader,
    member: &Member,
    property: &str,
    function: &str,
) -> EvalResult<Value> {
    if member.is_null() {
        return Ok(Value::Null);
    }
    let intrinsic = match property.to_uppercase().as_str() {
        "KEY" => Some(Value::String(schema.member_key(member).to_string())),
        "NAME" => Some(Value::String(schema.member_name(member).to_string())),
        "CAPTION" => Some(Value::String(schema.member_caption(member).to_string())),
        "UNIQUE_NAME" => Some(Value::String(schema.member_unique_name(member).to_string())),
        "LEVEL_NUMBER" => Some(Value::Number(f64::from(schema.depth(member)))),
        _ => None,
    };
    if let Some(value) = intrinsic {
        return Ok(value);
    }
    match schema.member_property(member, property) {
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64().map_or(Value::Null, Value::Number)),
        Some(serde_json::Value::String(s)) => Ok(Value::String(s)),
        Some(serde_json::Value::Bool(b)) => Ok(Value::Boolean(b)),
        Some(serde_json::Value::Null) => Ok(Value::Null),
        Some(other) => Ok(Value::String(other.to_string())),
        None => Err(EvalError::invalid_argument(
            function,
            format!(
                "member {} has no property '{}'",
                schema.member_unique_name(member),
                property
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use crate::value::Value;
    use cubeql_ast::Expression as E;
    use cubeql_types::Category;
    use rstest::rstest;

    fn string(f: &Fixture, expr: &E) -> String {
        match f.eval(expr, Category::String).unwrap() {
            Value::String(s) => s,
            other => panic!("expected a string, got {:?}", other),
        }
    }

    #[rstest]
    #[case("Name", "CA")]
    #[case("UniqueName", "[Store].[USA].[CA]")]
    #[case("Caption", "CA")]
    fn test_member_names(#[case] property: &str, #[case] expected: &str) {
        let f = Fixture::new();
        let expr = E::property(property, f.member("[Store].[USA].[CA]"));
        assert_eq!(string(&f, &expr), expected);
    }

    #[test]
    fn test_level_name_and_ordinal() {
        let f = Fixture::new();
        let level = E::property("Level", f.member("[Store].[USA].[CA]"));
        assert_eq!(string(&f, &E::property("Name", level.clone())), "State");
        assert_eq!(f.number(&E::property("Ordinal", level)), Some(2.0));
    }

    #[test]
    fn test_levels_by_number_and_name() {
        let f = Fixture::new();
        let by_number = E::method("Levels", f.hierarchy("[Time]"), vec![E::number(1.0)]);
        assert_eq!(string(&f, &E::property("UniqueName", by_number)), "[Time].[Quarter]");

        let by_name = E::method("Levels", f.hierarchy("[Time]"), vec![E::string("month")]);
        assert_eq!(string(&f, &E::property("Name", by_name)), "Month");

        let missing = E::method("Levels", f.hierarchy("[Time]"), vec![E::number(7.0)]);
        assert!(f.eval(&missing, Category::Level).is_err());
    }

    #[test]
    fn test_dimension_of_member() {
        let f = Fixture::new();
        let dimension = E::property("Dimension", f.member("[Time].[1997]"));
        assert_eq!(string(&f, &E::property("Name", dimension)), "Time");
    }

    #[test]
    fn test_intrinsic_and_unknown_properties() {
        let f = Fixture::new();
        let ca = f.member("[Store].[USA].[CA]");
        let level = E::method("Properties", ca.clone(), vec![E::string("LEVEL_NUMBER")]);
        assert_eq!(f.eval(&level, Category::Value).unwrap(), Value::Number(2.0));
        let unknown = E::method("Properties", ca, vec![E::string("Sqft")]);
        assert!(f.eval(&unknown, Category::Value).is_err());
    }
}
