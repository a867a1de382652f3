//! String functions
//!
//! Positions are 1-based and count characters, not bytes.

use super::{arg, optional_arg, to_count};
use crate::compiler::{CallSite, CompiledUnit, Compiler};
use crate::error::EvalError;
use crate::value::Value;
use cubeql_types::Builtin;

impl Compiler {
    pub(crate) fn compile_string(
        &mut self,
        site: &CallSite<'_>,
        args: Vec<CompiledUnit>,
    ) -> CompiledUnit {
        let ty = site.ty.clone();
        let builtin = site.builtin();

        match builtin {
            Builtin::Concat => {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                CompiledUnit::value(ty, move |ctx| {
                    let left = a.evaluate_string(ctx)?;
                    let right = b.evaluate_string(ctx)?;
                    Ok(match (left, right) {
                        (None, None) => Value::Null,
                        (l, r) => Value::String(l.unwrap_or_default() + &r.unwrap_or_default()),
                    })
                })
            }

            Builtin::Len => {
                let a = arg(&args, 0);
                CompiledUnit::value(ty, move |ctx| {
                    let len = a.evaluate_string(ctx)?.map_or(0, |s| s.chars().count());
                    Ok(Value::Number(len as f64))
                })
            }

            Builtin::UCase | Builtin::LCase | Builtin::Trim => {
                let a = arg(&args, 0);
                CompiledUnit::value(ty, move |ctx| {
                    let Some(s) = a.evaluate_string(ctx)? else {
                        return Ok(Value::Null);
                    };
                    Ok(Value::String(match builtin {
                        Builtin::UCase => s.to_uppercase(),
                        Builtin::LCase => s.to_lowercase(),
                        _ => s.trim().to_string(),
                    }))
                })
            }

            Builtin::Left | Builtin::Right => {
                let (a, n) = (arg(&args, 0), arg(&args, 1));
                CompiledUnit::value(ty, move |ctx| {
                    let Some(s) = a.evaluate_string(ctx)? else {
                        return Ok(Value::Null);
                    };
                    let count = to_count(n.evaluate_number(ctx)?.unwrap_or(0.0));
                    Ok(Value::String(if builtin == Builtin::Left {
                        left(&s, count)
                    } else {
                        right(&s, count)
                    }))
                })
            }

            Builtin::Mid => {
                let (a, start) = (arg(&args, 0), arg(&args, 1));
                let length = optional_arg(&args, 2);
                let name = site.name().to_string();
                CompiledUnit::value(ty, move |ctx| {
                    let Some(s) = a.evaluate_string(ctx)? else {
                        return Ok(Value::Null);
                    };
                    let start = start.evaluate_number(ctx)?.unwrap_or(1.0);
                    if start < 1.0 {
                        return Err(EvalError::invalid_argument(
                            name.clone(),
                            format!("start position {} is before the first character", start),
                        ));
                    }
                    let length = match &length {
                        Some(l) => Some(to_count(l.evaluate_number(ctx)?.unwrap_or(0.0))),
                        None => None,
                    };
                    Ok(Value::String(mid(&s, start as usize, length)))
                })
            }

            Builtin::InStr => {
                // InStr([start,] haystack, needle)
                let offset = usize::from(args.len() == 3);
                let start = (offset == 1).then(|| arg(&args, 0));
                let (haystack, needle) = (arg(&args, offset), arg(&args, offset + 1));
                CompiledUnit::value(ty, move |ctx| {
                    let from = match &start {
                        Some(s) => to_count(s.evaluate_number(ctx)?.unwrap_or(1.0)).max(1),
                        None => 1,
                    };
                    let haystack = haystack.evaluate_string(ctx)?.unwrap_or_default();
                    let needle = needle.evaluate_string(ctx)?.unwrap_or_default();
                    Ok(Value::Number(instr(&haystack, &needle, from) as f64))
                })
            }

            other => CompiledUnit::failing(
                ty,
                EvalError::internal(format!("{:?} is not a string function", other)),
            ),
        }
    }
}

fn left(s: &str, count: usize) -> String {
    s.chars().take(count).collect()
}

fn right(s: &str, count: usize) -> String {
    let len = s.chars().count();
    s.chars().skip(len.saturating_sub(count)).collect()
}

fn mid(s: &str, start: usize, length: Option<usize>) -> String {
    let rest = s.chars().skip(start - 1);
    match length {
        Some(n) => rest.take(n).collect(),
        None => rest.collect(),
    }
}

/// 1-based character position of `needle` at or after `from`, 0 if absent
fn instr(haystack: &str, needle: &str, from: usize) -> usize {
    let chars: Vec<char> = haystack.chars().collect();
    let wanted: Vec<char> = needle.chars().collect();
    if from > chars.len() + 1 {
        return 0;
    }
    if wanted.is_empty() {
        return from;
    }
    (from - 1..chars.len())
        .find(|&i| chars[i..].starts_with(&wanted))
        .map_or(0, |i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use cubeql_ast::Expression as E;
    use cubeql_types::Category;
    use proptest::prelude::*;
    use rstest::rstest;

    fn s(v: &str) -> E {
        E::string(v)
    }

    fn n(v: f64) -> E {
        E::number(v)
    }

    #[rstest]
    #[case(E::infix("||", s("ab"), s("cd")), "abcd")]
    #[case(E::function("UCase", vec![s("Straße")]), "STRASSE")]
    #[case(E::function("LCase", vec![s("ABC")]), "abc")]
    #[case(E::function("Trim", vec![s("  x y ")]), "x y")]
    #[case(E::function("Left", vec![s("héllo"), n(2.0)]), "hé")]
    #[case(E::function("Right", vec![s("héllo"), n(3.0)]), "llo")]
    #[case(E::function("Right", vec![s("ab"), n(5.0)]), "ab")]
    #[case(E::function("Mid", vec![s("héllo"), n(2.0)]), "éllo")]
    #[case(E::function("Mid", vec![s("héllo"), n(2.0), n(3.0)]), "éll")]
    fn test_string_results(#[case] expr: E, #[case] expected: &str) {
        let f = Fixture::new();
        assert_eq!(
            f.eval(&expr, Category::String).unwrap(),
            Value::String(expected.to_string())
        );
    }

    #[rstest]
    #[case(E::function("Len", vec![s("héllo")]), 5.0)]
    #[case(E::function("InStr", vec![s("banana"), s("an")]), 2.0)]
    #[case(E::function("InStr", vec![n(3.0), s("banana"), s("an")]), 4.0)]
    #[case(E::function("InStr", vec![s("banana"), s("x")]), 0.0)]
    fn test_numeric_results(#[case] expr: E, #[case] expected: f64) {
        assert_eq!(Fixture::new().number(&expr), Some(expected));
    }

    #[test]
    fn test_mid_rejects_start_before_first_character() {
        let f = Fixture::new();
        let expr = E::function("Mid", vec![s("abc"), n(0.0)]);
        assert!(f.eval(&expr, Category::String).is_err());
    }

    #[test]
    fn test_member_name_concatenation() {
        let f = Fixture::new();
        let name = E::property("Name", f.member("[Store].[USA].[CA]"));
        let expr = E::infix("||", s("State: "), name);
        assert_eq!(
            f.eval(&expr, Category::String).unwrap(),
            Value::String("State: CA".into())
        );
    }

    proptest! {
        #[test]
        fn prop_left_and_right_rebuild_the_string(text in "\\PC{0,20}", cut in 0usize..25) {
            let len = text.chars().count();
            let cut = cut.min(len);
            let rebuilt = left(&text, cut) + &right(&text, len - cut);
            prop_assert_eq!(rebuilt, text);
        }

        #[test]
        fn prop_instr_finds_inserted_needle(prefix in "[a-c]{0,8}", needle in "[x-z]{1,3}") {
            let haystack = format!("{}{}", prefix, needle);
            prop_assert_eq!(instr(&haystack, &needle, 1), prefix.chars().count() + 1);
        }
    }
}
