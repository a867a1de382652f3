//! Expression nodes

use crate::literal::Literal;
use crate::syntax::Syntax;
use cubeql_model::{DimensionId, HierarchyId, LevelId, Member, ModelError, SchemaReader};
use std::fmt;

/// Function name used for a searched `CASE WHEN c THEN v ... END`
pub const CASE_TEST: &str = "_CaseTest";
/// Function name used for a simple `CASE x WHEN v THEN r ... END`
pub const CASE_MATCH: &str = "_CaseMatch";

/// A member bound to the cube, with its unique name for display
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef {
    pub member: Member,
    pub unique_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelRef {
    pub level: LevelId,
    pub unique_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyRef {
    pub hierarchy: HierarchyId,
    pub unique_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionRef {
    pub dimension: DimensionId,
    pub unique_name: String,
}

/// An unresolved function call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub syntax: Syntax,
    pub args: Vec<Expression>,
}

/// A resolved-but-uncompiled expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Member(MemberRef),
    Level(LevelRef),
    Hierarchy(HierarchyRef),
    Dimension(DimensionRef),
    Call(Call),
    /// Reference to a set defined in the query's `WITH` clause
    NamedSet(String),
}

impl Expression {
    pub fn literal(lit: Literal) -> Self {
        Expression::Literal(lit)
    }

    pub fn number(value: f64) -> Self {
        Expression::Literal(Literal::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Literal::Boolean(value))
    }

    pub fn null() -> Self {
        Expression::Literal(Literal::Null)
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expression::Literal(Literal::Symbol(name.into()))
    }

    pub fn named_set(name: impl Into<String>) -> Self {
        Expression::NamedSet(name.into())
    }

    /// Reference a member by unique name
    pub fn member(reader: &dyn SchemaReader, unique_name: &str) -> Result<Self, ModelError> {
        let member = reader
            .lookup_member(unique_name)
            .ok_or_else(|| ModelError::UnknownMember(unique_name.to_string()))?;
        Ok(Self::from_member(reader, &member))
    }

    /// Reference a member handle, stored or calculated
    pub fn from_member(reader: &dyn SchemaReader, member: &Member) -> Self {
        let unique_name = if member.is_null() {
            format!(
                "{}.[{}]",
                reader.hierarchy_unique_name(member.hierarchy()),
                reader.member_unique_name(member)
            )
        } else {
            reader.member_unique_name(member).to_string()
        };
        Expression::Member(MemberRef {
            member: member.clone(),
            unique_name,
        })
    }

    pub fn level(reader: &dyn SchemaReader, unique_name: &str) -> Result<Self, ModelError> {
        let level = reader
            .lookup_level(unique_name)
            .ok_or_else(|| ModelError::UnknownLevel {
                hierarchy: String::new(),
                level: unique_name.to_string(),
            })?;
        Ok(Expression::Level(LevelRef {
            level,
            unique_name: unique_name.to_string(),
        }))
    }

    pub fn hierarchy(reader: &dyn SchemaReader, unique_name: &str) -> Result<Self, ModelError> {
        let hierarchy = reader
            .lookup_hierarchy(unique_name)
            .ok_or_else(|| ModelError::UnknownHierarchy(unique_name.to_string()))?;
        Ok(Expression::Hierarchy(HierarchyRef {
            hierarchy,
            unique_name: unique_name.to_string(),
        }))
    }

    pub fn dimension(reader: &dyn SchemaReader, unique_name: &str) -> Result<Self, ModelError> {
        let dimension = reader
            .lookup_dimension(unique_name)
            .ok_or_else(|| ModelError::UnknownDimension(unique_name.to_string()))?;
        Ok(Expression::Dimension(DimensionRef {
            dimension,
            unique_name: unique_name.to_string(),
        }))
    }

    pub fn call(name: impl Into<String>, syntax: Syntax, args: Vec<Expression>) -> Self {
        Expression::Call(Call {
            name: name.into(),
            syntax,
            args,
        })
    }

    /// `Name(args)`
    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::call(name, Syntax::Function, args)
    }

    /// `target.Name(args)`
    pub fn method(name: impl Into<String>, target: Expression, args: Vec<Expression>) -> Self {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(target);
        all.extend(args);
        Self::call(name, Syntax::Method, all)
    }

    /// `target.Name`
    pub fn property(name: impl Into<String>, target: Expression) -> Self {
        Self::call(name, Syntax::Property, vec![target])
    }

    pub fn infix(op: impl Into<String>, left: Expression, right: Expression) -> Self {
        Self::call(op, Syntax::Infix, vec![left, right])
    }

    pub fn prefix(op: impl Into<String>, operand: Expression) -> Self {
        Self::call(op, Syntax::Prefix, vec![operand])
    }

    pub fn postfix(op: impl Into<String>, operand: Expression) -> Self {
        Self::call(op, Syntax::Postfix, vec![operand])
    }

    /// `{items}`
    pub fn braces(items: Vec<Expression>) -> Self {
        Self::call("{}", Syntax::Braces, items)
    }

    /// `(items)`
    pub fn tuple(items: Vec<Expression>) -> Self {
        Self::call("()", Syntax::Parentheses, items)
    }

    /// `CASE WHEN c1 THEN v1 ... ELSE e END`
    pub fn case_test(branches: Vec<(Expression, Expression)>, otherwise: Option<Expression>) -> Self {
        let mut args = Vec::with_capacity(branches.len() * 2 + 1);
        for (when, then) in branches {
            args.push(when);
            args.push(then);
        }
        args.extend(otherwise);
        Self::call(CASE_TEST, Syntax::Case, args)
    }

    /// `CASE value WHEN v1 THEN r1 ... ELSE e END`
    pub fn case_match(
        value: Expression,
        branches: Vec<(Expression, Expression)>,
        otherwise: Option<Expression>,
    ) -> Self {
        let mut args = Vec::with_capacity(branches.len() * 2 + 2);
        args.push(value);
        for (when, then) in branches {
            args.push(when);
            args.push(then);
        }
        args.extend(otherwise);
        Self::call(CASE_MATCH, Syntax::Case, args)
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Expression::Call(call) => Some(call),
            _ => None,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_case_branches(f: &mut fmt::Formatter<'_>, args: &[Expression]) -> fmt::Result {
    let mut chunks = args.chunks_exact(2);
    for pair in chunks.by_ref() {
        write!(f, " WHEN {} THEN {}", pair[0], pair[1])?;
    }
    if let [otherwise] = chunks.remainder() {
        write!(f, " ELSE {}", otherwise)?;
    }
    f.write_str(" END")
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self.args.as_slice();
        match self.syntax {
            Syntax::Function => {
                write!(f, "{}(", self.name)?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Syntax::Method => match args.split_first() {
                Some((target, rest)) => {
                    write!(f, "{}.{}(", target, self.name)?;
                    write_list(f, rest)?;
                    f.write_str(")")
                }
                None => write!(f, "{}()", self.name),
            },
            Syntax::Property => match args.first() {
                Some(target) => write!(f, "{}.{}", target, self.name),
                None => f.write_str(&self.name),
            },
            Syntax::Infix => match args {
                [left, right] => write!(f, "({} {} {})", left, self.name, right),
                _ => {
                    write!(f, "{}(", self.name)?;
                    write_list(f, args)?;
                    f.write_str(")")
                }
            },
            Syntax::Prefix => {
                let spaced = self.name.chars().all(|c| c.is_ascii_alphabetic());
                match args.first() {
                    Some(operand) if spaced => write!(f, "{} {}", self.name, operand),
                    Some(operand) => write!(f, "{}{}", self.name, operand),
                    None => f.write_str(&self.name),
                }
            }
            Syntax::Postfix => match args.first() {
                Some(operand) => write!(f, "{} {}", operand, self.name),
                None => f.write_str(&self.name),
            },
            Syntax::Braces => {
                f.write_str("{")?;
                write_list(f, args)?;
                f.write_str("}")
            }
            Syntax::Parentheses => {
                f.write_str("(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Syntax::Case => {
                f.write_str("CASE")?;
                if self.name == CASE_MATCH {
                    match args.split_first() {
                        Some((value, rest)) => {
                            write!(f, " {}", value)?;
                            write_case_branches(f, rest)
                        }
                        None => f.write_str(" END"),
                    }
                } else {
                    write_case_branches(f, args)
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::Member(m) => f.write_str(&m.unique_name),
            Expression::Level(l) => f.write_str(&l.unique_name),
            Expression::Hierarchy(h) => f.write_str(&h.unique_name),
            Expression::Dimension(d) => f.write_str(&d.unique_name),
            Expression::Call(call) => write!(f, "{}", call),
            Expression::NamedSet(name) => write!(f, "{}", cubeql_model::quote_name(name)),
        }
    }
}
