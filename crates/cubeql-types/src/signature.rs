//! Function signatures
//!
//! A [`FunctionSignature`] ties a name and syntax to a closed [`Builtin`]
//! implementation, its parameter categories, a rule for the result type and
//! a rule for which hierarchies the result depends on.

use crate::types::{
    Category, DimensionType, HierarchyType, LevelType, MemberType, OlapType, TupleType,
};
use cubeql_ast::Syntax;
use cubeql_model::{DimensionKind, SchemaReader};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every builtin the evaluator implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    // Member navigation
    Parent,
    Children,
    FirstChild,
    LastChild,
    FirstSibling,
    LastSibling,
    Siblings,
    PrevMember,
    NextMember,
    Lag,
    Lead,
    Ancestor,
    Ancestors,
    Ascendants,
    Descendants,
    Cousin,
    ParallelPeriod,
    OpeningPeriod,
    ClosingPeriod,
    PeriodsToDate,
    Ytd,
    Qtd,
    Mtd,
    Wtd,
    LastPeriods,
    Range,
    CurrentMember,
    DefaultMember,
    Members,
    AllMembers,
    Level,
    Levels,
    Hierarchy,
    Dimension,
    Item,
    Current,
    CurrentOrdinal,
    IsLeaf,
    IsAncestor,
    IsSibling,
    Is,
    IsNull,

    // Sets
    SetConstructor,
    TupleConstructor,
    Crossjoin,
    Union,
    Intersect,
    Except,
    Distinct,
    Extract,
    Head,
    Tail,
    Subset,
    Filter,
    Generate,
    GenerateString,
    Order,
    Hierarchize,
    Rank,
    TopCount,
    BottomCount,
    TopPercent,
    BottomPercent,
    TopSum,
    BottomSum,
    Count,
    VisualTotals,
    Exists,
    Existing,
    NonEmpty,
    DrilldownLevel,
    DrilldownMember,
    DrillupLevel,
    DrillupMember,
    AddCalculatedMembers,
    StripCalculatedMembers,
    Unorder,

    // Aggregation
    Sum,
    Avg,
    Min,
    Max,
    Aggregate,
    Median,
    Var,
    VarP,
    Stdev,
    StdevP,
    Covariance,
    CovarianceN,
    Correlation,
    DistinctCount,

    // Scalars
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
    Xor,
    Not,
    IIf,
    CaseTest,
    CaseMatch,
    CoalesceEmpty,
    IsEmpty,
    Value,
    Name,
    UniqueName,
    Caption,
    Ordinal,
    Properties,
    Concat,
    Len,
    UCase,
    LCase,
    Left,
    Right,
    Mid,
    InStr,
    Trim,
    Abs,
    Round,
    Int,
    Sqrt,

    /// A registered user function, by registration index
    User(u32),
}

/// Does an expression depend on a hierarchy's current member?
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dependency {
    No,
    Maybe,
    Yes,
}

impl Dependency {
    pub fn is_no(self) -> bool {
        self == Dependency::No
    }
}

/// How a call's dependency is derived from its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyRule {
    /// The most dependent of the arguments
    Default,
    /// Arguments in `body` are evaluated once per element of argument
    /// `set`, which supplies the element's hierarchies
    Iterating {
        set: usize,
        body: &'static [usize],
    },
    /// Like `Iterating` with every other argument in the body
    IteratingRest { set: usize },
    /// Reads the cell at each element of argument `set`: depends on every
    /// hierarchy the element does not fix
    IteratingCell { set: usize },
    /// Reads the current member of argument `arg`'s hierarchy
    CurrentMember { arg: usize },
    /// Reads the current member of the result's hierarchy when the member
    /// argument is omitted
    ImplicitCurrent,
    /// Reads a set cursor
    Cursor,
    /// Unknown; assumed to depend on everything
    Opaque,
}

/// How the result type is computed from the converted argument types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRule {
    Numeric,
    String,
    Logical,
    Scalar,
    /// Member of the hierarchy of argument n
    MemberOf(usize),
    /// Member at the same level as member argument n
    SameLevelAs(usize),
    /// Member of the level given by argument n
    MemberAtLevel(usize),
    /// Set of members of the hierarchy of argument n
    MembersOf(usize),
    /// Set of members of the level given by argument n
    MembersAtLevel(usize),
    /// Same type as argument n
    SameAs(usize),
    /// Element type of set argument n
    ElementOf(usize),
    /// Member of an unknown hierarchy
    AnyMember,
    LevelOf(usize),
    HierarchyOf(usize),
    DimensionOf(usize),
    /// Concatenated tuples of every set argument
    Crossjoin,
    /// Tuples over the hierarchies given by arguments 1..
    Extract,
    /// Member, or set of members, of the cube's first time hierarchy
    TimeMember,
    TimeMembers,
    Fixed(OlapType),
}

impl TypeRule {
    pub fn infer(&self, args: &[OlapType], schema: &dyn SchemaReader) -> OlapType {
        let arg = |n: usize| args.get(n).cloned().unwrap_or(OlapType::Null);
        match self {
            TypeRule::Numeric => OlapType::Numeric,
            TypeRule::String => OlapType::String,
            TypeRule::Logical => OlapType::Logical,
            TypeRule::Scalar => OlapType::Scalar,
            TypeRule::MemberOf(n) => OlapType::Member(arg(*n).member_type().any_level()),
            TypeRule::SameLevelAs(n) => OlapType::Member(arg(*n).member_type()),
            TypeRule::MemberAtLevel(n) => OlapType::Member(level_member(&arg(*n))),
            TypeRule::MembersOf(n) => OlapType::set_of_members(arg(*n).member_type().any_level()),
            TypeRule::MembersAtLevel(n) => OlapType::set_of_members(level_member(&arg(*n))),
            TypeRule::SameAs(n) => arg(*n),
            TypeRule::ElementOf(n) => arg(*n).element().clone(),
            TypeRule::AnyMember => OlapType::Member(MemberType::unknown()),
            TypeRule::LevelOf(n) => {
                let m = arg(*n).member_type();
                OlapType::Level(LevelType {
                    dimension: m.dimension,
                    hierarchy: m.hierarchy,
                    level: m.level,
                })
            }
            TypeRule::HierarchyOf(n) => {
                let m = arg(*n).member_type();
                OlapType::Hierarchy(HierarchyType {
                    dimension: m.dimension,
                    hierarchy: m.hierarchy,
                })
            }
            TypeRule::DimensionOf(n) => OlapType::Dimension(DimensionType {
                dimension: arg(*n).member_type().dimension,
            }),
            TypeRule::Crossjoin => {
                let members = args.iter().flat_map(|a| a.member_types());
                OlapType::set_of(OlapType::Tuple(TupleType::new(members)))
            }
            TypeRule::Extract => {
                let members: Vec<MemberType> =
                    args.iter().skip(1).map(|a| a.member_type()).collect();
                match members.as_slice() {
                    [single] => OlapType::set_of_members(*single),
                    _ => OlapType::set_of(OlapType::Tuple(TupleType::new(members))),
                }
            }
            TypeRule::TimeMember => OlapType::Member(time_member(schema, args)),
            TypeRule::TimeMembers => OlapType::set_of_members(time_member(schema, args)),
            TypeRule::Fixed(ty) => ty.clone(),
        }
    }
}

fn level_member(ty: &OlapType) -> MemberType {
    match ty {
        OlapType::Level(l) => MemberType {
            dimension: l.dimension,
            hierarchy: l.hierarchy,
            level: l.level,
        },
        other => other.member_type().any_level(),
    }
}

/// Hierarchy of the first member or level argument, else the cube's first
/// time hierarchy
fn time_member(schema: &dyn SchemaReader, args: &[OlapType]) -> MemberType {
    if let Some(m) = args
        .iter()
        .map(|a| a.member_type())
        .find(|m| m.hierarchy.is_some())
    {
        return m.any_level();
    }
    time_hierarchy(schema)
        .map(|h| MemberType::of_hierarchy(schema, h))
        .unwrap_or_default()
}

/// The first hierarchy of the first time dimension
pub fn time_hierarchy(schema: &dyn SchemaReader) -> Option<cubeql_model::HierarchyId> {
    schema
        .dimensions()
        .into_iter()
        .find(|d| schema.dimension_kind(*d) == DimensionKind::Time)
        .and_then(|d| schema.dimension_hierarchies(d).into_iter().next())
}

/// One overload of a function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub syntax: Syntax,
    pub builtin: Builtin,
    pub params: Vec<Category>,
    /// A group of trailing parameters that may repeat zero or more times
    pub variadic: Vec<Category>,
    pub returns: TypeRule,
    pub dependency: DependencyRule,
}

impl FunctionSignature {
    pub fn new(
        name: impl Into<String>,
        syntax: Syntax,
        builtin: Builtin,
        params: &[Category],
        returns: TypeRule,
    ) -> Self {
        Self {
            name: name.into(),
            syntax,
            builtin,
            params: params.to_vec(),
            variadic: Vec::new(),
            returns,
            dependency: DependencyRule::Default,
        }
    }

    pub fn variadic(mut self, group: &[Category]) -> Self {
        self.variadic = group.to_vec();
        self
    }

    pub fn depends(mut self, rule: DependencyRule) -> Self {
        self.dependency = rule;
        self
    }

    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.variadic.is_empty() {
            return count == self.params.len();
        }
        count >= self.params.len() && (count - self.params.len()) % self.variadic.len() == 0
    }

    /// Category expected at argument position `index`
    pub fn param(&self, index: usize) -> Option<Category> {
        if let Some(category) = self.params.get(index) {
            return Some(*category);
        }
        if self.variadic.is_empty() {
            return None;
        }
        let offset = (index - self.params.len()) % self.variadic.len();
        self.variadic.get(offset).copied()
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        if !self.variadic.is_empty() {
            let group: Vec<String> = self.variadic.iter().map(ToString::to_string).collect();
            write!(f, ", [{}]...", group.join(", "))?;
        }
        write!(f, ") {}", self.syntax.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variadic_arity() {
        let order = FunctionSignature::new(
            "Order",
            Syntax::Function,
            Builtin::Order,
            &[Category::Set, Category::Value, Category::Symbol(&["ASC"])],
            TypeRule::SameAs(0),
        )
        .variadic(&[Category::Value, Category::Symbol(&["ASC"])]);

        assert!(order.accepts_arity(3));
        assert!(!order.accepts_arity(4));
        assert!(order.accepts_arity(5));
        assert_eq!(order.param(3), Some(Category::Value));
        assert_eq!(order.param(4), Some(Category::Symbol(&["ASC"])));
    }

    #[test]
    fn test_dependency_order() {
        assert!(Dependency::Yes > Dependency::Maybe);
        assert_eq!(Dependency::No.max(Dependency::Maybe), Dependency::Maybe);
    }
}
