//! OLAP expression types
//!
//! Member, level and hierarchy types carry whatever provenance is known
//! statically. A set's element type is always known without evaluating the
//! set, which is what lets the evaluator check crossjoin arity and the
//! dependency analysis mask iterated hierarchies.

use cubeql_model::{DimensionId, HierarchyId, LevelId, SchemaReader};
use smallvec::SmallVec;
use std::fmt;

/// Provenance of a member-valued expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemberType {
    pub dimension: Option<DimensionId>,
    pub hierarchy: Option<HierarchyId>,
    pub level: Option<LevelId>,
}

impl MemberType {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn of_hierarchy(schema: &dyn SchemaReader, hierarchy: HierarchyId) -> Self {
        Self {
            dimension: Some(schema.hierarchy_dimension(hierarchy)),
            hierarchy: Some(hierarchy),
            level: None,
        }
    }

    pub fn of_level(schema: &dyn SchemaReader, level: LevelId) -> Self {
        Self {
            level: Some(level),
            ..Self::of_hierarchy(schema, level.hierarchy)
        }
    }

    /// Same hierarchy, level unknown
    pub fn any_level(self) -> Self {
        Self {
            level: None,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleType {
    pub elements: SmallVec<[MemberType; 4]>,
}

impl TupleType {
    pub fn new(elements: impl IntoIterator<Item = MemberType>) -> Self {
        Self {
            elements: elements.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetType {
    /// `Member` or `Tuple`
    pub element: Box<OlapType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LevelType {
    pub dimension: Option<DimensionId>,
    pub hierarchy: Option<HierarchyId>,
    pub level: Option<LevelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HierarchyType {
    pub dimension: Option<DimensionId>,
    pub hierarchy: Option<HierarchyId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DimensionType {
    pub dimension: Option<DimensionId>,
}

/// The static type of an expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OlapType {
    Numeric,
    String,
    Logical,
    /// The `NULL` literal, convertible to any scalar
    Null,
    /// A scalar whose kind is only known at evaluation time (cell values)
    Scalar,
    /// A keyword argument such as `BDESC`
    Symbol,
    Member(MemberType),
    Tuple(TupleType),
    Set(SetType),
    Level(LevelType),
    Hierarchy(HierarchyType),
    Dimension(DimensionType),
}

impl OlapType {
    pub fn member(member: MemberType) -> Self {
        OlapType::Member(member)
    }

    pub fn set_of(element: OlapType) -> Self {
        OlapType::Set(SetType {
            element: Box::new(element),
        })
    }

    pub fn set_of_members(member: MemberType) -> Self {
        Self::set_of(OlapType::Member(member))
    }

    /// An empty set literal's type: members of an unknown hierarchy
    pub fn empty_set() -> Self {
        Self::set_of_members(MemberType::unknown())
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            OlapType::Numeric | OlapType::String | OlapType::Logical | OlapType::Null | OlapType::Scalar
        )
    }

    pub fn category(&self) -> Category {
        match self {
            OlapType::Numeric => Category::Numeric,
            OlapType::String => Category::String,
            OlapType::Logical => Category::Logical,
            OlapType::Null | OlapType::Scalar => Category::Value,
            OlapType::Symbol => Category::Symbol(&[]),
            OlapType::Member(_) => Category::Member,
            OlapType::Tuple(_) => Category::Tuple,
            OlapType::Set(_) => Category::Set,
            OlapType::Level(_) => Category::Level,
            OlapType::Hierarchy(_) => Category::Hierarchy,
            OlapType::Dimension(_) => Category::Dimension,
        }
    }

    /// Element type of a set, or the type itself for members and tuples
    pub fn element(&self) -> &OlapType {
        match self {
            OlapType::Set(set) => &set.element,
            other => other,
        }
    }

    /// Member types making up one element: one for a member, one per
    /// position for a tuple
    pub fn member_types(&self) -> SmallVec<[MemberType; 4]> {
        match self.element() {
            OlapType::Member(m) => smallvec::smallvec![*m],
            OlapType::Tuple(t) => t.elements.clone(),
            _ => SmallVec::new(),
        }
    }

    /// Hierarchies of one element, `None` where unknown
    pub fn hierarchies(&self) -> SmallVec<[Option<HierarchyId>; 4]> {
        self.member_types().iter().map(|m| m.hierarchy).collect()
    }

    /// Arity of a member, tuple or set element
    pub fn arity(&self) -> usize {
        match self.element() {
            OlapType::Member(_) => 1,
            OlapType::Tuple(t) => t.elements.len(),
            _ => 0,
        }
    }

    /// Member provenance carried by a member, level, hierarchy or dimension
    /// type
    pub fn member_type(&self) -> MemberType {
        match self {
            OlapType::Member(m) => *m,
            OlapType::Level(l) => MemberType {
                dimension: l.dimension,
                hierarchy: l.hierarchy,
                level: None,
            },
            OlapType::Hierarchy(h) => MemberType {
                dimension: h.dimension,
                hierarchy: h.hierarchy,
                level: None,
            },
            OlapType::Dimension(d) => MemberType {
                dimension: d.dimension,
                hierarchy: None,
                level: None,
            },
            OlapType::Set(set) => match set.element.as_ref() {
                OlapType::Member(m) => *m,
                _ => MemberType::unknown(),
            },
            _ => MemberType::unknown(),
        }
    }

    /// Describe the type with metadata names, for error messages
    pub fn describe(&self, schema: &dyn SchemaReader) -> String {
        let member = |m: &MemberType| match m.hierarchy {
            Some(h) => format!("Member<{}>", schema.hierarchy_unique_name(h)),
            None => "Member".to_string(),
        };
        match self {
            OlapType::Member(m) => member(m),
            OlapType::Tuple(t) => format!(
                "Tuple<{}>",
                t.elements.iter().map(member).collect::<Vec<_>>().join(", ")
            ),
            OlapType::Set(set) => format!("Set<{}>", set.element.describe(schema)),
            OlapType::Level(l) => match l.level {
                Some(level) => format!("Level<{}>", schema.level_unique_name(level)),
                None => "Level".to_string(),
            },
            OlapType::Hierarchy(h) => match h.hierarchy {
                Some(id) => format!("Hierarchy<{}>", schema.hierarchy_unique_name(id)),
                None => "Hierarchy".to_string(),
            },
            OlapType::Dimension(d) => match d.dimension {
                Some(id) => format!("Dimension<{}>", schema.dimension_unique_name(id)),
                None => "Dimension".to_string(),
            },
            other => other.to_string(),
        }
    }
}

fn write_member(f: &mut fmt::Formatter<'_>, m: &MemberType) -> fmt::Result {
    match m.hierarchy {
        Some(h) => write!(f, "Member<{}>", h),
        None => f.write_str("Member"),
    }
}

impl fmt::Display for OlapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OlapType::Numeric => f.write_str("Numeric"),
            OlapType::String => f.write_str("String"),
            OlapType::Logical => f.write_str("Logical"),
            OlapType::Null => f.write_str("Null"),
            OlapType::Scalar => f.write_str("Scalar"),
            OlapType::Symbol => f.write_str("Symbol"),
            OlapType::Member(m) => write_member(f, m),
            OlapType::Tuple(t) => {
                f.write_str("Tuple<")?;
                for (i, m) in t.elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_member(f, m)?;
                }
                f.write_str(">")
            }
            OlapType::Set(set) => write!(f, "Set<{}>", set.element),
            OlapType::Level(_) => f.write_str("Level"),
            OlapType::Hierarchy(_) => f.write_str("Hierarchy"),
            OlapType::Dimension(_) => f.write_str("Dimension"),
        }
    }
}

/// The coarse parameter kind used by function signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Numeric,
    String,
    Logical,
    /// Any scalar
    Value,
    Member,
    Tuple,
    Set,
    Level,
    Hierarchy,
    Dimension,
    /// A keyword drawn from the given list; an empty list accepts any
    Symbol(&'static [&'static str]),
}

impl Category {
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Category::Numeric | Category::String | Category::Logical | Category::Value
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Numeric => "Numeric",
            Category::String => "String",
            Category::Logical => "Logical",
            Category::Value => "Value",
            Category::Member => "Member",
            Category::Tuple => "Tuple",
            Category::Set => "Set",
            Category::Level => "Level",
            Category::Hierarchy => "Hierarchy",
            Category::Dimension => "Dimension",
            Category::Symbol(_) => "Symbol",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let store = MemberType {
            dimension: Some(DimensionId(2)),
            hierarchy: Some(HierarchyId(3)),
            level: None,
        };
        let tuple = OlapType::Tuple(TupleType::new([store, MemberType::unknown()]));
        insta::assert_snapshot!(OlapType::set_of(tuple.clone()), @"Set<Tuple<Member<h3>, Member>>");
        assert_eq!(tuple.arity(), 2);
        assert_eq!(
            OlapType::set_of(tuple).hierarchies().to_vec(),
            vec![Some(HierarchyId(3)), None]
        );
    }

    #[test]
    fn test_member_type_from_level() {
        let level = OlapType::Level(LevelType {
            dimension: Some(DimensionId(1)),
            hierarchy: Some(HierarchyId(1)),
            level: Some(LevelId::new(HierarchyId(1), 2)),
        });
        let m = level.member_type();
        assert_eq!(m.hierarchy, Some(HierarchyId(1)));
        assert_eq!(m.level, None);
    }
}
