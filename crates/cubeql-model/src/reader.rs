//! The read-only navigation interface used during evaluation
//!
//! [`SchemaReader`] is object safe so the evaluator can hold it as
//! `Arc<dyn SchemaReader>`. Navigation never fails: the null member answers
//! every query with "nothing" and foreign ids behave like the null member.

use crate::cube::Cube;
use crate::definition::{Aggregator, DimensionKind, LevelKind};
use crate::ids::{DimensionId, HierarchyId, LevelId};
use crate::member::Member;
use smallvec::SmallVec;

pub const NULL_MEMBER_NAME: &str = "#null";

/// Read-only access to cube metadata
pub trait SchemaReader: Send + Sync {
    fn cube_name(&self) -> &str;

    // Dimensions and hierarchies

    fn dimensions(&self) -> Vec<DimensionId>;
    fn dimension_name(&self, dimension: DimensionId) -> &str;
    fn dimension_unique_name(&self, dimension: DimensionId) -> &str;
    fn dimension_kind(&self, dimension: DimensionId) -> DimensionKind;
    fn dimension_hierarchies(&self, dimension: DimensionId) -> Vec<HierarchyId>;

    /// Every hierarchy of the cube, measures first
    fn hierarchies(&self) -> Vec<HierarchyId>;
    fn hierarchy_dimension(&self, hierarchy: HierarchyId) -> DimensionId;
    fn hierarchy_name(&self, hierarchy: HierarchyId) -> &str;
    fn hierarchy_unique_name(&self, hierarchy: HierarchyId) -> &str;
    fn measures_hierarchy(&self) -> HierarchyId;
    fn has_all(&self, hierarchy: HierarchyId) -> bool;
    fn all_member(&self, hierarchy: HierarchyId) -> Option<Member>;
    fn default_member(&self, hierarchy: HierarchyId) -> Member;

    fn null_member(&self, hierarchy: HierarchyId) -> Member {
        Member::Null(hierarchy)
    }

    // Levels

    fn levels(&self, hierarchy: HierarchyId) -> Vec<LevelId>;
    fn level_name(&self, level: LevelId) -> &str;
    fn level_unique_name(&self, level: LevelId) -> &str;
    fn level_kind(&self, level: LevelId) -> LevelKind;
    /// Stored members of a level in hierarchical order
    fn level_members(&self, level: LevelId) -> Vec<Member>;

    // Navigation

    fn parent(&self, member: &Member) -> Option<Member>;
    fn children(&self, member: &Member) -> Vec<Member>;
    fn member_level(&self, member: &Member) -> Option<LevelId>;
    /// Members sharing the parent of `member`, and the member's position
    /// among them
    fn siblings_and_index(&self, member: &Member) -> Option<(Vec<Member>, usize)>;
    fn is_all(&self, member: &Member) -> bool;

    fn is_null(&self, member: &Member) -> bool {
        member.is_null()
    }

    /// Depth of the member's level; `-1` for the null member
    fn depth(&self, member: &Member) -> i32 {
        self.member_level(member).map_or(-1, |l| i32::from(l.depth))
    }

    /// Pre-order position within the hierarchy; `-1` for the null member
    fn ordinal(&self, member: &Member) -> i64;

    /// Sibling positions from the root down, used to put members in
    /// hierarchical order. Calculated members sort after their siblings.
    fn hierarchy_path(&self, member: &Member) -> SmallVec<[u32; 8]>;

    // Names and properties

    fn member_name<'a>(&'a self, member: &'a Member) -> &'a str;
    fn member_caption<'a>(&'a self, member: &'a Member) -> &'a str;
    fn member_unique_name<'a>(&'a self, member: &'a Member) -> &'a str;
    fn member_key<'a>(&'a self, member: &'a Member) -> &'a str;
    fn member_property(&self, member: &Member, name: &str) -> Option<serde_json::Value>;

    // Lookups by unique name

    fn lookup_dimension(&self, unique_name: &str) -> Option<DimensionId>;
    fn lookup_hierarchy(&self, unique_name: &str) -> Option<HierarchyId>;
    fn lookup_level(&self, unique_name: &str) -> Option<LevelId>;
    fn lookup_member(&self, unique_name: &str) -> Option<Member>;

    /// How a stored measure rolls up
    fn measure_aggregator(&self, member: &Member) -> Option<Aggregator>;
}

impl SchemaReader for Cube {
    fn cube_name(&self) -> &str {
        self.name()
    }

    fn dimensions(&self) -> Vec<DimensionId> {
        self.dimension_list().iter().map(|d| d.id).collect()
    }

    fn dimension_name(&self, dimension: DimensionId) -> &str {
        self.dimension(dimension).map_or("", |d| d.name.as_str())
    }

    fn dimension_unique_name(&self, dimension: DimensionId) -> &str {
        self.dimension(dimension).map_or("", |d| d.unique_name.as_str())
    }

    fn dimension_kind(&self, dimension: DimensionId) -> DimensionKind {
        self.dimension(dimension)
            .map_or(DimensionKind::Standard, |d| d.kind)
    }

    fn dimension_hierarchies(&self, dimension: DimensionId) -> Vec<HierarchyId> {
        self.dimension(dimension)
            .map(|d| d.hierarchies.to_vec())
            .unwrap_or_default()
    }

    fn hierarchies(&self) -> Vec<HierarchyId> {
        self.hierarchy_list().iter().map(|h| h.id).collect()
    }

    fn hierarchy_dimension(&self, hierarchy: HierarchyId) -> DimensionId {
        self.hierarchy(hierarchy)
            .map_or(DimensionId(0), |h| h.dimension)
    }

    fn hierarchy_name(&self, hierarchy: HierarchyId) -> &str {
        self.hierarchy(hierarchy).map_or("", |h| h.name.as_str())
    }

    fn hierarchy_unique_name(&self, hierarchy: HierarchyId) -> &str {
        self.hierarchy(hierarchy)
            .map_or("", |h| h.unique_name.as_str())
    }

    fn measures_hierarchy(&self) -> HierarchyId {
        self.measures_id()
    }

    fn has_all(&self, hierarchy: HierarchyId) -> bool {
        self.hierarchy(hierarchy).is_some_and(|h| h.has_all)
    }

    fn all_member(&self, hierarchy: HierarchyId) -> Option<Member> {
        let h = self.hierarchy(hierarchy)?;
        if h.has_all {
            h.roots.first().copied().map(Member::Stored)
        } else {
            None
        }
    }

    fn default_member(&self, hierarchy: HierarchyId) -> Member {
        self.hierarchy(hierarchy)
            .and_then(|h| h.default_member)
            .map_or(Member::Null(hierarchy), Member::Stored)
    }

    fn levels(&self, hierarchy: HierarchyId) -> Vec<LevelId> {
        self.hierarchy(hierarchy)
            .map(|h| h.levels.iter().map(|l| l.id).collect())
            .unwrap_or_default()
    }

    fn level_name(&self, level: LevelId) -> &str {
        self.level(level).map_or("", |l| l.name.as_str())
    }

    fn level_unique_name(&self, level: LevelId) -> &str {
        self.level(level).map_or("", |l| l.unique_name.as_str())
    }

    fn level_kind(&self, level: LevelId) -> LevelKind {
        self.level(level).map_or(LevelKind::Regular, |l| l.kind)
    }

    fn level_members(&self, level: LevelId) -> Vec<Member> {
        self.level(level)
            .map(|l| l.members.iter().copied().map(Member::Stored).collect())
            .unwrap_or_default()
    }

    fn parent(&self, member: &Member) -> Option<Member> {
        match member {
            Member::Null(_) => None,
            Member::Stored(id) => self
                .member_data(*id)
                .and_then(|d| d.parent)
                .map(Member::Stored),
            Member::Calculated(calc) => calc.parent.clone(),
        }
    }

    fn children(&self, member: &Member) -> Vec<Member> {
        match member {
            Member::Stored(id) => self
                .member_data(*id)
                .map(|d| d.children.iter().copied().map(Member::Stored).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn member_level(&self, member: &Member) -> Option<LevelId> {
        match member {
            Member::Null(_) => None,
            Member::Stored(id) => self
                .member_data(*id)
                .map(|d| LevelId::new(id.hierarchy, d.depth)),
            Member::Calculated(calc) => Some(calc.level),
        }
    }

    fn siblings_and_index(&self, member: &Member) -> Option<(Vec<Member>, usize)> {
        match member {
            Member::Null(_) => None,
            Member::Stored(id) => {
                let data = self.member_data(*id)?;
                let siblings = match data.parent {
                    Some(parent) => self.children(&Member::Stored(parent)),
                    None => self
                        .hierarchy(id.hierarchy)?
                        .roots
                        .iter()
                        .copied()
                        .map(Member::Stored)
                        .collect(),
                };
                Some((siblings, data.sibling_index as usize))
            }
            Member::Calculated(calc) => {
                let mut siblings = match &calc.parent {
                    Some(parent) => self.children(parent),
                    None => self.level_members(calc.level),
                };
                siblings.push(member.clone());
                let index = siblings.len() - 1;
                Some((siblings, index))
            }
        }
    }

    fn is_all(&self, member: &Member) -> bool {
        member
            .stored()
            .and_then(|id| self.member_data(id))
            .is_some_and(|d| d.is_all)
    }

    fn ordinal(&self, member: &Member) -> i64 {
        match member {
            Member::Null(_) => -1,
            Member::Stored(id) => self
                .member_data(*id)
                .map_or(-1, |d| i64::from(d.ordinal)),
            Member::Calculated(calc) => calc
                .parent
                .as_ref()
                .and_then(|p| p.stored())
                .and_then(|id| self.member_data(id))
                .map_or(-1, |d| i64::from(d.subtree_end) - 1),
        }
    }

    fn hierarchy_path(&self, member: &Member) -> SmallVec<[u32; 8]> {
        match member {
            Member::Null(_) => SmallVec::new(),
            Member::Stored(id) => self
                .member_data(*id)
                .map(|d| d.path.clone())
                .unwrap_or_default(),
            Member::Calculated(calc) => {
                let mut path = calc
                    .parent
                    .as_ref()
                    .map(|p| self.hierarchy_path(p))
                    .unwrap_or_default();
                path.push(u32::MAX);
                path
            }
        }
    }

    fn member_name<'a>(&'a self, member: &'a Member) -> &'a str {
        match member {
            Member::Null(_) => NULL_MEMBER_NAME,
            Member::Stored(id) => self.member_data(*id).map_or("", |d| d.name.as_str()),
            Member::Calculated(calc) => &calc.name,
        }
    }

    fn member_caption<'a>(&'a self, member: &'a Member) -> &'a str {
        match member {
            Member::Null(_) => NULL_MEMBER_NAME,
            Member::Stored(id) => self.member_data(*id).map_or("", |d| d.caption.as_str()),
            Member::Calculated(calc) => &calc.caption,
        }
    }

    fn member_unique_name<'a>(&'a self, member: &'a Member) -> &'a str {
        match member {
            Member::Null(_) => NULL_MEMBER_NAME,
            Member::Stored(id) => self
                .member_data(*id)
                .map_or("", |d| d.unique_name.as_str()),
            Member::Calculated(calc) => &calc.unique_name,
        }
    }

    fn member_key<'a>(&'a self, member: &'a Member) -> &'a str {
        match member {
            Member::Stored(id) => self.member_data(*id).map_or("", |d| d.key.as_str()),
            _ => self.member_name(member),
        }
    }

    fn member_property(&self, member: &Member, name: &str) -> Option<serde_json::Value> {
        let data = self.member_data(member.stored()?)?;
        data.properties.get(name).cloned()
    }

    fn lookup_dimension(&self, unique_name: &str) -> Option<DimensionId> {
        self.dimension_id(unique_name)
    }

    fn lookup_hierarchy(&self, unique_name: &str) -> Option<HierarchyId> {
        self.hierarchy_id(unique_name)
    }

    fn lookup_level(&self, unique_name: &str) -> Option<LevelId> {
        self.level_id(unique_name)
    }

    fn lookup_member(&self, unique_name: &str) -> Option<Member> {
        self.member_id(unique_name).map(Member::Stored)
    }

    fn measure_aggregator(&self, member: &Member) -> Option<Aggregator> {
        self.member_data(member.stored()?)?.aggregator
    }
}
