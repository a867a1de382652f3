//! Member handles
//!
//! A [`Member`] is a cheap value: stored members are arena ids, calculated
//! members are shared behind an `Arc`, and every hierarchy has a null member
//! sentinel that navigation returns instead of failing.

use crate::ids::{HierarchyId, LevelId, MemberId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A member of some hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Member {
    /// The null member sentinel of a hierarchy
    Null(HierarchyId),
    /// A member stored in the cube's arena
    Stored(MemberId),
    /// A member defined by a formula or aggregating other members
    Calculated(Arc<CalculatedMember>),
}

impl Member {
    /// The hierarchy the member belongs to
    pub fn hierarchy(&self) -> HierarchyId {
        match self {
            Member::Null(h) => *h,
            Member::Stored(id) => id.hierarchy,
            Member::Calculated(calc) => calc.hierarchy,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Member::Null(_))
    }

    pub fn is_calculated(&self) -> bool {
        matches!(self, Member::Calculated(_))
    }

    /// The arena id of a stored member
    pub fn stored(&self) -> Option<MemberId> {
        match self {
            Member::Stored(id) => Some(*id),
            _ => None,
        }
    }

    /// The definition of a calculated member
    pub fn calculated(&self) -> Option<&CalculatedMember> {
        match self {
            Member::Calculated(calc) => Some(calc),
            _ => None,
        }
    }
}

impl From<MemberId> for Member {
    fn from(id: MemberId) -> Self {
        Member::Stored(id)
    }
}

impl From<CalculatedMember> for Member {
    fn from(calc: CalculatedMember) -> Self {
        Member::Calculated(Arc::new(calc))
    }
}

/// How a calculated member computes its cell value
#[derive(Debug, Clone)]
pub enum CalculatedBody {
    /// A formula compiled by the evaluator, keyed by the member's unique name
    Formula,
    /// The rollup of other members of the same hierarchy, using the current
    /// measure's aggregator
    Aggregate(Vec<Member>),
}

/// A member that does not exist in the cube's arena
#[derive(Debug, Clone)]
pub struct CalculatedMember {
    pub hierarchy: HierarchyId,
    pub name: String,
    pub caption: String,
    pub unique_name: String,
    pub parent: Option<Member>,
    pub level: LevelId,
    pub solve_order: i32,
    pub body: CalculatedBody,
}

impl CalculatedMember {
    /// A formula member; its expression is registered with the evaluator
    /// separately under `unique_name`.
    pub fn formula(
        level: LevelId,
        name: impl Into<String>,
        unique_name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            hierarchy: level.hierarchy,
            caption: name.clone(),
            name,
            unique_name: unique_name.into(),
            parent: None,
            level,
            solve_order: 0,
            body: CalculatedBody::Formula,
        }
    }

    /// A member aggregating `members` (visual totals, compound slicers)
    pub fn aggregate(
        level: LevelId,
        name: impl Into<String>,
        unique_name: impl Into<String>,
        members: Vec<Member>,
    ) -> Self {
        let name = name.into();
        Self {
            hierarchy: level.hierarchy,
            caption: name.clone(),
            name,
            unique_name: unique_name.into(),
            parent: None,
            level,
            solve_order: 0,
            body: CalculatedBody::Aggregate(members),
        }
    }

    pub fn with_parent(mut self, parent: Option<Member>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_solve_order(mut self, solve_order: i32) -> Self {
        self.solve_order = solve_order;
        self
    }

    /// Members rolled up by an aggregate body
    pub fn aggregated_members(&self) -> Option<&[Member]> {
        match &self.body {
            CalculatedBody::Aggregate(members) => Some(members),
            CalculatedBody::Formula => None,
        }
    }
}

impl PartialEq for CalculatedMember {
    fn eq(&self, other: &Self) -> bool {
        self.hierarchy == other.hierarchy && self.unique_name == other.unique_name
    }
}

impl Eq for CalculatedMember {}

impl Hash for CalculatedMember {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hierarchy.hash(state);
        self.unique_name.hash(state);
    }
}

impl fmt::Display for CalculatedMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name)
    }
}
