//! Names defined by a query

use crate::error::{ResolutionError, ResolutionResult};
use crate::types::OlapType;
use cubeql_model::{HierarchyId, Member};
use indexmap::IndexMap;

/// A named set visible to the query's expressions
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSetInfo {
    pub name: String,
    pub ty: OlapType,
    /// Position in definition order; named sets are materialized in this
    /// order
    pub index: usize,
}

/// Named sets and calculated members defined by `WITH`
#[derive(Debug, Clone, Default)]
pub struct QueryScope {
    named_sets: IndexMap<String, NamedSetInfo>,
    members: IndexMap<String, Member>,
}

fn key(name: &str) -> String {
    name.trim_start_matches('[')
        .trim_end_matches(']')
        .to_uppercase()
}

impl QueryScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_set(&mut self, name: &str, ty: OlapType) -> ResolutionResult<usize> {
        let key = key(name);
        if self.named_sets.contains_key(&key) {
            return Err(ResolutionError::DuplicateDefinition(name.to_string()));
        }
        let index = self.named_sets.len();
        self.named_sets.insert(
            key,
            NamedSetInfo {
                name: name.to_string(),
                ty,
                index,
            },
        );
        Ok(index)
    }

    pub fn named_set(&self, name: &str) -> Option<&NamedSetInfo> {
        self.named_sets.get(&key(name))
    }

    pub fn named_sets(&self) -> impl Iterator<Item = &NamedSetInfo> {
        self.named_sets.values()
    }

    pub fn define_member(&mut self, unique_name: &str, member: Member) -> ResolutionResult<()> {
        let key = unique_name.to_uppercase();
        if self.members.contains_key(&key) {
            return Err(ResolutionError::DuplicateDefinition(unique_name.to_string()));
        }
        self.members.insert(key, member);
        Ok(())
    }

    pub fn calculated_members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Calculated members of one hierarchy, in definition order
    pub fn calculated_members_of(&self, hierarchy: HierarchyId) -> Vec<Member> {
        self.members
            .values()
            .filter(|m| m.hierarchy() == hierarchy)
            .cloned()
            .collect()
    }
}
