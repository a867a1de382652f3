//! Arena identifiers for cube metadata objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a dimension within its cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimensionId(pub u32);

/// Index of a hierarchy within its cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HierarchyId(pub u32);

/// A level, addressed by its hierarchy and depth (0 is the top level)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelId {
    pub hierarchy: HierarchyId,
    pub depth: u16,
}

/// A stored member, addressed by its hierarchy and arena index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId {
    pub hierarchy: HierarchyId,
    pub index: u32,
}

impl HierarchyId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl DimensionId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl LevelId {
    pub const fn new(hierarchy: HierarchyId, depth: u16) -> Self {
        Self { hierarchy, depth }
    }
}

impl MemberId {
    pub const fn new(hierarchy: HierarchyId, index: u32) -> Self {
        Self { hierarchy, index }
    }
}

impl fmt::Display for HierarchyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Quote a metadata name the way unique names spell it: `[name]`, with `]`
/// doubled.
pub fn quote_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('[');
    for c in name.chars() {
        if c == ']' {
            out.push(']');
        }
        out.push(c);
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_name() {
        assert_eq!(quote_name("Time"), "[Time]");
        assert_eq!(quote_name("a]b"), "[a]]b]");
    }
}
