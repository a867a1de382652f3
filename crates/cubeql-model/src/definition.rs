//! Serializable cube definitions
//!
//! A [`CubeDefinition`] describes dimensions, hierarchies, levels, members
//! and measures. It can be loaded from JSON or assembled in code with the
//! fluent helpers and [`CubeBuilder`].
//!
//! Members are placed by their parent path: the names of their ancestors
//! below the All member, outermost first. A member may name its level
//! explicitly to skip levels (ragged hierarchies). In parent-child
//! hierarchies only the last element of the parent path is used, and it
//! names the parent member directly.

use crate::cube::Cube;
use crate::error::ModelError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What a dimension represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DimensionKind {
    #[default]
    Standard,
    Time,
    Measures,
}

/// What a level represents; time kinds drive the period functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LevelKind {
    #[default]
    Regular,
    All,
    TimeYears,
    TimeQuarters,
    TimeMonths,
    TimeWeeks,
    TimeDays,
}

impl LevelKind {
    pub fn is_time(self) -> bool {
        matches!(
            self,
            LevelKind::TimeYears
                | LevelKind::TimeQuarters
                | LevelKind::TimeMonths
                | LevelKind::TimeWeeks
                | LevelKind::TimeDays
        )
    }
}

/// How a measure rolls up leaf facts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Aggregator {
    #[default]
    Sum,
    Count,
    Min,
    Max,
    DistinctCount,
}

impl Aggregator {
    /// Whether partial results of this aggregator can be combined again
    pub fn can_rollup(self) -> bool {
        !matches!(self, Aggregator::DistinctCount)
    }
}

/// Definition of a whole cube
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CubeDefinition {
    pub name: String,
    #[serde(default)]
    pub dimensions: Vec<DimensionDefinition>,
    #[serde(default)]
    pub measures: Vec<MeasureDefinition>,
}

impl CubeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a definition from JSON
    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the cube described by this definition
    pub fn build(&self) -> Result<Cube, ModelError> {
        Cube::from_definition(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: DimensionKind,
    #[serde(default)]
    pub hierarchies: Vec<HierarchyDefinition>,
}

impl DimensionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DimensionKind::Standard,
            hierarchies: Vec::new(),
        }
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name).kind(DimensionKind::Time)
    }

    pub fn kind(mut self, kind: DimensionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn hierarchy(mut self, hierarchy: HierarchyDefinition) -> Self {
        self.hierarchies.push(hierarchy);
        self
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyDefinition {
    /// Defaults to the dimension name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub has_all: bool,
    #[serde(default)]
    pub all_member_name: Option<String>,
    #[serde(default)]
    pub parent_child: bool,
    pub levels: Vec<LevelDefinition>,
    #[serde(default)]
    pub members: Vec<MemberDefinition>,
}

impl Default for HierarchyDefinition {
    fn default() -> Self {
        Self {
            name: None,
            has_all: true,
            all_member_name: None,
            parent_child: false,
            levels: Vec::new(),
            members: Vec::new(),
        }
    }
}

impl HierarchyDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn without_all(mut self) -> Self {
        self.has_all = false;
        self
    }

    pub fn all_member(mut self, name: impl Into<String>) -> Self {
        self.all_member_name = Some(name.into());
        self
    }

    /// Make this a parent-child hierarchy with a single declared level
    pub fn parent_child(mut self, level: impl Into<String>) -> Self {
        self.parent_child = true;
        self.levels = vec![LevelDefinition::new(level)];
        self
    }

    pub fn level(mut self, name: impl Into<String>, kind: LevelKind) -> Self {
        self.levels.push(LevelDefinition {
            name: name.into(),
            kind,
        });
        self
    }

    /// Add a member by its full path; the last element is its name
    pub fn member(mut self, path: &[&str]) -> Self {
        if let Some((name, parent)) = path.split_last() {
            self.members.push(MemberDefinition::new(*name).parent(parent));
        }
        self
    }

    /// Add a member at an explicit level, skipping intermediate levels
    pub fn member_at(mut self, level: &str, path: &[&str]) -> Self {
        if let Some((name, parent)) = path.split_last() {
            self.members
                .push(MemberDefinition::new(*name).parent(parent).at_level(level));
        }
        self
    }

    pub fn member_def(mut self, member: MemberDefinition) -> Self {
        self.members.push(member);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDefinition {
    pub name: String,
    #[serde(default)]
    pub kind: LevelKind,
}

impl LevelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LevelKind::Regular,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDefinition {
    pub name: String,
    #[serde(default)]
    pub parent: Vec<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub properties: IndexMap<String, serde_json::Value>,
}

impl MemberDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn parent(mut self, path: &[&str]) -> Self {
        self.parent = path.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn at_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureDefinition {
    pub name: String,
    #[serde(default)]
    pub aggregator: Aggregator,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Fluent builder for cubes assembled in code
#[derive(Debug, Clone, Default)]
pub struct CubeBuilder {
    definition: CubeDefinition,
}

impl CubeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: CubeDefinition::new(name),
        }
    }

    pub fn dimension(mut self, dimension: DimensionDefinition) -> Self {
        self.definition.dimensions.push(dimension);
        self
    }

    pub fn measure(mut self, name: impl Into<String>, aggregator: Aggregator) -> Self {
        self.definition.measures.push(MeasureDefinition {
            name: name.into(),
            aggregator,
            caption: None,
        });
        self
    }

    pub fn definition(&self) -> &CubeDefinition {
        &self.definition
    }

    pub fn into_definition(self) -> CubeDefinition {
        self.definition
    }

    pub fn build(self) -> Result<Cube, ModelError> {
        Cube::from_definition(&self.definition)
    }
}
