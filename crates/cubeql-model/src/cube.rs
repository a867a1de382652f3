//! In-memory cube metadata
//!
//! A [`Cube`] owns its dimensions, hierarchies, levels and member arenas.
//! Every structural fact the navigation functions need (children, pre-order
//! ordinals, sibling positions, subtree extents) is computed once at build
//! time, so the reader side is pure lookups.

use crate::definition::{
    Aggregator, CubeDefinition, DimensionKind, HierarchyDefinition, LevelKind, MemberDefinition,
};
use crate::error::ModelError;
use crate::ids::{DimensionId, HierarchyId, LevelId, MemberId, quote_name};
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::collections::HashMap;

pub const MEASURES_DIMENSION: &str = "Measures";
pub const MEASURES_LEVEL: &str = "MeasuresLevel";

#[derive(Debug, Clone)]
pub struct Dimension {
    pub id: DimensionId,
    pub name: String,
    pub unique_name: String,
    pub kind: DimensionKind,
    pub hierarchies: SmallVec<[HierarchyId; 2]>,
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub id: HierarchyId,
    pub dimension: DimensionId,
    pub name: String,
    pub unique_name: String,
    pub has_all: bool,
    pub parent_child: bool,
    pub levels: Vec<Level>,
    pub members: Vec<MemberData>,
    pub roots: Vec<MemberId>,
    pub default_member: Option<MemberId>,
}

#[derive(Debug, Clone)]
pub struct Level {
    pub id: LevelId,
    pub name: String,
    pub unique_name: String,
    pub kind: LevelKind,
    /// Members of the level in hierarchical order
    pub members: Vec<MemberId>,
}

#[derive(Debug, Clone)]
pub struct MemberData {
    pub id: MemberId,
    pub name: String,
    pub caption: String,
    pub unique_name: String,
    pub key: String,
    pub depth: u16,
    pub parent: Option<MemberId>,
    pub children: Vec<MemberId>,
    /// Pre-order position within the hierarchy
    pub ordinal: u32,
    /// One past the ordinal of the last descendant
    pub subtree_end: u32,
    pub sibling_index: u32,
    /// Sibling indices from the root down to this member
    pub path: SmallVec<[u32; 8]>,
    pub is_all: bool,
    pub properties: IndexMap<String, serde_json::Value>,
    pub aggregator: Option<Aggregator>,
}

impl MemberData {
    fn new(id: MemberId, name: String, unique_name: String, depth: u16) -> Self {
        Self {
            id,
            caption: name.clone(),
            key: name.clone(),
            name,
            unique_name,
            depth,
            parent: None,
            children: Vec::new(),
            ordinal: 0,
            subtree_end: 0,
            sibling_index: 0,
            path: SmallVec::new(),
            is_all: false,
            properties: IndexMap::new(),
            aggregator: None,
        }
    }
}

/// A cube: dimensions, hierarchies and their members
#[derive(Debug, Clone)]
pub struct Cube {
    name: String,
    dimensions: Vec<Dimension>,
    hierarchies: Vec<Hierarchy>,
    measures: HierarchyId,
    dimension_names: HashMap<String, DimensionId>,
    hierarchy_names: HashMap<String, HierarchyId>,
    level_names: HashMap<String, LevelId>,
    member_names: HashMap<String, MemberId>,
}

impl Cube {
    pub fn from_definition(def: &CubeDefinition) -> Result<Self, ModelError> {
        let mut cube = Cube {
            name: def.name.clone(),
            dimensions: Vec::new(),
            hierarchies: Vec::new(),
            measures: HierarchyId(0),
            dimension_names: HashMap::new(),
            hierarchy_names: HashMap::new(),
            level_names: HashMap::new(),
            member_names: HashMap::new(),
        };

        cube.add_measures(def)?;
        for dim_def in &def.dimensions {
            if dim_def.kind == DimensionKind::Measures || dim_def.name == MEASURES_DIMENSION {
                return Err(ModelError::InvalidDefinition(format!(
                    "dimension '{}' is reserved for measures",
                    dim_def.name
                )));
            }
            if dim_def.hierarchies.is_empty() {
                return Err(ModelError::InvalidDefinition(format!(
                    "dimension '{}' has no hierarchies",
                    dim_def.name
                )));
            }
            let dim_id = DimensionId(cube.dimensions.len() as u32);
            let unique_name = quote_name(&dim_def.name);
            cube.register_dimension(Dimension {
                id: dim_id,
                name: dim_def.name.clone(),
                unique_name,
                kind: dim_def.kind,
                hierarchies: SmallVec::new(),
            })?;
            for hier_def in &dim_def.hierarchies {
                let hierarchy = build_hierarchy(
                    &dim_def.name,
                    dim_id,
                    HierarchyId(cube.hierarchies.len() as u32),
                    hier_def,
                )?;
                cube.register_hierarchy(hierarchy)?;
            }
        }

        log::debug!(
            "built cube '{}' with {} dimensions and {} hierarchies",
            cube.name,
            cube.dimensions.len(),
            cube.hierarchies.len()
        );
        Ok(cube)
    }

    fn add_measures(&mut self, def: &CubeDefinition) -> Result<(), ModelError> {
        let dim_id = DimensionId(0);
        let hier_id = HierarchyId(0);
        let unique_name = quote_name(MEASURES_DIMENSION);
        self.register_dimension(Dimension {
            id: dim_id,
            name: MEASURES_DIMENSION.to_string(),
            unique_name: unique_name.clone(),
            kind: DimensionKind::Measures,
            hierarchies: SmallVec::new(),
        })?;

        let level_id = LevelId::new(hier_id, 0);
        let mut hierarchy = Hierarchy {
            id: hier_id,
            dimension: dim_id,
            name: MEASURES_DIMENSION.to_string(),
            unique_name: unique_name.clone(),
            has_all: false,
            parent_child: false,
            levels: vec![Level {
                id: level_id,
                name: MEASURES_LEVEL.to_string(),
                unique_name: format!("{}.{}", unique_name, quote_name(MEASURES_LEVEL)),
                kind: LevelKind::Regular,
                members: Vec::new(),
            }],
            members: Vec::new(),
            roots: Vec::new(),
            default_member: None,
        };
        for measure in &def.measures {
            let id = MemberId::new(hier_id, hierarchy.members.len() as u32);
            let mut data = MemberData::new(
                id,
                measure.name.clone(),
                format!("{}.{}", unique_name, quote_name(&measure.name)),
                0,
            );
            if let Some(caption) = &measure.caption {
                data.caption = caption.clone();
            }
            data.aggregator = Some(measure.aggregator);
            hierarchy.members.push(data);
        }
        finish_hierarchy(&mut hierarchy);
        self.register_hierarchy(hierarchy)?;
        self.measures = hier_id;
        Ok(())
    }

    fn register_dimension(&mut self, dimension: Dimension) -> Result<(), ModelError> {
        if self
            .dimension_names
            .insert(dimension.unique_name.clone(), dimension.id)
            .is_some()
        {
            return Err(ModelError::InvalidDefinition(format!(
                "duplicate dimension {}",
                dimension.unique_name
            )));
        }
        self.dimensions.push(dimension);
        Ok(())
    }

    fn register_hierarchy(&mut self, hierarchy: Hierarchy) -> Result<(), ModelError> {
        if self
            .hierarchy_names
            .insert(hierarchy.unique_name.clone(), hierarchy.id)
            .is_some()
        {
            return Err(ModelError::InvalidDefinition(format!(
                "duplicate hierarchy {}",
                hierarchy.unique_name
            )));
        }
        for level in &hierarchy.levels {
            self.level_names.insert(level.unique_name.clone(), level.id);
        }
        for member in &hierarchy.members {
            self.member_names.insert(member.unique_name.clone(), member.id);
        }
        if let Some(dim) = self.dimensions.get_mut(hierarchy.dimension.index()) {
            dim.hierarchies.push(hierarchy.id);
        }
        self.hierarchies.push(hierarchy);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension_list(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn hierarchy_list(&self) -> &[Hierarchy] {
        &self.hierarchies
    }

    pub fn dimension(&self, id: DimensionId) -> Option<&Dimension> {
        self.dimensions.get(id.index())
    }

    pub fn hierarchy(&self, id: HierarchyId) -> Option<&Hierarchy> {
        self.hierarchies.get(id.index())
    }

    pub fn level(&self, id: LevelId) -> Option<&Level> {
        self.hierarchy(id.hierarchy)
            .and_then(|h| h.levels.get(id.depth as usize))
    }

    pub fn member_data(&self, id: MemberId) -> Option<&MemberData> {
        self.hierarchy(id.hierarchy)
            .and_then(|h| h.members.get(id.index as usize))
    }

    pub fn measures_id(&self) -> HierarchyId {
        self.measures
    }

    pub(crate) fn dimension_id(&self, unique_name: &str) -> Option<DimensionId> {
        self.dimension_names.get(unique_name).copied()
    }

    pub(crate) fn hierarchy_id(&self, unique_name: &str) -> Option<HierarchyId> {
        self.hierarchy_names.get(unique_name).copied()
    }

    pub(crate) fn level_id(&self, unique_name: &str) -> Option<LevelId> {
        self.level_names.get(unique_name).copied()
    }

    pub(crate) fn member_id(&self, unique_name: &str) -> Option<MemberId> {
        self.member_names.get(unique_name).copied()
    }

    /// Whether `ancestor` is `member` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: MemberId, member: MemberId) -> bool {
        if ancestor.hierarchy != member.hierarchy {
            return false;
        }
        match (self.member_data(ancestor), self.member_data(member)) {
            (Some(a), Some(m)) => a.ordinal <= m.ordinal && m.ordinal < a.subtree_end,
            _ => false,
        }
    }
}

fn build_hierarchy(
    dimension_name: &str,
    dimension: DimensionId,
    id: HierarchyId,
    def: &HierarchyDefinition,
) -> Result<Hierarchy, ModelError> {
    let name = def.name.clone().unwrap_or_else(|| dimension_name.to_string());
    let unique_name = if name == dimension_name {
        quote_name(dimension_name)
    } else {
        format!("{}.{}", quote_name(dimension_name), quote_name(&name))
    };
    if def.levels.is_empty() {
        return Err(ModelError::InvalidDefinition(format!(
            "hierarchy {} has no levels",
            unique_name
        )));
    }
    if def.parent_child && def.levels.len() != 1 {
        return Err(ModelError::InvalidDefinition(format!(
            "parent-child hierarchy {} must declare exactly one level",
            unique_name
        )));
    }

    let mut hierarchy = Hierarchy {
        id,
        dimension,
        name: name.clone(),
        unique_name: unique_name.clone(),
        has_all: def.has_all,
        parent_child: def.parent_child,
        levels: Vec::new(),
        members: Vec::new(),
        roots: Vec::new(),
        default_member: None,
    };

    if def.has_all {
        push_level(&mut hierarchy, "(All)".to_string(), LevelKind::All);
        let all_name = def
            .all_member_name
            .clone()
            .unwrap_or_else(|| format!("All {}s", name));
        let all_unique = format!("{}.{}", unique_name, quote_name(&all_name));
        let mut all = MemberData::new(MemberId::new(id, 0), all_name, all_unique, 0);
        all.is_all = true;
        hierarchy.members.push(all);
    }
    for level in &def.levels {
        push_level(&mut hierarchy, level.name.clone(), level.kind);
    }

    if def.parent_child {
        place_parent_child_members(&mut hierarchy, def)?;
    } else {
        place_regular_members(&mut hierarchy, def)?;
    }
    finish_hierarchy(&mut hierarchy);
    Ok(hierarchy)
}

fn push_level(hierarchy: &mut Hierarchy, name: String, kind: LevelKind) {
    let depth = hierarchy.levels.len() as u16;
    let unique_name = format!("{}.{}", hierarchy.unique_name, quote_name(&name));
    hierarchy.levels.push(Level {
        id: LevelId::new(hierarchy.id, depth),
        name,
        unique_name,
        kind,
        members: Vec::new(),
    });
}

fn all_member(hierarchy: &Hierarchy) -> Option<u32> {
    hierarchy.has_all.then_some(0)
}

fn top_depth(hierarchy: &Hierarchy) -> u16 {
    u16::from(hierarchy.has_all)
}

fn add_member(
    hierarchy: &mut Hierarchy,
    def: &MemberDefinition,
    parent: Option<u32>,
    depth: u16,
) -> u32 {
    let index = hierarchy.members.len() as u32;
    let prefix = match parent {
        Some(p) if !hierarchy.members[p as usize].is_all => {
            hierarchy.members[p as usize].unique_name.clone()
        }
        _ => hierarchy.unique_name.clone(),
    };
    let unique_name = format!("{}.{}", prefix, quote_name(&def.name));
    let mut data = MemberData::new(
        MemberId::new(hierarchy.id, index),
        def.name.clone(),
        unique_name,
        depth,
    );
    if let Some(caption) = &def.caption {
        data.caption = caption.clone();
    }
    if let Some(key) = &def.key {
        data.key = key.clone();
    }
    data.properties = def.properties.clone();
    data.parent = parent.map(|p| MemberId::new(hierarchy.id, p));
    hierarchy.members.push(data);
    index
}

fn place_regular_members(
    hierarchy: &mut Hierarchy,
    def: &HierarchyDefinition,
) -> Result<(), ModelError> {
    let mut by_path: HashMap<Vec<String>, u32> = HashMap::new();
    for member in &def.members {
        let parent = if member.parent.is_empty() {
            all_member(hierarchy)
        } else {
            match by_path.get(&member.parent) {
                Some(p) => Some(*p),
                None => {
                    return Err(ModelError::InvalidParent {
                        member: member.name.clone(),
                        parent: member.parent.join("."),
                    });
                }
            }
        };
        let parent_depth = parent.map(|p| hierarchy.members[p as usize].depth);
        let depth = match &member.level {
            Some(level_name) => hierarchy
                .levels
                .iter()
                .position(|l| &l.name == level_name && l.kind != LevelKind::All)
                .map(|d| d as u16)
                .ok_or_else(|| ModelError::UnknownLevel {
                    hierarchy: hierarchy.unique_name.clone(),
                    level: level_name.clone(),
                })?,
            None => parent_depth.map_or(top_depth(hierarchy), |d| d + 1),
        };
        if parent_depth.is_some_and(|d| depth <= d) || depth as usize >= hierarchy.levels.len() {
            return Err(ModelError::InvalidDefinition(format!(
                "member '{}' does not fit the levels of {}",
                member.name, hierarchy.unique_name
            )));
        }

        let mut path = member.parent.clone();
        path.push(member.name.clone());
        if by_path.contains_key(&path) {
            return Err(ModelError::InvalidDefinition(format!(
                "duplicate member '{}' in {}",
                path.join("."),
                hierarchy.unique_name
            )));
        }
        let index = add_member(hierarchy, member, parent, depth);
        by_path.insert(path, index);
    }
    Ok(())
}

fn place_parent_child_members(
    hierarchy: &mut Hierarchy,
    def: &HierarchyDefinition,
) -> Result<(), ModelError> {
    let base_level = hierarchy.levels[top_depth(hierarchy) as usize].clone();
    let mut by_name: HashMap<String, u32> = HashMap::new();
    let mut pending: Vec<&MemberDefinition> = def.members.iter().collect();

    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for member in pending {
            let parent = match member.parent.last() {
                None => all_member(hierarchy),
                Some(parent_name) => match by_name.get(parent_name) {
                    Some(p) => Some(*p),
                    None => {
                        deferred.push(member);
                        continue;
                    }
                },
            };
            let depth = parent.map_or(top_depth(hierarchy), |p| {
                let parent_data = &hierarchy.members[p as usize];
                if parent_data.is_all {
                    top_depth(hierarchy)
                } else {
                    parent_data.depth + 1
                }
            });
            while hierarchy.levels.len() <= depth as usize {
                let number = hierarchy.levels.len() as u16 - top_depth(hierarchy) + 1;
                push_level(
                    hierarchy,
                    format!("{} {:02}", base_level.name, number),
                    base_level.kind,
                );
            }
            if by_name.contains_key(&member.name) {
                return Err(ModelError::InvalidDefinition(format!(
                    "duplicate member '{}' in parent-child hierarchy {}",
                    member.name, hierarchy.unique_name
                )));
            }
            let index = add_member(hierarchy, member, parent, depth);
            by_name.insert(member.name.clone(), index);
        }
        if deferred.len() == before {
            let names: Vec<&str> = deferred.iter().map(|m| m.name.as_str()).collect();
            let member = deferred[0];
            let parent = member.parent.last().cloned().unwrap_or_default();
            return Err(if names.contains(&parent.as_str()) {
                ModelError::ParentCycle {
                    hierarchy: hierarchy.unique_name.clone(),
                    member: member.name.clone(),
                }
            } else {
                ModelError::InvalidParent {
                    member: member.name.clone(),
                    parent,
                }
            });
        }
        pending = deferred;
    }
    Ok(())
}

/// Link children, assign pre-order ordinals and fill level member lists
fn finish_hierarchy(hierarchy: &mut Hierarchy) {
    let hid = hierarchy.id;
    hierarchy.roots.clear();
    for index in 0..hierarchy.members.len() {
        let id = MemberId::new(hid, index as u32);
        match hierarchy.members[index].parent {
            Some(parent) => hierarchy.members[parent.index as usize].children.push(id),
            None => hierarchy.roots.push(id),
        }
    }

    // Iterative pre-order walk; the stack holds (member, sibling index)
    let mut ordinal = 0u32;
    let mut stack: Vec<(MemberId, u32)> = hierarchy
        .roots
        .iter()
        .enumerate()
        .rev()
        .map(|(i, m)| (*m, i as u32))
        .collect();
    let mut order = Vec::with_capacity(hierarchy.members.len());
    while let Some((id, sibling_index)) = stack.pop() {
        let parent_path = hierarchy.members[id.index as usize]
            .parent
            .map(|p| hierarchy.members[p.index as usize].path.clone())
            .unwrap_or_default();
        let data = &mut hierarchy.members[id.index as usize];
        data.ordinal = ordinal;
        data.sibling_index = sibling_index;
        data.path = parent_path;
        data.path.push(sibling_index);
        ordinal += 1;
        order.push(id);
        for (i, child) in data.children.iter().enumerate().rev() {
            stack.push((*child, i as u32));
        }
    }

    // Subtree extents, children before parents
    for id in order.iter().rev() {
        let data = &hierarchy.members[id.index as usize];
        let end = data
            .children
            .last()
            .map(|c| hierarchy.members[c.index as usize].subtree_end)
            .unwrap_or(data.ordinal + 1);
        hierarchy.members[id.index as usize].subtree_end = end;
    }

    for level in &mut hierarchy.levels {
        level.members.clear();
    }
    for id in &order {
        let depth = hierarchy.members[id.index as usize].depth as usize;
        if let Some(level) = hierarchy.levels.get_mut(depth) {
            level.members.push(*id);
        }
    }
    hierarchy.default_member = hierarchy.roots.first().copied();
}
