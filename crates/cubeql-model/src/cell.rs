//! Cell values and the storage-facing cell reader
//!
//! The evaluator never talks to storage itself: at scalar leaves it asks a
//! [`CellReader`] for the value at a fully specified coordinate (one member
//! per hierarchy). [`FactTable`] is an in-memory reader that aggregates
//! leaf facts by each measure's [`Aggregator`].

use crate::cube::Cube;
use crate::definition::Aggregator;
use crate::error::ModelError;
use crate::ids::{HierarchyId, MemberId};
use crate::member::Member;
use crate::reader::SchemaReader;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::sync::Arc;

/// A raw cell value as delivered by storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(f64),
    String(String),
    Boolean(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Fetches measure values for a coordinate
///
/// The coordinate holds one member per hierarchy of the cube. Calculated
/// members are resolved by the evaluator beforehand, so readers only ever
/// see stored, All or null members.
pub trait CellReader: Send + Sync {
    fn cell_value(&self, coordinate: &[Member]) -> Result<CellValue, ModelError>;
}

/// A reader for cubes without facts; every cell is empty
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCells;

impl CellReader for EmptyCells {
    fn cell_value(&self, _coordinate: &[Member]) -> Result<CellValue, ModelError> {
        Ok(CellValue::Empty)
    }
}

impl Aggregator {
    /// Aggregate leaf fact values
    pub fn aggregate_facts(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Aggregator::Sum => values.iter().sum(),
            Aggregator::Count => values.len() as f64,
            Aggregator::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregator::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregator::DistinctCount => {
                let distinct: HashSet<u64> = values.iter().map(|v| v.to_bits()).collect();
                distinct.len() as f64
            }
        })
    }

    /// Combine already aggregated values; `None` when the aggregator cannot
    /// be rolled up
    pub fn rollup(self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregator::Count => Aggregator::Sum.aggregate_facts(values),
            Aggregator::DistinctCount => None,
            other => other.aggregate_facts(values),
        }
    }
}

/// One leaf fact: a stored member per hierarchy and measure values
#[derive(Debug, Clone)]
pub struct FactRow {
    pub members: SmallVec<[MemberId; 8]>,
    pub measures: SmallVec<[(MemberId, f64); 4]>,
}

impl FactRow {
    fn member_on(&self, hierarchy: HierarchyId) -> Option<MemberId> {
        self.members
            .iter()
            .copied()
            .find(|m| m.hierarchy == hierarchy)
    }

    fn measure(&self, measure: MemberId) -> Option<f64> {
        self.measures
            .iter()
            .find(|(m, _)| *m == measure)
            .map(|(_, v)| *v)
    }
}

/// In-memory facts for a cube
pub struct FactTable {
    cube: Arc<Cube>,
    rows: RwLock<Vec<FactRow>>,
}

impl FactTable {
    pub fn new(cube: Arc<Cube>) -> Self {
        Self {
            cube,
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn cube(&self) -> &Arc<Cube> {
        &self.cube
    }

    /// Add a fact addressed by member and measure unique names
    pub fn add_fact(&self, members: &[&str], measures: &[(&str, f64)]) -> Result<(), ModelError> {
        let mut row = FactRow {
            members: SmallVec::new(),
            measures: SmallVec::new(),
        };
        for name in members {
            let member = self
                .cube
                .lookup_member(name)
                .and_then(|m| m.stored())
                .ok_or_else(|| ModelError::UnknownMember(name.to_string()))?;
            row.members.push(member);
        }
        for (name, value) in measures {
            let measure = self
                .cube
                .lookup_member(name)
                .and_then(|m| m.stored())
                .filter(|m| m.hierarchy == self.cube.measures_id())
                .ok_or_else(|| ModelError::UnknownMeasure(name.to_string()))?;
            row.measures.push((measure, *value));
        }
        self.rows.write().push(row);
        Ok(())
    }

    pub fn add_row(&self, row: FactRow) {
        self.rows.write().push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl CellReader for FactTable {
    fn cell_value(&self, coordinate: &[Member]) -> Result<CellValue, ModelError> {
        let measures = self.cube.measures_id();
        let measure = coordinate
            .iter()
            .find(|m| m.hierarchy() == measures)
            .cloned()
            .unwrap_or_else(|| self.cube.default_member(measures));
        let measure_id = match &measure {
            Member::Null(_) => return Ok(CellValue::Empty),
            Member::Stored(id) => *id,
            Member::Calculated(calc) => {
                return Err(ModelError::CellRead(format!(
                    "calculated measure {} cannot be read from storage",
                    calc.unique_name
                )));
            }
        };
        let aggregator = self
            .cube
            .measure_aggregator(&measure)
            .ok_or_else(|| ModelError::UnknownMeasure(measure_id.index.to_string()))?;

        let mut filters: SmallVec<[MemberId; 8]> = SmallVec::new();
        for member in coordinate {
            if member.hierarchy() == measures {
                continue;
            }
            match member {
                Member::Null(_) => return Ok(CellValue::Empty),
                Member::Stored(id) => {
                    if !self.cube.is_all(member) {
                        filters.push(*id);
                    }
                }
                Member::Calculated(calc) => {
                    return Err(ModelError::CellRead(format!(
                        "calculated member {} cannot be read from storage",
                        calc.unique_name
                    )));
                }
            }
        }

        let rows = self.rows.read();
        let values: Vec<f64> = rows
            .iter()
            .filter(|row| {
                filters.iter().all(|filter| {
                    row.member_on(filter.hierarchy)
                        .is_some_and(|m| self.cube.is_ancestor_or_self(*filter, m))
                })
            })
            .filter_map(|row| row.measure(measure_id))
            .collect();

        log::trace!(
            "fact table: {} rows match {} filters",
            values.len(),
            filters.len()
        );
        Ok(aggregator
            .aggregate_facts(&values)
            .map_or(CellValue::Empty, CellValue::Number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregators() {
        let values = [3.0, 1.0, 3.0];
        assert_eq!(Aggregator::Sum.aggregate_facts(&values), Some(7.0));
        assert_eq!(Aggregator::Count.aggregate_facts(&values), Some(3.0));
        assert_eq!(Aggregator::Min.aggregate_facts(&values), Some(1.0));
        assert_eq!(Aggregator::Max.aggregate_facts(&values), Some(3.0));
        assert_eq!(Aggregator::DistinctCount.aggregate_facts(&values), Some(2.0));
        assert_eq!(Aggregator::Sum.aggregate_facts(&[]), None);
    }

    #[test]
    fn test_rollup() {
        assert_eq!(Aggregator::Count.rollup(&[2.0, 5.0]), Some(7.0));
        assert_eq!(Aggregator::Max.rollup(&[2.0, 5.0]), Some(5.0));
        assert_eq!(Aggregator::DistinctCount.rollup(&[2.0, 5.0]), None);
    }
}
