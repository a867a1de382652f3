//! Implicit conversion rules
//!
//! Every argument is matched against a parameter [`Category`] through a
//! short chain of [`ConversionStep`]s. Each chain has a cost; the resolver
//! sums costs per overload and keeps the unique cheapest one.
//!
//! The allowed conversions:
//! - dimension -> hierarchy (only when the dimension has one hierarchy)
//! - hierarchy -> member (its current member), hence tuple
//! - member -> tuple, member/tuple/level/hierarchy -> set
//! - member/tuple -> scalar (the cell value at that coordinate)
//! - null -> any scalar, numeric -> logical, unknown scalar -> any scalar
//!
//! Numeric never converts to string.

use crate::types::{Category, HierarchyType, MemberType, OlapType, TupleType};
use cubeql_model::{DimensionId, HierarchyId, SchemaReader};
use smallvec::{SmallVec, smallvec};

/// One conversion applied to an argument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversionStep {
    /// The dimension's single hierarchy
    DimensionToHierarchy(HierarchyId),
    /// The hierarchy's current member
    HierarchyToMember,
    MemberToTuple,
    MemberToSet,
    TupleToSet,
    /// All members of the level
    LevelToSet,
    /// All members of the hierarchy
    HierarchyToSet,
    /// Cell value at the member or tuple, overlaid on the context
    ValueOf,
    NumericToLogical,
    /// Runtime-checked conversions of a scalar of unknown kind
    ScalarToNumeric,
    ScalarToString,
    ScalarToLogical,
    /// Permute tuple positions: position `i` takes old position `perm[i]`
    Reorder(SmallVec<[usize; 4]>),
}

impl ConversionStep {
    /// Type produced by applying this step to `from`
    pub fn apply(&self, from: &OlapType, schema: &dyn SchemaReader) -> OlapType {
        match self {
            ConversionStep::DimensionToHierarchy(h) => OlapType::Hierarchy(HierarchyType {
                dimension: Some(schema.hierarchy_dimension(*h)),
                hierarchy: Some(*h),
            }),
            ConversionStep::HierarchyToMember => OlapType::Member(from.member_type()),
            ConversionStep::MemberToTuple => {
                OlapType::Tuple(TupleType::new([from.member_type()]))
            }
            ConversionStep::MemberToSet | ConversionStep::TupleToSet => {
                OlapType::set_of(from.clone())
            }
            ConversionStep::LevelToSet => match from {
                OlapType::Level(l) => OlapType::set_of_members(MemberType {
                    dimension: l.dimension,
                    hierarchy: l.hierarchy,
                    level: l.level,
                }),
                other => OlapType::set_of_members(other.member_type()),
            },
            ConversionStep::HierarchyToSet => OlapType::set_of_members(from.member_type()),
            ConversionStep::ValueOf => OlapType::Scalar,
            ConversionStep::NumericToLogical | ConversionStep::ScalarToLogical => {
                OlapType::Logical
            }
            ConversionStep::ScalarToNumeric => OlapType::Numeric,
            ConversionStep::ScalarToString => OlapType::String,
            ConversionStep::Reorder(perm) => {
                let members = from.member_types();
                let reordered = TupleType::new(perm.iter().map(|&i| members[i]));
                match from {
                    OlapType::Set(_) => OlapType::set_of(OlapType::Tuple(reordered)),
                    _ => OlapType::Tuple(reordered),
                }
            }
        }
    }
}

/// A chain of steps and its total cost
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversionPath {
    pub steps: SmallVec<[ConversionStep; 2]>,
    pub cost: u32,
}

impl ConversionPath {
    pub fn identity() -> Self {
        Self::default()
    }

    fn of(cost: u32, steps: SmallVec<[ConversionStep; 2]>) -> Self {
        Self { steps, cost }
    }

    fn free(cost: u32) -> Self {
        Self {
            steps: SmallVec::new(),
            cost,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Type after all steps
    pub fn result_type(&self, from: &OlapType, schema: &dyn SchemaReader) -> OlapType {
        self.steps
            .iter()
            .fold(from.clone(), |ty, step| step.apply(&ty, schema))
    }
}

/// Why an argument cannot be converted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionFailure {
    NotConvertible,
    /// The dimension has more than one hierarchy
    MultipleHierarchies(DimensionId),
}

/// Implicit conversion rules
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeCoercer;

impl TypeCoercer {
    pub fn new() -> Self {
        Self
    }

    /// Check if `from` converts implicitly to `to`
    pub fn can_implicitly_convert(
        &self,
        from: &OlapType,
        to: Category,
        schema: &dyn SchemaReader,
    ) -> bool {
        self.conversion(from, to, schema).is_ok()
    }

    /// Cost of converting `from` to `to`, `None` if not allowed
    ///
    /// Cost 0 is an exact match; generalizing to `Value` costs 1; chains
    /// cost the sum of their steps.
    pub fn conversion_cost(
        &self,
        from: &OlapType,
        to: Category,
        schema: &dyn SchemaReader,
    ) -> Option<u32> {
        self.conversion(from, to, schema).ok().map(|p| p.cost)
    }

    /// Find the conversion chain from `from` to `to`
    pub fn conversion(
        &self,
        from: &OlapType,
        to: Category,
        schema: &dyn SchemaReader,
    ) -> Result<ConversionPath, ConversionFailure> {
        use ConversionStep as S;

        let path = match (from, to) {
            (OlapType::Numeric, Category::Numeric)
            | (OlapType::String, Category::String)
            | (OlapType::Logical, Category::Logical)
            | (OlapType::Scalar, Category::Value)
            | (OlapType::Member(_), Category::Member)
            | (OlapType::Tuple(_), Category::Tuple)
            | (OlapType::Set(_), Category::Set)
            | (OlapType::Level(_), Category::Level)
            | (OlapType::Hierarchy(_), Category::Hierarchy)
            | (OlapType::Dimension(_), Category::Dimension)
            | (OlapType::Symbol, Category::Symbol(_)) => ConversionPath::identity(),

            (OlapType::Numeric | OlapType::String | OlapType::Logical, Category::Value) => {
                ConversionPath::free(1)
            }
            (OlapType::Numeric, Category::Logical) => {
                ConversionPath::of(3, smallvec![S::NumericToLogical])
            }

            (OlapType::Null, Category::Numeric) => ConversionPath::free(1),
            (OlapType::Null, Category::Value) => ConversionPath::free(2),
            (OlapType::Null, Category::String | Category::Logical) => ConversionPath::free(3),

            (OlapType::Scalar, Category::Numeric) => {
                ConversionPath::of(2, smallvec![S::ScalarToNumeric])
            }
            (OlapType::Scalar, Category::String) => {
                ConversionPath::of(2, smallvec![S::ScalarToString])
            }
            (OlapType::Scalar, Category::Logical) => {
                ConversionPath::of(2, smallvec![S::ScalarToLogical])
            }

            (OlapType::Member(_), Category::Tuple) => {
                ConversionPath::of(1, smallvec![S::MemberToTuple])
            }
            (OlapType::Member(_), Category::Set) => {
                ConversionPath::of(4, smallvec![S::MemberToSet])
            }
            (OlapType::Tuple(_), Category::Set) => ConversionPath::of(4, smallvec![S::TupleToSet]),

            // A member used as a value reads the cell. Strings cost more
            // than numbers so a member in a set-or-string slot stays a set.
            (OlapType::Member(_) | OlapType::Tuple(_), Category::Value) => {
                ConversionPath::of(1, smallvec![S::ValueOf])
            }
            (OlapType::Member(_) | OlapType::Tuple(_), Category::Numeric) => {
                ConversionPath::of(3, smallvec![S::ValueOf, S::ScalarToNumeric])
            }
            (OlapType::Member(_) | OlapType::Tuple(_), Category::Logical) => {
                ConversionPath::of(3, smallvec![S::ValueOf, S::ScalarToLogical])
            }
            (OlapType::Member(_) | OlapType::Tuple(_), Category::String) => {
                ConversionPath::of(5, smallvec![S::ValueOf, S::ScalarToString])
            }

            (OlapType::Level(_), Category::Set) => ConversionPath::of(4, smallvec![S::LevelToSet]),

            (OlapType::Hierarchy(_), Category::Member) => {
                ConversionPath::of(2, smallvec![S::HierarchyToMember])
            }
            (OlapType::Hierarchy(_), Category::Tuple) => {
                ConversionPath::of(3, smallvec![S::HierarchyToMember, S::MemberToTuple])
            }
            (OlapType::Hierarchy(_), Category::Set) => {
                ConversionPath::of(5, smallvec![S::HierarchyToSet])
            }

            (OlapType::Dimension(d), Category::Hierarchy | Category::Member | Category::Tuple | Category::Set) => {
                let hierarchy = self.unique_hierarchy(d.dimension, schema)?;
                let mut path = ConversionPath::of(2, smallvec![S::DimensionToHierarchy(hierarchy)]);
                let rest = self.conversion(&S::DimensionToHierarchy(hierarchy).apply(from, schema), to, schema)?;
                path.steps.extend(rest.steps);
                path.cost += rest.cost;
                path
            }

            _ => return Err(ConversionFailure::NotConvertible),
        };
        Ok(path)
    }

    fn unique_hierarchy(
        &self,
        dimension: Option<DimensionId>,
        schema: &dyn SchemaReader,
    ) -> Result<HierarchyId, ConversionFailure> {
        let dimension = dimension.ok_or(ConversionFailure::NotConvertible)?;
        match schema.dimension_hierarchies(dimension).as_slice() {
            [only] => Ok(*only),
            _ => Err(ConversionFailure::MultipleHierarchies(dimension)),
        }
    }

    /// Common category of several branch types (`IIf`, `CASE`,
    /// `CoalesceEmpty`), `None` when they cannot be unified
    pub fn common_category(&self, types: &[&OlapType]) -> Option<Category> {
        let non_null: Vec<&OlapType> = types
            .iter()
            .copied()
            .filter(|t| **t != OlapType::Null)
            .collect();
        let Some(first) = non_null.first().map(|t| t.category()) else {
            return Some(Category::Numeric);
        };
        if first != Category::Value && non_null.iter().all(|t| t.category() == first) {
            return Some(first);
        }
        let is_cell = |t: &OlapType| matches!(t, OlapType::Member(_) | OlapType::Tuple(_));
        if non_null.iter().all(|t| t.is_scalar()) {
            return Some(Category::Value);
        }
        if non_null.iter().all(|t| is_cell(*t)) {
            return Some(Category::Tuple);
        }
        if non_null.iter().all(|t| t.is_scalar() || is_cell(*t)) {
            return Some(Category::Value);
        }
        if non_null
            .iter()
            .all(|t| is_cell(*t) || matches!(t, OlapType::Set(_)))
        {
            return Some(Category::Set);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeql_model::sample::sales_cube;
    use rstest::rstest;

    fn member_of(cube: &dyn SchemaReader, hierarchy: &str) -> OlapType {
        let h = cube.lookup_hierarchy(hierarchy).expect("hierarchy");
        OlapType::Member(MemberType::of_hierarchy(cube, h))
    }

    #[rstest]
    #[case(OlapType::Numeric, Category::Numeric, Some(0))]
    #[case(OlapType::Numeric, Category::Value, Some(1))]
    #[case(OlapType::Numeric, Category::Logical, Some(3))]
    #[case(OlapType::Numeric, Category::String, None)]
    #[case(OlapType::Null, Category::Numeric, Some(1))]
    #[case(OlapType::Null, Category::String, Some(3))]
    #[case(OlapType::Scalar, Category::String, Some(2))]
    #[case(OlapType::empty_set(), Category::Numeric, None)]
    fn test_scalar_costs(#[case] from: OlapType, #[case] to: Category, #[case] cost: Option<u32>) {
        let cube = sales_cube().expect("cube");
        assert_eq!(TypeCoercer::new().conversion_cost(&from, to, cube.as_ref()), cost);
    }

    #[test]
    fn test_member_conversions() {
        let cube = sales_cube().expect("cube");
        let coercer = TypeCoercer::new();
        let store = member_of(cube.as_ref(), "[Store]");

        assert_eq!(coercer.conversion_cost(&store, Category::Tuple, cube.as_ref()), Some(1));
        assert_eq!(coercer.conversion_cost(&store, Category::Set, cube.as_ref()), Some(4));
        let numeric = coercer.conversion(&store, Category::Numeric, cube.as_ref()).expect("numeric");
        assert_eq!(
            numeric.steps.to_vec(),
            vec![ConversionStep::ValueOf, ConversionStep::ScalarToNumeric]
        );
        assert!(
            coercer.conversion_cost(&store, Category::String, cube.as_ref())
                > coercer.conversion_cost(&store, Category::Set, cube.as_ref())
        );
    }

    #[test]
    fn test_dimension_with_single_hierarchy() {
        let cube = sales_cube().expect("cube");
        let coercer = TypeCoercer::new();
        let dim = cube.lookup_dimension("[Store]").expect("dimension");
        let ty = OlapType::Dimension(crate::types::DimensionType { dimension: Some(dim) });

        let path = coercer.conversion(&ty, Category::Member, cube.as_ref()).expect("member");
        let h = cube.lookup_hierarchy("[Store]").expect("hierarchy");
        assert_eq!(
            path.steps.to_vec(),
            vec![ConversionStep::DimensionToHierarchy(h), ConversionStep::HierarchyToMember]
        );
        assert_eq!(path.cost, 4);
        assert_eq!(
            path.result_type(&ty, cube.as_ref()).member_type().hierarchy,
            Some(h)
        );
    }

    #[test]
    fn test_dimension_with_many_hierarchies() {
        let cube = sales_cube().expect("cube");
        let dim = cube.lookup_dimension("[Time]").expect("dimension");
        let ty = OlapType::Dimension(crate::types::DimensionType { dimension: Some(dim) });

        assert_eq!(
            TypeCoercer::new().conversion(&ty, Category::Hierarchy, cube.as_ref()),
            Err(ConversionFailure::MultipleHierarchies(dim))
        );
    }

    #[test]
    fn test_common_category() {
        let coercer = TypeCoercer::new();
        assert_eq!(
            coercer.common_category(&[&OlapType::Numeric, &OlapType::Null]),
            Some(Category::Numeric)
        );
        assert_eq!(
            coercer.common_category(&[&OlapType::Numeric, &OlapType::String]),
            Some(Category::Value)
        );
        assert_eq!(
            coercer.common_category(&[&OlapType::empty_set(), &OlapType::Numeric]),
            None
        );
    }
}
