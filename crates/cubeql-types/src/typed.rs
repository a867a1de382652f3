//! The typed expression tree

use crate::coercion::{ConversionPath, ConversionStep};
use crate::signature::FunctionSignature;
use crate::types::{DimensionType, HierarchyType, LevelType, MemberType, OlapType};
use cubeql_ast::Literal;
use cubeql_model::{DimensionId, HierarchyId, LevelId, Member, SchemaReader};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TypedKind {
    Literal(Literal),
    Member(Member),
    Level(LevelId),
    Hierarchy(HierarchyId),
    Dimension(DimensionId),
    Call {
        signature: Arc<FunctionSignature>,
        args: Vec<TypedExpression>,
    },
    Conversion {
        step: ConversionStep,
        operand: Box<TypedExpression>,
    },
    NamedSet {
        name: String,
        index: usize,
    },
}

/// An expression with its static type
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpression {
    pub kind: TypedKind,
    pub ty: OlapType,
}

impl TypedExpression {
    pub fn literal(literal: Literal) -> Self {
        let ty = match &literal {
            Literal::Number(_) => OlapType::Numeric,
            Literal::String(_) => OlapType::String,
            Literal::Boolean(_) => OlapType::Logical,
            Literal::Null => OlapType::Null,
            Literal::Symbol(_) => OlapType::Symbol,
        };
        Self {
            kind: TypedKind::Literal(literal),
            ty,
        }
    }

    pub fn member(schema: &dyn SchemaReader, member: Member) -> Self {
        let hierarchy = member.hierarchy();
        let ty = OlapType::Member(MemberType {
            level: schema.member_level(&member),
            ..MemberType::of_hierarchy(schema, hierarchy)
        });
        Self {
            kind: TypedKind::Member(member),
            ty,
        }
    }

    pub fn level(schema: &dyn SchemaReader, level: LevelId) -> Self {
        let m = MemberType::of_level(schema, level);
        Self {
            kind: TypedKind::Level(level),
            ty: OlapType::Level(LevelType {
                dimension: m.dimension,
                hierarchy: m.hierarchy,
                level: m.level,
            }),
        }
    }

    pub fn hierarchy(schema: &dyn SchemaReader, hierarchy: HierarchyId) -> Self {
        Self {
            kind: TypedKind::Hierarchy(hierarchy),
            ty: OlapType::Hierarchy(HierarchyType {
                dimension: Some(schema.hierarchy_dimension(hierarchy)),
                hierarchy: Some(hierarchy),
            }),
        }
    }

    pub fn dimension(dimension: DimensionId) -> Self {
        Self {
            kind: TypedKind::Dimension(dimension),
            ty: OlapType::Dimension(DimensionType {
                dimension: Some(dimension),
            }),
        }
    }

    pub fn call(signature: Arc<FunctionSignature>, args: Vec<TypedExpression>, ty: OlapType) -> Self {
        Self {
            kind: TypedKind::Call { signature, args },
            ty,
        }
    }

    /// Wrap in one conversion node per step
    pub fn convert(self, path: &ConversionPath, schema: &dyn SchemaReader) -> Self {
        path.steps
            .iter()
            .fold(self, |expr, step| expr.apply(step.clone(), schema))
    }

    pub fn apply(self, step: ConversionStep, schema: &dyn SchemaReader) -> Self {
        let ty = step.apply(&self.ty, schema);
        Self {
            kind: TypedKind::Conversion {
                step,
                operand: Box::new(self),
            },
            ty,
        }
    }

    /// Direct sub-expressions
    pub fn children(&self) -> &[TypedExpression] {
        match &self.kind {
            TypedKind::Call { args, .. } => args,
            TypedKind::Conversion { operand, .. } => std::slice::from_ref(operand.as_ref()),
            _ => &[],
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            TypedKind::Literal(Literal::Symbol(s)) => Some(s),
            _ => None,
        }
    }

    /// A literal that evaluates the same in every context
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TypedKind::Literal(_) | TypedKind::Member(_) | TypedKind::Level(_)
        )
    }
}
