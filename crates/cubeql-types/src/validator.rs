//! Expression validation
//!
//! Walks a resolved [`Expression`], resolves every call to one overload,
//! inserts the implicit conversions and raises the static errors:
//! duplicate hierarchies in a tuple, mismatched hierarchies in a set
//! operation, bad flag keywords and unknown named sets.

use crate::coercion::ConversionStep;
use crate::error::{ResolutionError, ResolutionResult};
use crate::resolver::Resolver;
use crate::scope::QueryScope;
use crate::signature::{Builtin, FunctionSignature};
use crate::table::FunctionTable;
use crate::typed::{TypedExpression, TypedKind};
use crate::types::{Category, MemberType, OlapType, TupleType};
use cubeql_ast::{CASE_MATCH, Call, Expression, Syntax};
use cubeql_model::{HierarchyId, SchemaReader};
use smallvec::SmallVec;
use std::sync::Arc;

pub struct Validator<'a> {
    schema: &'a dyn SchemaReader,
    resolver: Resolver<'a>,
    scope: &'a QueryScope,
}

impl<'a> Validator<'a> {
    pub fn new(
        table: &'a FunctionTable,
        schema: &'a dyn SchemaReader,
        scope: &'a QueryScope,
    ) -> Self {
        Self {
            schema,
            resolver: Resolver::new(table, schema),
            scope,
        }
    }

    /// Validate an expression whose use requires `category`
    pub fn validate_as(
        &self,
        expr: &Expression,
        category: Category,
    ) -> ResolutionResult<TypedExpression> {
        let typed = self.validate(expr)?;
        self.coerce(typed, category)
    }

    fn coerce(&self, typed: TypedExpression, category: Category) -> ResolutionResult<TypedExpression> {
        match self
            .resolver
            .coercer()
            .conversion(&typed.ty, category, self.schema)
        {
            Ok(path) => Ok(typed.convert(&path, self.schema)),
            Err(crate::coercion::ConversionFailure::MultipleHierarchies(dimension)) => {
                Err(ResolutionError::MultipleHierarchies {
                    dimension: self.schema.dimension_unique_name(dimension).to_string(),
                })
            }
            Err(_) => Err(ResolutionError::TypeMismatch {
                expected: category.to_string(),
                found: typed.ty.describe(self.schema),
            }),
        }
    }

    pub fn validate(&self, expr: &Expression) -> ResolutionResult<TypedExpression> {
        match expr {
            Expression::Literal(lit) => Ok(TypedExpression::literal(lit.clone())),
            Expression::Member(r) => Ok(TypedExpression::member(self.schema, r.member.clone())),
            Expression::Level(r) => Ok(TypedExpression::level(self.schema, r.level)),
            Expression::Hierarchy(r) => Ok(TypedExpression::hierarchy(self.schema, r.hierarchy)),
            Expression::Dimension(r) => Ok(TypedExpression::dimension(r.dimension)),
            Expression::NamedSet(name) => {
                let info = self
                    .scope
                    .named_set(name)
                    .ok_or_else(|| ResolutionError::UnknownNamedSet(name.clone()))?;
                Ok(TypedExpression {
                    kind: TypedKind::NamedSet {
                        name: info.name.clone(),
                        index: info.index,
                    },
                    ty: info.ty.clone(),
                })
            }
            Expression::Call(call) => match call.syntax {
                Syntax::Braces => self.validate_set_constructor(call),
                Syntax::Parentheses => self.validate_tuple_constructor(call),
                Syntax::Case => self.validate_case(call),
                _ => self.validate_call(call),
            },
        }
    }

    fn validate_call(&self, call: &Call) -> ResolutionResult<TypedExpression> {
        let args = call
            .args
            .iter()
            .map(|a| self.validate(a))
            .collect::<ResolutionResult<Vec<_>>>()?;
        let types: Vec<OlapType> = args.iter().map(|a| a.ty.clone()).collect();
        let resolved = self.resolver.resolve(&call.name, call.syntax, &types)?;
        let signature = resolved.signature;

        let mut converted: Vec<TypedExpression> = args
            .into_iter()
            .zip(resolved.conversions.iter())
            .map(|(arg, path)| arg.convert(path, self.schema))
            .collect();

        self.check_flags(&signature, &converted)?;

        if matches!(
            signature.builtin,
            Builtin::Union | Builtin::Intersect | Builtin::Except
        ) && converted.len() >= 2
        {
            let right = converted.remove(1);
            let aligned = self.align(&signature.name, &converted[0].ty, right)?;
            converted.insert(1, aligned);
        }

        let arg_types: Vec<OlapType> = converted.iter().map(|a| a.ty.clone()).collect();
        let ty = signature.returns.infer(&arg_types, self.schema);
        Ok(TypedExpression::call(signature, converted, ty))
    }

    fn check_flags(
        &self,
        signature: &FunctionSignature,
        args: &[TypedExpression],
    ) -> ResolutionResult<()> {
        for (index, arg) in args.iter().enumerate() {
            let Some(Category::Symbol(allowed)) = signature.param(index) else {
                continue;
            };
            if allowed.is_empty() {
                continue;
            }
            let flag = arg.as_symbol().unwrap_or_default();
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(flag)) {
                return Err(ResolutionError::InvalidFlag {
                    function: signature.name.clone(),
                    flag: flag.to_string(),
                    allowed: allowed.join(", "),
                });
            }
        }
        Ok(())
    }

    /// Make `right`'s element hierarchies line up with `reference`,
    /// reordering tuple positions when the same hierarchies appear in a
    /// different order
    fn align(
        &self,
        function: &str,
        reference: &OlapType,
        right: TypedExpression,
    ) -> ResolutionResult<TypedExpression> {
        let Some(expected) = known_hierarchies(reference) else {
            return Ok(right);
        };
        let Some(actual) = known_hierarchies(&right.ty) else {
            return Ok(right);
        };
        if expected == actual {
            return Ok(right);
        }
        let mismatch = || ResolutionError::MismatchedHierarchies {
            function: function.to_string(),
        };
        if expected.len() != actual.len() {
            return Err(mismatch());
        }
        let perm = expected
            .iter()
            .map(|h| actual.iter().position(|a| a == h).ok_or_else(mismatch))
            .collect::<ResolutionResult<SmallVec<[usize; 4]>>>()?;
        Ok(right.apply(ConversionStep::Reorder(perm), self.schema))
    }

    fn builtin_signature(&self, name: &str, syntax: Syntax) -> ResolutionResult<Arc<FunctionSignature>> {
        self.resolver
            .table()
            .lookup(name, syntax)
            .first()
            .cloned()
            .ok_or_else(|| ResolutionError::NoMatchingFunction {
                name: name.to_string(),
                syntax: syntax.describe().to_string(),
                args: String::new(),
            })
    }

    /// `{a, b, ...}`: members, tuples and sets of one hierarchy list
    fn validate_set_constructor(&self, call: &Call) -> ResolutionResult<TypedExpression> {
        let signature = self.builtin_signature(&call.name, Syntax::Braces)?;
        let mut items = Vec::with_capacity(call.args.len());
        let mut reference: Option<OlapType> = None;

        for arg in &call.args {
            let typed = self.validate(arg)?;
            let typed = match &typed.ty {
                OlapType::Member(_) | OlapType::Tuple(_) | OlapType::Set(_) => typed,
                OlapType::Hierarchy(_) | OlapType::Dimension(_) => {
                    self.coerce(typed, Category::Member)?
                }
                OlapType::Level(_) => self.coerce(typed, Category::Set)?,
                other => {
                    return Err(ResolutionError::TypeMismatch {
                        expected: "Member, Tuple or Set".to_string(),
                        found: other.describe(self.schema),
                    });
                }
            };
            let typed = match &reference {
                Some(r) => self.align("{}", r, typed)?,
                None => typed,
            };
            if reference.is_none() && known_hierarchies(&typed.ty).is_some() {
                reference = Some(typed.ty.element().clone());
            }
            items.push(typed);
        }

        let ty = match (&reference, items.first()) {
            (Some(element), _) => OlapType::set_of(element.clone()),
            (None, Some(first)) => OlapType::set_of(first.ty.element().clone()),
            (None, None) => OlapType::empty_set(),
        };
        Ok(TypedExpression::call(signature, items, ty))
    }

    /// `(a)` groups; `(a, b, ...)` builds a tuple of distinct hierarchies
    fn validate_tuple_constructor(&self, call: &Call) -> ResolutionResult<TypedExpression> {
        if let [single] = call.args.as_slice() {
            return self.validate(single);
        }
        if call.args.is_empty() {
            return Err(ResolutionError::invalid_argument("()", "empty tuple"));
        }
        let signature = self.builtin_signature(&call.name, Syntax::Parentheses)?;
        let mut items = Vec::with_capacity(call.args.len());
        let mut members: SmallVec<[MemberType; 4]> = SmallVec::new();

        for arg in &call.args {
            let typed = self.validate(arg)?;
            let typed = match typed.ty {
                OlapType::Tuple(_) => typed,
                _ => self.coerce(typed, Category::Member)?,
            };
            for m in typed.ty.member_types() {
                if let Some(h) = m.hierarchy {
                    if members.iter().any(|seen| seen.hierarchy == Some(h)) {
                        return Err(self.duplicate_hierarchy(h));
                    }
                }
                members.push(m);
            }
            items.push(typed);
        }

        let ty = OlapType::Tuple(TupleType::new(members));
        Ok(TypedExpression::call(signature, items, ty))
    }

    fn duplicate_hierarchy(&self, hierarchy: HierarchyId) -> ResolutionError {
        ResolutionError::DuplicateHierarchy {
            hierarchy: self.schema.hierarchy_unique_name(hierarchy).to_string(),
        }
    }

    /// `CASE`: conditions become logical, results share one category
    fn validate_case(&self, call: &Call) -> ResolutionResult<TypedExpression> {
        let signature = self.builtin_signature(&call.name, Syntax::Case)?;
        let is_match = call.name.eq_ignore_ascii_case(CASE_MATCH);
        let args = call
            .args
            .iter()
            .map(|a| self.validate(a))
            .collect::<ResolutionResult<Vec<_>>>()?;

        let (subject, rest) = if is_match {
            match args.split_first() {
                Some((subject, rest)) => (Some(subject), rest),
                None => return Err(ResolutionError::invalid_argument("CASE", "missing value")),
            }
        } else {
            (None, args.as_slice())
        };
        if rest.len() < 2 {
            return Err(ResolutionError::invalid_argument("CASE", "no WHEN clause"));
        }
        let has_else = rest.len() % 2 == 1;
        let whens: Vec<&TypedExpression> = rest.chunks_exact(2).map(|c| &c[0]).collect();
        let mut results: Vec<&TypedExpression> = rest.chunks_exact(2).map(|c| &c[1]).collect();
        if has_else {
            results.extend(rest.last());
        }

        let coercer = self.resolver.coercer();
        let result_types: Vec<&OlapType> = results.iter().map(|r| &r.ty).collect();
        let result_category = coercer.common_category(&result_types).ok_or_else(|| {
            ResolutionError::TypeMismatch {
                expected: "branches of one type".to_string(),
                found: result_types
                    .iter()
                    .map(|t| t.describe(self.schema))
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })?;

        let when_category = match subject {
            Some(subject) => {
                let mut keys: Vec<&OlapType> = vec![&subject.ty];
                keys.extend(whens.iter().map(|w| &w.ty));
                match coercer.common_category(&keys) {
                    Some(Category::Member) => Category::Member,
                    _ => Category::Value,
                }
            }
            None => Category::Logical,
        };

        let mut converted = Vec::with_capacity(args.len());
        if let Some(subject) = subject {
            converted.push(self.coerce(subject.clone(), when_category)?);
        }
        for pair in rest.chunks(2) {
            match pair {
                [when, then] => {
                    converted.push(self.coerce(when.clone(), when_category)?);
                    converted.push(self.coerce_branch(then, result_category)?);
                }
                [otherwise] => converted.push(self.coerce_branch(otherwise, result_category)?),
                _ => {}
            }
        }

        let result_start = usize::from(is_match) + 1;
        let ty = converted
            .iter()
            .skip(result_start)
            .step_by(2)
            .map(|r| r.ty.clone())
            .chain(has_else.then(|| converted.last().map(|r| r.ty.clone())).flatten())
            .find(|t| *t != OlapType::Null)
            .map(|t| match result_category {
                Category::Value => OlapType::Scalar,
                _ => t,
            })
            .unwrap_or(OlapType::Null);
        Ok(TypedExpression::call(signature, converted, ty))
    }

    fn coerce_branch(
        &self,
        branch: &TypedExpression,
        category: Category,
    ) -> ResolutionResult<TypedExpression> {
        if branch.ty == OlapType::Null {
            return Ok(branch.clone());
        }
        self.coerce(branch.clone(), category)
    }
}

/// Element hierarchies, `None` if any is statically unknown
fn known_hierarchies(ty: &OlapType) -> Option<SmallVec<[HierarchyId; 4]>> {
    let hierarchies = ty.hierarchies();
    if hierarchies.is_empty() {
        return None;
    }
    hierarchies.into_iter().collect()
}
