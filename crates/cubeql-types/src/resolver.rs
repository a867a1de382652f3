//! Overload resolution
//!
//! Each overload with a matching arity is scored by summing the conversion
//! cost of every argument. The unique cheapest overload wins; a tie at the
//! lowest cost is an ambiguity, never a silent pick.

use crate::coercion::{ConversionFailure, ConversionPath, TypeCoercer};
use crate::error::{ResolutionError, ResolutionResult};
use crate::signature::FunctionSignature;
use crate::table::FunctionTable;
use crate::types::OlapType;
use cubeql_ast::Syntax;
use cubeql_model::SchemaReader;
use std::sync::Arc;

/// The chosen overload and the conversion for each argument
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub signature: Arc<FunctionSignature>,
    pub conversions: Vec<ConversionPath>,
    pub cost: u32,
}

/// Picks overloads from a [`FunctionTable`]
pub struct Resolver<'a> {
    coercer: TypeCoercer,
    table: &'a FunctionTable,
    schema: &'a dyn SchemaReader,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a FunctionTable, schema: &'a dyn SchemaReader) -> Self {
        Self {
            coercer: TypeCoercer::new(),
            table,
            schema,
        }
    }

    pub fn coercer(&self) -> &TypeCoercer {
        &self.coercer
    }

    pub fn table(&self) -> &'a FunctionTable {
        self.table
    }

    /// Resolve a call against its overloads
    pub fn resolve(
        &self,
        name: &str,
        syntax: Syntax,
        arg_types: &[OlapType],
    ) -> ResolutionResult<ResolvedCall> {
        let overloads = self.table.lookup(name, syntax);
        let mut candidates: Vec<ResolvedCall> = Vec::new();
        let mut blocked_by = None;

        'overloads: for signature in overloads {
            if !signature.accepts_arity(arg_types.len()) {
                continue;
            }
            let mut conversions = Vec::with_capacity(arg_types.len());
            let mut cost = 0;
            for (index, arg) in arg_types.iter().enumerate() {
                let Some(category) = signature.param(index) else {
                    continue 'overloads;
                };
                match self.coercer.conversion(arg, category, self.schema) {
                    Ok(path) => {
                        cost += path.cost;
                        conversions.push(path);
                    }
                    Err(ConversionFailure::MultipleHierarchies(dimension)) => {
                        blocked_by.get_or_insert(dimension);
                        continue 'overloads;
                    }
                    Err(ConversionFailure::NotConvertible) => continue 'overloads,
                }
            }
            candidates.push(ResolvedCall {
                signature: Arc::clone(signature),
                conversions,
                cost,
            });
        }

        candidates.sort_by_key(|c| c.cost);

        let lowest = match candidates.first() {
            Some(best) => best.cost,
            None => {
                return Err(match blocked_by {
                    Some(dimension) => ResolutionError::MultipleHierarchies {
                        dimension: self.schema.dimension_unique_name(dimension).to_string(),
                    },
                    None => ResolutionError::NoMatchingFunction {
                        name: name.to_string(),
                        syntax: syntax.describe().to_string(),
                        args: self.describe_args(arg_types),
                    },
                });
            }
        };

        let tied = candidates.iter().filter(|c| c.cost == lowest).count();
        if tied > 1 {
            return Err(ResolutionError::AmbiguousOverload {
                name: name.to_string(),
                args: self.describe_args(arg_types),
                candidates: tied,
            });
        }

        let best = candidates.swap_remove(0);
        log::trace!("Resolved {} to {} (cost {})", name, best.signature, best.cost);
        Ok(best)
    }

    fn describe_args(&self, arg_types: &[OlapType]) -> String {
        arg_types
            .iter()
            .map(|t| t.describe(self.schema))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
