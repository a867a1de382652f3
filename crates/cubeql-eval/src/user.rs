//! User-defined functions
//!
//! A user function sees fully evaluated arguments and returns a value. It
//! is registered with the engine, which adds an overload to its function
//! table and keeps the implementation here under the same index.

use crate::value::Value;
use cubeql_types::{Category, OlapType};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a user function
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct UserFunctionError(pub String);

impl UserFunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub trait UserFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Parameter categories, in order
    fn params(&self) -> Vec<Category>;

    fn returns(&self) -> OlapType;

    fn invoke(&self, args: &[Value]) -> Result<Value, UserFunctionError>;
}

type Body = dyn Fn(&[Value]) -> Result<Value, UserFunctionError> + Send + Sync;

/// A user function built from a closure
pub struct FnUserFunction {
    name: String,
    params: Vec<Category>,
    returns: OlapType,
    body: Box<Body>,
}

impl FnUserFunction {
    pub fn new(
        name: impl Into<String>,
        params: &[Category],
        returns: OlapType,
        body: impl Fn(&[Value]) -> Result<Value, UserFunctionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.to_vec(),
            returns,
            body: Box::new(body),
        }
    }
}

impl fmt::Debug for FnUserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnUserFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl UserFunction for FnUserFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> Vec<Category> {
        self.params.clone()
    }

    fn returns(&self) -> OlapType {
        self.returns.clone()
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, UserFunctionError> {
        (self.body)(args)
    }
}

/// Registered user functions, indexed by registration order
#[derive(Default, Clone)]
pub struct UserFunctions {
    functions: Vec<Arc<dyn UserFunction>>,
}

impl UserFunctions {
    pub fn register(&mut self, function: Arc<dyn UserFunction>) -> usize {
        self.functions.push(function);
        self.functions.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn UserFunction>> {
        self.functions.get(index)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for UserFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.functions.iter().map(|u| u.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_is_the_index() {
        let mut functions = UserFunctions::default();
        let double = FnUserFunction::new("Double", &[Category::Numeric], OlapType::Numeric, |args| {
            match args.first() {
                Some(Value::Number(n)) => Ok(Value::Number(n * 2.0)),
                _ => Err(UserFunctionError::new("expected a number")),
            }
        });
        assert_eq!(functions.register(Arc::new(double)), 0);
        assert_eq!(functions.len(), 1);

        let f = functions.get(0).unwrap();
        assert_eq!(f.name(), "Double");
        assert_eq!(f.invoke(&[Value::Number(4.0)]).unwrap(), Value::Number(8.0));
        assert_eq!(
            f.invoke(&[Value::Null]).unwrap_err(),
            UserFunctionError::new("expected a number")
        );
    }
}
