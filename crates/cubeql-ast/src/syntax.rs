//! How a function call is written

use serde::{Deserialize, Serialize};

/// The syntactic form of a call; overloads are keyed by name and syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Syntax {
    /// `Name(a, b)`
    Function,
    /// `a.Name(b)`; the target is the first argument
    Method,
    /// `a.Name`
    Property,
    /// `a op b`
    Infix,
    /// `op a`
    Prefix,
    /// `a op`
    Postfix,
    /// `{a, b}`
    Braces,
    /// `(a, b)`
    Parentheses,
    /// `CASE ... END`
    Case,
}

impl Syntax {
    pub fn describe(self) -> &'static str {
        match self {
            Syntax::Function => "function",
            Syntax::Method => "method",
            Syntax::Property => "property",
            Syntax::Infix => "infix operator",
            Syntax::Prefix => "prefix operator",
            Syntax::Postfix => "postfix operator",
            Syntax::Braces => "set constructor",
            Syntax::Parentheses => "tuple constructor",
            Syntax::Case => "case expression",
        }
    }
}
