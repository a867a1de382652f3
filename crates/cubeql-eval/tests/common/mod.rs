//! Shared helpers for evaluation tests over the sample sales cube

#![allow(dead_code)]

use cubeql_ast::Expression;
use cubeql_eval::{CubeEngine, EvaluationOptions, Value};
use cubeql_model::{SchemaReader, sample};
use cubeql_types::Category;
use std::sync::Arc;

pub struct Sales {
    pub engine: CubeEngine,
}

impl Sales {
    pub fn new() -> Self {
        Self::with_options(EvaluationOptions::default())
    }

    pub fn with_options(options: EvaluationOptions) -> Self {
        let cube = sample::sales_cube().unwrap();
        let facts = sample::sales_facts(&cube).unwrap();
        Self {
            engine: CubeEngine::new(cube, Arc::new(facts)).with_options(options),
        }
    }

    pub fn schema(&self) -> &dyn SchemaReader {
        self.engine.schema().as_ref()
    }

    pub fn member(&self, name: &str) -> Expression {
        Expression::member(self.schema(), name)
            .unwrap_or_else(|e| panic!("no member {}: {}", name, e))
    }

    pub fn level(&self, name: &str) -> Expression {
        Expression::level(self.schema(), name).unwrap()
    }

    pub fn hierarchy(&self, name: &str) -> Expression {
        Expression::hierarchy(self.schema(), name).unwrap()
    }

    pub fn eval_as(&self, expr: &Expression, category: Category) -> Value {
        let prepared = self
            .engine
            .prepare_as(expr, category)
            .unwrap_or_else(|e| panic!("{} does not validate: {}", expr, e));
        let mut ctx = self.engine.new_context();
        self.engine
            .evaluate(&prepared, &mut ctx)
            .unwrap_or_else(|e| panic!("{} failed: {}", expr, e))
    }

    pub fn eval(&self, expr: &Expression) -> Value {
        self.eval_as(expr, Category::Value)
    }

    pub fn number(&self, expr: &Expression) -> Option<f64> {
        match self.eval_as(expr, Category::Numeric) {
            Value::Number(n) => Some(n),
            Value::Null | Value::Empty => None,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    /// Unique names of a set's elements; tuples are joined with " x "
    pub fn names(&self, expr: &Expression) -> Vec<String> {
        match self.eval_as(expr, Category::Set) {
            Value::Set(list) => list
                .iter()
                .map(|t| {
                    t.iter()
                        .map(|m| self.schema().member_unique_name(m).to_string())
                        .collect::<Vec<_>>()
                        .join(" x ")
                })
                .collect(),
            other => panic!("expected a set, got {:?}", other),
        }
    }

    pub fn member_name(&self, expr: &Expression) -> String {
        match self.eval_as(expr, Category::Member) {
            Value::Member(m) => self.schema().member_unique_name(&m).to_string(),
            other => panic!("expected a member, got {:?}", other),
        }
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
