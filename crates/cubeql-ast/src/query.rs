//! Query definitions: formulas, axes and slicer

use crate::expression::Expression;
use cubeql_model::CalculatedMember;
use std::fmt;

/// A `WITH` clause entry
#[derive(Debug, Clone)]
pub enum Formula {
    /// `MEMBER [..].[name] AS expression`
    Member {
        member: CalculatedMember,
        expression: Expression,
    },
    /// `SET [name] AS expression`
    Set { name: String, expression: Expression },
}

impl Formula {
    pub fn expression(&self) -> &Expression {
        match self {
            Formula::Member { expression, .. } | Formula::Set { expression, .. } => expression,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryAxis {
    pub non_empty: bool,
    pub expression: Expression,
}

/// A complete query over one cube
#[derive(Debug, Clone, Default)]
pub struct QueryDefinition {
    pub formulas: Vec<Formula>,
    pub axes: Vec<QueryAxis>,
    pub slicer: Option<Expression>,
}

impl QueryDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, member: CalculatedMember, expression: Expression) -> Self {
        self.formulas.push(Formula::Member { member, expression });
        self
    }

    pub fn with_set(mut self, name: impl Into<String>, expression: Expression) -> Self {
        self.formulas.push(Formula::Set {
            name: name.into(),
            expression,
        });
        self
    }

    pub fn axis(mut self, expression: Expression) -> Self {
        self.axes.push(QueryAxis {
            non_empty: false,
            expression,
        });
        self
    }

    pub fn non_empty_axis(mut self, expression: Expression) -> Self {
        self.axes.push(QueryAxis {
            non_empty: true,
            expression,
        });
        self
    }

    pub fn slicer(mut self, expression: Expression) -> Self {
        self.slicer = Some(expression);
        self
    }
}

fn axis_name(ordinal: usize) -> String {
    match ordinal {
        0 => "COLUMNS".to_string(),
        1 => "ROWS".to_string(),
        2 => "PAGES".to_string(),
        n => format!("AXIS({})", n),
    }
}

impl fmt::Display for QueryDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.formulas.is_empty() {
            f.write_str("WITH")?;
            for formula in &self.formulas {
                match formula {
                    Formula::Member { member, expression } => {
                        write!(f, " MEMBER {} AS {}", member.unique_name, expression)?;
                        if member.solve_order != 0 {
                            write!(f, ", SOLVE_ORDER = {}", member.solve_order)?;
                        }
                    }
                    Formula::Set { name, expression } => {
                        write!(f, " SET {} AS {}", cubeql_model::quote_name(name), expression)?;
                    }
                }
            }
            f.write_str(" ")?;
        }
        f.write_str("SELECT")?;
        for (i, axis) in self.axes.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            if axis.non_empty {
                f.write_str("NON EMPTY ")?;
            }
            write!(f, "{} ON {}", axis.expression, axis_name(i))?;
        }
        if let Some(slicer) = &self.slicer {
            write!(f, " WHERE {}", slicer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeql_model::sample::sales_cube;
    use cubeql_model::{LevelId, Member, SchemaReader};

    #[test]
    fn test_query_display() {
        let cube = sales_cube().unwrap();
        let measures = LevelId::new(cube.measures_hierarchy(), 0);
        let profit = CalculatedMember::formula(measures, "Profit", "[Measures].[Profit]")
            .with_solve_order(5);
        let sales = Expression::member(cube.as_ref(), "[Measures].[Store Sales]").unwrap();
        let usa = Expression::member(cube.as_ref(), "[Store].[USA]").unwrap();
        let year = Expression::member(cube.as_ref(), "[Time].[1997]").unwrap();

        let profit_ref = Expression::from_member(cube.as_ref(), &Member::from(profit.clone()));

        let query = QueryDefinition::new()
            .with_member(
                profit,
                Expression::infix("*", sales, Expression::number(0.4)),
            )
            .with_set("Stores", Expression::property("Children", usa))
            .axis(Expression::braces(vec![profit_ref]))
            .non_empty_axis(Expression::named_set("Stores"))
            .slicer(year);

        insta::assert_snapshot!(
            query,
            @"WITH MEMBER [Measures].[Profit] AS ([Measures].[Store Sales] * 0.4), SOLVE_ORDER = 5 SET [Stores] AS [Store].[USA].Children SELECT {[Measures].[Profit]} ON COLUMNS, NON EMPTY [Stores] ON ROWS WHERE [Time].[1997]"
        );
    }
}
