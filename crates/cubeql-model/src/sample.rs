//! A small sales cube for tests, benches and documentation
//!
//! Time (Year/Quarter/Month, no All member, plus a `Weekly` hierarchy),
//! a ragged Store hierarchy where Mexico City sits directly under Mexico,
//! a Product hierarchy, a parent-child Employees hierarchy and three
//! measures. Facts exist for every month of 1997 only, so 1998 cells are
//! empty.

use crate::cell::FactTable;
use crate::cube::Cube;
use crate::definition::{
    Aggregator, CubeBuilder, CubeDefinition, DimensionDefinition, HierarchyDefinition, LevelKind,
};
use crate::error::ModelError;
use std::sync::Arc;

/// Store cities with their unique names and weights
pub const STORES: &[(&str, f64)] = &[
    ("[Store].[USA].[CA].[LA]", 1.0),
    ("[Store].[USA].[CA].[SF]", 2.0),
    ("[Store].[USA].[OR].[Portland]", 3.0),
    ("[Store].[USA].[OR].[Salem]", 4.0),
    ("[Store].[USA].[WA].[Seattle]", 5.0),
    ("[Store].[Mexico].[Mexico City]", 6.0),
];

/// Product categories with their unique names and weights
pub const PRODUCTS: &[(&str, f64)] = &[
    ("[Product].[Drink].[Beverages]", 1.0),
    ("[Product].[Drink].[Dairy]", 2.0),
    ("[Product].[Food].[Baking]", 3.0),
    ("[Product].[Food].[Produce]", 4.0),
    ("[Product].[Food].[Snacks]", 5.0),
    ("[Product].[Non-Consumable].[Household]", 6.0),
];

/// Employees that carry facts
pub const SALES_EMPLOYEES: &[&str] = &[
    "[Employees].[Sheri Nowmer].[Derrick Whelply].[Beverly Baker]",
    "[Employees].[Sheri Nowmer].[Derrick Whelply].[Pedro Castillo]",
    "[Employees].[Sheri Nowmer].[Michael Spence]",
    "[Employees].[Maya Gutierrez]",
];

/// Unit sales of one fact row
pub fn unit_sales(month: u32, store_weight: f64, product_weight: f64) -> f64 {
    f64::from(month) * store_weight + product_weight
}

/// Unique name of a 1997 or 1998 month (1-based)
pub fn month_name(year: u32, month: u32) -> String {
    let quarter = (month - 1) / 3 + 1;
    format!("[Time].[{}].[Q{}].[{}]", year, quarter, month)
}

pub fn sales_definition() -> CubeDefinition {
    let mut time = HierarchyDefinition::new()
        .without_all()
        .level("Year", LevelKind::TimeYears)
        .level("Quarter", LevelKind::TimeQuarters)
        .level("Month", LevelKind::TimeMonths);
    let mut weekly = HierarchyDefinition::new()
        .named("Weekly")
        .level("Year", LevelKind::TimeYears)
        .level("Week", LevelKind::TimeWeeks);
    for year in ["1997", "1998"] {
        time = time.member(&[year]);
        weekly = weekly.member(&[year]);
        for quarter in 1..=4u32 {
            let q = format!("Q{}", quarter);
            time = time.member(&[year, &q]);
            for month in (quarter - 1) * 3 + 1..=quarter * 3 {
                time = time.member(&[year, &q, &month.to_string()]);
            }
        }
        for week in 1..=4u32 {
            weekly = weekly.member(&[year, &week.to_string()]);
        }
    }

    let store = HierarchyDefinition::new()
        .all_member("All Stores")
        .level("Country", LevelKind::Regular)
        .level("State", LevelKind::Regular)
        .level("City", LevelKind::Regular)
        .member(&["USA"])
        .member(&["USA", "CA"])
        .member(&["USA", "CA", "LA"])
        .member(&["USA", "CA", "SF"])
        .member(&["USA", "OR"])
        .member(&["USA", "OR", "Portland"])
        .member(&["USA", "OR", "Salem"])
        .member(&["USA", "WA"])
        .member(&["USA", "WA", "Seattle"])
        .member(&["Mexico"])
        .member_at("City", &["Mexico", "Mexico City"]);

    let product = HierarchyDefinition::new()
        .all_member("All Products")
        .level("Family", LevelKind::Regular)
        .level("Category", LevelKind::Regular)
        .member(&["Drink"])
        .member(&["Drink", "Beverages"])
        .member(&["Drink", "Dairy"])
        .member(&["Food"])
        .member(&["Food", "Baking"])
        .member(&["Food", "Produce"])
        .member(&["Food", "Snacks"])
        .member(&["Non-Consumable"])
        .member(&["Non-Consumable", "Household"]);

    // Children listed before their parents on purpose
    let employees = HierarchyDefinition::new()
        .all_member("All Employees")
        .parent_child("Employee")
        .member(&["Derrick Whelply", "Beverly Baker"])
        .member(&["Sheri Nowmer"])
        .member(&["Sheri Nowmer", "Derrick Whelply"])
        .member(&["Derrick Whelply", "Pedro Castillo"])
        .member(&["Sheri Nowmer", "Michael Spence"])
        .member(&["Maya Gutierrez"]);

    CubeBuilder::new("Sales")
        .dimension(
            DimensionDefinition::time("Time")
                .hierarchy(time)
                .hierarchy(weekly),
        )
        .dimension(DimensionDefinition::new("Store").hierarchy(store))
        .dimension(DimensionDefinition::new("Product").hierarchy(product))
        .dimension(DimensionDefinition::new("Employees").hierarchy(employees))
        .measure("Unit Sales", Aggregator::Sum)
        .measure("Store Sales", Aggregator::Sum)
        .measure("Store Count", Aggregator::DistinctCount)
        .into_definition()
}

pub fn sales_cube() -> Result<Arc<Cube>, ModelError> {
    Ok(Arc::new(sales_definition().build()?))
}

/// Facts for every month of 1997, every store and every product category
pub fn sales_facts(cube: &Arc<Cube>) -> Result<FactTable, ModelError> {
    let facts = FactTable::new(cube.clone());
    for month in 1..=12u32 {
        let time = month_name(1997, month);
        for (store, store_weight) in STORES {
            let employee = SALES_EMPLOYEES[(*store_weight as usize - 1) % SALES_EMPLOYEES.len()];
            for (product, product_weight) in PRODUCTS {
                let units = unit_sales(month, *store_weight, *product_weight);
                facts.add_fact(
                    &[time.as_str(), store, product, employee],
                    &[
                        ("[Measures].[Unit Sales]", units),
                        ("[Measures].[Store Sales]", units * 2.5),
                        ("[Measures].[Store Count]", *store_weight),
                    ],
                )?;
            }
        }
    }
    Ok(facts)
}
