//! Evaluation benchmarks using divan
//!
//! Set-heavy expressions over the sample cube: crossjoins, filters on cell
//! values, ordering and a small query.

use cubeql::{CubeEngine, Expression, PreparedExpression, QueryDefinition, sample_engine};

fn main() {
    divan::main();
}

fn engine() -> CubeEngine {
    sample_engine().unwrap()
}

fn member(engine: &CubeEngine, name: &str) -> Expression {
    Expression::member(engine.schema().as_ref(), name).unwrap()
}

fn level_members(engine: &CubeEngine, name: &str) -> Expression {
    let level = Expression::level(engine.schema().as_ref(), name).unwrap();
    Expression::property("Members", level)
}

fn run(engine: &CubeEngine, prepared: &PreparedExpression) {
    let mut ctx = engine.new_context();
    divan::black_box(engine.evaluate(prepared, &mut ctx).unwrap());
}

// === Crossjoin Benchmarks ===

mod crossjoin {
    use super::*;

    #[divan::bench]
    fn cities_by_categories(bencher: divan::Bencher) {
        let engine = engine();
        let expr = Expression::function(
            "Crossjoin",
            vec![
                level_members(&engine, "[Store].[City]"),
                level_members(&engine, "[Product].[Category]"),
            ],
        );
        let prepared = engine.prepare(&expr).unwrap();
        bencher.bench_local(|| run(&engine, &prepared));
    }

    #[divan::bench]
    fn three_way_with_months(bencher: divan::Bencher) {
        let engine = engine();
        let expr = Expression::function(
            "Crossjoin",
            vec![
                level_members(&engine, "[Store].[City]"),
                level_members(&engine, "[Product].[Family]"),
                level_members(&engine, "[Time].[Month]"),
            ],
        );
        let prepared = engine.prepare(&expr).unwrap();
        bencher.bench_local(|| run(&engine, &prepared));
    }
}

// === Filter Benchmarks ===

mod filter {
    use super::*;

    #[divan::bench]
    fn months_above_threshold(bencher: divan::Bencher) {
        let engine = engine();
        let condition = Expression::infix(
            ">",
            member(&engine, "[Measures].[Unit Sales]"),
            Expression::number(1000.0),
        );
        let expr = Expression::function(
            "Filter",
            vec![level_members(&engine, "[Time].[Month]"), condition],
        );
        let prepared = engine.prepare(&expr).unwrap();
        bencher.bench_local(|| run(&engine, &prepared));
    }

    #[divan::bench]
    fn sum_over_filtered_crossjoin(bencher: divan::Bencher) {
        let engine = engine();
        let pairs = Expression::function(
            "Crossjoin",
            vec![
                level_members(&engine, "[Store].[City]"),
                level_members(&engine, "[Product].[Category]"),
            ],
        );
        let condition = Expression::infix(
            ">",
            member(&engine, "[Measures].[Unit Sales]"),
            Expression::number(100.0),
        );
        let expr = Expression::function(
            "Sum",
            vec![Expression::function("Filter", vec![pairs, condition])],
        );
        let prepared = engine.prepare(&expr).unwrap();
        bencher.bench_local(|| run(&engine, &prepared));
    }
}

// === Order Benchmarks ===

mod order {
    use super::*;

    #[divan::bench(args = ["ASC", "BDESC"])]
    fn cities_by_sales(bencher: divan::Bencher, direction: &str) {
        let engine = engine();
        let expr = Expression::function(
            "Order",
            vec![
                level_members(&engine, "[Store].[City]"),
                member(&engine, "[Measures].[Unit Sales]"),
                Expression::symbol(direction),
            ],
        );
        let prepared = engine.prepare(&expr).unwrap();
        bencher.bench_local(|| run(&engine, &prepared));
    }

    #[divan::bench]
    fn top_count_of_pairs(bencher: divan::Bencher) {
        let engine = engine();
        let pairs = Expression::function(
            "Crossjoin",
            vec![
                level_members(&engine, "[Store].[City]"),
                level_members(&engine, "[Time].[Month]"),
            ],
        );
        let expr = Expression::function(
            "TopCount",
            vec![
                pairs,
                Expression::number(10.0),
                member(&engine, "[Measures].[Unit Sales]"),
            ],
        );
        let prepared = engine.prepare(&expr).unwrap();
        bencher.bench_local(|| run(&engine, &prepared));
    }
}

// === Query Benchmarks ===

mod query {
    use super::*;

    #[divan::bench]
    fn families_by_states(bencher: divan::Bencher) {
        let engine = engine();
        let query = QueryDefinition::new()
            .axis(level_members(&engine, "[Product].[Family]"))
            .non_empty_axis(level_members(&engine, "[Store].[State]"))
            .slicer(Expression::braces(vec![member(&engine, "[Time].[1997]")]));
        bencher.bench_local(|| divan::black_box(engine.execute_query(&query).unwrap()));
    }
}
