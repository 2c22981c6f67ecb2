//! SQL generation benchmarks.
//!
//! Run with: cargo bench -p strata-adapters --bench sql_generation

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use strata_adapters::ParameterValues;
use strata_adapters::sql::dialect::{SqlServerDialect, SqliteDialect};
use strata_adapters::sql::generator::SqlGenerator;
use strata_common::types::{Value, ValueType};
use strata_core::relational::{SelectExpr, SqlBinaryOp, SqlExpr, TableSource};

fn orders_select() -> SelectExpr {
    let mut select = SelectExpr::new();
    select.add_table(TableSource::Table {
        name: "Orders".to_string(),
        schema: None,
        alias: "o".to_string(),
    });
    select.add_to_projection(SqlExpr::column("o", "Id", ValueType::Int32, false));
    select.add_to_projection(SqlExpr::column("o", "CustomerId", ValueType::String, true));
    select.add_to_projection(SqlExpr::column("o", "Freight", ValueType::Float64, true));
    select.add_to_predicate(SqlExpr::equal(
        SqlExpr::column("o", "CustomerId", ValueType::String, true),
        SqlExpr::parameter("__customer_0", ValueType::String),
    ));
    select.add_to_predicate(SqlExpr::binary(
        SqlBinaryOp::GreaterThan,
        SqlExpr::column("o", "Freight", ValueType::Float64, true),
        SqlExpr::constant(10.0),
    ));
    select.add_ordering(SqlExpr::column("o", "Id", ValueType::Int32, false), false);
    select.limit = Some(SqlExpr::constant(20));
    select.offset = Some(SqlExpr::constant(40));
    select
}

fn bench_generation(c: &mut Criterion) {
    let select = orders_select();
    let mut bound = ParameterValues::new();
    bound.insert("__customer_0".to_string(), Value::from("ALFKI"));
    let mut null_bound = ParameterValues::new();
    null_bound.insert("__customer_0".to_string(), Value::Null);

    let sql_server = SqlServerDialect::default();
    let sqlite = SqliteDialect::default();

    c.bench_function("generate_sql_server", |b| {
        b.iter(|| {
            SqlGenerator::new(&sql_server, &bound)
                .generate(black_box(&select))
                .unwrap()
        });
    });

    c.bench_function("generate_sqlite", |b| {
        b.iter(|| {
            SqlGenerator::new(&sqlite, &bound)
                .generate(black_box(&select))
                .unwrap()
        });
    });

    c.bench_function("generate_null_parameter", |b| {
        b.iter(|| {
            SqlGenerator::new(&sql_server, &null_bound)
                .generate(black_box(&select))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_generation);
criterion_main!(benches);
