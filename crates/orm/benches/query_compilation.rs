//! Query Compilation Benchmarks
//!
//! Measures specification building, SQL rendering, flat encoding of grouped
//! fields and in-memory execution of compiled queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_orm::sql::render_query;
use strata_orm::{
    CrudOperations, Database, FieldGroup, FieldSet, MemoryBackend, Model, ModelState, OrderDirection, Predicate,
    SchemaBuilder, TimestampFormat,
};

#[derive(Debug, Clone, Default)]
struct Address {
    city: String,
    street: String,
}

impl FieldGroup for Address {
    fn describe(fields: FieldSet<Self>) -> FieldSet<Self> {
        fields
            .field("city", |a| &a.city, |a| &mut a.city)
            .field("street", |a| &a.street, |a| &mut a.street)
    }
}

#[derive(Debug, Clone, Default)]
struct Customer {
    id: Option<i64>,
    name: String,
    score: i64,
    address: Address,
    deleted_at: Option<DateTime<Utc>>,
    state: ModelState,
}

impl Model for Customer {
    type Id = i64;

    fn schema() -> &'static str {
        "customers"
    }

    fn describe(schema: SchemaBuilder<Self>) -> SchemaBuilder<Self> {
        schema
            .id("id", |c| &c.id, |c| &mut c.id)
            .field("name", |c| &c.name, |c| &mut c.name)
            .field("score", |c| &c.score, |c| &mut c.score)
            .group("address", |c| &c.address, |c| &mut c.address)
            .deleted_at("deleted_at", TimestampFormat::Native, |c| &c.deleted_at, |c| &mut c.deleted_at)
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}

fn database() -> (Arc<MemoryBackend>, Database) {
    let backend = Arc::new(MemoryBackend::new());
    (backend.clone(), Database::new(backend))
}

fn bench_spec_building(c: &mut Criterion) {
    let (_, db) = database();
    let mut group = c.benchmark_group("spec_building");

    group.bench_function("simple_filter", |b| {
        b.iter(|| {
            let spec = db
                .query::<Customer>()
                .and_then(|q| q.where_eq("name", "Ada").to_spec());
            black_box(spec)
        })
    });

    group.bench_function("grouped_paths_and_sorts", |b| {
        b.iter(|| {
            let spec = db.query::<Customer>().and_then(|q| {
                q.where_eq("address.city", "Lisbon")
                    .where_like("address.street", "Rua%")
                    .filter(Predicate::or(vec![
                        Predicate::gt("score", 10i64),
                        Predicate::is_null("name"),
                    ]))
                    .sort("score", OrderDirection::Desc)
                    .paginate(3, 25)
                    .to_spec()
            });
            black_box(spec)
        })
    });

    group.finish();
}

fn bench_sql_rendering(c: &mut Criterion) {
    let (_, db) = database();
    let mut group = c.benchmark_group("sql_rendering");

    for keys in [10usize, 100, 1000] {
        let spec = db
            .query::<Customer>()
            .and_then(|q| q.where_in("id", (0..keys as i64).collect::<Vec<_>>()).to_spec())
            .expect("valid query");
        group.bench_with_input(BenchmarkId::new("in_list", keys), &spec, |b, spec| {
            b.iter(|| black_box(render_query(spec)))
        });
    }

    group.finish();
}

fn bench_flat_encoding(c: &mut Criterion) {
    let descriptor = Customer::descriptor().expect("valid descriptor");
    let customer = Customer {
        id: Some(42),
        name: "Ada".to_string(),
        score: 17,
        address: Address {
            city: "Lisbon".to_string(),
            street: "Rua Augusta".to_string(),
        },
        ..Customer::default()
    };
    let row = descriptor.encode(&customer);

    let mut group = c.benchmark_group("flat_encoding");
    group.bench_function("encode", |b| b.iter(|| black_box(descriptor.encode(&customer))));
    group.bench_function("decode", |b| b.iter(|| black_box(descriptor.decode(&row))));
    group.finish();
}

fn bench_memory_execution(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let (_, db) = database();
    runtime.block_on(async {
        for index in 0..500i64 {
            let mut customer = Customer {
                name: format!("customer-{}", index),
                score: index % 50,
                ..Customer::default()
            };
            customer.create(&db).await.expect("seed customer");
        }
    });

    c.bench_function("memory_filtered_read", |b| {
        b.to_async(&runtime).iter(|| async {
            let customers = db
                .query::<Customer>()
                .expect("registered model")
                .where_gte("score", 25i64)
                .order_by_desc("score")
                .limit(20)
                .all()
                .await;
            black_box(customers)
        })
    });
}

criterion_group!(
    benches,
    bench_spec_building,
    bench_sql_rendering,
    bench_flat_encoding,
    bench_memory_execution
);
criterion_main!(benches);
