//! In-Memory Backend - an in-process document store
//!
//! Records are kept as flat rows per schema. Query specifications are
//! evaluated directly: predicates use SQL three-valued logic, joins are nested
//! loops, and NULLs sort last in ascending order. Every call is counted so
//! tests can assert on round trips.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::core::*;
use super::DatabaseBackendType;
use crate::error::{BackendError, OrmError, OrmResult};
use crate::model::CodecKind;
use crate::query::{FieldRef, FilterValue, JoinType, OrderDirection, Predicate, QueryAction, QueryOperator, QuerySpec};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    /// Last integral identifier handed out or observed
    sequence: i64,
}

/// In-process backend for tests and embedded use
#[derive(Debug)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Table>>,
    capabilities: BackendCapabilities,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryBackend {
    /// Relational flavour: joins and native enums
    pub fn new() -> Self {
        Self::with_capabilities(BackendCapabilities {
            returns_generated_identifiers: true,
            native_enums: true,
            joins: true,
        })
    }

    /// Document-store flavour: no joins, enum cases stored as plain strings
    pub fn document_store() -> Self {
        Self::with_capabilities(BackendCapabilities {
            returns_generated_identifiers: true,
            native_enums: false,
            joins: false,
        })
    }

    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            capabilities,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Queries executed so far (reads and counts)
    pub fn read_count(&self) -> u64 {
        self.reads.load(AtomicOrdering::SeqCst)
    }

    /// Writes executed so far, bulk updates and deletes included
    pub fn write_count(&self) -> u64 {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    pub fn round_trips(&self) -> u64 {
        self.read_count() + self.write_count()
    }

    pub fn reset_counters(&self) {
        self.reads.store(0, AtomicOrdering::SeqCst);
        self.writes.store(0, AtomicOrdering::SeqCst);
    }

    /// Stored rows of `schema`, in insertion order
    pub async fn dump(&self, schema: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(schema)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    fn store_value(&self, value: DatabaseValue) -> DatabaseValue {
        if self.capabilities.native_enums {
            value
        } else {
            value.lower_enum()
        }
    }

    fn store_row(&self, row: Row) -> Row {
        row.into_iter().map(|(key, value)| (key, self.store_value(value))).collect()
    }

    async fn read(&self, spec: &QuerySpec) -> OrmResult<Vec<Row>> {
        let tables = self.tables.read().await;
        let empty = Vec::new();
        let rows = tables.get(&spec.schema).map(|t| &t.rows).unwrap_or(&empty);

        let mut working: Vec<Row> = rows.clone();
        for join in &spec.joins {
            let candidates = tables.get(&join.schema).map(|t| &t.rows).unwrap_or(&empty);
            let mut joined = Vec::new();
            for row in working {
                let local = lookup(&row, &join.local);
                let mut matched = false;
                for candidate in candidates {
                    let foreign = candidate.get(&join.foreign_key).unwrap_or(&DatabaseValue::Null);
                    if compare(&local, foreign) != Some(Ordering::Equal) {
                        continue;
                    }
                    let merged = merge(&row, join.name(), join.columns.iter().map(|c| {
                        (c.key.as_str(), candidate.get(&c.key).cloned().unwrap_or(DatabaseValue::Null))
                    }));
                    let accepted = match &join.filter {
                        Some(filter) => evaluate(filter, &merged) == Some(true),
                        None => true,
                    };
                    if accepted {
                        matched = true;
                        joined.push(merged);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    let nulls = join.columns.iter().map(|c| (c.key.as_str(), DatabaseValue::Null));
                    joined.push(merge(&row, join.name(), nulls));
                }
            }
            working = joined;
        }

        if let Some(filter) = &spec.filter {
            working.retain(|row| evaluate(filter, row) == Some(true));
        }

        if matches!(spec.action, QueryAction::Count) {
            return Ok(vec![aggregate_row(working.len() as u64)]);
        }

        if !spec.sorts.is_empty() {
            working.sort_by(|a, b| {
                for sort in &spec.sorts {
                    let ordering = sort_order(&lookup(a, &sort.field), &lookup(b, &sort.field));
                    let ordering = match sort.direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = spec.offset.unwrap_or(0) as usize;
        let limit = spec.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(working.into_iter().skip(offset).take(limit).collect())
    }

    async fn bulk(&self, spec: &QuerySpec) -> OrmResult<Vec<Row>> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&spec.schema) else {
            return Ok(vec![aggregate_row(0)]);
        };
        let matches = |row: &Row| match &spec.filter {
            Some(filter) => evaluate(filter, row) == Some(true),
            None => true,
        };

        let affected = match &spec.action {
            QueryAction::Update(assignments) => {
                let assignments = self.store_row(assignments.clone());
                let mut affected = 0u64;
                for row in table.rows.iter_mut().filter(|row| matches(&**row)) {
                    row.extend(assignments.clone());
                    affected += 1;
                }
                affected
            }
            QueryAction::Delete => {
                let before = table.rows.len();
                table.rows.retain(|row| !matches(row));
                (before - table.rows.len()) as u64
            }
            QueryAction::Read | QueryAction::Count => 0,
        };
        Ok(vec![aggregate_row(affected)])
    }

    async fn insert(&self, request: WriteRequest) -> OrmResult<WriteOutcome> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(request.schema.clone()).or_default();

        let generates = matches!(request.column_kind(&request.identifier_key), None | Some(CodecKind::Int));
        let mut sequence = table.sequence;
        let mut generated = None;
        let mut staged = Vec::with_capacity(request.rows.len());

        for row in request.rows.iter() {
            let mut row = self.store_row(row.clone());
            for column in &request.columns {
                row.entry(column.key.clone()).or_insert(DatabaseValue::Null);
            }

            let id = match row.get(&request.identifier_key).cloned().unwrap_or(DatabaseValue::Null) {
                DatabaseValue::Null if generates => {
                    sequence += 1;
                    let id = DatabaseValue::Int64(sequence);
                    generated = Some(id.clone());
                    id
                }
                DatabaseValue::Null => {
                    return Err(backend_error(format!(
                        "null value in column \"{}\" of \"{}\" violates not-null constraint",
                        request.identifier_key, request.schema
                    )));
                }
                id => {
                    if let Some(value) = id.as_i64() {
                        sequence = sequence.max(value);
                    }
                    id
                }
            };

            let taken = |existing: &Row| {
                existing
                    .get(&request.identifier_key)
                    .is_some_and(|other| compare(other, &id) == Some(Ordering::Equal))
            };
            if table.rows.iter().any(taken) || staged.iter().any(taken) {
                return Err(backend_error(format!(
                    "duplicate key value violates unique constraint on \"{}\".\"{}\"",
                    request.schema, request.identifier_key
                )));
            }

            row.insert(request.identifier_key.clone(), id);
            staged.push(row);
        }

        let affected = staged.len() as u64;
        table.sequence = sequence;
        table.rows.extend(staged);

        let generated_identifier = if request.returns_identifier
            && affected == 1
            && self.capabilities.returns_generated_identifiers
        {
            generated
        } else {
            None
        };
        Ok(WriteOutcome {
            affected,
            generated_identifier,
        })
    }

    async fn update(&self, request: WriteRequest) -> OrmResult<WriteOutcome> {
        let identifier = request.identifier.clone().unwrap_or(DatabaseValue::Null);
        let assignments = request
            .rows
            .into_iter()
            .next()
            .map(|row| self.store_row(row))
            .unwrap_or_default();

        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&request.schema) else {
            return Ok(WriteOutcome::default());
        };

        let mut affected = 0;
        for row in table.rows.iter_mut() {
            if matches_identifier(row, &request.identifier_key, &identifier) {
                row.extend(assignments.clone());
                affected += 1;
            }
        }
        Ok(WriteOutcome {
            affected,
            generated_identifier: None,
        })
    }

    async fn delete(&self, request: WriteRequest) -> OrmResult<WriteOutcome> {
        let identifier = request.identifier.clone().unwrap_or(DatabaseValue::Null);
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&request.schema) else {
            return Ok(WriteOutcome::default());
        };

        let before = table.rows.len();
        table
            .rows
            .retain(|row| !matches_identifier(row, &request.identifier_key, &identifier));
        Ok(WriteOutcome {
            affected: (before - table.rows.len()) as u64,
            generated_identifier: None,
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseBackend for MemoryBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::Memory
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    async fn execute(&self, query: &QuerySpec) -> OrmResult<Vec<Row>> {
        if !query.joins.is_empty() && !self.capabilities.joins {
            return Err(backend_error("joins are not supported by this store".to_string()));
        }

        match query.action {
            QueryAction::Read | QueryAction::Count => {
                self.reads.fetch_add(1, AtomicOrdering::SeqCst);
                self.read(query).await
            }
            QueryAction::Update(_) | QueryAction::Delete => {
                self.writes.fetch_add(1, AtomicOrdering::SeqCst);
                self.bulk(query).await
            }
        }
    }

    async fn execute_write(&self, request: WriteRequest) -> OrmResult<WriteOutcome> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        match request.kind {
            WriteKind::Create => self.insert(request).await,
            WriteKind::Update => self.update(request).await,
            WriteKind::Delete => self.delete(request).await,
        }
    }
}

fn backend_error(message: String) -> OrmError {
    OrmError::Backend(BackendError::new(message))
}

fn aggregate_row(count: u64) -> Row {
    let mut row = Row::new();
    row.insert(AGGREGATE_KEY.to_string(), DatabaseValue::Int64(count as i64));
    row
}

fn matches_identifier(row: &Row, key: &str, identifier: &DatabaseValue) -> bool {
    row.get(key)
        .is_some_and(|value| compare(value, identifier) == Some(Ordering::Equal))
}

fn merge<'a>(row: &Row, scope: &str, columns: impl Iterator<Item = (&'a str, DatabaseValue)>) -> Row {
    let mut merged = row.clone();
    for (key, value) in columns {
        merged.insert(format!("{}.{}", scope, key), value);
    }
    merged
}

/// Value of a resolved field in a working row; joined columns are scope-qualified
fn lookup(row: &Row, field: &FieldRef) -> DatabaseValue {
    let value = match &field.scope {
        None => row.get(&field.key),
        Some(scope) => row.get(&format!("{}.{}", scope, field.key)),
    };
    value.cloned().unwrap_or(DatabaseValue::Null)
}

/// Three-valued evaluation: `None` is SQL UNKNOWN
fn evaluate(predicate: &Predicate, row: &Row) -> Option<bool> {
    match predicate {
        Predicate::Compare { field, operator, value } => compare_field(row, field, *operator, value),
        Predicate::And(predicates) => {
            let mut result = Some(true);
            for predicate in predicates {
                match evaluate(predicate, row) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Predicate::Or(predicates) => {
            let mut result = Some(false);
            for predicate in predicates {
                match evaluate(predicate, row) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Predicate::Not(predicate) => evaluate(predicate, row).map(|b| !b),
    }
}

fn compare_field(row: &Row, field: &FieldRef, operator: QueryOperator, value: &FilterValue) -> Option<bool> {
    let left = lookup(row, field);
    let right = match value {
        FilterValue::Value(value) => value.clone(),
        FilterValue::Field(other) => lookup(row, other),
        FilterValue::List(values) => return membership(&left, values, operator),
        FilterValue::None => DatabaseValue::Null,
    };

    match operator {
        QueryOperator::IsNull => Some(left.is_null()),
        QueryOperator::IsNotNull => Some(!left.is_null()),
        QueryOperator::Equal => compare(&left, &right).map(|o| o == Ordering::Equal),
        QueryOperator::NotEqual => compare(&left, &right).map(|o| o != Ordering::Equal),
        QueryOperator::GreaterThan => compare(&left, &right).map(|o| o == Ordering::Greater),
        QueryOperator::GreaterThanOrEqual => compare(&left, &right).map(|o| o != Ordering::Less),
        QueryOperator::LessThan => compare(&left, &right).map(|o| o == Ordering::Less),
        QueryOperator::LessThanOrEqual => compare(&left, &right).map(|o| o != Ordering::Greater),
        QueryOperator::Like | QueryOperator::NotLike => {
            let matched = like(text(&left)?, text(&right)?);
            Some(if operator == QueryOperator::Like { matched } else { !matched })
        }
        QueryOperator::In | QueryOperator::NotIn => {
            membership(&left, std::slice::from_ref(&right), operator)
        }
    }
}

fn membership(left: &DatabaseValue, values: &[DatabaseValue], operator: QueryOperator) -> Option<bool> {
    let negated = operator == QueryOperator::NotIn;
    if values.is_empty() {
        return Some(negated);
    }
    if left.is_null() {
        return None;
    }

    let mut unknown = false;
    for value in values {
        match compare(left, value) {
            Some(Ordering::Equal) => return Some(!negated),
            None => unknown = true,
            Some(_) => {}
        }
    }
    if unknown {
        None
    } else {
        Some(negated)
    }
}

fn text(value: &DatabaseValue) -> Option<&str> {
    match value {
        DatabaseValue::Enum { case, .. } => Some(case),
        other => other.as_str(),
    }
}

/// Ordering of two non-null values of comparable types
fn compare(left: &DatabaseValue, right: &DatabaseValue) -> Option<Ordering> {
    use DatabaseValue::*;

    match (left, right) {
        (Null, _) | (_, Null) => None,
        (Bool(a), Bool(b)) => Some(a.cmp(b)),
        (Int64(a), Int64(b)) => Some(a.cmp(b)),
        (Float64(a), Float64(b)) => a.partial_cmp(b),
        (Int64(a), Float64(b)) => (*a as f64).partial_cmp(b),
        (Float64(a), Int64(b)) => a.partial_cmp(&(*b as f64)),
        (String(a), String(b)) => Some(a.cmp(b)),
        (Enum { case: a, .. }, Enum { case: b, .. })
        | (Enum { case: a, .. }, String(b))
        | (String(a), Enum { case: b, .. }) => Some(a.cmp(b)),
        (Bytes(a), Bytes(b)) => Some(a.cmp(b)),
        (Uuid(a), Uuid(b)) => Some(a.cmp(b)),
        (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
        (Json(a), Json(b)) => Some(a.to_string().cmp(&b.to_string())),
        _ => None,
    }
}

/// Total order for sorting: NULLs after every value
fn sort_order(left: &DatabaseValue, right: &DatabaseValue) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
    }
}

/// SQL LIKE with `%` (any run) and `_` (any one character)
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // matches[j]: pattern[..j] matches the text consumed so far
    let mut matches = vec![false; pattern.len() + 1];
    matches[0] = true;
    for j in 1..=pattern.len() {
        matches[j] = matches[j - 1] && pattern[j - 1] == '%';
    }

    for c in text {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matches[j],
                '_' => matches[j - 1],
                p => matches[j - 1] && p == c,
            };
        }
        matches = next;
    }
    matches[pattern.len()]
}
