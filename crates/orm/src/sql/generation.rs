//! SQL generation for PostgreSQL
//!
//! Query specifications and write requests are rendered to parameterised SQL.
//! Identifiers are always quoted; values are always bound as `$n` parameters,
//! each carrying the codec of the column it is compared with or assigned to so
//! the driver can bind a correctly typed NULL and cast native enums.

use std::collections::BTreeSet;

use crate::backends::{DatabaseValue, Row, WriteKind, WriteRequest, AGGREGATE_KEY};
use crate::error::{ModelError, ModelResult};
use crate::model::CodecKind;
use crate::query::{FieldRef, FilterValue, Predicate, QueryAction, QueryOperator, QuerySpec};

/// One bound parameter
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParam {
    pub value: DatabaseValue,
    /// Codec of the target column, when known
    pub kind: Option<CodecKind>,
}

/// Rendered statement and its parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[derive(Default)]
struct SqlWriter {
    sql: String,
    params: Vec<SqlParam>,
}

impl SqlWriter {
    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    /// Append a placeholder for `value`; enum columns get a cast to their type
    fn bind(&mut self, value: DatabaseValue, kind: Option<CodecKind>) {
        self.params.push(SqlParam { value, kind });
        let placeholder = format!("${}", self.params.len());
        match kind {
            Some(CodecKind::Enum(name)) => {
                self.sql.push_str(&format!("CAST({} AS {})", placeholder, quote_identifier(name)));
            }
            _ => self.sql.push_str(&placeholder),
        }
    }

    fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Render a query specification
pub fn render_query(spec: &QuerySpec) -> ModelResult<SqlStatement> {
    let mut writer = SqlWriter::default();
    let root = spec.name();

    match &spec.action {
        QueryAction::Read => {
            writer.push("SELECT ");
            writer.push(&select_list(spec));
            writer.push(" FROM ");
            writer.push(&table_reference(&spec.schema, spec.alias.as_deref()));
            render_joins(spec, &mut writer)?;
            render_where(spec, &mut writer)?;
            render_order_and_limit(spec, &mut writer);
        }
        QueryAction::Count => {
            writer.push(&format!("SELECT COUNT(*) AS {} FROM ", quote_identifier(AGGREGATE_KEY)));
            writer.push(&table_reference(&spec.schema, spec.alias.as_deref()));
            render_joins(spec, &mut writer)?;
            render_where(spec, &mut writer)?;
        }
        QueryAction::Update(assignments) => {
            if assignments.is_empty() {
                return Err(ModelError::Validation("update without assignments".to_string()));
            }
            writer.push("UPDATE ");
            writer.push(&table_reference(&spec.schema, spec.alias.as_deref()));
            writer.push(" SET ");
            render_assignments(assignments, |key| spec.column(&FieldRef::new(key)).map(|c| c.kind), &mut writer);
            render_where(spec, &mut writer)?;
        }
        QueryAction::Delete => {
            writer.push("DELETE FROM ");
            writer.push(&table_reference(&spec.schema, spec.alias.as_deref()));
            render_where(spec, &mut writer)?;
        }
    }

    tracing::trace!(schema = root, sql = %writer.sql, "rendered query");
    Ok(writer.finish())
}

/// Render a single-record or batch write
pub fn render_write(request: &WriteRequest) -> ModelResult<SqlStatement> {
    let mut writer = SqlWriter::default();
    let table = quote_identifier(&request.schema);
    let kind_of = |key: &str| request.column_kind(key).copied();

    match request.kind {
        WriteKind::Create => {
            let keys: BTreeSet<&str> = request.rows.iter().flat_map(|row| row.keys().map(String::as_str)).collect();
            if request.rows.is_empty() {
                return Err(ModelError::Validation("insert without rows".to_string()));
            }

            writer.push(&format!("INSERT INTO {}", table));
            if keys.is_empty() {
                writer.push(" DEFAULT VALUES");
            } else {
                let columns: Vec<String> = keys.iter().map(|k| quote_identifier(k)).collect();
                writer.push(&format!(" ({}) VALUES ", columns.join(", ")));
                for (index, row) in request.rows.iter().enumerate() {
                    if index > 0 {
                        writer.push(", ");
                    }
                    writer.push("(");
                    for (position, key) in keys.iter().enumerate() {
                        if position > 0 {
                            writer.push(", ");
                        }
                        match row.get(*key) {
                            Some(value) => writer.bind(value.clone(), kind_of(*key)),
                            None => writer.push("DEFAULT"),
                        }
                    }
                    writer.push(")");
                }
            }
            if request.returns_identifier {
                writer.push(&format!(" RETURNING {}", quote_identifier(&request.identifier_key)));
            }
        }
        WriteKind::Update => {
            let assignments = request.rows.first().filter(|row| !row.is_empty()).ok_or_else(|| {
                ModelError::Validation("update without assignments".to_string())
            })?;
            writer.push(&format!("UPDATE {} SET ", table));
            render_assignments(assignments, kind_of, &mut writer);
            render_identifier_match(request, &mut writer)?;
        }
        WriteKind::Delete => {
            writer.push(&format!("DELETE FROM {}", table));
            render_identifier_match(request, &mut writer)?;
        }
    }

    Ok(writer.finish())
}

fn table_reference(schema: &str, alias: Option<&str>) -> String {
    match alias {
        Some(alias) => format!("{} AS {}", quote_identifier(schema), quote_identifier(alias)),
        None => quote_identifier(schema),
    }
}

fn column(scope: &str, key: &str) -> String {
    format!("{}.{}", quote_identifier(scope), quote_identifier(key))
}

fn select_list(spec: &QuerySpec) -> String {
    let root = spec.name();
    let mut items: Vec<String> = spec
        .columns
        .iter()
        .map(|c| select_item(root, &c.key, c.kind, &c.key))
        .collect();
    for join in &spec.joins {
        let name = join.name();
        items.extend(
            join.columns
                .iter()
                .map(|c| select_item(name, &c.key, c.kind, &format!("{}.{}", name, c.key))),
        );
    }
    items.join(", ")
}

fn select_item(scope: &str, key: &str, kind: CodecKind, label: &str) -> String {
    let cast = if matches!(kind, CodecKind::Enum(_)) { "::text" } else { "" };
    format!("{}{} AS {}", column(scope, key), cast, quote_identifier(label))
}

fn render_joins(spec: &QuerySpec, writer: &mut SqlWriter) -> ModelResult<()> {
    for join in &spec.joins {
        writer.push(&format!(
            " {} {} ON {} = {}",
            join.join_type,
            table_reference(&join.schema, join.alias.as_deref()),
            field_sql(spec, &join.local),
            column(join.name(), &join.foreign_key)
        ));
        if let Some(filter) = &join.filter {
            writer.push(" AND ");
            render_predicate(spec, filter, writer)?;
        }
    }
    Ok(())
}

fn render_where(spec: &QuerySpec, writer: &mut SqlWriter) -> ModelResult<()> {
    if let Some(filter) = &spec.filter {
        writer.push(" WHERE ");
        render_predicate(spec, filter, writer)?;
    }
    Ok(())
}

fn render_order_and_limit(spec: &QuerySpec, writer: &mut SqlWriter) {
    if !spec.sorts.is_empty() {
        let sorts: Vec<String> = spec
            .sorts
            .iter()
            .map(|sort| format!("{} {}", field_sql(spec, &sort.field), sort.direction))
            .collect();
        writer.push(&format!(" ORDER BY {}", sorts.join(", ")));
    }
    if let Some(limit) = spec.limit {
        writer.push(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = spec.offset {
        writer.push(&format!(" OFFSET {}", offset));
    }
}

fn render_assignments(row: &Row, kind_of: impl Fn(&str) -> Option<CodecKind>, writer: &mut SqlWriter) {
    for (index, (key, value)) in row.iter().enumerate() {
        if index > 0 {
            writer.push(", ");
        }
        writer.push(&format!("{} = ", quote_identifier(key)));
        writer.bind(value.clone(), kind_of(key));
    }
}

fn render_identifier_match(request: &WriteRequest, writer: &mut SqlWriter) -> ModelResult<()> {
    let identifier = request.identifier.clone().ok_or_else(|| ModelError::Validation(format!(
        "{} on '{}' requires an identifier",
        request.kind, request.schema
    )))?;
    writer.push(&format!(" WHERE {} = ", quote_identifier(&request.identifier_key)));
    writer.bind(identifier, request.column_kind(&request.identifier_key).copied());
    Ok(())
}

fn field_sql(spec: &QuerySpec, field: &FieldRef) -> String {
    column(field.scope.as_deref().unwrap_or(spec.name()), &field.key)
}

fn render_predicate(spec: &QuerySpec, predicate: &Predicate, writer: &mut SqlWriter) -> ModelResult<()> {
    match predicate {
        Predicate::And(predicates) => render_group(spec, predicates, "AND", "TRUE", writer),
        Predicate::Or(predicates) => render_group(spec, predicates, "OR", "FALSE", writer),
        Predicate::Not(inner) => {
            writer.push("NOT (");
            render_predicate(spec, inner, writer)?;
            writer.push(")");
            Ok(())
        }
        Predicate::Compare { field, operator, value } => {
            let kind = spec.column(field).map(|c| c.kind);
            let left = field_sql(spec, field);
            match (operator, value) {
                (QueryOperator::IsNull | QueryOperator::IsNotNull, _) => {
                    writer.push(&format!("{} {}", left, operator));
                }
                (QueryOperator::Like | QueryOperator::NotLike, FilterValue::Value(pattern)) => {
                    // Patterns match the textual form of the column
                    let text = match pattern {
                        DatabaseValue::Enum { case, .. } => DatabaseValue::String(case.clone()),
                        other => other.clone(),
                    };
                    writer.push(&format!("{}::text {} ", left, operator));
                    writer.bind(text, Some(CodecKind::Text));
                }
                (QueryOperator::In, FilterValue::List(values)) if values.is_empty() => writer.push("FALSE"),
                (QueryOperator::NotIn, FilterValue::List(values)) if values.is_empty() => writer.push("TRUE"),
                (_, FilterValue::List(values)) => {
                    writer.push(&format!("{} {} (", left, operator));
                    for (index, value) in values.iter().enumerate() {
                        if index > 0 {
                            writer.push(", ");
                        }
                        writer.bind(value.clone(), kind);
                    }
                    writer.push(")");
                }
                (_, FilterValue::Field(other)) => {
                    writer.push(&format!("{} {} {}", left, operator, field_sql(spec, other)));
                }
                (_, FilterValue::Value(value)) => {
                    writer.push(&format!("{} {} ", left, operator));
                    writer.bind(value.clone(), kind);
                }
                (_, FilterValue::None) => {
                    return Err(ModelError::Validation(format!("operator {} requires an operand", operator)));
                }
            }
            Ok(())
        }
    }
}

fn render_group(
    spec: &QuerySpec,
    predicates: &[Predicate],
    joiner: &str,
    empty: &str,
    writer: &mut SqlWriter,
) -> ModelResult<()> {
    if predicates.is_empty() {
        writer.push(empty);
        return Ok(());
    }
    writer.push("(");
    for (index, predicate) in predicates.iter().enumerate() {
        if index > 0 {
            writer.push(&format!(" {} ", joiner));
        }
        render_predicate(spec, predicate, writer)?;
    }
    writer.push(")");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ColumnSpec;
    use crate::query::{JoinSpec, JoinType, OrderDirection, Sort};

    fn pets() -> QuerySpec {
        QuerySpec::new(
            "pets",
            vec![
                ColumnSpec::new("id", CodecKind::Int),
                ColumnSpec::new("name", CodecKind::Text),
                ColumnSpec::new("species", CodecKind::Enum("species")),
                ColumnSpec::new("deleted_at", CodecKind::DateTime),
            ],
        )
    }

    #[test]
    fn test_select_with_filter_sort_and_pagination() {
        let mut spec = pets();
        spec.add_filter(Predicate::eq("name", "Zizek"));
        spec.add_filter(Predicate::is_null("deleted_at"));
        spec.sorts.push(Sort {
            field: FieldRef::new("name"),
            direction: OrderDirection::Desc,
        });
        spec.limit = Some(10);
        spec.offset = Some(20);

        let statement = render_query(&spec).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT \"pets\".\"id\" AS \"id\", \"pets\".\"name\" AS \"name\", \
             \"pets\".\"species\"::text AS \"species\", \"pets\".\"deleted_at\" AS \"deleted_at\" \
             FROM \"pets\" WHERE (\"pets\".\"name\" = $1 AND \"pets\".\"deleted_at\" IS NULL) \
             ORDER BY \"pets\".\"name\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(statement.params.len(), 1);
        assert_eq!(statement.params[0].kind, Some(CodecKind::Text));
    }

    #[test]
    fn test_enum_parameters_are_cast() {
        let mut spec = pets();
        spec.action = QueryAction::Count;
        spec.add_filter(Predicate::is_in(
            "species",
            vec![DatabaseValue::Enum {
                name: "species".to_string(),
                case: "cat".to_string(),
            }],
        ));
        let statement = render_query(&spec).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) AS \"aggregate\" FROM \"pets\" WHERE \"pets\".\"species\" IN (CAST($1 AS \"species\"))"
        );
    }

    #[test]
    fn test_empty_sets_render_constants() {
        let mut spec = pets();
        spec.action = QueryAction::Delete;
        spec.add_filter(Predicate::is_in("id", Vec::<i64>::new()));
        spec.add_filter(Predicate::not_in("id", Vec::<i64>::new()));
        let statement = render_query(&spec).unwrap();
        assert_eq!(statement.sql, "DELETE FROM \"pets\" WHERE (FALSE AND TRUE)");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_join_carries_its_filter() {
        let mut spec = pets();
        spec.alias = Some("p".to_string());
        spec.columns.truncate(1);
        spec.joins.push(JoinSpec {
            schema: "users".to_string(),
            alias: Some("owner".to_string()),
            join_type: JoinType::Left,
            local: FieldRef::new("id"),
            foreign_key: "pet_id".to_string(),
            columns: vec![ColumnSpec::new("id", CodecKind::Int)],
            filter: Some(Predicate::is_null(FieldRef::on("owner", "deleted_at"))),
        });
        let statement = render_query(&spec).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT \"p\".\"id\" AS \"id\", \"owner\".\"id\" AS \"owner.id\" FROM \"pets\" AS \"p\" \
             LEFT JOIN \"users\" AS \"owner\" ON \"p\".\"id\" = \"owner\".\"pet_id\" \
             AND \"owner\".\"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn test_batch_insert_uses_default_for_missing_keys() {
        let mut first = Row::new();
        first.insert("name".to_string(), "Rex".into());
        let mut second = first.clone();
        second.insert("id".to_string(), DatabaseValue::Int64(7));

        let request = WriteRequest::create("pets", "id", vec![first, second])
            .with_columns(vec![ColumnSpec::new("id", CodecKind::Int), ColumnSpec::new("name", CodecKind::Text)]);
        let statement = render_write(&request).unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO \"pets\" (\"id\", \"name\") VALUES (DEFAULT, $1), ($2, $3)"
        );

        let single = WriteRequest::create("pets", "id", vec![Row::new()]).returning_identifier(true);
        assert_eq!(
            render_write(&single).unwrap().sql,
            "INSERT INTO \"pets\" DEFAULT VALUES RETURNING \"id\""
        );
    }

    #[test]
    fn test_update_and_delete_by_identifier() {
        let mut row = Row::new();
        row.insert("deleted_at".to_string(), DatabaseValue::Null);
        let request = WriteRequest::update("pets", "id", DatabaseValue::Int64(3), row)
            .with_columns(vec![ColumnSpec::new("deleted_at", CodecKind::DateTime)]);
        let statement = render_write(&request).unwrap();
        assert_eq!(statement.sql, "UPDATE \"pets\" SET \"deleted_at\" = $1 WHERE \"id\" = $2");
        assert_eq!(statement.params[0].kind, Some(CodecKind::DateTime));

        let delete = WriteRequest::delete("pets", "id", DatabaseValue::Int64(3));
        assert_eq!(render_write(&delete).unwrap().sql, "DELETE FROM \"pets\" WHERE \"id\" = $1");
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
