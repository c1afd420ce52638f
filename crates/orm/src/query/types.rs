//! Query Builder Types - backend-neutral query specification
//!
//! A [`QuerySpec`] is what backends execute. Field references inside a spec
//! handed to a backend are already resolved to flat storage keys, and filter
//! values are already in their storage encoding.

use std::fmt;

use crate::backends::{ColumnSpec, DatabaseValue, Row};

/// Query operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl QueryOperator {
    /// Operators that take no right-hand value
    pub fn is_unary(self) -> bool {
        matches!(self, QueryOperator::IsNull | QueryOperator::IsNotNull)
    }

    /// Operators whose right-hand side is a list
    pub fn is_set(self) -> bool {
        matches!(self, QueryOperator::In | QueryOperator::NotIn)
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Reference to a field, optionally qualified by a schema name or alias
///
/// Unqualified dotted references such as `"pet.name"` are resolved against the
/// root model's groups first, then against joined schemas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Schema or alias; `None` is the root of the query
    pub scope: Option<String>,
    pub key: String,
}

impl FieldRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            scope: None,
            key: key.into(),
        }
    }

    /// Field of a joined schema or alias
    pub fn on(scope: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            key: key.into(),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(key: &str) -> Self {
        FieldRef::new(key)
    }
}

impl From<String> for FieldRef {
    fn from(key: String) -> Self {
        FieldRef::new(key)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}.{}", scope, self.key),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Value(DatabaseValue),
    List(Vec<DatabaseValue>),
    Field(FieldRef),
    None,
}

/// Filter predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: FieldRef,
        operator: QueryOperator,
        value: FilterValue,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    fn compare(field: impl Into<FieldRef>, operator: QueryOperator, value: impl Into<DatabaseValue>) -> Self {
        Predicate::Compare {
            field: field.into(),
            operator,
            value: FilterValue::Value(value.into()),
        }
    }

    fn set<V: Into<DatabaseValue>>(
        field: impl Into<FieldRef>,
        operator: QueryOperator,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::Compare {
            field: field.into(),
            operator,
            value: FilterValue::List(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn eq(field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        Self::compare(field, QueryOperator::Equal, value)
    }

    pub fn ne(field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        Self::compare(field, QueryOperator::NotEqual, value)
    }

    pub fn gt(field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        Self::compare(field, QueryOperator::GreaterThan, value)
    }

    pub fn gte(field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        Self::compare(field, QueryOperator::GreaterThanOrEqual, value)
    }

    pub fn lt(field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        Self::compare(field, QueryOperator::LessThan, value)
    }

    pub fn lte(field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        Self::compare(field, QueryOperator::LessThanOrEqual, value)
    }

    /// SQL `LIKE` pattern with `%` and `_` wildcards
    pub fn like(field: impl Into<FieldRef>, pattern: &str) -> Self {
        Self::compare(field, QueryOperator::Like, pattern)
    }

    pub fn not_like(field: impl Into<FieldRef>, pattern: &str) -> Self {
        Self::compare(field, QueryOperator::NotLike, pattern)
    }

    pub fn is_in<V: Into<DatabaseValue>>(field: impl Into<FieldRef>, values: impl IntoIterator<Item = V>) -> Self {
        Self::set(field, QueryOperator::In, values)
    }

    pub fn not_in<V: Into<DatabaseValue>>(field: impl Into<FieldRef>, values: impl IntoIterator<Item = V>) -> Self {
        Self::set(field, QueryOperator::NotIn, values)
    }

    pub fn is_null(field: impl Into<FieldRef>) -> Self {
        Predicate::Compare {
            field: field.into(),
            operator: QueryOperator::IsNull,
            value: FilterValue::None,
        }
    }

    pub fn is_not_null(field: impl Into<FieldRef>) -> Self {
        Predicate::Compare {
            field: field.into(),
            operator: QueryOperator::IsNotNull,
            value: FilterValue::None,
        }
    }

    /// Compare two fields, typically across joined schemas
    pub fn fields(left: impl Into<FieldRef>, operator: QueryOperator, right: impl Into<FieldRef>) -> Self {
        Predicate::Compare {
            field: left.into(),
            operator,
            value: FilterValue::Field(right.into()),
        }
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or(predicates)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    /// Conjunction with another predicate, flattening nested `And`s
    pub fn and_also(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut predicates) => {
                predicates.push(other);
                Predicate::And(predicates)
            }
            existing => Predicate::And(vec![existing, other]),
        }
    }
}

/// Sort clause
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: FieldRef,
    pub direction: OrderDirection,
}

/// Join of another schema into the query
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub schema: String,
    pub alias: Option<String>,
    pub join_type: JoinType,
    /// Field of the root or an earlier join
    pub local: FieldRef,
    /// Key on the joined schema matched against `local`
    pub foreign_key: String,
    pub columns: Vec<ColumnSpec>,
    /// Extra match condition, such as soft-delete visibility of the joined schema
    pub filter: Option<Predicate>,
}

impl JoinSpec {
    /// Name the joined columns are qualified with
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.schema)
    }
}

/// What a query does with the matching records
#[derive(Debug, Clone, PartialEq)]
pub enum QueryAction {
    Read,
    Count,
    /// Assign the given flat values to every match
    Update(Row),
    Delete,
}

impl fmt::Display for QueryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryAction::Read => write!(f, "read"),
            QueryAction::Count => write!(f, "count"),
            QueryAction::Update(_) => write!(f, "update"),
            QueryAction::Delete => write!(f, "delete"),
        }
    }
}

/// Whether soft-deleted records are visible to a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftDeleteVisibility {
    #[default]
    ExcludeDeleted,
    WithDeleted,
}

/// Complete, backend-neutral description of one query
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub schema: String,
    pub alias: Option<String>,
    pub columns: Vec<ColumnSpec>,
    pub filter: Option<Predicate>,
    pub sorts: Vec<Sort>,
    pub joins: Vec<JoinSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub action: QueryAction,
    pub visibility: SoftDeleteVisibility,
    /// Relations to eager load after the query runs
    pub eager: Vec<String>,
}

impl QuerySpec {
    pub fn new(schema: &str, columns: Vec<ColumnSpec>) -> Self {
        Self {
            schema: schema.to_string(),
            alias: None,
            columns,
            filter: None,
            sorts: Vec::new(),
            joins: Vec::new(),
            limit: None,
            offset: None,
            action: QueryAction::Read,
            visibility: SoftDeleteVisibility::default(),
            eager: Vec::new(),
        }
    }

    /// Name the root columns are qualified with
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.schema)
    }

    /// Codec of a root or joined column, by resolved field reference
    pub fn column(&self, field: &FieldRef) -> Option<&ColumnSpec> {
        let columns = match &field.scope {
            None => &self.columns,
            Some(scope) if scope == self.name() => &self.columns,
            Some(scope) => &self.joins.iter().find(|j| j.name() == scope)?.columns,
        };
        columns.iter().find(|c| c.key == field.key)
    }

    pub fn add_filter(&mut self, predicate: Predicate) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(predicate),
            None => predicate,
        });
    }
}
