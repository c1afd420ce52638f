//! Query Builder WHERE clause operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::DatabaseValue;
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Add a predicate; multiple filters are combined with AND
    pub fn filter(self, predicate: Predicate) -> Self {
        let resolved = self.resolve_predicate(predicate);
        self.record(resolved, |builder, predicate| builder.spec.add_filter(predicate))
    }

    /// Add WHERE condition with equality
    pub fn where_eq(self, field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        self.filter(Predicate::eq(field, value))
    }

    /// Add WHERE condition with not equal
    pub fn where_ne(self, field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        self.filter(Predicate::ne(field, value))
    }

    /// Add WHERE condition with greater than
    pub fn where_gt(self, field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        self.filter(Predicate::gt(field, value))
    }

    /// Add WHERE condition with greater than or equal
    pub fn where_gte(self, field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        self.filter(Predicate::gte(field, value))
    }

    /// Add WHERE condition with less than
    pub fn where_lt(self, field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        self.filter(Predicate::lt(field, value))
    }

    /// Add WHERE condition with less than or equal
    pub fn where_lte(self, field: impl Into<FieldRef>, value: impl Into<DatabaseValue>) -> Self {
        self.filter(Predicate::lte(field, value))
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, field: impl Into<FieldRef>, pattern: &str) -> Self {
        self.filter(Predicate::like(field, pattern))
    }

    /// Add WHERE condition with NOT LIKE
    pub fn where_not_like(self, field: impl Into<FieldRef>, pattern: &str) -> Self {
        self.filter(Predicate::not_like(field, pattern))
    }

    /// Add WHERE condition with IN
    pub fn where_in<V: Into<DatabaseValue>>(
        self,
        field: impl Into<FieldRef>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(Predicate::is_in(field, values))
    }

    /// Add WHERE condition with NOT IN
    pub fn where_not_in<V: Into<DatabaseValue>>(
        self,
        field: impl Into<FieldRef>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(Predicate::not_in(field, values))
    }

    /// Add WHERE condition for NULL values
    pub fn where_null(self, field: impl Into<FieldRef>) -> Self {
        self.filter(Predicate::is_null(field))
    }

    /// Add WHERE condition for NOT NULL values
    pub fn where_not_null(self, field: impl Into<FieldRef>) -> Self {
        self.filter(Predicate::is_not_null(field))
    }

    /// Include soft-deleted records in this query
    pub fn with_deleted(mut self) -> Self {
        self.spec.visibility = SoftDeleteVisibility::WithDeleted;
        self
    }
}
