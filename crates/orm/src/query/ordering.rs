//! Query Builder ORDER BY and pagination operations

use super::builder::QueryBuilder;
use super::types::*;
use crate::model::Model;

impl<M: Model> QueryBuilder<M> {
    /// Add a sort clause; earlier sorts take precedence
    pub fn sort(self, field: impl Into<FieldRef>, direction: OrderDirection) -> Self {
        let resolved = self.resolve(&field.into());
        self.record(resolved, |builder, (field, _)| {
            builder.spec.sorts.push(Sort { field, direction });
        })
    }

    /// Add ORDER BY clause (ascending)
    pub fn order_by(self, field: impl Into<FieldRef>) -> Self {
        self.sort(field, OrderDirection::Asc)
    }

    /// Add ORDER BY clause (descending)
    pub fn order_by_desc(self, field: impl Into<FieldRef>) -> Self {
        self.sort(field, OrderDirection::Desc)
    }

    /// Add LIMIT clause
    pub fn limit(mut self, count: u64) -> Self {
        self.spec.limit = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, offset: u64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    /// 1-based page of `per_page` records
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        self.limit(per_page).offset(offset)
    }
}
