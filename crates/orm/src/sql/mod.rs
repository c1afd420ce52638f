//! SQL generation
//!
//! Rendering of query specifications and write requests to parameterised
//! PostgreSQL statements.

pub mod generation;

pub use generation::{quote_identifier, render_query, render_write, SqlParam, SqlStatement};
