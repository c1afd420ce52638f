//! Database Handle - a backend connection plus its middleware and settings
//!
//! A [`Database`] is cheap to clone and shared between tasks. Middleware is
//! attached through [`DatabaseBuilder`] and frozen once the handle is built.

use std::fmt;
use std::sync::Arc;

use crate::backends::{DatabaseBackend, Row, WriteOutcome, WriteRequest};
use crate::config::OrmConfig;
use crate::error::ModelResult;
use crate::middleware::{MiddlewareRegistry, ModelMiddleware};
use crate::model::{Model, ModelDescriptor};
use crate::query::{QueryBuilder, QuerySpec};

struct DatabaseInner {
    backend: Arc<dyn DatabaseBackend>,
    middleware: MiddlewareRegistry,
    config: OrmConfig,
}

/// Shared handle to a database backend
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.inner.backend.backend_type())
            .field("middleware", &self.inner.middleware)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Database {
    /// Handle with default configuration and no middleware
    pub fn new(backend: Arc<dyn DatabaseBackend>) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: Arc<dyn DatabaseBackend>) -> DatabaseBuilder {
        DatabaseBuilder {
            backend,
            middleware: MiddlewareRegistry::new(),
            config: OrmConfig::default(),
        }
    }

    pub fn backend(&self) -> &dyn DatabaseBackend {
        self.inner.backend.as_ref()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    /// Registered descriptor of `M`
    pub fn descriptor<M: Model>(&self) -> ModelResult<Arc<ModelDescriptor<M>>> {
        M::descriptor()
    }

    /// Start a query over `M`
    pub fn query<M: Model>(&self) -> ModelResult<QueryBuilder<M>> {
        QueryBuilder::new(self.clone())
    }

    pub(crate) fn middleware<M: Model>(&self) -> &[Arc<dyn ModelMiddleware<M>>] {
        self.inner.middleware.chain::<M>()
    }

    pub(crate) async fn execute(&self, spec: &QuerySpec) -> ModelResult<Vec<Row>> {
        tracing::debug!(
            schema = %spec.name(),
            action = %spec.action,
            joins = spec.joins.len(),
            "executing query"
        );
        self.inner.backend.execute(spec).await.map_err(|error| {
            tracing::error!(schema = %spec.name(), %error, "query failed");
            error
        })
    }

    pub(crate) async fn execute_write(&self, request: WriteRequest) -> ModelResult<WriteOutcome> {
        let schema = request.schema.clone();
        let kind = request.kind;
        tracing::debug!(schema = %schema, kind = %kind, rows = request.rows.len(), "executing write");
        self.inner.backend.execute_write(request).await.map_err(|error| {
            tracing::error!(schema = %schema, kind = %kind, %error, "write failed");
            error
        })
    }
}

/// Builder that attaches middleware and configuration to a backend
pub struct DatabaseBuilder {
    backend: Arc<dyn DatabaseBackend>,
    middleware: MiddlewareRegistry,
    config: OrmConfig,
}

impl DatabaseBuilder {
    /// Append an interceptor to the chain of `M`
    pub fn middleware<M, W>(mut self, middleware: W) -> Self
    where
        M: Model,
        W: ModelMiddleware<M> + 'static,
    {
        self.middleware.register::<M>(Arc::new(middleware));
        self
    }

    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Database {
        Database {
            inner: Arc::new(DatabaseInner {
                backend: self.backend,
                middleware: self.middleware,
                config: self.config,
            }),
        }
    }
}
