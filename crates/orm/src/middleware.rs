//! Model Middleware - interceptors wrapped around lifecycle operations
//!
//! Interceptors for a model type run in registration order. Each one receives
//! the instance and a [`Next`] continuation for the rest of the chain; the
//! innermost link is the backend operation itself. Code before `next.run` runs
//! on the way in, code after it on the way out, and not calling `next` at all
//! short-circuits the operation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ModelResult;
use crate::model::Model;

/// Lifecycle event being intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Create,
    Update,
    SoftDelete,
    Delete { force: bool },
    Restore,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Create => write!(f, "create"),
            LifecycleEvent::Update => write!(f, "update"),
            LifecycleEvent::SoftDelete => write!(f, "soft_delete"),
            LifecycleEvent::Delete { force: true } => write!(f, "force_delete"),
            LifecycleEvent::Delete { force: false } => write!(f, "delete"),
            LifecycleEvent::Restore => write!(f, "restore"),
        }
    }
}

/// Interceptor for the lifecycle of `M`
///
/// Every hook defaults to passing straight through to `next`.
#[async_trait]
pub trait ModelMiddleware<M: Model>: Send + Sync {
    async fn create(&self, model: &mut M, next: Next<'_, M>) -> ModelResult<()> {
        next.run(model).await
    }

    async fn update(&self, model: &mut M, next: Next<'_, M>) -> ModelResult<()> {
        next.run(model).await
    }

    async fn soft_delete(&self, model: &mut M, next: Next<'_, M>) -> ModelResult<()> {
        next.run(model).await
    }

    /// Physical delete; `force` is set when a soft-deletable model is force deleted
    async fn delete(&self, model: &mut M, force: bool, next: Next<'_, M>) -> ModelResult<()> {
        let _ = force;
        next.run(model).await
    }

    async fn restore(&self, model: &mut M, next: Next<'_, M>) -> ModelResult<()> {
        next.run(model).await
    }
}

/// The operation at the end of a middleware chain
#[async_trait]
pub(crate) trait LifecycleOperation<M: Model>: Send + Sync {
    async fn apply(&self, event: LifecycleEvent, model: &mut M) -> ModelResult<()>;
}

/// Continuation for the remainder of a middleware chain
pub struct Next<'a, M: Model> {
    event: LifecycleEvent,
    chain: &'a [Arc<dyn ModelMiddleware<M>>],
    operation: &'a dyn LifecycleOperation<M>,
}

impl<'a, M: Model> Next<'a, M> {
    pub(crate) fn new(
        event: LifecycleEvent,
        chain: &'a [Arc<dyn ModelMiddleware<M>>],
        operation: &'a dyn LifecycleOperation<M>,
    ) -> Self {
        Self {
            event,
            chain,
            operation,
        }
    }

    pub fn event(&self) -> LifecycleEvent {
        self.event
    }

    /// Run the rest of the chain, ending with the backend operation
    pub async fn run(self, model: &mut M) -> ModelResult<()> {
        let Some((head, rest)) = self.chain.split_first() else {
            return self.operation.apply(self.event, model).await;
        };

        let next = Next::new(self.event, rest, self.operation);
        match self.event {
            LifecycleEvent::Create => head.create(model, next).await,
            LifecycleEvent::Update => head.update(model, next).await,
            LifecycleEvent::SoftDelete => head.soft_delete(model, next).await,
            LifecycleEvent::Delete { force } => head.delete(model, force, next).await,
            LifecycleEvent::Restore => head.restore(model, next).await,
        }
    }
}

/// Per-model-type middleware chains of one `Database` handle
#[derive(Default)]
pub struct MiddlewareRegistry {
    chains: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor to the chain of `M`
    pub fn register<M: Model>(&mut self, middleware: Arc<dyn ModelMiddleware<M>>) {
        let chain = self
            .chains
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Box::new(Vec::<Arc<dyn ModelMiddleware<M>>>::new()));
        if let Some(chain) = chain.downcast_mut::<Vec<Arc<dyn ModelMiddleware<M>>>>() {
            chain.push(middleware);
        }
    }

    /// Interceptors of `M` in registration order
    pub fn chain<M: Model>(&self) -> &[Arc<dyn ModelMiddleware<M>>] {
        self.chains
            .get(&TypeId::of::<M>())
            .and_then(|chain| chain.downcast_ref::<Vec<Arc<dyn ModelMiddleware<M>>>>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len<M: Model>(&self) -> usize {
        self.chain::<M>().len()
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("model_types", &self.chains.len())
            .finish()
    }
}
