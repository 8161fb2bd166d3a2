use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::Event;

/// A subscriber callback.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a shareable handler.
///
/// ```rust,ignore
/// let h = handler_fn(|event| async move {
///     tracing::info!(id = %event.id, "got it");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A module's declaration of one event handler.
///
/// The registry subscribes it to the bus during initialization, using `name`
/// as the handler identity for `event_type`.
#[derive(Clone)]
pub struct EventSubscription {
    pub event_type: String,
    pub name: String,
    pub priority: i32,
    pub handler: Arc<dyn EventHandler>,
}

impl EventSubscription {
    pub fn new(
        event_type: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            name: name.into(),
            priority: 0,
            handler,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("event_type", &self.event_type)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}
