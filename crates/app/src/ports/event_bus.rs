//! Event bus port — publish domain events to whoever listens.

use std::future::Future;

use gree_amber_domain::error::HubError;
use gree_amber_domain::event::Event;

/// Publishes domain events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HubError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), HubError>> + Send {
        (**self).publish(event)
    }
}
