//! Mutation gateway service: the echo resolver plus its broadcast side
//! effect.
//!
//! A successful `publishStatusUpdate` call pushes its echo to every current
//! `onStatusUpdate` subscriber. Nothing is stored.

use crate::broadcast::{Subscription, SubscriptionBroadcaster};
use status_relay_core::mutation::ON_STATUS_UPDATE;
use status_relay_core::{
    DeliveryError, DeliveryTarget, MutationArgs, MutationTransport, StatusUpdate, ValidationError,
    gateway,
};
use std::future::Future;
use std::pin::Pin;

/// Stateless gateway wired to a subscription broadcaster.
#[derive(Debug, Clone, Default)]
pub struct MutationGateway {
    broadcaster: SubscriptionBroadcaster<StatusUpdate>,
}

impl MutationGateway {
    /// Gateway with its own broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway publishing through an existing broadcaster.
    #[must_use]
    pub const fn with_broadcaster(broadcaster: SubscriptionBroadcaster<StatusUpdate>) -> Self {
        Self { broadcaster }
    }

    /// Validate, echo and broadcast one mutation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the arguments are rejected; nothing
    /// is broadcast in that case.
    pub fn publish_status_update(&self, args: &MutationArgs) -> Result<StatusUpdate, ValidationError> {
        let update = gateway::publish(args).inspect_err(|err| {
            tracing::debug!(error = %err, "publishStatusUpdate rejected");
        })?;

        let subscribers = self.broadcaster.publish(ON_STATUS_UPDATE, update.clone());
        tracing::info!(
            order_id = %update.order_id,
            status = %update.status,
            prev_status = %update.prev_status,
            subscribers,
            "Status update published"
        );
        Ok(update)
    }

    /// Subscribe to `onStatusUpdate`.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<StatusUpdate> {
        self.broadcaster.subscribe(ON_STATUS_UPDATE)
    }

    /// Current number of `onStatusUpdate` subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count(ON_STATUS_UPDATE)
    }

    /// The underlying broadcaster.
    #[must_use]
    pub const fn broadcaster(&self) -> &SubscriptionBroadcaster<StatusUpdate> {
        &self.broadcaster
    }
}

/// Transport that calls an in-process [`MutationGateway`] directly,
/// bypassing HTTP.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    gateway: MutationGateway,
}

impl LocalTransport {
    /// Transport invoking `gateway`.
    #[must_use]
    pub const fn new(gateway: MutationGateway) -> Self {
        Self { gateway }
    }
}

impl MutationTransport for LocalTransport {
    fn invoke<'a>(
        &'a self,
        _target: &'a DeliveryTarget,
        args: &'a MutationArgs,
    ) -> Pin<Box<dyn Future<Output = Result<StatusUpdate, DeliveryError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.gateway.publish_status_update(args)?) })
    }
}
