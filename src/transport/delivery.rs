use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Envelope, Transport};
use crate::error::TransportError;

pub type DeliveryFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Delivery policy in front of a transport. The returned future never
/// fails: whatever the policy does with a failed send stays inside it.
pub trait Delivery: Send + Sync + 'static {
    fn deliver(&self, endpoint: &str, envelope: Envelope, timeout: Duration) -> DeliveryFuture;
}

/// Send once; on failure or timeout log and drop. No retries, no queue.
pub struct BestEffortDelivery<T> {
    transport: T,
}

impl<T: Transport> BestEffortDelivery<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> Delivery for BestEffortDelivery<T> {
    fn deliver(&self, endpoint: &str, envelope: Envelope, timeout: Duration) -> DeliveryFuture {
        let label = envelope.label();
        let send = self.transport.send(endpoint, &envelope);
        let endpoint = endpoint.to_owned();

        Box::pin(async move {
            let result = if timeout.is_zero() {
                send.await
            } else {
                match tokio::time::timeout(timeout, send).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(timeout.as_millis() as u64)),
                }
            };

            match result {
                Ok(()) => debug!(%endpoint, payload = label, "telemetry delivered"),
                Err(e) => warn!(%endpoint, payload = label, error = %e, "telemetry dropped"),
            }
        })
    }
}
