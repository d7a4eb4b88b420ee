use super::{Envelope, SendFuture, Transport};
use crate::error::TransportError;

/// JSON-over-HTTP POST via a shared `reqwest::Client`. The response body
/// is never read.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for HttpTransport {
    fn send(&self, endpoint: &str, envelope: &Envelope) -> SendFuture {
        let request = self.client.post(endpoint).json(envelope);
        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            Ok(())
        })
    }
}
