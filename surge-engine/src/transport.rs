use async_trait::async_trait;
use surge_client::Client;
use surge_common::{RequestSpec, ResponseView, Result};

/// Sends one request and returns the fully-read response.
///
/// An `Err` means no response was obtained; HTTP error statuses are `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestSpec) -> Result<ResponseView>;
}

#[async_trait]
impl Transport for Client {
    async fn send(&self, request: &RequestSpec) -> Result<ResponseView> {
        self.execute(request).await
    }
}
