use genqueue_core::GenerationRequest;

use crate::{OperationHandle, PollResponse, RemoteError};

/// Contract the orchestrator needs from the remote generation service.
#[async_trait::async_trait]
pub trait RemoteOperationClient: Send + Sync {
    /// Starts the remote operation producing output `output_index`.
    async fn submit(
        &self,
        request: &GenerationRequest,
        output_index: usize,
    ) -> Result<OperationHandle, RemoteError>;

    async fn poll(&self, handle: &OperationHandle) -> Result<PollResponse, RemoteError>;

    /// Materializes a finished artifact.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, RemoteError>;
}
