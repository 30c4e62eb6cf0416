use crate::error::KeygenError;
use keyhole_core::{UnusedKeys, UsedKeys};
use keyhole_keygen::Allocator;
use keyhole_proto_schema::v1 as proto;
use keyhole_proto_schema::v1::keygen_service_server::KeygenService;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::debug;

pub struct KeygenGrpcServer<U, N> {
    allocator: Allocator<U, N>,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

impl<U: UsedKeys, N: UnusedKeys> KeygenGrpcServer<U, N> {
    pub fn new(
        allocator: Allocator<U, N>,
        request_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            allocator,
            request_timeout,
            shutdown,
        }
    }
}

#[tonic::async_trait]
impl<U: UsedKeys, N: UnusedKeys> KeygenService for KeygenGrpcServer<U, N> {
    async fn generate_key(
        &self,
        _request: Request<proto::GenerateKeyRequest>,
    ) -> Result<Response<proto::GenerateKeyResponse>, Status> {
        let key = self
            .allocator
            .use_key_within(&self.shutdown, self.request_timeout)
            .await
            .map_err(KeygenError::from)?;

        debug!(key = %key, expires_at = %key.expires_at, "handed out key");
        Ok(Response::new(key.into()))
    }
}
