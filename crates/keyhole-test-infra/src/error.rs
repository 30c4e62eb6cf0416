use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("failed to start container: {0}")]
    Container(#[from] testcontainers::TestcontainersError),

    #[error("invalid redis url: {0}")]
    RedisUrl(#[from] redis::RedisError),

    /// The store kept refusing connections after its container reported ready.
    #[error("{service} still unreachable after {attempts} attempts: {last_error}")]
    Unready {
        service: &'static str,
        attempts: u32,
        last_error: String,
    },
}

pub type Result<T, E = TestInfraError> = std::result::Result<T, E>;
