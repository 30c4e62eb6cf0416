//! Disposable backing stores for integration tests.

pub mod error;
pub mod mysql;
pub mod redis;

pub use error::{Result, TestInfraError};

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Keeps calling `connect` until it succeeds, pausing between attempts.
///
/// Containers log readiness slightly before the port accepts clients.
async fn connect_until_ready<T, E, F, Fut>(
    service: &'static str,
    attempts: u32,
    pause: Duration,
    mut connect: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut tried = 0;
    loop {
        tried += 1;
        match connect().await {
            Ok(conn) => return Ok(conn),
            Err(err) if tried >= attempts => {
                return Err(TestInfraError::Unready {
                    service,
                    attempts: tried,
                    last_error: err.to_string(),
                });
            }
            Err(_) => tokio::time::sleep(pause).await,
        }
    }
}
