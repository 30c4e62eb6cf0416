use crate::{connect_until_ready, Result};
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};

const REDIS_PORT: u16 = 6379;

/// A standalone Redis container that lives as long as the value does.
pub struct RedisServer {
    container: ContainerAsync<GenericImage>,
}

impl RedisServer {
    pub async fn new() -> Result<Self> {
        let container = GenericImage::new("redis", "8.6.0")
            .with_exposed_port(REDIS_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
            .start()
            .await?;
        Ok(Self { container })
    }

    pub async fn url(&self) -> Result<String> {
        let host = match self.container.get_host().await?.to_string().as_str() {
            "localhost" => "127.0.0.1".to_string(),
            other => other.to_string(),
        };
        let port = self.container.get_host_port_ipv4(REDIS_PORT).await?;
        Ok(format!("redis://{host}:{port}"))
    }

    pub async fn connection(&self) -> Result<MultiplexedConnection> {
        let client = &redis::Client::open(self.url().await?)?;

        connect_until_ready("redis", 10, Duration::from_millis(200), move || {
            client.get_multiplexed_async_connection()
        })
        .await
    }
}
