use crate::{connect_until_ready, Result};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

const MYSQL_PORT: u16 = 3306;

/// Credentials and image tag of the throwaway database.
#[derive(Debug, Clone, TypedBuilder)]
pub struct MySqlConfig {
    #[builder(default = "keyhole".to_string(), setter(into))]
    database: String,
    #[builder(default = "keyhole".to_string(), setter(into))]
    username: String,
    #[builder(default = "keyhole".to_string(), setter(into))]
    password: String,
    #[builder(default = "8.4".to_string(), setter(into))]
    tag: String,
    #[builder(default = 5)]
    max_connections: u32,
}

impl MySqlConfig {
    fn dsn(&self, host: &str, port: u16) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username, self.password, host, port, self.database
        )
    }
}

/// A MySQL container that lives as long as the value does.
pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    config: MySqlConfig,
}

impl MySqlServer {
    pub async fn new(config: MySqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", config.tag.as_str())
            .with_exposed_port(MYSQL_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .start()
            .await?;

        Ok(Self { container, config })
    }

    pub async fn database_url(&self) -> Result<String> {
        let host = self.container.get_host().await?.to_string();
        let port = self.container.get_host_port_ipv4(MYSQL_PORT).await?;
        Ok(self.config.dsn(&host, port))
    }

    /// Opens a pool against the test database.
    ///
    /// MySQL restarts once after initialising the data directory, so the
    /// first connections are often refused.
    pub async fn pool(&self) -> Result<MySqlPool> {
        let dsn = self.database_url().await?;
        let dsn = dsn.as_str();
        let options = MySqlPoolOptions::new().max_connections(self.config.max_connections);

        connect_until_ready("mysql", 20, Duration::from_millis(500), move || {
            options.clone().connect(dsn)
        })
        .await
    }
}
