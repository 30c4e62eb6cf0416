mod cli;
mod error;
mod server;

use crate::cli::{UsedKeysBackendArg, CLI};
use crate::server::KeygenGrpcServer;
use anyhow::Context;
use clap::Parser;
use keyhole_core::{UnusedKeys, UsedKeys};
use keyhole_keygen::{spawn_replenisher, Allocator, AllocatorConfig, GeneratorConfig};
use keyhole_proto_schema::v1::keygen_service_server::KeygenServiceServer;
use keyhole_proto_schema::v1::FILE_DESCRIPTOR_SET;
use keyhole_storage::{
    InMemoryUnusedKeys, InMemoryUsedKeys, MySqlUsedKeys, RedisUnusedKeys, RedisUsedKeys,
};
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_json);

    info!(
        listen_addr = %config.listen_addr,
        used_keys_backend = %config.used_keys_backend,
        predefined_keys_count = config.predefined_keys_count,
        key_len = config.key_len,
        ttl = ?config.ttl,
        "starting keygen gRPC server"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    match config.used_keys_backend {
        UsedKeysBackendArg::InMemory => {
            run(
                &config,
                shutdown,
                Arc::new(InMemoryUsedKeys::new()),
                Arc::new(InMemoryUnusedKeys::new()),
            )
            .await
        }
        UsedKeysBackendArg::Redis => {
            let used_url = config
                .used_redis_url
                .as_deref()
                .context("used redis url is required when used keys backend is redis")?;
            let used = RedisUsedKeys::with_prefix(
                redis_connection(used_url).await?,
                config.used_redis_prefix.clone(),
            );
            let unused = unused_keys(&config).await?;
            run(&config, shutdown, Arc::new(used), Arc::new(unused)).await
        }
        UsedKeysBackendArg::Mysql => {
            let dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when used keys backend is mysql")?;
            let used = MySqlUsedKeys::connect(dsn)
                .await
                .context("failed to connect to mysql")?;
            used.ensure_schema()
                .await
                .context("failed to create used_keys table")?;
            let unused = unused_keys(&config).await?;
            run(&config, shutdown, Arc::new(used), Arc::new(unused)).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn redis_connection(url: &str) -> anyhow::Result<MultiplexedConnection> {
    let client = redis::Client::open(url).context("invalid redis url")?;
    client
        .get_multiplexed_async_connection()
        .await
        .context("failed to connect to redis")
}

async fn unused_keys(config: &CLI) -> anyhow::Result<RedisUnusedKeys> {
    let url = config
        .unused_redis_url
        .as_deref()
        .context("unused redis url is required unless used keys backend is in-memory")?;
    Ok(RedisUnusedKeys::new(redis_connection(url).await?))
}

async fn run<U: UsedKeys, N: UnusedKeys>(
    config: &CLI,
    shutdown: CancellationToken,
    used: Arc<U>,
    unused: Arc<N>,
) -> anyhow::Result<()> {
    let generator_config = GeneratorConfig::builder()
        .predefined_keys_count(config.predefined_keys_count)
        .delay(config.delay)
        .key_len(config.key_len)
        .build();
    let replenisher = spawn_replenisher(
        shutdown.child_token(),
        generator_config,
        used.clone(),
        unused.clone(),
    );

    let allocator = Allocator::new(
        AllocatorConfig::builder().ttl(config.ttl).build(),
        used,
        unused,
    );
    let service = KeygenGrpcServer::new(allocator, config.request_timeout, shutdown.clone());

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<KeygenServiceServer<KeygenGrpcServer<U, N>>>()
        .await;

    let reflection = if config.enable_reflection {
        let service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()
            .context("failed to build reflection service")?;
        Some(service)
    } else {
        None
    };

    let drained = {
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            info!("shutdown requested, draining");
            health_reporter
                .set_not_serving::<KeygenServiceServer<KeygenGrpcServer<U, N>>>()
                .await;
        }
    };

    info!(
        listen_addr = %config.listen_addr,
        reflection = config.enable_reflection,
        "serving keygen gRPC"
    );
    let served = Server::builder()
        .add_service(health_service)
        .add_optional_service(reflection)
        .add_service(KeygenServiceServer::new(service))
        .serve_with_shutdown(config.listen_addr, drained)
        .await;

    // The replenisher must stop even when the server itself failed.
    shutdown.cancel();
    match tokio::time::timeout(config.shutdown_timeout, replenisher).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "replenisher task failed"),
        Err(_) => warn!(timeout = ?config.shutdown_timeout, "replenisher did not stop in time"),
    }

    served.context("gRPC server failed")?;
    info!("keygen server shut down");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C signal"),
        () = terminate => info!("received SIGTERM signal"),
        () = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}
