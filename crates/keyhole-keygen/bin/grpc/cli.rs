use clap::{Parser, ValueEnum};
use jiff::SignedDuration;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

pub const LISTEN_ADDR_ENV: &str = "KEYHOLE_KEYGEN_GRPC_LISTEN_ADDR";
pub const USED_KEYS_BACKEND_ENV: &str = "KEYHOLE_KEYGEN_USED_KEYS_BACKEND";
pub const UNUSED_REDIS_URL_ENV: &str = "KEYHOLE_KEYGEN_UNUSED_REDIS_URL";
pub const USED_REDIS_URL_ENV: &str = "KEYHOLE_KEYGEN_USED_REDIS_URL";
pub const USED_REDIS_PREFIX_ENV: &str = "KEYHOLE_KEYGEN_USED_REDIS_PREFIX";
pub const MYSQL_DSN_ENV: &str = "KEYHOLE_KEYGEN_MYSQL_DSN";
pub const PREDEFINED_KEYS_COUNT_ENV: &str = "KEYHOLE_KEYGEN_PREDEFINED_KEYS_COUNT";
pub const DELAY_ENV: &str = "KEYHOLE_KEYGEN_DELAY";
pub const KEY_LEN_ENV: &str = "KEYHOLE_KEYGEN_KEY_LEN";
pub const TTL_ENV: &str = "KEYHOLE_KEYGEN_TTL";
pub const REQUEST_TIMEOUT_ENV: &str = "KEYHOLE_KEYGEN_REQUEST_TIMEOUT";
pub const SHUTDOWN_TIMEOUT_ENV: &str = "KEYHOLE_KEYGEN_SHUTDOWN_TIMEOUT";
pub const LOG_JSON_ENV: &str = "KEYHOLE_KEYGEN_LOG_JSON";
pub const ENABLE_REFLECTION_ENV: &str = "KEYHOLE_KEYGEN_ENABLE_REFLECTION";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:50051";
pub const DEFAULT_PREDEFINED_KEYS_COUNT: &str = "100";
pub const DEFAULT_DELAY: &str = "60s";
pub const DEFAULT_KEY_LEN: &str = "10";
pub const DEFAULT_TTL: &str = "24h";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "5s";
pub const DEFAULT_SHUTDOWN_TIMEOUT: &str = "10s";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UsedKeysBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "redis")]
    Redis,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for UsedKeysBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UsedKeysBackendArg::InMemory => write!(f, "in-memory"),
            UsedKeysBackendArg::Redis => write!(f, "redis"),
            UsedKeysBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

/// Accepts both friendly (`90s`, `1h 30m`) and ISO 8601 (`PT1H`) durations.
fn parse_duration(value: &str) -> Result<Duration, String> {
    let duration: SignedDuration = value.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from(duration).map_err(|_| format!("duration must not be negative: {value}"))
}

#[derive(Debug, Parser)]
#[command(name = "keyhole-keygen-grpc-server")]
pub struct CLI {
    #[arg(long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    /// Where claimed keys are recorded. The reservoir lives in Redis unless
    /// this is `in-memory`, in which case both stores are process-local.
    #[arg(
        long,
        env = USED_KEYS_BACKEND_ENV,
        value_enum,
        default_value_t = UsedKeysBackendArg::InMemory
    )]
    pub used_keys_backend: UsedKeysBackendArg,

    #[arg(
        long,
        env = UNUSED_REDIS_URL_ENV,
        required_if_eq_any([("used_keys_backend", "redis"), ("used_keys_backend", "mysql")])
    )]
    pub unused_redis_url: Option<String>,

    #[arg(long, env = USED_REDIS_URL_ENV, required_if_eq("used_keys_backend", "redis"))]
    pub used_redis_url: Option<String>,

    #[arg(long, env = USED_REDIS_PREFIX_ENV, default_value = "")]
    pub used_redis_prefix: String,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("used_keys_backend", "mysql"))]
    pub mysql_dsn: Option<String>,

    #[arg(long, env = PREDEFINED_KEYS_COUNT_ENV, default_value = DEFAULT_PREDEFINED_KEYS_COUNT)]
    pub predefined_keys_count: u64,

    #[arg(long, env = DELAY_ENV, default_value = DEFAULT_DELAY, value_parser = parse_duration)]
    pub delay: Duration,

    #[arg(
        long,
        env = KEY_LEN_ENV,
        default_value = DEFAULT_KEY_LEN,
        value_parser = clap::value_parser!(u8).range(1..=64)
    )]
    pub key_len: u8,

    #[arg(long, env = TTL_ENV, default_value = DEFAULT_TTL, value_parser = parse_duration)]
    pub ttl: Duration,

    #[arg(
        long,
        env = REQUEST_TIMEOUT_ENV,
        default_value = DEFAULT_REQUEST_TIMEOUT,
        value_parser = parse_duration
    )]
    pub request_timeout: Duration,

    #[arg(
        long,
        env = SHUTDOWN_TIMEOUT_ENV,
        default_value = DEFAULT_SHUTDOWN_TIMEOUT,
        value_parser = parse_duration
    )]
    pub shutdown_timeout: Duration,

    #[arg(long, env = LOG_JSON_ENV)]
    pub log_json: bool,

    /// Serves the gRPC reflection API next to the keygen service.
    #[arg(
        long,
        env = ENABLE_REFLECTION_ENV,
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_reflection: bool,
}
