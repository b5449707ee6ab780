//! Consumer command line
//!
//! Every option can also be set through an `FC_CONSUMER_*` environment
//! variable (or a `.env` file).

use clap::Parser;
use csv2db_common::config::default_worker_count;
use csv2db_queue::config::{DEFAULT_QUEUE_ADDR, DEFAULT_QUEUE_PASS, DEFAULT_QUEUE_USER};
use csv2db_queue::{QueueConfig, DEFAULT_QUEUE_NAME};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::fmt;

use crate::pipeline::FailurePolicy;

// ============================================================================
// Database Defaults
// ============================================================================

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_USER: &str = "fcuser";
pub const DEFAULT_DB_PASS: &str = "fcpass";
pub const DEFAULT_DB_NAME: &str = "userdata";

/// Store messages from the csv2db queue in Postgres
#[derive(Parser, Clone)]
#[command(name = "csv2db-consumer")]
#[command(author, version, about, long_about = None)]
pub struct ConsumerArgs {
    /// Number of consuming workers
    #[arg(short, long, env = "FC_CONSUMER_PARALLEL", default_value_t = default_worker_count())]
    pub parallel: usize,

    /// Queue service address (host:port)
    #[arg(long, env = "FC_CONSUMER_QUEUE_ADDR", default_value = DEFAULT_QUEUE_ADDR)]
    pub queue_addr: String,

    /// Queue service user
    #[arg(long, env = "FC_CONSUMER_QUEUE_USER", default_value = DEFAULT_QUEUE_USER)]
    pub queue_user: String,

    /// Queue service password
    #[arg(
        long,
        env = "FC_CONSUMER_QUEUE_PASS",
        default_value = DEFAULT_QUEUE_PASS,
        hide_env_values = true,
        hide_default_value = true
    )]
    pub queue_pass: String,

    /// Queue to consume from
    #[arg(long, env = "FC_CONSUMER_QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME)]
    pub queue_name: String,

    /// Unacknowledged deliveries allowed in flight (0 = one per worker)
    #[arg(long, env = "FC_CONSUMER_PREFETCH", default_value_t = 0)]
    pub prefetch: u16,

    /// Database host
    #[arg(long, env = "FC_CONSUMER_DB_HOST", default_value = DEFAULT_DB_HOST)]
    pub db_host: String,

    /// Database port
    #[arg(long, env = "FC_CONSUMER_DB_PORT", default_value_t = DEFAULT_DB_PORT)]
    pub db_port: u16,

    /// Database user
    #[arg(long, env = "FC_CONSUMER_DB_USER", default_value = DEFAULT_DB_USER)]
    pub db_user: String,

    /// Database password
    #[arg(
        long,
        env = "FC_CONSUMER_DB_PASS",
        default_value = DEFAULT_DB_PASS,
        hide_env_values = true,
        hide_default_value = true
    )]
    pub db_pass: String,

    /// Database name
    #[arg(long, env = "FC_CONSUMER_DB_NAME", default_value = DEFAULT_DB_NAME)]
    pub db_name: String,

    /// Connection pool size (defaults to the worker count)
    #[arg(long, env = "FC_CONSUMER_DB_MAX_CONNECTIONS")]
    pub db_max_connections: Option<u32>,

    /// Requeue messages whose insert failed instead of discarding them
    #[arg(long, env = "FC_CONSUMER_REQUEUE_FAILED")]
    pub requeue_failed: bool,

    /// Do not apply database migrations at startup
    #[arg(long, env = "FC_CONSUMER_SKIP_MIGRATIONS")]
    pub skip_migrations: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl ConsumerArgs {
    pub fn queue_config(&self) -> QueueConfig {
        let prefetch = match self.prefetch {
            0 => u16::try_from(self.parallel).unwrap_or(u16::MAX),
            n => n,
        };
        QueueConfig {
            addr: self.queue_addr.clone(),
            user: self.queue_user.clone(),
            pass: self.queue_pass.clone(),
            queue_name: self.queue_name.clone(),
            prefetch,
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            pass: self.db_pass.clone(),
            name: self.db_name.clone(),
            max_connections: self
                .db_max_connections
                .unwrap_or_else(|| u32::try_from(self.parallel).unwrap_or(u32::MAX)),
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        if self.requeue_failed {
            FailurePolicy::Requeue
        } else {
            FailurePolicy::Discard
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parallel == 0 {
            anyhow::bail!("--parallel must be at least 1");
        }
        self.queue_config().validate().map_err(anyhow::Error::msg)?;
        self.database_config().validate().map_err(anyhow::Error::msg)
    }
}

impl fmt::Debug for ConsumerArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerArgs")
            .field("parallel", &self.parallel)
            .field("queue", &self.queue_config())
            .field("database", &self.database_config())
            .field("requeue_failed", &self.requeue_failed)
            .field("skip_migrations", &self.skip_migrations)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Postgres connection settings.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub name: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            user: DEFAULT_DB_USER.to_string(),
            pass: DEFAULT_DB_PASS.to_string(),
            name: DEFAULT_DB_NAME.to_string(),
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    /// Connection options with TLS disabled.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.pass)
            .database(&self.name)
            .ssl_mode(PgSslMode::Disable)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Database host cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("Database port cannot be 0".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("Database name cannot be empty".to_string());
        }
        if self.max_connections == 0 {
            return Err("Database pool needs at least one connection".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &"[REDACTED]")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> ConsumerArgs {
        let mut argv = vec!["csv2db-consumer"];
        argv.extend_from_slice(args);
        ConsumerArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        ConsumerArgs::command().debug_assert();
    }

    #[test]
    fn test_prefetch_defaults_to_worker_count() {
        let args = parse(&["--parallel", "6"]);
        assert_eq!(args.queue_config().prefetch, 6);

        let args = parse(&["--parallel", "6", "--prefetch", "50"]);
        assert_eq!(args.queue_config().prefetch, 50);
    }

    #[test]
    fn test_pool_size_defaults_to_worker_count() {
        let args = parse(&["-p", "3"]);
        assert_eq!(args.database_config().max_connections, 3);

        let args = parse(&["-p", "3", "--db-max-connections", "8"]);
        assert_eq!(args.database_config().max_connections, 8);
    }

    #[test]
    fn test_failure_policy_flag() {
        assert_eq!(parse(&[]).failure_policy(), FailurePolicy::Discard);
        assert_eq!(
            parse(&["--requeue-failed"]).failure_policy(),
            FailurePolicy::Requeue
        );
    }

    #[test]
    fn test_zero_parallel_is_rejected() {
        assert!(parse(&["-p", "0"]).validate().is_err());
        assert!(parse(&["-p", "2"]).validate().is_ok());
    }

    #[test]
    fn test_database_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.name, "userdata");
        assert!(config.validate().is_ok());

        let options = config.connect_options();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_database(), Some("userdata"));
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let args = parse(&["--db-pass", "s3cret", "--queue-pass", "hunter2"]);
        let debug = format!("{:?}", args);
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("hunter2"));
    }
}
