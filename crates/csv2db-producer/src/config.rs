//! Producer command line
//!
//! Every option can also be set through an `FC_PRODUCER_*` environment
//! variable (or a `.env` file).

use clap::Parser;
use csv2db_common::config::default_worker_count;
use csv2db_queue::config::{DEFAULT_QUEUE_ADDR, DEFAULT_QUEUE_PASS, DEFAULT_QUEUE_USER};
use csv2db_queue::{QueueConfig, DEFAULT_QUEUE_NAME};
use std::fmt;
use std::path::PathBuf;

/// Publish validated CSV rows to the csv2db queue
#[derive(Parser, Clone)]
#[command(name = "csv2db-producer")]
#[command(author, version, about, long_about = None)]
pub struct ProducerArgs {
    /// CSV file with `name,email` rows
    #[arg(short, long, env = "FC_PRODUCER_FILE")]
    pub file: PathBuf,

    /// Number of publishing workers
    #[arg(short, long, env = "FC_PRODUCER_PARALLEL", default_value_t = default_worker_count())]
    pub parallel: usize,

    /// Queue service address (host:port)
    #[arg(long, env = "FC_PRODUCER_QUEUE_ADDR", default_value = DEFAULT_QUEUE_ADDR)]
    pub queue_addr: String,

    /// Queue service user
    #[arg(long, env = "FC_PRODUCER_QUEUE_USER", default_value = DEFAULT_QUEUE_USER)]
    pub queue_user: String,

    /// Queue service password
    #[arg(
        long,
        env = "FC_PRODUCER_QUEUE_PASS",
        default_value = DEFAULT_QUEUE_PASS,
        hide_env_values = true,
        hide_default_value = true
    )]
    pub queue_pass: String,

    /// Queue to publish to
    #[arg(long, env = "FC_PRODUCER_QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME)]
    pub queue_name: String,

    /// Treat the first row as a header and skip it
    #[arg(long, env = "FC_PRODUCER_SKIP_HEADER")]
    pub skip_header: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl ProducerArgs {
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            addr: self.queue_addr.clone(),
            user: self.queue_user.clone(),
            pass: self.queue_pass.clone(),
            queue_name: self.queue_name.clone(),
            // publishing only; no deliveries to limit
            prefetch: 0,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parallel == 0 {
            anyhow::bail!("--parallel must be at least 1");
        }
        self.queue_config().validate().map_err(anyhow::Error::msg)
    }
}

impl fmt::Debug for ProducerArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerArgs")
            .field("file", &self.file)
            .field("parallel", &self.parallel)
            .field("queue_addr", &self.queue_addr)
            .field("queue_user", &self.queue_user)
            .field("queue_pass", &"[REDACTED]")
            .field("queue_name", &self.queue_name)
            .field("skip_header", &self.skip_header)
            .field("verbose", &self.verbose)
            .finish()
    }
}
