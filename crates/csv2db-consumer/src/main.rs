//! csv2db consumer - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use csv2db_common::logging::{init_logging, LogConfig, LogLevel};
use csv2db_common::{config, shutdown};
use csv2db_consumer::{ConsumerArgs, ConsumerPipeline, PgSink};
use csv2db_queue::{AmqpClient, QueueClient};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    config::load_dotenv();
    let args = ConsumerArgs::parse();

    let level = if args.verbose { LogLevel::Debug } else { LogLevel::Info };
    let log_config = LogConfig::builder()
        .level(level)
        .log_file_prefix("csv2db-consumer")
        .filter_directives("lapin=warn,sqlx=warn")
        .build();

    let _guard = match log_config.merge_env().and_then(|c| init_logging(&c)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    };

    if let Err(e) = run(args).await {
        error!(error = %format!("{:#}", e), "Consumer failed");
        process::exit(1);
    }
}

async fn run(args: ConsumerArgs) -> Result<()> {
    args.validate()?;
    info!(?args, "Starting consumer");

    let queue_config = args.queue_config();
    let client = AmqpClient::connect(&queue_config)
        .await
        .context("Failed to connect to queue service")?;
    client
        .declare(&queue_config.queue_name)
        .await
        .context("Failed to declare queue")?;

    let sink = PgSink::connect(&args.database_config()).await?;
    if args.skip_migrations {
        info!("Skipping database migrations");
    } else {
        sink.migrate().await?;
    }
    let sink = Arc::new(sink);

    let deliveries = client
        .consume(&queue_config.queue_name)
        .await
        .context("Failed to start consuming")?;

    let cancel = CancellationToken::new();
    let signals = shutdown::cancel_on_signal(cancel.clone());

    let pipeline = ConsumerPipeline::new(Arc::clone(&sink), args.parallel)
        .with_failure_policy(args.failure_policy());
    let result = pipeline.run(deliveries, cancel.clone()).await;

    // Release the signal listener
    cancel.cancel();
    let _ = signals.await;

    // Unacknowledged deliveries go back to the queue when the channel closes.
    if let Err(e) = client.close().await {
        warn!(error = %e, "Failed to close queue connection");
    }
    sink.close().await;

    let summary = result?;
    info!(
        received = summary.received,
        acknowledged = summary.acknowledged,
        rejected = summary.rejected,
        "Consumer done"
    );
    Ok(())
}
