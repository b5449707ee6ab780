//! csv2db producer - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use csv2db_common::logging::{init_logging, LogConfig, LogLevel};
use csv2db_common::{config, shutdown, PipelineError};
use csv2db_producer::{source, ProduceSummary, ProducerArgs, ProducerPipeline};
use csv2db_queue::{AmqpClient, QueueClient};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    config::load_dotenv();
    let args = ProducerArgs::parse();

    let level = if args.verbose { LogLevel::Debug } else { LogLevel::Info };
    let log_config = LogConfig::builder()
        .level(level)
        .log_file_prefix("csv2db-producer")
        .filter_directives("lapin=warn")
        .build();

    let _guard = match log_config.merge_env().and_then(|c| init_logging(&c)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    };

    if let Err(e) = run(args).await {
        error!(error = %format!("{:#}", e), "Producer failed");
        process::exit(1);
    }
}

async fn run(args: ProducerArgs) -> Result<()> {
    args.validate()?;
    info!(?args, "Starting producer");

    let source = source::open_csv(&args.file, args.skip_header).await?;

    let queue_config = args.queue_config();
    let client = Arc::new(
        AmqpClient::connect(&queue_config)
            .await
            .context("Failed to connect to queue service")?,
    );
    client
        .declare(&queue_config.queue_name)
        .await
        .context("Failed to declare queue")?;

    let cancel = CancellationToken::new();
    let signals = shutdown::cancel_on_signal(cancel.clone());

    let pipeline = ProducerPipeline::new(Arc::clone(&client), &queue_config.queue_name, args.parallel);
    let result = pipeline.run(source, cancel.clone()).await;

    // Release the signal listener
    cancel.cancel();
    let _ = signals.await;

    if let Err(e) = client.close().await {
        warn!(error = %e, "Failed to close queue connection");
    }

    match result {
        Ok(summary) => {
            log_totals(&summary, "Producer done");
            Ok(())
        }
        Err(e) => {
            if let PipelineError::Source { summary, .. } = &e {
                log_totals(summary, "Producer stopped on a read error");
            }
            Err(e.into())
        }
    }
}

fn log_totals(summary: &ProduceSummary, msg: &str) {
    info!(
        dispatched = summary.dispatched,
        published = summary.published,
        rejected = summary.rejected,
        publish_failed = summary.publish_failed,
        cancelled = summary.cancelled,
        "{}",
        msg
    );
}
