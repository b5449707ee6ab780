//! Build automation tasks for csv2db
//!
//! - Generating CLI documentation from the argument definitions

use clap::Parser;
use csv2db_consumer::ConsumerArgs;
use csv2db_producer::ProducerArgs;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for csv2db", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let producer = clap_markdown::help_markdown::<ProducerArgs>();
    let consumer = clap_markdown::help_markdown::<ConsumerArgs>();

    let content = format!(
        r#"# csv2db CLI Reference

Generated from the argument definitions on {}.

csv2db moves `name,email` rows from a CSV file into the Postgres `contacts`
table through a durable RabbitMQ queue. `csv2db-producer` validates rows and
publishes them; `csv2db-consumer` stores them and acknowledges each message
only after its insert succeeds.

## Quick Start

```bash
# Publish a file with 8 workers
csv2db-producer --file contacts.csv --parallel 8 --skip-header

# Store everything currently queued
csv2db-consumer --parallel 8
```

Both binaries stop gracefully on SIGINT or SIGTERM: work already started is
finished, nothing new is picked up.

## Producer

{}

## Consumer

{}

## Logging

- `LOG_LEVEL` - `trace`, `debug`, `info`, `warn`, `error`
- `LOG_OUTPUT` - `console`, `file`, `both`
- `LOG_FORMAT` - `text`, `json`
- `LOG_DIR` - directory for daily-rotated log files
- `LOG_FILTER` - extra filter directives, e.g. `lapin=debug`
- `RUST_LOG` - standard `tracing` filter

Variables can also be placed in a `.env` file in the working directory.

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        producer,
        consumer
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());
    Ok(())
}
