use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;

use batchline::Pipeline;
use batchline_common::{ConfigProvider, EnvConfig, Error, LayeredConfig, ObjectKey, Record, Result, RowSet};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Environment prefix used when a config file is layered under the environment.
const ENV_PREFIX: &str = "BATCHLINE";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML settings file; `BATCHLINE_<KEY>` environment variables override it.
    /// Without it, settings are read from plain `<KEY>` variables.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the prefix of the latest batch
    Latest,
    /// List the objects of the latest batch
    List,
    /// Append every object of the latest batch to the target table
    Ingest,
    /// Run a query against the warehouse and print rows as JSON lines
    Query { sql: String },
    /// Upload a local file to the bucket
    Upload { path: PathBuf, key: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let span = info_span!("run", run_id = %Uuid::new_v4());
    match run(args).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            if e.is_recoverable() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "batchline=debug" } else { "batchline=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let provider: Box<dyn ConfigProvider> = match &args.config {
        Some(path) => Box::new(LayeredConfig::load(Some(path.as_path()), ENV_PREFIX)?),
        None => Box::new(EnvConfig::new()),
    };
    let pipeline = Pipeline::from_config(provider.as_ref())?;

    match args.command {
        Command::Latest => {
            let batch = pipeline.latest_batch().await?;
            match batch.timestamp() {
                Some(ts) => println!("{}\t{}", batch.prefix(), ts),
                None => println!("{}", batch.prefix()),
            }
        }
        Command::List => {
            let listing = pipeline.list_batch_objects().await?;
            for key in &listing.objects {
                println!("{key}");
            }
        }
        Command::Ingest => {
            let report = pipeline.ingest_latest().await?;
            let summary = json!({
                "batch": report.batch.as_str(),
                "objects_read": report.objects_read,
                "rows_appended": report.rows_appended,
                "skipped_lines": report
                    .skipped
                    .iter()
                    .map(|(key, line)| json!({"key": key.as_str(), "line": line.line, "reason": line.reason}))
                    .collect::<Vec<_>>(),
            });
            println!("{summary}");
        }
        Command::Query { sql } => {
            let rows = pipeline.query(&sql).await?;
            print_json_lines(&rows);
        }
        Command::Upload { path, key } => {
            let key = ObjectKey::from(key);
            let bytes = pipeline.upload(&path, &key).await?;
            println!("uploaded {bytes} bytes to {}/{key}", pipeline.config().bucket);
        }
    }
    Ok(())
}

/// One JSON object per row, every column present.
fn print_json_lines(rows: &RowSet) {
    for values in rows.rows() {
        let record: Record = rows
            .columns()
            .iter()
            .cloned()
            .zip(values.into_iter().cloned())
            .collect();
        println!("{}", serde_json::Value::Object(record));
    }
}

fn report(err: &Error) {
    eprintln!("{} failed: {err}", err.stage());
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}
