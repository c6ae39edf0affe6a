//! sqs-reader: stream decoded queue records to stdout
//!
//! Polls the configured queue, writes every decoded record as one line of
//! JSON on stdout. A message is deleted once its records are queued in the
//! output buffer, before they reach stdout, so records still buffered at
//! shutdown are lost and their messages are not redelivered. Logs go to
//! stderr, filtered by `RUST_LOG` (default `info`). SIGINT or SIGTERM stops
//! the reader without waiting for in-flight work.

use clap::Parser;
use sqs_reader::{BatchPolicy, Config, JsonLinesWriter, LinePolicy, Reader, run_with_shutdown};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "sqs-reader", version, about = "Drain an SQS queue of SNS envelopes as JSON lines")]
struct Args {
    /// Queue URL
    #[arg(long, env = "SQS_ENDPOINT")]
    endpoint: String,

    /// Access key id; leave empty with the secret to send unsigned requests
    #[arg(long, env = "AWS_ACCESS_KEY_ID", default_value = "", hide_env_values = true)]
    access_key: String,

    /// Secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", default_value = "", hide_env_values = true)]
    access_secret: String,

    /// Signing region, inferred from the endpoint host when omitted
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Long-poll wait per receive request, 0 to 20 seconds
    #[arg(long, default_value = "0")]
    wait_time_seconds: u32,

    /// Messages per receive request, 1 to 10
    #[arg(long, default_value = "10")]
    max_messages: u32,

    /// Bound on batches between poll start and end of handling
    #[arg(long)]
    max_batches_in_flight: Option<usize>,

    /// Skip malformed lines instead of abandoning the rest of their message
    #[arg(long, action)]
    skip_bad_lines: bool,

    /// Leave the whole batch on the queue when any message fails to decode
    #[arg(long, action)]
    abort_batch_on_error: bool,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config::new(self.endpoint, self.access_key, self.access_secret);
        config.queue.region = self.region;
        config.queue.wait_time_seconds = self.wait_time_seconds;
        config.queue.max_messages = self.max_messages;
        config.pipeline.max_batches_in_flight = self.max_batches_in_flight;
        if self.skip_bad_lines {
            config.pipeline.line_policy = LinePolicy::SkipLine;
        }
        if self.abort_batch_on_error {
            config.pipeline.batch_policy = BatchPolicy::AbortBatch;
        }
        config
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging();

    let config = args.into_config();
    tracing::info!(
        endpoint = %config.queue.endpoint,
        wait_time_seconds = config.queue.wait_time_seconds,
        max_messages = config.queue.max_messages,
        "sqs-reader starting"
    );

    let (reader, records) = Reader::new(config)?;
    let handle = reader.handle();

    tokio::spawn(async move {
        let writer = JsonLinesWriter::new(tokio::io::stdout());
        match writer.drain(records).await {
            Ok(written) => tracing::debug!(written, "record stream closed"),
            Err(e) => tracing::error!(error = %e, "failed writing records to stdout"),
        }
    });

    run_with_shutdown(reader).await?;

    let stats = handle.stats();
    tracing::info!(
        polls = stats.polls,
        messages = stats.messages_received,
        records = stats.records_emitted,
        deleted = stats.tokens_deleted,
        failures = stats.poll_failures + stats.record_failures + stats.delete_failures,
        "sqs-reader stopped"
    );
    Ok(())
}
