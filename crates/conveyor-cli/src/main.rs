//! Operator CLI: submit, inspect, and replay jobs over the HTTP API.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "conveyor", about = "Conveyor job queue CLI", version)]
struct Cli {
    /// Base API URL.
    #[arg(long, global = true, env = "CONVEYOR_API", default_value = "http://localhost:8080")]
    api: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a job.
    Submit(SubmitArgs),
    /// Get job status.
    Status {
        /// Job ID.
        id: String,
    },
    /// List jobs.
    List {
        /// Filter by state (PENDING, IN_PROGRESS, ...).
        #[arg(long)]
        state: Option<String>,
        /// Free-text search over id and idempotency key.
        #[arg(long)]
        q: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Cancel a job (moves it to the DLQ with a reason).
    Cancel {
        /// Job ID.
        id: String,
        /// Cancel reason.
        #[arg(long, default_value = "canceled")]
        reason: String,
    },
    /// Dead-letter queue operations.
    #[command(subcommand)]
    Dlq(DlqCommand),
}

#[derive(Args)]
struct SubmitArgs {
    /// Job type.
    #[arg(long)]
    job_type: String,
    /// Idempotency key.
    #[arg(long)]
    idempotency_key: String,
    /// Inline JSON payload.
    #[arg(long, conflicts_with = "payload_file")]
    payload: Option<String>,
    /// Path to a JSON payload file.
    #[arg(long)]
    payload_file: Option<String>,
    /// Max attempts (optional).
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Initial retry delay in milliseconds (optional).
    #[arg(long)]
    initial_delay_ms: Option<u64>,
    /// Backoff multiplier (optional).
    #[arg(long)]
    backoff_multiplier: Option<f64>,
    /// Max retry delay in milliseconds (optional).
    #[arg(long)]
    max_delay_ms: Option<u64>,
    /// Jitter fraction in [0, 1] (optional).
    #[arg(long)]
    jitter: Option<f64>,
}

#[derive(Subcommand)]
enum DlqCommand {
    /// List DLQ entries.
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Inspect one DLQ entry with its job.
    Inspect {
        /// Job ID.
        id: String,
    },
    /// Replay a DLQ job.
    Replay {
        /// Job ID.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    match cli.command {
        Command::Submit(args) => {
            let payload = read_payload(&args)?;
            let mut body = json!({
                "jobType": args.job_type,
                "idempotencyKey": args.idempotency_key,
                "payload": payload,
            });
            if let Some(v) = args.max_attempts {
                body["maxAttempts"] = json!(v);
            }
            if let Some(v) = args.initial_delay_ms {
                body["initialDelayMs"] = json!(v);
            }
            if let Some(v) = args.backoff_multiplier {
                body["backoffMultiplier"] = json!(v);
            }
            if let Some(v) = args.max_delay_ms {
                body["maxDelayMs"] = json!(v);
            }
            if let Some(v) = args.jitter {
                body["jitter"] = json!(v);
            }
            let out = post(&client, &format!("{}/jobs", cli.api), Some(body)).await?;
            print_json(&out);
        }
        Command::Status { id } => {
            let out = get(&client, &format!("{}/jobs/{}", cli.api, id)).await?;
            print_json(&out);
        }
        Command::List {
            state,
            q,
            limit,
            offset,
        } => {
            let mut url = format!("{}/jobs?limit={}&offset={}", cli.api, limit, offset);
            if let Some(state) = state {
                url.push_str(&format!("&state={}", state));
            }
            if let Some(q) = q {
                url.push_str(&format!("&q={}", q));
            }
            let out = get(&client, &url).await?;
            print_json(&out);
        }
        Command::Cancel { id, reason } => {
            post(
                &client,
                &format!("{}/jobs/{}/cancel", cli.api, id),
                Some(json!({ "reason": reason })),
            )
            .await?;
            println!("ok");
        }
        Command::Dlq(cmd) => match cmd {
            DlqCommand::List { limit, offset } => {
                let url = format!("{}/dlq?limit={}&offset={}", cli.api, limit, offset);
                let out = get(&client, &url).await?;
                print_json(&out);
            }
            DlqCommand::Inspect { id } => {
                let out = get(&client, &format!("{}/dlq/{}", cli.api, id)).await?;
                print_json(&out);
            }
            DlqCommand::Replay { id } => {
                post(&client, &format!("{}/dlq/{}/replay", cli.api, id), None).await?;
                println!("ok");
            }
        },
    }

    Ok(())
}

fn read_payload(args: &SubmitArgs) -> Result<Value> {
    let raw = match (&args.payload, &args.payload_file) {
        (Some(inline), None) => inline.clone(),
        (None, Some(path)) => {
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?
        }
        (None, None) => bail!("payload or payload-file is required"),
        (Some(_), Some(_)) => unreachable!("clap enforces the conflict"),
    };
    serde_json::from_str(raw.trim()).context("payload must be valid JSON")
}

async fn get(client: &reqwest::Client, url: &str) -> Result<Value> {
    let resp = client.get(url).send().await?;
    check(resp).await
}

async fn post(client: &reqwest::Client, url: &str, body: Option<Value>) -> Result<Value> {
    let mut req = client.post(url);
    if let Some(body) = body {
        req = req.json(&body);
    }
    check(req.send().await?).await
}

async fn check(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("status {}: {}", status.as_u16(), text.trim());
    }
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!("{}", value),
    }
}
