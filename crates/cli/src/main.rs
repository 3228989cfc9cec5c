//! Bookgen CLI - Command-line interface for the Bookgen Engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9737";

#[derive(Parser)]
#[command(name = "bookgen")]
#[command(about = "Bookgen Engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "BOOKGEN_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a book for generation
    Submit {
        /// Book type (e.g., ssw, jlpt-n5, jlpt-n3)
        #[arg(short, long)]
        book_type: String,

        /// Template ID (defaults to the book type's template)
        #[arg(short, long)]
        template: Option<String>,

        /// Book title
        #[arg(long)]
        title: Option<String>,

        /// Industry sector (SSW books)
        #[arg(long)]
        sector: Option<String>,

        /// Target page count (scales per-chapter word counts)
        #[arg(long)]
        pages: Option<u32>,

        /// Generate only the first N chapters
        #[arg(long)]
        chapters: Option<u32>,

        /// Chapters generated in parallel per batch
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Retries per chapter after the first attempt
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Show a job's status
    Status {
        /// Job ID
        job_id: String,
    },

    /// Cancel a job
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// List a job's chapters
    Chapters {
        /// Job ID
        job_id: String,
    },

    /// Show a job's progress
    Progress {
        /// Job ID
        job_id: String,

        /// Keep polling until the job finishes
        #[arg(short, long)]
        watch: bool,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// List available templates
    Templates,

    /// List recent jobs
    List {
        /// Filter by status (pending, generating, completed, failed, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of jobs
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    job_id: String,
    status: String,
    chapters_total: u32,
}

#[derive(Deserialize, Tabled)]
struct ChapterRow {
    #[tabled(rename = "#")]
    chapter_number: u32,
    title: String,
    #[tabled(rename = "part")]
    part_title: String,
    status: String,
    #[tabled(rename = "retries")]
    retry_count: u32,
    #[tabled(rename = "words")]
    word_count: u32,
    #[tabled(rename = "tokens")]
    tokens_used: u64,
}

#[derive(Deserialize, Tabled)]
struct JobRow {
    job_id: String,
    title: String,
    status: String,
    progress: u8,
    #[tabled(rename = "done")]
    chapters_completed: u32,
    #[tabled(rename = "failed")]
    chapters_failed: u32,
    #[tabled(rename = "total")]
    chapters_total: u32,
}

#[derive(Deserialize, Tabled)]
struct TemplateRow {
    id: String,
    book_type: String,
    name: String,
    chapters: u32,
    pages: u32,
}

#[derive(Deserialize)]
struct ProgressView {
    status: String,
    progress: u8,
    stage: String,
    chapters_completed: u32,
    chapters_total: u32,
    chapters_failed: u32,
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// Params for book.submit.v1; unset options are omitted so the daemon defaults apply
#[allow(clippy::too_many_arguments)]
fn submit_params(
    book_type: String,
    template: Option<String>,
    title: Option<String>,
    sector: Option<String>,
    pages: Option<u32>,
    chapters: Option<u32>,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
) -> Value {
    let mut params = json!({ "book_type": book_type });
    let optional = [
        ("template_id", template.map(Value::from)),
        ("title", title.map(Value::from)),
        ("sector", sector.map(Value::from)),
        ("target_pages", pages.map(Value::from)),
        ("target_chapters", chapters.map(Value::from)),
        ("concurrency", concurrency.map(Value::from)),
        ("max_retries", max_retries.map(Value::from)),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            params[key] = value;
        }
    }
    params
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "completed" | "failed" | "cancelled")
}

fn colored_status(status: &str) -> colored::ColoredString {
    match status {
        "completed" => status.green(),
        "failed" => status.red(),
        "cancelled" => status.yellow(),
        _ => status.cyan(),
    }
}

/// Fixed-width text bar, e.g. `[#####.....]` for 50%
fn progress_bar(progress: u8, width: usize) -> String {
    let filled = (progress.min(100) as usize * width) / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

fn print_progress(view: &ProgressView) {
    println!(
        "  {} {:>3}% {} {}/{} chapters{}  {}",
        progress_bar(view.progress, 30),
        view.progress,
        colored_status(&view.status),
        view.chapters_completed,
        view.chapters_total,
        if view.chapters_failed > 0 {
            format!(" ({} failed)", view.chapters_failed)
        } else {
            String::new()
        },
        view.stage.dimmed()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            book_type,
            template,
            title,
            sector,
            pages,
            chapters,
            concurrency,
            max_retries,
        } => {
            let params = submit_params(
                book_type,
                template,
                title,
                sector,
                pages,
                chapters,
                concurrency,
                max_retries,
            );

            let result = call_rpc(&cli.rpc_url, "book.submit.v1", params).await?;
            let submit_result: SubmitResult = serde_json::from_value(result)?;

            println!("{}", "✓ Book submitted".green().bold());
            println!();

            let table = Table::new(vec![submit_result]).to_string();
            println!("{}", table);
        }

        Commands::Status { job_id } => {
            let job = call_rpc(&cli.rpc_url, "book.status.v1", json!({ "job_id": job_id })).await?;
            let status = job["status"].as_str().unwrap_or("unknown");

            println!("{}", format!("Job {}", job_id).cyan().bold());
            println!();
            println!("  {} {}", "Title:".bold(), job["title"].as_str().unwrap_or(""));
            println!("  {} {}", "Type:".bold(), job["book_type"].as_str().unwrap_or(""));
            println!("  {} {}", "Status:".bold(), colored_status(status));
            println!("  {} {}%", "Progress:".bold(), job["progress"]);
            println!(
                "  {} {}/{} ({} failed)",
                "Chapters:".bold(),
                job["chapters_completed"],
                job["chapters_total"],
                job["chapters_failed"]
            );
            println!("  {} {}", "Words:".bold(), job["total_words"]);
            println!("  {} {}", "Tokens:".bold(), job["total_tokens"]);
            println!(
                "  {} ${:.4}",
                "Cost:".bold(),
                job["total_cost"].as_f64().unwrap_or(0.0)
            );
            if let Some(message) = job["error_message"].as_str() {
                println!("  {} {}", "Note:".bold(), message.yellow());
            }
            if let Some(files) = job["output_files"].as_array() {
                for file in files.iter().filter_map(|f| f.as_str()) {
                    println!("  {} {}", "Output:".bold(), file);
                }
            }
        }

        Commands::Cancel { job_id } => {
            let result =
                call_rpc(&cli.rpc_url, "book.cancel.v1", json!({ "job_id": job_id })).await?;

            if result["cancelled"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
            } else {
                println!(
                    "{}",
                    format!("Job {} already finished; nothing to cancel", job_id).yellow()
                );
            }
        }

        Commands::Chapters { job_id } => {
            let result =
                call_rpc(&cli.rpc_url, "book.chapters.v1", json!({ "job_id": job_id })).await?;
            let chapters: Vec<ChapterRow> = serde_json::from_value(result["chapters"].clone())?;

            if chapters.is_empty() {
                println!("{}", "No chapters".yellow());
            } else {
                println!("{}", Table::new(chapters));
            }
        }

        Commands::Progress {
            job_id,
            watch,
            interval_ms,
        } => {
            println!("{}", format!("Progress for job {}:", job_id).cyan().bold());
            loop {
                let result =
                    call_rpc(&cli.rpc_url, "progress.read.v1", json!({ "job_id": job_id }))
                        .await?;
                let view: ProgressView = serde_json::from_value(result)?;
                print_progress(&view);

                if !watch || is_terminal(&view.status) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }
        }

        Commands::Templates => {
            let result = call_rpc(&cli.rpc_url, "template.list.v1", json!({})).await?;
            let templates: Vec<TemplateRow> =
                serde_json::from_value(result["templates"].clone())?;
            println!("{}", Table::new(templates));
        }

        Commands::List { status, limit } => {
            let mut params = json!({ "limit": limit });
            if let Some(status) = status {
                params["status"] = Value::from(status);
            }

            let result = call_rpc(&cli.rpc_url, "book.list.v1", params).await?;
            let jobs: Vec<JobRow> = serde_json::from_value(result["jobs"].clone())?;

            if jobs.is_empty() {
                println!("{}", "No jobs".yellow());
            } else {
                println!("{}", Table::new(jobs));
            }
        }
    }

    Ok(())
}
