//! # askdb CLI
//!
//! Ask plain-English questions of a SQLite database and a corpus of
//! ingested documents.
//!
//! ## Usage
//!
//! ```bash
//! askdb --config ./config/askdb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdb schema` | Show the discovered schema and document count |
//! | `askdb query "<text>"` | Answer a question, one page at a time |
//! | `askdb ingest <files…>` | Extract and index PDF, DOCX, TXT and CSV files |
//! | `askdb export "<text>" --format csv` | Write the full structured result |
//! | `askdb serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! askdb --database sqlite:data/company.db query "average salary by department"
//! askdb query "top 5 highest paid employees" --page-size 5
//! askdb ingest resumes/*.pdf
//! askdb query "resumes mentioning kubernetes"
//! askdb export "list employees hired after 2020" --format csv --output hires.csv
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use askdb::config;
use askdb::logging::init_logging;
use askdb::server;
use askdb::service::AskDb;
use askdb_core::export::ExportFormat;

/// askdb — natural-language questions over a relational database and a
/// document corpus.
#[derive(Parser)]
#[command(
    name = "askdb",
    about = "askdb — natural-language questions over a SQLite database and ingested documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askdb.toml")]
    config: PathBuf,

    /// Data source to connect to, overriding `[database].url`
    /// (e.g. `sqlite:data/company.db`).
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the discovered schema: tables, columns with their inferred
    /// roles, and relationships.
    Schema,

    /// Answer a natural-language question.
    Query {
        /// The question, e.g. "how many employees in Engineering".
        text: String,

        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Rows per page. Defaults to `[query].default_page_size`.
        #[arg(long)]
        page_size: Option<usize>,

        /// Bypass the result cache.
        #[arg(long)]
        no_cache: bool,
    },

    /// Ingest documents and wait for the job to finish.
    Ingest {
        /// Files to ingest (.pdf, .docx, .txt, .csv).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Export the full structured result of a question.
    Export {
        /// The question to answer.
        text: String,

        /// `csv` or `json`.
        #[arg(long, default_value = "csv")]
        format: String,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(url) = cli.database {
        cfg.database.url = Some(url);
    }
    init_logging(&cfg.logging.level);

    let service = AskDb::open(cfg).await?;

    match cli.command {
        Commands::Schema => {
            let view = service.schema();
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Query {
            text,
            page,
            page_size,
            no_cache,
        } => {
            let result = service.query(&text, Some(page), page_size, !no_cache).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Ingest { files } => {
            let job_id = service.ingest(files)?;
            let job = service.wait_for_ingestion(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Export {
            text,
            format,
            output,
        } => {
            let format = ExportFormat::parse(&format)?;
            let bytes = service.export(&text, format).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Wrote {} bytes to {}", bytes.len(), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
        }
        Commands::Serve => {
            server::run_server(service).await?;
        }
    }

    Ok(())
}
