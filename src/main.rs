use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use page_auditor::config::Config;
use page_auditor::lifecycle::{self, App};
use page_auditor::repository::{ListQuery, SortField, SortOrder, DEFAULT_PAGE_SIZE};
use page_auditor::service::{validate_url, AnalysisEngine, Analyzer};

#[derive(Debug, Parser)]
#[command(name = "page-auditor", version, about = "Queue-driven single page auditor")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the worker pool until Ctrl-C
    Serve,
    /// Queue one or more URLs for analysis
    Submit {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Queue existing records again
    Rerun {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List records
    List {
        /// Zero-based page index
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
        /// lastAnalyzed, createdAt, url, pageTitle, htmlVersion, status, internalLinks, externalLinks
        #[arg(long, default_value = "lastAnalyzed")]
        sort_by: SortField,
        #[arg(long, default_value = "desc")]
        order: SortOrder,
        /// Substring of title, url, html version or status
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show one record
    Show { id: String },
    /// Delete records
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Analyze a URL once, without touching the database
    Audit { url: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One-shot audit, printed as JSON. Never touches the database.
async fn audit(config: &Config, url: &str) -> Result<()> {
    let url = validate_url(url)?;
    let engine = AnalysisEngine::from_settings(&config.engine_settings())?;
    let audit = engine.analyze(url.as_str()).await?;
    print_json(&audit)
}

async fn run(config: &Config, command: Command) -> Result<()> {
    let app = App::open(config).await?;

    let mut workers = None;
    match command {
        Command::Serve => {
            workers = Some(app.start_workers(config).await?);
            let _logger = app.spawn_event_logger();
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
        }
        Command::Submit { urls } => {
            let mut records = Vec::with_capacity(urls.len());
            for url in &urls {
                records.push(app.service.submit(url).await?);
            }
            print_json(&records)?;
        }
        Command::Rerun { ids } => {
            let queued = app.service.rerun(&ids).await?;
            println!("{} of {} record(s) queued", queued, ids.len());
        }
        Command::List {
            page,
            page_size,
            sort_by,
            order,
            filter,
        } => {
            let query = ListQuery {
                page,
                page_size,
                sort_by,
                order,
                filter,
            };
            print_json(&app.service.list(&query).await?)?;
        }
        Command::Show { id } => print_json(&app.service.get(&id).await?)?,
        Command::Delete { ids } => {
            let removed = app.service.delete(&ids).await?;
            println!("{} record(s) deleted", removed);
        }
        Command::Audit { url } => audit(config, &url).await?,
    }

    app.shutdown(workers).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    lifecycle::init_logging();

    match cli.command {
        Command::Audit { url } => audit(&cli.config, &url).await,
        command => run(&cli.config, command).await,
    }
}
