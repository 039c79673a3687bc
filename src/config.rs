//! Runtime configuration: command-line flags with environment fallbacks.
//!
//! `main` loads a `.env` file (if any) before parsing, so every setting can
//! live there as well.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::service::{EngineSettings, RendererKind};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://page-auditor.db?mode=rwc";

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// SQLite database holding records and the job queue
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    pub database_url: String,

    /// Number of concurrent workers [default: number of CPUs]
    #[arg(long, env = "AUDITOR_WORKERS", global = true)]
    pub workers: Option<usize>,

    /// Page renderer: `chrome` (headless browser) or `http` (plain fetch)
    #[arg(long, env = "AUDITOR_RENDERER", default_value = "chrome", global = true)]
    pub renderer: RendererKind,

    /// Chrome/Chromium binary; auto-detected when unset
    #[arg(long, env = "CHROME_EXECUTABLE", global = true)]
    pub chrome_executable: Option<PathBuf>,

    #[arg(long, env = "AUDITOR_RENDER_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub render_timeout_secs: u64,

    #[arg(long, env = "AUDITOR_PROBE_TIMEOUT_SECS", default_value_t = 5, global = true)]
    pub probe_timeout_secs: u64,

    /// Links probed at once; 1 probes sequentially
    #[arg(long, env = "AUDITOR_PROBE_CONCURRENCY", default_value_t = 1, global = true)]
    pub probe_concurrency: usize,

    /// How often idle workers look for jobs enqueued by other processes
    #[arg(long, env = "AUDITOR_POLL_INTERVAL_MS", default_value_t = 2000, global = true)]
    pub poll_interval_ms: u64,
}

impl Config {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            renderer: self.renderer,
            chrome_executable: self.chrome_executable.clone(),
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            probe_concurrency: self.probe_concurrency.max(1),
        }
    }
}
