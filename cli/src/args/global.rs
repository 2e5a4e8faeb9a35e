use std::fs;
use std::fs::OpenOptions;
use std::io::IsTerminal;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Args;
use rusr::util::dirs;
use tracing::debug;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_glog::Glog;
use tracing_glog::GlogFields;
use tracing_glog::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

const HEADING: Option<&str> = Some("Global Options");

/// Global arguments that apply to every subcommand.
#[derive(Debug, Args, Clone)]
pub struct GlobalArgs {
    /// Filter directive for stderr logs
    #[clap(long, env = "RUST_LOG", default_value = "error", help_heading = HEADING, global = true)]
    pub log_level: String,

    /// Filter directive for the per-host log file
    #[clap(long, default_value = "rusr=debug,rusr_cli=debug", help_heading = HEADING, global = true)]
    pub file_level: String,

    /// Data directory. Logs go to `<data-dir>/logs/<host>.log`.
    #[clap(long, default_value_t = data_dir(), help_heading = HEADING, global = true)]
    pub data_dir: Utf8PathBuf,
}

impl GlobalArgs {
    /// Sets up glog-formatted logging to stderr and to the log file of `host`.
    ///
    /// Runs against the same host append to one file, so the history of every
    /// change made to it stays in one place. The returned guard flushes the
    /// file writer when dropped.
    pub fn init_tracing(&self, host: &str) -> Result<WorkerGuard> {
        let stderr_filter = EnvFilter::builder().parse_lossy(&self.log_level);
        let stderr_layer = tracing_subscriber::fmt::layer()
            .event_format(Glog::default().with_timer(LocalTime::default()))
            .fmt_fields(GlogFields::default())
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .with_filter(stderr_filter);

        let log_dir = self.data_dir.join("logs");
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("unable to create log directory {log_dir}"))?;
        let log_file_path = log_dir.join(log_file_name(host));
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)
            .with_context(|| format!("unable to open log file {log_file_path}"))?;
        let (file_writer, guard) = non_blocking(log_file);
        let file_filter = EnvFilter::builder().parse_lossy(&self.file_level);
        let file_layer = tracing_subscriber::fmt::layer()
            .event_format(Glog::default().with_timer(LocalTime::default()))
            .fmt_fields(GlogFields::default())
            .with_ansi(false)
            .with_writer(file_writer)
            .with_filter(file_filter);

        let subscriber = Registry::default().with(stderr_layer).with(file_layer);
        tracing::subscriber::set_global_default(subscriber)?;

        debug!(host, log_file = %log_file_path, "Initialized tracing");

        Ok(guard)
    }
}

/// File name for the log of `host`, with path separators replaced.
fn log_file_name(host: &str) -> String {
    let name: String = host
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{name}.log")
}

fn data_dir() -> Utf8PathBuf {
    dirs::data_dir("rusr")
        .try_into()
        .expect("unable to get data dir")
}
