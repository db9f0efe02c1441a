use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crossbeam_channel::{Receiver, Sender};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use war_core::{
    load_monitor_config, DryRunNotifier, FileLedger, Monitor, MonitorConfig, MonitorSettings,
    Notifier,
};

mod coc_api;
mod telegram;

use coc_api::CocApi;
use telegram::TelegramNotifier;

#[derive(Parser, Debug)]
#[command(author, version, about = "Clan war progress monitor", long_about = None)]
struct Cli {
    /// Tag of the clan to follow.
    #[arg(long, env = "COC_CLAN_TAG")]
    clan_tag: String,
    /// Clash of Clans API token.
    #[arg(long, env = "COC_API_TOKEN", hide_env_values = true)]
    coc_api_token: String,
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,
    /// Ledger file recording delivered notifications.
    #[arg(long = "warlog", alias = "ledger", env = "WARLOG")]
    warlog: Option<PathBuf>,
    /// Monitor configuration file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Do not announce individual attacks.
    #[arg(long)]
    mute_attacks: bool,
    /// Seconds between two polls.
    #[arg(long)]
    poll_interval: Option<u64>,
    /// Print messages instead of sending them; uses a separate ledger.
    #[arg(long)]
    dry_run: bool,
    /// Poll once and exit.
    #[arg(long)]
    once: bool,
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn apply(&self, config: &mut MonitorConfig) {
        if self.mute_attacks {
            config.mute_attacks = true;
        }
        if let Some(secs) = self.poll_interval.filter(|secs| *secs > 0) {
            config.poll_interval_secs = secs;
        }
        if let Some(path) = &self.warlog {
            config.ledger_path = path.clone();
        }
        if self.dry_run {
            config.ledger_path = dry_run_ledger_path(&config.ledger_path);
        }
    }

    fn notifier(&self, config: &MonitorConfig) -> Result<Arc<dyn Notifier>> {
        if self.dry_run {
            return Ok(Arc::new(DryRunNotifier));
        }
        let token = self
            .telegram_bot_token
            .as_deref()
            .ok_or_else(|| eyre!("TELEGRAM_BOT_TOKEN is required unless --dry-run is set"))?;
        let chat_id = self
            .telegram_chat_id
            .as_deref()
            .ok_or_else(|| eyre!("TELEGRAM_CHAT_ID is required unless --dry-run is set"))?;
        let sink = TelegramNotifier::new(
            &config.sink_base_url,
            token,
            chat_id,
            config.http_timeout(),
        )?;
        Ok(Arc::new(sink))
    }
}

/// `warlog.json` becomes `warlog.dryrun.json` next to it.
fn dry_run_ledger_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "warlog".to_string());
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}.dryrun.{}", ext.to_string_lossy()),
        None => format!("{stem}.dryrun"),
    };
    path.with_file_name(file_name)
}

/// Spawn a thread that forwards Ctrl-C as a shutdown request.
fn spawn_shutdown_listener() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || wait_for_ctrl_c(tx));
    rx
}

fn wait_for_ctrl_c(tx: Sender<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!(target: "war_monitor::poller", error = %err, "shutdown.listener_failed");
            return;
        }
    };
    match runtime.block_on(tokio::signal::ctrl_c()) {
        Ok(()) => {
            info!(target: "war_monitor::poller", "shutdown.requested");
            let _ = tx.send(());
        }
        Err(err) => {
            warn!(target: "war_monitor::poller", error = %err, "shutdown.listener_failed");
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    let (mut config, metadata) = load_monitor_config(cli.config.as_deref());
    cli.apply(&mut config);
    info!(
        target: "war_monitor::config",
        source = %metadata
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "builtin".to_string()),
        ledger = %config.ledger_path.display(),
        dry_run = cli.dry_run,
        "monitor.starting"
    );

    let ledger = FileLedger::open(&config.ledger_path)?;
    let provider = CocApi::new(&config.api_base_url, &cli.coc_api_token, config.http_timeout())?;
    let notifier = cli.notifier(&config)?;
    let clan_tag = cli.clan_tag.trim().to_uppercase();
    let mut monitor = Monitor::new(
        provider,
        ledger,
        notifier,
        MonitorSettings::from_config(clan_tag, &config),
    );

    if cli.once {
        let outcome = monitor.poll_once()?;
        info!(target: "war_monitor::poller", ?outcome, "poll.once");
        return Ok(());
    }

    let shutdown = spawn_shutdown_listener();
    monitor.run(&shutdown)?;
    Ok(())
}
