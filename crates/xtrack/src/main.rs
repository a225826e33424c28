use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use xtrack_core::{
    config::Config,
    domain::EventKind,
    formatting::{format_duration, group_digits},
    notify::{
        throttled::{DISCORD_MIN_INTERVAL, TELEGRAM_MIN_INTERVAL},
        Dispatcher, NotificationChannel, NotifyToggles, ThrottledChannel,
    },
    reconcile::{AccountOutcome, CycleReport, Reconciler, ReconcilerSettings},
    service::TrackerService,
    store::{SnapshotStore, SqliteStore},
};
use xtrack_discord::DiscordWebhook;
use xtrack_rapidapi::RapidApiClient;
use xtrack_telegram::TelegramChannel;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let cfg = Config::load().context("failed to load configuration")?;
    let _log_guard = xtrack_core::logging::init("xtrack", &cfg.log_settings())?;

    let needs_upstream = matches!(cli.command, Commands::Run | Commands::Add { .. } | Commands::Check);
    let service = build_service(&cfg, needs_upstream)?;

    match execute(cli.command, &cfg, &service).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => match e.downcast_ref::<xtrack_core::Error>() {
            Some(err) if err.is_user_correctable() => {
                eprintln!("{err}");
                Ok(ExitCode::FAILURE)
            }
            _ => Err(e),
        },
    }
}

async fn execute(command: Commands, cfg: &Config, service: &TrackerService) -> anyhow::Result<()> {
    match command {
        Commands::Run => run(cfg, service).await,
        Commands::Add { username } => add(service, &username).await,
        Commands::Remove { username } => {
            let account = service.remove_account(&username)?;
            println!("Stopped watching @{}", account.username);
            Ok(())
        }
        Commands::List => list(service),
        Commands::Events { username, since } => events(service, &username, since),
        Commands::Status => status(cfg, service),
        Commands::Check => {
            let report = service.reconciler().run_cycle().await?;
            print_cycle(&report);
            Ok(())
        }
    }
}

fn build_service(cfg: &Config, needs_upstream: bool) -> anyhow::Result<TrackerService> {
    let store: Arc<dyn SnapshotStore> = Arc::new(
        SqliteStore::open(&cfg.db_path)
            .with_context(|| format!("failed to open database {}", cfg.db_path.display()))?,
    );

    let upstream = if needs_upstream {
        RapidApiClient::from_config(cfg)?
    } else {
        // Local-only commands never reach the API; credentials may be absent.
        RapidApiClient::new(&cfg.rapidapi_key, &cfg.rapidapi_host, cfg.request_timeout)?
    };
    let upstream = Arc::new(upstream);

    let dispatcher = Dispatcher::new(
        build_channels(cfg)?,
        NotifyToggles {
            follows: cfg.notify_follows,
            unfollows: cfg.notify_unfollows,
        },
    );

    tracing::debug!(channels = ?dispatcher.channel_names(), "notification channels configured");

    let reconciler = Reconciler::new(
        store.clone(),
        upstream.clone(),
        Arc::new(dispatcher),
        ReconcilerSettings::from_config(cfg),
    );

    Ok(TrackerService::new(store, upstream, reconciler))
}

fn build_channels(cfg: &Config) -> anyhow::Result<Vec<Arc<dyn NotificationChannel>>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    match cfg.discord_webhook() {
        Some(url) => {
            let hook = DiscordWebhook::new(url, cfg.request_timeout)?;
            channels.push(Arc::new(ThrottledChannel::new(
                Arc::new(hook),
                DISCORD_MIN_INTERVAL,
            )));
        }
        None if cfg.discord_enabled => {
            tracing::debug!("discord notifications enabled but DISCORD_WEBHOOK_URL is not set")
        }
        None => {}
    }

    match cfg.telegram_target() {
        Some((token, chat_id)) => {
            let channel = TelegramChannel::new(token, chat_id, cfg.request_timeout)?;
            channels.push(Arc::new(ThrottledChannel::new(
                Arc::new(channel),
                TELEGRAM_MIN_INTERVAL,
            )));
        }
        None if cfg.telegram_enabled => {
            tracing::debug!("telegram notifications enabled but bot token or chat id is not set")
        }
        None => {}
    }

    Ok(channels)
}

async fn run(cfg: &Config, service: &TrackerService) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    tracing::info!(
        db = %cfg.db_path.display(),
        interval = %format_duration(cfg.check_interval),
        accounts = service.list_accounts()?.len(),
        "xtrack running"
    );

    service.reconciler().run(shutdown).await;

    let status = service.status()?;
    tracing::info!(
        uptime = %format_duration(status.uptime),
        cycles = status.cycles_completed,
        "xtrack stopped"
    );
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
          _ = sigterm.recv() => tracing::info!("received SIGTERM"),
          res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
              tracing::error!(error = %e, "failed to listen for Ctrl+C");
              return;
            }
            tracing::info!("received Ctrl+C");
          }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("received Ctrl+C");
    }

    shutdown.cancel();
}

async fn add(service: &TrackerService, username: &str) -> anyhow::Result<()> {
    let added = service.add_account(username).await?;
    let name = match added.profile.display_name.as_str() {
        "" => String::new(),
        n => format!("{n}, "),
    };
    println!(
        "Watching @{} ({name}id {}, following {})",
        added.account.username,
        added.account.external_id,
        group_digits(added.profile.following_count)
    );
    match added.seed {
        AccountOutcome::Changed { added, .. } => {
            println!("Stored {} followed accounts", group_digits(added as u64))
        }
        AccountOutcome::Unchanged => println!("Following set is empty"),
        AccountOutcome::Failed(reason) => {
            println!("Initial fetch failed ({reason}); it will be retried on the next check")
        }
    }
    Ok(())
}

fn list(service: &TrackerService) -> anyhow::Result<()> {
    let accounts = service.list_accounts()?;
    if accounts.is_empty() {
        println!("No accounts are being watched. Add one with `xtrack add <username>`.");
        return Ok(());
    }

    println!(
        "{:<4} {:<20} {:<22} {:>10} {:>8} {:>9}  ADDED",
        "ID", "USERNAME", "USER ID", "FOLLOWING", "FOLLOWS", "UNFOLLOWS"
    );
    for row in accounts {
        println!(
            "{:<4} {:<20} {:<22} {:>10} {:>8} {:>9}  {}",
            row.account.id,
            format!("@{}", row.account.username),
            row.account.external_id,
            group_digits(row.following as u64),
            row.events.follows,
            row.events.unfollows,
            row.account.added_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn events(
    service: &TrackerService,
    username: &str,
    since: Option<chrono::DateTime<chrono::Utc>>,
) -> anyhow::Result<()> {
    let (account, events) = service.events(username, since)?;
    if events.is_empty() {
        println!("No events recorded for @{}", account.username);
        return Ok(());
    }

    for event in &events {
        let verb = match event.kind {
            EventKind::Follow => "+ follow  ",
            EventKind::Unfollow => "- unfollow",
        };
        println!(
            "{}  {verb}  {}",
            event.detected_at.format("%Y-%m-%d %H:%M:%S"),
            event.followed_id
        );
    }
    println!("{} events for @{}", events.len(), account.username);
    Ok(())
}

fn status(cfg: &Config, service: &TrackerService) -> anyhow::Result<()> {
    let status = service.status()?;
    let quota = status
        .remaining_quota
        .map(|q| group_digits(u64::from(q)))
        .unwrap_or_else(|| "unknown".to_string());

    let channels = if status.channels.is_empty() {
        "none".to_string()
    } else {
        status.channels.join(", ")
    };
    let daemon = match status.daemon_started_at {
        Some(at) => format!(
            "running since {} (up {})",
            at.format("%Y-%m-%d %H:%M"),
            format_duration((chrono::Utc::now() - at).to_std().unwrap_or_default())
        ),
        None => "not running".to_string(),
    };

    println!("Accounts watched:   {}", status.accounts);
    println!("Requests remaining: {quota}");
    println!("Check interval:     {}", format_duration(status.check_interval));
    println!("Notifications:      {channels}");
    println!("Database:           {}", cfg.db_path.display());
    println!("Daemon:             {daemon}");
    if let Some(at) = status.last_cycle_at {
        println!("Last check:         {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(last) = status.last_cycle {
        print_cycle(&last);
    }
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    for account in &report.accounts {
        let line = match &account.outcome {
            AccountOutcome::Unchanged => "no changes".to_string(),
            AccountOutcome::Changed { added, removed } => format!("+{added} / -{removed}"),
            AccountOutcome::Failed(reason) => format!("failed: {reason}"),
        };
        println!("@{:<20} {line}", account.username);
    }
    println!(
        "Checked {} accounts in {}: {} changed, {} unchanged, {} failed",
        report.accounts.len(),
        format_duration(
            (report.finished_at - report.started_at)
                .to_std()
                .unwrap_or_default()
        ),
        report.changed(),
        report.unchanged(),
        report.failed()
    );
}
