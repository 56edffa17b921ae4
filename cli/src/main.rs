use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use queuewatch::{
    init_logging, Dashboard, FetchOutcome, HistoryFilters, HistoryView, PollState, QueueSnapshot,
    StatsAggregate, StatsQuery, Task, TaskStatus, WatchConfig,
};

#[derive(Parser, Debug)]
#[command(name = "queuewatch", version, about = "Live status, history and statistics for a task queue")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend root, e.g. http://localhost:3000/api/queue
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current queue snapshot
    Status {
        /// Keep polling and print every update until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// List past tasks, newest first
    History {
        /// Only tasks in this status (enqueued, started, completed, failed, rejected)
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Only tasks for this HTTP method
        #[arg(long)]
        method: Option<String>,
        /// Only tasks requested by this user id
        #[arg(long)]
        user: Option<u64>,
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: u64,
        /// Page size (defaults to the configured history limit)
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show aggregate statistics
    Stats {
        /// First day of the window (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day of the window (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Only tasks requested by this user id
        #[arg(long)]
        user: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        "queuewatch=debug"
    } else {
        "queuewatch=warn"
    });

    let mut config = WatchConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
    }
    debug!(?config, "configuration loaded");

    let dashboard = Dashboard::new(config).context("Failed to set up client")?;

    match cli.command {
        Command::Status { watch: false } => {
            let snapshot = dashboard.snapshot(true).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
            } else {
                print_snapshot(&snapshot);
            }
        }
        Command::Status { watch: true } => watch_status(&dashboard, cli.json).await?,
        Command::History {
            status,
            method,
            user,
            page,
            limit,
        } => {
            let history = dashboard.history();
            history.replace_filters(HistoryFilters {
                status,
                method,
                usuario_id: user,
            });
            if let Some(limit) = limit {
                history.set_limit(limit);
            }
            history.go_to_page(page);

            if history.refetch().await != FetchOutcome::Applied {
                bail_on_error(&history.state())?;
            }
            let state = history.state();
            let Some(view) = state.value.as_ref() else {
                bail!("no history received");
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&view.page)?);
            } else {
                print_history(view);
            }
        }
        Command::Stats { from, to, user } => {
            let stats = dashboard.stats();
            let query = StatsQuery::new().with_range(from, to).with_usuario_id(user);
            if stats.set_query(query).await != FetchOutcome::Applied {
                bail_on_error(&stats.state())?;
            }
            let state = stats.state();
            let Some(aggregate) = state.value.as_ref() else {
                bail!("no statistics received");
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(aggregate.as_ref())?);
            } else {
                print_stats(aggregate);
            }
        }
    }

    Ok(())
}

fn bail_on_error<T>(state: &PollState<T>) -> Result<()> {
    match &state.error {
        Some(error) => bail!("{}", error),
        None => Ok(()),
    }
}

async fn watch_status(dashboard: &Dashboard, json: bool) -> Result<()> {
    let mut updates = dashboard.subscribe_status();
    dashboard.status_poller().start(dashboard.config().status_poll_interval(), true).await;

    let mut last_shown: Option<Arc<QueueSnapshot>> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let state = updates.borrow_and_update().clone();
        if let Some(error) = &state.error {
            eprintln!("{} {}", "poll failed:".red().bold(), error);
        }
        let Some(snapshot) = state.value.clone() else {
            continue;
        };
        if last_shown
            .as_ref()
            .is_some_and(|shown| Arc::ptr_eq(shown, &snapshot))
        {
            continue;
        }

        if json {
            println!("{}", serde_json::to_string(snapshot.as_ref())?);
        } else {
            println!(
                "{} {}",
                Local::now().format("%H:%M:%S").to_string().dimmed(),
                if state.is_stale() { "(stale)".yellow() } else { "".normal() }
            );
            print_snapshot(&snapshot);
        }
        last_shown = Some(snapshot);
    }

    dashboard.status_poller().stop().await;
    Ok(())
}

fn print_snapshot(snapshot: &QueueSnapshot) {
    let utilization = format!("{:.0}%", snapshot.utilization() * 100.0);
    println!(
        "{} {}  {} {}/{} ({})",
        "queued".bold(),
        snapshot.queue_length.to_string().cyan(),
        "processing".bold(),
        snapshot.processing,
        snapshot.max_concurrency,
        if snapshot.available_slots() == 0 {
            utilization.red()
        } else {
            utilization.green()
        }
    );
    if let Some(wait) = snapshot.estimated_wait_ms {
        println!("  estimated wait {}", format_ms(wait));
    }
    if let Some(oldest) = snapshot.oldest_waiting_ms {
        println!("  oldest waiting {}", format_ms(oldest));
    }
    if !snapshot.pending_sample.is_empty() {
        println!("{}", "pending".bold());
        for pending in &snapshot.pending_sample {
            println!("  #{:<6} waiting {}", pending.id, format_ms(pending.waiting_ms));
        }
    }
    if !snapshot.recent_events.is_empty() {
        println!("{}", "recent".bold());
        for event in &snapshot.recent_events {
            println!(
                "  {} #{:<6} {}{}",
                event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
                event.task_id,
                event.kind,
                event
                    .wait_ms
                    .map(|wait| format!(" after {}", format_ms(wait)))
                    .unwrap_or_default()
            );
        }
    }
    if let Some(today) = snapshot.latest_daily_total() {
        println!(
            "{} {}: {} processed, {} rejected",
            "daily".bold(),
            today.date,
            today.processed.to_string().green(),
            today.rejected.to_string().red()
        );
    }
}

fn print_history(view: &HistoryView) {
    let info = view.page_info();
    if view.page.tasks.is_empty() {
        println!("{}", "no tasks on this page".dimmed());
    }
    for task in &view.page.tasks {
        print_task(task);
    }
    println!(
        "{}",
        format!(
            "page {} of {} ({} tasks total)",
            info.current_page.saturating_add(1),
            info.total_pages.max(1),
            info.total
        )
        .dimmed()
    );
}

fn print_task(task: &Task) {
    let status = match task.status {
        TaskStatus::Completed => task.status.to_string().green(),
        TaskStatus::Failed | TaskStatus::Rejected => task.status.to_string().red(),
        TaskStatus::Started => task.status.to_string().yellow(),
        TaskStatus::Enqueued => task.status.to_string().normal(),
    };
    println!(
        "#{:<6} {:<10} {:<6} {:<32} {:<12} {}",
        task.id,
        status,
        task.method,
        task.endpoint,
        task.requester().unwrap_or_else(|| "-".to_string()),
        task.total_time_ms().map(format_ms).unwrap_or_default()
    );
    if let Some(message) = &task.error_message {
        println!("        {}", message.red());
    }
}

fn print_stats(stats: &StatsAggregate) {
    println!("{} {}", "total".bold(), stats.total);
    for status in TaskStatus::ALL {
        println!("  {:<10} {}", status.as_str(), stats.count_for(status));
    }
    if let Some(rate) = stats.success_rate() {
        println!("{} {:.1}%", "success rate".bold(), rate * 100.0);
    }
    for (label, value) in [
        ("avg wait", stats.avg_wait_time_ms),
        ("avg execution", stats.avg_execution_time_ms),
        ("avg total", stats.avg_total_time_ms),
    ] {
        if let Some(ms) = value {
            println!("{} {}", label.bold(), format_ms(ms.round() as u64));
        }
    }
    if !stats.by_method.is_empty() {
        println!("{}", "by method".bold());
        for (method, count) in &stats.by_method {
            println!("  {:<10} {}", method, count);
        }
    }
    for (label, entries) in [
        ("top endpoints", &stats.top_endpoints),
        ("top users", &stats.top_users),
    ] {
        if !entries.is_empty() {
            println!("{}", label.bold());
            for entry in entries {
                println!("  {:<32} {}", entry.name, entry.count);
            }
        }
    }
}

fn format_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}
