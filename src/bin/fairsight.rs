//! Fairsight CLI - query the daemon's view-models from a terminal
//!
//! # Usage
//!
//! ```text
//! fairsight activity                      # last 7 days of activity
//! fairsight traffic --from 2025-01-01     # reconciled traffic history
//! fairsight adapters                      # adapters and monitoring states
//! fairsight snapshots                     # latest live statistics
//! fairsight shutdown                      # how the previous run ended
//! fairsight totals                        # live vs saved totals for today
//! fairsight start eth0 | stop eth0        # manual monitoring control
//! fairsight discover                      # rediscover adapters now
//! fairsight watch                         # stream lifecycle events
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use fairsight_core::{
    format_bytes, format_duration, parse_date, AdapterName, DatedActivity, LiveTrafficSnapshot,
    ReconciledDaySummary, TotalsComparison, TrafficRangeStats,
};
use fairsight_protocol::{DaemonMessage, DiscoveryReport, MessageType};
use fairsightd::client::DaemonClient;
use fairsightd::DaemonConfig;

/// Number of hosts listed per adapter by `snapshots`
const TOP_HOSTS: usize = 5;

/// Fairsight command-line client
#[derive(Parser, Debug)]
#[command(name = "fairsight", version, about)]
struct Args {
    /// Daemon socket (default: from config, then /tmp/fairsight.sock)
    #[arg(short, long, global = true)]
    socket: Option<PathBuf>,

    /// Print raw JSON replies instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Daily activity summaries
    Activity(RangeArgs),
    /// Reconciled traffic history
    Traffic(RangeArgs),
    /// Known adapters and their monitoring state
    Adapters,
    /// Latest live statistics per monitored adapter
    Snapshots,
    /// Whether the previous run shut down cleanly
    Shutdown,
    /// Today's live versus saved totals
    Totals,
    /// Start monitoring an adapter
    Start { adapter: String },
    /// Stop monitoring an adapter
    Stop { adapter: String },
    /// Rediscover adapters now
    Discover,
    /// Stream adapter and snapshot events until interrupted
    Watch,
}

#[derive(clap::Args, Debug)]
struct RangeArgs {
    /// First day (YYYY-MM-DD); defaults to 6 days before --to
    #[arg(long, value_parser = parse_day)]
    from: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD); defaults to today
    #[arg(long, value_parser = parse_day)]
    to: Option<NaiveDate>,
}

fn parse_day(text: &str) -> Result<NaiveDate, String> {
    parse_date(text).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let socket_path = match args.socket {
        Some(path) => path,
        None => {
            DaemonConfig::load(None)
                .context("Failed to load configuration")?
                .socket_path
        }
    };

    let mut client = DaemonClient::connect(&socket_path, None)
        .await
        .context("Is the daemon running? Try 'fairsightd start'")?;

    match args.command {
        Command::Watch => return watch(client, args.json).await,
        Command::Adapters if !args.json => return adapters(client).await,
        _ => {}
    }

    let request = request_for(&args.command);
    let reply = client.request(request).await?;
    if let DaemonMessage::Error { message, code } = &reply {
        match code {
            Some(code) => bail!("{message} ({code})"),
            None => bail!("{message}"),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply);
    }

    let _ = client.disconnect().await;
    Ok(())
}

fn request_for(command: &Command) -> MessageType {
    match command {
        Command::Activity(range) => MessageType::GetActivity {
            start: range.from,
            end: range.to,
        },
        Command::Traffic(range) => MessageType::GetTrafficHistory {
            start: range.from,
            end: range.to,
        },
        Command::Adapters => MessageType::GetAdapters,
        Command::Snapshots => MessageType::GetLiveSnapshots,
        Command::Shutdown => MessageType::GetShutdownStatus,
        Command::Totals => MessageType::GetCurrentTotals,
        Command::Start { adapter } => MessageType::StartMonitoring {
            adapter: AdapterName::new(adapter.as_str()),
        },
        Command::Stop { adapter } => MessageType::StopMonitoring {
            adapter: AdapterName::new(adapter.as_str()),
        },
        Command::Discover => MessageType::Discover,
        Command::Watch => MessageType::Subscribe,
    }
}

/// Adapters joined with their monitoring state.
async fn adapters(mut client: DaemonClient) -> Result<()> {
    let DaemonMessage::Adapters { adapters } = client.request(MessageType::GetAdapters).await?
    else {
        bail!("Unexpected reply to adapter list request");
    };
    let DaemonMessage::MonitoringStates { states } =
        client.request(MessageType::GetMonitoringStates).await?
    else {
        bail!("Unexpected reply to monitoring state request");
    };

    if adapters.is_empty() {
        println!("No adapters discovered.");
    }
    for adapter in &adapters {
        let status = if adapter.is_up { "up" } else { "down" };
        let state = states
            .get(&adapter.name)
            .map_or("not monitoring", |s| s.label());
        println!("{:<24} {status:<5} {state:<15} {}", adapter.name, adapter.label());
    }

    let _ = client.disconnect().await;
    Ok(())
}

async fn watch(mut client: DaemonClient, json: bool) -> Result<()> {
    let initial = client.subscribe().await?;
    if json {
        println!("{}", serde_json::to_string(&initial)?);
    } else {
        print_reply(&initial);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = client.next_event() => {
                let event = event?;
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    print_event(&event);
                }
            }
        }
    }

    let _ = client.disconnect().await;
    Ok(())
}

// ============================================================================
// Rendering
// ============================================================================

fn print_reply(reply: &DaemonMessage) {
    match reply {
        DaemonMessage::ActivitySeries { days } => print_activity(days),
        DaemonMessage::TrafficHistory { days, stats } => print_traffic(days, stats),
        DaemonMessage::HistoryUnavailable { message } => {
            println!("Traffic history unavailable: {message}");
        }
        DaemonMessage::MonitoringStates { states } => {
            if states.is_empty() {
                println!("No adapters discovered.");
            }
            for (adapter, state) in states {
                println!("{adapter:<24} {}", state.label());
            }
        }
        DaemonMessage::Adapters { adapters } => {
            for adapter in adapters {
                let status = if adapter.is_up { "up" } else { "down" };
                println!("{:<24} {status:<5} {}", adapter.name, adapter.label());
            }
        }
        DaemonMessage::LiveSnapshots { snapshots } => {
            if snapshots.is_empty() {
                println!("No live statistics yet.");
            }
            for (adapter, snapshot) in snapshots {
                print_snapshot(adapter, snapshot);
            }
        }
        DaemonMessage::ShutdownStatus { status } => match status.advisory() {
            Some(advisory) => println!("{advisory}"),
            None if status.check_failed => println!("Shutdown status could not be checked."),
            None => println!("Previous run shut down cleanly."),
        },
        DaemonMessage::CurrentTotals { comparison } => print_totals(comparison),
        DaemonMessage::MonitoringChanged { adapter, state } => {
            println!("{adapter}: {}", state.label());
        }
        DaemonMessage::DiscoveryComplete { report } => print_discovery(report),
        other => println!("{other:?}"),
    }
}

fn print_activity(days: &[DatedActivity]) {
    println!("{:<12} {:>12} {:>12} {:>12}", "Date", "Active", "Inactive", "Not run");
    for day in days {
        let s = &day.summary;
        println!(
            "{:<12} {:>12} {:>12} {:>12}",
            day.date,
            format_duration(u64::from(s.active_seconds)),
            format_duration(u64::from(s.inactive_seconds)),
            format_duration(u64::from(s.not_run_seconds)),
        );
    }
}

fn print_traffic(days: &[ReconciledDaySummary], stats: &TrafficRangeStats) {
    println!(
        "{:<12} {:>12} {:>12} {:>9}",
        "Date", "Incoming", "Outgoing", "Sessions"
    );
    for day in days {
        let marker = if day.has_real_time_data { " (live)" } else { "" };
        println!(
            "{:<12} {:>12} {:>12} {:>9}{marker}",
            day.date,
            format_bytes(day.total_incoming_bytes),
            format_bytes(day.total_outgoing_bytes),
            day.session_count(),
        );
    }
    println!(
        "{:<12} {:>12} {:>12} {:>9}",
        "Total",
        format_bytes(stats.total_incoming_bytes),
        format_bytes(stats.total_outgoing_bytes),
        stats.total_sessions,
    );
    println!(
        "Monitored {}; up to {} hosts and {} services per day",
        format_duration(stats.total_duration),
        stats.max_unique_hosts,
        stats.max_unique_services,
    );
}

fn print_snapshot(adapter: &AdapterName, snapshot: &LiveTrafficSnapshot) {
    println!(
        "{adapter}: in {} / out {} over {}",
        format_bytes(snapshot.incoming_bytes),
        format_bytes(snapshot.outgoing_bytes),
        format_duration(snapshot.duration_seconds),
    );
    for host in snapshot.top_hosts(TOP_HOSTS) {
        let name = host.hostname.as_deref().unwrap_or(&host.ip);
        let country = host.country_code.as_deref().unwrap_or("--");
        println!("  {name:<40} {country:<3} {:>12}", format_bytes(host.total_bytes()));
    }
}

fn print_totals(comparison: &TotalsComparison) {
    let t = &comparison.totals;
    println!(
        "Live:    in {} / out {}",
        format_bytes(t.live_incoming_bytes),
        format_bytes(t.live_outgoing_bytes)
    );
    println!(
        "Saved:   in {} / out {} ({} sessions)",
        format_bytes(t.session_incoming_bytes),
        format_bytes(t.session_outgoing_bytes),
        t.today_session_count
    );
    println!("Active adapters: {}", t.active_adapters);
    if comparison.discrepancy {
        println!(
            "Live and saved totals differ by {} bytes incoming; live totals are used.",
            comparison.incoming_difference
        );
    }
    if comparison.consolidation_suggested {
        println!("Many sessions saved today; consider consolidating them.");
    }
}

fn print_discovery(report: &DiscoveryReport) {
    if report.list_failed {
        println!("Adapter list unavailable; state unchanged.");
        return;
    }
    if report.is_quiet() {
        println!("No changes.");
        return;
    }
    let sections = [
        ("Added", &report.added),
        ("Removed", &report.removed),
        ("Started", &report.started),
        ("Stopped", &report.stopped),
        ("Failed", &report.failed),
    ];
    for (label, names) in sections {
        if !names.is_empty() {
            let names: Vec<&str> = names.iter().map(AdapterName::as_str).collect();
            println!("{label}: {}", names.join(", "));
        }
    }
}

fn print_event(event: &DaemonMessage) {
    match event {
        DaemonMessage::AdapterAppeared { adapter } => {
            println!("+ {} ({})", adapter.name, adapter.label());
        }
        DaemonMessage::AdapterRemoved { adapter } => println!("- {adapter}"),
        DaemonMessage::AdapterStateChanged { adapter, state } => {
            println!("~ {adapter}: {}", state.label());
        }
        DaemonMessage::SnapshotUpdated { adapter, snapshot } => {
            println!(
                "* {adapter}: in {} / out {}",
                format_bytes(snapshot.incoming_bytes),
                format_bytes(snapshot.outgoing_bytes)
            );
        }
        other => print_reply(other),
    }
}
