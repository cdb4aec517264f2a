use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use flowwatch::config::FlowwatchConfig;
use flowwatch::health::{self, EvaluationParameters, FlowRef, Status};
use flowwatch::scheduler::ScheduleStore;
use flowwatch::storage::{self, SqliteHistory};

/// Exit code of `check` when at least one flow is unhealthy.
const EXIT_UNHEALTHY: i32 = 2;

#[derive(Parser)]
#[command(
    name = "flowwatch",
    about = "Runtime health checks for scheduled flows",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults to $FLOWWATCH_CONFIG, then /etc/flowwatch/flowwatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Bind address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Evaluate every scheduled flow once and report
    Check {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Number of past successful runs to consider
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,

        /// Slack on top of the historical maximum, as a fraction of the average runtime
        #[arg(long, allow_negative_numbers = true)]
        percentage_from_average: Option<f64>,
    },

    /// Manage schedules
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Record and inspect flow executions
    Execution {
        #[command(subcommand)]
        action: ExecutionAction,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// List all schedules
    List,

    /// Add a schedule that executes a flow
    Add {
        /// Schedule name
        #[arg(long)]
        name: String,

        /// Cron expression with seconds field (e.g. "0 0 3 * * *")
        #[arg(long)]
        cron: String,

        /// Project the flow belongs to
        #[arg(long)]
        project: String,

        /// Flow name
        #[arg(long)]
        flow: String,
    },

    /// Remove a schedule
    Remove {
        #[arg(long)]
        name: String,
    },

    /// Enable a schedule
    Enable {
        #[arg(long)]
        name: String,
    },

    /// Disable a schedule; its next execution becomes undefined
    Disable {
        #[arg(long)]
        name: String,
    },

    /// Preview what will run in the next N hours
    DryRun {
        /// Hours to preview
        #[arg(long, default_value = "24")]
        hours: u64,
    },
}

#[derive(Subcommand)]
enum ExecutionAction {
    /// Record that a flow started running; prints the execution id
    Start {
        #[arg(long)]
        project: String,

        #[arg(long)]
        flow: String,
    },

    /// Record the final status of an execution
    Finish {
        /// Execution id returned by `start`
        #[arg(long)]
        id: i64,

        /// Final status, e.g. succeeded, failed, killed
        #[arg(long)]
        status: String,
    },

    /// Show recent executions of a flow
    List {
        #[arg(long)]
        project: String,

        #[arg(long)]
        flow: String,

        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

fn init_tracing(config: &FlowwatchConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    // Logs go to stderr so `check --json` output stays parseable.
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resolved = FlowwatchConfig::resolve(cli.config.as_deref())?;
    init_tracing(&resolved.config);
    resolved.log();
    let mut config = resolved.config;

    let db_path = config.storage.db_path.to_string_lossy().into_owned();

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting flowwatch");
            flowwatch::serve(&config).await?;
        }
        Commands::Check {
            json,
            limit,
            percentage_from_average,
        } => {
            let defaults = config.evaluation.defaults()?;
            let params = EvaluationParameters::with_overrides(&defaults, limit, percentage_from_average, Utc::now())?;

            let pool = storage::open_pool(&db_path)?;
            let schedules = ScheduleStore::new(pool.clone());
            let history = SqliteHistory::new(pool);
            let report = health::check(&schedules, &history, &params)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nflowwatch health check ({})", health::format::format_instant(params.now));
                println!(
                    "{:<30} | {:<19} | {:<10} | {:<10} | {:<19} | Status",
                    "Flow", "Start", "Average", "Max", "Next"
                );
                println!("{:-<30}-|-{:-<19}-|-{:-<10}-|-{:-<10}-|-{:-<19}-|-{:-<40}", "", "", "", "", "", "");
                for flow in &report.flows {
                    let mark = if flow.healthy { "OK  " } else { "FAIL" };
                    println!(
                        "{:<30} | {:<19} | {:<10} | {:<10} | {:<19} | {} {}",
                        format!("{}/{}", flow.project, flow.flow_name),
                        flow.start_time,
                        flow.average_succeeded_runtime,
                        flow.max_succeeded_runtime,
                        flow.next_execution_time,
                        mark,
                        flow.status
                    );
                }
                println!("\nAll healthy: {}", report.all_healthy);
            }

            if !report.all_healthy {
                std::process::exit(EXIT_UNHEALTHY);
            }
        }
        Commands::Schedule { action } => {
            let pool = storage::open_pool(&db_path)?;
            let store = ScheduleStore::new(pool);

            match action {
                ScheduleAction::List => {
                    let list = store.list()?;
                    if list.is_empty() {
                        println!("No schedules found.");
                    } else {
                        println!("{:<20} | {:<20} | {:<30} | Enabled", "Name", "Cron", "Flow");
                        println!("{:-<20}-|-{:-<20}-|-{:-<30}-|-{:-<7}", "", "", "", "");
                        for entry in list {
                            let flow = entry
                                .actions
                                .iter()
                                .find_map(|action| match action {
                                    health::source::TriggerAction::ExecuteFlow(exec) => Some(exec.flow_ref().to_string()),
                                    _ => None,
                                })
                                .unwrap_or_else(|| "-".to_string());
                            println!(
                                "{:<20} | {:<20} | {:<30} | {}",
                                entry.name, entry.cron_expr, flow, entry.enabled
                            );
                        }
                    }
                }
                ScheduleAction::Add {
                    name,
                    cron,
                    project,
                    flow,
                } => {
                    store.add_flow_schedule(&name, &cron, &FlowRef::new(project, flow))?;
                    println!("Schedule '{}' added.", name);
                }
                ScheduleAction::Remove { name } => {
                    store.remove(&name)?;
                    println!("Schedule '{}' removed.", name);
                }
                ScheduleAction::Enable { name } => {
                    store.set_enabled(&name, true)?;
                    println!("Schedule '{}' enabled.", name);
                }
                ScheduleAction::Disable { name } => {
                    store.set_enabled(&name, false)?;
                    println!("Schedule '{}' disabled.", name);
                }
                ScheduleAction::DryRun { hours } => {
                    let preview = store.preview_next_runs(Utc::now(), hours)?;
                    if preview.is_empty() {
                        println!("No runs scheduled in next {} hours.", hours);
                    } else {
                        println!("Upcoming runs (next {} hours):", hours);
                        for (time, name) in preview {
                            println!("{} : {}", health::format::format_instant(time), name);
                        }
                    }
                }
            }
        }
        Commands::Execution { action } => {
            let pool = storage::open_pool(&db_path)?;
            let history = SqliteHistory::new(pool);

            match action {
                ExecutionAction::Start { project, flow } => {
                    let flow = FlowRef::new(project, flow);
                    let id = history.start_execution(&flow, Status::Running, Utc::now())?;
                    tracing::info!(%flow, id, "Execution started");
                    println!("{}", id);
                }
                ExecutionAction::Finish { id, status } => {
                    let status: Status = status.parse()?;
                    history.finish_execution(id, status, Some(Utc::now()))?;
                    tracing::info!(id, %status, "Execution finished");
                    println!("Execution {} marked {}.", id, status.label());
                }
                ExecutionAction::List { project, flow, limit } => {
                    let flow = FlowRef::new(project, flow);
                    let records = history.list(&flow, limit)?;
                    if records.is_empty() {
                        println!("No executions recorded for {}.", flow);
                    } else {
                        println!("{:<8} | {:<17} | {:<19} | End", "Id", "Status", "Start");
                        println!("{:-<8}-|-{:-<17}-|-{:-<19}-|-{:-<19}", "", "", "", "");
                        for record in records {
                            println!(
                                "{:<8} | {:<17} | {:<19} | {}",
                                record.id,
                                record.sample.status.label(),
                                health::format::format_optional_instant(record.sample.start_time),
                                health::format::format_optional_instant(record.sample.end_time)
                            );
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
