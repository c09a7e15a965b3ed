//! `lbs` administrative CLI.
//!
//! ```sh
//! lbs --db /tmp/lbs.sqlite3 task add --owner <uuid> --name Standup --load 2 --rule weekly:mon,wed
//! lbs --db /tmp/lbs.sqlite3 --as-of 2025-03-01 refresh
//! lbs --db /tmp/lbs.sqlite3 load --owner <uuid> --date 2025-03-03
//! lbs --db /tmp/lbs.sqlite3 range --owner <uuid> --start 2025-03-01 --end 2025-03-07
//! ```
//!
//! Every command prints JSON on stdout. Settings come from `LBS_*`
//! environment variables; `--db` and `--as-of` override them.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Weekday};
use clap::{Parser, Subcommand, ValueEnum};
use lbs_core::{
    init_logging_from_env, open_db, resolve_db_path, Clock, CoefficientPatch, DateRange,
    EngineSettings, ExceptionKind, FixedClock, LbsEngine, OwnerId, RecomputeCoordinator,
    RecurrenceRule, SystemClock, Task, TaskException, TaskId, TaskListQuery,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lbs", version, about = "Load balancing engine administration")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "LBS_DB_PATH", global = true)]
    db: Option<PathBuf>,

    /// Anchor date for the horizon (defaults to today)
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the engine version
    Version,
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage per-day exceptions
    Exception {
        #[command(subcommand)]
        command: ExceptionCommands,
    },
    /// Recompute cache rows for an owner or a single task
    Recompute {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        task: Option<TaskId>,
        #[arg(long, requires = "end")]
        start: Option<NaiveDate>,
        #[arg(long, requires = "start")]
        end: Option<NaiveDate>,
    },
    /// Rebuild the rolling horizon (all owners when --owner is omitted)
    Refresh {
        #[arg(long)]
        owner: Option<OwnerId>,
    },
    /// Load snapshot for one day
    Load {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Per-day loads over an inclusive range
    Range {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Weekly statistics for the seven days from --start
    Week {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        start: NaiveDate,
    },
    /// 7-day trend buckets over an inclusive range
    Trends {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Show or update load coefficients
    Coefficients {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        alpha: Option<f64>,
        #[arg(long)]
        beta: Option<f64>,
        #[arg(long)]
        cap: Option<f64>,
        #[arg(long)]
        switch_cost: Option<f64>,
        /// List every stored version, newest first
        #[arg(long, conflicts_with_all = ["alpha", "beta", "cap", "switch_cost"])]
        history: bool,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task
    Add {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        load: f64,
        #[arg(long, default_value = "")]
        context: String,
        /// once:DATE | weekly:mon,fri | every:N@DATE | monthly-day:D | monthly-nth:N:WEEKDAY
        #[arg(long)]
        rule: String,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// List an owner's tasks
    List {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        include_inactive: bool,
    },
    /// Deactivate a task and drop its cache rows
    Deactivate {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        task: TaskId,
    },
}

#[derive(Subcommand)]
enum ExceptionCommands {
    /// Create or replace the exception for a task and date
    Add {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        task: TaskId,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_enum)]
        kind: ExceptionArg,
        /// Required for --kind override
        #[arg(long, required_if_eq("kind", "override"))]
        load: Option<f64>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List an owner's exceptions
    List {
        #[arg(long)]
        owner: OwnerId,
        #[arg(long)]
        task: Option<TaskId>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExceptionArg {
    Suppress,
    Override,
    Force,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = init_logging_from_env() {
        eprintln!("warning: file logging disabled: {err}");
    }

    if let Commands::Version = cli.command {
        return print_json(&serde_json::json!({ "version": lbs_core::core_version() }));
    }

    let db_path = cli.db.unwrap_or_else(resolve_db_path);
    let conn = open_db(&db_path)
        .with_context(|| format!("failed to open database `{}`", db_path.display()))?;
    let clock: Arc<dyn Clock> = match cli.as_of {
        Some(date) => Arc::new(FixedClock(date)),
        None => Arc::new(SystemClock),
    };
    let engine = LbsEngine::with_parts(
        &conn,
        EngineSettings::from_env(),
        Arc::new(RecomputeCoordinator::new()),
        clock,
    )
    .context("failed to initialize engine")?;

    run(&engine, cli.command)
}

fn run(engine: &LbsEngine<'_>, command: Commands) -> Result<()> {
    match command {
        Commands::Version => print_json(&serde_json::json!({ "version": lbs_core::core_version() })),
        Commands::Task { command } => run_task(engine, command),
        Commands::Exception { command } => run_exception(engine, command),
        Commands::Recompute {
            owner,
            task,
            start,
            end,
        } => {
            let range = match (start, end) {
                (Some(start), Some(end)) => Some(
                    DateRange::new(start, end)
                        .ok_or_else(|| anyhow!("--start {start} is after --end {end}"))?,
                ),
                _ => None,
            };
            let ack = engine
                .trigger_recompute(owner, task, range)
                .context("recompute failed")?;
            print_json(&ack)
        }
        Commands::Refresh { owner } => {
            let reports = match owner {
                Some(owner) => vec![engine.refresh_horizon(owner)?],
                None => engine.refresh_all_owners()?,
            };
            print_json(&reports)
        }
        Commands::Load { owner, date } => print_json(&engine.calculate_load(owner, date)?),
        Commands::Range { owner, start, end } => {
            print_json(&engine.get_cache_range(owner, start, end)?)
        }
        Commands::Week { owner, start } => print_json(&engine.weekly_stats(owner, start)?),
        Commands::Trends { owner, start, end } => {
            print_json(&engine.load_trends(owner, start, end)?)
        }
        Commands::Coefficients {
            owner,
            alpha,
            beta,
            cap,
            switch_cost,
            history,
        } => {
            if history {
                return print_json(&engine.coefficient_history(owner)?);
            }
            let patch = CoefficientPatch {
                alpha,
                beta,
                cap,
                switch_cost,
            };
            if patch == CoefficientPatch::default() {
                print_json(&engine.current_coefficients(owner)?)
            } else {
                print_json(&engine.update_coefficients(owner, &patch)?)
            }
        }
    }
}

fn run_task(engine: &LbsEngine<'_>, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Add {
            owner,
            name,
            load,
            context,
            rule,
            start,
            end,
        } => {
            let rule = parse_rule(&rule)?;
            let task = Task::new(owner, name, load, rule)
                .with_context(context)
                .with_window(start, end);
            print_json(&engine.create_task(&task)?)
        }
        TaskCommands::List {
            owner,
            include_inactive,
        } => {
            let query = if include_inactive {
                TaskListQuery::all(owner)
            } else {
                TaskListQuery::active(owner)
            };
            print_json(&engine.list_tasks(&query)?)
        }
        TaskCommands::Deactivate { owner, task } => print_json(&engine.deactivate_task(owner, task)?),
    }
}

fn run_exception(engine: &LbsEngine<'_>, command: ExceptionCommands) -> Result<()> {
    match command {
        ExceptionCommands::Add {
            owner,
            task,
            date,
            kind,
            load,
            reason,
        } => {
            let kind = match (kind, load) {
                (ExceptionArg::Suppress, _) => ExceptionKind::Suppress,
                (ExceptionArg::Force, _) => ExceptionKind::ForceInclude,
                (ExceptionArg::Override, Some(load)) => ExceptionKind::OverrideLoad { load },
                (ExceptionArg::Override, None) => bail!("--kind override requires --load"),
            };
            let mut exception = TaskException::new(owner, task, date, kind);
            exception.reason = reason;
            print_json(&engine.create_exception(&exception)?)
        }
        ExceptionCommands::List { owner, task } => {
            print_json(&engine.list_exceptions(owner, task, None)?)
        }
    }
}

/// Parses the compact rule notation accepted by `task add --rule`.
fn parse_rule(raw: &str) -> Result<RecurrenceRule> {
    let (kind, args) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("rule `{raw}` must look like <kind>:<args>"))?;
    let rule = match kind.trim().to_ascii_lowercase().as_str() {
        "once" => RecurrenceRule::once(parse_date(args)?),
        "weekly" => {
            let days = args
                .split(',')
                .map(|day| {
                    day.trim()
                        .parse::<Weekday>()
                        .map_err(|_| anyhow!("unknown weekday `{day}`"))
                })
                .collect::<Result<Vec<_>>>()?;
            RecurrenceRule::weekly(days)?
        }
        "every" => {
            let (interval, anchor) = args
                .split_once('@')
                .ok_or_else(|| anyhow!("every rule must look like every:N@YYYY-MM-DD"))?;
            let interval = interval
                .trim()
                .parse::<i64>()
                .with_context(|| format!("invalid interval `{interval}`"))?;
            RecurrenceRule::every_n_days(parse_date(anchor)?, interval)?
        }
        "monthly-day" => {
            let day = args
                .trim()
                .parse::<i64>()
                .with_context(|| format!("invalid month day `{args}`"))?;
            RecurrenceRule::monthly_day(day)?
        }
        "monthly-nth" => {
            let (nth, weekday) = args
                .split_once(':')
                .ok_or_else(|| anyhow!("monthly-nth rule must look like monthly-nth:N:WEEKDAY"))?;
            let nth = nth
                .trim()
                .parse::<i64>()
                .with_context(|| format!("invalid nth `{nth}`"))?;
            let weekday = weekday
                .trim()
                .parse::<Weekday>()
                .map_err(|_| anyhow!("unknown weekday `{weekday}`"))?;
            RecurrenceRule::monthly_nth_weekday(nth, i64::from(weekday.number_from_monday()))?
        }
        other => bail!("unknown rule kind `{other}`"),
    };
    Ok(rule)
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    raw.trim()
        .parse::<NaiveDate>()
        .with_context(|| format!("invalid date `{raw}`, expected YYYY-MM-DD"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rule_accepts_every_notation() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(
            parse_rule("every:3@2025-01-01").unwrap(),
            RecurrenceRule::every_n_days(date, 3).unwrap()
        );
        assert_eq!(
            parse_rule("weekly:mon, fri").unwrap(),
            RecurrenceRule::weekly([Weekday::Mon, Weekday::Fri]).unwrap()
        );
        assert_eq!(
            parse_rule("monthly-nth:-1:sun").unwrap(),
            RecurrenceRule::monthly_nth_weekday(-1, 7).unwrap()
        );
        assert!(parse_rule("monthly-day:32").is_err());
        assert!(parse_rule("yearly:1").is_err());
    }
}
