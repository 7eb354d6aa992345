//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use opsline::model::{EventFamily, EventId};
use opsline::ports::{EventFilter, GroupBy, Order};

#[derive(Debug, Parser)]
#[command(name = "opsline", version, about = "Browse, summarize and purge captured events", long_about = None)]
pub struct Cli {
    /// Settings file (TOML).
    #[arg(long, global = true, env = "OPSLINE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// SQLite event database; overrides `store` from settings.
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List events, newest first.
    Events(EventsArgs),
    /// Show one event and everything sharing its correlation id.
    Show(ShowArgs),
    /// Counts and durations over a time window.
    Stats(StatsArgs),
    /// Delete events older than a cutoff.
    Purge(PurgeArgs),
    /// Delete every event.
    Clear(ClearArgs),
}

#[derive(Debug, Default, Args)]
pub struct EventsArgs {
    /// Exact event type, e.g. `task.perform`.
    #[arg(long = "type", value_name = "TYPE")]
    pub event_type: Option<String>,

    /// Event family: task, cache or cable.
    #[arg(long)]
    pub family: Option<EventFamily>,

    #[arg(long, value_name = "ID")]
    pub correlation: Option<String>,

    #[arg(long, value_name = "ID")]
    pub request: Option<String>,

    #[arg(long, value_name = "ID")]
    pub tenant: Option<String>,

    #[arg(long, value_name = "ID")]
    pub actor: Option<String>,

    /// Substring of the event name (case-sensitive).
    #[arg(long = "q", value_name = "TEXT")]
    pub name: Option<String>,

    /// Earliest occurrence: RFC 3339 timestamp or an age such as `15m`.
    #[arg(long, value_parser = parse_instant)]
    pub since: Option<DateTime<Utc>>,

    /// Latest occurrence: RFC 3339 timestamp or an age such as `15m`.
    #[arg(long, value_parser = parse_instant)]
    pub until: Option<DateTime<Utc>>,

    /// Number of events (default 200, at most 1000).
    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Oldest first.
    #[arg(long)]
    pub chronological: bool,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl EventsArgs {
    pub fn filter(&self) -> EventFilter {
        EventFilter {
            event_type: self.event_type.clone(),
            family: self.family,
            correlation_id: self.correlation.clone(),
            request_id: self.request.clone(),
            tenant_id: self.tenant.clone(),
            actor_id: self.actor.clone(),
            name_contains: self.name.clone(),
            since: self.since,
            until: self.until,
            metadata_flag: None,
        }
    }

    pub const fn order(&self) -> Order {
        if self.chronological {
            Order::Chronological
        } else {
            Order::Recent
        }
    }
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub id: EventId,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// One of 5m, 15m, 30m, 1h, 6h, 24h, 7d; anything else is 1h.
    #[arg(long, default_value = "1h")]
    pub window: String,

    /// Grouping key.
    #[arg(long, value_enum, default_value_t = StatsBy::Type)]
    pub by: StatsBy,

    /// Restrict to one family and include its health figures.
    #[arg(long)]
    pub family: Option<EventFamily>,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatsBy {
    Type,
    Name,
}

impl From<StatsBy> for GroupBy {
    fn from(by: StatsBy) -> Self {
        match by {
            StatsBy::Type => Self::EventType,
            StatsBy::Name => Self::Name,
        }
    }
}

#[derive(Debug, Default, Args)]
pub struct PurgeArgs {
    /// Delete events that occurred before this RFC 3339 timestamp.
    #[arg(long, value_parser = parse_timestamp, conflicts_with = "older_than")]
    pub before: Option<DateTime<Utc>>,

    /// Delete events older than this age, e.g. `30d`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub older_than: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Confirm deleting every event.
    #[arg(long)]
    pub yes: bool,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

/// RFC 3339, or a duration meaning that long ago.
fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = parse_timestamp(value) {
        return Ok(at);
    }
    let age = humantime::parse_duration(value)
        .map_err(|_| format!("`{value}` is neither an RFC 3339 timestamp nor a duration"))?;
    ago(age).ok_or_else(|| format!("`{value}` is too far in the past"))
}

pub fn ago(age: Duration) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(TimeDelta::from_std(age).ok()?)
}
