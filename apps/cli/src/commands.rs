//! Subcommand handlers. Each writes its report to `out`.

use std::io::Write;

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use opsline::config::Config;
use opsline::model::EventFamily;
use opsline::ports::{
    EventQuery, EventStore, GroupBy, GroupStats, Window, clamp_limit, family_overview,
    related_events,
};
use serde::Serialize;

use crate::cli::{ClearArgs, EventsArgs, PurgeArgs, ShowArgs, StatsArgs, ago};
use crate::render;

pub fn events(store: &dyn EventStore, args: &EventsArgs, out: &mut impl Write) -> Result<()> {
    let query = EventQuery::new(args.filter())
        .order(args.order())
        .limit(clamp_limit(args.limit));
    let events = store.query(&query).context("querying events")?;

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &events)?;
        writeln!(out)?;
    } else if events.is_empty() {
        writeln!(out, "no events")?;
    } else {
        for event in &events {
            render::event_line(out, event, false)?;
        }
    }
    Ok(())
}

pub fn show(store: &dyn EventStore, args: &ShowArgs, out: &mut impl Write) -> Result<()> {
    let event = store.fetch(args.id)?;
    let related = related_events(store, &event).context("loading related events")?;

    if args.json {
        serde_json::to_writer_pretty(
            &mut *out,
            &serde_json::json!({ "event": event, "related": related }),
        )?;
        writeln!(out)?;
        return Ok(());
    }

    render::event_detail(out, &event)?;
    writeln!(out)?;
    writeln!(out, "related ({}):", related.len())?;
    for other in &related {
        render::event_line(out, other, other.id == event.id)?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct Stats {
    window: Window,
    since: DateTime<Utc>,
    family: Option<EventFamily>,
    total: u64,
    correlations: u64,
    groups: Vec<GroupStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_hit_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_errors: Option<u64>,
}

pub fn stats(store: &dyn EventStore, args: &StatsArgs, out: &mut impl Write) -> Result<()> {
    let now = Utc::now();
    let window = Window::parse(&args.window);
    let since = window.since(now);
    let mut filter = opsline::ports::EventFilter::new().since(since);
    if let Some(family) = args.family {
        filter = filter.family(family);
    }
    let by = GroupBy::from(args.by);

    let health = args
        .family
        .map(|family| family_overview(store, family, window, now))
        .transpose()
        .context("summarizing family")?;

    let stats = Stats {
        window,
        since,
        family: args.family,
        total: store.count(&filter)?,
        correlations: store.count_distinct_correlations(&filter)?,
        groups: store.aggregate(&filter, by)?,
        cache_hit_rate: health.as_ref().and_then(|h| h.cache_hit_rate),
        task_errors: health.as_ref().and_then(|h| h.task_errors),
    };

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &stats)?;
        writeln!(out)?;
        return Ok(());
    }

    match stats.family {
        Some(family) => writeln!(out, "{family} events in the last {window}")?,
        None => writeln!(out, "events in the last {window}")?,
    }
    writeln!(out, "total: {}", stats.total)?;
    writeln!(out, "correlations: {}", stats.correlations)?;
    if let Some(rate) = stats.cache_hit_rate {
        writeln!(out, "cache hit rate: {:.1}%", rate * 100.0)?;
    }
    if let Some(errors) = stats.task_errors {
        writeln!(out, "task errors: {errors}")?;
    }
    render::group_table(out, by, &stats.groups)?;
    Ok(())
}

/// The explicit cutoff, else `now - retention_period`.
pub fn purge_cutoff(args: &PurgeArgs, config: &Config) -> Result<DateTime<Utc>> {
    if let Some(before) = args.before {
        return Ok(before);
    }
    if let Some(age) = args.older_than {
        return ago(age).context("--older-than reaches before the earliest representable time");
    }
    match opsline::retention::cutoff(config, Utc::now()) {
        Some(cutoff) => Ok(cutoff),
        None => bail!("retention is disabled; pass --before or --older-than"),
    }
}

pub fn purge(
    store: &dyn EventStore,
    args: &PurgeArgs,
    config: &Config,
    out: &mut impl Write,
) -> Result<()> {
    let cutoff = purge_cutoff(args, config)?;
    let deleted = opsline::retention::purge(store, cutoff).context("purging events")?;
    writeln!(
        out,
        "purged {deleted} events older than {}",
        cutoff.to_rfc3339()
    )?;
    Ok(())
}

pub fn clear(store: &dyn EventStore, args: &ClearArgs, out: &mut impl Write) -> Result<()> {
    if !args.yes {
        bail!("refusing to delete every event without --yes");
    }
    let deleted = store.clear().context("clearing events")?;
    tracing::info!(deleted, "cleared all events");
    writeln!(out, "cleared {deleted} events")?;
    Ok(())
}
