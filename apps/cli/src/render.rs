//! Plain-text output.

use std::io::{self, Write};

use opsline::model::Event;
use opsline::ports::{GroupBy, GroupStats};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn duration(ms: Option<f64>) -> String {
    ms.map_or_else(|| "-".to_owned(), |ms| format!("{ms:.2}ms"))
}

/// One line per event; `marked` prefixes a `*`.
pub fn event_line(out: &mut impl Write, event: &Event, marked: bool) -> io::Result<()> {
    writeln!(
        out,
        "{} {:>6}  {}  {:<18} {:<10} {}  {}",
        if marked { '*' } else { ' ' },
        event.id,
        event.occurred_at.format(TIME_FORMAT),
        event.event_type,
        duration(event.duration_ms),
        event.correlation_id.as_deref().unwrap_or("-"),
        event.name,
    )
}

pub fn event_detail(out: &mut impl Write, event: &Event) -> io::Result<()> {
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_owned());

    writeln!(out, "id:          {}", event.id)?;
    writeln!(out, "type:        {}", event.event_type)?;
    writeln!(out, "name:        {}", event.name)?;
    writeln!(out, "occurred at: {}", event.occurred_at.to_rfc3339())?;
    writeln!(out, "duration:    {}", duration(event.duration_ms))?;
    writeln!(out, "correlation: {}", field(&event.correlation_id))?;
    writeln!(out, "request:     {}", field(&event.request_id))?;
    writeln!(out, "tenant:      {}", field(&event.tenant_id))?;
    writeln!(out, "actor:       {}", field(&event.actor_id))?;
    let metadata = serde_json::to_string_pretty(&event.metadata).map_err(io::Error::other)?;
    writeln!(out, "metadata:    {metadata}")
}

pub fn group_table(out: &mut impl Write, by: GroupBy, groups: &[GroupStats]) -> io::Result<()> {
    if groups.is_empty() {
        return writeln!(out, "no events");
    }
    let heading = match by {
        GroupBy::EventType => "type",
        GroupBy::Name => "name",
    };
    let width = groups
        .iter()
        .map(|g| g.key.len())
        .chain([heading.len()])
        .max()
        .unwrap_or_default();

    writeln!(out)?;
    writeln!(out, "{heading:<width$}  {:>8}  {:>10}  {:>10}", "count", "avg", "max")?;
    for group in groups {
        writeln!(
            out,
            "{:<width$}  {:>8}  {:>10}  {:>10}",
            group.key,
            group.count,
            duration(group.avg_duration_ms),
            duration(group.max_duration_ms),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn group_table_aligns_columns() {
        let groups = [
            GroupStats {
                key: "cache.read".into(),
                count: 12,
                avg_duration_ms: Some(1.5),
                max_duration_ms: Some(4.0),
            },
            GroupStats {
                key: "task.perform".into(),
                count: 3,
                avg_duration_ms: None,
                max_duration_ms: None,
            },
        ];
        let mut out = Vec::new();
        group_table(&mut out, GroupBy::EventType, &groups).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[1], "type             count         avg         max");
        assert_eq!(lines[2], "cache.read          12      1.50ms      4.00ms");
        assert_eq!(lines[3], "task.perform         3           -           -");
    }
}
