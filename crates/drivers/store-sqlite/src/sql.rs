//! Translation of [`EventFilter`] and [`Order`] into SQL.

use opsline_ports::{EventFilter, GroupBy, Order};
use rusqlite::types::Value;

pub const EVENT_COLUMNS: &str = "id, event_type, name, correlation_id, request_id, tenant_id, \
     actor_id, duration_ms, occurred_at, metadata, created_at";

/// A `WHERE` clause with positional parameters.
#[derive(Debug, Default)]
pub struct Clause {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Clause {
    fn push(&mut self, condition: &str, params: impl IntoIterator<Item = Value>) {
        self.sql
            .push_str(if self.sql.is_empty() { " WHERE " } else { " AND " });
        self.sql.push_str(condition);
        self.params.extend(params);
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_owned())
}

/// Compile `filter`. Semantics match [`EventFilter::matches`].
pub fn where_clause(filter: &EventFilter) -> Clause {
    let mut clause = Clause::default();
    if let Some(event_type) = &filter.event_type {
        clause.push("event_type = ?", [text(event_type)]);
    }
    if let Some(family) = filter.family {
        let prefix = family.prefix();
        clause.push(
            "substr(event_type, 1, ?) = ?",
            [Value::Integer(prefix.len() as i64), text(prefix)],
        );
    }
    for (column, value) in [
        ("correlation_id", &filter.correlation_id),
        ("request_id", &filter.request_id),
        ("tenant_id", &filter.tenant_id),
        ("actor_id", &filter.actor_id),
    ] {
        if let Some(value) = value {
            clause.push(&format!("{column} = ?"), [text(value)]);
        }
    }
    if let Some(needle) = &filter.name_contains {
        // instr() is case-sensitive, unlike LIKE.
        clause.push("instr(name, ?) > 0", [text(needle)]);
    }
    if let Some(since) = filter.since {
        clause.push("occurred_at >= ?", [Value::Integer(since.timestamp_micros())]);
    }
    if let Some(until) = filter.until {
        clause.push("occurred_at <= ?", [Value::Integer(until.timestamp_micros())]);
    }
    if let Some(key) = &filter.metadata_flag {
        clause.push(
            "json_type(metadata, ?) NOT IN ('null', 'false')",
            [Value::Text(json_path(key))],
        );
    }
    clause
}

fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}

pub const fn order_by(order: Order) -> &'static str {
    match order {
        Order::Recent => " ORDER BY occurred_at DESC, id DESC",
        Order::Chronological => " ORDER BY occurred_at ASC, id ASC",
    }
}

pub const fn group_column(by: GroupBy) -> &'static str {
    match by {
        GroupBy::EventType => "event_type",
        GroupBy::Name => "name",
    }
}
