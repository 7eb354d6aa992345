#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Ports
//!
//! Storage interface (port) for captured events, and the read-side query
//! layer built on it.
//!
//! This crate follows the Ports & Drivers (hexagonal) architecture pattern:
//!
//! - [`EventStore`] -- append, query, aggregate and purge events
//! - [`EventFilter`], [`EventQuery`], [`GroupBy`] -- driver-independent
//!   query shapes with reference semantics in [`EventFilter::matches`]
//! - [`query`] -- correlation chains, listing limits, time windows and the
//!   dashboard aggregates
//!
//! The trait is object-safe and meant to be shared as `Arc<dyn EventStore>`.

pub mod error;
pub mod filter;
pub mod query;
pub mod store;

pub use error::StoreError;
pub use filter::{EventFilter, EventQuery, GroupBy, GroupStats, Order, aggregate, sort_groups};
pub use query::{
    FamilyOverview, Overview, Window, clamp_limit, family_overview, overview, related_events,
};
pub use store::EventStore;
