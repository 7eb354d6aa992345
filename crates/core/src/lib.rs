#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Opsline Core
//!
//! Event model and identifiers shared by every Opsline crate.
//!
//! ## Key Components
//!
//! - **Events**: [`Event`] (stored, immutable) and [`NewEvent`] (what the
//!   recorder hands to a store)
//! - **Identifiers**: [`EventId`] and [`generate_id`] for correlation and
//!   request identifiers
//! - **Event types**: the dot-namespaced type constants in [`event_type`] and
//!   the [`EventFamily`] prefixes used for family-wide queries
//!
//! ## Usage
//!
//! ```rust
//! use opsline_core::{NewEvent, event_type};
//!
//! let event = NewEvent::new(event_type::CACHE_READ, "users/42")
//!     .with_duration_ms(0.4);
//! assert!(event.validate().is_ok());
//! ```

pub mod event;
pub mod id;
pub mod kind;

pub use event::{Event, EventError, Metadata, NewEvent, storage_instant};
pub use id::{EventId, generate_id};
pub use kind::{EventFamily, UnknownFamily, event_type};
