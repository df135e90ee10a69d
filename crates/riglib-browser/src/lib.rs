//! Headless rig browser: query parsing, filtering on a background worker,
//! grid reconciliation and the [`Library`] controller tying them to the store.

mod filter;
mod grid;
mod host;
mod library;
mod query;
mod sort;
mod worker;

pub use filter::*;
pub use grid::*;
pub use host::*;
pub use library::*;
pub use query::*;
pub use sort::*;
pub use worker::*;
