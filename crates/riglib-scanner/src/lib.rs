//! Folder scanning for rig files: blocked-directory rules, the walker and
//! its worker thread, classification against the library, and AI grouping
//! of new discoveries.

mod patterns;
mod scan;
pub mod suggest;

pub use patterns::*;
pub use scan::*;
