//! Persistent rig metadata store used by the Rigs Library.

mod cancel;
mod entry;
mod metadata;
pub mod paths;
mod replace;
mod settings;
mod store_json;
mod view;

pub use cancel::*;
pub use entry::*;
pub use metadata::*;
pub use replace::*;
pub use settings::*;
pub use store_json::*;
pub use view::*;
