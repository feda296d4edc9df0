//! Resources managed on the CMS host
//!
//! The trait and state types live in the `declarative` crate; this module
//! holds the concrete resources nocodeploy converges.

pub mod plugin;

pub use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
pub use plugin::{LEDGER_FILE, PluginResource, RemoteCopy};
