//! # Declarative
//!
//! A framework for declarative resource management on a remote host.
//!
//! This crate provides the core abstractions for declaring desired state,
//! detecting current state over a [`remote::RemoteShell`], and converging
//! the host to match.
//!
//! ## Core Concepts
//!
//! - **Resource**: Something with state on the host (a plugin directory, a file)
//! - **ResourceState**: The current or desired state of a resource
//! - **ExecutionPlan**: Ordered resources plus post-apply commands
//! - **Executor**: Applies resources one at a time, isolating failures
//!
//! ## Example
//!
//! ```
//! use declarative::{ExecuteOptions, ExecutionPlan, PostAction, execute_simple};
//! use remote::MemoryHost;
//!
//! let host = MemoryHost::new("cms.example.com");
//! let mut plan = ExecutionPlan::new();
//! plan.add_post_action(PostAction::new("restart", "pm2 restart all"));
//!
//! // Nothing to apply, so nothing runs.
//! let report = execute_simple(&plan, &ExecuteOptions::default(), &host).unwrap();
//! assert!(report.outcomes.is_empty());
//! ```
//!
//! ## Callback Traits
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod diff;
pub mod executor;
pub mod planner;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, CancelToken, ConfirmCallback, NoProgress,
    ProgressCallback,
};
pub use diff::{DiffSummary, ResourceDiff, compute_diffs, group_by_type};
pub use executor::{execute, execute_simple, is_fatal};
pub use planner::{ExecutionPlan, PostAction};
pub use resource::{BoxedResource, Resource};
pub use types::{
    ApplyResult, ExecuteOptions, ExecuteReport, ExecuteSummary, PostActionOutcome,
    ResourceOutcome, ResourceState,
};
