//! Deploy engine for nocodeploy
//!
//! The engine orchestrates:
//! 1. Planning - One plugin resource per descriptor, plus the restart
//! 2. Diffing - Rendered files vs what the host holds
//! 3. Executing - Apply plugins in order, restart, settle, tail logs

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{DeployOptions, DeployReport, deploy};
pub use planner::build_plan;
