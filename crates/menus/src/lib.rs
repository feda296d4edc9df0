//! # menus
//!
//! Reconciles one navigation group and its links on a CMS through its
//! REST API.
//!
//! ```
//! use menus::{ApiCredentials, MemoryMenuApi, MenuTree, ReconcileOptions, Reconciler};
//!
//! let api = MemoryMenuApi::new("admin", "secret");
//! let tree = MenuTree::new("Talent").with_link("Skills", "/admin/x/skills");
//! let reconciler = Reconciler::new(&api, ReconcileOptions::default());
//!
//! let credentials = ApiCredentials::new("admin", "secret");
//! reconciler.sync(&tree, &credentials).unwrap();
//! let report = reconciler.sync(&tree, &credentials).unwrap();
//! assert!(report.verification.is_clean());
//! assert_eq!(api.entries().len(), 2);
//! ```

pub mod api;
pub mod error;
pub mod http;
pub mod memory;
pub mod reconcile;
pub mod retry;
pub mod types;

pub use api::MenuApi;
pub use error::{Error, ErrorCategory, Result};
pub use http::{Endpoints, HttpMenuApi};
pub use memory::MemoryMenuApi;
pub use reconcile::{
    ItemFailure, MenuPlan, PhaseCallback, PlannedParent, ReconcileOptions, ReconcileReport,
    Reconciler, Strategy, Verification,
};
pub use retry::RetryConfig;
pub use types::{
    ApiCredentials, AuthToken, MenuGroup, MenuId, MenuKind, MenuLink, MenuPatch, MenuTree,
    NewMenu, Phase, RemoteMenu,
};
