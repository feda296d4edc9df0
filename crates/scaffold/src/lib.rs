//! # scaffold
//!
//! Renders CMS plugin sources from declarative collection descriptors.
//!
//! ```
//! use scaffold::{DataType, FieldSpec, RenderOptions, ResourceDescriptor, render};
//!
//! let rfp = ResourceDescriptor::new("rfp")
//!     .with_field(FieldSpec::new("title", DataType::String))
//!     .with_field(FieldSpec::belongs_to("client", "organizations"));
//!
//! let plugin = render(&rfp, &RenderOptions::default()).unwrap();
//! assert!(plugin.server_module.contains("\"foreignKey\": \"client_id\""));
//! ```
//!
//! Rendering is pure: no IO, no clocks, stable field order. The same
//! descriptor always produces byte-identical files.

pub mod error;
pub mod manifest;
pub mod render;
pub mod types;
pub mod validate;

pub use error::{Error, Result};
pub use manifest::{ManifestInfo, parse_manifest};
pub use render::{
    CLIENT_MODULE_PATH, GeneratedFile, MANIFEST_PATH, RenderOptions, RenderedPlugin,
    SERVER_MODULE_PATH, fingerprint_files, package_name, render,
};
pub use types::{DataType, FieldSpec, ResourceDescriptor};
pub use validate::{ValidationIssue, ValidationReport, validate};
