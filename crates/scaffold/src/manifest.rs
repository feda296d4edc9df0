//! Plugin manifest (`package.json`) model.
//!
//! The manifest records which resource a plugin was rendered from and the
//! collections it depends on, so a deployed plugin can be traced back to its
//! descriptor without access to the original config.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized form of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Manifest {
    pub name: String,
    pub version: String,
    pub display_name: String,
    pub description: String,
    pub main: String,
    pub peer_dependencies: BTreeMap<String, String>,
    pub nocodeploy: ManifestMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ManifestMeta {
    pub resource: String,
    pub dependencies: Vec<String>,
}

/// What can be recovered from a rendered manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestInfo {
    /// npm package name.
    pub package: String,
    /// Source resource name.
    pub resource: String,
    /// Relation targets declared by the resource.
    pub dependencies: Vec<String>,
    pub version: String,
}

/// Parse a manifest produced by [`crate::render`].
pub fn parse_manifest(text: &str) -> Result<ManifestInfo> {
    let manifest: Manifest =
        serde_json::from_str(text).map_err(|e| Error::InvalidManifest(e.to_string()))?;
    if manifest.nocodeploy.resource.is_empty() {
        return Err(Error::InvalidManifest("missing source resource".to_string()));
    }
    Ok(ManifestInfo {
        package: manifest.name,
        resource: manifest.nocodeploy.resource,
        dependencies: manifest.nocodeploy.dependencies,
        version: manifest.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_foreign_package_json() {
        let text = r#"{"name": "left-pad", "version": "1.0.0"}"#;
        assert!(matches!(parse_manifest(text), Err(Error::InvalidManifest(_))));
    }

    #[test]
    fn test_parse_rejects_empty_resource() {
        let text = r#"{
            "name": "@x/plugin-a", "version": "1.0.0", "displayName": "A",
            "description": "", "main": "src/server/index.js",
            "peerDependencies": {},
            "nocodeploy": {"resource": "", "dependencies": []}
        }"#;
        assert!(parse_manifest(text).is_err());
    }
}
