//! Plugin source rendering.
//!
//! Output is a pure function of the descriptor and options. Dynamic values
//! reach the generated JavaScript only as JSON literals produced by
//! `serde_json`, and class names are built from alphanumeric characters
//! only, so descriptor text can never become code.

use crate::error::{Error, Result};
use crate::manifest::{Manifest, ManifestMeta};
use crate::types::{FieldSpec, ResourceDescriptor};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Manifest path relative to the plugin directory.
pub const MANIFEST_PATH: &str = "package.json";
/// Server module path relative to the plugin directory.
pub const SERVER_MODULE_PATH: &str = "src/server/index.js";
/// Client module path relative to the plugin directory.
pub const CLIENT_MODULE_PATH: &str = "src/client/index.js";

const HEADER: &str = "// Generated by nocodeploy. Do not edit by hand.";

/// Options shared by every rendered plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// npm scope for package names (e.g. `@acme`)
    pub scope: String,
    /// Version written into every manifest
    pub version: String,
    /// Semver range for the CMS peer dependencies
    pub peer_range: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scope: "@nocodeploy".to_string(),
            version: "0.1.0".to_string(),
            peer_range: "1.x".to_string(),
        }
    }
}

/// One generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the plugin directory.
    pub path: &'static str,
    pub content: String,
}

/// The three generated sources of one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPlugin {
    /// npm package name; also the plugin directory name.
    pub package: String,
    pub manifest: String,
    pub server_module: String,
    pub client_module: String,
}

impl RenderedPlugin {
    /// Files in write order.
    pub fn files(&self) -> Vec<GeneratedFile> {
        vec![
            GeneratedFile {
                path: MANIFEST_PATH,
                content: self.manifest.clone(),
            },
            GeneratedFile {
                path: SERVER_MODULE_PATH,
                content: self.server_module.clone(),
            },
            GeneratedFile {
                path: CLIENT_MODULE_PATH,
                content: self.client_module.clone(),
            },
        ]
    }

    /// Content hash over every path and body.
    pub fn fingerprint(&self) -> String {
        fingerprint_files(
            self.files()
                .iter()
                .map(|f| (f.path, f.content.as_bytes())),
        )
    }
}

/// Hash a set of `(relative path, content)` pairs.
///
/// Used on both sides of a drift check: rendered output and what was read
/// back from the host.
pub fn fingerprint_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(content.len() as u64).to_le_bytes());
        hasher.update(content);
    }
    hasher.finalize().to_hex()[..16].to_string()
}

/// npm package name for a resource: `<scope>/plugin-<name>`.
pub fn package_name(resource: &str, options: &RenderOptions) -> String {
    let slug = resource.replace('_', "-");
    if options.scope.is_empty() {
        format!("plugin-{slug}")
    } else {
        format!("{}/plugin-{slug}", options.scope.trim_end_matches('/'))
    }
}

/// Render manifest, server module and client module for one descriptor.
pub fn render(descriptor: &ResourceDescriptor, options: &RenderOptions) -> Result<RenderedPlugin> {
    let package = package_name(&descriptor.name, options);

    let manifest = render_manifest(descriptor, &package, options)?;
    let server_module = render_server(descriptor)?;
    let client_module = render_client(descriptor)?;

    Ok(RenderedPlugin {
        package,
        manifest,
        server_module,
        client_module,
    })
}

fn render_manifest(
    descriptor: &ResourceDescriptor,
    package: &str,
    options: &RenderOptions,
) -> Result<String> {
    let peer_dependencies: BTreeMap<String, String> = [
        "@nocobase/client",
        "@nocobase/database",
        "@nocobase/server",
    ]
    .iter()
    .map(|p| ((*p).to_string(), options.peer_range.clone()))
    .collect();

    let manifest = Manifest {
        name: package.to_string(),
        version: options.version.clone(),
        display_name: descriptor.title().to_string(),
        description: descriptor.description.clone(),
        main: SERVER_MODULE_PATH.to_string(),
        peer_dependencies,
        nocodeploy: ManifestMeta {
            resource: descriptor.name.clone(),
            dependencies: descriptor.dependencies(),
        },
    };

    let mut text = serde_json::to_string_pretty(&manifest)?;
    text.push('\n');
    Ok(text)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionDef<'a> {
    name: &'a str,
    title: &'a str,
    description: &'a str,
    fields: Vec<FieldDef<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldDef<'a> {
    #[serde(rename = "type")]
    field_type: &'static str,
    name: &'a str,
    interface: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    foreign_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    through: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_null: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_value: Option<&'a Value>,
    ui_schema: UiSchema<'a>,
}

#[derive(Serialize)]
struct UiSchema<'a> {
    title: &'a str,
    #[serde(rename = "x-component")]
    component: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    required: bool,
}

fn field_def<'a>(resource: &str, field: &'a FieldSpec) -> Result<FieldDef<'a>> {
    let target = if field.data_type.is_relation() {
        match field.target.as_deref() {
            Some(t) if !t.is_empty() => Some(t),
            _ => {
                return Err(Error::MissingTarget {
                    resource: resource.to_string(),
                    field: field.name.clone(),
                });
            }
        }
    } else {
        None
    };

    Ok(FieldDef {
        field_type: field.data_type.as_str(),
        name: &field.name,
        interface: field.data_type.interface(),
        target,
        foreign_key: field.resolved_foreign_key(),
        through: field.through.as_deref(),
        unique: field.unique,
        allow_null: field.required.then_some(false),
        default_value: field.default.as_ref(),
        ui_schema: UiSchema {
            title: field.display_title(),
            component: field.data_type.component(),
            required: field.required,
        },
    })
}

fn render_server(descriptor: &ResourceDescriptor) -> Result<String> {
    let fields = descriptor
        .fields
        .iter()
        .map(|f| field_def(&descriptor.name, f))
        .collect::<Result<Vec<_>>>()?;

    let collection = CollectionDef {
        name: &descriptor.name,
        title: descriptor.title(),
        description: &descriptor.description,
        fields,
    };

    let class = format!("{}Server", class_stem(&descriptor.name));
    let literal = js_literal(&collection)?;

    Ok(format!(
        "'use strict';\n\
         {HEADER}\n\
         \n\
         const {{ Plugin }} = require('@nocobase/server');\n\
         \n\
         const collection = {literal};\n\
         \n\
         class {class} extends Plugin {{\n\
         \x20 async load() {{\n\
         \x20   this.db.collection(collection);\n\
         \x20 }}\n\
         }}\n\
         \n\
         module.exports = {class};\n\
         module.exports.default = {class};\n\
         module.exports.collection = collection;\n"
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientMeta<'a> {
    name: &'a str,
    display_name: &'a str,
    description: &'a str,
}

fn render_client(descriptor: &ResourceDescriptor) -> Result<String> {
    let meta = ClientMeta {
        name: &descriptor.name,
        display_name: descriptor.title(),
        description: &descriptor.description,
    };

    let class = format!("{}Client", class_stem(&descriptor.name));
    let literal = js_literal(&meta)?;

    Ok(format!(
        "'use strict';\n\
         {HEADER}\n\
         \n\
         const {{ Plugin }} = require('@nocobase/client');\n\
         \n\
         const resource = {literal};\n\
         \n\
         class {class} extends Plugin {{\n\
         \x20 async load() {{}}\n\
         }}\n\
         \n\
         module.exports = {class};\n\
         module.exports.default = {class};\n\
         module.exports.resource = resource;\n"
    ))
}

/// `Plugin` + PascalCase of the alphanumeric segments of `name`.
fn class_stem(name: &str) -> String {
    let mut stem = String::from("Plugin");
    for segment in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            stem.push(first.to_ascii_uppercase());
            stem.extend(chars);
        }
    }
    stem
}

/// Serialize a value as a JavaScript literal.
///
/// JSON is valid JavaScript except for raw U+2028/U+2029 in older engines,
/// so those are escaped as well.
fn js_literal<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string_pretty(value)?;
    Ok(json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029"))
}
