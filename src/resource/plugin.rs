//! Plugin resource - one rendered plugin directory on the host

use anyhow::{Context, Result};
use remote::{RemoteFile, RemoteShell};
use remote::shell::{join, parent};
use scaffold::{RenderOptions, RenderedPlugin, ResourceDescriptor, fingerprint_files};

use super::{ApplyContext, ApplyResult, Resource, ResourceState};

/// Managed-file list kept next to the generated sources
pub const LEDGER_FILE: &str = ".nocodeploy-files";

/// A descriptor rendered for one plugin directory
#[derive(Debug, Clone)]
pub struct PluginResource {
    /// Descriptor name (e.g. `rfp`)
    pub name: String,
    pub title: String,
    /// Absolute plugin directory on the host
    pub dir: String,
    pub plugin: RenderedPlugin,
}

impl PluginResource {
    pub fn new(
        descriptor: &ResourceDescriptor,
        plugin_root: &str,
        options: &RenderOptions,
    ) -> Result<Self> {
        let plugin = scaffold::render(descriptor, options)
            .with_context(|| format!("Failed to render {}", descriptor.name))?;
        Ok(Self {
            name: descriptor.name.clone(),
            title: descriptor.title().to_string(),
            dir: join(plugin_root, &plugin.package),
            plugin,
        })
    }

    /// Absolute path of a file inside the plugin directory
    pub fn remote_path(&self, relative: &str) -> String {
        join(&self.dir, relative)
    }

    /// Relative paths this plugin manages, in write order
    pub fn managed_paths(&self) -> Vec<&'static str> {
        self.plugin.files().iter().map(|f| f.path).collect()
    }

    /// Rendered files at their absolute host paths
    pub fn remote_files(&self) -> Vec<RemoteFile> {
        self.plugin
            .files()
            .into_iter()
            .map(|file| RemoteFile::new(self.remote_path(file.path), file.content))
            .collect()
    }

    /// Read every managed file back from the host
    pub fn read_remote(&self, remote: &dyn RemoteShell) -> Result<Vec<RemoteCopy>> {
        self.plugin
            .files()
            .into_iter()
            .map(|file| {
                let content = remote
                    .read_file(&self.remote_path(file.path))
                    .with_context(|| format!("Failed to read {}", file.path))?;
                Ok(RemoteCopy {
                    path: file.path,
                    rendered: file.content,
                    remote: content,
                })
            })
            .collect()
    }

    /// Files listed by the previous deploy's ledger
    fn read_ledger(&self, remote: &dyn RemoteShell) -> Result<Vec<String>> {
        let Some(bytes) = remote.read_file(&self.remote_path(LEDGER_FILE))? else {
            return Ok(Vec::new());
        };
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::trim)
            .filter(|line| is_safe_relative(line))
            .map(str::to_string)
            .collect())
    }

    /// Ledger entries that the current shape no longer produces
    fn stale_paths(&self, remote: &dyn RemoteShell) -> Result<Vec<String>> {
        let current = self.managed_paths();
        Ok(self
            .read_ledger(remote)?
            .into_iter()
            .filter(|path| !current.contains(&path.as_str()))
            .collect())
    }

    fn check_current(&self, remote: &dyn RemoteShell) -> Result<PluginState> {
        let copies = self.read_remote(remote)?;
        if copies.iter().all(|c| c.remote.is_none()) {
            return Ok(PluginState::Missing);
        }

        let remote_fingerprint = fingerprint_files(
            copies
                .iter()
                .map(|c| (c.path, c.remote.as_deref().unwrap_or_default())),
        );
        if remote_fingerprint != self.plugin.fingerprint() {
            return Ok(PluginState::Drifted(remote_fingerprint));
        }

        let stale = self.stale_paths(remote)?;
        if stale.is_empty() {
            Ok(PluginState::Current)
        } else {
            Ok(PluginState::Stale(stale))
        }
    }

    /// Write the rendered files, prune stale ones and record the new ledger
    fn write(&self, remote: &dyn RemoteShell) -> Result<()> {
        let stale = self.stale_paths(remote)?;

        for file in self.remote_files() {
            remote
                .mkdir_p(parent(&file.path))
                .with_context(|| format!("Failed to create directory for {}", file.path))?;
            remote
                .write_file(&file.path, &file.content)
                .with_context(|| format!("Failed to write {}", file.path))?;
            log::debug!("Wrote {}", file.path);
        }

        for relative in &stale {
            let path = self.remote_path(relative);
            remote
                .remove_file(&path)
                .with_context(|| format!("Failed to remove stale file {relative}"))?;
            log::info!("Removed stale {path}");
        }

        let mut ledger = self.managed_paths().join("\n");
        ledger.push('\n');
        remote
            .write_file(&self.remote_path(LEDGER_FILE), ledger.as_bytes())
            .context("Failed to write file ledger")?;
        Ok(())
    }
}

/// A managed file, as rendered and as found on the host
#[derive(Debug, Clone)]
pub struct RemoteCopy {
    pub path: &'static str,
    pub rendered: String,
    pub remote: Option<Vec<u8>>,
}

impl RemoteCopy {
    pub fn is_current(&self) -> bool {
        self.remote.as_deref() == Some(self.rendered.as_bytes())
    }
}

/// Ledger entries must stay inside the plugin directory
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && path != LEDGER_FILE
        && path.split('/').all(|part| !part.is_empty() && part != "." && part != "..")
}

#[derive(Debug)]
enum PluginState {
    Missing,
    Current,
    Drifted(String),
    Stale(Vec<String>),
}

impl Resource for PluginResource {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("{} ({})", self.title, self.plugin.package)
    }

    fn resource_type(&self) -> &'static str {
        "plugin"
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(match self.check_current(ctx.remote)? {
            PluginState::Missing => ResourceState::Absent,
            PluginState::Current => self.desired_state(),
            PluginState::Drifted(fingerprint) => ResourceState::Modified {
                from: fingerprint,
                to: self.plugin.fingerprint(),
            },
            PluginState::Stale(paths) => ResourceState::Modified {
                from: format!("{} stale file(s)", paths.len()),
                to: self.plugin.fingerprint(),
            },
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::Present {
            details: Some(self.plugin.fingerprint()),
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        match self.check_current(ctx.remote)? {
            PluginState::Current => Ok(ApplyResult::NoChange),
            PluginState::Missing => {
                self.write(ctx.remote)?;
                Ok(ApplyResult::Created)
            }
            PluginState::Drifted(_) | PluginState::Stale(_) => {
                self.write(ctx.remote)?;
                Ok(ApplyResult::Modified)
            }
        }
    }
}
