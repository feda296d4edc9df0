//! Configuration file and environment handling.
//!
//! Everything non-secret lives in one TOML file. Passwords and keys come
//! from the environment only; the `[host]` and `[api]` tables reject
//! unknown keys so a stray `password = ...` fails loudly instead of being
//! silently ignored.

use anyhow::{Context, Result, bail};
use menus::{
    ApiCredentials, Endpoints, MenuGroup, MenuLink, MenuTree, ReconcileOptions, Strategy,
};
use remote::{Credentials, HostConfig};
use scaffold::{RenderOptions, ResourceDescriptor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_HOST: &str = "NOCODEPLOY_HOST";
pub const ENV_API_URL: &str = "NOCODEPLOY_API_URL";
pub const ENV_SSH_PASSWORD: &str = "NOCODEPLOY_SSH_PASSWORD";
pub const ENV_SSH_KEY: &str = "NOCODEPLOY_SSH_KEY";
pub const ENV_API_ACCOUNT: &str = "NOCODEPLOY_API_ACCOUNT";
pub const ENV_API_PASSWORD: &str = "NOCODEPLOY_API_PASSWORD";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("nocodeploy"))
}

/// Default config file location
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

// ============================================================================
// File Layout
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collections that already exist on the host and may be relation targets
    pub external_collections: Vec<String>,
    pub host: HostSection,
    pub deploy: DeploySection,
    pub api: ApiSection,
    pub menus: MenusSection,
    pub resources: Vec<ResourceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostSection {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key path; `~` is expanded
    pub key_file: Option<String>,
    pub connect_timeout_secs: u64,
    /// Limit for one remote command; 0 disables it
    pub command_timeout_secs: u64,
    pub strict_host_key_checking: bool,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: "root".to_string(),
            key_file: None,
            connect_timeout_secs: 15,
            command_timeout_secs: 600,
            strict_host_key_checking: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySection {
    /// Remote directory holding one directory per plugin package
    pub plugin_root: String,
    pub scope: String,
    pub version: String,
    pub peer_range: String,
    pub restart_command: String,
    pub settle_secs: u64,
    /// Remote log printed after the restart
    pub log_file: Option<String>,
    pub log_lines: usize,
}

impl Default for DeploySection {
    fn default() -> Self {
        let render = RenderOptions::default();
        Self {
            plugin_root: "/app/nocobase/packages/plugins".to_string(),
            scope: render.scope,
            version: render.version,
            peer_range: render.peer_range,
            restart_command: "pm2 restart all".to_string(),
            settle_secs: 30,
            log_file: None,
            log_lines: 50,
        }
    }
}

impl DeploySection {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            scope: self.scope.clone(),
            version: self.version.clone(),
            peer_range: self.peer_range.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSection {
    pub url: Option<String>,
    pub timeout_secs: u64,
    /// Attempts for sign-in and listing on network errors
    pub retry_attempts: u32,
    pub endpoints: Endpoints,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
            retry_attempts: 2,
            endpoints: Endpoints::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MenusSection {
    pub strategy: Strategy,
    pub page_size: usize,
    pub purge_pattern: Option<String>,
    pub jobs: usize,
    pub parent: Option<MenuGroup>,
    pub links: Vec<MenuLink>,
}

impl Default for MenusSection {
    fn default() -> Self {
        let defaults = ReconcileOptions::default();
        Self {
            strategy: defaults.strategy,
            page_size: defaults.page_size,
            purge_pattern: None,
            jobs: defaults.jobs,
            parent: None,
            links: Vec::new(),
        }
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// Values that only ever come from the environment
#[derive(Default, Clone)]
pub struct Secrets {
    pub ssh_password: Option<String>,
    pub ssh_key: Option<String>,
    pub api_account: Option<String>,
    pub api_password: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "***" } else { "unset" };
        f.debug_struct("Secrets")
            .field("ssh_password", &mask(&self.ssh_password))
            .field("ssh_key", &self.ssh_key)
            .field("api_account", &self.api_account)
            .field("api_password", &mask(&self.api_password))
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            ssh_password: get(ENV_SSH_PASSWORD),
            ssh_key: get(ENV_SSH_KEY),
            api_account: get(ENV_API_ACCOUNT),
            api_password: get(ENV_API_PASSWORD),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Load a config file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Resolve the config path from the CLI flag or the default location
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(PathBuf::from(
                shellexpand::tilde(&path.to_string_lossy()).as_ref(),
            )),
            None => default_config_path(),
        }
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_HOST).filter(|v| !v.is_empty()) {
            log::debug!("Host overridden from {ENV_HOST}");
            self.host.host = host;
        }
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            log::debug!("API url overridden from {ENV_API_URL}");
            self.api.url = Some(url);
        }
    }

    /// SSH parameters, with credentials taken from `secrets`
    pub fn host_config(&self, secrets: &Secrets) -> Result<HostConfig> {
        if self.host.host.is_empty() {
            bail!("No host configured (set [host].host or {ENV_HOST})");
        }

        let key = secrets.ssh_key.as_ref().or(self.host.key_file.as_ref());
        let credentials = match (key, &secrets.ssh_password) {
            (Some(key), _) => {
                Credentials::KeyFile(PathBuf::from(shellexpand::tilde(key).as_ref()))
            }
            (None, Some(password)) => Credentials::Password(password.clone()),
            (None, None) => bail!(
                "No SSH credentials: set {ENV_SSH_KEY}, [host].key_file or {ENV_SSH_PASSWORD}"
            ),
        };

        let mut config = HostConfig::new(&self.host.host, &self.host.user, credentials);
        config.port = self.host.port;
        config.connect_timeout = Duration::from_secs(self.host.connect_timeout_secs);
        config.strict_host_key_checking = self.host.strict_host_key_checking;
        config.command_timeout = (self.host.command_timeout_secs > 0)
            .then(|| Duration::from_secs(self.host.command_timeout_secs));
        Ok(config)
    }

    pub fn api_url(&self) -> Result<&str> {
        self.api
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .with_context(|| format!("No API url configured (set [api].url or {ENV_API_URL})"))
    }

    pub fn api_credentials(&self, secrets: &Secrets) -> Result<ApiCredentials> {
        match (&secrets.api_account, &secrets.api_password) {
            (Some(account), Some(password)) => Ok(ApiCredentials::new(account, password)),
            _ => bail!("API credentials missing: set {ENV_API_ACCOUNT} and {ENV_API_PASSWORD}"),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.max(1))
    }

    /// The declared menu
    pub fn menu_tree(&self) -> Result<MenuTree> {
        let parent = self
            .menus
            .parent
            .clone()
            .context("No menu declared (add a [menus.parent] table)")?;
        Ok(MenuTree {
            parent,
            links: self.menus.links.clone(),
        })
    }

    /// Reconciler options, with an optional strategy/jobs override from the CLI
    pub fn reconcile_options(
        &self,
        strategy: Option<Strategy>,
        jobs: Option<usize>,
    ) -> ReconcileOptions {
        let mut options = ReconcileOptions {
            strategy: strategy.unwrap_or(self.menus.strategy),
            page_size: self.menus.page_size,
            purge_pattern: self.menus.purge_pattern.clone(),
            jobs: jobs.unwrap_or(self.menus.jobs).max(1),
            ..ReconcileOptions::default()
        };
        options.retry.max_attempts = self.api.retry_attempts.max(1);
        options
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
external_collections = ["organizations"]

[host]
host = "cms.example.com"
user = "deploy"
key_file = "~/.ssh/id_ed25519"

[deploy]
plugin_root = "/srv/cms/plugins"
settle_secs = 5
log_file = "/var/log/cms/out.log"

[api]
url = "https://cms.example.com"

[menus]
strategy = "diff"
jobs = 4

[menus.parent]
title = "Talent"
icon = "TeamOutlined"

[[menus.links]]
title = "Skills"
path = "/admin/x/skills"

[[resources]]
name = "rfp"

[[resources.fields]]
name = "client"
type = "belongsTo"
target = "organizations"
"#;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_sample() {
        let (_dir, path) = write_config(SAMPLE);
        let config = Config::load_file(&path).unwrap();

        assert_eq!(config.host.host, "cms.example.com");
        assert_eq!(config.host.port, 22);
        assert_eq!(config.deploy.settle_secs, 5);
        assert_eq!(config.deploy.restart_command, "pm2 restart all");
        assert_eq!(config.menus.strategy, Strategy::Diff);
        assert_eq!(config.resources.len(), 1);
        assert_eq!(config.external_collections, vec!["organizations"]);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let (_dir, path) = write_config("");
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.deploy.settle_secs, 30);
        assert_eq!(config.menus.page_size, 1000);
        assert_eq!(config.api.timeout_secs, 30);
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_password_in_file_rejected() {
        let (_dir, path) = write_config("[host]\nhost = \"h\"\npassword = \"hunter2\"\n");
        assert!(Config::load_file(&path).is_err());
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let err = Config::load_file(Path::new("/nonexistent/nocodeploy.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/nocodeploy.toml"));
    }

    #[test]
    fn test_env_overrides_host_and_url() {
        let (_dir, path) = write_config(SAMPLE);
        let mut config = Config::load_file(&path).unwrap();
        config.apply_overrides(env(&[
            (ENV_HOST, "10.0.0.5"),
            (ENV_API_URL, "http://10.0.0.5:13000"),
        ]));
        assert_eq!(config.host.host, "10.0.0.5");
        assert_eq!(config.api_url().unwrap(), "http://10.0.0.5:13000");
    }

    #[test]
    fn test_host_config_prefers_key() {
        let (_dir, path) = write_config(SAMPLE);
        let config = Config::load_file(&path).unwrap();
        let secrets = Secrets::from_lookup(env(&[(ENV_SSH_PASSWORD, "pw")]));
        let host = config.host_config(&secrets).unwrap();
        assert!(matches!(host.credentials, Credentials::KeyFile(_)));
        assert_eq!(host.user, "deploy");
    }

    #[test]
    fn test_host_config_password_from_env() {
        let mut config = Config::default();
        config.host.host = "cms".to_string();
        let secrets = Secrets::from_lookup(env(&[(ENV_SSH_PASSWORD, "pw")]));
        let host = config.host_config(&secrets).unwrap();
        assert_eq!(host.credentials, Credentials::Password("pw".to_string()));
        assert_eq!(host.command_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_zero_command_timeout_disables_limit() {
        let mut config = Config::default();
        config.host.host = "cms".to_string();
        config.host.command_timeout_secs = 0;
        let secrets = Secrets::from_lookup(env(&[(ENV_SSH_PASSWORD, "pw")]));
        let host = config.host_config(&secrets).unwrap();
        assert_eq!(host.command_timeout, None);
    }

    #[test]
    fn test_host_config_without_credentials_fails() {
        let mut config = Config::default();
        config.host.host = "cms".to_string();
        let err = config.host_config(&Secrets::default()).unwrap_err();
        assert!(err.to_string().contains(ENV_SSH_PASSWORD));
    }

    #[test]
    fn test_secrets_debug_masks_passwords() {
        let secrets = Secrets::from_lookup(env(&[
            (ENV_SSH_PASSWORD, "hunter2"),
            (ENV_API_PASSWORD, "s3cret"),
        ]));
        let debug = format!("{secrets:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_api_credentials_require_both() {
        let config = Config::default();
        let partial = Secrets::from_lookup(env(&[(ENV_API_ACCOUNT, "admin")]));
        assert!(config.api_credentials(&partial).is_err());
    }

    #[test]
    fn test_menu_tree_and_options() {
        let (_dir, path) = write_config(SAMPLE);
        let config = Config::load_file(&path).unwrap();
        let tree = config.menu_tree().unwrap();
        assert_eq!(tree.titles(), vec!["Talent", "Skills"]);

        let options = config.reconcile_options(Some(Strategy::Recreate), None);
        assert_eq!(options.strategy, Strategy::Recreate);
        assert_eq!(options.jobs, 4);
    }
}
