use anyhow::{Result, bail};
use colored::Colorize;

use crate::Context;
use crate::config::Config;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let config = load_validated(ctx)?;

    if !ctx.quiet {
        ui::header("Configuration");
        for descriptor in &config.resources {
            let deps = descriptor.dependencies();
            println!(
                "  {} {:<24} {} field(s){}",
                "✓".green(),
                descriptor.name,
                descriptor.fields.len(),
                if deps.is_empty() {
                    String::new()
                } else {
                    format!(" → {}", deps.join(", ")).dimmed().to_string()
                }
            );
        }
        if config.menus.parent.is_some() {
            let tree = config.menu_tree()?;
            println!(
                "  {} menu '{}' with {} link(s)",
                "✓".green(),
                tree.parent.title,
                tree.links.len()
            );
        }
        println!();
        ui::success(&format!(
            "{} resource(s) valid",
            config.resources.len()
        ));
    }
    Ok(())
}

/// Load the config file named on the command line (or the default one)
pub fn load_config(ctx: &Context) -> Result<Config> {
    let path = Config::resolve_path(ctx.config.as_deref())?;
    log::debug!("Loading config from {}", path.display());
    Config::load(&path)
}

/// Load the config and reject it unless every descriptor and the menu are valid
///
/// Runs before any connection is opened.
pub fn load_validated(ctx: &Context) -> Result<Config> {
    let config = load_config(ctx)?;
    check(&config)?;
    Ok(config)
}

pub fn check(config: &Config) -> Result<()> {
    if let Err(report) = scaffold::validate(&config.resources, &config.external_collections) {
        for issue in &report.issues {
            ui::error(&issue.to_string());
        }
        bail!("{} validation issue(s); nothing was deployed", report.issues.len());
    }
    if config.menus.parent.is_some() {
        let tree = config.menu_tree()?;
        if let Err(message) = tree.validate() {
            bail!("Invalid menu: {message}");
        }
    }
    Ok(())
}
