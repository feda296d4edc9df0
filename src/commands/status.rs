use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{ApplyContext, ResourceDiff, ResourceState, compute_diffs};
use remote::{RemoteShell, with_session};

use crate::Context;
use crate::commands::{remote_error, validate};
use crate::config::{Config, Secrets};
use crate::engine::build_plan;
use crate::engine::differ::{display_diff, display_file_diffs};
use crate::resource::PluginResource;
use crate::ui;

/// Show every plugin with its state on the host
pub fn status(ctx: &Context, target: Option<&str>) -> Result<()> {
    let config = validate::load_validated(ctx)?;
    let plan = build_plan(&config.resources, &config.deploy, target, false)?;
    let host_config = config.host_config(&Secrets::from_env())?;

    let diffs = with_session(&host_config, |session| {
        let apply = ApplyContext::new(session, false, ctx.verbose > 0);
        compute_diffs(&plan.resources, &apply)
    })
    .map_err(remote_error)
    .with_context(|| format!("Could not connect to {}", host_config.destination()))??;

    ui::header(&format!("Plugin Status ({})", host_config.destination()));
    ui::kv("Plugin root", &config.deploy.plugin_root);
    println!();

    for resource in &plan.resources {
        let id = resource.id();
        let diff = diffs.iter().find(|d| d.resource_id == id);
        let (symbol, state) = match diff.map(|d| &d.current) {
            None => ("✓".green(), "deployed".to_string()),
            Some(ResourceState::Absent) => ("+".green(), "not deployed".to_string()),
            Some(ResourceState::Modified { from, .. }) => {
                ("~".yellow(), format!("drifted ({from})"))
            }
            Some(_) => ("?".dimmed(), "unknown".to_string()),
        };
        println!(
            "  {} {:<24} {:<16} {}",
            symbol,
            id,
            state,
            resource.description().dimmed()
        );
    }

    println!();
    if diffs.is_empty() {
        ui::success("Everything is deployed");
    } else {
        ui::info(&format!(
            "{} of {} plugin(s) need a deploy",
            diffs.len(),
            plan.total_resources()
        ));
    }
    Ok(())
}

/// Show what a deploy would change, down to file content
pub fn diff(ctx: &Context, target: Option<&str>) -> Result<()> {
    let config = validate::load_validated(ctx)?;
    let plan = build_plan(&config.resources, &config.deploy, target, false)?;
    let ids: Vec<String> = plan.resources.iter().map(|r| r.id()).collect();
    let plugins = plugins_for(&config, &ids)?;
    let host_config = config.host_config(&Secrets::from_env())?;

    with_session(&host_config, |session| -> Result<()> {
        let apply = ApplyContext::new(session, false, ctx.verbose > 0);
        let diffs = compute_diffs(&plan.resources, &apply)?;
        display_diff(&diffs);
        show_file_diffs(session, &plugins, &diffs)
    })
    .map_err(remote_error)
    .with_context(|| format!("Could not connect to {}", host_config.destination()))?
}

fn plugins_for(config: &Config, ids: &[String]) -> Result<Vec<PluginResource>> {
    let options = config.deploy.render_options();
    config
        .resources
        .iter()
        .filter(|d| ids.contains(&d.name))
        .map(|d| PluginResource::new(d, &config.deploy.plugin_root, &options))
        .collect()
}

fn show_file_diffs(
    remote: &dyn RemoteShell,
    plugins: &[PluginResource],
    diffs: &[ResourceDiff],
) -> Result<()> {
    for plugin in plugins {
        let changed = diffs.iter().any(|d| {
            d.resource_id == plugin.name && matches!(d.current, ResourceState::Modified { .. })
        });
        if changed {
            let copies = plugin.read_remote(remote)?;
            display_file_diffs(&plugin.name, &copies);
        }
    }
    Ok(())
}
