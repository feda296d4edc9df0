use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::AutoConfirm;
use remote::{MemoryHost, with_session};
use std::time::Duration;

use crate::Context;
use crate::cli::DeployArgs;
use crate::commands::{remote_error, validate};
use crate::config::{Config, Secrets};
use crate::engine::executor::print_summary;
use crate::engine::{DeployOptions, DeployReport, build_plan, deploy};
use crate::progress::DeployProgress;
use crate::ui;

pub fn run(ctx: &Context, args: DeployArgs) -> Result<()> {
    let config = validate::load_validated(ctx)?;
    let interactive = !ctx.quiet && !args.json;

    let report = if args.dry_run {
        preview(ctx, &config, &args, interactive)?
    } else {
        live(ctx, &config, &args, interactive)?
    };

    if args.json {
        ui::json(&report)?;
    } else if !ctx.quiet {
        print_summary(&report);
    }

    if report.cancelled {
        bail!("Deploy cancelled");
    }
    Ok(())
}

fn options(ctx: &Context, config: &Config, preview: bool, interactive: bool) -> DeployOptions {
    DeployOptions {
        preview,
        verbose: ctx.verbose > 0,
        interactive,
        settle: Duration::from_secs(config.deploy.settle_secs),
        log_file: config.deploy.log_file.clone(),
        log_lines: config.deploy.log_lines,
    }
}

/// Deploy into an in-memory host and list what would be written
fn preview(
    ctx: &Context,
    config: &Config,
    args: &DeployArgs,
    interactive: bool,
) -> Result<DeployReport> {
    let plan = build_plan(&config.resources, &config.deploy, args.only.as_deref(), false)?;
    let host = MemoryHost::new(if config.host.host.is_empty() {
        "preview".to_string()
    } else {
        config.host.host.clone()
    });

    if interactive {
        ui::header("Deploy preview (nothing is written)");
    }
    let opts = options(ctx, config, true, interactive);
    let mut progress = DeployProgress::new(interactive);
    let report = deploy(&plan, &opts, &host, &ctx.cancel, &mut progress, &mut AutoConfirm)?;

    if interactive {
        ui::section("Files");
        for path in host.paths() {
            println!("  {} {}", "+".green(), path);
        }
        if !args.no_restart && !config.deploy.restart_command.is_empty() {
            ui::dim(&format!(
                "then `{}`, wait {}s",
                config.deploy.restart_command, config.deploy.settle_secs
            ));
        }
    }
    Ok(report)
}

fn live(
    ctx: &Context,
    config: &Config,
    args: &DeployArgs,
    interactive: bool,
) -> Result<DeployReport> {
    let plan = build_plan(
        &config.resources,
        &config.deploy,
        args.only.as_deref(),
        !args.no_restart,
    )?;
    let host_config = config.host_config(&Secrets::from_env())?;

    if interactive {
        ui::header(&format!("Deploying to {}", host_config.destination()));
        ui::kv("Plugins", &plan.total_resources().to_string());
        ui::kv("Plugin root", &config.deploy.plugin_root);
    }

    let opts = options(ctx, config, false, interactive);
    let mut progress = DeployProgress::new(interactive);
    let mut confirm = ui::PromptConfirm { yes: args.yes };

    let outcome = with_session(&host_config, |session| {
        deploy(&plan, &opts, session, &ctx.cancel, &mut progress, &mut confirm)
    })
    .map_err(remote_error)
    .with_context(|| format!("Could not connect to {}", host_config.destination()))?;

    outcome.context("Deploy aborted")
}
