use anyhow::{Result, bail};
use colored::Colorize;
use menus::{
    ApiCredentials, HttpMenuApi, MenuApi, MenuPlan, MenuTree, PlannedParent, ReconcileOptions,
    ReconcileReport, Reconciler, RemoteMenu, Strategy,
};

use crate::Context;
use crate::cli::MenusCommand;
use crate::commands::{menu_error, validate};
use crate::config::{Config, Secrets};
use crate::progress::{PhaseProgress, finish_clear, spinner};
use crate::ui;

pub fn run(ctx: &Context, cmd: MenusCommand) -> Result<()> {
    let config = validate::load_config(ctx)?;
    let credentials = config.api_credentials(&Secrets::from_env())?;
    let api = HttpMenuApi::new(config.api_url()?, config.api_timeout())
        .with_endpoints(config.api.endpoints.clone());
    log::debug!("Menu API at {}", api.base_url());

    match cmd {
        MenusCommand::Sync {
            strategy,
            jobs,
            yes,
            json,
        } => {
            let tree = config.menu_tree()?;
            let options = config.reconcile_options(strategy, jobs);
            let report = sync(ctx, &api, &tree, &credentials, options, yes, json)?;
            if json {
                ui::json(&report)?;
            }
            Ok(())
        }
        MenusCommand::List { json } => list(ctx, &api, &config, &credentials, json),
        MenusCommand::Plan { strategy } => {
            let tree = config.menu_tree()?;
            let options = config.reconcile_options(strategy, None);
            let plan = Reconciler::new(&api, options)
                .plan(&tree, &credentials)
                .map_err(menu_error)?;
            display_plan(&plan);
            Ok(())
        }
    }
}

/// Plan, confirm deletions, then reconcile
///
/// Deleting entries needs either a yes at the prompt or `--yes`. Runs that
/// cannot prompt (quiet or JSON output) refuse to delete without `--yes`.
pub fn sync(
    ctx: &Context,
    api: &dyn MenuApi,
    tree: &MenuTree,
    credentials: &ApiCredentials,
    options: ReconcileOptions,
    yes: bool,
    json: bool,
) -> Result<ReconcileReport> {
    let interactive = !ctx.quiet && !json;
    let strategy = options.strategy;

    if !yes {
        let plan = Reconciler::new(api, options.clone())
            .plan(tree, credentials)
            .map_err(menu_error)?;
        if !plan.delete.is_empty() {
            if !interactive {
                bail!(
                    "Sync would delete {} menu entr{}; pass --yes to allow it",
                    plan.delete.len(),
                    if plan.delete.len() == 1 { "y" } else { "ies" }
                );
            }
            display_plan(&plan);
            println!();
            if !ui::confirm(&format!("Delete {} entries and sync?", plan.delete.len()))? {
                bail!("Menu sync cancelled");
            }
        }
    }

    if interactive {
        ui::header(&format!("Syncing menu '{}' ({strategy})", tree.parent.title));
    }
    let observer = PhaseProgress::new(interactive);
    let report = Reconciler::new(api, options)
        .with_cancel(ctx.cancel.flag())
        .with_observer(&observer)
        .sync(tree, credentials)
        .map_err(menu_error)?;

    if interactive {
        print_report(&report);
    }
    Ok(report)
}

fn list(
    ctx: &Context,
    api: &dyn MenuApi,
    config: &Config,
    credentials: &ApiCredentials,
    json: bool,
) -> Result<()> {
    let interactive = !ctx.quiet && !json;
    let pb = interactive.then(|| spinner("Listing menu entries"));
    let entries = Reconciler::new(api, config.reconcile_options(None, None))
        .list(credentials)
        .map_err(menu_error);
    if let Some(pb) = &pb {
        finish_clear(pb);
    }
    let entries = entries?;

    if json {
        return ui::json(&entries);
    }
    ui::header(&format!("Menu ({} entries)", entries.len()));
    for line in tree_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

/// Roots in sort order, each followed by its children
fn tree_lines(entries: &[RemoteMenu]) -> Vec<String> {
    fn sorted<'a>(mut items: Vec<&'a RemoteMenu>) -> Vec<&'a RemoteMenu> {
        items.sort_by_key(|m| (m.sort.unwrap_or(i64::MAX), m.id.as_str().to_string()));
        items
    }

    let roots = sorted(
        entries
            .iter()
            .filter(|m| {
                m.parent_id
                    .as_ref()
                    .is_none_or(|p| !entries.iter().any(|e| &e.id == p))
            })
            .collect(),
    );

    let mut lines = Vec::new();
    for root in roots {
        lines.push(format!("  {} {}", root.title.bold(), format!("#{}", root.id.as_str()).dimmed()));
        let children = sorted(
            entries
                .iter()
                .filter(|m| m.parent_id.as_ref() == Some(&root.id))
                .collect(),
        );
        for child in children {
            lines.push(format!(
                "    {} {} {}",
                "•".dimmed(),
                child.title,
                child.path.as_deref().unwrap_or_default().dimmed()
            ));
        }
    }
    lines
}

pub fn display_plan(plan: &MenuPlan) {
    ui::header(&format!("Menu plan ({})", plan.strategy));

    for item in &plan.delete {
        println!(
            "  {} {} {}",
            "-".red(),
            item.menu.title,
            format!("#{}", item.menu.id.as_str()).dimmed()
        );
    }
    match &plan.parent {
        PlannedParent::Create { menu } => println!("  {} {}", "+".green(), menu.title),
        PlannedParent::Existing { menu } => {
            println!("  {} {}", "=".dimmed(), menu.title.dimmed());
        }
    }
    for item in &plan.update {
        let mut changes = Vec::new();
        if let Some(icon) = &item.patch.icon {
            changes.push(format!("icon {icon}"));
        }
        if let Some(sort) = item.patch.sort {
            changes.push(format!("sort {sort}"));
        }
        println!(
            "  {} {} {}",
            "~".yellow(),
            item.menu.title,
            changes.join(", ").dimmed()
        );
    }
    for item in &plan.create {
        println!(
            "  {} {} {}",
            "+".green(),
            item.link.title,
            format!("→ {}", item.link.path).dimmed()
        );
    }
    for menu in &plan.keep {
        println!("  {} {}", "=".dimmed(), menu.title.dimmed());
    }

    println!();
    if plan.is_noop() {
        ui::success("Menu is up to date");
    } else {
        ui::info(&format!(
            "{} to delete, {} to update, {} to create",
            plan.delete.len(),
            plan.update.len(),
            plan.create.len()
                + usize::from(matches!(plan.parent, PlannedParent::Create { .. }))
        ));
    }
}

fn print_report(report: &ReconcileReport) {
    ui::section("Summary");
    ui::kv("Deleted", &report.deleted.len().to_string());
    ui::kv("Created", &report.created.len().to_string());
    if report.strategy == Strategy::Diff {
        ui::kv("Updated", &report.updated.len().to_string());
        ui::kv("Kept", &report.kept.len().to_string());
    }

    if !report.failures.is_empty() {
        println!();
        for failure in &report.failures {
            ui::error(&format!(
                "{} '{}': {}",
                failure.operation, failure.title, failure.error
            ));
        }
    }

    println!();
    let v = &report.verification;
    if !v.checked {
        ui::warn("Menu could not be verified; run `nocodeploy menus list` to inspect it");
        return;
    }
    if v.is_clean() {
        ui::success(&format!("Menu verified: 1 group, {} link(s)", v.children));
        return;
    }
    ui::warn(&format!(
        "Menu does not match the declaration ({} group(s), {} link(s))",
        v.parents, v.children
    ));
    for (label, titles) in [
        ("missing", &v.missing),
        ("duplicated", &v.duplicates),
        ("unexpected", &v.unexpected),
    ] {
        if !titles.is_empty() {
            ui::kv(label, &titles.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::CancelToken;
    use menus::{MemoryMenuApi, MenuGroup, NewMenu};

    fn ctx() -> Context {
        Context {
            verbose: 0,
            quiet: true,
            config: None,
            cancel: CancelToken::new(),
        }
    }

    fn tree() -> MenuTree {
        MenuTree::new("Talent")
            .with_link("Skills", "/admin/x/skills")
            .with_link("Offers", "/admin/x/offers")
    }

    fn credentials() -> ApiCredentials {
        ApiCredentials::new("admin", "secret")
    }

    fn seed_stale(api: &MemoryMenuApi) {
        api.seed(NewMenu::group(&MenuGroup {
            title: "Talent".to_string(),
            icon: None,
            sort: None,
        }));
    }

    #[test]
    fn test_sync_creates_declared_menu() {
        let api = MemoryMenuApi::new("admin", "secret");
        let report = sync(
            &ctx(),
            &api,
            &tree(),
            &credentials(),
            ReconcileOptions::default(),
            false,
            true,
        )
        .unwrap();

        assert!(report.is_success());
        assert_eq!(report.created.len(), 3);
        assert_eq!(api.entries().len(), 3);
    }

    #[test]
    fn test_sync_refuses_unprompted_delete() {
        let api = MemoryMenuApi::new("admin", "secret");
        seed_stale(&api);

        let err = sync(
            &ctx(),
            &api,
            &tree(),
            &credentials(),
            ReconcileOptions::default(),
            false,
            true,
        )
        .unwrap_err();

        assert!(err.to_string().contains("--yes"));
        assert_eq!(api.entries().len(), 1);
    }

    #[test]
    fn test_sync_with_yes_replaces_stale_entries() {
        let api = MemoryMenuApi::new("admin", "secret");
        seed_stale(&api);

        let report = sync(
            &ctx(),
            &api,
            &tree(),
            &credentials(),
            ReconcileOptions::default(),
            true,
            true,
        )
        .unwrap();

        assert_eq!(report.deleted, vec!["Talent".to_string()]);
        assert!(report.verification.is_clean());
        assert_eq!(api.entries().len(), 3);
    }

    #[test]
    fn test_sync_cancelled_before_start() {
        let api = MemoryMenuApi::new("admin", "secret");
        let ctx = ctx();
        ctx.cancel.cancel();

        let result = sync(
            &ctx,
            &api,
            &tree(),
            &credentials(),
            ReconcileOptions::default(),
            true,
            true,
        );

        assert!(result.is_err());
        assert!(api.entries().is_empty());
    }

    #[test]
    fn test_wrong_password_is_reported() {
        let api = MemoryMenuApi::new("admin", "secret");
        let err = sync(
            &ctx(),
            &api,
            &tree(),
            &ApiCredentials::new("admin", "nope"),
            ReconcileOptions::default(),
            true,
            true,
        )
        .unwrap_err();

        assert!(format!("{err:#}").to_lowercase().contains("auth"));
    }

    #[test]
    fn test_tree_lines_nests_children_in_order() {
        colored::control::set_override(false);
        let api = MemoryMenuApi::new("admin", "secret");
        sync(
            &ctx(),
            &api,
            &tree(),
            &credentials(),
            ReconcileOptions::default(),
            true,
            true,
        )
        .unwrap();

        let lines = tree_lines(&api.entries());

        assert_eq!(lines.len(), 3);
        assert!(lines[0].trim_start().starts_with("Talent"));
        assert!(lines[1].contains("Skills"));
        assert!(lines[2].contains("Offers"));
    }
}
