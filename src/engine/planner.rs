//! Execution planner - turns the configured descriptors into a plan

use anyhow::{Result, bail};
use declarative::{ExecutionPlan, PostAction};
use scaffold::ResourceDescriptor;

use crate::config::DeploySection;
use crate::resource::PluginResource;

/// Build one plugin resource per descriptor, in declaration order
///
/// `target` narrows the plan the same way `--only` does on the command
/// line: `plugin`, `plugin.<name>` or a name fragment. The restart command
/// is attached as the single post action when `restart` is set.
pub fn build_plan(
    descriptors: &[ResourceDescriptor],
    deploy: &DeploySection,
    target: Option<&str>,
    restart: bool,
) -> Result<ExecutionPlan> {
    let options = deploy.render_options();
    let mut plan = ExecutionPlan::new();
    for descriptor in descriptors {
        let resource = PluginResource::new(descriptor, &deploy.plugin_root, &options)?;
        plan.add_resource(Box::new(resource));
    }

    let mut plan = plan.filter_by_target(target);
    if let Some(target) = target
        && plan.is_empty()
    {
        bail!("No resource matches '{target}'");
    }

    if restart && !deploy.restart_command.trim().is_empty() {
        plan.add_post_action(PostAction::new(
            "Restart application",
            deploy.restart_command.clone(),
        ));
    }
    Ok(plan)
}
