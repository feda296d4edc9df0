//! Execution engine - applies resources in order with per-resource isolation

use crate::context::{ApplyContext, CancelToken, ConfirmCallback, ProgressCallback};
use crate::planner::{ExecutionPlan, PostAction};
use crate::resource::Resource;
use crate::types::{
    ApplyResult, ExecuteOptions, ExecuteReport, PostActionOutcome, ResourceOutcome,
};
use anyhow::Result;
use remote::RemoteShell;

/// Execute a plan against a host
///
/// Resources run one at a time in plan order. A failing resource is
/// recorded and the run moves on; only fatal transport errors (lost
/// connection, rejected credentials) abort and are returned as `Err`.
/// Post actions run once after the last resource, unless this is a dry
/// run, the user declined, or the run was cancelled.
///
/// # Arguments
/// * `plan` - The execution plan to run
/// * `opts` - Execution options (dry_run, verbose)
/// * `remote` - Host the plan is applied to
/// * `cancel` - Checked before each resource and before post actions
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    remote: &dyn RemoteShell,
    cancel: &CancelToken,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let ctx = ApplyContext::new(remote, opts.dry_run, opts.verbose);
    let mut report = ExecuteReport::default();

    if plan.is_empty() {
        return Ok(report);
    }

    if !opts.dry_run {
        let prompt = format!(
            "Deploy {} resource(s) to {}?",
            plan.total_resources(),
            remote.host()
        );
        if !confirm.confirm(&prompt)? {
            report.outcomes = plan
                .resources
                .iter()
                .map(|r| outcome(r.as_ref(), skipped("declined")))
                .collect();
            return Ok(report);
        }
    }

    progress.on_batch_start(plan.total_resources());
    for resource in &plan.resources {
        if cancel.is_cancelled() {
            report.cancelled = true;
            report
                .outcomes
                .push(outcome(resource.as_ref(), skipped("cancelled")));
            continue;
        }

        let id = resource.id();
        progress.on_resource_start(&id, &resource.description());
        let result = if opts.dry_run {
            preview_resource(resource.as_ref(), &ctx)?
        } else {
            apply_resource(resource.as_ref(), &ctx)?
        };
        progress.on_resource_complete(&id, &result);
        report.outcomes.push(outcome(resource.as_ref(), result));
    }
    progress.on_batch_complete();

    if opts.dry_run || report.cancelled {
        return Ok(report);
    }
    if cancel.is_cancelled() {
        report.cancelled = true;
        return Ok(report);
    }

    for action in &plan.post_actions {
        progress.on_post_action(&action.description);
        report.post_actions.push(run_post_action(action, remote)?);
    }

    Ok(report)
}

/// Whether an error should stop the whole run rather than one resource
pub fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<remote::Error>())
        .is_some_and(remote::Error::is_fatal)
}

/// Apply a single resource, turning non-fatal errors into `Failed`
fn apply_resource(resource: &dyn Resource, ctx: &ApplyContext) -> Result<ApplyResult> {
    match resource.apply(ctx) {
        Ok(result) => Ok(result),
        Err(e) if is_fatal(&e) => Err(e),
        Err(e) => {
            log::warn!("{} failed: {e:#}", resource.id());
            Ok(ApplyResult::Failed {
                error: format!("{e:#}"),
            })
        }
    }
}

/// Report what applying would do without touching the host
fn preview_resource(resource: &dyn Resource, ctx: &ApplyContext) -> Result<ApplyResult> {
    match resource.needs_apply(ctx) {
        Ok(false) => Ok(ApplyResult::NoChange),
        Ok(true) => Ok(skipped("dry run")),
        Err(e) if is_fatal(&e) => Err(e),
        Err(e) => Ok(ApplyResult::Failed {
            error: format!("{e:#}"),
        }),
    }
}

fn run_post_action(action: &PostAction, remote: &dyn RemoteShell) -> Result<PostActionOutcome> {
    log::info!("Running post action: {}", action.command);
    let output = remote.exec(&action.command, None)?;
    if !output.success() {
        log::warn!(
            "Post action '{}' exited with {}: {}",
            action.description,
            output.exit_code,
            output.stderr_str().trim()
        );
    }
    Ok(PostActionOutcome {
        description: action.description.clone(),
        command: action.command.clone(),
        exit_code: output.exit_code,
        stderr: output.stderr_str(),
    })
}

fn outcome(resource: &dyn Resource, result: ApplyResult) -> ResourceOutcome {
    ResourceOutcome {
        id: resource.id(),
        resource_type: resource.resource_type().to_string(),
        description: resource.description(),
        result,
    }
}

fn skipped(reason: &str) -> ApplyResult {
    ApplyResult::Skipped {
        reason: reason.to_string(),
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    remote: &dyn RemoteShell,
) -> Result<ExecuteReport> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(
        plan,
        opts,
        remote,
        &CancelToken::new(),
        &mut NoProgress,
        &mut AutoConfirm,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoDecline, NoProgress};
    use crate::types::ResourceState;
    use remote::{CommandOutput, MemoryHost};

    #[derive(Debug)]
    struct FileResource {
        path: &'static str,
    }

    impl Resource for FileResource {
        fn id(&self) -> String {
            self.path.to_string()
        }

        fn description(&self) -> String {
            format!("File {}", self.path)
        }

        fn resource_type(&self) -> &'static str {
            "file"
        }

        fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
            Ok(match ctx.remote.read_file(self.path)? {
                Some(_) => ResourceState::Present { details: None },
                None => ResourceState::Absent,
            })
        }

        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }

        fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
            let existed = ctx.remote.read_file(self.path)?.is_some();
            ctx.remote.mkdir_p(remote::shell::parent(self.path))?;
            ctx.remote.write_file(self.path, b"content")?;
            Ok(if existed {
                ApplyResult::NoChange
            } else {
                ApplyResult::Created
            })
        }
    }

    /// Shell that has lost its connection
    struct DeadHost;

    impl RemoteShell for DeadHost {
        fn host(&self) -> &str {
            "dead"
        }

        fn exec(&self, _command: &str, _stdin: Option<&[u8]>) -> remote::Result<CommandOutput> {
            Err(remote::Error::connectivity("dead", "connection reset"))
        }
    }

    fn plan(paths: &[&'static str]) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        for path in paths {
            plan.add_resource(Box::new(FileResource { path }));
        }
        plan.add_post_action(PostAction::new("restart", "restart-app"));
        plan
    }

    #[test]
    fn test_execute_empty_plan() {
        let host = MemoryHost::new("h");
        let report =
            execute_simple(&ExecutionPlan::new(), &ExecuteOptions::default(), &host).unwrap();
        assert!(report.outcomes.is_empty());
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_failure_is_isolated() {
        let host = MemoryHost::new("h");
        host.fail_under("/srv/c");
        let plan = plan(&["/srv/a/f", "/srv/b/f", "/srv/c/f", "/srv/d/f"]);

        let report = execute_simple(&plan, &ExecuteOptions::default(), &host).unwrap();

        let summary = report.summary();
        assert_eq!(summary.created, 3);
        assert_eq!(summary.failed, 1);
        assert!(!report.outcome("/srv/c/f").unwrap().result.is_success());
        assert!(host.file("/srv/d/f").is_some());
        assert_eq!(report.post_actions.len(), 1);
        assert_eq!(host.commands(), vec!["restart-app".to_string()]);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let host = MemoryHost::new("h");
        host.insert_file("/srv/a/f", "old");
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };

        let report = execute_simple(&plan(&["/srv/a/f", "/srv/b/f"]), &opts, &host).unwrap();

        assert_eq!(report.outcomes[0].result, ApplyResult::NoChange);
        assert!(matches!(report.outcomes[1].result, ApplyResult::Skipped { .. }));
        assert!(host.file("/srv/b/f").is_none());
        assert!(report.post_actions.is_empty());
    }

    #[test]
    fn test_declined_skips_everything() {
        let host = MemoryHost::new("h");
        let report = execute(
            &plan(&["/srv/a/f"]),
            &ExecuteOptions::default(),
            &host,
            &CancelToken::new(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(report.summary().skipped, 1);
        assert!(host.paths().is_empty());
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_cancelled_run_skips_remaining_and_post_actions() {
        let host = MemoryHost::new("h");
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = execute(
            &plan(&["/srv/a/f", "/srv/b/f"]),
            &ExecuteOptions::default(),
            &host,
            &cancel,
            &mut NoProgress,
            &mut crate::context::AutoConfirm,
        )
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.summary().skipped, 2);
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_connectivity_loss_aborts() {
        let err = execute_simple(&plan(&["/srv/a/f"]), &ExecuteOptions::default(), &DeadHost)
            .unwrap_err();
        assert!(is_fatal(&err));
    }

    #[test]
    fn test_non_fatal_error_not_classified_fatal() {
        let err = anyhow::Error::new(remote::Error::RemoteCommand {
            command: "mkdir".to_string(),
            exit_code: 1,
            stderr: String::new(),
        });
        assert!(!is_fatal(&err));
        assert!(!is_fatal(&anyhow::anyhow!("plain")));
    }
}
