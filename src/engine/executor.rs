//! Deploy execution - converge plugins, restart, settle, show logs

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use declarative::{
    CancelToken, ConfirmCallback, ExecuteOptions, ExecuteSummary, ExecutionPlan,
    PostActionOutcome, ProgressCallback, ResourceOutcome,
};
use remote::{RemoteShell, quote};
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

use crate::progress;
use crate::ui;

const SETTLE_TICK: Duration = Duration::from_millis(250);

/// Options for a deploy run
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Running against an in-memory copy of the host
    pub preview: bool,
    pub verbose: bool,
    /// Show spinners
    pub interactive: bool,
    /// Wait after the restart before reading logs
    pub settle: Duration,
    pub log_file: Option<String>,
    pub log_lines: usize,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            preview: false,
            verbose: false,
            interactive: false,
            settle: Duration::from_secs(30),
            log_file: None,
            log_lines: 50,
        }
    }
}

/// Recent lines of the application log, for the operator only
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogTail {
    pub path: String,
    pub exit_code: i32,
    pub content: String,
}

/// Everything a deploy did, in order
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub preview: bool,
    pub summary: ExecuteSummary,
    pub outcomes: Vec<ResourceOutcome>,
    pub restart: Option<PostActionOutcome>,
    pub log_tail: Option<LogTail>,
    pub cancelled: bool,
}

impl DeployReport {
    pub fn failures(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.outcomes.iter().filter(|o| !o.result.is_success())
    }
}

/// Deploy every plugin in the plan, then restart and observe
///
/// Plugins are applied one at a time; a failing plugin is recorded and the
/// loop continues. Fatal transport errors abort with `Err`. The restart
/// (the plan's post action) runs once after the loop, followed by the
/// settling delay and a log tail. Cancellation is honoured between plugins
/// and during the settling delay.
pub fn deploy<P, C>(
    plan: &ExecutionPlan,
    opts: &DeployOptions,
    remote: &dyn RemoteShell,
    cancel: &CancelToken,
    progress: &mut P,
    confirm: &mut C,
) -> Result<DeployReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let started_at = Utc::now();
    let exec_opts = ExecuteOptions {
        dry_run: false,
        verbose: opts.verbose,
    };
    let executed = declarative::execute(plan, &exec_opts, remote, cancel, progress, confirm)?;

    let mut report = DeployReport {
        host: remote.host().to_string(),
        started_at,
        finished_at: started_at,
        preview: opts.preview,
        summary: executed.summary(),
        cancelled: executed.cancelled,
        outcomes: executed.outcomes,
        restart: executed.post_actions.into_iter().next(),
        log_tail: None,
    };

    if report.restart.is_some() && !report.cancelled {
        if settle(opts.settle, cancel, opts.interactive) {
            if let Some(path) = &opts.log_file {
                report.log_tail = tail_log(remote, path, opts.log_lines);
            }
        } else {
            report.cancelled = true;
        }
    }

    report.finished_at = Utc::now();
    Ok(report)
}

/// Sleep for `duration` unless cancelled first. Returns false if cancelled.
pub fn settle(duration: Duration, cancel: &CancelToken, interactive: bool) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }

    log::info!("Waiting {}s for the application to settle", duration.as_secs());
    let spinner = interactive.then(|| {
        progress::spinner(&format!(
            "Waiting {}s for the application to settle...",
            duration.as_secs()
        ))
    });

    let deadline = Instant::now() + duration;
    let mut completed = true;
    loop {
        if cancel.is_cancelled() {
            completed = false;
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(SETTLE_TICK.min(remaining));
    }

    if let Some(pb) = spinner {
        progress::finish_clear(&pb);
    }
    completed
}

/// Read the end of a remote log. Failures are logged, never raised.
fn tail_log(remote: &dyn RemoteShell, path: &str, lines: usize) -> Option<LogTail> {
    let command = format!("tail -n {lines} {}", quote(path));
    match remote.exec(&command, None) {
        Ok(output) => {
            let content = if output.success() {
                output.stdout_str()
            } else {
                output.stderr_str()
            };
            Some(LogTail {
                path: path.to_string(),
                exit_code: output.exit_code,
                content,
            })
        }
        Err(e) => {
            log::warn!("Could not read {path}: {e}");
            None
        }
    }
}

/// Print final summary
pub fn print_summary(report: &DeployReport) {
    let summary = &report.summary;
    println!();
    if report.cancelled {
        println!("  {} Deploy cancelled", "✗".red().bold());
    } else if summary.is_success() {
        println!("  {} Deploy finished", "✓".green().bold());
    } else {
        println!("  {} Deploy finished with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} plugins created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} plugins updated", summary.modified);
    }
    if summary.no_change > 0 {
        println!("    • {} plugins unchanged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} plugins skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "plugins".red());
        for failure in report.failures() {
            if let declarative::ApplyResult::Failed { error } = &failure.result {
                println!("      {} {}: {}", "✗".red(), failure.id, error.dimmed());
            }
        }
    }

    if let Some(restart) = &report.restart {
        if restart.is_success() {
            println!("    • restarted with `{}`", restart.command);
        } else {
            println!(
                "    • {} `{}` exited with {}",
                "⚠".yellow(),
                restart.command,
                restart.exit_code
            );
            for line in ui::tail_lines(&restart.stderr, 5) {
                println!("      {}", line.dimmed());
            }
        }
    }

    if let Some(tail) = &report.log_tail {
        println!();
        println!("  {} {}", "Log tail:".bold(), tail.path.dimmed());
        for line in tail.content.lines() {
            println!("    {}", line.dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeploySection;
    use crate::engine::planner::build_plan;
    use declarative::{ApplyResult, AutoConfirm, AutoDecline, NoProgress};
    use remote::{CommandOutput, MemoryHost};
    use scaffold::{DataType, FieldSpec, ResourceDescriptor};

    fn section() -> DeploySection {
        DeploySection {
            plugin_root: "/srv/plugins".to_string(),
            settle_secs: 0,
            ..DeploySection::default()
        }
    }

    fn options() -> DeployOptions {
        DeployOptions {
            settle: Duration::ZERO,
            log_file: Some("/var/log/cms/out.log".to_string()),
            log_lines: 20,
            ..DeployOptions::default()
        }
    }

    fn five() -> Vec<ResourceDescriptor> {
        ["skills", "rfp", "offers", "clients", "vendors"]
            .into_iter()
            .map(|name| {
                ResourceDescriptor::new(name).with_field(FieldSpec::new("title", DataType::String))
            })
            .collect()
    }

    fn run(host: &MemoryHost, descriptors: &[ResourceDescriptor]) -> DeployReport {
        let plan = build_plan(descriptors, &section(), None, true).unwrap();
        deploy(
            &plan,
            &options(),
            host,
            &CancelToken::new(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap()
    }

    #[test]
    fn test_third_of_five_fails_others_succeed() {
        let host = MemoryHost::new("cms");
        host.fail_under("/srv/plugins/@nocodeploy/plugin-offers");

        let report = run(&host, &five());

        let results: Vec<(&str, bool)> = report
            .outcomes
            .iter()
            .map(|o| (o.id.as_str(), o.result.is_success()))
            .collect();
        assert_eq!(
            results,
            vec![
                ("skills", true),
                ("rfp", true),
                ("offers", false),
                ("clients", true),
                ("vendors", true),
            ]
        );
        assert_eq!(report.summary.created, 4);
        assert_eq!(report.summary.failed, 1);
        assert!(
            host.file("/srv/plugins/@nocodeploy/plugin-vendors/package.json")
                .is_some()
        );
        // Restart still runs after a partial failure
        assert!(report.restart.is_some());
    }

    #[test]
    fn test_second_deploy_is_no_change() {
        let host = MemoryHost::new("cms");
        let first = run(&host, &five());
        assert_eq!(first.summary.created, 5);
        let files = host.snapshot();

        let second = run(&host, &five());
        assert_eq!(second.summary.no_change, 5);
        assert_eq!(second.summary.total_changes(), 0);
        assert_eq!(host.snapshot(), files);
    }

    #[test]
    fn test_reshaped_descriptor_rewrites_without_stale_files() {
        let host = MemoryHost::new("cms");
        let v1 = vec![
            ResourceDescriptor::new("rfp").with_field(FieldSpec::new("title", DataType::String)),
        ];
        run(&host, &v1);
        let paths = host.paths();

        let v2 = vec![
            ResourceDescriptor::new("rfp")
                .with_field(FieldSpec::new("summary", DataType::Text))
                .with_field(FieldSpec::belongs_to("client", "organizations")),
        ];
        let report = run(&host, &v2);
        assert_eq!(report.outcomes[0].result, ApplyResult::Modified);
        assert_eq!(host.paths(), paths);

        let server = host
            .file("/srv/plugins/@nocodeploy/plugin-rfp/src/server/index.js")
            .unwrap();
        let server = String::from_utf8(server).unwrap();
        assert!(server.contains("summary"));
        assert!(server.contains("client_id"));
    }

    #[test]
    fn test_restart_then_log_tail() {
        let host = MemoryHost::new("cms");
        host.respond("tail -n 20", CommandOutput::new("ready on :13000\n", "", 0));

        let report = run(&host, &five());

        let commands = host.commands();
        let restart = commands.iter().position(|c| c == "pm2 restart all").unwrap();
        let tail = commands
            .iter()
            .position(|c| c == "tail -n 20 '/var/log/cms/out.log'")
            .unwrap();
        assert!(restart < tail);
        assert_eq!(
            report.log_tail.unwrap().content,
            "ready on :13000\n".to_string()
        );
    }

    #[test]
    fn test_restart_failure_is_reported_not_raised() {
        let host = MemoryHost::new("cms");
        host.respond("pm2", CommandOutput::new("", "pm2: command not found", 127));

        let report = run(&host, &five());
        let restart = report.restart.unwrap();
        assert_eq!(restart.exit_code, 127);
        assert_eq!(report.summary.created, 5);
    }

    #[test]
    fn test_log_error_text_is_kept_verbatim() {
        let host = MemoryHost::new("cms");
        host.respond(
            "tail",
            CommandOutput::new("", "tail: cannot open '/var/log/cms/out.log'", 1),
        );
        let report = run(&host, &five());
        let tail = report.log_tail.unwrap();
        assert_eq!(tail.exit_code, 1);
        assert!(tail.content.contains("cannot open"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let host = MemoryHost::new("cms");
        let plan = build_plan(&five(), &section(), None, true).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = deploy(
            &plan,
            &options(),
            &host,
            &cancel,
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();
        assert!(report.cancelled);
        assert!(report.restart.is_none());
        assert!(host.paths().is_empty());
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_declined_writes_nothing() {
        let host = MemoryHost::new("cms");
        let plan = build_plan(&five(), &section(), None, true).unwrap();
        let report = deploy(
            &plan,
            &options(),
            &host,
            &CancelToken::new(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(report.summary.skipped, 5);
        assert!(report.restart.is_none());
        assert!(host.paths().is_empty());
    }

    #[test]
    fn test_settle_stops_on_cancel() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert!(!settle(Duration::from_secs(30), &cancel, false));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(settle(Duration::ZERO, &CancelToken::new(), false));
    }

    #[test]
    fn test_report_serializes() {
        let host = MemoryHost::new("cms");
        let report = run(&host, &five()[..1]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["host"], "cms");
        assert_eq!(value["outcomes"][0]["result"]["status"], "created");
        assert!(value["started_at"].is_string());
    }
}
