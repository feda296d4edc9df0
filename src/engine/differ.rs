//! Diff display - plugin state table and per-file content diffs

use colored::Colorize;
use declarative::{DiffSummary, ResourceDiff, ResourceState, group_by_type};
use similar::{ChangeTag, TextDiff};

use crate::resource::RemoteCopy;

/// Display a list of diffs in a user-friendly format
pub fn display_diff(diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Deploy Diff".bold()
    );
    println!("│");

    for (resource_type, type_diffs) in &group_by_type(diffs) {
        let type_name = match resource_type.as_str() {
            "plugin" => "Plugins",
            other => other,
        };
        println!("│ {}", type_name.bold());

        for diff in type_diffs {
            let symbol = match (&diff.current, &diff.desired) {
                (ResourceState::Absent, ResourceState::Present { .. }) => "+".green(),
                (ResourceState::Present { .. }, ResourceState::Absent) => "-".red(),
                (ResourceState::Modified { .. }, _) | (_, ResourceState::Modified { .. }) => {
                    "~".yellow()
                }
                _ => "?".dimmed(),
            };

            let state_desc = match (&diff.current, &diff.desired) {
                (ResourceState::Absent, ResourceState::Present { details }) => format!(
                    "(not deployed){}",
                    details
                        .as_ref()
                        .map(|d| format!(" → {d}"))
                        .unwrap_or_default()
                ),
                (ResourceState::Modified { from, to }, _) => format!("{from} → {to}"),
                (ResourceState::Unknown, _) => "(state unknown)".to_string(),
                _ => String::new(),
            };

            println!(
                "│   {} {:<30} {}",
                symbol,
                diff.resource_id,
                state_desc.dimmed()
            );
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} new, {} changed, {} unknown)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.unknown.to_string().dimmed()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Unified diff of one managed file, remote on the left
///
/// Returns `None` when the remote copy already matches.
pub fn file_diff(copy: &RemoteCopy) -> Option<String> {
    if copy.is_current() {
        return None;
    }
    let remote = copy
        .remote
        .as_deref()
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    let diff = TextDiff::from_lines(remote.as_ref(), copy.rendered.as_str());
    Some(
        diff.unified_diff()
            .context_radius(3)
            .header(&format!("remote/{}", copy.path), &format!("rendered/{}", copy.path))
            .to_string(),
    )
}

/// Print the content diffs for a plugin's files
pub fn display_file_diffs(plugin: &str, copies: &[RemoteCopy]) {
    for copy in copies {
        if copy.is_current() {
            continue;
        }
        println!();
        println!("{} {}", plugin.bold(), copy.path.cyan());
        let remote = copy
            .remote
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        let diff = TextDiff::from_lines(remote.as_ref(), copy.rendered.as_str());
        for change in diff.iter_all_changes() {
            let line = change.to_string_lossy();
            let line = line.trim_end_matches('\n');
            match change.tag() {
                ChangeTag::Delete => println!("{}", format!("-{line}").red()),
                ChangeTag::Insert => println!("{}", format!("+{line}").green()),
                ChangeTag::Equal => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy(remote: Option<&str>, rendered: &str) -> RemoteCopy {
        RemoteCopy {
            path: "package.json",
            rendered: rendered.to_string(),
            remote: remote.map(|r| r.as_bytes().to_vec()),
        }
    }

    #[test]
    fn test_file_diff_current_is_none() {
        assert!(file_diff(&copy(Some("a\n"), "a\n")).is_none());
    }

    #[test]
    fn test_file_diff_shows_changed_lines() {
        let diff = file_diff(&copy(Some("a\nb\n"), "a\nc\n")).unwrap();
        assert!(diff.contains("--- remote/package.json"));
        assert!(diff.contains("+++ rendered/package.json"));
        assert!(diff.contains("-b"));
        assert!(diff.contains("+c"));
    }

    #[test]
    fn test_file_diff_missing_remote_is_all_insert() {
        let diff = file_diff(&copy(None, "x\ny\n")).unwrap();
        assert!(diff.contains("+x"));
        assert!(diff.contains("+y"));
    }
}
