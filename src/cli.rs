use clap::{Parser, Subcommand};
use clap_complete::Shell;
use menus::Strategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nocodeploy")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Deploy declarative CMS collection plugins over SSH and reconcile admin menus",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/nocodeploy/config.toml)
    #[arg(short, long, global = true, env = "NOCODEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render and deploy plugins to the host, then restart the application
    Deploy(DeployArgs),

    /// Show which plugins are deployed, drifted or missing
    Status(TargetArgs),

    /// Show content differences between rendered and deployed files
    Diff(TargetArgs),

    /// Render plugin sources into a local directory
    Render(RenderArgs),

    /// Check descriptors without connecting anywhere
    Validate,

    /// Reconcile the admin navigation menu
    #[command(subcommand)]
    Menus(MenusCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Deploy
// ============================================================================

#[derive(Parser)]
pub struct DeployArgs {
    /// Preview against an in-memory host; nothing is written or restarted
    #[arg(long)]
    pub dry_run: bool,

    /// Only deploy matching resources: `plugin`, `plugin.<name>` or a name fragment
    #[arg(long)]
    pub only: Option<String>,

    /// Skip the application restart (and the settle delay and log tail)
    #[arg(long)]
    pub no_restart: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct TargetArgs {
    /// Resource filter: `plugin`, `plugin.<name>` or a name fragment
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct RenderArgs {
    /// Output directory
    #[arg(short, long, default_value = "rendered")]
    pub out: PathBuf,

    /// Resource filter: `plugin`, `plugin.<name>` or a name fragment
    pub target: Option<String>,
}

// ============================================================================
// Menus
// ============================================================================

#[derive(Subcommand)]
pub enum MenusCommand {
    /// Bring the remote menu in line with the declared one
    Sync {
        /// Reconciliation strategy (overrides config)
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Parallel API calls within a phase (overrides config)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the remote menu tree
    List {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a sync would delete, update and create
    Plan {
        /// Reconciliation strategy (overrides config)
        #[arg(long)]
        strategy: Option<Strategy>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_flags() {
        let cli = Cli::try_parse_from([
            "nocodeploy",
            "-vv",
            "deploy",
            "--dry-run",
            "--only",
            "rfp",
            "--no-restart",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Deploy(args) => {
                assert!(args.dry_run);
                assert!(args.no_restart);
                assert_eq!(args.only.as_deref(), Some("rfp"));
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_parse_menus_sync_strategy() {
        let cli = Cli::try_parse_from([
            "nocodeploy",
            "menus",
            "sync",
            "--strategy",
            "diff",
            "--jobs",
            "4",
        ])
        .unwrap();
        match cli.command {
            Command::Menus(MenusCommand::Sync { strategy, jobs, .. }) => {
                assert_eq!(strategy, Some(Strategy::Diff));
                assert_eq!(jobs, Some(4));
            }
            _ => panic!("expected menus sync"),
        }
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!(
            Cli::try_parse_from(["nocodeploy", "menus", "sync", "--strategy", "merge"]).is_err()
        );
    }
}
