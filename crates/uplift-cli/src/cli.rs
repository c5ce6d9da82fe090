//! Clap CLI definitions for UPLIFT.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1mHint:\x1b[0m Commands suffixed with [*] have subcommands. Run `<command> --help` for details.

\x1b[1;36mExamples:\x1b[0m
  uplift init                   Initialize config and data directories
  uplift start                  Start the daemon
  uplift run ./research-agent   Register and start one agent
  uplift agent list             List registered agents
  uplift approvals list         Show pending approval requests
  uplift memory list --agent research-agent --scope uplift://agent/research-agent
  uplift audit --verify         Verify the audit chain
  uplift halt --force           Kill switch: stop every agent now

\x1b[1;36mQuick Start:\x1b[0m
  1. uplift init                Set up ~/.uplift and a default config
  2. uplift start               Launch the daemon
  3. uplift run <agent-dir>     Bring your first agent up";

/// UPLIFT — an agent-native operating layer.
#[derive(Parser)]
#[command(
    name = "uplift",
    version,
    about = "UPLIFT \u{2014} agent-native operating layer",
    long_about = "UPLIFT \u{2014} agent-native operating layer\n\n\
                  Run agent processes under supervision, give them permissioned\n\
                  shared memory, task delegation, and human-in-the-loop approvals.",
    after_help = AFTER_HELP,
)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize UPLIFT (create ~/.uplift/ and a default config).
    Init {
        /// Quick mode: no prompts, just write the config (for CI/scripts).
        #[arg(long)]
        quick: bool,
    },
    /// Start the daemon (kernel + API server).
    Start {
        /// Run in the background (daemon mode).
        #[arg(long, short = 'd')]
        daemon: bool,
    },
    /// Stop the running daemon.
    Stop,
    /// Show daemon status.
    Status {
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Register and start one agent from a manifest file or directory.
    Run {
        /// Path to agent.yaml or a directory containing it.
        path: PathBuf,
    },
    /// Manage agents (list, start, stop) [*].
    #[command(subcommand)]
    Agent(AgentCommands),
    /// Inspect and edit agent memory [*].
    #[command(subcommand)]
    Memory(MemoryCommands),
    /// Manage approval requests (list, approve, deny, request) [*].
    #[command(subcommand)]
    Approvals(ApprovalsCommands),
    /// List delegated tasks.
    Tasks {
        /// Filter by agent name.
        #[arg(long)]
        agent: Option<String>,
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Show the audit trail.
    Audit {
        /// Number of entries to show.
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Verify the hash chain instead of listing entries.
        #[arg(long)]
        verify: bool,
    },
    /// Kill switch: stop every agent.
    Halt {
        /// Kill immediately instead of asking the daemon to shut agents
        /// down gracefully.
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completion scripts.
    Completion {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// List registered agents.
    List {
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Start a registered agent.
    Start {
        /// Agent name.
        name: String,
    },
    /// Stop a running agent.
    Stop {
        /// Agent name.
        name: String,
        /// Kill immediately, skipping the graceful stop.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Read one key.
    Get {
        /// Agent whose grants are used for the access check.
        #[arg(long)]
        agent: String,
        /// Scope URI, e.g. uplift://shared/research.
        #[arg(long)]
        scope: String,
        /// Key to read.
        key: String,
    },
    /// Write one key (value is parsed as JSON, else stored as a string).
    Set {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        scope: String,
        key: String,
        value: String,
    },
    /// List the keys of a scope.
    List {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        scope: String,
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Delete one key.
    Delete {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        scope: String,
        key: String,
    },
}

#[derive(Subcommand)]
pub enum ApprovalsCommands {
    /// List pending approval requests.
    List {
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Approve a pending request.
    Approve {
        /// Request id (AR-...).
        id: String,
        /// Optional comment recorded with the decision.
        #[arg(long)]
        comment: Option<String>,
    },
    /// Deny a pending request.
    Deny {
        /// Request id (AR-...).
        id: String,
        /// Reason recorded with the denial.
        #[arg(long)]
        reason: Option<String>,
    },
    /// File an approval request from the command line.
    Request {
        /// Action awaiting approval.
        action: String,
        /// Risk level: low, medium, high, critical.
        #[arg(long, default_value = "medium")]
        risk: String,
        /// Details as JSON.
        #[arg(long)]
        details: Option<String>,
    },
}
