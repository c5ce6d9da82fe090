//! UPLIFT CLI — manage the daemon and its agents from the terminal.
//!
//! Every command except `init`, `start`, and `completion` talks to a
//! running daemon over HTTP.

mod cli;
mod cmd;
mod daemon;
mod table;
mod ui;

use clap::Parser;
use cli::{AgentCommands, ApprovalsCommands, Cli, Commands, MemoryCommands};

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    match cli.command {
        Commands::Init { quick } => cmd::init::cmd_init(quick),
        Commands::Start { daemon } => cmd::init::cmd_start(cli.config, daemon),
        Commands::Stop => cmd::init::cmd_stop(),
        Commands::Status { json } => cmd::system::cmd_status(json),
        Commands::Run { path } => cmd::agent::cmd_run(&path),
        Commands::Agent(sub) => match sub {
            AgentCommands::List { json } => cmd::agent::cmd_agent_list(json),
            AgentCommands::Start { name } => cmd::agent::cmd_agent_start(&name),
            AgentCommands::Stop { name, force } => cmd::agent::cmd_agent_stop(&name, force),
        },
        Commands::Memory(sub) => match sub {
            MemoryCommands::Get { agent, scope, key } => {
                cmd::memory::cmd_memory_get(&agent, &scope, &key)
            }
            MemoryCommands::Set {
                agent,
                scope,
                key,
                value,
            } => cmd::memory::cmd_memory_set(&agent, &scope, &key, &value),
            MemoryCommands::List { agent, scope, json } => {
                cmd::memory::cmd_memory_list(&agent, &scope, json)
            }
            MemoryCommands::Delete { agent, scope, key } => {
                cmd::memory::cmd_memory_delete(&agent, &scope, &key)
            }
        },
        Commands::Approvals(sub) => match sub {
            ApprovalsCommands::List { json } => cmd::approvals::cmd_approvals_list(json),
            ApprovalsCommands::Approve { id, comment } => {
                cmd::approvals::cmd_approvals_approve(&id, comment.as_deref())
            }
            ApprovalsCommands::Deny { id, reason } => {
                cmd::approvals::cmd_approvals_deny(&id, reason.as_deref())
            }
            ApprovalsCommands::Request {
                action,
                risk,
                details,
            } => cmd::approvals::cmd_approvals_request(&action, &risk, details.as_deref()),
        },
        Commands::Tasks { agent, json } => cmd::system::cmd_tasks(agent.as_deref(), json),
        Commands::Audit { limit, verify } => cmd::system::cmd_audit(limit, verify),
        Commands::Halt { force } => cmd::system::cmd_halt(force),
        Commands::Completion { shell } => cmd::system::cmd_completion(shell),
    }
}
