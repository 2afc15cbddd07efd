//! Argument parsing and structured-result rendering (spec §6): each
//! subcommand here is a thin wrapper around one `prooftree_core::Service`
//! method, printed as text or JSON depending on `--format`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use prooftree_core::config::Config;
use prooftree_core::error::sanitize_message;
use prooftree_core::ids::NodeId;
use prooftree_core::service::{Service, service_for};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "pt", about = "Coordinate a concurrent proof-tree ledger")]
struct Cli {
    /// Proof directory (defaults to the current directory).
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Output rendering; the core itself never consults this.
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    Init {
        conjecture: String,
        #[arg(long)]
        author: String,
    },
    CreateNode {
        id: String,
        #[arg(long, default_value = "claim")]
        node_type: String,
        #[arg(long)]
        statement: String,
        #[arg(long, default_value = "assumption")]
        inference: String,
        #[arg(long, value_delimiter = ',')]
        deps: Vec<String>,
        #[arg(long = "validation-deps", value_delimiter = ',')]
        validation_deps: Vec<String>,
    },
    Refine {
        parent: String,
        child_id: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        statement: String,
        #[arg(long, default_value = "assumption")]
        inference: String,
        #[arg(long, value_delimiter = ',')]
        deps: Vec<String>,
        #[arg(long = "validation-deps", value_delimiter = ',')]
        validation_deps: Vec<String>,
    },
    Amend {
        id: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        statement: String,
    },
    Claim {
        nodes: Vec<String>,
        #[arg(long)]
        owner: String,
        /// Lease duration, e.g. `5m`, `30s`, `1h`. Defaults to the
        /// configured `PROOFTREE_DEFAULT_LEASE_SECS` when omitted.
        #[arg(long, value_parser = parse_duration)]
        lease: Option<Duration>,
        #[arg(long)]
        role: Option<String>,
    },
    Release {
        nodes: Vec<String>,
        #[arg(long)]
        owner: String,
    },
    Accept {
        id: String,
    },
    Admit {
        id: String,
    },
    Refute {
        id: String,
    },
    Archive {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    ChallengeRaise {
        id: String,
        #[arg(long)]
        target_field: String,
        #[arg(long)]
        reason: String,
    },
    ChallengeResolve {
        challenge_id: String,
    },
    ChallengeWithdraw {
        challenge_id: String,
    },
    OpenScope {
        id: String,
        #[arg(long)]
        statement: String,
    },
    CloseScope {
        id: String,
        #[arg(long)]
        discharged_by: String,
    },
    AddExternal {
        #[arg(long)]
        name: String,
        #[arg(long)]
        source: String,
    },
    VerifyExternal {
        id: String,
        #[arg(long)]
        note: String,
    },
    ExtractLemma {
        lemma: String,
    },
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len()));
    let value: u64 = digits.parse().map_err(|_| format!("invalid duration: {raw}"))?;
    let secs = match unit {
        "" | "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => return Err(format!("unknown duration unit {other:?}")),
    };
    Ok(Duration::from_secs(secs))
}

fn parse_ids(raw: &[String]) -> Result<Vec<NodeId>, prooftree_core::Error> {
    raw.iter().map(|s| NodeId::parse(s)).collect()
}

#[derive(Serialize)]
struct Ok {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrBody {
    status: &'static str,
    error_type: &'static str,
    message: String,
}

fn render_ok<T: Serialize>(format: Format, value: &T, text: impl FnOnce() -> String) {
    match format {
        Format::Json => {
            let _ = serde_json::to_writer_pretty(std::io::stdout(), value);
            println!();
        }
        Format::Text => println!("{}", text()),
    }
}

fn render_err(format: Format, dir: &std::path::Path, error: prooftree_core::Error) -> i32 {
    let kind = error.kind();
    let message = sanitize_message(&error.to_string(), dir);
    match format {
        Format::Json => {
            let body = ErrBody {
                status: "error",
                error_type: kind.as_str(),
                message,
            };
            let _ = serde_json::to_writer_pretty(std::io::stderr(), &body);
            eprintln!();
        }
        Format::Text => eprintln!("error[{}]: {message}", kind.as_str()),
    }
    match kind {
        prooftree_core::ErrorKind::InvalidArgument => 2,
        prooftree_core::ErrorKind::NotFound => 3,
        prooftree_core::ErrorKind::AlreadyExists => 4,
        prooftree_core::ErrorKind::Conflict => 5,
        prooftree_core::ErrorKind::PreconditionFailed => 6,
        prooftree_core::ErrorKind::LedgerCorrupt => 7,
        prooftree_core::ErrorKind::IoError => 8,
        prooftree_core::ErrorKind::Cancelled => 130,
    }
}

/// Parse `std::env::args`, run the selected command, print the result, and
/// return the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    let dir = cli
        .dir
        .clone()
        .unwrap_or_else(prooftree_core::service::default_proof_dir);
    let service = service_for(Some(&dir), Config::from_env());
    match dispatch(&service, cli.command, cli.format) {
        std::result::Result::Ok(()) => 0,
        std::result::Result::Err(e) => render_err(cli.format, &dir, e),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Init { .. } => "init",
        Command::CreateNode { .. } => "create_node",
        Command::Refine { .. } => "refine",
        Command::Amend { .. } => "amend",
        Command::Claim { .. } => "claim",
        Command::Release { .. } => "release",
        Command::Accept { .. } => "accept",
        Command::Admit { .. } => "admit",
        Command::Refute { .. } => "refute",
        Command::Archive { .. } => "archive",
        Command::ChallengeRaise { .. } => "challenge_raise",
        Command::ChallengeResolve { .. } => "challenge_resolve",
        Command::ChallengeWithdraw { .. } => "challenge_withdraw",
        Command::OpenScope { .. } => "open_scope",
        Command::CloseScope { .. } => "close_scope",
        Command::AddExternal { .. } => "add_external",
        Command::VerifyExternal { .. } => "verify_external",
        Command::ExtractLemma { .. } => "extract_lemma",
    }
}

fn dispatch(service: &Service, command: Command, format: Format) -> prooftree_core::Result<()> {
    tracing::info!(command = command_name(&command), "dispatching");
    match command {
        Command::Init { conjecture, author } => {
            service.init(&conjecture, &author)?;
            render_ok(format, &Ok { status: "initialized" }, || "initialized".to_string());
        }
        Command::CreateNode {
            id,
            node_type,
            statement,
            inference,
            deps,
            validation_deps,
        } => {
            let id = NodeId::parse(&id)?;
            service.create_node(
                &id,
                &node_type,
                &statement,
                &inference,
                &parse_ids(&deps)?,
                &parse_ids(&validation_deps)?,
            )?;
            render_ok(format, &Ok { status: "created" }, || format!("created {id}"));
        }
        Command::Refine {
            parent,
            child_id,
            owner,
            statement,
            inference,
            deps,
            validation_deps,
        } => {
            let parent = NodeId::parse(&parent)?;
            let child_id = NodeId::parse(&child_id)?;
            service.refine_with_all_deps(
                &parent,
                &owner,
                &child_id,
                &statement,
                &inference,
                &parse_ids(&deps)?,
                &parse_ids(&validation_deps)?,
            )?;
            render_ok(format, &Ok { status: "created" }, || format!("created {child_id}"));
        }
        Command::Amend { id, owner, statement } => {
            let id = NodeId::parse(&id)?;
            service.amend(&id, &owner, &statement)?;
            render_ok(format, &Ok { status: "amended" }, || format!("amended {id}"));
        }
        Command::Claim {
            nodes,
            owner,
            lease,
            role,
        } => {
            let ids = parse_ids(&nodes)?;
            let lease = lease.unwrap_or(service.config().default_lease);
            let outcome = service.claim(&ids, &owner, lease, role.as_deref())?;
            render_ok(format, &format!("{outcome:?}"), || format!("{outcome:?}"));
        }
        Command::Release { nodes, owner } => {
            let ids = parse_ids(&nodes)?;
            service.release(&ids, &owner)?;
            render_ok(format, &Ok { status: "released" }, || "released".to_string());
        }
        Command::Accept { id } => {
            let id = NodeId::parse(&id)?;
            service.accept(&id)?;
            render_ok(format, &Ok { status: "validated" }, || format!("validated {id}"));
        }
        Command::Admit { id } => {
            let id = NodeId::parse(&id)?;
            service.admit(&id)?;
            render_ok(format, &Ok { status: "admitted" }, || format!("admitted {id}"));
        }
        Command::Refute { id } => {
            let id = NodeId::parse(&id)?;
            service.refute(&id)?;
            render_ok(format, &Ok { status: "refuted" }, || format!("refuted {id}"));
        }
        Command::Archive { id, reason } => {
            let id = NodeId::parse(&id)?;
            service.archive(&id, reason.as_deref())?;
            render_ok(format, &Ok { status: "archived" }, || format!("archived {id}"));
        }
        Command::ChallengeRaise {
            id,
            target_field,
            reason,
        } => {
            let id = NodeId::parse(&id)?;
            let challenge_id = service.challenge_raise(&id, &target_field, &reason)?;
            render_ok(format, &challenge_id, || format!("raised {challenge_id}"));
        }
        Command::ChallengeResolve { challenge_id } => {
            service.challenge_resolve(&challenge_id)?;
            render_ok(format, &Ok { status: "resolved" }, || "resolved".to_string());
        }
        Command::ChallengeWithdraw { challenge_id } => {
            service.challenge_withdraw(&challenge_id)?;
            render_ok(format, &Ok { status: "withdrawn" }, || "withdrawn".to_string());
        }
        Command::OpenScope { id, statement } => {
            let id = NodeId::parse(&id)?;
            service.open_scope(&id, &statement)?;
            render_ok(format, &Ok { status: "scope_opened" }, || format!("scope opened on {id}"));
        }
        Command::CloseScope { id, discharged_by } => {
            let id = NodeId::parse(&id)?;
            let discharger = NodeId::parse(&discharged_by)?;
            service.close_scope(&id, &discharger)?;
            render_ok(format, &Ok { status: "scope_closed" }, || format!("scope closed on {id}"));
        }
        Command::AddExternal { name, source } => {
            let id = service.add_external(&name, &source)?;
            render_ok(format, &id, || format!("added external {id}"));
        }
        Command::VerifyExternal { id, note } => {
            service.verify_external(&id, &note)?;
            render_ok(format, &Ok { status: "verified" }, || format!("verified {id}"));
        }
        Command::ExtractLemma { lemma } => {
            service.extract_lemma(&lemma)?;
            render_ok(format, &Ok { status: "lemma_extracted" }, || "lemma extracted".to_string());
        }
    }
    std::result::Result::Ok(())
}
