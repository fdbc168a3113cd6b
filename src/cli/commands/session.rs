use super::CommandContext;
use crate::cli::SessionCommands;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::model::Session;
use crate::session::SessionManager;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Whoami<'a> {
    #[serde(flatten)]
    session: &'a Session,
    is_new: bool,
}

/// Execute a session subcommand.
///
/// # Errors
///
/// Returns an error if the session cannot be resolved or listed.
pub fn execute(command: &SessionCommands, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli, json)?;
    let branch = ctx.config.resolve_branch();

    match command {
        SessionCommands::Whoami => {
            let outcome = {
                let mut manager =
                    SessionManager::new(&mut ctx.storage, &ctx.config.todos_dir, &branch)?;
                manager.get_or_create()?
            };
            let view = Whoami {
                session: &outcome.session,
                is_new: outcome.is_new,
            };
            ctx.emit(&view, || {
                print_session(&outcome.session);
                if outcome.is_new {
                    println!("(new session)");
                }
            })
        }
        SessionCommands::New { name } => {
            let name = name.clone().or_else(|| ctx.config.actor.clone());
            let session = {
                let mut manager =
                    SessionManager::new(&mut ctx.storage, &ctx.config.todos_dir, &branch)?;
                manager.force_new_session(name.as_deref())?
            };
            ctx.emit(&session, || print_session(&session))
        }
        SessionCommands::List => {
            let sessions = ctx.storage.list_all_sessions()?;
            ctx.emit(&sessions, || {
                if sessions.is_empty() {
                    println!("No sessions.");
                }
                for s in &sessions {
                    println!(
                        "{}  {:<24}  {}  {}",
                        s.id,
                        s.fingerprint,
                        s.branch,
                        s.last_activity.format("%Y-%m-%d %H:%M")
                    );
                }
            })
        }
    }
}

fn print_session(session: &Session) {
    println!("Session: {}", session.id);
    if let Some(name) = &session.name {
        println!("Name: {name}");
    }
    println!("Branch: {}", session.branch);
    println!("Agent: {}", session.fingerprint);
    if !session.previous_session_id.is_empty() {
        println!("Previous: {}", session.previous_session_id);
    }
    println!("Started: {}", session.started_at.format("%Y-%m-%d %H:%M"));
}
