use clap::Parser;
use std::io::{self, IsTerminal};
use td_rust::cli::commands::{self, transition::Transition};
use td_rust::cli::{Cli, Commands};
use td_rust::config;
use td_rust::logging::init_logging;
use td_rust::{StructuredError, TdError};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, None) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let overrides = build_cli_overrides(&cli);
    let json = cli.json;

    let result = match &cli.command {
        Commands::Init => commands::init::execute(None, json),
        Commands::Create(args) => commands::create::execute(args, json, &overrides),
        Commands::Show { id } => commands::show::execute(id, json, &overrides),
        Commands::List(args) => commands::list::execute(args, json, &overrides),
        Commands::Update(args) => commands::update::execute(args, json, &overrides),
        Commands::Start(args) => {
            commands::transition::execute(Transition::Start, args, json, &overrides)
        }
        Commands::Review(args) => {
            commands::transition::execute(Transition::Review, args, json, &overrides)
        }
        Commands::Approve(args) => {
            commands::transition::execute(Transition::Approve, args, json, &overrides)
        }
        Commands::Reject(args) => {
            commands::transition::execute(Transition::Reject, args, json, &overrides)
        }
        Commands::Close(args) => {
            commands::transition::execute(Transition::Close, args, json, &overrides)
        }
        Commands::Reopen(args) => {
            commands::transition::execute(Transition::Reopen, args, json, &overrides)
        }
        Commands::Dep { command } => commands::dep::execute(command, json, &overrides),
        Commands::Query(args) => commands::query::execute(args, json, &overrides),
        Commands::Search(args) => commands::query::search(args, json, &overrides),
        Commands::Log(args) => commands::events::log(args, json, &overrides),
        Commands::Comment(args) => commands::events::comment(args, json, &overrides),
        Commands::Handoff(args) => commands::events::handoff(args, json, &overrides),
        Commands::Link(args) => commands::events::link(args, json, &overrides),
        Commands::Session { command } => commands::session::execute(command, json, &overrides),
        Commands::WebhookDispatch { spool } => commands::webhook::dispatch(spool),
    };

    if let Err(e) = result {
        handle_error(&e, json);
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs a human-readable error.
fn handle_error(err: &TdError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    config::CliOverrides {
        db: cli.db.clone(),
        actor: cli.actor.clone(),
        lock_timeout: cli.lock_timeout,
    }
}
