use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use chathub_admin_server::user::{SqliteUserStore, UserAuthTokenStore, UserStore};
use chathub_admin_server::user::auth::AuthTokenValue;

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path of the user database, usually `<db_dir>/user.db`.
    #[clap(value_parser = parse_path)]
    pub path: PathBuf,

    /// Runs a single command and exits instead of opening the shell.
    #[clap(long)]
    pub exec: Option<String>,
}

#[derive(Parser)]
#[command(name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Creates a user with the given uid.
    AddUser {
        uid: String,
        #[clap(long)]
        email: Option<String>,
        /// Grants admin access right away.
        #[clap(long)]
        admin: bool,
    },

    /// Grants or revokes admin access.
    SetAdmin {
        uid: String,
        #[clap(action = clap::ArgAction::Set)]
        is_admin: bool,
    },

    /// Issues a new auth token for the uid and prints it.
    /// The uid does not need a user record.
    IssueToken { uid: String },

    /// Deletes an auth token.
    RevokeToken { token: String },

    /// Shows a user and its auth tokens.
    Show { uid: String },

    /// Shows all users.
    ListUsers,

    /// Shows the path of the current user db.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

const PROMPT: &str = ">> ";

fn run_command(command: InnerCommand, user_store: &dyn UserStore, db_path: &str) -> Result<bool> {
    match command {
        InnerCommand::AddUser { uid, email, admin } => {
            user_store.create_user(&uid, email.as_deref(), admin)?;
            println!("Created user '{}'{}", uid, if admin { " (admin)" } else { "" });
        }
        InnerCommand::SetAdmin { uid, is_admin } => {
            if !user_store.set_admin(&uid, is_admin)? {
                bail!("User '{}' not found", uid);
            }
            println!("User '{}' admin: {}", uid, is_admin);
        }
        InnerCommand::IssueToken { uid } => {
            let token = user_store.add_auth_token(&uid)?;
            println!("{}", token.0);
        }
        InnerCommand::RevokeToken { token } => {
            if !user_store.delete_auth_token(&AuthTokenValue(token))? {
                bail!("Token not found");
            }
            println!("Token revoked");
        }
        InnerCommand::Show { uid } => {
            match user_store.get_user(&uid)? {
                Some(user) => println!("{:#?}", user),
                None => println!("No user record for '{}'", uid),
            }
            println!("\nAuth Tokens:");
            let tokens = user_store.get_all_auth_tokens(&uid)?;
            if tokens.is_empty() {
                println!("  (no tokens)");
            }
            for token in tokens.iter() {
                println!(
                    "  - {} created {} last used {}",
                    token.value.0,
                    token.created,
                    token
                        .last_used
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
        }
        InnerCommand::ListUsers => {
            for user in user_store.list_users()? {
                println!(
                    "{}\t{}\t{}",
                    user.uid,
                    user.email.as_deref().unwrap_or("-"),
                    if user.is_admin { "admin" } else { "user" }
                );
            }
        }
        InnerCommand::Where => {
            println!("{}", db_path);
        }
        InnerCommand::Exit => return Ok(false),
    }
    Ok(true)
}

fn execute_command(line: String, user_store: &dyn UserStore, db_path: &str) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => match run_command(cli.command, user_store, db_path) {
            Ok(true) => CommandExecutionResult::Ok,
            Ok(false) => CommandExecutionResult::Exit,
            Err(err) => CommandExecutionResult::Error(format!("{:#}", err)),
        },
        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
            CommandExecutionResult::Ok
        }
    }
}

#[derive(rustyline_derive::Hinter)]
struct CommandHelper {
    commands_names: Vec<String>,
}

impl CommandHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        CommandHelper { commands_names }
    }
}

impl Completer for CommandHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for CommandHelper {}
impl Validator for CommandHelper {}
impl Helper for CommandHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let user_store = SqliteUserStore::new(&cli_args.path)?;
    let db_path = cli_args.path.display().to_string();

    if let Some(line) = cli_args.exec {
        return match execute_command(line, &user_store, &db_path) {
            CommandExecutionResult::Error(err) => bail!(err),
            _ => Ok(()),
        };
    }

    InnerCli::command().print_long_help()?;

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<CommandHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(CommandHelper::new()));

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &user_store, &db_path) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => break,
                    CommandExecutionResult::Error(err) => {
                        eprintln!("Error: {}", err);
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                println!("Error: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}
