//! Command-line parsing for the emoscope client.

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: Option<String> },
    Logout,
    Status,
    Whoami,
    Check { path: String },
    Users,
    AddUser { username: String, email: String, admin: bool },
    Watch,
}

#[derive(Debug, Clone, Default)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub api_url: Option<String>,
    pub log_level: Option<String>,
    pub help: bool,
    pub version: bool,
    pub command: Option<Command>,
}

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("{0}")]
    Lexopt(#[from] lexopt::Error),

    #[error("unknown command: '{0}'")]
    UnknownCommand(String),

    #[error("missing argument for '{command}': {what}")]
    MissingArgument { command: &'static str, what: &'static str },

    #[error("unexpected argument: '{0}'")]
    UnexpectedArgument(String),

    #[error("option {option} is not valid for '{command}'")]
    InvalidOption { option: &'static str, command: String },
}

pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);
    let mut positionals: Vec<String> = Vec::new();
    let mut username: Option<String> = None;
    let mut admin = false;

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => result.help = true,
            Short('V') | Long("version") => result.version = true,
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.into());
            }
            Long("api-url") => {
                result.api_url = Some(parser.value()?.string()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.string()?);
            }
            Short('u') | Long("username") => {
                username = Some(parser.value()?.string()?);
            }
            Long("admin") => admin = true,
            Value(val) => positionals.push(val.string()?),
            _ => return Err(arg.unexpected().into()),
        }
    }

    if result.help || result.version {
        return Ok(result);
    }

    let mut positionals = positionals.into_iter();
    let Some(name) = positionals.next() else {
        return Ok(result);
    };

    let command = match name.as_str() {
        "login" => Command::Login { username: username.take() },
        "logout" => Command::Logout,
        "status" => Command::Status,
        "whoami" => Command::Whoami,
        "check" => Command::Check {
            path: positionals.next().ok_or(ArgsError::MissingArgument {
                command: "check",
                what: "<PATH>",
            })?,
        },
        "watch" => Command::Watch,
        "users" => match positionals.next().as_deref() {
            None => Command::Users,
            Some("add") => Command::AddUser {
                username: positionals.next().ok_or(ArgsError::MissingArgument {
                    command: "users add",
                    what: "<USERNAME>",
                })?,
                email: positionals.next().ok_or(ArgsError::MissingArgument {
                    command: "users add",
                    what: "<EMAIL>",
                })?,
                admin: std::mem::take(&mut admin),
            },
            Some(other) => return Err(ArgsError::UnknownCommand(format!("users {}", other))),
        },
        other => return Err(ArgsError::UnknownCommand(other.to_string())),
    };

    if let Some(extra) = positionals.next() {
        return Err(ArgsError::UnexpectedArgument(extra));
    }
    if username.is_some() {
        return Err(ArgsError::InvalidOption { option: "--username", command: name });
    }
    if admin {
        return Err(ArgsError::InvalidOption { option: "--admin", command: name });
    }

    result.command = Some(command);
    Ok(result)
}

pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"emoscope {version}
Client for the emotion analysis service

USAGE:
    emoscope [OPTIONS] <COMMAND>

COMMANDS:
    login [-u USER]                     Log in (prompts for the password)
    logout                              End the session and forget the token
    status                              Show the session state
    whoami                              Print the logged-in profile as JSON
    check <PATH>                        Show whether a view may be opened
    users                               List accounts (admin)
    users add <USERNAME> <EMAIL>        Create an account (admin) [--admin]
    watch                               Follow session changes, revalidating periodically

OPTIONS:
    -c, --config <FILE>       Path to configuration file (JSON)
        --api-url <URL>       API base URL [default: http://localhost:8000/api/v1]
    -l, --log-level <LVL>     Log level (error, warn, info, debug, trace)
    -h, --help                Print help
    -V, --version             Print version

ENVIRONMENT VARIABLES:
    EMOSCOPE_API_URL          API base URL (overrides config)
    EMOSCOPE_USERNAME         Default login name
    EMOSCOPE_PASSWORD         Password for non-interactive login
    RUST_LOG                  Log filter
"#
    );
}

pub fn print_version() {
    println!("emoscope {}", env!("CARGO_PKG_VERSION"));
}
