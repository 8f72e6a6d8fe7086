//! Shell commands.
//!
//! This module defines the [`Command`] enum, the parsed form of one line typed
//! into the `cinder` shell. Each command maps onto a single [`Client`](crate::Client)
//! call (see [`Shell`](crate::cli::Shell)).
//!
//! # Overview
//! - `get <key>` / `mget <key>...`
//! - `set|add|replace <key> <value>`
//! - `append|prepend <key> <value>`
//! - `delete <key>`
//! - `incr|decr <key> <amount>`
//! - `flush`, `version`
//! - `.exit`
//!
//! Values are the rest of the line after the key, so they may contain spaces.
//!
//! # Example
//! ```rust
//! use cinder::Command;
//!
//! let cmd: Command = "get user:1".try_into().unwrap();
//! assert_eq!(cmd, Command::Get("user:1".to_string()));
//! ```
use std::io;

use thiserror::Error;

/// List of possible errors when reading a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,

    #[error("failed to read command: {0}")]
    Io(#[from] io::Error),
}

/// Which storage command a [`Command::Store`] issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Set,
    Add,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Close the session.
    Exit,
    Get(String),
    MultiGet(Vec<String>),
    Store {
        mode: StoreMode,
        key: String,
        value: String,
    },
    /// `append` when `front` is false, `prepend` otherwise.
    Concat {
        front: bool,
        key: String,
        value: String,
    },
    Delete(String),
    /// Increment, or decrement when `down` is set.
    Counter {
        down: bool,
        key: String,
        amount: u64,
    },
    Flush,
    Version,
}

fn invalid(command: &str, reason: &str) -> CommandError {
    CommandError::InvalidCommandArguments {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

/// Split `"key rest of line"` into the key and the remaining value.
fn key_value<'a>(command: &str, args: &'a str) -> Result<(&'a str, &'a str), CommandError> {
    match args.split_once(' ') {
        Some((key, value)) if !value.trim().is_empty() => Ok((key, value.trim())),
        _ => Err(invalid(
            command,
            &format!("requires a key and a value. Example: {command} greeting hello"),
        )),
    }
}

fn single_key(command: &str, args: &str) -> Result<String, CommandError> {
    match args.split_whitespace().collect::<Vec<_>>()[..] {
        [key] => Ok(key.to_string()),
        _ => Err(invalid(
            command,
            &format!("requires exactly one key. Example: {command} greeting"),
        )),
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }

        let (name, args) = line.split_once(' ').unwrap_or((line, ""));
        let args = args.trim();

        match name.to_lowercase().as_str() {
            ".exit" => Ok(Command::Exit),
            "flush" => Ok(Command::Flush),
            "version" => Ok(Command::Version),
            "get" => Ok(Command::Get(single_key(name, args)?)),
            "delete" => Ok(Command::Delete(single_key(name, args)?)),
            "mget" => {
                let keys = args
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                if keys.is_empty() {
                    return Err(invalid(name, "requires at least one key. Example: mget a b c"));
                }
                Ok(Command::MultiGet(keys))
            }
            mode @ ("set" | "add" | "replace") => {
                let (key, value) = key_value(name, args)?;
                let mode = match mode {
                    "set" => StoreMode::Set,
                    "add" => StoreMode::Add,
                    _ => StoreMode::Replace,
                };
                Ok(Command::Store {
                    mode,
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            op @ ("append" | "prepend") => {
                let (key, value) = key_value(name, args)?;
                Ok(Command::Concat {
                    front: op == "prepend",
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            op @ ("incr" | "decr") => {
                let parts = args.split_whitespace().collect::<Vec<_>>();
                let [key, amount] = parts[..] else {
                    return Err(invalid(
                        name,
                        &format!("requires a key and an amount. Example: {op} hits 1"),
                    ));
                };
                let amount = amount.parse::<u64>().map_err(|_| {
                    invalid(name, "amount should be a non-negative integer")
                })?;
                Ok(Command::Counter {
                    down: op == "decr",
                    key: key.to_string(),
                    amount,
                })
            }
            _ => Err(CommandError::UnrecognizedCommand(line.to_string())),
        }
    }
}
