pub mod cli;
pub mod client;
pub mod command;
pub mod config;
mod error;
pub mod pipeline;
pub mod pool;
pub mod protocol;
pub mod transcoder;
pub mod worker;

#[cfg(test)]
mod mock;

pub use cli::{Shell, prompt, render};
pub use client::{Client, Options, Responses};
pub use command::{Command, CommandError};
pub use config::{AuthMethod, Config, ConfigError};
pub use error::Error;
pub use protocol::{Opcode, Response, Status};
pub use transcoder::{Transcode, TranscodeError, Transcoder, Value, ValueType};
