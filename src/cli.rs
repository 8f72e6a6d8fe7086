//! CLI utilities for cinder.
//!
//! The utilities present in this module are used by the `cinder` binary to run
//! an interactive shell against a cache server.
use std::io::{BufRead, Write};

use crate::{
    Client, Error, Options, Response,
    command::{Command, CommandError, StoreMode},
    protocol::Opcode,
    transcoder::{Value, ValueType},
};

/// Prompt user for a cinder command.
///
/// End of input is read as [`Command::Exit`].
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut line = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut line)? == 0 {
        return Ok(Command::Exit);
    }
    Command::try_from(line.as_str())
}

/// Runs shell commands through a [`Client`].
pub struct Shell {
    client: Client,
    value_type: ValueType,
}

impl Shell {
    pub fn new(client: Client, value_type: ValueType) -> Self {
        Self { client, value_type }
    }

    /// Typed text becomes bytes under the raw transcoder and text otherwise.
    fn value(&self, text: &str) -> Value {
        match self.value_type {
            ValueType::Raw => Value::Bytes(text.as_bytes().to_vec()),
            ValueType::Json | ValueType::Native => Value::Text(text.to_string()),
        }
    }

    /// Execute one command; `Exit` yields no responses.
    pub fn execute(&self, command: &Command) -> Result<Vec<Response>, Error> {
        let client = &self.client;
        let opts = Options::default();

        let response = match command {
            Command::Exit => return Ok(Vec::new()),
            Command::MultiGet(keys) => return Ok(client.mget(keys, &opts)?.collect()),
            Command::Get(key) => client.get(key, &opts)?,
            Command::Store { mode, key, value } => {
                let value = self.value(value);
                match mode {
                    StoreMode::Set => client.set(key, &value, &opts)?,
                    StoreMode::Add => client.add(key, &value, &opts)?,
                    StoreMode::Replace => client.replace(key, &value, &opts)?,
                }
            }
            Command::Concat { front, key, value } => {
                if *front {
                    client.prepend(key, value.as_str(), &opts)?
                } else {
                    client.append(key, value.as_str(), &opts)?
                }
            }
            Command::Delete(key) => client.delete(key, &opts)?,
            Command::Counter { down, key, amount } => {
                if *down {
                    client.decrement(key, *amount, &opts)?
                } else {
                    client.increment(key, *amount, &opts)?
                }
            }
            Command::Flush => client.flush(&opts)?,
            Command::Version => client.version()?,
        };
        Ok(vec![response])
    }
}

/// One line of shell output for a response.
///
/// Only multi-key replies name their key; a single call answers the key the
/// user just typed.
pub fn render(response: &Response) -> String {
    let mut out = response.status.to_string();
    if response.opcode.loud() == Opcode::GetK && !response.key.is_empty() {
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(&response.key));
    }

    let detail = if let Some(counter) = response.counter() {
        Some(counter.to_string())
    } else if let Some(version) = response.version() {
        Some(version.to_string())
    } else if let Some(value) = &response.decoded {
        Some(match value {
            Value::Text(text) => text.clone(),
            Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => format!("{other:?}"),
        })
    } else if response.is_ok() && !response.value.is_empty() {
        Some(String::from_utf8_lossy(&response.value).into_owned())
    } else {
        None
    };

    if let Some(detail) = detail {
        out.push(' ');
        out.push_str(&detail);
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::{Config, mock::MockServer, protocol::Status};

    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_parses_commands() {
        let input = b"get greeting\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(Command::Get("greeting".into()), res);
    }

    #[test]
    fn prompt_treats_eof_as_exit() {
        let mut output = Vec::new();
        assert_eq!(prompt(&b""[..], &mut output).unwrap(), Command::Exit);
    }

    #[test]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        let err = prompt(&input[..], &mut output).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized command '.something_wrong'");
    }

    fn shell(server: &MockServer, value_type: ValueType) -> Shell {
        let client = Client::new(Config {
            value_type,
            ..server.config()
        })
        .unwrap();
        Shell::new(client, value_type)
    }

    fn run(shell: &Shell, line: &str) -> Vec<String> {
        let command = Command::try_from(line).unwrap();
        shell.execute(&command).unwrap().iter().map(render).collect()
    }

    #[test]
    fn shell_session() {
        let server = MockServer::start();
        let shell = shell(&server, ValueType::Json);

        assert_eq!(run(&shell, "set greeting hello world"), vec!["ok"]);
        assert_eq!(run(&shell, "get greeting"), vec!["ok hello world"]);
        assert_eq!(
            run(&shell, "mget greeting missing"),
            vec!["ok greeting hello world", "key_not_found missing"]
        );
        assert_eq!(run(&shell, "add greeting again"), vec!["key_exists"]);
        assert_eq!(run(&shell, "incr hits 2"), vec!["ok 0"]);
        assert_eq!(run(&shell, "incr hits 2"), vec!["ok 2"]);
        assert_eq!(run(&shell, "delete greeting"), vec!["ok"]);
        assert_eq!(run(&shell, "version"), vec![format!("ok {}", crate::mock::VERSION)]);
        assert!(run(&shell, ".exit").is_empty());
    }

    #[test]
    fn raw_shell_concatenates() {
        let server = MockServer::start();
        let shell = shell(&server, ValueType::Raw);

        run(&shell, "set k mid");
        run(&shell, "append k >");
        run(&shell, "prepend k <");
        assert_eq!(run(&shell, "get k"), vec!["ok <mid>"]);
    }

    #[test]
    fn render_failure_has_no_detail() {
        let single = Response::synthesized(Opcode::Get, "k", Status::Timeout);
        assert_eq!(render(&single), "timeout");

        let multi = Response::synthesized(Opcode::GetKQ, "k", Status::Timeout);
        assert_eq!(render(&multi), "timeout k");
    }

    #[test]
    fn single_key_calls_do_not_echo_the_key() {
        let server = MockServer::start();
        let shell = shell(&server, ValueType::Json);

        assert_eq!(run(&shell, "get greeting"), vec!["key_not_found"]);
        assert_eq!(run(&shell, "set greeting hi"), vec!["ok"]);
        assert_eq!(run(&shell, "mget greeting"), vec!["ok greeting hi"]);
    }
}
