use clap::Parser;
use std::{error::Error, io, process};

use cinder::{Client, Command, Config, Shell, ValueType, prompt, render};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, default_value = "cinder.toml")]
    config: String,
    /// Server host, overrides the configuration
    #[arg(long)]
    host: Option<String>,
    /// Server port, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,
    /// Key namespace, overrides the configuration
    #[arg(short, long)]
    namespace: Option<String>,
    /// Transcoder for stored values, overrides the configuration
    #[arg(long, value_enum)]
    value_type: Option<ValueType>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let mut config = Config::load_from(&cli.config)?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.namespace.is_some() {
        config.namespace = cli.namespace;
    }
    if let Some(value_type) = cli.value_type {
        config.value_type = value_type;
    }

    let value_type = config.value_type;
    let shell = Shell::new(Client::new(config)?, value_type);

    // Stdin reads block, so leave from the handler itself.
    ctrlc::set_handler(|| {
        eprintln!();
        process::exit(0);
    })?;

    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        if cmd == Command::Exit {
            break;
        }

        match shell.execute(&cmd) {
            Ok(responses) => {
                for response in &responses {
                    println!("{}", render(response));
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}
