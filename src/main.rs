//! dicedb-cli - line-oriented command shell.
//!
//! Reads one command per line from stdin, fires it and prints the result.
//! With `--watch`, server-pushed notifications are printed as they arrive.

use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use dicedb_client::{logging, Client, ClientOptions, DEFAULT_HOST, DEFAULT_PORT};

/// Command shell for a command-execution server
#[derive(Parser)]
#[command(name = "dicedb-cli")]
#[command(version, about = "Command shell with automatic reconnect")]
struct Cli {
    /// Server host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Logical client identity (generated when omitted)
    #[arg(long)]
    identity: Option<String>,

    /// Also open the watch channel and print pushed results
    #[arg(long)]
    watch: bool,
}

impl Cli {
    fn options(&self) -> ClientOptions {
        match &self.identity {
            Some(id) => ClientOptions::default().with_identity(id.clone()),
            None => ClientOptions::default(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let client = match Client::connect(cli.host.clone(), cli.port, cli.options()).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!("identity {}", client.identity());

    if cli.watch {
        match client.watch().await {
            Ok(stream) => {
                tokio::spawn(async move {
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(response) => println!("[watch] {}", response),
                            Err(e) => eprintln!("[watch] stream ended: {}", e),
                        }
                    }
                });
            }
            Err(e) => {
                eprintln!("error: {}", e);
                client.close().await;
                return ExitCode::FAILURE;
            }
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => println!("{}", client.fire_string(&line).await),
            Ok(None) => break,
            Err(e) => {
                eprintln!("error: reading stdin: {}", e);
                break;
            }
        }
    }

    client.close().await;
    ExitCode::SUCCESS
}
