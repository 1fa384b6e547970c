mod client;

use anyhow::{Context, Result};
use clap::Parser;
use client::{PlaygroundClient, PollReply};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Submit a source file to a playground server and stream its output.
#[derive(Debug, Parser)]
struct Args {
    /// Base URL of the playground server
    #[clap(short = 's', long = "server", default_value = "http://localhost:8787")]
    server: String,

    /// Source file to run; reads stdin when omitted
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let code = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let client = PlaygroundClient::new(&args.server);
    let pid = client.run(&code).await?;
    loop {
        match client.poll(pid).await? {
            PollReply::Running { output } => {
                print!("{}", output);
                std::io::stdout().flush()?;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            PollReply::Success { output } => {
                print!("{}", output);
                return Ok(());
            }
            PollReply::Error { message } => {
                match message {
                    serde_json::Value::String(text) => eprintln!("{}", text),
                    other => eprintln!("{}", serde_json::to_string_pretty(&other)?),
                }
                std::process::exit(1);
            }
        }
    }
}
