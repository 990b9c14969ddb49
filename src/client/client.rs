use std::{
    fs,
    io::{self, Read, Write},
    net::SocketAddr,
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use httpserver::FileClient;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a file and write it to standard output
    Get(Target),
    /// Create or replace a file
    Put(Upload),
    /// Append to an existing file
    Append(Upload),
}

#[derive(Args, Debug)]
struct Target {
    /// File name on the server, with or without the leading `/`
    path: String,

    #[arg(short, long, default_value_t = 0)]
    request_id: u64,
}

#[derive(Args, Debug)]
struct Upload {
    #[clap(flatten)]
    target: Target,

    /// Read the body from this file instead of standard input
    #[arg(short, long)]
    body: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(name = "client", about = "Talks to an httpserver instance")]
struct Arguments {
    /// Server address, e.g. 127.0.0.1:8080
    addr: SocketAddr,

    #[clap(subcommand)]
    command: Commands,
}

fn read_body(upload: &Upload) -> Result<Vec<u8>> {
    match &upload.body {
        Some(path) => fs::read(path).with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut body = Vec::new();
            io::stdin().read_to_end(&mut body).context("Failed to read standard input")?;
            Ok(body)
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Arguments::parse();
    let client = FileClient::connect_to(args.addr)
        .with_context(|| format!("Failed to connect to {}", args.addr))?;

    let response = match &args.command {
        Commands::Get(target) => {
            client.get(target.path.trim_start_matches('/'), target.request_id)
        }
        Commands::Put(upload) => {
            let body = read_body(upload)?;
            client.put(upload.target.path.trim_start_matches('/'), &body, upload.target.request_id)
        }
        Commands::Append(upload) => {
            let body = read_body(upload)?;
            client.append(upload.target.path.trim_start_matches('/'), &body, upload.target.request_id)
        }
    }
    .context("Request failed")?;

    eprintln!("{} {}", response.code, response.reason);
    io::stdout().write_all(&response.body)?;
    if !response.trailing.is_empty() {
        eprintln!("{}", String::from_utf8_lossy(&response.trailing).trim_end());
    }

    Ok(if (200..300).contains(&response.code) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
