use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tftplite::tftp::client::client_main;
use tftplite::tftp::server::{server_main, ServerConfig};

/// Trivial File Transfer Protocol client and server.
#[derive(Parser, Debug)]
#[command(version, author = "shakram02")]
struct Opts {
    /// More output per occurrence (-v debug, -vv packet dumps). RUST_LOG wins if set.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// act as a TFTP client.
    #[command(name = "client")]
    Client(ClientArgs),
    /// act as a TFTP server.
    #[command(name = "server")]
    Server(ServerArgs),
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// UDP port that the server will listen on.
    port: u16,
    /// IP for the server to use.
    #[arg(short = 'a', long = "address", default_value = "0.0.0.0")]
    address: String,
    /// Directory files are served from.
    #[arg(short = 'r', long = "root", default_value = ".")]
    root: PathBuf,
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Server host name or address.
    host: String,
    /// Server port.
    port: u16,
    /// name of the file to be downloaded.
    filename: String,
    /// Local path to write to, defaults to FILENAME.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,
}

/// Joins host and port, bracketing IPv6 literals.
fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();
    init_tracing(opts.verbose);

    match opts.subcmd {
        SubCommand::Client(client_args) => {
            let addr = host_port(&client_args.host, client_args.port);
            let dest = client_args
                .output
                .unwrap_or_else(|| PathBuf::from(&client_args.filename));

            println!("[DOWNLOAD] FILE: ({}) SERVER: {}", client_args.filename, addr);

            let stats = client_main(&addr, &client_args.filename, &dest)
                .with_context(|| format!("failed to download {} from {}", client_args.filename, addr))?;
            println!("{}", stats);
        }
        SubCommand::Server(server_args) => {
            let config = ServerConfig {
                bind_address: host_port(&server_args.address, server_args.port),
                root_directory: server_args.root,
            };

            server_main(&config).context("TFTP server failed")?;
        }
    };

    Ok(())
}
