use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kvs_types::Resource;

#[derive(Parser)]
#[command(
    name = "kvs",
    about = "Key-value resource store: permalinks, metastore cache, and distributed locks",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Validate the config file and print its effective settings
    CheckConfig,
    /// Delete expired entries
    Sweep(SweepArgs),
    /// Bootstrap a permalink salt and print its fingerprint
    SaltFingerprint(SaltArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Overrides `server.bind_addr`
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct SweepArgs {
    /// Resources to sweep (e.g. `lock`, `metastore_cache`)
    #[arg(required_unless_present = "all")]
    pub resources: Vec<Resource>,
    /// Sweep every resource
    #[arg(long, conflicts_with = "resources")]
    pub all: bool,
}

#[derive(Args)]
pub struct SaltArgs {
    /// A permalink resource (e.g. `dashboard_permalink`)
    pub resource: Resource,
}
