//! Command-line configuration for the mailserver binary.

use clap::Parser;

/// AirDispatch mailserver.
#[derive(Parser, Debug)]
#[command(name = "airdispatch-server")]
#[command(about = "AirDispatch federated mailserver")]
#[command(version)]
pub struct ServerConfig {
    /// Address to bind to.
    #[arg(short, long, default_value = "0.0.0.0:2048")]
    pub bind: String,

    /// Location this server publishes as its own address (defaults to
    /// `bind` if unset; useful when the bind address isn't externally
    /// reachable, e.g. behind a load balancer).
    #[arg(short, long)]
    pub location: Option<String>,

    /// Tracker `host:port` to query and register with; may be repeated.
    #[arg(short, long)]
    pub trackers: Vec<String>,

    /// Path to this server's persisted identity blob. Created on first run
    /// if absent.
    #[arg(short, long, default_value = "identity.blob")]
    pub identity: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
