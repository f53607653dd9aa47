// Command-line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::scoring::{
    ScoringPolicy, DEFAULT_DECAY_BASE, DEFAULT_DECAY_RATE, DEFAULT_MAX_WINDOW_SECS,
    DEFAULT_MIN_INTERVAL_SECS,
};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:pwnts.db?mode=rwc";

/// Red-team beacon collector and scoreboard.
#[derive(Debug, Parser)]
#[command(name = "pwnts-collector", version)]
pub struct Cli {
    /// SQLite connection string.
    #[arg(long, global = true, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Option<Command>,

    // Listener settings when no subcommand is given.
    #[command(flatten)]
    pub serve: Config,
}

impl Cli {
    /// The subcommand to run, with a bare invocation treated as `serve`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the beacon listener and the HTTP scoreboard (default).
    Serve(Config),
    /// Register a team.
    RegisterTeam {
        #[arg(long)]
        name: String,
        #[arg(long, env = "PWNTS_TEAM_PASSWORD")]
        password: String,
    },
    /// Bind an agent UUID to a team.
    RegisterAgent {
        #[arg(long)]
        uuid: String,
        #[arg(long)]
        team_id: i64,
    },
    /// Import a target scope file (`ip,value` per line).
    ImportTargets { path: PathBuf },
}

/// Listener and scoring configuration.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Address for the beacon listener.
    #[arg(long, env = "PWNTS_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port for the beacon listener.
    #[arg(long, env = "PWNTS_PORT", default_value_t = 444)]
    pub port: u16,

    /// Bind the beacon listener to loopback only.
    #[arg(long, env = "PWNTS_TEST")]
    pub test: bool,

    /// Address for the HTTP scoreboard.
    #[arg(long, env = "PWNTS_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: SocketAddr,

    /// PEM certificate chain for the beacon listener.
    #[arg(long, env = "PWNTS_CERT", default_value = "pwnts_cert.pem")]
    pub cert: PathBuf,

    /// PEM private key for the beacon listener.
    #[arg(long, env = "PWNTS_KEY", default_value = "pwnts_key.pem")]
    pub key: PathBuf,

    /// Scope file imported before the listener starts.
    #[arg(long, env = "PWNTS_TARGETS_FILE")]
    pub targets_file: Option<PathBuf>,

    /// Deadline covering the TLS handshake and payload read.
    #[arg(long, env = "PWNTS_READ_DEADLINE_MS", default_value_t = 1000)]
    pub read_deadline_ms: u64,

    #[arg(long, env = "PWNTS_MIN_INTERVAL_SECS", default_value_t = DEFAULT_MIN_INTERVAL_SECS)]
    pub min_interval_secs: i64,

    #[arg(long, env = "PWNTS_MAX_WINDOW_SECS", default_value_t = DEFAULT_MAX_WINDOW_SECS)]
    pub max_window_secs: i64,

    #[arg(long, env = "PWNTS_DECAY_BASE", default_value_t = DEFAULT_DECAY_BASE)]
    pub decay_base: f64,

    #[arg(
        long,
        env = "PWNTS_DECAY_RATE",
        default_value_t = DEFAULT_DECAY_RATE,
        allow_negative_numbers = true
    )]
    pub decay_rate: f64,
}

impl Config {
    pub fn listen_address(&self) -> SocketAddr {
        let ip = if self.test {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.bind
        };
        SocketAddr::new(ip, self.port)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            min_interval_secs: self.min_interval_secs,
            max_window_secs: self.max_window_secs,
            decay_base: self.decay_base,
            decay_rate: self.decay_rate,
        }
    }
}
