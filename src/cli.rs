use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::breeds::DEFAULT_BREEDS_URL;

#[derive(Parser, Debug)]
#[command(
    name = "spycats",
    version,
    about = "Spy cat agency service: cats, missions and targets over HTTP"
)]
pub struct Cli {
    #[arg(
        long,
        env = "SPYCATS_DB_PATH",
        value_name = "PATH",
        default_value = "./spy_cats.db",
        help = "SQLite database file"
    )]
    pub db_path: PathBuf,
    #[arg(
        long,
        env = "SPYCATS_BIND",
        value_name = "ADDR",
        default_value = "0.0.0.0:8000",
        help = "Address the HTTP server listens on"
    )]
    pub bind: SocketAddr,
    #[arg(
        long,
        env = "SPYCATS_BREEDS_URL",
        value_name = "URL",
        default_value = DEFAULT_BREEDS_URL,
        help = "Base URL of the breed catalog"
    )]
    pub breeds_url: String,
    /// Validate breeds against a local JSON catalog instead of the remote one.
    #[arg(long, env = "SPYCATS_BREEDS_FILE", value_name = "PATH")]
    pub breeds_file: Option<PathBuf>,
    #[arg(
        long,
        env = "SPYCATS_BREED_CACHE_TTL_SECS",
        value_name = "SECS",
        default_value_t = 3600
    )]
    pub breed_cache_ttl_secs: u64,
    #[arg(
        long,
        env = "SPYCATS_BREED_TIMEOUT_SECS",
        value_name = "SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub breed_timeout_secs: u64,
}

impl Cli {
    pub fn breed_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.breed_cache_ttl_secs)
    }

    pub fn breed_timeout(&self) -> Duration {
        Duration::from_secs(self.breed_timeout_secs)
    }
}
