use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

pub const PORT: u16 = 6379;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// The address to bind the listener to
    #[arg(long, env = "AOFDIS_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// The port to listen on
    #[arg(short, long, env = "AOFDIS_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Path of the append-only command log, replayed on startup
    #[arg(long, env = "AOFDIS_AOF_PATH", default_value = "database.aof")]
    pub aof_path: PathBuf,

    /// Milliseconds between flushes of the command log to disk
    #[arg(long, env = "AOFDIS_FLUSH_INTERVAL_MS", default_value_t = 1000)]
    pub flush_interval_ms: u64,

    /// Largest request, in bytes, a client may have buffered
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl Config {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: PORT,
            aof_path: PathBuf::from("database.aof"),
            flush_interval_ms: 1000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
