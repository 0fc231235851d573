// Runtime configuration (spec §6): where the record lives, how chatty
// logging should be, which peripheral to look for, and how patient to
// be with it.

use clap::Parser;
use std::path::PathBuf;

fn default_directory() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bali")
}

#[derive(Debug, Clone, Parser)]
pub struct Settings {
    /// Directory the persisted config record lives in.
    #[arg(long, default_value_os_t = default_directory())]
    pub directory: PathBuf,

    /// 0 = warn, 1 = info, 2 = debug, 3 = trace.
    #[arg(long, default_value_t = 0)]
    pub debug_level: u8,

    /// Advertised local name of the HSM peripheral.
    #[arg(long, default_value = "ArmorD")]
    pub device_name: String,

    /// BLE scan timeout, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub scan_timeout_ms: u64,

    /// Maximum block-exchange attempts per request.
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            debug_level: 0,
            device_name: "ArmorD".to_string(),
            scan_timeout_ms: 1000,
            max_attempts: 3,
        }
    }
}

impl Settings {
    /// Map the `0..3` debug level onto a `tracing` filter directive.
    pub fn tracing_filter(&self) -> &'static str {
        match self.debug_level {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
