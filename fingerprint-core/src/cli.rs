//! Command Line Interface
//!
//! Collects a fingerprint from the host (headless) or from a captured browser
//! snapshot, and optionally reports or verifies it against a device code
//! server.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fingerprint-agent")]
#[command(version)]
#[command(about = "Device fingerprint collection and device code reporting")]
#[command(long_about = "Device fingerprint collection and device code reporting

Without --snapshot the host is probed headless (no browser APIs).
With --snapshot a BrowserEnvironment JSON captured by a page shim is used.

EXAMPLES:
    fingerprint-agent collect                      Print the headless fingerprint
    fingerprint-agent collect --snapshot env.json --signals
    fingerprint-agent stability --snapshot env.json
    fingerprint-agent report --snapshot env.json --merchant-key mk_live_01
    fingerprint-agent verify 0123456789abcdef0123456789abcdef
    fingerprint-agent compare before.json after.json

ENVIRONMENT VARIABLES:
    RUST_LOG=debug                       Enable debug logging
    FINGERPRINT_SERVER_URL               Device code server (default http://localhost:8080)
    FINGERPRINT_MERCHANT_KEY             Merchant key used to salt and sign
    FINGERPRINT_SECRET_KEY               Signing secret (defaults to the merchant key)
    FINGERPRINT_TIMEOUT_SECS             HTTP timeout
    FINGERPRINT_SIMILARITY_THRESHOLD     Threshold used by compare (default 0.8)")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect signals and print the fingerprint
    Collect {
        #[command(flatten)]
        source: SourceArgs,

        /// Also print the full signal set
        #[arg(long)]
        signals: bool,

        /// Also print live device status
        #[arg(long)]
        status: bool,
    },

    /// Run the stability checks (two collections 100 ms apart)
    Stability {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Collect and report to the device code server
    Report {
        #[command(flatten)]
        source: SourceArgs,

        /// Page URL sent with the report
        #[arg(long)]
        url: Option<String>,

        /// Page referrer sent with the report
        #[arg(long)]
        referrer: Option<String>,
    },

    /// Verify a fingerprint against the device code server
    Verify {
        /// Fingerprint (32 hex chars)
        fingerprint: String,

        /// Merchant key (defaults to FINGERPRINT_MERCHANT_KEY)
        #[arg(long)]
        merchant_key: Option<String>,
    },

    /// Score how similar two browser snapshots are
    Compare {
        /// First BrowserEnvironment JSON snapshot
        first: PathBuf,

        /// Second BrowserEnvironment JSON snapshot
        second: PathBuf,

        /// Similarity threshold in [0, 1] (defaults to FINGERPRINT_SIMILARITY_THRESHOLD)
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[derive(Args, Clone)]
pub struct SourceArgs {
    /// BrowserEnvironment JSON snapshot; host is probed headless when absent
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Merchant key (salts the fingerprint; defaults to FINGERPRINT_MERCHANT_KEY)
    #[arg(long)]
    pub merchant_key: Option<String>,

    /// Signing secret (defaults to FINGERPRINT_SECRET_KEY, then the merchant key)
    #[arg(long)]
    pub secret_key: Option<String>,
}
