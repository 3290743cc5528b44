//! # CiviSense - Field Capture
//!
//! The main binary for offline-first civic issue reporting.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   apps/civisense (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌──────────────────┐    ┌───────────────┐  │
//! │  │   CLI       │    │ Sync Coordinator │    │  Authority    │  │
//! │  │  (clap)     │    │    (reqwest)     │    │  API (axum)   │  │
//! │  └──────┬──────┘    └────────┬─────────┘    └───────────────┘  │
//! │         │                    │                                  │
//! │         └─────────┬──────────┘                                  │
//! │                   ▼                                             │
//! │           ┌────────────────┐                                    │
//! │           │ civisense-core │                                    │
//! │           │  (THE LOGIC)   │                                    │
//! │           └────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! civisense init
//! civisense capture -t pothole --lat 22.3080 --lng 73.1830 -d "Deep pothole"
//! civisense sync --remote http://127.0.0.1:8080
//! civisense authority --port 8080
//! ```

use civisense::cli::{self, Cli};
use civisense::config::LoggingConfig;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging);

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing. CIVISENSE_LOG_FORMAT=json enables machine-parseable
/// output; RUST_LOG overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let log_format =
        std::env::var("CIVISENSE_LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "civisense={level},civisense_core={level},tower_http=debug",
            level = logging.level
        )
        .into()
    });

    // Logs go to stderr so --json-mode output on stdout stays parseable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Print the CiviSense startup banner.
fn print_banner() {
    println!(
        r#"
   ____ _       _ ____
  / ___(_)_   _(_) ___|  ___ _ __  ___  ___
 | |   | \ \ / / \___ \ / _ \ '_ \/ __|/ _ \
 | |___| |\ V /| |___) |  __/ | | \__ \  __/
  \____|_| \_/ |_|____/ \___|_| |_|___/\___|

  Field Capture v{}

  Offline-first • Geofenced • At-least-once sync
"#,
        env!("CARGO_PKG_VERSION")
    );
}
