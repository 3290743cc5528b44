//! # CiviSense CLI Module
//!
//! This module implements the CLI interface for the field app.
//!
//! ## Available Commands
//!
//! - `init` - Create the database and seed the ward directory
//! - `wards` - List seeded wards
//! - `locate` - Resolve the ward of a coordinate
//! - `capture` - Report an issue (saved as draft or queued for sync)
//! - `queue` - Queue a saved draft for sync
//! - `list` - List stored issues
//! - `status` - Show per-status issue counts
//! - `sync` - Push queued issues to the remote authority
//! - `purge` - Remove issues the authority has confirmed
//! - `authority` - Run the reference authority server

mod commands;

use crate::config::{Config, ConfigError};
use crate::sync::{SyncError, TransmitError};
use chrono::{DateTime, Utc};
use civisense_core::{Category, CivicError, IssueStatus, Priority};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

pub use commands::*;

// =============================================================================
// ERRORS
// =============================================================================

/// Anything a command can fail with.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Civic(#[from] CivicError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Transmit(#[from] TransmitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// CiviSense - offline-first civic issue capture
///
/// Records issues with photos and GPS fixes while offline, resolves their
/// ward, and syncs them to the municipal authority when a connection exists.
#[derive(Parser, Debug)]
#[command(name = "civisense")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the issue database (overrides config and CIVISENSE_DB)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and seed wards if the directory is empty
    Init {
        /// TOML file with `[[wards]]` entries (default: built-in sample wards)
        #[arg(short, long)]
        wards: Option<PathBuf>,
    },

    /// List seeded wards
    Wards {
        /// Only wards in this zone
        #[arg(short, long)]
        zone: Option<String>,
    },

    /// Resolve which ward contains a coordinate
    Locate {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
    },

    /// Capture an issue
    Capture {
        /// Issue category (pothole, garbage, drainage, streetlight, road, water)
        #[arg(short = 't', long)]
        category: Category,

        /// Latitude of the location fix
        #[arg(long, allow_negative_numbers = true, requires = "lng")]
        lat: Option<f64>,

        /// Longitude of the location fix
        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        lng: Option<f64>,

        /// Human-readable address of the location
        #[arg(long)]
        address: Option<String>,

        /// Free-text description
        #[arg(short, long)]
        description: Option<String>,

        /// Photo files to attach (repeatable)
        #[arg(short = 'f', long = "photo")]
        photos: Vec<PathBuf>,

        /// Priority (low, medium, high, critical)
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Author reference (overrides config and CIVISENSE_AUTHOR)
        #[arg(short, long)]
        author: Option<String>,

        /// Save as draft instead of queueing for sync
        #[arg(long)]
        draft: bool,
    },

    /// Queue a saved draft for sync
    Queue {
        /// Issue id
        #[arg(short, long)]
        id: u64,
    },

    /// List stored issues
    List {
        /// Only issues with this status (draft, pending_sync, synced, sync_failed)
        #[arg(short, long)]
        status: Option<IssueStatus>,

        /// Only issues of this category
        #[arg(short = 't', long)]
        category: Option<Category>,

        /// Only issues resolved to this ward
        #[arg(short, long)]
        ward: Option<u32>,

        /// Only issues with no resolved ward
        #[arg(long, conflicts_with = "ward")]
        unresolved: bool,

        /// Only issues captured at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Only issues captured before this RFC 3339 time
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },

    /// Show per-status issue counts
    Status,

    /// Push queued issues to the remote authority
    Sync {
        /// Authority base URL (overrides config and CIVISENSE_REMOTE_URL)
        #[arg(short, long)]
        remote: Option<String>,

        /// Also resend issues whose last attempt failed
        #[arg(long)]
        retry_failed: bool,
    },

    /// Remove issues the authority has confirmed
    Purge,

    /// Run the reference authority server
    Authority {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}

impl Cli {
    /// Load configuration and apply global flag overrides.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.storage.database = database.clone();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        Ok(config)
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and loaded configuration.
pub async fn execute(cli: Cli, config: Config) -> Result<(), CliError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { wards }) => cmd_init(&config, json_mode, wards.as_deref()),
        Some(Commands::Wards { zone }) => cmd_wards(&config, json_mode, zone.as_deref()),
        Some(Commands::Locate { lat, lng }) => cmd_locate(&config, json_mode, lat, lng),
        Some(Commands::Capture {
            category,
            lat,
            lng,
            address,
            description,
            photos,
            priority,
            author,
            draft,
        }) => {
            let request = CaptureRequest {
                category,
                position: lat.zip(lng),
                address,
                description,
                photos,
                priority,
                author,
                as_draft: draft,
            };
            cmd_capture(&config, json_mode, request).await
        }
        Some(Commands::Queue { id }) => cmd_queue(&config, json_mode, id),
        Some(Commands::List {
            status,
            category,
            ward,
            unresolved,
            since,
            until,
        }) => {
            let filter = ListFilter {
                status,
                category,
                ward,
                unresolved,
                since,
                until,
            };
            cmd_list(&config, json_mode, &filter)
        }
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
        Some(Commands::Sync {
            remote,
            retry_failed,
        }) => cmd_sync(&config, json_mode, remote, retry_failed).await,
        Some(Commands::Purge) => cmd_purge(&config, json_mode),
        Some(Commands::Authority { host, port }) => cmd_authority(&host, port).await,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn capture_parses_typed_arguments() {
        let cli = Cli::try_parse_from([
            "civisense",
            "capture",
            "--category",
            "pothole",
            "--lat",
            "22.308",
            "--lng",
            "73.183",
            "--priority",
            "high",
            "--draft",
        ])
        .expect("parse");

        match cli.command {
            Some(Commands::Capture {
                category,
                lat,
                priority,
                draft,
                ..
            }) => {
                assert_eq!(category, Category::Pothole);
                assert_eq!(lat, Some(22.308));
                assert_eq!(priority, Some(Priority::High));
                assert!(draft);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn unknown_category_rejected() {
        assert!(Cli::try_parse_from(["civisense", "capture", "--category", "graffiti"]).is_err());
    }

    #[test]
    fn status_accepts_dashed_name() {
        let cli = Cli::try_parse_from(["civisense", "list", "--status", "sync-failed"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Some(Commands::List {
                status: Some(IssueStatus::SyncFailed),
                ..
            })
        ));
    }

    #[test]
    fn list_accepts_capture_window() {
        let cli = Cli::try_parse_from([
            "civisense",
            "list",
            "--since",
            "2026-10-01T00:00:00Z",
            "--until",
            "2026-10-02T06:30:00+05:30",
        ])
        .expect("parse");

        match cli.command {
            Some(Commands::List { since, until, .. }) => {
                assert_eq!(
                    since.map(|t| t.to_rfc3339()).as_deref(),
                    Some("2026-10-01T00:00:00+00:00")
                );
                assert_eq!(
                    until.map(|t| t.to_rfc3339()).as_deref(),
                    Some("2026-10-02T01:00:00+00:00")
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["civisense", "list", "--since", "yesterday"]).is_err());
    }
}
