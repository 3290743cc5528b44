//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::CliError;
use crate::api;
use crate::config::Config;
use crate::geolocation::{FixedPosition, acquire_location};
use crate::sync::{HttpTransport, SyncCoordinator, SyncError};
use chrono::{DateTime, Utc};
use civisense_core::primitives::MAX_PHOTO_BYTES;
use civisense_core::{
    CaptureSession, Category, CivicError, GeoPoint, Issue, IssueId, IssueStatus, IssueStore,
    NoAdvice, Photo, Priority, RedbStore, Ward, WardDirectory, WardId, sample_wards,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a ward seed file (10 MB).
const MAX_WARD_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Refuse files larger than `max_size` before reading them.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CliError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > max_size {
        return Err(CivicError::Validation(format!(
            "File {} is {} bytes, maximum is {} bytes",
            path.display(),
            metadata.len(),
            max_size
        ))
        .into());
    }
    Ok(())
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

fn open_store(config: &Config) -> Result<RedbStore, CivicError> {
    tracing::debug!("Opening database {}", config.storage.database.display());
    RedbStore::open(&config.storage.database)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Ward seed file: a TOML document with `[[wards]]` tables.
#[derive(Debug, Deserialize)]
struct WardSeedFile {
    wards: Vec<Ward>,
}

/// Load wards from a seed file.
pub fn load_ward_file(path: &Path) -> Result<Vec<Ward>, CliError> {
    validate_file_size(path, MAX_WARD_FILE_SIZE)?;
    let contents = std::fs::read_to_string(path)?;
    let file: WardSeedFile = toml::from_str(&contents).map_err(|e| {
        CivicError::Validation(format!("Cannot parse ward file {}: {}", path.display(), e))
    })?;
    Ok(file.wards)
}

/// Read a photo from disk, guessing its media type from the extension.
pub fn read_photo(path: &Path) -> Result<Photo, CliError> {
    validate_file_size(path, MAX_PHOTO_BYTES as u64)?;
    let bytes = std::fs::read(path)?;
    let media_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    };
    Ok(Photo::new(media_type, bytes))
}

/// One issue as printed by `list`. Photo bytes are summarised as a count.
#[derive(Debug, Serialize)]
struct IssueRow<'a> {
    id: IssueId,
    status: IssueStatus,
    category: Category,
    priority: Priority,
    ward_id: Option<WardId>,
    location: Option<&'a GeoPoint>,
    description: &'a str,
    photos: usize,
    author_ref: &'a str,
    captured_at: DateTime<Utc>,
}

impl<'a> From<&'a Issue> for IssueRow<'a> {
    fn from(issue: &'a Issue) -> Self {
        Self {
            id: issue.id,
            status: issue.status,
            category: issue.category,
            priority: issue.priority,
            ward_id: issue.ward_id,
            location: issue.location.as_ref(),
            description: issue.display_description(),
            photos: issue.photos.len(),
            author_ref: &issue.author_ref,
            captured_at: issue.captured_at,
        }
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the database and seed the ward directory if it is empty.
pub fn cmd_init(config: &Config, json_mode: bool, wards: Option<&Path>) -> Result<(), CliError> {
    let seed = match wards {
        Some(path) => load_ward_file(path)?,
        None => sample_wards(),
    };

    let store = open_store(config)?;
    let seeded = store.seed_if_empty(&seed)?;
    let count = store.ward_count()?;

    if seeded {
        tracing::info!("Seeded {} ward(s)", count);
    }

    if json_mode {
        print_json(&serde_json::json!({
            "database": config.storage.database.to_string_lossy(),
            "seeded": seeded,
            "ward_count": count,
        }))
    } else {
        println!("Database: {}", config.storage.database.display());
        if seeded {
            println!("Seeded {} ward(s)", count);
        } else {
            println!("Ward directory already holds {} ward(s); nothing seeded", count);
        }
        Ok(())
    }
}

// =============================================================================
// WARDS COMMAND
// =============================================================================

/// List seeded wards.
pub fn cmd_wards(config: &Config, json_mode: bool, zone: Option<&str>) -> Result<(), CliError> {
    let store = open_store(config)?;
    let wards = match zone {
        Some(zone) => store.wards_in_zone(zone)?,
        None => store.all_wards()?,
    };

    if json_mode {
        return print_json(&wards);
    }

    if wards.is_empty() {
        println!("No wards. Run `civisense init` to seed the directory.");
        return Ok(());
    }
    for ward in &wards {
        println!(
            "{:>4}  {:<24} {:<10} {:<14} {} vertices",
            ward.id.0,
            ward.name,
            ward.zone,
            ward.engineer,
            ward.boundary.len()
        );
    }
    Ok(())
}

// =============================================================================
// LOCATE COMMAND
// =============================================================================

/// Resolve the ward of a coordinate.
pub fn cmd_locate(config: &Config, json_mode: bool, lat: f64, lng: f64) -> Result<(), CliError> {
    let point = GeoPoint::new(lat, lng);
    point.validate()?;

    let store = open_store(config)?;
    let ward = match store.resolve(&point)? {
        Some(id) => store.ward(id)?,
        None => None,
    };

    if json_mode {
        return print_json(&serde_json::json!({
            "lat": lat,
            "lng": lng,
            "ward": ward,
        }));
    }

    match ward {
        Some(ward) => println!(
            "{}, {} is in {} ({}, engineer: {})",
            lat, lng, ward.name, ward.zone, ward.engineer
        ),
        None => println!("{}, {} is outside every known ward (unresolved)", lat, lng),
    }
    Ok(())
}

// =============================================================================
// CAPTURE COMMAND
// =============================================================================

/// Everything the `capture` command was given.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub category: Category,
    pub position: Option<(f64, f64)>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub photos: Vec<PathBuf>,
    pub priority: Option<Priority>,
    pub author: Option<String>,
    pub as_draft: bool,
}

/// Walk a capture session through its phases and submit it.
pub async fn cmd_capture(
    config: &Config,
    json_mode: bool,
    request: CaptureRequest,
) -> Result<(), CliError> {
    let store = open_store(config)?;
    let author = request
        .author
        .unwrap_or_else(|| config.capture.author_ref.clone());

    let mut session = CaptureSession::new(author);
    session.select_category(request.category);
    session.advance()?;

    if let Some((lat, lng)) = request.position {
        let mut point = GeoPoint::new(lat, lng);
        if let Some(address) = request.address {
            point = point.with_address(address);
        }
        acquire_location(
            &mut session,
            &FixedPosition(point),
            &store,
            config.capture.location_timeout(),
        )
        .await?;
        session.advance()?;
    }

    for path in &request.photos {
        session.add_photo(read_photo(path)?)?;
    }
    session.refresh_advisory(&NoAdvice);
    if let Some(description) = request.description {
        session.set_description(description)?;
    }
    if let Some(priority) = request.priority {
        session.set_priority(priority);
    }

    let ward_id = session.ward_id();
    let unresolved = session.is_ward_unresolved();
    let priority = session.effective_priority();
    let id = session
        .submit(&store, request.as_draft)
        .map_err(|rejected| rejected.error)?;
    let status = if request.as_draft {
        IssueStatus::Draft
    } else {
        IssueStatus::PendingSync
    };
    tracing::info!("Captured issue {} as {}", id, status);

    if json_mode {
        return print_json(&serde_json::json!({
            "id": id,
            "status": status,
            "ward_id": ward_id,
            "ward_unresolved": unresolved,
            "priority": priority,
        }));
    }

    println!("Issue {} saved as {}", id, status);
    match ward_id {
        Some(ward) => println!("  Ward:     {}", ward),
        None if unresolved => println!("  Ward:     unresolved (outside every known ward)"),
        None => println!("  Ward:     none (no location yet)"),
    }
    println!("  Priority: {}", priority);
    Ok(())
}

// =============================================================================
// QUEUE COMMAND
// =============================================================================

/// Queue a saved draft for sync.
pub fn cmd_queue(config: &Config, json_mode: bool, id: u64) -> Result<(), CliError> {
    let store = open_store(config)?;
    let id = IssueId(id);
    store.queue_draft(id)?;

    if json_mode {
        print_json(&serde_json::json!({ "id": id, "status": IssueStatus::PendingSync }))
    } else {
        println!("Issue {} queued for sync", id);
        Ok(())
    }
}

// =============================================================================
// LIST COMMAND
// =============================================================================

/// Filters for `list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<IssueStatus>,
    pub category: Option<Category>,
    pub ward: Option<u32>,
    pub unresolved: bool,
    /// Captured at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Captured strictly before this instant.
    pub until: Option<DateTime<Utc>>,
}

impl ListFilter {
    fn ward_filter(&self) -> Option<Option<WardId>> {
        if self.unresolved {
            Some(None)
        } else {
            self.ward.map(|w| Some(WardId(w)))
        }
    }

    fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if self.since.is_none() && self.until.is_none() {
            return None;
        }
        Some((
            self.since.unwrap_or(DateTime::<Utc>::MIN_UTC),
            self.until.unwrap_or(DateTime::<Utc>::MAX_UTC),
        ))
    }

    fn matches(&self, issue: &Issue) -> bool {
        self.status.is_none_or(|s| issue.status == s)
            && self.category.is_none_or(|c| issue.category == c)
            && self.ward_filter().is_none_or(|w| issue.ward_id == w)
            && self.since.is_none_or(|t| issue.captured_at >= t)
            && self.until.is_none_or(|t| issue.captured_at < t)
    }
}

/// Issues matching `filter`, oldest first.
///
/// The most selective index is used, the rest is filtered in memory.
pub fn select_issues<S>(store: &S, filter: &ListFilter) -> Result<Vec<Issue>, CivicError>
where
    S: IssueStore + ?Sized,
{
    let mut issues = if let Some(status) = filter.status {
        store.query_by_status(status)?
    } else if let Some(ward) = filter.ward_filter() {
        store.query_by_ward(ward)?
    } else if let Some(category) = filter.category {
        store.query_by_category(category)?
    } else {
        let (from, to) = filter
            .time_range()
            .unwrap_or((DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC));
        store.query_captured_between(from, to)?
    };
    issues.retain(|issue| filter.matches(issue));
    Ok(issues)
}

/// List stored issues.
pub fn cmd_list(config: &Config, json_mode: bool, filter: &ListFilter) -> Result<(), CliError> {
    let store = open_store(config)?;
    let issues = select_issues(&store, filter)?;
    let rows: Vec<IssueRow<'_>> = issues.iter().map(IssueRow::from).collect();

    if json_mode {
        return print_json(&rows);
    }

    if rows.is_empty() {
        println!("No issues");
        return Ok(());
    }
    for row in &rows {
        let ward = row
            .ward_id
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6}  {:<12} {:<11} {:<8} ward {:<4} {}  {}",
            row.id.to_string(),
            row.status.as_str(),
            row.category.as_str(),
            row.priority.as_str(),
            ward,
            row.captured_at.format("%Y-%m-%d %H:%M"),
            row.description
        );
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show per-status issue counts.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), CliError> {
    let store = open_store(config)?;
    let counts = store.status_counts()?;
    let wards = store.ward_count()?;

    if json_mode {
        return print_json(&serde_json::json!({
            "database": config.storage.database.to_string_lossy(),
            "wards": wards,
            "counts": counts,
            "unsent": counts.unsent(),
        }));
    }

    println!("CiviSense Status");
    println!("================");
    println!("Database:     {}", config.storage.database.display());
    println!("Wards:        {}", wards);
    println!("Drafts:       {}", counts.draft);
    println!("Pending sync: {}", counts.pending_sync);
    println!("Sync failed:  {}", counts.sync_failed);
    println!("Synced:       {}", counts.synced);
    Ok(())
}

// =============================================================================
// SYNC COMMAND
// =============================================================================

/// Run one sync cycle against the remote authority.
pub async fn cmd_sync(
    config: &Config,
    json_mode: bool,
    remote: Option<String>,
    retry_failed: bool,
) -> Result<(), CliError> {
    let store = Arc::new(open_store(config)?);
    let remote = remote.unwrap_or_else(|| config.sync.remote_url.clone());
    let timeout = config.sync.transmit_timeout();

    let transport = HttpTransport::new(remote, timeout)?;
    let coordinator = SyncCoordinator::new(Arc::clone(&store), transport)
        .with_transmit_timeout(timeout);

    // Ctrl+C cancels the transmit in flight.
    let cancel = coordinator.cancel_handle();
    let on_interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling sync");
            cancel.cancel();
        }
    });
    let outcome = coordinator.run_cycle(retry_failed).await;
    on_interrupt.abort();

    let report = match outcome {
        Ok(report) => report,
        Err(SyncError::Offline) => {
            let waiting = coordinator.outbox(retry_failed)?.len();
            if !json_mode {
                println!(
                    "Offline: no connection to {}. {} issue(s) remain queued.",
                    coordinator.transport().base_url(),
                    waiting
                );
            }
            return Err(SyncError::Offline.into());
        }
        Err(e) => return Err(e.into()),
    };

    if json_mode {
        return print_json(&report);
    }

    if report.is_empty() {
        println!("Nothing to sync");
        return Ok(());
    }
    println!(
        "Synced {} of {} issue(s)",
        report.synced_count(),
        report.attempted
    );
    if report.duplicates > 0 {
        println!("  {} already held by the authority", report.duplicates);
    }
    for failed in &report.failed {
        println!("  Failed {}: {}", failed.id, failed.reason);
    }
    if report.cancelled {
        println!("  Cancelled; remaining issues stay queued");
    }
    Ok(())
}

// =============================================================================
// PURGE COMMAND
// =============================================================================

/// Remove issues the authority has confirmed.
pub fn cmd_purge(config: &Config, json_mode: bool) -> Result<(), CliError> {
    let mut store = open_store(config)?;
    let removed = purge_synced(&mut store)?;

    if json_mode {
        print_json(&serde_json::json!({ "purged": removed }))
    } else {
        println!("Purged {} synced issue(s)", removed);
        Ok(())
    }
}

/// Drop synced issues and give the freed pages back to the filesystem.
pub fn purge_synced(store: &mut RedbStore) -> Result<u64, CivicError> {
    let removed = store.delete_where(IssueStatus::Synced)?;
    if removed > 0 {
        let compacted = store.compact()?;
        tracing::debug!("Purged {} issue(s), compacted: {}", removed, compacted);
    }
    Ok(removed)
}

// =============================================================================
// AUTHORITY COMMAND
// =============================================================================

/// Run the reference authority server.
pub async fn cmd_authority(host: &str, port: u16) -> Result<(), CliError> {
    println!("CiviSense Authority Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!();
    println!("Endpoints:");
    println!("  POST /issues - Submit an issue");
    println!("  GET  /issues - List accepted issues");
    println!("  GET  /status - Ledger totals");
    println!("  GET  /health - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr).await?;
    Ok(())
}
