//! # redb-backed Issue Store and Ward Directory
//!
//! A single embedded database file holds both durable collections:
//! - Issues, with secondary indexes on status, category, capture time and ward
//! - Wards, kept in seed order, with indexes on ward id and zone
//!
//! redb gives us:
//! - ACID transactions (each store call is exactly one write transaction)
//! - Crash safety (copy-on-write B-trees, fsync on commit)
//! - MVCC (the sync coordinator can read while capture writes)
//!
//! Secondary index keys end in `(captured_at_millis, issue_id)`, so a range
//! scan over one index prefix yields issues oldest-first with ties broken by
//! id.

use super::{IssueStore, StatusCounts, validate_new_issue};
use crate::geometry;
use crate::wards::{WardDirectory, validate_seed};
use crate::{Category, CivicError, Issue, IssueId, IssueStatus, NewIssue, Ward, WardId};
use chrono::{DateTime, Utc};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table,
    TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Table for issues: IssueId(u64) -> postcard-encoded Issue
const ISSUES: TableDefinition<u64, &[u8]> = TableDefinition::new("issues");

/// Status index: (status code, captured_at millis, issue id) -> issue id
const STATUS_INDEX: TableDefinition<(u8, i64, u64), u64> =
    TableDefinition::new("issue_status_idx");

/// Category index: (category code, captured_at millis, issue id) -> issue id
const CATEGORY_INDEX: TableDefinition<(u8, i64, u64), u64> =
    TableDefinition::new("issue_category_idx");

/// Capture time index: (captured_at millis, issue id) -> issue id
const TIME_INDEX: TableDefinition<(i64, u64), u64> = TableDefinition::new("issue_time_idx");

/// Ward index: (ward key, captured_at millis, issue id) -> issue id
const WARD_INDEX: TableDefinition<(u64, i64, u64), u64> = TableDefinition::new("issue_ward_idx");

/// Table for wards: seed ordinal(u64) -> postcard-encoded Ward
const WARDS: TableDefinition<u64, &[u8]> = TableDefinition::new("wards");

/// Ward id index: WardId(u32) -> seed ordinal
const WARD_ID_INDEX: TableDefinition<u32, u64> = TableDefinition::new("ward_id_idx");

/// Zone index: (zone, seed ordinal) -> WardId(u32)
const ZONE_INDEX: TableDefinition<(&str, u64), u32> = TableDefinition::new("ward_zone_idx");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Metadata key of the next issue id to hand out. Only ever increases.
const NEXT_ISSUE_ID: &str = "next_issue_id";

/// Ward index key for issues without a resolved ward.
const UNRESOLVED_WARD_KEY: u64 = u64::MAX;

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Classify a redb failure as storage-full or storage-unavailable.
fn storage_err<E: Into<redb::Error>>(err: E) -> CivicError {
    match err.into() {
        redb::Error::Io(io) if io.kind() == std::io::ErrorKind::StorageFull => {
            CivicError::StorageFull(io.to_string())
        }
        other => CivicError::StorageUnavailable(other.to_string()),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CivicError> {
    postcard::to_allocvec(value).map_err(|e| CivicError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CivicError> {
    postcard::from_bytes(bytes).map_err(|e| CivicError::SerializationError(e.to_string()))
}

fn ward_key(ward: Option<WardId>) -> u64 {
    ward.map(|w| u64::from(w.0)).unwrap_or(UNRESOLVED_WARD_KEY)
}

/// Drain an index range into issue ids.
fn ids_in<K: redb::Key + 'static>(
    range: redb::Range<'_, K, u64>,
) -> Result<Vec<IssueId>, CivicError> {
    range
        .map(|entry| {
            entry
                .map(|(_, value)| IssueId(value.value()))
                .map_err(storage_err)
        })
        .collect()
}

// =============================================================================
// SECONDARY INDEXES
// =============================================================================

/// The four issue indexes, opened inside one write transaction.
struct IssueIndexes<'txn> {
    status: Table<'txn, (u8, i64, u64), u64>,
    category: Table<'txn, (u8, i64, u64), u64>,
    time: Table<'txn, (i64, u64), u64>,
    ward: Table<'txn, (u64, i64, u64), u64>,
}

impl<'txn> IssueIndexes<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self, CivicError> {
        Ok(Self {
            status: txn.open_table(STATUS_INDEX).map_err(storage_err)?,
            category: txn.open_table(CATEGORY_INDEX).map_err(storage_err)?,
            time: txn.open_table(TIME_INDEX).map_err(storage_err)?,
            ward: txn.open_table(WARD_INDEX).map_err(storage_err)?,
        })
    }

    fn insert(&mut self, issue: &Issue) -> Result<(), CivicError> {
        let at = issue.captured_at.timestamp_millis();
        let id = issue.id.0;
        self.status
            .insert((issue.status.code(), at, id), id)
            .map_err(storage_err)?;
        self.category
            .insert((issue.category.code(), at, id), id)
            .map_err(storage_err)?;
        self.time.insert((at, id), id).map_err(storage_err)?;
        self.ward
            .insert((ward_key(issue.ward_id), at, id), id)
            .map_err(storage_err)?;
        Ok(())
    }

    fn remove(&mut self, issue: &Issue) -> Result<(), CivicError> {
        let at = issue.captured_at.timestamp_millis();
        let id = issue.id.0;
        self.status
            .remove((issue.status.code(), at, id))
            .map_err(storage_err)?;
        self.category
            .remove((issue.category.code(), at, id))
            .map_err(storage_err)?;
        self.time.remove((at, id)).map_err(storage_err)?;
        self.ward
            .remove((ward_key(issue.ward_id), at, id))
            .map_err(storage_err)?;
        Ok(())
    }

    fn move_status(&mut self, issue: &Issue, to: IssueStatus) -> Result<(), CivicError> {
        let at = issue.captured_at.timestamp_millis();
        let id = issue.id.0;
        self.status
            .remove((issue.status.code(), at, id))
            .map_err(storage_err)?;
        self.status
            .insert((to.code(), at, id), id)
            .map_err(storage_err)?;
        Ok(())
    }
}

// =============================================================================
// REDB STORE
// =============================================================================

/// A disk-backed issue store and ward directory using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Where the database file lives.
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CivicError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            let _ = write_txn.open_table(ISSUES).map_err(storage_err)?;
            let _ = IssueIndexes::open(&write_txn)?;
            let _ = write_txn.open_table(WARDS).map_err(storage_err)?;
            let _ = write_txn.open_table(WARD_ID_INDEX).map_err(storage_err)?;
            let _ = write_txn.open_table(ZONE_INDEX).map_err(storage_err)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        Ok(Self {
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compact the database file, e.g. after purging synced issues.
    pub fn compact(&mut self) -> Result<bool, CivicError> {
        self.db.compact().map_err(storage_err)
    }

    fn begin_read(&self) -> Result<ReadTransaction, CivicError> {
        self.db.begin_read().map_err(storage_err)
    }

    /// Resolve issue ids to records within one read snapshot.
    fn load_issues(
        &self,
        read_txn: &ReadTransaction,
        ids: Vec<IssueId>,
    ) -> Result<Vec<Issue>, CivicError> {
        let issues_table = read_txn.open_table(ISSUES).map_err(storage_err)?;
        let mut issues = Vec::with_capacity(ids.len());
        for id in ids {
            match issues_table.get(id.0).map_err(storage_err)? {
                Some(data) => issues.push(decode::<Issue>(data.value())?),
                None => {
                    return Err(CivicError::StorageUnavailable(format!(
                        "index references missing issue {}",
                        id
                    )));
                }
            }
        }
        Ok(issues)
    }

    fn query_code_index(
        &self,
        definition: TableDefinition<(u8, i64, u64), u64>,
        code: u8,
    ) -> Result<Vec<Issue>, CivicError> {
        let read_txn = self.begin_read()?;
        let ids = {
            let table = read_txn.open_table(definition).map_err(storage_err)?;
            ids_in(
                table
                    .range((code, i64::MIN, 0u64)..=(code, i64::MAX, u64::MAX))
                    .map_err(storage_err)?,
            )?
        };
        self.load_issues(&read_txn, ids)
    }

    fn load_ward(
        table: &redb::ReadOnlyTable<u64, &'static [u8]>,
        ordinal: u64,
    ) -> Result<Option<Ward>, CivicError> {
        match table.get(ordinal).map_err(storage_err)? {
            Some(data) => Ok(Some(decode::<Ward>(data.value())?)),
            None => Ok(None),
        }
    }
}

impl IssueStore for RedbStore {
    fn create_at(
        &self,
        issue: NewIssue,
        captured_at: DateTime<Utc>,
    ) -> Result<IssueId, CivicError> {
        validate_new_issue(&issue)?;

        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let id = {
            let mut meta_table = write_txn.open_table(METADATA).map_err(storage_err)?;
            let next = meta_table
                .get(NEXT_ISSUE_ID)
                .map_err(storage_err)?
                .map(|v| v.value())
                .unwrap_or(1);
            meta_table
                .insert(NEXT_ISSUE_ID, next.saturating_add(1))
                .map_err(storage_err)?;
            IssueId(next)
        };

        // The ward always comes from the stored boundaries, never the caller.
        let ward_id = match &issue.location {
            Some(point) => {
                let wards_table = write_txn.open_table(WARDS).map_err(storage_err)?;
                let mut wards = Vec::new();
                for entry in wards_table.iter().map_err(storage_err)? {
                    let (_ordinal, data) = entry.map_err(storage_err)?;
                    wards.push(decode::<Ward>(data.value())?);
                }
                geometry::locate(point, &wards)
            }
            None => None,
        };

        let issue = Issue::from_new(id, issue, ward_id, captured_at);
        let bytes = encode(&issue)?;
        {
            let mut issues_table = write_txn.open_table(ISSUES).map_err(storage_err)?;
            issues_table
                .insert(id.0, bytes.as_slice())
                .map_err(storage_err)?;
            IssueIndexes::open(&write_txn)?.insert(&issue)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(id)
    }

    fn get(&self, id: IssueId) -> Result<Option<Issue>, CivicError> {
        let read_txn = self.begin_read()?;
        let issues_table = read_txn.open_table(ISSUES).map_err(storage_err)?;

        match issues_table.get(id.0).map_err(storage_err)? {
            Some(data) => Ok(Some(decode::<Issue>(data.value())?)),
            None => Ok(None),
        }
    }

    fn update_status(&self, id: IssueId, status: IssueStatus) -> Result<(), CivicError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut issues_table = write_txn.open_table(ISSUES).map_err(storage_err)?;
            let mut issue: Issue = match issues_table.get(id.0).map_err(storage_err)? {
                Some(data) => decode(data.value())?,
                None => return Err(CivicError::NotFound(id)),
            };

            let next = issue.status.transition_to(status)?;
            if next.requires_location() && issue.location.is_none() {
                return Err(CivicError::Validation(format!(
                    "issue {} has no location and cannot become {}",
                    id, next
                )));
            }

            IssueIndexes::open(&write_txn)?.move_status(&issue, next)?;
            issue.status = next;
            let bytes = encode(&issue)?;
            issues_table
                .insert(id.0, bytes.as_slice())
                .map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }

    fn query_by_status(&self, status: IssueStatus) -> Result<Vec<Issue>, CivicError> {
        self.query_code_index(STATUS_INDEX, status.code())
    }

    fn query_by_category(&self, category: Category) -> Result<Vec<Issue>, CivicError> {
        self.query_code_index(CATEGORY_INDEX, category.code())
    }

    fn query_by_ward(&self, ward: Option<WardId>) -> Result<Vec<Issue>, CivicError> {
        let key = ward_key(ward);
        let read_txn = self.begin_read()?;
        let ids = {
            let table = read_txn.open_table(WARD_INDEX).map_err(storage_err)?;
            ids_in(
                table
                    .range((key, i64::MIN, 0u64)..=(key, i64::MAX, u64::MAX))
                    .map_err(storage_err)?,
            )?
        };
        self.load_issues(&read_txn, ids)
    }

    fn query_captured_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Issue>, CivicError> {
        if from >= to {
            return Ok(Vec::new());
        }
        let read_txn = self.begin_read()?;
        let ids = {
            let table = read_txn.open_table(TIME_INDEX).map_err(storage_err)?;
            ids_in(
                table
                    .range((from.timestamp_millis(), 0u64)..(to.timestamp_millis(), 0u64))
                    .map_err(storage_err)?,
            )?
        };
        self.load_issues(&read_txn, ids)
    }

    fn delete_where(&self, status: IssueStatus) -> Result<u64, CivicError> {
        if !status.is_purgeable() {
            return Err(CivicError::Validation(format!(
                "only synced issues can be purged, not {}",
                status
            )));
        }

        let code = status.code();
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let removed = {
            let mut indexes = IssueIndexes::open(&write_txn)?;
            let ids = ids_in(
                indexes
                    .status
                    .range((code, i64::MIN, 0u64)..=(code, i64::MAX, u64::MAX))
                    .map_err(storage_err)?,
            )?;

            let mut issues_table = write_txn.open_table(ISSUES).map_err(storage_err)?;
            let mut removed = 0u64;
            for id in ids {
                let issue: Option<Issue> = match issues_table.remove(id.0).map_err(storage_err)? {
                    Some(data) => Some(decode(data.value())?),
                    None => None,
                };
                if let Some(issue) = issue {
                    indexes.remove(&issue)?;
                    removed = removed.saturating_add(1);
                }
            }
            removed
        };
        write_txn.commit().map_err(storage_err)?;
        Ok(removed)
    }

    fn status_counts(&self) -> Result<StatusCounts, CivicError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(STATUS_INDEX).map_err(storage_err)?;

        let mut counts = StatusCounts::default();
        for status in IssueStatus::ALL {
            let code = status.code();
            let n = table
                .range((code, i64::MIN, 0u64)..=(code, i64::MAX, u64::MAX))
                .map_err(storage_err)?
                .count();
            *counts.slot(status) = n as u64;
        }
        Ok(counts)
    }
}

impl WardDirectory for RedbStore {
    fn seed_if_empty(&self, wards: &[Ward]) -> Result<bool, CivicError> {
        if wards.is_empty() {
            return Ok(false);
        }
        validate_seed(wards)?;

        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut wards_table = write_txn.open_table(WARDS).map_err(storage_err)?;
            // Checked inside the write transaction so concurrent seeders serialize.
            if wards_table.len().map_err(storage_err)? > 0 {
                return Ok(false);
            }
            let mut id_table = write_txn.open_table(WARD_ID_INDEX).map_err(storage_err)?;
            let mut zone_table = write_txn.open_table(ZONE_INDEX).map_err(storage_err)?;

            for (ordinal, ward) in (0u64..).zip(wards) {
                let bytes = encode(ward)?;
                wards_table
                    .insert(ordinal, bytes.as_slice())
                    .map_err(storage_err)?;
                id_table.insert(ward.id.0, ordinal).map_err(storage_err)?;
                zone_table
                    .insert((ward.zone.as_str(), ordinal), ward.id.0)
                    .map_err(storage_err)?;
            }
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(true)
    }

    fn all_wards(&self) -> Result<Vec<Ward>, CivicError> {
        let read_txn = self.begin_read()?;
        let wards_table = read_txn.open_table(WARDS).map_err(storage_err)?;

        let mut wards = Vec::new();
        for entry in wards_table.iter().map_err(storage_err)? {
            let (_ordinal, data) = entry.map_err(storage_err)?;
            wards.push(decode::<Ward>(data.value())?);
        }
        Ok(wards)
    }

    fn wards_in_zone(&self, zone: &str) -> Result<Vec<Ward>, CivicError> {
        let read_txn = self.begin_read()?;
        let zone_table = read_txn.open_table(ZONE_INDEX).map_err(storage_err)?;
        let wards_table = read_txn.open_table(WARDS).map_err(storage_err)?;

        let mut wards = Vec::new();
        for entry in zone_table
            .range((zone, 0u64)..=(zone, u64::MAX))
            .map_err(storage_err)?
        {
            let (key, _ward_id) = entry.map_err(storage_err)?;
            let (_zone, ordinal) = key.value();
            if let Some(ward) = Self::load_ward(&wards_table, ordinal)? {
                wards.push(ward);
            }
        }
        Ok(wards)
    }

    fn ward(&self, id: WardId) -> Result<Option<Ward>, CivicError> {
        let read_txn = self.begin_read()?;
        let id_table = read_txn.open_table(WARD_ID_INDEX).map_err(storage_err)?;
        let ordinal = match id_table.get(id.0).map_err(storage_err)? {
            Some(v) => v.value(),
            None => return Ok(None),
        };
        let wards_table = read_txn.open_table(WARDS).map_err(storage_err)?;
        Self::load_ward(&wards_table, ordinal)
    }

    fn ward_count(&self) -> Result<u64, CivicError> {
        let read_txn = self.begin_read()?;
        let wards_table = read_txn.open_table(WARDS).map_err(storage_err)?;
        wards_table.len().map_err(storage_err)
    }
}

// =============================================================================
// TESTS
// =============================================================================
