//! Versioned disposition store: WAL-mode SQLite with an atomic active pointer.
//!
//! Three relations: `state_versions` (append-only snapshot chain),
//! `active_state` (singleton pointer), `provenance_log` (append-only audit).
//! `create_initial`, `commit`, and `rollback` each combine their snapshot and
//! pointer writes in one transaction; readers never observe a pointer to a
//! nonexistent snapshot. A process-wide mutex serialises all access, which
//! satisfies the single-writer contract.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Transaction, params};
use uuid::Uuid;

use crate::core::errors::{AdcError, Result};
use crate::state::segment::SegmentMap;
use crate::state::snapshot::{StateSnapshot, decode_vector, encode_vector};
use crate::store::provenance::{Decision, ProvenanceEntry, TriggerType, empty_as_null};

/// Durable store for snapshots, the active pointer, and the provenance log.
pub struct DispositionStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl DispositionStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| AdcError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that WAL mode is active (for diagnostics; in-memory databases
    /// report `memory`).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }

    // ──────────────────── snapshot chain ────────────────────

    /// Create the zero-vector initial snapshot and make it active.
    ///
    /// Fails with `AlreadyInitialized` if an active pointer already exists.
    pub fn create_initial(&self, segment_map: SegmentMap) -> Result<StateSnapshot> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if let Some(existing) = active_pointer(&tx)? {
            return Err(AdcError::AlreadyInitialized {
                version_id: existing,
            });
        }

        let snapshot = StateSnapshot::initial(Uuid::new_v4().to_string(), segment_map, Utc::now());
        insert_snapshot(&tx, &snapshot)?;
        set_active_pointer(&tx, &snapshot.version_id)?;
        tx.commit()?;
        Ok(snapshot)
    }

    /// Fetch the snapshot the active pointer names.
    pub fn get_active(&self) -> Result<StateSnapshot> {
        let conn = self.conn.lock();
        let version_id = active_pointer(&conn)?.ok_or(AdcError::NotFound {
            what: "active pointer",
            id: "none".to_string(),
        })?;
        fetch_snapshot(&conn, &version_id)
    }

    /// Fetch a snapshot by version id.
    pub fn get(&self, version_id: &str) -> Result<StateSnapshot> {
        let conn = self.conn.lock();
        fetch_snapshot(&conn, version_id)
    }

    /// Insert a snapshot and atomically advance the active pointer to it.
    ///
    /// The snapshot must carry a fresh version id, and its parent must
    /// already exist (a missing parent is allowed only for the initial
    /// snapshot of an empty store).
    pub fn commit(&self, snapshot: &StateSnapshot) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if snapshot_exists(&tx, &snapshot.version_id)? {
            return Err(AdcError::store(
                "commit",
                format!("duplicate version id {}", snapshot.version_id),
            ));
        }
        match &snapshot.parent_id {
            Some(parent) => {
                if !snapshot_exists(&tx, parent)? {
                    return Err(AdcError::store(
                        "commit",
                        format!("parent {parent} does not exist"),
                    ));
                }
            }
            None => {
                if snapshot_count(&tx)? > 0 {
                    return Err(AdcError::store(
                        "commit",
                        "parentless snapshot is only valid in an empty store",
                    ));
                }
            }
        }

        insert_snapshot(&tx, snapshot)?;
        set_active_pointer(&tx, &snapshot.version_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Move the active pointer to an existing snapshot. Deletes nothing.
    pub fn rollback(&self, version_id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        if !snapshot_exists(&tx, version_id)? {
            return Err(AdcError::NotFound {
                what: "snapshot",
                id: version_id.to_string(),
            });
        }
        set_active_pointer(&tx, version_id)?;
        tx.commit()?;
        Ok(())
    }

    /// The most recent `limit` snapshots, newest first.
    pub fn list_versions(&self, limit: u32) -> Result<Vec<StateSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT version_id, parent_id, state_vector, segment_map, created_at, metrics_json
             FROM state_versions
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let raw = stmt
            .query_map(params![limit], raw_snapshot_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawSnapshotRow::into_snapshot).collect()
    }

    /// The most recent `limit` snapshots left-joined with their latest
    /// provenance row; provenance may be absent.
    pub fn list_versions_with_provenance(
        &self,
        limit: u32,
    ) -> Result<Vec<(StateSnapshot, Option<ProvenanceEntry>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT s.version_id, s.parent_id, s.state_vector, s.segment_map, s.created_at,
                    s.metrics_json,
                    p.context_hash, p.trigger_type, p.signals_json, p.evidence_refs,
                    p.decision, p.reason, p.created_at
             FROM state_versions s
             LEFT JOIN provenance_log p ON p.id = (
                 SELECT id FROM provenance_log
                 WHERE version_id = s.version_id
                 ORDER BY id DESC LIMIT 1
             )
             ORDER BY s.created_at DESC, s.rowid DESC
             LIMIT ?1",
        )?;
        let raw = stmt
            .query_map(params![limit], |row| {
                let snapshot = raw_snapshot_row(row)?;
                let trigger: Option<String> = row.get(7)?;
                let provenance = match trigger {
                    None => None,
                    Some(trigger) => Some(RawProvenanceRow {
                        version_id: snapshot.version_id.clone(),
                        context_hash: row.get(6)?,
                        trigger_type: trigger,
                        signals_json: row.get(8)?,
                        evidence_refs: row.get(9)?,
                        decision: row.get(10)?,
                        reason: row.get(11)?,
                        created_at: row.get(12)?,
                    }),
                };
                Ok((snapshot, provenance))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(snapshot, provenance)| {
                Ok((
                    snapshot.into_snapshot()?,
                    provenance.map(RawProvenanceRow::into_entry).transpose()?,
                ))
            })
            .collect()
    }

    // ──────────────────── provenance log ────────────────────

    /// Append one provenance row. Empty text fields persist as NULL and a
    /// missing `created_at` is filled with the current time.
    pub fn append_provenance(&self, entry: &ProvenanceEntry) -> Result<()> {
        let conn = self.conn.lock();
        let created_at = entry.created_at.unwrap_or_else(Utc::now);
        conn.prepare_cached(
            "INSERT INTO provenance_log (
                version_id, context_hash, trigger_type, signals_json,
                evidence_refs, decision, reason, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        )?
        .execute(params![
            entry.version_id,
            empty_as_null(entry.context_hash.clone()),
            entry.trigger_type.name(),
            empty_as_null(entry.signals_json.clone()),
            empty_as_null(entry.evidence_refs.clone()),
            entry.decision.name(),
            empty_as_null(entry.reason.clone()),
            format_ts(created_at),
        ])?;
        Ok(())
    }

    /// Total number of provenance rows.
    pub fn provenance_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM provenance_log", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// The most recent `limit` provenance rows, newest first.
    pub fn recent_provenance(&self, limit: u32) -> Result<Vec<ProvenanceEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT version_id, context_hash, trigger_type, signals_json,
                    evidence_refs, decision, reason, created_at
             FROM provenance_log ORDER BY id DESC LIMIT ?1",
        )?;
        let raw = stmt
            .query_map(params![limit], raw_provenance_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawProvenanceRow::into_entry).collect()
    }

    /// All provenance rows for one version, oldest first.
    pub fn provenance_for(&self, version_id: &str) -> Result<Vec<ProvenanceEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT version_id, context_hash, trigger_type, signals_json,
                    evidence_refs, decision, reason, created_at
             FROM provenance_log WHERE version_id = ?1 ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map(params![version_id], raw_provenance_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawProvenanceRow::into_entry).collect()
    }
}

// ──────────────────── row plumbing ────────────────────

struct RawSnapshotRow {
    version_id: String,
    parent_id: Option<String>,
    state_vector: Vec<u8>,
    segment_map: String,
    created_at: String,
    metrics_json: Option<String>,
}

fn raw_snapshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSnapshotRow> {
    Ok(RawSnapshotRow {
        version_id: row.get(0)?,
        parent_id: row.get(1)?,
        state_vector: row.get(2)?,
        segment_map: row.get(3)?,
        created_at: row.get(4)?,
        metrics_json: row.get(5)?,
    })
}

impl RawSnapshotRow {
    fn into_snapshot(self) -> Result<StateSnapshot> {
        let segment_map =
            SegmentMap::from_json(&self.segment_map).map_err(|err| AdcError::CorruptSnapshot {
                version_id: self.version_id.clone(),
                details: format!("segment map: {err}"),
            })?;
        let vector = decode_vector(&self.state_vector, segment_map.dim()).map_err(|err| {
            AdcError::CorruptSnapshot {
                version_id: self.version_id.clone(),
                details: format!("state vector: {err}"),
            }
        })?;
        let created_at = parse_ts(&self.created_at).map_err(|err| AdcError::CorruptSnapshot {
            version_id: self.version_id.clone(),
            details: format!("created_at: {err}"),
        })?;
        let metrics = match self.metrics_json {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        Ok(StateSnapshot {
            version_id: self.version_id,
            parent_id: self.parent_id,
            vector,
            segment_map,
            created_at,
            metrics,
        })
    }
}

struct RawProvenanceRow {
    version_id: String,
    context_hash: Option<String>,
    trigger_type: String,
    signals_json: Option<String>,
    evidence_refs: Option<String>,
    decision: String,
    reason: Option<String>,
    created_at: String,
}

fn raw_provenance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawProvenanceRow> {
    Ok(RawProvenanceRow {
        version_id: row.get(0)?,
        context_hash: row.get(1)?,
        trigger_type: row.get(2)?,
        signals_json: row.get(3)?,
        evidence_refs: row.get(4)?,
        decision: row.get(5)?,
        reason: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl RawProvenanceRow {
    fn into_entry(self) -> Result<ProvenanceEntry> {
        let trigger_type = TriggerType::parse(&self.trigger_type).ok_or_else(|| {
            AdcError::store(
                "provenance",
                format!("unknown trigger type {}", self.trigger_type),
            )
        })?;
        let decision = Decision::parse(&self.decision).ok_or_else(|| {
            AdcError::store("provenance", format!("unknown decision {}", self.decision))
        })?;
        let created_at = Some(parse_ts(&self.created_at)?);
        Ok(ProvenanceEntry {
            version_id: self.version_id,
            context_hash: self.context_hash,
            trigger_type,
            signals_json: self.signals_json,
            evidence_refs: self.evidence_refs,
            decision,
            reason: self.reason,
            created_at,
        })
    }
}

fn active_pointer(conn: &Connection) -> Result<Option<String>> {
    let mut stmt = conn.prepare_cached("SELECT version_id FROM active_state WHERE id = 1")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

fn set_active_pointer(tx: &Transaction<'_>, version_id: &str) -> Result<()> {
    tx.prepare_cached(
        "INSERT INTO active_state (id, version_id) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET version_id = excluded.version_id",
    )?
    .execute(params![version_id])?;
    Ok(())
}

fn snapshot_exists(conn: &Connection, version_id: &str) -> Result<bool> {
    let mut stmt =
        conn.prepare_cached("SELECT 1 FROM state_versions WHERE version_id = ?1 LIMIT 1")?;
    Ok(stmt.exists(params![version_id])?)
}

fn snapshot_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM state_versions", [], |row| row.get(0))?)
}

fn insert_snapshot(tx: &Transaction<'_>, snapshot: &StateSnapshot) -> Result<()> {
    let metrics_json = snapshot
        .metrics
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    tx.prepare_cached(
        "INSERT INTO state_versions (
            version_id, parent_id, state_vector, segment_map, created_at, metrics_json
        ) VALUES (?1,?2,?3,?4,?5,?6)",
    )?
    .execute(params![
        snapshot.version_id,
        snapshot.parent_id,
        encode_vector(&snapshot.vector),
        snapshot.segment_map.to_json()?,
        format_ts(snapshot.created_at),
        metrics_json,
    ])?;
    Ok(())
}

fn fetch_snapshot(conn: &Connection, version_id: &str) -> Result<StateSnapshot> {
    let mut stmt = conn.prepare_cached(
        "SELECT version_id, parent_id, state_vector, segment_map, created_at, metrics_json
         FROM state_versions WHERE version_id = ?1",
    )?;
    let mut rows = stmt.query(params![version_id])?;
    match rows.next()? {
        Some(row) => raw_snapshot_row(row)?.into_snapshot(),
        None => Err(AdcError::NotFound {
            what: "snapshot",
            id: version_id.to_string(),
        }),
    }
}

/// RFC 3339 with nanosecond precision, UTC.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| AdcError::store("parse_ts", format!("bad timestamp {raw:?}: {err}")))
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA temp_store = MEMORY;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") && !mode.eq_ignore_ascii_case("memory") {
        eprintln!("[ADC-STORE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS state_versions (
            version_id TEXT PRIMARY KEY,
            parent_id TEXT REFERENCES state_versions(version_id),
            state_vector BLOB NOT NULL,
            segment_map TEXT NOT NULL,
            created_at TEXT NOT NULL,
            metrics_json TEXT
        );

        CREATE TABLE IF NOT EXISTS active_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version_id TEXT NOT NULL REFERENCES state_versions(version_id)
        );

        CREATE TABLE IF NOT EXISTS provenance_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version_id TEXT NOT NULL REFERENCES state_versions(version_id),
            context_hash TEXT,
            trigger_type TEXT NOT NULL,
            signals_json TEXT,
            evidence_refs TEXT,
            decision TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_versions_created ON state_versions(created_at);
        CREATE INDEX IF NOT EXISTS idx_versions_parent ON state_versions(parent_id);
        CREATE INDEX IF NOT EXISTS idx_provenance_version ON provenance_log(version_id);
        CREATE INDEX IF NOT EXISTS idx_provenance_created ON provenance_log(created_at);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::segment::{STATE_DIM, SegmentId};

    fn store() -> DispositionStore {
        DispositionStore::open_in_memory().unwrap()
    }

    fn child_of(parent: &StateSnapshot, version_id: &str, fill: f32) -> StateSnapshot {
        let mut snapshot = parent.clone();
        snapshot.version_id = version_id.to_string();
        snapshot.parent_id = Some(parent.version_id.clone());
        snapshot.created_at = parent.created_at + chrono::Duration::seconds(1);
        for v in &mut snapshot.vector {
            *v = fill;
        }
        snapshot
    }

    #[test]
    fn create_initial_sets_zero_active_snapshot() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        assert!(initial.is_zero());
        assert!(initial.parent_id.is_none());
        let active = store.get_active().unwrap();
        assert_eq!(active, initial);
    }

    #[test]
    fn create_initial_twice_fails() {
        let store = store();
        store.create_initial(SegmentMap::default_layout()).unwrap();
        let err = store
            .create_initial(SegmentMap::default_layout())
            .unwrap_err();
        assert_eq!(err.code(), "ADC-2003");
    }

    #[test]
    fn get_active_without_init_fails() {
        let store = store();
        let err = store.get_active().unwrap_err();
        assert_eq!(err.code(), "ADC-2002");
    }

    #[test]
    fn get_missing_version_fails_not_found() {
        let store = store();
        store.create_initial(SegmentMap::default_layout()).unwrap();
        let err = store.get("missing-id").unwrap_err();
        assert_eq!(err.code(), "ADC-2002");
    }

    #[test]
    fn commit_advances_active_pointer() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let child = child_of(&initial, "v1", 0.25);
        store.commit(&child).unwrap();

        let active = store.get_active().unwrap();
        assert_eq!(active.version_id, "v1");
        assert_eq!(active.vector, child.vector);
        assert_eq!(store.get("v1").unwrap().parent_id.as_deref(), Some(initial.version_id.as_str()));
    }

    #[test]
    fn commit_duplicate_version_id_fails() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let child = child_of(&initial, "v1", 0.25);
        store.commit(&child).unwrap();
        let err = store.commit(&child).unwrap_err();
        assert_eq!(err.code(), "ADC-2001");
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn commit_with_missing_parent_fails() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let mut orphan = child_of(&initial, "v1", 0.25);
        orphan.parent_id = Some("ghost".to_string());
        let err = store.commit(&orphan).unwrap_err();
        assert_eq!(err.code(), "ADC-2001");
        assert!(err.to_string().contains("parent"));
        // The failed commit must not have moved the pointer.
        assert_eq!(
            store.get_active().unwrap().version_id,
            initial.version_id
        );
    }

    #[test]
    fn commit_parentless_into_nonempty_store_fails() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let mut rootless = child_of(&initial, "v1", 0.25);
        rootless.parent_id = None;
        assert!(store.commit(&rootless).is_err());
    }

    #[test]
    fn rollback_moves_pointer_and_keeps_snapshots() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let child = child_of(&initial, "v1", 0.25);
        store.commit(&child).unwrap();

        store.rollback(&initial.version_id).unwrap();
        assert_eq!(
            store.get_active().unwrap().version_id,
            initial.version_id
        );
        // Both snapshots are still retrievable.
        assert!(store.get("v1").is_ok());
        assert!(store.get(&initial.version_id).is_ok());
    }

    #[test]
    fn rollback_to_missing_version_fails() {
        let store = store();
        store.create_initial(SegmentMap::default_layout()).unwrap();
        let err = store.rollback("ghost").unwrap_err();
        assert_eq!(err.code(), "ADC-2002");
    }

    #[test]
    fn vector_survives_storage_bit_exact() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let mut child = child_of(&initial, "v1", 0.0);
        for (i, v) in child.vector.iter_mut().enumerate() {
            *v = (i as f32).mul_add(0.731, -17.25);
        }
        child.vector[3] = -0.0;
        child.vector[STATE_DIM - 1] = f32::MIN_POSITIVE;
        store.commit(&child).unwrap();

        let loaded = store.get("v1").unwrap();
        for (a, b) in child.vector.iter().zip(&loaded.vector) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(loaded.segment_map, child.segment_map);
    }

    #[test]
    fn timestamps_keep_nanosecond_precision() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let mut child = child_of(&initial, "v1", 0.5);
        child.created_at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        store.commit(&child).unwrap();
        assert_eq!(store.get("v1").unwrap().created_at, child.created_at);
    }

    #[test]
    fn metrics_blob_roundtrips() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let mut child = child_of(&initial, "v1", 0.5);
        child.metrics = Some(serde_json::json!({"total_delta_norm": 1.25, "segments_hit": ["prefs"]}));
        store.commit(&child).unwrap();
        assert_eq!(store.get("v1").unwrap().metrics, child.metrics);
    }

    #[test]
    fn list_versions_newest_first_with_limit() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let mut parent = initial.clone();
        for i in 1..=4 {
            let child = child_of(&parent, &format!("v{i}"), 0.1 * i as f32);
            store.commit(&child).unwrap();
            parent = child;
        }
        let listed = store.list_versions(3).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].version_id, "v4");
        assert_eq!(listed[1].version_id, "v3");
        assert_eq!(listed[2].version_id, "v2");
    }

    #[test]
    fn provenance_join_handles_missing_rows() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let child = child_of(&initial, "v1", 0.5);
        store.commit(&child).unwrap();
        store
            .append_provenance(
                &ProvenanceEntry::new("v1", TriggerType::Interaction, Decision::Commit)
                    .with_reason("accepted"),
            )
            .unwrap();

        let listed = store.list_versions_with_provenance(10).unwrap();
        assert_eq!(listed.len(), 2);
        let (top, top_prov) = &listed[0];
        assert_eq!(top.version_id, "v1");
        assert_eq!(top_prov.as_ref().unwrap().decision, Decision::Commit);
        let (_, initial_prov) = &listed[1];
        assert!(initial_prov.is_none());
    }

    #[test]
    fn provenance_join_uses_latest_row() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        store
            .append_provenance(&ProvenanceEntry::new(
                initial.version_id.clone(),
                TriggerType::Init,
                Decision::Commit,
            ))
            .unwrap();
        store
            .append_provenance(&ProvenanceEntry::new(
                initial.version_id.clone(),
                TriggerType::Manual,
                Decision::Reject,
            ))
            .unwrap();
        let listed = store.list_versions_with_provenance(1).unwrap();
        let (_, provenance) = &listed[0];
        assert_eq!(provenance.as_ref().unwrap().trigger_type, TriggerType::Manual);
    }

    #[test]
    fn provenance_empty_strings_persist_as_null() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let entry = ProvenanceEntry {
            version_id: initial.version_id.clone(),
            context_hash: Some(String::new()),
            trigger_type: TriggerType::Interaction,
            signals_json: Some(String::new()),
            evidence_refs: Some(String::new()),
            decision: Decision::NoOp,
            reason: Some(String::new()),
            created_at: None,
        };
        store.append_provenance(&entry).unwrap();

        let rows = store.recent_provenance(1).unwrap();
        assert!(rows[0].context_hash.is_none());
        assert!(rows[0].signals_json.is_none());
        assert!(rows[0].evidence_refs.is_none());
        assert!(rows[0].reason.is_none());
        assert!(rows[0].created_at.is_some(), "created_at is auto-filled");
    }

    #[test]
    fn provenance_count_is_monotonic() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        assert_eq!(store.provenance_count().unwrap(), 0);
        for i in 0..5 {
            store
                .append_provenance(
                    &ProvenanceEntry::new(
                        initial.version_id.clone(),
                        TriggerType::Interaction,
                        Decision::NoOp,
                    )
                    .with_reason(format!("turn {i}")),
                )
                .unwrap();
            assert_eq!(store.provenance_count().unwrap(), i + 1);
        }
    }

    #[test]
    fn provenance_for_filters_by_version() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let child = child_of(&initial, "v1", 0.5);
        store.commit(&child).unwrap();
        store
            .append_provenance(&ProvenanceEntry::new(
                initial.version_id.clone(),
                TriggerType::Init,
                Decision::Commit,
            ))
            .unwrap();
        store
            .append_provenance(&ProvenanceEntry::new(
                "v1",
                TriggerType::Interaction,
                Decision::Commit,
            ))
            .unwrap();
        store
            .append_provenance(&ProvenanceEntry::new(
                "v1",
                TriggerType::Manual,
                Decision::Reject,
            ))
            .unwrap();

        let rows = store.provenance_for("v1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].trigger_type, TriggerType::Interaction, "oldest first");
        assert_eq!(rows[1].trigger_type, TriggerType::Manual);
    }

    #[test]
    fn provenance_for_unknown_version_fails_fk() {
        let store = store();
        store.create_initial(SegmentMap::default_layout()).unwrap();
        let err = store
            .append_provenance(&ProvenanceEntry::new(
                "ghost",
                TriggerType::Interaction,
                Decision::Commit,
            ))
            .unwrap_err();
        assert_eq!(err.code(), "ADC-2001");
    }

    #[test]
    fn schema_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("adc.db");
        {
            let store = DispositionStore::open(&db_path).unwrap();
            assert!(store.is_wal_mode());
            store.create_initial(SegmentMap::default_layout()).unwrap();
        }
        // Re-open and observe the persisted state.
        let store = DispositionStore::open(&db_path).unwrap();
        assert!(store.is_wal_mode());
        let active = store.get_active().unwrap();
        assert!(active.is_zero());
    }

    #[test]
    fn segment_norms_survive_reload() {
        let store = store();
        let initial = store.create_initial(SegmentMap::default_layout()).unwrap();
        let mut child = child_of(&initial, "v1", 0.0);
        let range = child.segment_map.range(SegmentId::Risk).unwrap();
        for v in &mut child.vector[range] {
            *v = 1.5;
        }
        store.commit(&child).unwrap();
        let loaded = store.get("v1").unwrap();
        assert!((loaded.segment_norm(SegmentId::Risk) - child.segment_norm(SegmentId::Risk)).abs() < 1e-12);
    }
}
