//! Enforcement state: the durable flags every component coordinates through.
//!
//! Components never hold references to each other's internals. The Wake
//! Dispatcher, Alert Driver, Challenge Gate and Boot Recovery all read and
//! write named fields here instead, and the store outlives any single
//! process because it is backed by SQLite.
//!
//! Every accessor takes the connection lock for the duration of one field
//! (or one multi-field record), so a read always observes the latest
//! completed write from any writer in the process. Changes to `active`
//! are additionally published on a `watch` channel.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::alarm::{date_key, AlarmId, WakeTime};
use crate::error::{DatabaseError, Result};
use crate::storage::database::{self, Database};

const KEY_ACTIVE: &str = "active";
const KEY_RING_UI_VISIBLE: &str = "ring_ui_visible";
const KEY_DAILY_WAKE_HOUR: &str = "daily_wake_hour";
const KEY_DAILY_WAKE_MINUTE: &str = "daily_wake_minute";
const KEY_ALARM_ID: &str = "alarm_id";
const KEY_LAST_TRIGGER_TIME: &str = "last_trigger_time";
const KEY_COMPLETION_PENDING: &str = "completion_pending";
const KEY_LAST_COMPLETED_DATE_KEY: &str = "last_completed_date_key";
const KEY_LAST_COMPLETED_WAKE_TIME: &str = "last_completed_wake_time";

/// One finished wake-up, written when the challenge is solved and read
/// once by whoever keeps the streak log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Local `YYYY-MM-DD` of the wake-up.
    pub date_key: String,
    /// Instant the challenge was solved, with the local offset.
    pub wake_time: DateTime<FixedOffset>,
}

/// Point-in-time copy of every persisted field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementSnapshot {
    pub active: bool,
    pub ring_ui_visible: bool,
    pub daily_wake_time: Option<WakeTime>,
    pub alarm_id: Option<AlarmId>,
    pub last_trigger_time: Option<DateTime<Utc>>,
    pub completion_pending: bool,
    pub last_completed_date_key: Option<String>,
    pub last_completed_wake_time: Option<DateTime<FixedOffset>>,
}

/// Typed, thread-safe view over the persisted flags.
///
/// Cheap to clone; clones share the connection and the `active` channel.
#[derive(Clone)]
pub struct EnforcementStore {
    inner: Arc<Inner>,
}

struct Inner {
    db: Mutex<Database>,
    active_tx: watch::Sender<bool>,
}

impl EnforcementStore {
    /// Open the store in the data directory.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open() -> Result<Self> {
        Self::from_database(Database::open()?)
    }

    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open_at(path: &Path) -> Result<Self> {
        Self::from_database(Database::open_at(path)?)
    }

    /// A store that lives only as long as the process.
    ///
    /// # Errors
    /// Returns an error if the in-memory schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::from_database(Database::open_memory()?)
    }

    /// # Errors
    /// Returns an error if the initial `active` flag cannot be read.
    pub fn from_database(db: Database) -> Result<Self> {
        let active = read_bool(db.conn(), KEY_ACTIVE)?;
        let (active_tx, _) = watch::channel(active);
        Ok(Self {
            inner: Arc::new(Inner {
                db: Mutex::new(db),
                active_tx,
            }),
        })
    }

    // ── active ───────────────────────────────────────────────────────

    pub fn is_active(&self) -> Result<bool> {
        let db = self.inner.db.lock();
        read_bool(db.conn(), KEY_ACTIVE)
    }

    /// Write `active` and publish it. Returns the previous value.
    pub fn set_active(&self, active: bool) -> Result<bool> {
        let db = self.inner.db.lock();
        let previous = read_bool(db.conn(), KEY_ACTIVE)?;
        database::kv_set(db.conn(), KEY_ACTIVE, bool_str(active))?;
        // Published under the lock so subscribers see writes in order.
        self.inner.active_tx.send_replace(active);
        Ok(previous)
    }

    /// Subscribe to `active` changes made through this store.
    pub fn subscribe_active(&self) -> watch::Receiver<bool> {
        self.inner.active_tx.subscribe()
    }

    // ── ring UI heartbeat ────────────────────────────────────────────

    pub fn ring_ui_visible(&self) -> Result<bool> {
        let db = self.inner.db.lock();
        read_bool(db.conn(), KEY_RING_UI_VISIBLE)
    }

    pub fn set_ring_ui_visible(&self, visible: bool) -> Result<()> {
        let db = self.inner.db.lock();
        database::kv_set(db.conn(), KEY_RING_UI_VISIBLE, bool_str(visible))
    }

    // ── daily time and alarm id ──────────────────────────────────────

    /// The persisted daily wake time, or `None` if never scheduled.
    ///
    /// A negative hour or minute counts as never scheduled.
    pub fn daily_wake_time(&self) -> Result<Option<WakeTime>> {
        let db = self.inner.db.lock();
        let hour = read_i64(db.conn(), KEY_DAILY_WAKE_HOUR)?;
        let minute = read_i64(db.conn(), KEY_DAILY_WAKE_MINUTE)?;
        match (hour, minute) {
            (Some(h), Some(m)) if h >= 0 && m >= 0 => {
                let wake = u32::try_from(h)
                    .ok()
                    .zip(u32::try_from(m).ok())
                    .and_then(|(h, m)| WakeTime::new(h, m).ok())
                    .ok_or_else(|| DatabaseError::CorruptValue {
                        key: KEY_DAILY_WAKE_HOUR.to_string(),
                        value: format!("{h}:{m}"),
                    })?;
                Ok(Some(wake))
            }
            _ => Ok(None),
        }
    }

    pub fn set_daily_wake_time(&self, wake: WakeTime) -> Result<()> {
        let mut db = self.inner.db.lock();
        db.transaction(|tx| {
            database::kv_set(tx, KEY_DAILY_WAKE_HOUR, &wake.hour().to_string())?;
            database::kv_set(tx, KEY_DAILY_WAKE_MINUTE, &wake.minute().to_string())
        })
    }

    pub fn alarm_id(&self) -> Result<Option<AlarmId>> {
        let db = self.inner.db.lock();
        match read_i64(db.conn(), KEY_ALARM_ID)? {
            Some(id) => AlarmId::try_from(id).map(Some).map_err(|_| {
                DatabaseError::CorruptValue {
                    key: KEY_ALARM_ID.to_string(),
                    value: id.to_string(),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    pub fn set_alarm_id(&self, alarm_id: AlarmId) -> Result<()> {
        let db = self.inner.db.lock();
        database::kv_set(db.conn(), KEY_ALARM_ID, &alarm_id.to_string())
    }

    // ── trigger bookkeeping ──────────────────────────────────────────

    pub fn last_trigger_time(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.inner.db.lock();
        match read_i64(db.conn(), KEY_LAST_TRIGGER_TIME)? {
            Some(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
                .map(Some)
                .ok_or_else(|| {
                    DatabaseError::CorruptValue {
                        key: KEY_LAST_TRIGGER_TIME.to_string(),
                        value: ms.to_string(),
                    }
                    .into()
                }),
            None => Ok(None),
        }
    }

    pub fn set_last_trigger_time(&self, at: DateTime<Utc>) -> Result<()> {
        let db = self.inner.db.lock();
        database::kv_set(
            db.conn(),
            KEY_LAST_TRIGGER_TIME,
            &at.timestamp_millis().to_string(),
        )
    }

    // ── completion record ────────────────────────────────────────────

    pub fn completion_pending(&self) -> Result<bool> {
        let db = self.inner.db.lock();
        read_bool(db.conn(), KEY_COMPLETION_PENDING)
    }

    /// Overwrite the single completion slot and mark it pending.
    pub fn record_completion(&self, at: DateTime<FixedOffset>) -> Result<CompletionRecord> {
        let record = CompletionRecord {
            date_key: date_key(&at),
            wake_time: at,
        };
        let mut db = self.inner.db.lock();
        db.transaction(|tx| {
            database::kv_set(tx, KEY_LAST_COMPLETED_WAKE_TIME, &record.wake_time.to_rfc3339())?;
            database::kv_set(tx, KEY_LAST_COMPLETED_DATE_KEY, &record.date_key)?;
            database::kv_set(tx, KEY_COMPLETION_PENDING, bool_str(true))
        })?;
        Ok(record)
    }

    /// Take the pending completion record, clearing the pending flag in the
    /// same transaction. A second call returns `None` until the next
    /// completion is recorded.
    pub fn consume_completion(&self) -> Result<Option<CompletionRecord>> {
        let mut db = self.inner.db.lock();
        db.transaction(|tx| {
            if !read_bool(tx, KEY_COMPLETION_PENDING)? {
                return Ok(None);
            }
            database::kv_set(tx, KEY_COMPLETION_PENDING, bool_str(false))?;
            let record = read_completion(tx)?;
            Ok(record)
        })
    }

    /// Every field at once, for status reporting.
    pub fn snapshot(&self) -> Result<EnforcementSnapshot> {
        let daily_wake_time = self.daily_wake_time()?;
        let alarm_id = self.alarm_id()?;
        let last_trigger_time = self.last_trigger_time()?;
        let db = self.inner.db.lock();
        let conn = db.conn();
        let completed = read_completion(conn)?;
        Ok(EnforcementSnapshot {
            active: read_bool(conn, KEY_ACTIVE)?,
            ring_ui_visible: read_bool(conn, KEY_RING_UI_VISIBLE)?,
            daily_wake_time,
            alarm_id,
            last_trigger_time,
            completion_pending: read_bool(conn, KEY_COMPLETION_PENDING)?,
            last_completed_date_key: completed.as_ref().map(|c| c.date_key.clone()),
            last_completed_wake_time: completed.map(|c| c.wake_time),
        })
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn read_bool(conn: &rusqlite::Connection, key: &str) -> Result<bool> {
    match database::kv_get(conn, key)?.as_deref() {
        None => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(DatabaseError::CorruptValue {
            key: key.to_string(),
            value: other.to_string(),
        }
        .into()),
    }
}

fn read_i64(conn: &rusqlite::Connection, key: &str) -> Result<Option<i64>> {
    match database::kv_get(conn, key)? {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
            DatabaseError::CorruptValue {
                key: key.to_string(),
                value: raw,
            }
            .into()
        }),
    }
}

fn read_completion(conn: &rusqlite::Connection) -> Result<Option<CompletionRecord>> {
    let date_key = database::kv_get(conn, KEY_LAST_COMPLETED_DATE_KEY)?;
    let wake_time = database::kv_get(conn, KEY_LAST_COMPLETED_WAKE_TIME)?;
    match (date_key, wake_time) {
        (Some(date_key), Some(raw)) => {
            let wake_time = DateTime::parse_from_rfc3339(&raw).map_err(|_| {
                DatabaseError::CorruptValue {
                    key: KEY_LAST_COMPLETED_WAKE_TIME.to_string(),
                    value: raw.clone(),
                }
            })?;
            Ok(Some(CompletionRecord {
                date_key,
                wake_time,
            }))
        }
        _ => Ok(None),
    }
}
