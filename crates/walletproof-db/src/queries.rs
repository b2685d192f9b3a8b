use crate::Database;
use crate::models::{AttemptState, BeginOutcome, Resolution, Transition};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};
use walletproof_types::models::{AuditEntry, AuditEvent, VerificationRecord, VerificationStatus};

const RECORD_COLUMNS: &str = "user_id, nonce, status, address, public_key, signature, message, \
     timestamp, received_at, verified_at, error";

impl Database {
    // -- Live records --

    /// Upsert the live record for `record.user_id`. Last write wins.
    pub fn put(&self, record: &VerificationRecord) -> Result<()> {
        self.with_conn_mut(|conn| upsert_record(conn, record))
    }

    pub fn get(&self, user_id: &str) -> Result<Option<VerificationRecord>> {
        self.with_conn(|conn| query_record(conn, user_id))
    }

    /// Register a signed submission.
    ///
    /// Appends a `received` audit entry and makes `record` the user's live
    /// record, unless this `(user_id, nonce)` was seen before, in which case
    /// nothing is written.
    pub fn begin(&self, record: &VerificationRecord, payload: &str) -> Result<BeginOutcome> {
        self.with_conn_mut(|conn| {
            if let Some(state) = query_attempt(conn, &record.user_id, &record.nonce)? {
                return Ok(BeginOutcome::Duplicate(state));
            }

            append_audit(
                conn,
                &record.user_id,
                &record.nonce,
                AuditEvent::Received,
                Some(payload),
                record.received_at,
            )?;
            upsert_record(conn, record)?;
            Ok(BeginOutcome::Started)
        })
    }

    /// Move a pending attempt to its terminal state.
    ///
    /// The live record is only touched while it still belongs to this
    /// attempt and is still pending, so a late result for an older attempt
    /// never overwrites a newer one.
    pub fn resolve(&self, user_id: &str, nonce: &str, resolution: &Resolution) -> Result<Transition> {
        self.with_conn_mut(|conn| {
            match query_attempt(conn, user_id, nonce)? {
                None => return Err(anyhow!("No attempt {} for user {}", nonce, user_id)),
                Some(state) if state.status.is_terminal() => return Ok(Transition::AlreadyResolved),
                Some(_) => {}
            }

            let (event, verified_at, error) = match resolution {
                Resolution::Verified { at } => (AuditEvent::Verified, Some(*at), None),
                Resolution::Failed { error, .. } => (AuditEvent::Failed, None, Some(error.as_str())),
            };
            append_audit(conn, user_id, nonce, event, error, resolution.at())?;

            let updated = conn.execute(
                "UPDATE verifications SET status = ?1, verified_at = ?2, error = ?3
                 WHERE user_id = ?4 AND nonce = ?5 AND status = 'pending'",
                params![resolution.status().as_str(), verified_at, error, user_id, nonce],
            )?;

            Ok(if updated == 1 {
                Transition::Applied
            } else {
                Transition::Superseded
            })
        })
    }

    /// Drop live records received before `cutoff`. The audit log is kept.
    pub fn prune_before(&self, cutoff: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM verifications WHERE received_at < ?1", [cutoff])?;
            Ok(removed)
        })
    }

    // -- Audit log --

    pub fn attempt(&self, user_id: &str, nonce: &str) -> Result<Option<AttemptState>> {
        self.with_conn(|conn| query_attempt(conn, user_id, nonce))
    }

    pub fn history(&self, user_id: &str) -> Result<Vec<AuditEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, nonce, event, detail, recorded_at
                 FROM audit_log WHERE user_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    let event: String = row.get(3)?;
                    Ok(AuditEntry {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        nonce: row.get(2)?,
                        event: event.parse().map_err(|e: String| conversion_error(3, e))?,
                        detail: row.get(4)?,
                        recorded_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn upsert_record(conn: &Connection, record: &VerificationRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO verifications (user_id, nonce, status, address, public_key, signature, message,
                                    timestamp, received_at, verified_at, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(user_id) DO UPDATE SET
             nonce = excluded.nonce,
             status = excluded.status,
             address = excluded.address,
             public_key = excluded.public_key,
             signature = excluded.signature,
             message = excluded.message,
             timestamp = excluded.timestamp,
             received_at = excluded.received_at,
             verified_at = excluded.verified_at,
             error = excluded.error",
        params![
            record.user_id,
            record.nonce,
            record.status.as_str(),
            record.address,
            record.public_key,
            record.signature,
            record.message,
            record.timestamp,
            record.received_at,
            record.verified_at,
            record.error,
        ],
    )?;
    Ok(())
}

fn query_record(conn: &Connection, user_id: &str) -> Result<Option<VerificationRecord>> {
    let sql = format!("SELECT {} FROM verifications WHERE user_id = ?1", RECORD_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([user_id], row_to_record).optional()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<VerificationRecord> {
    let status: String = row.get(2)?;
    Ok(VerificationRecord {
        user_id: row.get(0)?,
        nonce: row.get(1)?,
        status: status.parse().map_err(|e: String| conversion_error(2, e))?,
        address: row.get(3)?,
        public_key: row.get(4)?,
        signature: row.get(5)?,
        message: row.get(6)?,
        timestamp: row.get(7)?,
        received_at: row.get(8)?,
        verified_at: row.get(9)?,
        error: row.get(10)?,
    })
}

/// Latest audit entry of one attempt, folded into its current state.
fn query_attempt(conn: &Connection, user_id: &str, nonce: &str) -> Result<Option<AttemptState>> {
    conn.query_row(
        "SELECT event, detail, recorded_at FROM audit_log
         WHERE user_id = ?1 AND nonce = ?2
         ORDER BY id DESC LIMIT 1",
        [user_id, nonce],
        |row| {
            let event: String = row.get(0)?;
            let event: AuditEvent = event.parse().map_err(|e: String| conversion_error(0, e))?;
            let detail: Option<String> = row.get(1)?;
            let status = match event {
                AuditEvent::Received => VerificationStatus::Pending,
                AuditEvent::Verified => VerificationStatus::Verified,
                AuditEvent::Failed => VerificationStatus::Failed,
            };
            Ok(AttemptState {
                status,
                error: if event == AuditEvent::Failed { detail } else { None },
                at: row.get(2)?,
            })
        },
    )
    .optional()
}

fn append_audit(
    conn: &Connection,
    user_id: &str,
    nonce: &str,
    event: AuditEvent,
    detail: Option<&str>,
    at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (user_id, nonce, event, detail, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, nonce, event.as_str(), detail, at],
    )?;
    Ok(())
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, message.into())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
