use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Store: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE verifications (
                user_id      TEXT PRIMARY KEY,
                nonce        TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'pending',
                address      TEXT NOT NULL,
                public_key   TEXT,
                signature    TEXT NOT NULL,
                message      TEXT NOT NULL,
                timestamp    INTEGER NOT NULL,
                received_at  INTEGER NOT NULL,
                verified_at  INTEGER,
                error        TEXT
            );

            CREATE INDEX idx_verifications_received
                ON verifications(received_at);

            CREATE TABLE audit_log (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      TEXT NOT NULL,
                nonce        TEXT NOT NULL,
                event        TEXT NOT NULL,
                detail       TEXT,
                recorded_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_audit_attempt
                ON audit_log(user_id, nonce);

            CREATE TRIGGER audit_log_no_update BEFORE UPDATE ON audit_log
            BEGIN
                SELECT RAISE(ABORT, 'audit_log is append-only');
            END;

            CREATE TRIGGER audit_log_no_delete BEFORE DELETE ON audit_log
            BEGIN
                SELECT RAISE(ABORT, 'audit_log is append-only');
            END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
