use super::KvStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;

/// SQLite-backed [`KvStore`].
///
/// Insertion order is tracked with an `AUTOINCREMENT` id: `INSERT OR REPLACE`
/// assigns a new id, so a rewritten key moves to the back of the listing,
/// matching the "replacement is a fresh insertion" contract.
pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open kv database at {}", path.display()))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, handy for short-lived tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory kv database")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_entries (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                key        TEXT NOT NULL UNIQUE,
                value      TEXT NOT NULL,
                expires_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_kv_entries_expires ON kv_entries(expires_at);",
        )
        .context("Failed to initialize kv schema")?;
        Ok(())
    }

    fn is_expired(expires_at: Option<&str>, now: DateTime<Utc>) -> bool {
        match expires_at {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc) <= now)
                // Unreadable expiry: treat the entry as gone rather than
                // keeping it alive forever.
                .unwrap_or(true),
            None => false,
        }
    }

    /// Drop rows whose expiry has passed. Best effort; callers ignore misses.
    fn sweep_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
        let swept = conn
            .execute(
                "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now.to_rfc3339()],
            )
            .context("Failed to sweep expired kv entries")?;
        Ok(swept)
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT value, expires_at FROM kv_entries WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let value: String = row.get(0)?;
        let expires_at: Option<String> = row.get(1)?;
        if Self::is_expired(expires_at.as_deref(), Utc::now()) {
            return Ok(None);
        }
        Ok(Some(value))
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| {
            (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()))
                .to_rfc3339()
        });
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at],
        )
        .with_context(|| format!("Failed to write kv entry '{key}'"))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to delete kv entry '{key}'"))?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Utc::now();
        let conn = self.conn.lock();
        let _ = Self::sweep_expired(&conn, now);
        let mut stmt = conn.prepare(
            "SELECT key FROM kv_entries
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(tmp: &TempDir) -> SqliteKv {
        SqliteKv::open(&tmp.path().join("kv.db")).unwrap()
    }

    #[test]
    fn put_then_get_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let kv = open_store(&tmp);

        kv.put("relay:1", "42_7", None).unwrap();
        assert_eq!(kv.get("relay:1").unwrap().as_deref(), Some("42_7"));
        assert_eq!(kv.get("relay:2").unwrap(), None);
    }

    #[test]
    fn expired_entries_are_invisible() {
        let tmp = TempDir::new().unwrap();
        let kv = open_store(&tmp);

        kv.put("relay:1", "42_7", Some(Duration::from_millis(30)))
            .unwrap();
        assert!(kv.get("relay:1").unwrap().is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(kv.get("relay:1").unwrap(), None);
        assert!(kv.list("relay:").unwrap().is_empty());
    }

    #[test]
    fn list_returns_keys_in_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let kv = open_store(&tmp);

        kv.put("relay:10", "a", None).unwrap();
        kv.put("relay:3", "b", None).unwrap();
        kv.put("relay:7", "c", None).unwrap();
        kv.put("task:x", "d", None).unwrap();

        assert_eq!(
            kv.list("relay:").unwrap(),
            vec!["relay:10", "relay:3", "relay:7"]
        );
    }

    #[test]
    fn rewriting_a_key_moves_it_to_the_back() {
        let tmp = TempDir::new().unwrap();
        let kv = open_store(&tmp);

        kv.put("relay:1", "a", None).unwrap();
        kv.put("relay:2", "b", None).unwrap();
        kv.put("relay:1", "a2", None).unwrap();

        assert_eq!(kv.list("relay:").unwrap(), vec!["relay:2", "relay:1"]);
        assert_eq!(kv.get("relay:1").unwrap().as_deref(), Some("a2"));
    }

    #[test]
    fn delete_removes_only_the_named_key() {
        let tmp = TempDir::new().unwrap();
        let kv = open_store(&tmp);

        kv.put("relay:1", "a", None).unwrap();
        kv.put("relay:2", "b", None).unwrap();
        kv.delete("relay:1").unwrap();
        kv.delete("relay:404").unwrap();

        assert_eq!(kv.get("relay:1").unwrap(), None);
        assert_eq!(kv.get("relay:2").unwrap().as_deref(), Some("b"));
    }
}
