use crate::config::{AppPaths, now_utc, office_slug};
use crate::domain::{
    BASELINE_ID, ContentRecord, CorrespondenceEntry, CumulativeStats, SettlementEntry,
};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxKind {
    Upsert,
    Delete,
}

impl OutboxKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(anyhow!("Unknown outbox op in DB: {other}")),
        }
    }
}

/// A local write waiting to be pushed to the remote table.
#[derive(Debug, Clone)]
pub struct OutboxOp {
    pub seq: i64,
    pub kind: OutboxKind,
    pub record_id: String,
    pub content: Option<String>,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LoadedEntries {
    pub settlements: Vec<SettlementEntry>,
    pub correspondence: Vec<CorrespondenceEntry>,
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(paths: &AppPaths, office: &str) -> Result<(Self, PathBuf)> {
        let slug = office_slug(office);
        let office_dir = paths.data_dir.join("offices").join(slug);
        fs::create_dir_all(&office_dir)
            .with_context(|| format!("Failed to create office dir {}", office_dir.display()))?;

        let db_path = office_dir.join("auditreg.sqlite3");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open DB {}", db_path.display()))?;

        let db = Self { conn };
        db.migrate()?;
        tracing::debug!(path = %db_path.display(), "opened register");
        Ok((db, db_path))
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settlement_entries (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS outbox (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                op TEXT NOT NULL,
                record_id TEXT NOT NULL,
                content TEXT,
                queued_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Writes a row and queues it for the remote table in one transaction.
    pub fn put_content(&self, id: &str, content: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = now_utc().to_rfc3339();
        tx.execute(
            r#"
            INSERT INTO settlement_entries (id, content, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at
            "#,
            params![id, content, now],
        )?;
        tx.execute(
            "INSERT INTO outbox (op, record_id, content, queued_at) VALUES (?1, ?2, ?3, ?4)",
            params![OutboxKind::Upsert.as_str(), id, content, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Writes a row received from the remote table; nothing is queued.
    pub fn apply_remote(&self, id: &str, content: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO settlement_entries (id, content, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at
            "#,
            params![id, content, now_utc().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Drops a row the remote table no longer has; nothing is queued.
    pub fn remove_remote_deleted(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM settlement_entries WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn delete_content(&self, id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute("DELETE FROM settlement_entries WHERE id = ?1", params![id])?;
        if changed > 0 {
            tx.execute(
                "INSERT INTO outbox (op, record_id, content, queued_at) VALUES (?1, ?2, NULL, ?3)",
                params![OutboxKind::Delete.as_str(), id, now_utc().to_rfc3339()],
            )?;
        }
        tx.commit()?;
        Ok(changed > 0)
    }

    pub fn get_content(&self, id: &str) -> Result<Option<String>> {
        let content = self
            .conn
            .query_row(
                "SELECT content FROM settlement_entries WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    pub fn list_contents(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, content FROM settlement_entries ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Every settlement and correspondence row. Rows whose JSON does not
    /// decode are skipped with a warning rather than failing the load.
    pub fn load_entries(&self) -> Result<LoadedEntries> {
        let mut out = LoadedEntries::default();
        for (id, content) in self.list_contents()? {
            if id == BASELINE_ID {
                continue;
            }
            match serde_json::from_str::<ContentRecord>(&content) {
                Ok(ContentRecord::Settlement(e)) => out.settlements.push(e),
                Ok(ContentRecord::Correspondence(e)) => out.correspondence.push(e),
                Err(err) => tracing::warn!(%id, %err, "skipping undecodable row"),
            }
        }
        out.settlements.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out.correspondence
            .sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    pub fn get_record(&self, id: &str) -> Result<Option<ContentRecord>> {
        let Some(content) = self.get_content(id)? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Invalid content JSON for {id}"))?;
        Ok(Some(record))
    }

    pub fn put_record(&self, record: &ContentRecord) -> Result<()> {
        let id = match record {
            ContentRecord::Settlement(e) => e.id.as_str(),
            ContentRecord::Correspondence(e) => e.id.as_str(),
        };
        let json = serde_json::to_string(record)?;
        self.put_content(id, &json)
    }

    pub fn load_baseline(&self) -> Result<CumulativeStats> {
        match self.get_content(BASELINE_ID)? {
            None => Ok(CumulativeStats::default()),
            Some(raw) => serde_json::from_str(&raw).context("Invalid baseline JSON in DB"),
        }
    }

    pub fn save_baseline(&self, stats: &CumulativeStats) -> Result<()> {
        let json = serde_json::to_string(stats)?;
        self.put_content(BASELINE_ID, &json)
    }

    pub fn list_outbox(&self) -> Result<Vec<OutboxOp>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, op, record_id, content, queued_at FROM outbox ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let seq: i64 = row.get(0)?;
            let op: String = row.get(1)?;
            let record_id: String = row.get(2)?;
            let content: Option<String> = row.get(3)?;
            let queued_at: String = row.get(4)?;
            Ok((seq, op, record_id, content, queued_at))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (seq, op, record_id, content, queued_at) = row?;
            let queued_at = DateTime::parse_from_rfc3339(&queued_at)
                .context("Invalid queued_at in outbox")?
                .with_timezone(&Utc);
            out.push(OutboxOp {
                seq,
                kind: OutboxKind::parse(&op)?,
                record_id,
                content,
                queued_at,
            });
        }
        Ok(out)
    }

    pub fn outbox_len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Ids of rows with local writes not yet pushed.
    pub fn queued_record_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT record_id FROM outbox")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    pub fn ack_outbox(&self, seq: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM outbox WHERE seq = ?1", params![seq])?;
        Ok(())
    }
}
