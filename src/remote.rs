use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::db::{Db, OutboxKind};

/// One row of the hosted key-value table. `content` is JSON, stored either as
/// a JSON column or as a JSON-encoded string depending on the deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRow {
    pub id: String,
    pub content: serde_json::Value,
}

impl RemoteRow {
    pub fn content_string(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

pub struct RemoteClient {
    client: Client,
    cfg: RemoteConfig,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PushStats {
    pub pushed: usize,
    pub remaining: usize,
}

fn spinner(msg: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(msg);
    pb
}

pub fn table_url(cfg: &RemoteConfig) -> String {
    format!("{}/rest/v1/{}", cfg.base_url.trim_end_matches('/'), cfg.table)
}

/// What `pull` and `push` need from the hosted table.
pub trait RemoteTable {
    fn fetch_rows(&self) -> Result<Vec<RemoteRow>>;
    fn upsert(&self, id: &str, content: &str) -> Result<()>;
    fn delete(&self, id: &str) -> Result<()>;
}

impl RemoteClient {
    pub fn new(cfg: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, cfg })
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.cfg.api_key)
            .bearer_auth(&self.cfg.api_key)
            .header("User-Agent", "auditreg")
    }
}

impl RemoteTable for RemoteClient {
    fn fetch_rows(&self) -> Result<Vec<RemoteRow>> {
        let resp = self
            .authed(self.client.get(table_url(&self.cfg)))
            .query(&[("select", "id,content")])
            .send()
            .context("Failed to request remote rows")?;
        if !resp.status().is_success() {
            return Err(anyhow!("Remote fetch failed: HTTP {}", resp.status()));
        }
        resp.json().context("Invalid remote rows JSON")
    }

    fn upsert(&self, id: &str, content: &str) -> Result<()> {
        let content: serde_json::Value = serde_json::from_str(content)
            .with_context(|| format!("Queued content for {id} is not JSON"))?;
        let body = [RemoteRow {
            id: id.to_string(),
            content,
        }];
        let resp = self
            .authed(self.client.post(table_url(&self.cfg)))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&body)
            .send()
            .with_context(|| format!("Failed to upsert {id}"))?;
        if !resp.status().is_success() {
            return Err(anyhow!("Remote upsert of {id} failed: HTTP {}", resp.status()));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let resp = self
            .authed(self.client.delete(table_url(&self.cfg)))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .with_context(|| format!("Failed to delete {id}"))?;
        if !resp.status().is_success() {
            return Err(anyhow!("Remote delete of {id} failed: HTTP {}", resp.status()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PullStats {
    pub applied: usize,
    /// Rows left alone because a local write to them is still queued.
    pub kept_local: usize,
    /// Local rows dropped because the remote table no longer has them.
    pub removed: usize,
}

pub fn pull(db: &Db, cfg: &RemoteConfig) -> Result<PullStats> {
    let client = RemoteClient::new(cfg.clone())?;
    let pb = spinner("Fetching register rows...");
    let rows = client.fetch_rows();
    pb.finish_and_clear();
    apply_pulled_rows(db, rows?)
}

/// Mirrors the remote rows locally. Rows with queued local writes keep the
/// local version until those writes are pushed; rows missing remotely are
/// removed unless they are queued.
pub fn apply_pulled_rows(db: &Db, rows: Vec<RemoteRow>) -> Result<PullStats> {
    let queued = db.queued_record_ids()?;
    let mut stats = PullStats::default();
    let mut remote_ids = HashSet::with_capacity(rows.len());

    for row in &rows {
        remote_ids.insert(row.id.as_str());
        if queued.contains(&row.id) {
            tracing::debug!(record = %row.id, "kept local row with queued writes");
            stats.kept_local += 1;
            continue;
        }
        db.apply_remote(&row.id, &row.content_string())?;
        stats.applied += 1;
    }

    for (id, _) in db.list_contents()? {
        if remote_ids.contains(id.as_str()) || queued.contains(&id) {
            continue;
        }
        if db.remove_remote_deleted(&id)? {
            stats.removed += 1;
        }
    }

    tracing::info!(
        applied = stats.applied,
        kept_local = stats.kept_local,
        removed = stats.removed,
        "pulled remote rows"
    );
    Ok(stats)
}

pub fn push(db: &Db, cfg: &RemoteConfig) -> Result<PushStats> {
    let client = RemoteClient::new(cfg.clone())?;
    let pb = spinner("Pushing queued writes...");
    let stats = push_queued(db, &client);
    pb.finish_and_clear();
    stats
}

/// Sends queued writes in order. Stops at the first failure; the failed op
/// and everything after it stay queued.
pub fn push_queued<T: RemoteTable + ?Sized>(db: &Db, table: &T) -> Result<PushStats> {
    let ops = db.list_outbox()?;
    let mut stats = PushStats {
        pushed: 0,
        remaining: ops.len(),
    };
    for op in ops {
        let sent = match op.kind {
            OutboxKind::Upsert => table.upsert(&op.record_id, op.content.as_deref().unwrap_or("{}")),
            OutboxKind::Delete => table.delete(&op.record_id),
        };
        if let Err(err) = sent {
            tracing::warn!(seq = op.seq, record = %op.record_id, "push stopped: {err:#}");
            stats.remaining = db.outbox_len()?;
            return Ok(stats);
        }
        db.ack_outbox(op.seq)?;
        stats.pushed += 1;
        stats.remaining -= 1;
    }
    Ok(stats)
}
