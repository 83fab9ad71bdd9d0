//! Per-user JSON record store.
//!
//! Records live at `<users_dir>/<user_id>/data.json`. Reads take the user's
//! shared lock; every mutation takes the exclusive lock for the whole
//! load → mutate → save sequence and writes through a temp file that is
//! renamed into place, so a crash never leaves a half-written record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use hl_domain::error::{Error, Result};
use hl_domain::model::{GroupSummary, Message, StatKey, Stats, StoreRecord, Webhook};
use hl_domain::UserId;

use crate::locks::UserLockMap;

const RECORD_FILE: &str = "data.json";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a webhook registration is addressed when removing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookSelector {
    Id(String),
    Url(String),
}

impl WebhookSelector {
    fn matches(&self, hook: &Webhook) -> bool {
        match self {
            Self::Id(id) => hook.id == *id,
            Self::Url(url) => hook.url == *url,
        }
    }

    fn describe(&self) -> &str {
        match self {
            Self::Id(s) | Self::Url(s) => s,
        }
    }
}

/// Counters plus the number of registered webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub stats: Stats,
    pub webhook_count: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UserStore {
    users_dir: PathBuf,
    locks: UserLockMap,
}

impl UserStore {
    /// Create a store rooted at `users_dir`. The directory is created lazily
    /// on the first write.
    pub fn new(users_dir: impl Into<PathBuf>) -> Self {
        let users_dir = users_dir.into();
        tracing::info!(path = %users_dir.display(), "user store ready");
        Self {
            users_dir,
            locks: UserLockMap::new(),
        }
    }

    fn record_path(&self, user: &UserId) -> PathBuf {
        self.users_dir.join(user.as_str()).join(RECORD_FILE)
    }

    // ── Primitive load / save ────────────────────────────────────────

    /// Load the user's record, writing a zero-valued record on first
    /// reference.
    pub async fn load(&self, user: &UserId) -> Result<StoreRecord> {
        let path = self.record_path(user);
        {
            let _guard = self.locks.read(user).await;
            if let Some(record) = read_record(&path).await? {
                return Ok(record);
            }
        }

        // Slow path: first reference. Re-check under the exclusive lock in
        // case another caller created it meanwhile.
        let _guard = self.locks.write(user).await;
        if let Some(record) = read_record(&path).await? {
            return Ok(record);
        }
        let record = StoreRecord::default();
        write_record(&path, &record).await?;
        tracing::debug!(user = %user.short(), "created default record");
        Ok(record)
    }

    /// Replace the user's record wholesale.
    pub async fn save(&self, user: &UserId, record: &StoreRecord) -> Result<()> {
        let _guard = self.locks.write(user).await;
        write_record(&self.record_path(user), record).await
    }

    /// Run `f` against the record under the user's exclusive lock and persist
    /// the result. Nothing is written when `f` fails.
    pub async fn update<T, F>(&self, user: &UserId, f: F) -> Result<T>
    where
        F: FnOnce(&mut StoreRecord) -> Result<T>,
    {
        let path = self.record_path(user);
        let _guard = self.locks.write(user).await;
        let mut record = read_record(&path).await?.unwrap_or_default();
        let out = f(&mut record)?;
        write_record(&path, &record).await?;
        Ok(out)
    }

    // ── Compound helpers ─────────────────────────────────────────────

    pub async fn append_message(&self, user: &UserId, message: Message) -> Result<()> {
        self.update(user, |rec| {
            rec.push_message(message);
            Ok(())
        })
        .await
    }

    /// Append `message` and bump `stat` in one locked step. Returns the new
    /// counter value.
    pub async fn record_message(
        &self,
        user: &UserId,
        message: Message,
        stat: StatKey,
    ) -> Result<u64> {
        self.record_message_while(user, message, stat, || true)
            .await
            .map(|value| value.unwrap_or_default())
    }

    /// Like [`record_message`](Self::record_message), but `live` is checked
    /// under the lock and nothing is written when it returns `false`.
    pub async fn record_message_while<L>(
        &self,
        user: &UserId,
        message: Message,
        stat: StatKey,
        live: L,
    ) -> Result<Option<u64>>
    where
        L: FnOnce() -> bool,
    {
        self.update(user, |rec| {
            if !live() {
                return Ok(None);
            }
            rec.push_message(message);
            Ok(Some(rec.stats.bump(stat)))
        })
        .await
    }

    pub async fn increment_stat(&self, user: &UserId, stat: StatKey) -> Result<u64> {
        let value = self.update(user, |rec| Ok(rec.stats.bump(stat))).await?;
        tracing::debug!(user = %user.short(), stat = stat.as_str(), value, "counter incremented");
        Ok(value)
    }

    /// Register a callback URL. URLs must be `http(s)` and are unique per
    /// user by exact match.
    pub async fn register_webhook(
        &self,
        user: &UserId,
        url: &str,
        name: Option<String>,
    ) -> Result<Webhook> {
        let url = url.trim();
        validate_webhook_url(url)?;
        let hook = Webhook::new(url, name);
        let registered = hook.clone();
        self.update(user, move |rec| {
            if rec.webhooks.iter().any(|h| h.url == hook.url) {
                return Err(Error::DuplicateWebhook(hook.url));
            }
            rec.webhooks.push(hook);
            Ok(())
        })
        .await?;
        tracing::info!(user = %user.short(), webhook_id = %registered.id, "webhook registered");
        Ok(registered)
    }

    /// Remove a registration by id or URL and return it.
    pub async fn unregister_webhook(
        &self,
        user: &UserId,
        selector: WebhookSelector,
    ) -> Result<Webhook> {
        let removed = self
            .update(user, |rec| {
                let pos = rec
                    .webhooks
                    .iter()
                    .position(|h| selector.matches(h))
                    .ok_or_else(|| Error::WebhookNotFound(selector.describe().to_owned()))?;
                Ok(rec.webhooks.remove(pos))
            })
            .await?;
        tracing::info!(user = %user.short(), webhook_id = %removed.id, "webhook unregistered");
        Ok(removed)
    }

    pub async fn webhooks(&self, user: &UserId) -> Result<Vec<Webhook>> {
        Ok(self.load(user).await?.webhooks)
    }

    /// Drop messages, webhooks and counters. The group cache is kept.
    pub async fn clear_bot_data(&self, user: &UserId) -> Result<()> {
        self.update(user, |rec| {
            rec.clear_bot_data();
            Ok(())
        })
        .await
    }

    pub async fn set_groups(&self, user: &UserId, groups: Vec<GroupSummary>) -> Result<()> {
        self.update(user, |rec| {
            rec.groups = groups;
            rec.groups_refreshed_at = Some(Utc::now());
            Ok(())
        })
        .await
    }

    /// Persisted group cache and the time it was last refreshed.
    pub async fn groups(
        &self,
        user: &UserId,
    ) -> Result<(Vec<GroupSummary>, Option<DateTime<Utc>>)> {
        let rec = self.load(user).await?;
        Ok((rec.groups, rec.groups_refreshed_at))
    }

    /// Up to `limit` messages, newest first.
    pub async fn recent_messages(&self, user: &UserId, limit: usize) -> Result<Vec<Message>> {
        let rec = self.load(user).await?;
        Ok(rec.messages.into_iter().rev().take(limit).collect())
    }

    pub async fn stats_snapshot(&self, user: &UserId) -> Result<StatsSnapshot> {
        let rec = self.load(user).await?;
        Ok(StatsSnapshot {
            stats: rec.stats,
            webhook_count: rec.webhooks.len(),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File I/O
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `Ok(None)` when the file does not exist yet. A file that exists but does
/// not parse is an error, never silently replaced.
async fn read_record(path: &Path) -> Result<Option<StoreRecord>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    if raw.trim().is_empty() {
        return Ok(Some(StoreRecord::default()));
    }
    let mut record: StoreRecord = serde_json::from_str(&raw)?;
    record.normalize();
    Ok(Some(record))
}

async fn write_record(path: &Path, record: &StoreRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = tokio::fs::write(&tmp, &json).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::Io(e));
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn validate_webhook_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| Error::Validation("webhook URL must start with http:// or https://".into()))?;
    if rest.is_empty() || rest.starts_with('/') || rest.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!("invalid webhook URL: {url}")));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
