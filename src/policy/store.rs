//! File-backed policy store: auto-send settings plus the override lists.
//!
//! Readers take an `Arc<PolicySnapshot>` and never block on persistence.
//! Writers are serialized, clone the current snapshot, persist the modified
//! copy, then swap it in. A failed write leaves the live snapshot untouched.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::contacts::{ContactList, ContactPolicyEntry, ListKind};
use crate::error::PolicyError;

/// Default minimum confidence for auto-send.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.80;

/// Process-wide auto-send settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Master switch for auto-send.
    pub auto_send_enabled: bool,
    /// Minimum estimated confidence for auto-send, in `[0, 1]`.
    pub confidence_threshold: f64,
    /// Auto-send only when the contact or message contains one of these.
    pub allowlist: Vec<String>,
    /// Never auto-send when the draft service flags negative sentiment.
    pub block_negative_auto_send: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_send_enabled: false,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            allowlist: Vec::new(),
            block_negative_auto_send: true,
        }
    }
}

impl PolicyConfig {
    /// Case-insensitive substring check of the allowlist against the
    /// contact and the message body. An empty allowlist matches nothing.
    pub fn allowlist_matches(&self, contact: &str, body: &str) -> bool {
        let contact = contact.to_lowercase();
        let body = body.to_lowercase();
        self.allowlist.iter().any(|item| {
            let item = item.to_lowercase();
            contact.contains(&item) || body.contains(&item)
        })
    }

    /// Reject values the type cannot rule out.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PolicyError::InvalidValue {
                field: "confidence_threshold".into(),
                message: format!("{} is outside [0, 1]", self.confidence_threshold),
            });
        }
        Ok(())
    }

    /// Trim allowlist items, dropping blanks and case-insensitive duplicates.
    fn normalize_allowlist(&mut self) {
        let mut allowlist: Vec<String> = Vec::with_capacity(self.allowlist.len());
        for item in std::mem::take(&mut self.allowlist) {
            let item = item.trim();
            let lowered = item.to_lowercase();
            if item.is_empty() || allowlist.iter().any(|a| a.to_lowercase() == lowered) {
                continue;
            }
            allowlist.push(item.to_string());
        }
        self.allowlist = allowlist;
    }
}

/// Immutable view of the full policy state.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySnapshot {
    pub config: PolicyConfig,
    pub never_auto: ContactList,
    pub always_auto: ContactList,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            config: PolicyConfig::default(),
            never_auto: ContactList::new(ListKind::NeverAuto),
            always_auto: ContactList::new(ListKind::AlwaysAuto),
        }
    }
}

impl PolicySnapshot {
    pub fn list(&self, kind: ListKind) -> &ContactList {
        match kind {
            ListKind::NeverAuto => &self.never_auto,
            ListKind::AlwaysAuto => &self.always_auto,
        }
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut ContactList {
        match kind {
            ListKind::NeverAuto => &mut self.never_auto,
            ListKind::AlwaysAuto => &mut self.always_auto,
        }
    }

    pub fn matches(&self, contact: &str, kind: ListKind) -> bool {
        self.list(kind).matches(contact)
    }
}

// ── On-disk format ──────────────────────────────────────────────────

#[derive(Serialize)]
struct StoredList<'a> {
    flat: String,
    entries: &'a [ContactPolicyEntry],
}

#[derive(Serialize)]
struct StoredPolicy<'a> {
    config: &'a PolicyConfig,
    never_auto: StoredList<'a>,
    always_auto: StoredList<'a>,
}

impl<'a> StoredPolicy<'a> {
    fn from_snapshot(snapshot: &'a PolicySnapshot) -> Self {
        Self {
            config: &snapshot.config,
            never_auto: StoredList {
                flat: snapshot.never_auto.flat(),
                entries: snapshot.never_auto.entries(),
            },
            always_auto: StoredList {
                flat: snapshot.always_auto.flat(),
                entries: snapshot.always_auto.entries(),
            },
        }
    }
}

/// Parse a stored policy document, recovering what can be recovered.
fn parse_stored(raw: &str) -> Result<PolicySnapshot, serde_json::Error> {
    let doc: serde_json::Value = serde_json::from_str(raw)?;

    let mut config = match doc.get("config") {
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            warn!(error = %e, "Stored policy config unreadable, using defaults");
            PolicyConfig::default()
        }),
        None => PolicyConfig::default(),
    };
    if let Err(e) = config.validate() {
        warn!(error = %e, "Stored confidence threshold rejected, using default");
        config.confidence_threshold = DEFAULT_CONFIDENCE_THRESHOLD;
    }
    config.normalize_allowlist();

    Ok(PolicySnapshot {
        config,
        never_auto: parse_stored_list(&doc, ListKind::NeverAuto),
        always_auto: parse_stored_list(&doc, ListKind::AlwaysAuto),
    })
}

/// Structured entries first; the flat token string if they are corrupt.
fn parse_stored_list(doc: &serde_json::Value, kind: ListKind) -> ContactList {
    let Some(stored) = doc.get(kind.to_string()) else {
        return ContactList::new(kind);
    };

    if let Some(entries) = stored.get("entries") {
        match serde_json::from_value::<Vec<ContactPolicyEntry>>(entries.clone()) {
            Ok(entries) => return ContactList::from_entries(kind, entries),
            Err(e) => {
                warn!(list = %kind, error = %e, "Structured list unreadable, rebuilding from flat form");
            }
        }
    }

    let flat = stored.get("flat").and_then(|v| v.as_str()).unwrap_or_default();
    ContactList::from_flat(kind, flat)
}

/// Write via a sibling temp file so readers of the file never see a partial write.
fn persist(path: &Path, snapshot: &PolicySnapshot) -> Result<(), PolicyError> {
    let json = serde_json::to_string_pretty(&StoredPolicy::from_snapshot(snapshot))?;
    let io_err = |source| PolicyError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

// ── Store ───────────────────────────────────────────────────────────

/// Persistent policy store shared by the pipeline and the policy API.
pub struct PolicyStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<PolicySnapshot>>,
    write_lock: Mutex<()>,
}

impl PolicyStore {
    /// Open the store at `path`. Never fails: a missing or unreadable file
    /// yields defaults, and the file is only rewritten on the next mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(raw) => match parse_stored(&raw) {
                Ok(snapshot) => {
                    info!(
                        path = %path.display(),
                        never_auto = snapshot.never_auto.len(),
                        always_auto = snapshot.always_auto.len(),
                        "Loaded contact policy"
                    );
                    snapshot
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Policy file is corrupt, starting from defaults");
                    PolicySnapshot::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No policy file yet, using defaults");
                PolicySnapshot::default()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read policy file, starting from defaults");
                PolicySnapshot::default()
            }
        };

        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        }
    }

    /// Store that never touches disk (tests, dry runs).
    pub fn in_memory() -> Self {
        Self::with_snapshot(PolicySnapshot::default())
    }

    /// In-memory store seeded with `snapshot`.
    pub fn with_snapshot(snapshot: PolicySnapshot) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current state. Cheap; holds no lock after returning.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` to a copy of the state; persist and publish it if `f`
    /// reports a change. An error from `f` discards the copy.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut PolicySnapshot) -> Result<(T, bool), PolicyError>,
    ) -> Result<T, PolicyError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = (*self.snapshot()).clone();
        let (result, changed) = f(&mut next)?;
        if !changed {
            return Ok(result);
        }

        if let Some(ref path) = self.path {
            persist(path, &next)?;
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(result)
    }

    /// Add a contact to a list. Returns `true` if it was not already there.
    pub fn add_to_list(&self, contact: &str, kind: ListKind) -> Result<bool, PolicyError> {
        let added = self.mutate(|s| {
            let added = s.list_mut(kind).insert(contact);
            Ok((added, added))
        })?;
        if added {
            info!(contact = %contact.trim(), list = %kind, "Contact added to policy list");
        }
        Ok(added)
    }

    /// Remove a contact from a list. Returns the number of entries removed.
    pub fn remove_from_list(&self, contact: &str, kind: ListKind) -> Result<usize, PolicyError> {
        let removed = self.mutate(|s| {
            let removed = s.list_mut(kind).remove(contact);
            Ok((removed, removed > 0))
        })?;
        if removed > 0 {
            info!(contact = %contact.trim(), list = %kind, removed, "Contact removed from policy list");
        }
        Ok(removed)
    }

    pub fn matches(&self, contact: &str, kind: ListKind) -> bool {
        self.snapshot().matches(contact, kind)
    }

    pub fn display(&self, kind: ListKind) -> String {
        self.snapshot().list(kind).display()
    }

    /// Apply several settings as one change. The edited config is
    /// normalised and validated before anything is written; on error the
    /// live state is untouched. Returns the resulting config.
    pub fn update_config(
        &self,
        f: impl FnOnce(&mut PolicyConfig),
    ) -> Result<PolicyConfig, PolicyError> {
        self.mutate(|s| {
            let mut next = s.config.clone();
            f(&mut next);
            next.normalize_allowlist();
            next.validate()?;
            let changed = next != s.config;
            s.config = next.clone();
            Ok((next, changed))
        })
    }

    pub fn set_auto_send_enabled(&self, enabled: bool) -> Result<(), PolicyError> {
        self.update_config(|c| c.auto_send_enabled = enabled)?;
        info!(enabled, "Auto-send setting updated");
        Ok(())
    }

    /// Set the auto-send threshold. Rejects NaN and values outside `[0, 1]`.
    pub fn set_confidence_threshold(&self, threshold: f64) -> Result<(), PolicyError> {
        self.update_config(|c| c.confidence_threshold = threshold)?;
        info!(threshold, "Confidence threshold updated");
        Ok(())
    }

    pub fn set_block_negative_auto_send(&self, block: bool) -> Result<(), PolicyError> {
        self.update_config(|c| c.block_negative_auto_send = block)?;
        info!(block, "Negative-sentiment blocking updated");
        Ok(())
    }

    /// Replace the allowlist. Items are trimmed; blanks and
    /// case-insensitive duplicates are dropped.
    pub fn set_allowlist<I, S>(&self, items: I) -> Result<(), PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> = items.into_iter().map(|i| i.as_ref().to_string()).collect();
        let config = self.update_config(|c| c.allowlist = items)?;
        info!(count = config.allowlist.len(), "Allowlist updated");
        Ok(())
    }
}
