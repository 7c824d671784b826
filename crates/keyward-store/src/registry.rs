//! Registry of live configurations, keyed by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use keyward_core::ValueMap;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::name::ConfigName;

/// Identifies one claim on a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ClaimId(u64);

#[derive(Debug, Clone)]
struct Claim {
    id: ClaimId,
    persistent: bool,
    defaults: ValueMap,
}

/// Snapshot of a live configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveConfig {
    /// Canonical name.
    pub name: String,
    /// Whether one of the live instances persists to disk.
    pub persistent: bool,
    /// Number of live instances using the name.
    pub instances: usize,
    /// Defaults of the most recent instance.
    pub defaults: ValueMap,
}

/// Tracks which configuration names are in use.
///
/// At most one persistent instance may hold a name at a time. Any number of
/// non-persistent instances may share a name; they only trigger a warning.
///
/// The registry is an explicit object so tests and embedders can use their
/// own; [`ConfigRegistry::global`] is the process-wide default.
///
/// # Example
///
/// ```
/// use keyward_store::ConfigRegistry;
///
/// let registry = ConfigRegistry::new();
/// assert!(!registry.is_claimed("proj:win"));
/// assert!(registry.active().is_empty());
/// ```
pub struct ConfigRegistry {
    claims: Mutex<HashMap<String, Vec<Claim>>>,
    next_id: AtomicU64,
}

impl ConfigRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            claims: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ConfigRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Claim>>> {
        self.claims.lock().unwrap_or_else(|e| {
            warn!("ConfigRegistry lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Record a new instance under `name`.
    pub(crate) fn claim(
        &self,
        name: &ConfigName,
        persistent: bool,
        defaults: &ValueMap,
    ) -> StoreResult<ClaimId> {
        let mut claims = self.lock();
        let entry = claims.entry(name.as_str().to_owned()).or_default();

        if persistent && entry.iter().any(|c| c.persistent) {
            return Err(StoreError::NameCollision {
                name: name.to_string(),
            });
        }
        if !entry.is_empty() {
            warn!(name = %name, "a config with this name already exists");
        }
        warn_on_differing_defaults(name.as_str(), entry, defaults);

        let id = ClaimId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entry.push(Claim {
            id,
            persistent,
            defaults: defaults.clone(),
        });
        debug!(name = %name, persistent, "claimed config name");
        Ok(id)
    }

    /// Change whether the claim `id` is persistent.
    pub(crate) fn set_persistent(
        &self,
        name: &ConfigName,
        id: ClaimId,
        persistent: bool,
    ) -> StoreResult<()> {
        let mut claims = self.lock();
        let Some(entry) = claims.get_mut(name.as_str()) else {
            return Ok(());
        };
        if persistent && entry.iter().any(|c| c.persistent && c.id != id) {
            return Err(StoreError::NameCollision {
                name: name.to_string(),
            });
        }
        if let Some(claim) = entry.iter_mut().find(|c| c.id == id) {
            claim.persistent = persistent;
        }
        Ok(())
    }

    /// Replace the defaults recorded for the claim `id`.
    pub(crate) fn update_defaults(&self, name: &ConfigName, id: ClaimId, defaults: &ValueMap) {
        let mut claims = self.lock();
        let Some(entry) = claims.get_mut(name.as_str()) else {
            return;
        };
        let (mine, others): (Vec<Claim>, Vec<Claim>) = entry.drain(..).partition(|c| c.id == id);
        warn_on_differing_defaults(name.as_str(), &others, defaults);
        *entry = others;
        for mut claim in mine {
            claim.defaults = defaults.clone();
            entry.push(claim);
        }
    }

    /// Drop the claim `id`.
    pub(crate) fn release(&self, name: &ConfigName, id: ClaimId) {
        let mut claims = self.lock();
        if let Some(entry) = claims.get_mut(name.as_str()) {
            entry.retain(|c| c.id != id);
            if entry.is_empty() {
                claims.remove(name.as_str());
            }
        }
        debug!(name = %name, "released config name");
    }

    /// Look up a live configuration by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for malformed names.
    pub fn get(&self, name: &str) -> StoreResult<Option<ActiveConfig>> {
        let name = ConfigName::parse(name)?;
        Ok(self.lock().get(name.as_str()).and_then(|entry| snapshot(name.as_str(), entry)))
    }

    /// Whether any live instance uses `name`. Malformed names are never
    /// claimed.
    #[must_use]
    pub fn is_claimed(&self, name: &str) -> bool {
        ConfigName::parse(name).is_ok_and(|name| self.lock().contains_key(name.as_str()))
    }

    /// Every live configuration, sorted by name.
    #[must_use]
    pub fn active(&self) -> Vec<ActiveConfig> {
        let mut active: Vec<ActiveConfig> = self
            .lock()
            .iter()
            .filter_map(|(name, entry)| snapshot(name, entry))
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        active
    }
}

fn snapshot(name: &str, entry: &[Claim]) -> Option<ActiveConfig> {
    let latest = entry.last()?;
    Some(ActiveConfig {
        name: name.to_owned(),
        persistent: entry.iter().any(|c| c.persistent),
        instances: entry.len(),
        defaults: latest.defaults.clone(),
    })
}

fn warn_on_differing_defaults(name: &str, existing: &[Claim], defaults: &ValueMap) {
    if defaults.is_empty() {
        return;
    }
    let differs = existing
        .iter()
        .any(|c| !c.defaults.is_empty() && c.defaults != *defaults);
    if differs {
        warn!(
            name,
            "config already created with different defaults; the new schema takes over the document"
        );
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.lock().keys().cloned().collect();
        f.debug_struct("ConfigRegistry").field("names", &names).finish()
    }
}
