//! Named, persistent configurations.
//!
//! A [`PersistentConfig`] wraps a [`ValidatedMapping`] with an identity
//! (a [`ConfigName`] resolved to a document path), a claim in a
//! [`ConfigRegistry`] and save-on-mutation semantics. All validation is
//! delegated to the mapping.
//!
//! Loading is forgiving: unreadable or drifted documents are reconciled
//! against the schema and never raise. Interactive mutation is strict:
//! unknown keys and invalid values are errors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keyward_core::{KeyDef, Schema, SetOutcome, ValidatedMapping, Value, ValueMap};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::format::{DocumentFormat, RenderOptions, render_table};
use crate::name::ConfigName;
use crate::options::ConfigOptions;
use crate::paths::{config_path_in, user_config_dir};
use crate::reconcile::{Reconciliation, reconcile};
use crate::registry::{ClaimId, ConfigRegistry};

/// Maximum size of a document that will be read (1 MB).
const MAX_DOCUMENT_SIZE: u64 = 1_048_576;

/// Callback fired after a key matching its pattern changed:
/// `(config, key, new value)`.
pub type ChangeCallback = Arc<dyn Fn(&PersistentConfig, &str, &Value) + Send + Sync>;

#[derive(Clone)]
struct KeyCallback {
    pattern: Regex,
    func: ChangeCallback,
}

/// Lifecycle state of a [`PersistentConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    /// No name and no keys yet.
    Unnamed,
    /// Named, no keys yet.
    Named,
    /// Keys are being defined; not yet finalized.
    SchemaOpen,
    /// Schema closed, values loaded or defaulted.
    Active,
    /// Disposed; the name is released and mutation is refused.
    Disposed,
}

/// What [`PersistentConfig::load`] did.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Document path that was consulted, if one could be resolved.
    pub path: Option<PathBuf>,
    /// Merge of the document with the schema.
    pub reconciliation: Reconciliation,
    /// Whether the document was rewritten to heal schema drift.
    pub rewritten: bool,
    /// Why the document could not be used, if it existed but was unusable.
    pub document_error: Option<String>,
}

/// A validated mapping with a name, a document on disk and change
/// callbacks.
///
/// ```rust
/// use keyward_core::{KeyDef, Schema};
/// use keyward_store::{ConfigOptions, ConfigRegistry, PersistentConfig};
///
/// let dir = tempfile::tempdir().unwrap();
/// let schema = Schema::new()
///     .key(KeyDef::new("font-size", 10).range(8, 24))
///     .key(KeyDef::new("theme", "dark").choices(["dark", "light"]));
///
/// let mut config = PersistentConfig::with_registry(
///     "myapp.ui",
///     schema,
///     ConfigOptions::default().config_dir(dir.path()),
///     ConfigRegistry::new().into(),
/// )
/// .unwrap();
///
/// config.set("theme", "light").unwrap();
/// assert!(dir.path().join("myapp/ui.yaml").exists());
/// assert!(config.set("font-size", 99).is_err());
/// ```
pub struct PersistentConfig {
    mapping: ValidatedMapping,
    name: Option<ConfigName>,
    claim: Option<ClaimId>,
    registry: Arc<ConfigRegistry>,
    options: ConfigOptions,
    persistent: bool,
    suspended: bool,
    loaded_from_disk: bool,
    disposed: bool,
    callbacks: Vec<KeyCallback>,
}

impl PersistentConfig {
    /// Create a configuration registered in the process-wide registry.
    ///
    /// An empty `name` creates an unnamed, non-persistent configuration.
    /// When `schema` is non-empty and `options.load` is set, the document is
    /// loaded right away; otherwise keys can be added with
    /// [`define_key`](Self::define_key) before calling [`load`](Self::load).
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidName`] for malformed names.
    /// - [`StoreError::NameCollision`] when another persistent instance
    ///   holds the name.
    /// - [`StoreError::Mapping`] when `schema` defines a key twice.
    pub fn new(name: &str, schema: Schema, options: ConfigOptions) -> StoreResult<Self> {
        Self::with_registry(name, schema, options, ConfigRegistry::global())
    }

    /// Like [`new`](Self::new), with an explicit registry.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_registry(
        name: &str,
        schema: Schema,
        options: ConfigOptions,
        registry: Arc<ConfigRegistry>,
    ) -> StoreResult<Self> {
        let name = if name.is_empty() {
            None
        } else {
            Some(ConfigName::parse(name)?)
        };

        let mut mapping = ValidatedMapping::new().with_matching(options.key_matching);
        mapping.define_schema(schema)?;

        let persistent = options.persistent && name.is_some();
        let claim = match &name {
            Some(name) => Some(registry.claim(name, persistent, mapping.defaults())?),
            None => None,
        };

        let mut config = Self {
            mapping,
            name,
            claim,
            registry,
            options,
            persistent,
            suspended: false,
            loaded_from_disk: false,
            disposed: false,
            callbacks: Vec::new(),
        };

        if config.options.load && !config.mapping.is_empty() {
            let _ = config.load();
        }
        Ok(config)
    }

    /// An unnamed, in-memory configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Mapping`] when `schema` defines a key twice.
    pub fn unnamed(schema: Schema) -> StoreResult<Self> {
        let mut config = Self::with_registry("", schema, ConfigOptions::in_memory(), ConfigRegistry::global())?;
        config.mapping.finalize();
        Ok(config)
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    /// Add a key to the schema. Only possible before the first load or
    /// finalize.
    ///
    /// # Errors
    ///
    /// [`MappingError::SchemaClosed`](keyward_core::MappingError::SchemaClosed)
    /// once active, [`MappingError::DuplicateDefinition`](keyward_core::MappingError::DuplicateDefinition)
    /// for a repeated key.
    pub fn define_key(&mut self, def: KeyDef) -> StoreResult<()> {
        self.ensure_live()?;
        self.mapping.define_key(def)?;
        self.sync_registry_defaults();
        Ok(())
    }

    /// Close the schema without consulting the document. Keys without a
    /// value get their default.
    pub fn finalize(&mut self) {
        if !self.mapping.is_finalized() {
            self.mapping.finalize();
            self.sync_registry_defaults();
        }
    }

    /// Install a pre-commit hook on the underlying mapping.
    pub fn set_pre_commit(
        &mut self,
        hook: impl Fn(&ValidatedMapping, &str, Option<&Value>, &Value) -> Result<Option<Value>, String>
        + Send
        + Sync
        + 'static,
    ) {
        self.mapping.set_pre_commit(hook);
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// The configuration name.
    #[must_use]
    pub fn name(&self) -> Option<&ConfigName> {
        self.name.as_ref()
    }

    /// Whether mutations are saved.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Turn persistence on or off.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unnamed`] when enabling persistence without a name.
    /// - [`StoreError::NameCollision`] when another persistent instance
    ///   holds the name.
    pub fn set_persistent(&mut self, persistent: bool) -> StoreResult<()> {
        self.ensure_live()?;
        let (Some(name), Some(claim)) = (&self.name, self.claim) else {
            if persistent {
                return Err(StoreError::Unnamed {
                    operation: "set_persistent",
                });
            }
            return Ok(());
        };
        self.registry.set_persistent(name, claim, persistent)?;
        self.persistent = persistent;
        Ok(())
    }

    /// The lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConfigState {
        if self.disposed {
            ConfigState::Disposed
        } else if self.mapping.is_finalized() {
            ConfigState::Active
        } else if !self.mapping.is_empty() {
            ConfigState::SchemaOpen
        } else if self.name.is_some() {
            ConfigState::Named
        } else {
            ConfigState::Unnamed
        }
    }

    /// Whether the current values came from a document.
    #[must_use]
    pub fn loaded_from_disk(&self) -> bool {
        self.loaded_from_disk
    }

    /// The construction options.
    #[must_use]
    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    /// The underlying mapping.
    #[must_use]
    pub fn mapping(&self) -> &ValidatedMapping {
        &self.mapping
    }

    /// The document path.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unnamed`] for unnamed configurations,
    /// [`StoreError::NoConfigDir`] without a configuration directory.
    pub fn path(&self) -> StoreResult<PathBuf> {
        let name = self.name.as_ref().ok_or(StoreError::Unnamed { operation: "path" })?;
        let root = match &self.options.config_dir {
            Some(dir) => dir.clone(),
            None => user_config_dir()?,
        };
        Ok(config_path_in(&root, name, self.options.format))
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    /// The value for `key`, falling back to its default before the schema
    /// is finalized.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.mapping.get(key).or_else(|| self.mapping.default_of(key))
    }

    /// Keys whose value differs from the default.
    #[must_use]
    pub fn diff(&self) -> ValueMap {
        self.mapping.diff(None)
    }

    /// Render the configuration in `format`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SerializeError`] if a value cannot be rendered.
    pub fn render(&self, format: DocumentFormat) -> StoreResult<String> {
        format.render(&self.mapping, &self.options.render_options())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Assign `value` to `key`.
    ///
    /// On change, callbacks whose pattern matches `key` run and a persistent
    /// configuration is saved. Assigning the stored value does nothing.
    ///
    /// # Errors
    ///
    /// Validation errors from the mapping, [`StoreError::Disposed`], or a
    /// write error when saving fails (the value stays assigned).
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> StoreResult<SetOutcome> {
        self.ensure_live()?;
        self.finalize();
        let outcome = self.mapping.set(key, value)?;
        if let SetOutcome::Stored(value) = &outcome {
            let key = self.mapping.resolve_key(key)?;
            self.changed(&key, value)?;
        }
        Ok(outcome)
    }

    /// Assign every pair of `batch`, all or nothing, saving once at the end.
    ///
    /// A veto part way through restores the values held before the call;
    /// callbacks that already fired are not undone.
    ///
    /// # Errors
    ///
    /// The first validation error or veto from the pre-commit hook (nothing
    /// is changed), or a write error.
    pub fn update(&mut self, batch: ValueMap) -> StoreResult<Vec<String>> {
        self.ensure_live()?;
        self.finalize();
        if let Err(e) = self.mapping.check_batch(&batch) {
            if let Ok(path) = self.path() {
                error!(error = %e, path = %path.display(), "rejected update; remove the document to reset to defaults");
            }
            return Err(e.into());
        }

        let snapshot = self.mapping.values().clone();
        self.suspended = true;
        let applied = self.apply_batch(batch);
        self.suspended = false;
        let changed = match applied {
            Ok(changed) => changed,
            Err(e) => {
                warn!(error = %e, "batch update failed, restoring previous values");
                self.mapping.restore_values(snapshot);
                return Err(e);
            },
        };

        if !changed.is_empty() {
            self.persist()?;
        }
        Ok(changed)
    }

    fn apply_batch(&mut self, batch: ValueMap) -> StoreResult<Vec<String>> {
        let mut changed = Vec::new();
        for (key, value) in batch {
            if self.set(&key, value)?.is_changed() {
                changed.push(self.mapping.resolve_key(&key)?);
            }
        }
        Ok(changed)
    }

    /// Restore every default and save.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disposed`] or a write error.
    pub fn reset(&mut self) -> StoreResult<()> {
        self.ensure_live()?;
        self.finalize();
        self.mapping.reset();
        self.persist()
    }

    /// Restore the default of a single key.
    ///
    /// # Errors
    ///
    /// [`MappingError::UnknownKey`](keyward_core::MappingError::UnknownKey),
    /// [`StoreError::Disposed`] or a write error.
    pub fn reset_key(&mut self, key: &str) -> StoreResult<SetOutcome> {
        self.ensure_live()?;
        self.finalize();
        let outcome = self.mapping.reset_key(key)?;
        if let SetOutcome::Stored(value) = &outcome {
            let key = self.mapping.resolve_key(key)?;
            self.changed(&key, value)?;
        }
        Ok(outcome)
    }

    /// Call `func` after any key matching `pattern` changed. The pattern is
    /// a regular expression anchored at the start of the key; `None`
    /// matches every key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPattern`] if the pattern does not compile.
    pub fn register_callback(
        &mut self,
        func: impl Fn(&PersistentConfig, &str, &Value) + Send + Sync + 'static,
        pattern: Option<&str>,
    ) -> StoreResult<()> {
        let source = pattern.unwrap_or(".*");
        let pattern = Regex::new(&format!("^(?:{source})")).map_err(|e| StoreError::InvalidPattern {
            pattern: source.to_owned(),
            source: e,
        })?;
        self.callbacks.push(KeyCallback {
            pattern,
            func: Arc::new(func),
        });
        Ok(())
    }

    fn changed(&self, key: &str, value: &Value) -> StoreResult<()> {
        for callback in &self.callbacks {
            if callback.pattern.is_match(key) {
                (callback.func)(self, key, value);
            }
        }
        self.persist()
    }

    fn persist(&self) -> StoreResult<()> {
        if self.persistent && !self.suspended {
            self.save()?;
        }
        Ok(())
    }

    fn ensure_live(&self) -> StoreResult<()> {
        if self.disposed {
            return Err(StoreError::Disposed {
                name: self.name.as_ref().map(ToString::to_string).unwrap_or_default(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Load the own document and reconcile it with the schema.
    ///
    /// Never fails: missing, unreadable or malformed documents fall back to
    /// the defaults. When the document drifted from the schema and the
    /// configuration is persistent it is rewritten once.
    pub fn load(&mut self) -> LoadReport {
        if self.mapping.is_empty() {
            warn!(name = %self.title(), "schema is empty, not loading document");
            return LoadReport::default();
        }
        match self.path() {
            Ok(path) => self.load_from(&path),
            Err(e) => {
                debug!(error = %e, "no document path, using defaults");
                self.load_document(None, None, None)
            },
        }
    }

    /// Load and reconcile the document at `path`. A rewrite, when needed,
    /// goes to the own document path.
    pub fn load_from(&mut self, path: &Path) -> LoadReport {
        if self.mapping.is_empty() {
            warn!(path = %path.display(), "schema is empty, not loading document");
            return LoadReport {
                path: Some(path.to_path_buf()),
                ..LoadReport::default()
            };
        }
        match read_document(path) {
            Ok(document) => self.load_document(Some(path), document, None),
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not read config, using defaults");
                self.load_document(Some(path), None, Some(e.to_string()))
            },
        }
    }

    fn load_document(
        &mut self,
        path: Option<&Path>,
        document: Option<ValueMap>,
        document_error: Option<String>,
    ) -> LoadReport {
        let reconciliation = reconcile(document, &self.mapping);
        self.mapping.replace_values(reconciliation.values.clone());
        self.loaded_from_disk = reconciliation.from_document;
        self.sync_registry_defaults();

        let mut rewritten = false;
        if reconciliation.needs_rewrite() && self.persistent {
            match self.save() {
                Ok(target) => {
                    info!(path = %target.display(), "rewrote config to match the schema");
                    rewritten = true;
                },
                Err(e) => error!(error = %e, "failed to rewrite drifted config"),
            }
        }

        if let Some(path) = path
            && reconciliation.from_document
        {
            info!(path = %path.display(), keys = reconciliation.values.len(), "loaded config");
        }

        LoadReport {
            path: path.map(Path::to_path_buf),
            reconciliation,
            rewritten,
            document_error,
        }
    }

    /// Save the full key set to the own document.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unnamed`], [`StoreError::NoConfigDir`], or a write error.
    pub fn save(&self) -> StoreResult<PathBuf> {
        let path = self.path()?;
        self.save_to(&path, Some(self.options.format))?;
        Ok(path)
    }

    /// Save the full key set to `path`. Without an explicit `format` it is
    /// derived from the extension.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnsupportedFormat`], [`StoreError::WriteError`] or
    /// [`StoreError::WriteVerification`].
    pub fn save_to(&self, path: &Path, format: Option<DocumentFormat>) -> StoreResult<()> {
        let format = match format {
            Some(format) => format,
            None => DocumentFormat::from_path(path)?,
        };
        let text = format.render(&self.mapping, &self.options.render_options())?;
        write_document(path, &text)?;
        debug!(path = %path.display(), format = %format, "saved config");
        Ok(())
    }

    /// Write an annotated copy with an explanatory header to a new
    /// temporary file in `dir` (the system temp dir when `None`). The file
    /// is kept; the caller removes it.
    ///
    /// # Errors
    ///
    /// [`StoreError::WriteError`] if the file cannot be created.
    pub fn write_edit_copy(&self, dir: Option<&Path>) -> StoreResult<PathBuf> {
        let dir = dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let write_error = |source: std::io::Error| StoreError::WriteError {
            path: dir.display().to_string(),
            source,
        };

        let title = self.title();
        let options = RenderOptions {
            header: Some(format!(
                "Editing config: {title}\n\
                 Save this file to apply the changes. Keys outside the schema and\n\
                 invalid values are replaced by their defaults."
            )),
            ..self.options.render_options()
        };
        let text = DocumentFormat::Annotated.render(&self.mapping, &options)?;

        let file = tempfile::Builder::new()
            .prefix("keyward-")
            .suffix(".yaml")
            .tempfile_in(&dir)
            .map_err(write_error)?;
        std::fs::write(file.path(), text).map_err(write_error)?;
        let path = file.into_temp_path().keep().map_err(|e| write_error(e.error))?;
        debug!(path = %path.display(), "wrote edit copy");
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // Copies and disposal
    // -----------------------------------------------------------------------

    /// An unnamed, non-persistent copy with the same schema, hooks and
    /// values. Callbacks are not copied.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            mapping: self.mapping.clone(),
            name: None,
            claim: None,
            registry: Arc::clone(&self.registry),
            options: self.options.clone().persistent(false).load(false),
            persistent: false,
            suspended: false,
            loaded_from_disk: false,
            disposed: false,
            callbacks: Vec::new(),
        }
    }

    /// A copy under a new `name`. An empty name yields an unnamed copy that
    /// cannot persist.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NameCollision`] when `name` is this config's name or
    ///   is already in use.
    /// - [`StoreError::InvalidName`] for malformed names.
    pub fn clone_as(&self, name: &str, persistent: bool, clone_callbacks: bool) -> StoreResult<Self> {
        let mut out = self.copy();
        if clone_callbacks {
            out.callbacks.clone_from(&self.callbacks);
        }
        if name.is_empty() {
            return Ok(out);
        }

        let name = ConfigName::parse(name)?;
        if self.name.as_ref() == Some(&name) || self.registry.is_claimed(name.as_str()) {
            return Err(StoreError::NameCollision {
                name: name.to_string(),
            });
        }
        out.claim = Some(self.registry.claim(&name, persistent, out.mapping.defaults())?);
        out.name = Some(name);
        out.persistent = persistent;
        out.options.persistent = persistent;
        Ok(out)
    }

    /// Release the name and refuse further mutation.
    pub fn dispose(&mut self) {
        self.release_claim();
        self.persistent = false;
        self.disposed = true;
        debug!(name = %self.title(), "disposed config");
    }

    fn release_claim(&mut self) {
        if let (Some(name), Some(claim)) = (&self.name, self.claim.take()) {
            self.registry.release(name, claim);
        }
    }

    fn sync_registry_defaults(&self) {
        if let (Some(name), Some(claim)) = (&self.name, self.claim) {
            self.registry.update_defaults(name, claim, self.mapping.defaults());
        }
    }

    fn title(&self) -> String {
        self.name
            .as_ref()
            .map_or_else(|| "<unnamed>".to_owned(), ToString::to_string)
    }
}

/// Read and parse the document at `path`; `Ok(None)` when it does not exist.
fn read_document(path: &Path) -> StoreResult<Option<ValueMap>> {
    let read_error = |source: std::io::Error| StoreError::ReadError {
        path: path.display().to_string(),
        source,
    };

    // Size check before reading.
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config document not found, using defaults");
            return Ok(None);
        },
        Err(e) => return Err(read_error(e)),
    };
    if metadata.len() > MAX_DOCUMENT_SIZE {
        return Err(StoreError::ParseError {
            path: path.display().to_string(),
            message: format!(
                "document is {} bytes, exceeding the {MAX_DOCUMENT_SIZE} byte limit",
                metadata.len()
            ),
        });
    }

    let text = std::fs::read_to_string(path).map_err(read_error)?;

    let format = DocumentFormat::from_path(path)?;
    format.parse(&text, &path.display().to_string()).map(Some)
}

fn write_document(path: &Path, text: &str) -> StoreResult<()> {
    let write_error = |source: std::io::Error| StoreError::WriteError {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    std::fs::write(path, text).map_err(write_error)?;
    if !path.exists() {
        return Err(StoreError::WriteVerification {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

impl Drop for PersistentConfig {
    fn drop(&mut self) {
        self.release_claim();
    }
}

impl fmt::Display for PersistentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_table(&self.title(), &self.mapping))
    }
}

impl fmt::Debug for PersistentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentConfig")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("persistent", &self.persistent)
            .field("loaded_from_disk", &self.loaded_from_disk)
            .field("callbacks", &self.callbacks.len())
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
