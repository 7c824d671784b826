//! Mapping configuration names to document paths.
//!
//! `<config-dir>[/<namespace>]/<leaf>.<ext>`, where `<config-dir>` is the
//! user configuration directory (`~/.config` on Linux) unless overridden.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::format::DocumentFormat;
use crate::name::ConfigName;

/// The user's configuration directory.
///
/// # Errors
///
/// Returns [`StoreError::NoConfigDir`] when the platform offers none.
pub fn user_config_dir() -> StoreResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .ok_or(StoreError::NoConfigDir)
}

/// The document path for `name` under `root`.
#[must_use]
pub fn config_path_in(root: &Path, name: &ConfigName, format: DocumentFormat) -> PathBuf {
    let dir = match name.namespace() {
        Some(namespace) => root.join(namespace),
        None => root.to_path_buf(),
    };
    dir.join(format!("{}.{}", name.leaf(), format.extension()))
}

/// The document path for `name` under the user configuration directory.
///
/// ```rust,no_run
/// use keyward_store::{DocumentFormat, config_path_from_name};
///
/// let path = config_path_from_name("myproj.window", DocumentFormat::Json).unwrap();
/// assert!(path.ends_with("myproj/window.json"));
/// ```
///
/// # Errors
///
/// Returns [`StoreError::InvalidName`] for malformed names and
/// [`StoreError::NoConfigDir`] when no configuration directory exists.
pub fn config_path_from_name(name: &str, format: DocumentFormat) -> StoreResult<PathBuf> {
    let name = ConfigName::parse(name)?;
    Ok(config_path_in(&user_config_dir()?, &name, format))
}

/// Delete the persisted document for `name` under `root`, returning whether
/// a document was found.
///
/// # Errors
///
/// Returns [`StoreError::InvalidName`] for malformed names or
/// [`StoreError::WriteError`] if the document exists but cannot be removed.
pub fn remove_persisted_in(root: &Path, name: &str, format: DocumentFormat) -> StoreResult<bool> {
    let name = ConfigName::parse(name)?;
    let path = config_path_in(root, &name, format);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            info!(path = %path.display(), "removed persisted config");
            Ok(true)
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no persisted config to remove");
            Ok(false)
        },
        Err(e) => Err(StoreError::WriteError {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// Delete the persisted document for `name` under the user configuration
/// directory.
///
/// # Errors
///
/// See [`remove_persisted_in`]; also [`StoreError::NoConfigDir`].
pub fn remove_persisted(name: &str, format: DocumentFormat) -> StoreResult<bool> {
    remove_persisted_in(&user_config_dir()?, name, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_path() {
        let name = ConfigName::parse("proj.win").unwrap();
        let path = config_path_in(Path::new("/cfg"), &name, DocumentFormat::Annotated);
        assert_eq!(path, Path::new("/cfg/proj/win.yaml"));
    }

    #[test]
    fn test_flat_path() {
        let name = ConfigName::parse("solo").unwrap();
        let path = config_path_in(Path::new("/cfg"), &name, DocumentFormat::Csv);
        assert_eq!(path, Path::new("/cfg/solo.csv"));
    }

    #[test]
    fn test_remove_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let name = ConfigName::parse("proj:gone").unwrap();
        let path = config_path_in(dir.path(), &name, DocumentFormat::Json);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{}").unwrap();

        assert!(remove_persisted_in(dir.path(), "proj/gone", DocumentFormat::Json).unwrap());
        assert!(!path.exists());
        assert!(!remove_persisted_in(dir.path(), "proj/gone", DocumentFormat::Json).unwrap());
    }

    #[test]
    fn test_remove_rejects_bad_name() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_persisted_in(dir.path(), "bad name", DocumentFormat::Json).is_err());
    }
}
