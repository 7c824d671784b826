//! Shared helpers for the integration tests.

use std::path::Path;
use std::sync::Arc;

use keyward_core::{KeyDef, Schema};
use keyward_store::{ConfigOptions, ConfigRegistry, PersistentConfig};
use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness. `RUST_LOG` overrides `warn`.
pub fn setup_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// `{a: int = 1 in 0..=10, b: str = "x" in {x, y}}`
pub fn small_schema() -> Schema {
    Schema::new()
        .key(KeyDef::new("a", 1).range(0, 10).doc("A small counter"))
        .key(KeyDef::new("b", "x").choices(["x", "y"]).doc("A mode"))
}

/// Open `name` under `dir` with a private registry.
pub fn open(name: &str, schema: Schema, options: ConfigOptions, dir: &Path) -> PersistentConfig {
    PersistentConfig::with_registry(
        name,
        schema,
        options.config_dir(dir),
        Arc::new(ConfigRegistry::new()),
    )
    .expect("open config")
}
