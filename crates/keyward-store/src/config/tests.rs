use std::sync::atomic::{AtomicUsize, Ordering};

use keyward_core::{KeyMatching, MappingError};

use super::*;

fn schema() -> Schema {
    Schema::new()
        .key(KeyDef::new("a", 1).range(0, 10))
        .key(KeyDef::new("b", "x").choices(["x", "y"]))
}

fn options(dir: &Path) -> ConfigOptions {
    ConfigOptions::default().config_dir(dir)
}

fn open(name: &str, dir: &Path, registry: &Arc<ConfigRegistry>) -> PersistentConfig {
    PersistentConfig::with_registry(name, schema(), options(dir), Arc::clone(registry)).unwrap()
}

fn registry() -> Arc<ConfigRegistry> {
    Arc::new(ConfigRegistry::new())
}

#[test]
fn test_fresh_config_uses_defaults_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = open("proj:fresh", dir.path(), &registry());
    assert_eq!(cfg.state(), ConfigState::Active);
    assert!(!cfg.loaded_from_disk());
    assert_eq!(cfg.get("a"), Some(&Value::Int(1)));
    assert!(!cfg.path().unwrap().exists());
}

#[test]
fn test_set_saves_to_namespaced_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = open("proj/win", dir.path(), &registry());
    assert!(cfg.set("a", 5).unwrap().is_changed());
    let path = dir.path().join("proj").join("win.yaml");
    assert_eq!(cfg.path().unwrap(), path);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("a: 5\n"));
    assert!(text.contains("b: x\n"), "full key set is saved:\n{text}");
}

#[test]
fn test_identical_set_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = open("proj:noop", dir.path(), &registry());
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    cfg.register_callback(
        move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        },
        None,
    )
    .unwrap();

    let _ = cfg.set("a", 5).unwrap();
    let path = cfg.path().unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(cfg.set("a", 5).unwrap(), SetOutcome::Unchanged);
    assert!(!path.exists(), "a no-op set must not save");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invalid_set_is_rejected_and_not_saved() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = open("proj:strict", dir.path(), &registry());
    let err = cfg.set("a", 99).unwrap_err();
    assert!(matches!(err, StoreError::Mapping(MappingError::InvalidValue { .. })), "{err}");
    let err = cfg.set("nope", 1).unwrap_err();
    assert!(matches!(err, StoreError::Mapping(MappingError::UnknownKey { .. })), "{err}");
    assert_eq!(cfg.get("a"), Some(&Value::Int(1)));
    assert!(!cfg.path().unwrap().exists());
}

#[test]
fn test_round_trip_in_every_format() {
    for format in [DocumentFormat::Annotated, DocumentFormat::Json, DocumentFormat::Csv] {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();
        let opts = options(dir.path()).format(format);
        {
            let mut cfg =
                PersistentConfig::with_registry("proj:trip", schema(), opts.clone(), Arc::clone(&registry))
                    .unwrap();
            let _ = cfg.set("a", 7).unwrap();
            let _ = cfg.set("b", "y").unwrap();
            assert_eq!(
                cfg.path().unwrap().extension().and_then(|e| e.to_str()),
                Some(format.extension())
            );
        }

        let cfg = PersistentConfig::with_registry("proj:trip", schema(), opts, registry).unwrap();
        assert!(cfg.loaded_from_disk(), "{format}");
        assert_eq!(cfg.get("a"), Some(&Value::Int(7)), "{format}");
        assert_eq!(cfg.get("b"), Some(&Value::from("y")), "{format}");
    }
}

#[test]
fn test_reconciliation_fills_and_retires() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proj").join("fill.yaml");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "a: 5\nc: 99\n").unwrap();

    let mut cfg = PersistentConfig::with_registry(
        "proj:fill",
        Schema::new().key(KeyDef::new("a", 1)).key(KeyDef::new("b", 2)),
        options(dir.path()).load(false),
        registry(),
    )
    .unwrap();
    let report = cfg.load();

    assert_eq!(report.reconciliation.retired_keys, ["c"]);
    assert_eq!(report.reconciliation.filled_keys, ["b"]);
    assert!(report.rewritten);
    assert_eq!(cfg.get("a"), Some(&Value::Int(5)));
    assert_eq!(cfg.get("b"), Some(&Value::Int(2)));

    let rewritten = DocumentFormat::Annotated
        .parse(&std::fs::read_to_string(&path).unwrap(), "test")
        .unwrap();
    assert_eq!(rewritten.keys().collect::<Vec<_>>(), ["a", "b"]);
}

#[test]
fn test_invalid_persisted_value_heals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("heal.yaml");
    std::fs::write(&path, "a: 99\n").unwrap();

    let cfg = PersistentConfig::with_registry(
        "heal",
        Schema::new().key(KeyDef::new("a", 1).range(0, 10)),
        options(dir.path()),
        registry(),
    )
    .unwrap();

    assert_eq!(cfg.get("a"), Some(&Value::Int(1)));
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("a: 1\n"), "{text}");
}

#[test]
fn test_drift_is_not_rewritten_when_not_persistent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.yaml");
    std::fs::write(&path, "a: 99\n").unwrap();

    let mut cfg = PersistentConfig::with_registry(
        "ro",
        schema(),
        options(dir.path()).persistent(false).load(false),
        registry(),
    )
    .unwrap();
    let report = cfg.load();
    assert!(report.reconciliation.needs_rewrite());
    assert!(!report.rewritten);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a: 99\n");
}

#[test]
fn test_corrupt_document_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut cfg = PersistentConfig::with_registry(
        "broken",
        schema(),
        options(dir.path()).format(DocumentFormat::Json).load(false),
        registry(),
    )
    .unwrap();
    let report = cfg.load();
    assert!(report.document_error.is_some());
    assert!(!cfg.loaded_from_disk());
    assert_eq!(cfg.get("a"), Some(&Value::Int(1)));
    assert_eq!(cfg.state(), ConfigState::Active);
}

#[test]
fn test_relaxed_spelling_is_respelled_on_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loose.yaml");
    std::fs::write(&path, "Font_Size: 12\n").unwrap();

    let mut cfg = PersistentConfig::with_registry(
        "loose",
        Schema::new().key(KeyDef::new("font-size", 10)),
        options(dir.path()).key_matching(KeyMatching::Relaxed).load(false),
        registry(),
    )
    .unwrap();
    let report = cfg.load();
    assert_eq!(
        report.reconciliation.respelled_keys,
        [("Font_Size".to_owned(), "font-size".to_owned())]
    );
    assert!(report.rewritten);
    assert_eq!(cfg.get("font-size"), Some(&Value::Int(12)));
    assert!(std::fs::read_to_string(&path).unwrap().contains("font-size: 12\n"));
}

#[test]
fn test_second_persistent_instance_collides() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let _first = open("proj:one", dir.path(), &registry);

    let err = PersistentConfig::with_registry("proj/one", schema(), options(dir.path()), Arc::clone(&registry))
        .unwrap_err();
    assert!(matches!(err, StoreError::NameCollision { ref name } if name == "proj:one"));

    let shadow = PersistentConfig::with_registry(
        "proj:one",
        schema(),
        options(dir.path()).persistent(false),
        Arc::clone(&registry),
    )
    .unwrap();
    assert!(!shadow.is_persistent());
    assert_eq!(registry.get("proj:one").unwrap().unwrap().instances, 2);
}

#[test]
fn test_drop_and_dispose_release_the_name() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    {
        let _cfg = open("proj:scoped", dir.path(), &registry);
        assert!(registry.is_claimed("proj:scoped"));
    }
    assert!(!registry.is_claimed("proj:scoped"));

    let mut cfg = open("proj:scoped", dir.path(), &registry);
    cfg.dispose();
    assert_eq!(cfg.state(), ConfigState::Disposed);
    assert!(!registry.is_claimed("proj:scoped"));
    assert!(matches!(cfg.set("a", 2), Err(StoreError::Disposed { .. })));

    let again = open("proj:scoped", dir.path(), &registry);
    assert!(again.is_persistent());
}

#[test]
fn test_clone_as_rules() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let mut cfg = open("proj:base", dir.path(), &registry);
    let _ = cfg.set("a", 4).unwrap();
    let _other = open("proj:taken", dir.path(), &registry);

    assert!(matches!(
        cfg.clone_as("proj.base", true, false),
        Err(StoreError::NameCollision { .. })
    ));
    assert!(matches!(
        cfg.clone_as("proj:taken", false, false),
        Err(StoreError::NameCollision { .. })
    ));

    let mut twin = cfg.clone_as("proj:twin", true, false).unwrap();
    assert_eq!(twin.name().unwrap().as_str(), "proj:twin");
    assert_eq!(twin.get("a"), Some(&Value::Int(4)));
    let twin_path = twin.path().unwrap();
    assert!(!twin_path.exists());

    let _ = twin.set("a", 6).unwrap();
    assert!(twin_path.exists());
    assert_eq!(cfg.get("a"), Some(&Value::Int(4)));
}

#[test]
fn test_clone_as_copies_callbacks_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let mut cfg = open("proj:cb", dir.path(), &registry);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    cfg.register_callback(
        move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        },
        None,
    )
    .unwrap();

    let mut with = cfg.clone_as("proj:cb2", false, true).unwrap();
    let mut without = cfg.clone_as("proj:cb3", false, false).unwrap();
    let _ = with.set("a", 2).unwrap();
    let _ = without.set("a", 2).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_copy_is_detached() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = open("proj:orig", dir.path(), &registry());
    let _ = cfg.set("b", "y").unwrap();

    let mut copy = cfg.copy();
    assert!(copy.name().is_none());
    assert!(!copy.is_persistent());
    assert_eq!(copy.get("b"), Some(&Value::from("y")));

    let _ = copy.set("b", "x").unwrap();
    assert_eq!(cfg.get("b"), Some(&Value::from("y")));
    assert!(matches!(copy.save(), Err(StoreError::Unnamed { .. })));
}

#[test]
fn test_callbacks_match_from_the_start_of_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = PersistentConfig::with_registry(
        "proj:ui",
        Schema::new()
            .key(KeyDef::new("font-size", 10))
            .key(KeyDef::new("font-family", "mono"))
            .key(KeyDef::new("max-font-size", 20)),
        options(dir.path()).persistent(false),
        registry(),
    )
    .unwrap();

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    cfg.register_callback(
        move |config, key, value| {
            assert_eq!(config.get(key), Some(value));
            sink.lock().unwrap().push(key.to_owned());
        },
        Some("font"),
    )
    .unwrap();

    let _ = cfg.set("font-size", 12).unwrap();
    let _ = cfg.set("max-font-size", 30).unwrap();
    let _ = cfg.set("font-family", "serif").unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), ["font-size", "font-family"]);
}

#[test]
fn test_invalid_callback_pattern() {
    let mut cfg = PersistentConfig::unnamed(schema()).unwrap();
    let err = cfg.register_callback(|_, _, _| {}, Some("(")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidPattern { ref pattern, .. } if pattern == "("));
}

#[test]
fn test_update_is_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = open("proj:batch", dir.path(), &registry());

    let bad: ValueMap = [("a".to_owned(), Value::Int(3)), ("b".to_owned(), Value::from("z"))]
        .into_iter()
        .collect();
    assert!(cfg.update(bad).is_err());
    assert_eq!(cfg.get("a"), Some(&Value::Int(1)));
    assert!(!cfg.path().unwrap().exists());

    let good: ValueMap = [
        ("a".to_owned(), Value::Int(3)),
        ("b".to_owned(), Value::from("x")),
    ]
    .into_iter()
    .collect();
    assert_eq!(cfg.update(good).unwrap(), ["a"]);
    let text = std::fs::read_to_string(cfg.path().unwrap()).unwrap();
    assert!(text.contains("a: 3\n"));
}

#[test]
fn test_vetoed_update_leaves_memory_and_disk_in_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = open("proj:veto", dir.path(), &registry());
    cfg.set_pre_commit(|_, key, _, _| if key == "b" { Err("frozen".into()) } else { Ok(None) });

    let batch: ValueMap = [("a".to_owned(), Value::Int(3)), ("b".to_owned(), Value::from("y"))]
        .into_iter()
        .collect();
    let err = cfg.update(batch).unwrap_err();
    assert!(matches!(err, StoreError::Mapping(MappingError::Vetoed { ref key, .. }) if key == "b"));
    assert_eq!(cfg.get("a"), Some(&Value::Int(1)));
    assert!(!cfg.path().unwrap().exists());
}

#[test]
fn test_non_finite_float_is_not_silently_lost_in_json() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = PersistentConfig::with_registry(
        "proj:gain",
        Schema::new().key(KeyDef::new("gain", 0.5)),
        options(dir.path()).format(DocumentFormat::Json),
        registry(),
    )
    .unwrap();
    let _ = cfg.set("gain", 0.75).unwrap();

    let err = cfg.set("gain", f64::INFINITY).unwrap_err();
    assert!(matches!(err, StoreError::SerializeError { ref key, .. } if key == "gain"));
    let text = std::fs::read_to_string(cfg.path().unwrap()).unwrap();
    assert!(text.contains("0.75"), "{text}");
    assert!(!text.contains("null"), "{text}");
}

#[test]
fn test_non_finite_float_round_trips_in_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let schema = || Schema::new().key(KeyDef::new("gain", 0.5));
    {
        let mut cfg =
            PersistentConfig::with_registry("proj:inf", schema(), options(dir.path()), Arc::clone(&registry))
                .unwrap();
        let _ = cfg.set("gain", f64::INFINITY).unwrap();
    }
    let cfg = PersistentConfig::with_registry("proj:inf", schema(), options(dir.path()), registry).unwrap();
    assert_eq!(cfg.get("gain"), Some(&Value::Float(f64::INFINITY)));
}

#[test]
fn test_update_without_changes_does_not_save() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = open("proj:same", dir.path(), &registry());
    let same: ValueMap = [("a".to_owned(), Value::Int(1))].into_iter().collect();
    assert!(cfg.update(same).unwrap().is_empty());
    assert!(!cfg.path().unwrap().exists());
}

#[test]
fn test_reset_restores_defaults_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = open("proj:reset", dir.path(), &registry());
    let _ = cfg.set("a", 9).unwrap();
    let _ = cfg.set("b", "y").unwrap();

    assert!(cfg.reset_key("a").unwrap().is_changed());
    assert_eq!(cfg.diff().keys().collect::<Vec<_>>(), ["b"]);

    cfg.reset().unwrap();
    assert!(cfg.diff().is_empty());
    let text = std::fs::read_to_string(cfg.path().unwrap()).unwrap();
    assert!(text.contains("b: x\n"));
}

#[test]
fn test_state_machine() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();

    let blank =
        PersistentConfig::with_registry("", Schema::new(), ConfigOptions::in_memory(), Arc::clone(&registry))
            .unwrap();
    assert_eq!(blank.state(), ConfigState::Unnamed);

    let mut cfg =
        PersistentConfig::with_registry("proj:grow", Schema::new(), options(dir.path()), Arc::clone(&registry))
            .unwrap();
    assert_eq!(cfg.state(), ConfigState::Named);

    cfg.define_key(KeyDef::new("a", 1)).unwrap();
    assert_eq!(cfg.state(), ConfigState::SchemaOpen);
    assert_eq!(cfg.get("a"), Some(&Value::Int(1)));

    let _ = cfg.load();
    assert_eq!(cfg.state(), ConfigState::Active);
    assert!(matches!(
        cfg.define_key(KeyDef::new("b", 2)),
        Err(StoreError::Mapping(MappingError::SchemaClosed { .. }))
    ));

    cfg.dispose();
    assert_eq!(cfg.state(), ConfigState::Disposed);
}

#[test]
fn test_incremental_schema_then_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("late.yaml"), "a: 3\nb: y\n").unwrap();

    let mut cfg =
        PersistentConfig::with_registry("late", Schema::new(), options(dir.path()), registry()).unwrap();
    cfg.define_key(KeyDef::new("a", 1).range(0, 10)).unwrap();
    cfg.define_key(KeyDef::new("b", "x").choices(["x", "y"])).unwrap();

    let report = cfg.load();
    assert!(report.reconciliation.from_document);
    assert!(!report.rewritten);
    assert_eq!(cfg.get("a"), Some(&Value::Int(3)));
    assert_eq!(cfg.get("b"), Some(&Value::from("y")));
}

#[test]
fn test_empty_schema_is_not_loaded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.yaml"), "a: 3\n").unwrap();
    let mut cfg =
        PersistentConfig::with_registry("empty", Schema::new(), options(dir.path()), registry()).unwrap();
    let report = cfg.load();
    assert!(!report.reconciliation.from_document);
    assert_eq!(cfg.state(), ConfigState::Named);
}

#[test]
fn test_unnamed_config_cannot_persist() {
    let mut cfg = PersistentConfig::unnamed(schema()).unwrap();
    assert_eq!(cfg.state(), ConfigState::Active);
    assert!(!cfg.is_persistent());
    assert!(matches!(cfg.save(), Err(StoreError::Unnamed { .. })));
    assert!(matches!(cfg.set_persistent(true), Err(StoreError::Unnamed { .. })));
    assert!(cfg.set("a", 2).unwrap().is_changed());
}

#[test]
fn test_set_persistent_toggles_saving() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let mut cfg = PersistentConfig::with_registry(
        "proj:toggle",
        schema(),
        options(dir.path()).persistent(false),
        Arc::clone(&registry),
    )
    .unwrap();
    let _ = cfg.set("a", 2).unwrap();
    assert!(!cfg.path().unwrap().exists());

    cfg.set_persistent(true).unwrap();
    let _ = cfg.set("a", 3).unwrap();
    assert!(cfg.path().unwrap().exists());
    assert!(registry.get("proj:toggle").unwrap().unwrap().persistent);
}

#[test]
fn test_save_to_derives_format_from_extension() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PersistentConfig::unnamed(schema()).unwrap();

    let json = dir.path().join("nested").join("out.json");
    cfg.save_to(&json, None).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(parsed["a"], serde_json::json!(1));

    let err = cfg.save_to(&dir.path().join("out.toml"), None).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedFormat { .. }));
}

#[test]
fn test_oversized_document_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.yaml");
    let padding = "#".repeat(2_000_000);
    std::fs::write(&path, format!("{padding}\na: 5\n")).unwrap();

    let mut cfg = PersistentConfig::with_registry(
        "huge",
        schema(),
        options(dir.path()).load(false),
        registry(),
    )
    .unwrap();
    let report = cfg.load();
    assert!(report.document_error.unwrap().contains("byte limit"));
    assert_eq!(cfg.get("a"), Some(&Value::Int(1)));
}

#[test]
fn test_display_renders_table() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = open("proj:shown", dir.path(), &registry());
    let table = cfg.to_string();
    assert!(table.starts_with("Config: proj:shown"));
    assert!(table.contains("between 0 - 10"));
}
