//! End-to-end tests of the directory-backed store.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use stateshelf::backend::{Backend, FsBackend};
use stateshelf::config::{StateSetConfig, StoreConfig};
use stateshelf::core::{Flags, StateError};
use stateshelf::lock::LockMode;
use stateshelf::persist::PersistedState;
use stateshelf::{state_set, PersistedStateBuilder};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: PersistedState<FsBackend>,
    foo: Flags,
    bar: Flags,
    baz: Flags,
}

impl Fixture {
    fn root(&self) -> &Path {
        self.store.backend().root()
    }

    fn lock(&self, key: &str) {
        let dir = self.root().join(".lock");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(key), b"").unwrap();
    }

    fn unlock(&self, key: &str) {
        fs::remove_file(self.root().join(".lock").join(key)).unwrap();
    }
}

fn fixture(mode: LockMode) -> Fixture {
    let dir = TempDir::new().unwrap();
    let states = state_set! {
        states: [foo, bar, baz];
        aliases: { xyzzy = [foo, bar] };
    }
    .unwrap();
    let foo = states.from_name("foo").unwrap();
    let bar = states.from_name("bar").unwrap();
    let baz = states.from_name("baz").unwrap();

    let store = PersistedStateBuilder::new()
        .states(states)
        .root(dir.path().join("store"))
        .lock_mode(mode)
        .build()
        .unwrap();
    Fixture {
        _dir: dir,
        store,
        foo,
        bar,
        baz,
    }
}

#[test]
fn alias_scenario_on_disk() {
    let Fixture {
        _dir,
        mut store,
        foo,
        bar,
        ..
    } = fixture(LockMode::Advisory);
    let xyzzy = foo | bar;
    let root = store.backend().root().to_path_buf();

    store.put("abcd", Some(foo), b"payload").unwrap();
    assert_eq!(store.state("abcd").unwrap(), foo);
    assert!(root.join("FOO").join("abcd").is_file());

    store.set("abcd", bar).unwrap();
    assert_eq!(store.state("abcd").unwrap(), xyzzy);
    assert!(store.list(xyzzy).contains("abcd"));
    assert!(root.join("XYZZY").join("abcd").is_file());
    assert!(!root.join("FOO").join("abcd").exists());

    store.unset("abcd", foo, false).unwrap();
    assert_eq!(store.state("abcd").unwrap(), bar);
    assert!(!store.list(xyzzy).contains("abcd"));
    assert_eq!(fs::read(root.join("BAR").join("abcd")).unwrap(), b"payload");
}

#[test]
fn locked_key_blocks_every_mutation() {
    let mut fx = fixture(LockMode::Advisory);
    let (foo, bar, baz) = (fx.foo, fx.bar, fx.baz);

    fx.lock("xxxx");
    assert!(matches!(
        fx.store.put("xxxx", Some(foo), b""),
        Err(StateError::LockedKey(_))
    ));
    fx.unlock("xxxx");
    fx.store.put("xxxx", Some(foo), b"").unwrap();

    fx.lock("xxxx");
    assert!(matches!(fx.store.set("xxxx", bar), Err(StateError::LockedKey(_))));
    assert!(matches!(
        fx.store.unset("xxxx", foo, true),
        Err(StateError::LockedKey(_))
    ));
    assert!(matches!(
        fx.store.move_to("xxxx", baz),
        Err(StateError::LockedKey(_))
    ));
    assert!(matches!(
        fx.store.replace("xxxx", b"new"),
        Err(StateError::LockedKey(_))
    ));
    assert_eq!(fx.store.state("xxxx").unwrap(), foo);

    fx.unlock("xxxx");
    fx.store.set("xxxx", bar).unwrap();
    fx.store.unset("xxxx", foo, false).unwrap();
    fx.store.move_to("xxxx", baz).unwrap();
    fx.store.replace("xxxx", b"new").unwrap();
    assert_eq!(fx.store.get("xxxx").unwrap(), b"new");
}

#[test]
fn hold_mode_leaves_no_markers_behind() {
    let mut fx = fixture(LockMode::Hold);
    let foo = fx.foo;

    fx.store.put("abcd", Some(foo), b"").unwrap();
    fx.store.next("abcd").unwrap();
    assert!(!fx.root().join(".lock").join("abcd").exists());

    fx.lock("abcd");
    assert!(matches!(fx.store.next("abcd"), Err(StateError::LockedKey(_))));
    assert_eq!(fx.store.state("abcd").unwrap(), fx.bar);
}

#[test]
fn traversal_keys_never_reach_the_lock_dir() {
    for mode in [LockMode::Advisory, LockMode::Hold] {
        let mut fx = fixture(mode);
        let (foo, bar) = (fx.foo, fx.bar);
        fx.store.put("abcd", Some(foo), b"data").unwrap();
        fs::create_dir_all(fx.root().join(".lock")).unwrap();

        assert!(matches!(
            fx.store.set("../FOO/abcd", bar),
            Err(StateError::InvalidKey(_))
        ));
        assert!(matches!(
            fx.store.replace("../FOO/zzzz", b"x"),
            Err(StateError::InvalidKey(_))
        ));
        assert!(matches!(
            fx.store.replace("../NOPE/zzzz", b"x"),
            Err(StateError::InvalidKey(_))
        ));
        assert!(matches!(
            fx.store.move_to("../FOO/abcd", bar),
            Err(StateError::InvalidKey(_))
        ));

        assert!(!fx.root().join("FOO").join("zzzz").exists());
        assert!(!fx.root().join("NOPE").exists());
        assert_eq!(fx.store.backend().list("FOO").unwrap().len(), 1);
        assert_eq!(fx.store.state("abcd").unwrap(), foo);
        assert_eq!(fx.store.get("abcd").unwrap(), b"data");

        fx.store.set("abcd", bar).unwrap();
        assert_eq!(fx.store.state("abcd").unwrap(), foo | bar);
    }
}

#[test]
fn longest_valid_key_round_trips() {
    let mut fx = fixture(LockMode::Hold);
    let key = "k".repeat(stateshelf::backend::MAX_KEY_LEN);
    fx.store.put(&key, Some(fx.foo), b"long").unwrap();
    fx.store.replace(&key, b"longer").unwrap();
    fx.store.next(&key).unwrap();
    assert_eq!(fx.store.get(&key).unwrap(), b"longer");

    let too_long = "k".repeat(stateshelf::backend::MAX_KEY_LEN + 1);
    assert!(matches!(
        fx.store.put(&too_long, None, b""),
        Err(StateError::InvalidKey(_))
    ));
}

#[test]
fn sync_picks_up_external_changes() {
    let mut fx = fixture(LockMode::Advisory);
    let (foo, baz) = (fx.foo, fx.baz);
    fx.store.put("gone", Some(foo), b"").unwrap();

    fs::create_dir_all(fx.root().join("BAZ")).unwrap();
    fs::write(fx.root().join("BAZ").join("dropped"), b"hi").unwrap();
    fs::remove_file(fx.root().join("FOO").join("gone")).unwrap();

    let report = fx.store.sync(None).unwrap();
    assert_eq!(report.added, vec!["dropped"]);
    assert_eq!(report.removed, vec!["gone"]);
    assert_eq!(fx.store.state("dropped").unwrap(), baz);
    assert_eq!(fx.store.get("dropped").unwrap(), b"hi");
    assert!(fx.store.modified("dropped").unwrap().is_some());
}

#[test]
fn ls_and_path_reflect_layout() {
    let mut fx = fixture(LockMode::Advisory);
    let (foo, bar) = (fx.foo, fx.bar);
    fx.store.put("a", None, b"").unwrap();
    fx.store.put("b", Some(foo | bar), b"").unwrap();
    fx.lock("c");

    assert_eq!(fx.store.ls().unwrap(), vec!["NEW", "XYZZY"]);
    assert_eq!(
        fx.store.path(foo | bar, Some("b")).unwrap(),
        Some(fx.root().join("XYZZY").join("b"))
    );
    assert_eq!(
        fx.store.path(Flags::EMPTY, None).unwrap(),
        Some(fx.root().join("NEW"))
    );
}

#[test]
fn purge_removes_file() {
    let mut fx = fixture(LockMode::Advisory);
    fx.store.put("abcd", Some(fx.baz), b"").unwrap();
    fx.store.purge("abcd").unwrap();

    assert!(!fx.root().join("BAZ").join("abcd").exists());
    assert!(fx.store.state("abcd").unwrap_err().is_not_found());
}

#[test]
fn reopened_store_sees_previous_items() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(
        dir.path().join("store"),
        StateSetConfig::from_json_str(r#"{ "states": ["queued", "running", "done"] }"#).unwrap(),
    );

    {
        let mut store = config.open().unwrap();
        store.put("job", None, b"payload").unwrap();
        store.next("job").unwrap();
        store.next("job").unwrap();
    }

    let store = config.open().unwrap();
    assert_eq!(store.state_name("job").unwrap(), "RUNNING");
    assert_eq!(store.get("job").unwrap(), b"payload");
}

#[test]
fn config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let root = dir.path().join("data");
    fs::write(
        &path,
        format!(
            r#"{{
                "root": {root:?},
                "lock_mode": "hold",
                "states": {{
                    "states": ["foo", "bar"],
                    "aliases": [{{ "name": "both", "states": ["foo", "bar"] }}]
                }}
            }}"#,
            root = root.display().to_string()
        ),
    )
    .unwrap();

    let config = StoreConfig::load(&path).unwrap();
    let mut store = config.open().unwrap();
    let both = store.states().from_name("both").unwrap();
    store.put("abcd", Some(both), b"").unwrap();
    assert!(root.join("BOTH").join("abcd").is_file());

    assert!(matches!(
        StoreConfig::load(dir.path().join("missing.json")),
        Err(StateError::Storage { .. })
    ));
}

#[test]
fn observer_sees_every_transition() {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let mut store = PersistedStateBuilder::new()
        .states(state_set!(states: [foo, bar];).unwrap())
        .root(dir.path())
        .observer(move |event| {
            sink.lock()
                .unwrap()
                .push((event.from.clone(), event.to.clone()))
        })
        .build()
        .unwrap();

    store.put("abcd", None, b"").unwrap();
    store.next("abcd").unwrap();
    store.next("abcd").unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            (None, "NEW".to_string()),
            (Some("NEW".to_string()), "FOO".to_string()),
            (Some("FOO".to_string()), "BAR".to_string()),
        ]
    );
}
