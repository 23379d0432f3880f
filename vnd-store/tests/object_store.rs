//! ObjectStore behaviour against both backends.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use vnd_store::{
    DecodeError, KvBackend, KvObject, MemoryBackend, ObjectStore, Result, StoreError, assign,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Widget {
    id: String,
    size: u32,
    #[serde(skip)]
    index: u64,
    #[serde(skip)]
    exists: bool,
}

impl Widget {
    fn new(id: &str, size: u32) -> Self {
        Self {
            id: id.to_string(),
            size,
            ..Default::default()
        }
    }
}

impl KvObject for Widget {
    fn kind(&self) -> &'static str {
        "widget"
    }

    fn key(&self) -> Vec<String> {
        vec!["widget".to_string(), self.id.clone()]
    }

    fn key_prefix(&self) -> Vec<String> {
        vec!["widget".to_string()]
    }

    fn value(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn set_value(&mut self, value: &[u8]) -> std::result::Result<(), DecodeError> {
        let decoded: Widget = serde_json::from_slice(value)?;
        self.id = decoded.id;
        self.size = decoded.size;
        Ok(())
    }

    fn index(&self) -> u64 {
        self.index
    }

    fn set_index(&mut self, index: u64) {
        self.index = index;
        self.exists = true;
    }

    fn exists(&self) -> bool {
        self.exists
    }

    fn new_object(&self) -> Box<dyn KvObject> {
        Box::new(Widget::default())
    }

    fn copy_to(&self, other: &mut dyn KvObject) -> Result<()> {
        assign(self, other)
    }
}

fn stores() -> Vec<(ObjectStore, Option<TempDir>)> {
    let dir = TempDir::new().unwrap();
    let disk = ObjectStore::open(dir.path()).unwrap();
    vec![(ObjectStore::memory(), None), (disk, Some(dir))]
}

#[test]
fn put_marks_object_as_existing() {
    for (store, _dir) in stores() {
        let mut widget = Widget::new("w1", 3);
        assert!(!widget.exists());

        store.put_object_atomic(&mut widget).unwrap();
        assert!(widget.exists());
        assert!(widget.index() > 0);
    }
}

#[test]
fn list_returns_every_record_of_the_kind() {
    for (store, _dir) in stores() {
        store.put_object_atomic(&mut Widget::new("a", 1)).unwrap();
        store.put_object_atomic(&mut Widget::new("b", 2)).unwrap();

        let widgets = store.list_as(&Widget::default()).unwrap();
        assert_eq!(widgets.len(), 2);
        assert_eq!(widgets[0].id, "a");
        assert_eq!(widgets[1].size, 2);
        assert!(widgets.iter().all(|w| w.exists()));
    }
}

#[test]
fn list_of_empty_kind_is_not_found() {
    for (store, _dir) in stores() {
        let err = store.list(&Widget::default()).unwrap_err();
        assert!(err.is_not_found());

        // Populating and then emptying the kind looks the same as never populating it.
        let mut widget = Widget::new("gone", 1);
        store.put_object_atomic(&mut widget).unwrap();
        store.delete_object(&widget).unwrap();
        assert!(store.list(&Widget::default()).unwrap_err().is_not_found());
    }
}

#[test]
fn stale_version_stamp_is_a_conflict() {
    for (store, _dir) in stores() {
        let mut widget = Widget::new("w", 1);
        store.put_object_atomic(&mut widget).unwrap();

        let mut stale = widget.clone();
        widget.size = 2;
        store.put_object_atomic(&mut widget).unwrap();

        stale.size = 9;
        let err = store.put_object_atomic(&mut stale).unwrap_err();
        assert!(matches!(err, StoreError::KeyModified));

        let mut current = Widget::new("w", 0);
        store.get_object(&mut current).unwrap();
        assert_eq!(current.size, 2);
    }
}

#[test]
fn creating_an_existing_key_is_a_conflict() {
    for (store, _dir) in stores() {
        store.put_object_atomic(&mut Widget::new("w", 1)).unwrap();
        let err = store
            .put_object_atomic(&mut Widget::new("w", 5))
            .unwrap_err();
        assert!(err.is_conflict());
    }
}

#[test]
fn rebased_put_overwrites_after_conflict() {
    for (store, _dir) in stores() {
        let mut widget = Widget::new("w", 1);
        store.put_object_atomic(&mut widget).unwrap();
        let mut stale = widget.clone();
        store.put_object_atomic(&mut widget).unwrap();

        stale.size = 7;
        assert!(store.put_object_atomic(&mut stale).is_err());
        store.put_object_rebased(&mut stale).unwrap();

        let mut current = Widget::new("w", 0);
        store.get_object(&mut current).unwrap();
        assert_eq!(current.size, 7);
        assert_eq!(current.index(), stale.index());
    }
}

#[test]
fn scan_isolates_undecodable_records() {
    let backend = Arc::new(MemoryBackend::new());
    let store = ObjectStore::new(backend.clone());
    store.put_object_atomic(&mut Widget::new("good", 1)).unwrap();

    let bad_key = store.key_of(&["widget", "bad"]);
    backend.atomic_put(&bad_key, b"{not json", None).unwrap();

    let entries = store.scan(&Widget::default()).unwrap();
    assert_eq!(entries.len(), 2);
    let (ok, bad): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.object.is_ok());
    assert_eq!(ok.len(), 1);
    assert_eq!(bad[0].key, bad_key);
    assert!(matches!(
        bad[0].object,
        Err(StoreError::Decode {
            source: DecodeError::InvalidJson(_),
            ..
        })
    ));

    assert!(store.list(&Widget::default()).is_err());
}

#[test]
fn kind_with_only_empty_values_is_not_found() {
    let backend = Arc::new(MemoryBackend::new());
    let store = ObjectStore::new(backend.clone());
    backend
        .atomic_put(&store.key_of(&["widget", "blank"]), b"", None)
        .unwrap();

    assert!(store.scan(&Widget::default()).unwrap_err().is_not_found());
    assert!(store.list(&Widget::default()).unwrap_err().is_not_found());

    store.put_object_atomic(&mut Widget::new("real", 3)).unwrap();
    let entries = store.scan(&Widget::default()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, store.key_of(&["widget", "real"]));
}

#[test]
fn atomic_delete_respects_version_stamp() {
    for (store, _dir) in stores() {
        let mut widget = Widget::new("w", 1);
        store.put_object_atomic(&mut widget).unwrap();
        let stale = widget.clone();
        store.put_object_atomic(&mut widget).unwrap();

        assert!(store.delete_object_atomic(&stale).unwrap_err().is_conflict());
        store.delete_object_atomic(&widget).unwrap();
        assert!(
            store
                .get_object(&mut Widget::new("w", 0))
                .unwrap_err()
                .is_not_found()
        );
    }
}

#[test]
fn records_survive_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    {
        let store = ObjectStore::open(dir.path()).unwrap();
        store.put_object_atomic(&mut Widget::new("persisted", 4)).unwrap();
    }

    let store = ObjectStore::open(dir.path()).unwrap();
    let widgets = store.list_as(&Widget::default()).unwrap();
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].size, 4);
}

#[test]
fn custom_root_chain_is_used_for_keys() {
    let store = ObjectStore::with_root(
        Arc::new(MemoryBackend::new()),
        &["docker", "network", "v1.0"],
    );
    assert_eq!(
        store.key_of(&Widget::new("x", 0).key()),
        "docker/network/v1.0/widget/x/"
    );
}
