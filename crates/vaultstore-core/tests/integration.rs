//! Integration tests: volumes, vaults, and the overlay protocol end to end.
//!
//! These tests exercise the full stack — path parsing, the concurrent
//! node tree, overlay views with observer propagation, and the volume
//! serializer — the way an embedding application would.

use std::sync::Arc;

use tempfile::TempDir;

use vaultstore_core::value::ValueKind;
use vaultstore_core::{PriorityClass, Vault, Volume};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn medium_volume(name: &str) -> Volume {
    Volume::new(name, PriorityClass::Medium).unwrap()
}

// ---------------------------------------------------------------------------
// Volume basics
// ---------------------------------------------------------------------------

#[test]
fn test_create_open_idempotence() {
    let vol = medium_volume("root");

    let n1 = vol.root().create_subnode("1").unwrap();
    let n1_again = vol.root().create_subnode("1").unwrap();
    assert!(Arc::ptr_eq(&n1, &n1_again));
    assert!(Arc::ptr_eq(&n1, &vol.root().open_subnode("1").unwrap()));

    let n123 = n1.create_subnode("2.3").unwrap();
    assert!(Arc::ptr_eq(&n123, &vol.root().open_subnode("1.2.3").unwrap()));
}

#[test]
fn test_subtree_deletion() {
    let vol = medium_volume("root");
    vol.root().create_subnode("1.2").unwrap();
    vol.root().create_subnode("1.3").unwrap();

    assert!(vol.root().delete_subnode_tree("1"));
    assert!(vol.root().open_subnode("1").is_none());
    assert!(vol.root().open_subnode("1.2").is_none());
    assert!(vol.root().open_subnode("1.3").is_none());
}

#[test]
fn test_typed_value_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("v.bin");

    let vol = medium_volume("root");
    assert!(vol.root().set_value("u32", 1u32));
    assert!(vol.root().set_value("str", "lorem ipsum"));
    assert!(vol.root().set_value("bin", vec![0xdu8, 0xe, 0xa, 0xd]));
    vol.save(&file).unwrap();

    let vol2 = Volume::load(&file).unwrap();
    assert_eq!(vol2.root().get_value_kind("u32"), Some(ValueKind::U32));
    assert_eq!(vol2.root().get_value::<u32>("u32"), Some(1));
    assert_eq!(
        vol2.root().get_value::<String>("str"),
        Some("lorem ipsum".to_string())
    );
    assert_eq!(
        vol2.root().get_value::<Vec<u8>>("bin"),
        Some(vec![0xd, 0xe, 0xa, 0xd])
    );
}

#[test]
fn test_loaded_volume_behaves_like_original() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("v.bin");

    let vol = medium_volume("root");
    vol.root().create_subnode("a.b").unwrap().set_value("k", 5u64);
    vol.save(&file).unwrap();

    let vol2 = Volume::load(&file).unwrap();
    // the reloaded tree accepts further mutation under the same limits
    let b = vol2.root().open_subnode("a.b").unwrap();
    assert_eq!(b.get_value::<u64>("k"), Some(5));
    assert!(b.create_subnode("c").is_some());
    assert!(vol2.root().open_subnode("a.b.c").is_some());

    // and overlays like any other volume
    let vault = Vault::new();
    vault.root().load_subnode_tree(vol2.root()).unwrap();
    assert!(vault.root().open_subnode("root.a.b.c").is_some());
}

// ---------------------------------------------------------------------------
// Vault overlays
// ---------------------------------------------------------------------------

#[test]
fn test_priority_overlay() {
    let v1 = Volume::new("vol", PriorityClass::Low).unwrap();
    v1.root().set_value("k", "v1");
    let v2 = Volume::new("vol", PriorityClass::Medium).unwrap();
    v2.root().set_value("k", 0u32);

    let vault = Vault::new();
    vault.root().load_subnode_tree(v1.root()).unwrap();
    vault.root().load_subnode_tree(v2.root()).unwrap();

    let sub = vault.root().open_subnode("vol").unwrap();
    assert_eq!(sub.get_value_kind("k"), Some(ValueKind::U32));
    assert_eq!(sub.get_value::<u32>("k"), Some(0));
}

#[test]
fn test_external_deletion_propagates() {
    let vol = Volume::new("vol", PriorityClass::Medium).unwrap();
    vol.root().create_subnode("1").unwrap().set_value("k", "v");

    let vault = Vault::new();
    vault.root().load_subnode_tree(vol.root()).unwrap();
    assert!(vault.root().open_subnode("vol.1").is_some());

    assert!(vol.root().delete_subnode_tree("1"));
    assert!(vault.root().open_subnode("vol.1").is_none());
}

#[test]
fn test_delete_recreate_recovers_views() {
    let vol = Volume::new("vol", PriorityClass::Medium).unwrap();
    vol.root().create_subnode("1").unwrap().set_value("k", "v");

    let vault = Vault::new();
    vault.root().load_subnode_tree(vol.root()).unwrap();

    vol.root().delete_subnode_tree("1");
    vol.root().create_subnode("1").unwrap().set_value("k", 1u64);

    let view = vault.root().open_subnode("vol.1").unwrap();
    assert_eq!(view.get_value_kind("k"), Some(ValueKind::U64));
    assert_eq!(view.get_value::<u64>("k"), Some(1));
}

#[test]
fn test_external_creation_propagates() {
    let vol = Volume::new("vol", PriorityClass::Medium).unwrap();
    let vault = Vault::new();
    vault.root().load_subnode_tree(vol.root()).unwrap();

    let fresh = vol.root().create_subnode("fresh").unwrap();
    fresh.set_value("k", 9u32);

    let view = vault.root().open_subnode("vol.fresh").unwrap();
    assert_eq!(view.get_value::<u32>("k"), Some(9));
}

#[test]
fn test_view_write_read_cycle() {
    let vol = Volume::new("cfg", PriorityClass::Medium).unwrap();
    let vault = Vault::new();
    vault.root().load_subnode_tree(vol.root()).unwrap();

    let view = vault.root().open_subnode("cfg").unwrap();
    let sub = view.create_subnode("net.http").unwrap();
    assert!(sub.set_value("port", 8080u32));

    // both levels and the write went through to the volume
    let node = vol.root().open_subnode("net.http").unwrap();
    assert_eq!(node.get_value::<u32>("port"), Some(8080));

    // and a second vault over the same volume sees it
    let other_vault = Vault::new();
    other_vault.root().load_subnode_tree(vol.root()).unwrap();
    assert_eq!(
        other_vault
            .root()
            .open_subnode("cfg.net.http")
            .unwrap()
            .get_value::<u32>("port"),
        Some(8080)
    );
}

#[test]
fn test_unload_then_reload() {
    let vol = Volume::new("vol", PriorityClass::Medium).unwrap();
    vol.root().create_subnode("1").unwrap();

    let vault = Vault::new();
    vault.root().load_subnode_tree(vol.root()).unwrap();
    assert!(vault.root().unload_subnode_tree("vol"));
    assert!(vault.root().open_subnode("vol").is_none());

    // reload builds a fresh live view
    vault.root().load_subnode_tree(vol.root()).unwrap();
    assert!(vault.root().open_subnode("vol.1").is_some());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_concurrent_volume_sanity() {
    let vol = Arc::new(medium_volume("root"));
    let mut handles = vec![];

    for t in 0..8usize {
        let vol = Arc::clone(&vol);
        handles.push(std::thread::spawn(move || {
            for i in 0..300usize {
                let name = format!("n{}", i % 10);
                match (t + i) % 6 {
                    0 => {
                        let _ = vol.root().create_subnode(name.as_str());
                    }
                    1 => {
                        let _ = vol.root().open_subnode(name.as_str());
                    }
                    2 => {
                        vol.root().delete_subnode_tree(name.as_str());
                    }
                    3 => {
                        vol.root().set_value(&name, i as u64);
                    }
                    4 => {
                        let _ = vol.root().get_value::<u64>(&name);
                    }
                    _ => {
                        let _ = vol.root().get_value_kind(&name);
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // capacity invariants hold after the storm
    let mut subnodes = 0;
    vol.root().for_each_subnode(|n| {
        assert!(!n.is_deleted());
        subnodes += 1;
    });
    assert!(subnodes <= 10);

    let mut values = 0;
    vol.root().for_each_value(|_| values += 1);
    assert!(values <= 10);
}

#[test]
fn test_concurrent_overlay_sanity() {
    let vol = Arc::new(Volume::new("vol", PriorityClass::Medium).unwrap());
    let vault = Arc::new(Vault::new());
    vault.root().load_subnode_tree(vol.root()).unwrap();

    let mut handles = vec![];
    for t in 0..4usize {
        let vol = Arc::clone(&vol);
        let vault = Arc::clone(&vault);
        handles.push(std::thread::spawn(move || {
            for i in 0..200usize {
                let name = format!("n{}", i % 8);
                match (t + i) % 4 {
                    0 => {
                        let _ = vol.root().create_subnode(name.as_str());
                    }
                    1 => {
                        vol.root().delete_subnode_tree(name.as_str());
                    }
                    2 => {
                        let _ = vault.root().open_subnode(format!("vol.{}", name).as_str());
                    }
                    _ => {
                        if let Some(view) = vault.root().open_subnode("vol") {
                            view.set_value(&name, i as u32);
                        }
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // the "vol" view itself survives (its observed root is never deleted)
    let view = vault.root().open_subnode("vol").unwrap();
    assert!(!view.is_expired());

    // capacity invariants hold after the storm
    let mut subviews = 0;
    view.for_each_subnode(|_| subviews += 1);
    assert!(subviews <= 10);

    // reads through the overlay stay well-formed: each surviving path
    // resolves to a value of the type the writers produced, or to nothing
    for i in 0..8 {
        let name = format!("n{}", i);
        if let Some(subview) = view.open_subnode(name.as_str()) {
            assert_eq!(subview.path(), format!("root.vol.{}", name));
            assert!(!subview.name().is_empty());
        }
    }
}

#[test]
fn test_concurrent_load_and_mutate() {
    let vol = Arc::new(Volume::new("vol", PriorityClass::Medium).unwrap());
    vol.root().create_subnode("a.b").unwrap();

    let mut handles = vec![];
    for _ in 0..4 {
        let vol = Arc::clone(&vol);
        handles.push(std::thread::spawn(move || {
            let vault = Vault::new();
            for _ in 0..50 {
                let _ = vault.root().load_subnode_tree(vol.root());
                vault.root().unload_subnode_tree("vol");
            }
        }));
    }
    {
        let vol = Arc::clone(&vol);
        handles.push(std::thread::spawn(move || {
            for i in 0..100 {
                let _ = vol.root().create_subnode(format!("x{}", i % 5).as_str());
                vol.root().delete_subnode_tree(format!("x{}", i % 5).as_str());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // the volume's own tree stays intact throughout
    assert!(vol.root().open_subnode("a.b").is_some());
}
