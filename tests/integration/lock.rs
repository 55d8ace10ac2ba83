//! Single-instance guard across processes.

use appup_cli::core::AppupError;
use appup_cli::lock::{InstanceLock, read_owner};
use appup_cli::registry::ResourceRegistry;
use std::process::{Child, Command};
use tempfile::TempDir;

use crate::common::test_registry;

/// A live process that is not this test.
fn other_process() -> Child {
    Command::new("sleep").arg("30").spawn().unwrap()
}

#[test]
fn test_live_owner_blocks_second_instance() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("appup.lock");
    let mut owner = other_process();
    std::fs::write(&path, format!("{}\n", owner.id())).unwrap();

    let err = InstanceLock::acquire(&path, &ResourceRegistry::default()).unwrap_err();

    match err {
        AppupError::AlreadyRunning {
            pid,
            lock_path,
        } => {
            assert_eq!(pid, owner.id());
            assert_eq!(lock_path, path);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The other instance's token is untouched.
    assert_eq!(read_owner(&path), Some(owner.id()));

    owner.kill().unwrap();
    owner.wait().unwrap();
}

#[test]
fn test_lock_is_reclaimed_after_owner_exits() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("appup.lock");
    let mut owner = other_process();
    std::fs::write(&path, format!("{}\n", owner.id())).unwrap();

    owner.kill().unwrap();
    owner.wait().unwrap();

    let registry = test_registry(&temp);
    let lock = InstanceLock::acquire(&path, &registry).unwrap();
    assert_eq!(read_owner(&path), Some(std::process::id()));
    assert_eq!(lock.pid(), std::process::id());

    assert_eq!(registry.reconcile(0), 0);
    assert!(!path.exists());
}

#[test]
fn test_second_acquire_in_same_process_is_refused() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("appup.lock");
    let registry = test_registry(&temp);

    let _first = InstanceLock::acquire(&path, &registry).unwrap();
    let err = InstanceLock::acquire(&path, &registry).unwrap_err();

    assert!(matches!(err, AppupError::AlreadyRunning { pid, .. } if pid == std::process::id()));
    registry.reconcile(0);
}

#[test]
fn test_garbage_token_is_reclaimed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("appup.lock");
    std::fs::write(&path, "not a pid\n").unwrap();
    let registry = test_registry(&temp);

    InstanceLock::acquire(&path, &registry).unwrap();

    assert_eq!(read_owner(&path), Some(std::process::id()));
    registry.reconcile(1);
    assert!(!path.exists());
}
