//! Key generation, derivation, and legacy key migration

use crate::cmd;
use crate::model::{ConfigSnapshot, HostPaths};
use crate::store::{KeyStore, PRIVATE_KEY, PUBLIC_KEY};
use crate::{Error, Result};
use log::{debug, info};
use std::fs;
use std::path::Path;

/// Key generation and derivation capability.
///
/// The production implementation shells out to the `wg` binary; tests
/// substitute a deterministic fake.
pub trait KeyTool {
    fn generate_private_key(&self) -> Result<String>;
    fn derive_public_key(&self, private_key: &str) -> Result<String>;
}

/// Key tool backed by the external `wg` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct WgKeyTool;

impl KeyTool for WgKeyTool {
    fn generate_private_key(&self) -> Result<String> {
        let output = cmd::run("wg", &["genkey"])?;
        if !output.success() {
            return Err(cmd::failure("wg genkey", &output));
        }
        let key = output.stdout.trim().to_string();
        if key.is_empty() {
            return Err(Error::key_tool("wg genkey returned an empty key"));
        }
        Ok(key)
    }

    fn derive_public_key(&self, private_key: &str) -> Result<String> {
        let output = cmd::run_with_stdin("wg", &["pubkey"], private_key)?;
        if !output.success() {
            return Err(cmd::failure("wg pubkey", &output));
        }
        let key = output.stdout.trim().to_string();
        if key.is_empty() {
            return Err(Error::key_tool("wg pubkey returned an empty key"));
        }
        Ok(key)
    }
}

fn read_trimmed(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(content.trim_end().to_string())
}

/// Move keys out of the legacy flat files into the key-value store.
///
/// Each legacy file is handled independently: read trimmed, stored under its
/// stable name, then deleted. Absent files are a no-op, so a repeated run
/// after a successful migration does nothing.
pub fn migrate_keys(store: &mut KeyStore, paths: &HostPaths) -> Result<()> {
    debug!("checking for legacy key files to migrate");
    if paths.legacy_public_key.is_file() {
        let contents = read_trimmed(&paths.legacy_public_key)?;
        store.set(PUBLIC_KEY, contents)?;
        fs::remove_file(&paths.legacy_public_key)?;
        info!(
            "migrated legacy public key from {}",
            paths.legacy_public_key.display()
        );
    }
    if paths.legacy_private_key.is_file() {
        let contents = read_trimmed(&paths.legacy_private_key)?;
        store.set(PRIVATE_KEY, contents)?;
        fs::remove_file(&paths.legacy_private_key)?;
        info!(
            "migrated legacy private key from {}",
            paths.legacy_private_key.display()
        );
    }
    Ok(())
}

/// Ensure the store holds a private key and its matching public key.
///
/// Resolution order for the private key: operator-supplied value (stored
/// only when it differs), then an existing stored key, then a freshly
/// generated one. The public key is re-derived whenever the private key was
/// written this pass, and otherwise only when missing, so an unchanged
/// private key never causes key churn.
pub fn configure_keys(
    store: &mut KeyStore,
    paths: &HostPaths,
    tool: &dyn KeyTool,
    snapshot: &ConfigSnapshot,
) -> Result<()> {
    migrate_keys(store, paths)?;

    let mut wrote_private = false;
    if let Some(supplied) = snapshot.private_key.as_deref() {
        if store.get(PRIVATE_KEY) != Some(supplied) {
            info!("storing operator-supplied private key");
            store.set(PRIVATE_KEY, supplied)?;
            wrote_private = true;
        }
    } else if store.get(PRIVATE_KEY).is_some() {
        debug!("private key already configured");
    } else {
        info!("generating private key");
        let key = tool.generate_private_key()?;
        store.set(PRIVATE_KEY, key)?;
        wrote_private = true;
    }

    if wrote_private || store.get(PUBLIC_KEY).is_none() {
        let private = store
            .get(PRIVATE_KEY)
            .map(str::to_owned)
            .ok_or_else(|| Error::store("private key missing after configuration"))?;
        let public = tool.derive_public_key(&private)?;
        store.set(PUBLIC_KEY, public)?;
        debug!("stored derived public key");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeKeyTool {
        generated: RefCell<u32>,
        derived: RefCell<Vec<String>>,
    }

    impl KeyTool for FakeKeyTool {
        fn generate_private_key(&self) -> Result<String> {
            *self.generated.borrow_mut() += 1;
            Ok(format!("generated-private-{}", self.generated.borrow()))
        }

        fn derive_public_key(&self, private_key: &str) -> Result<String> {
            self.derived.borrow_mut().push(private_key.to_string());
            Ok(format!("public-for-{}", private_key))
        }
    }

    struct FailingKeyTool;

    impl KeyTool for FailingKeyTool {
        fn generate_private_key(&self) -> Result<String> {
            Err(Error::key_tool("wg binary missing"))
        }

        fn derive_public_key(&self, _private_key: &str) -> Result<String> {
            Err(Error::key_tool("wg binary missing"))
        }
    }

    fn fixture() -> (tempfile::TempDir, HostPaths) {
        let dir = tempdir().unwrap();
        let paths = HostPaths::rooted(dir.path());
        fs::create_dir_all(&paths.key_dir).unwrap();
        (dir, paths)
    }

    fn snapshot(private_key: Option<&str>) -> ConfigSnapshot {
        ConfigSnapshot {
            private_key: private_key.map(str::to_string),
            listen_port: 51820,
            address: "10.10.10.1/24".to_string(),
            forward_ip: false,
            forward_dev: String::new(),
            peers: String::new(),
        }
    }

    #[test]
    fn test_migrate_moves_both_files() {
        let (_dir, paths) = fixture();
        fs::write(&paths.legacy_private_key, "legacy-private\n").unwrap();
        fs::write(&paths.legacy_public_key, "legacy-public\n").unwrap();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        migrate_keys(&mut store, &paths).unwrap();

        assert_eq!(store.get(PRIVATE_KEY), Some("legacy-private"));
        assert_eq!(store.get(PUBLIC_KEY), Some("legacy-public"));
        assert!(!paths.legacy_private_key.exists());
        assert!(!paths.legacy_public_key.exists());
    }

    #[test]
    fn test_migrate_single_file() {
        let (_dir, paths) = fixture();
        fs::write(&paths.legacy_private_key, "legacy-private\n").unwrap();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        migrate_keys(&mut store, &paths).unwrap();

        assert_eq!(store.get(PRIVATE_KEY), Some("legacy-private"));
        assert!(store.get(PUBLIC_KEY).is_none());
    }

    #[test]
    fn test_migrate_twice_is_noop() {
        let (_dir, paths) = fixture();
        fs::write(&paths.legacy_private_key, "legacy-private\n").unwrap();
        fs::write(&paths.legacy_public_key, "legacy-public\n").unwrap();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        migrate_keys(&mut store, &paths).unwrap();
        migrate_keys(&mut store, &paths).unwrap();

        assert_eq!(store.get(PRIVATE_KEY), Some("legacy-private"));
        assert_eq!(store.get(PUBLIC_KEY), Some("legacy-public"));
    }

    #[test]
    fn test_configure_generates_when_empty() {
        let (_dir, paths) = fixture();
        let tool = FakeKeyTool::default();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        configure_keys(&mut store, &paths, &tool, &snapshot(None)).unwrap();

        assert_eq!(store.get(PRIVATE_KEY), Some("generated-private-1"));
        assert_eq!(
            store.get(PUBLIC_KEY),
            Some("public-for-generated-private-1")
        );
    }

    #[test]
    fn test_configure_is_stable_across_runs() {
        let (_dir, paths) = fixture();
        let tool = FakeKeyTool::default();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        configure_keys(&mut store, &paths, &tool, &snapshot(None)).unwrap();
        configure_keys(&mut store, &paths, &tool, &snapshot(None)).unwrap();
        configure_keys(&mut store, &paths, &tool, &snapshot(None)).unwrap();

        assert_eq!(*tool.generated.borrow(), 1);
        assert_eq!(tool.derived.borrow().len(), 1);
        assert_eq!(store.get(PRIVATE_KEY), Some("generated-private-1"));
    }

    #[test]
    fn test_operator_key_stored_and_public_rederived() {
        let (_dir, paths) = fixture();
        let tool = FakeKeyTool::default();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        configure_keys(&mut store, &paths, &tool, &snapshot(None)).unwrap();

        // Operator rotates the key: the public key must follow.
        configure_keys(&mut store, &paths, &tool, &snapshot(Some("rotated"))).unwrap();
        assert_eq!(store.get(PRIVATE_KEY), Some("rotated"));
        assert_eq!(store.get(PUBLIC_KEY), Some("public-for-rotated"));

        // Same supplied key again: no further derivation.
        configure_keys(&mut store, &paths, &tool, &snapshot(Some("rotated"))).unwrap();
        assert_eq!(tool.derived.borrow().len(), 2);
    }

    #[test]
    fn test_existing_key_survives_generation_failure_path() {
        let (_dir, paths) = fixture();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        store.set(PRIVATE_KEY, "existing").unwrap();
        store.set(PUBLIC_KEY, "existing-public").unwrap();

        // Tool failure is irrelevant when nothing needs generating.
        configure_keys(&mut store, &paths, &FailingKeyTool, &snapshot(None)).unwrap();
        assert_eq!(store.get(PRIVATE_KEY), Some("existing"));
        assert_eq!(store.get(PUBLIC_KEY), Some("existing-public"));
    }

    #[test]
    fn test_generation_failure_is_fatal() {
        let (_dir, paths) = fixture();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        let result = configure_keys(&mut store, &paths, &FailingKeyTool, &snapshot(None));
        assert!(result.is_err());
        assert!(store.get(PRIVATE_KEY).is_none());
    }

    #[test]
    fn test_configure_runs_migration_first() {
        let (_dir, paths) = fixture();
        fs::write(&paths.legacy_private_key, "legacy-private\n").unwrap();
        let tool = FakeKeyTool::default();

        let mut store = KeyStore::open(&paths.key_store).unwrap();
        configure_keys(&mut store, &paths, &tool, &snapshot(None)).unwrap();

        // The migrated key is reused; nothing is generated.
        assert_eq!(*tool.generated.borrow(), 0);
        assert_eq!(store.get(PRIVATE_KEY), Some("legacy-private"));
        assert_eq!(store.get(PUBLIC_KEY), Some("public-for-legacy-private"));
    }
}
