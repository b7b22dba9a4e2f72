//! Key-value store for long-lived key material
//!
//! A small TOML-backed store keyed by logical name. Writes go through a
//! temp-file-and-rename so an interrupted process never leaves a truncated
//! store behind, and the file is restricted to the owner since it holds the
//! private key.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Store name for the tunnel private key
pub const PRIVATE_KEY: &str = "private-key";
/// Store name for the derived public key
pub const PUBLIC_KEY: &str = "public-key";

const STORE_MODE: u32 = 0o600;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct KeyStore {
    #[serde(skip)]
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl KeyStore {
    /// Open the store at `path`, treating a missing file as an empty store
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        store.path = path.to_path_buf();
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Set a value and persist the store
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.entries.insert(name.to_string(), value.into());
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&tmp)?.permissions();
            perms.set_mode(STORE_MODE);
            fs::set_permissions(&tmp, perms)?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
