//! Feature flag persistence
//!
//! Two named values live in the host configuration store:
//! - `bot_identifier` - string used as the mention trigger
//! - `free_chat_enabled` - whether mentions outside commands go to chat
//!
//! The file store keeps a TOML table and rewrites it on every change.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const BOT_IDENTIFIER_KEY: &str = "bot_identifier";
pub const FREE_CHAT_KEY: &str = "free_chat_enabled";

/// Host configuration store
pub trait SettingsStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str) -> Result<()>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_bool(&self, key: &str, value: bool) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemorySettings {
    table: RwLock<toml::Table>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get_string(&self, key: &str) -> Option<String> {
        read_string(&self.table.read(), key)
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.table
            .write()
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        Ok(())
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.table.read().get(key).and_then(toml::Value::as_bool)
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.table
            .write()
            .insert(key.to_string(), toml::Value::Boolean(value));
        Ok(())
    }
}

/// TOML file backed store
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    table: RwLock<toml::Table>,
}

impl FileSettings {
    /// Open the store, starting empty if the file does not exist yet
    pub fn open(path: &Path) -> Result<Self> {
        let table = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings {}", path.display()))?;
            raw.parse::<toml::Table>()
                .with_context(|| format!("parsing settings {}", path.display()))?
        } else {
            info!("No settings file at {}, starting empty", path.display());
            toml::Table::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Memory only changes once the file write succeeded
    fn update(&self, key: &str, value: toml::Value) -> Result<()> {
        let mut table = self.table.write();
        let mut next = table.clone();
        next.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(&next).context("serializing settings")?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("writing settings {}", self.path.display()))?;

        *table = next;
        debug!("Saved setting {} to {}", key, self.path.display());
        Ok(())
    }
}

impl SettingsStore for FileSettings {
    fn get_string(&self, key: &str) -> Option<String> {
        read_string(&self.table.read(), key)
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.update(key, toml::Value::String(value.to_string()))
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.table.read().get(key).and_then(toml::Value::as_bool)
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.update(key, toml::Value::Boolean(value))
    }
}

fn read_string(table: &toml::Table, key: &str) -> Option<String> {
    table
        .get(key)
        .and_then(toml::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Typed view over the two feature flags
pub struct FeatureFlags {
    store: Box<dyn SettingsStore>,
}

impl FeatureFlags {
    pub fn new(store: Box<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Fill in the bot identifier unless one is already stored
    pub fn seed_bot_identifier(&self, identifier: &str) -> Result<()> {
        let identifier = identifier.trim().trim_start_matches('@');
        if identifier.is_empty() || self.bot_identifier().is_some() {
            return Ok(());
        }
        info!("Using bot identifier {:?}", identifier);
        self.store.set_string(BOT_IDENTIFIER_KEY, identifier)
    }

    pub fn bot_identifier(&self) -> Option<String> {
        self.store.get_string(BOT_IDENTIFIER_KEY)
    }

    pub fn free_chat_enabled(&self) -> bool {
        self.store.get_bool(FREE_CHAT_KEY).unwrap_or(false)
    }

    pub fn set_free_chat(&self, enabled: bool) -> Result<()> {
        self.store.set_bool(FREE_CHAT_KEY, enabled)
    }
}
