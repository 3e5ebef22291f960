// src/services/table.rs

use crate::error::{Error, Result};
use crate::filter::{write_atomic, DEFAULT_MODE};
use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provider names for one service interface, in first-seen order
///
/// Two sets are equal only when they list the same providers in the same
/// order, since the order is what ends up in the registration file.
#[derive(Debug, Clone, Default)]
pub struct ProviderSet {
    providers: IndexSet<String>,
}

impl ProviderSet {
    /// Insert a provider; returns false if it was already present
    pub fn insert(&mut self, provider: &str) -> bool {
        if self.providers.contains(provider) {
            return false;
        }
        self.providers.insert(provider.to_string())
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.providers.contains(provider)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(String::as_str)
    }
}

impl PartialEq for ProviderSet {
    fn eq(&self, other: &Self) -> bool {
        self.providers.iter().eq(other.providers.iter())
    }
}

impl Eq for ProviderSet {}

/// Registration path → merged providers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRegistrationTable {
    files: BTreeMap<String, ProviderSet>,
}

impl ServiceRegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the provider lines of one registration file
    ///
    /// Blank lines and comments are skipped; text after `#` on a provider
    /// line is ignored. Returns how many providers were new.
    pub fn add_lines(&mut self, path: &str, text: &str) -> usize {
        let set = self.files.entry(path.to_string()).or_default();
        let mut added = 0;
        for line in text.lines() {
            let provider = line.split('#').next().unwrap_or("").trim();
            if provider.is_empty() {
                continue;
            }
            if set.insert(provider) {
                added += 1;
            }
        }
        added
    }

    pub fn providers(&self, path: &str) -> Option<&ProviderSet> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Number of registration files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Registration paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProviderSet)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// File content for one registration path, one provider per line
    pub fn render(&self, path: &str) -> Option<String> {
        self.files.get(path).map(|set| {
            let mut out = String::new();
            for provider in set.iter() {
                out.push_str(provider);
                out.push('\n');
            }
            out
        })
    }

    /// Write every merged file under `staging`, returning the written paths
    pub fn materialize(&self, staging: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.files.len());
        for path in self.files.keys() {
            let content = self.render(path).unwrap_or_default();
            let dest = staging.join(path);
            write_atomic(&dest, content.as_bytes(), DEFAULT_MODE)
                .map_err(|e| Error::write_io(&dest, e))?;
            debug!("Staged {}", dest.display());
            written.push(dest);
        }
        Ok(written)
    }
}
