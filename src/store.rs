//! Layered INI-style mode configuration.
//!
//! A [`ConfigStore`] is built by overlaying any number of [`ConfigSource`]s in
//! order. Each source may open new `[section]`s or add keys to sections that an
//! earlier layer created; a key set twice keeps the value from the last write.
//!
//! ```text
//! ; /etc/vamp/vamprc
//! [vamp]
//! posturl = http://localhost:8080/v1/completions
//! model   = vine-omni
//!
//! # ~/.vamprc
//! [vamp]
//! maxtokens = 2048
//! ```

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, trace};

/// One layer of mode configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A file on disk; a missing file is skipped silently.
    File(PathBuf),

    /// In-memory text, named for diagnostics.
    Text {
        /// Name shown in logs
        name: String,
        /// INI text
        contents: String,
    },
}

impl ConfigSource {
    /// Creates a file-backed source.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Creates an in-memory source.
    #[must_use]
    pub fn text(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// A named group of key/value entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: IndexMap<String, String>,
}

impl Section {
    /// Creates an empty section.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: IndexMap::new(),
        }
    }

    /// Returns the section name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value stored for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns the value for `key` unless it is absent or empty.
    #[must_use]
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Sets `key`, replacing an earlier value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Iterates over entries in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys in the section.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the section has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered collection of uniquely named sections.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    sections: IndexMap<String, Section>,
}

impl ConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store by loading every source in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a present source cannot be read.
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a ConfigSource>) -> Result<Self> {
        let mut store = Self::new();
        for source in sources {
            store.load(source)?;
        }
        Ok(store)
    }

    /// Overlays one source on top of what is already loaded.
    ///
    /// A file that does not exist is a no-op. Malformed lines are skipped one
    /// by one and never abort the load.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file exists but cannot be read.
    pub fn load(&mut self, source: &ConfigSource) -> Result<()> {
        match source {
            ConfigSource::File(path) => {
                let bytes = match fs::read(path) {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        trace!("Config layer {} not present", path.display());
                        return Ok(());
                    }
                    Err(e) => return Err(Error::io(path, e)),
                };
                let text = String::from_utf8_lossy(&bytes);
                let applied = self.load_str(&text);
                debug!("Loaded {} entries from {}", applied, path.display());
            }
            ConfigSource::Text { name, contents } => {
                let applied = self.load_str(contents);
                debug!("Loaded {} entries from {}", applied, name);
            }
        }
        Ok(())
    }

    /// Parses INI text into the store and returns the number of key/value
    /// lines applied.
    pub fn load_str(&mut self, text: &str) -> usize {
        let mut current: Option<String> = None;
        let mut applied = 0;

        for raw in text.lines() {
            let line = raw.trim_matches(|c: char| c.is_ascii_whitespace());

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                // Headers without a closing bracket are dropped, the previous
                // section stays open.
                let Some(end) = rest.find(']') else {
                    trace!("Skipping unterminated section header: {line}");
                    continue;
                };
                let name = rest[..end].trim_matches(|c: char| c.is_ascii_whitespace());
                self.section_entry(name);
                current = Some(name.to_string());
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                trace!("Skipping line without '=': {line}");
                continue;
            };

            let Some(name) = current.as_deref() else {
                trace!("Skipping key outside any section: {line}");
                continue;
            };

            let key = key.trim_matches(|c: char| c.is_ascii_whitespace());
            let value = value.trim_matches(|c: char| c.is_ascii_whitespace());
            self.section_entry(name).set(key, value);
            applied += 1;
        }

        applied
    }

    fn section_entry(&mut self, name: &str) -> &mut Section {
        self.sections
            .entry(name.to_string())
            .or_insert_with(|| Section::new(name))
    }

    /// Finds a section by exact, case-sensitive name.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Returns the value of `key` in section `section`, if both exist.
    #[must_use]
    pub fn value(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// Iterates over section names in first-seen order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Number of sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns true if no section has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_parse_basic_sections() {
        let mut store = ConfigStore::new();
        store.load_str(
            "; comment\n# another\n\n[vamp]\nmodel = big\n  posturl=http://x  \n[fix]\ninstructions = Fix it\n",
        );

        assert_eq!(store.len(), 2);
        assert_eq!(store.value("vamp", "model"), Some("big"));
        assert_eq!(store.value("vamp", "posturl"), Some("http://x"));
        assert_eq!(store.value("fix", "instructions"), Some("Fix it"));
    }

    #[test]
    fn test_later_layer_wins() {
        let store = ConfigStore::from_sources(&[
            ConfigSource::text("system", "[vamp]\nmodel = a\nmaxtokens = 10\n"),
            ConfigSource::text("user", "[vamp]\nmodel = b\n"),
        ])
        .unwrap();

        assert_eq!(store.value("vamp", "model"), Some("b"));
        assert_eq!(store.value("vamp", "maxtokens"), Some("10"));
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut store = ConfigStore::new();
        store.load_str("[s]\na = 1\nb = 2\n[s]\na = 3\n");

        let section = store.section("s").unwrap();
        let entries: Vec<_> = section.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_duplicate_headers_merge() {
        let mut store = ConfigStore::new();
        store.load_str("[a]\nx = 1\n[b]\ny = 2\n[a]\nz = 3\n");

        assert_eq!(store.len(), 2);
        assert_eq!(store.section("a").unwrap().len(), 2);
        assert_eq!(store.section_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let mut store = ConfigStore::new();
        let applied = store.load_str("orphan = 1\n[ok]\nnot a pair\n[broken\nkey = v\n");

        assert_eq!(applied, 1);
        assert!(store.section("broken").is_none());
        // the unterminated header leaves [ok] open
        assert_eq!(store.value("ok", "key"), Some("v"));
        assert_eq!(store.value("ok", "orphan"), None);
    }

    #[test]
    fn test_split_at_first_equals() {
        let mut store = ConfigStore::new();
        store.load_str("[s]\nposturl = http://h/p?a=b&c=d\n");

        assert_eq!(store.value("s", "posturl"), Some("http://h/p?a=b&c=d"));
    }

    #[test]
    fn test_section_name_trimmed_and_case_sensitive() {
        let mut store = ConfigStore::new();
        store.load_str("[  Fix ] trailing\nk = v\n");

        assert!(store.section("Fix").is_some());
        assert!(store.section("fix").is_none());
        assert!(store.section("  Fix ").is_none());
    }

    #[test]
    fn test_keys_case_sensitive() {
        let mut store = ConfigStore::new();
        store.load_str("[s]\nModel = A\nmodel = b\n");

        let section = store.section("s").unwrap();
        assert_eq!(section.get("Model"), Some("A"));
        assert_eq!(section.get("model"), Some("b"));
        assert_eq!(section.get("MODEL"), None);
    }

    #[test]
    fn test_empty_value_is_kept_but_not_non_empty() {
        let mut store = ConfigStore::new();
        store.load_str("[s]\nmodel =\n");

        let section = store.section("s").unwrap();
        assert_eq!(section.get("model"), Some(""));
        assert_eq!(section.get_non_empty("model"), None);
    }

    #[test]
    fn test_missing_file_is_noop() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut store = ConfigStore::new();

        store
            .load(&ConfigSource::file(temp.path().join("absent.rc")))
            .unwrap();

        assert!(store.is_empty());
    }

    #[test]
    fn test_file_layers_overlay() {
        let temp = assert_fs::TempDir::new().unwrap();
        let system = temp.child("vamprc");
        system
            .write_str("[vamp]\nposturl = http://system\nmodel = sys\n")
            .unwrap();
        let user = temp.child(".vamprc");
        user.write_str("[vamp]\nmodel = user\n[extra]\nk = v\n")
            .unwrap();

        let store = ConfigStore::from_sources(&[
            ConfigSource::file(system.path()),
            ConfigSource::file(user.path()),
        ])
        .unwrap();

        assert_eq!(store.value("vamp", "posturl"), Some("http://system"));
        assert_eq!(store.value("vamp", "model"), Some("user"));
        assert_eq!(store.value("extra", "k"), Some("v"));
    }

    #[test]
    fn test_directory_source_is_io_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut store = ConfigStore::new();

        let err = store.load(&ConfigSource::file(temp.path())).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_crlf_lines() {
        let mut store = ConfigStore::new();
        store.load_str("[s]\r\nk = v\r\n");

        assert_eq!(store.value("s", "k"), Some("v"));
    }
}
