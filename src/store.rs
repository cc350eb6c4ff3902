use crate::{
    error::{Error, Result},
    katakana::{is_katakana, normalize_katakana},
};
use serde::{Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use std::{
    collections::BTreeMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Word → katakana mapping as held in memory.
///
/// On disk the keys are ordered case-insensitively, see [`to_json`].
pub type KatakanaMap = BTreeMap<String, String>;

/// The persisted word → katakana map.
///
/// The file is the single source of truth: every [`load`](Self::load) reads
/// it afresh and every [`merge_and_save`](Self::merge_and_save) re-reads it
/// before writing, so edits made between calls are kept.
#[derive(Debug, Clone)]
pub struct MapStore {
    path: PathBuf,
}

impl MapStore {
    /// Creates a store backed by the JSON file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the map from disk. A missing file is an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not UTF-8 or is not
    /// a JSON object of strings.
    pub fn load(&self) -> Result<KatakanaMap> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Map file {} not found, starting empty", self.path.display());
                return Ok(KatakanaMap::new());
            }
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        let text = String::from_utf8(bytes).map_err(|_| Error::invalid_utf8(&self.path))?;
        let map: KatakanaMap = serde_json::from_str(&text)?;
        Ok(map)
    }

    /// Merges `new_entries` into the on-disk map and rewrites it.
    ///
    /// Values are normalized before storage; later entries win over earlier
    /// ones and over what is already on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntry`] without touching the file if any value
    /// is not katakana, or an IO error if the map cannot be read or written.
    pub fn merge_and_save<I, K, V>(&self, new_entries: I) -> Result<KatakanaMap>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for (word, value) in new_entries {
            let word = word.into();
            let value = value.as_ref();
            if !is_katakana(value) {
                return Err(Error::InvalidEntry {
                    word,
                    value: value.to_string(),
                });
            }
            normalized.push((word, normalize_katakana(value)));
        }

        let mut map = self.load()?;
        let added = normalized.len();
        map.extend(normalized);
        self.save(&map)?;

        info!(
            "Added {} new entries to {}. Total entries: {}",
            added,
            self.path.display(),
            map.len()
        );
        Ok(map)
    }

    /// Writes the whole map, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, map: &KatakanaMap) -> Result<()> {
        let content = to_json(map)?;
        write_file_atomic(&self.path, &content)
    }

    /// Copies the current map file next to itself with a timestamp suffix.
    ///
    /// Returns `None` if there is nothing to back up.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    pub fn backup(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S%3f");
        let backup_path = sibling_path(&self.path, &format!("backup.{timestamp}"))?;

        fs::copy(&self.path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(Some(backup_path))
    }
}

/// Serializes a map with 4-space indentation and case-insensitively sorted
/// keys. Keys equal ignoring case fall back to byte order.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(map: &KatakanaMap) -> Result<String> {
    let mut entries: Vec<(&String, &String)> = map.iter().collect();
    entries.sort_by_cached_key(|(key, _)| (key.to_lowercase(), (*key).clone()));

    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    SortedEntries(&entries).serialize(&mut serializer)?;

    String::from_utf8(buf).map_err(|e| Error::Serialization {
        message: e.to_string(),
    })
}

struct SortedEntries<'a>(&'a [(&'a String, &'a String)]);

impl Serialize for SortedEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().copied())
    }
}

/// Builds `<dir>/<file name>.<suffix>`.
fn sibling_path(path: &Path, suffix: &str) -> Result<PathBuf> {
    let filename = path
        .file_name()
        .ok_or_else(|| Error::config(format!("Invalid map path: {}", path.display())))?
        .to_string_lossy();

    Ok(path.with_file_name(format!("{filename}.{suffix}")))
}

/// Writes a file atomically.
///
/// # Process
///
/// 1. Writes content to a uniquely named temporary file in the target directory
/// 2. Syncs the temporary file to disk
/// 3. Renames the temporary file over the target path
///
/// The temporary file is removed if any step fails.
fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            parent
        }
        None => Path::new("."),
    };

    let mut temp_file = NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::io(temp_file.path(), e))?;

    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| Error::io(temp_file.path(), e))?;

    temp_file.persist(path).map_err(|e| Error::io(path, e.error))?;

    Ok(())
}
