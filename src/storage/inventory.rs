//! One-shot listing of the backing directory.
//!
//! Every direct non-directory entry is a stored item: its name goes into the
//! used-set and its size counts towards the occupied total. Nested
//! directories are ignored.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use crate::core::errors::{PasteError, Result};

/// A single stored item as seen on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    /// Lossy UTF-8 form of the name, used for identifier checks and logs.
    pub name: String,
    /// Name exactly as stored on disk.
    pub file_name: OsString,
    pub size: u64,
    pub modified: SystemTime,
}

/// Snapshot of the backing directory.
#[derive(Debug, Clone, Default)]
pub struct DirInventory {
    pub used: HashSet<String>,
    pub total_bytes: u64,
    /// Oldest item by modification time, if any.
    pub oldest: Option<ItemInfo>,
}

impl DirInventory {
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.used.len()
    }
}

/// List `dir` and build its inventory.
///
/// Fails if the directory cannot be listed or an entry's metadata cannot be
/// read.
pub fn scan_backing_dir(dir: &Path) -> Result<DirInventory> {
    let mut inventory = DirInventory::default();
    for item in list_items(dir)? {
        let item = item?;
        inventory.total_bytes = inventory.total_bytes.saturating_add(item.size);
        let is_older = inventory
            .oldest
            .as_ref()
            .is_none_or(|oldest| item.modified < oldest.modified);
        inventory.used.insert(item.name.clone());
        if is_older {
            inventory.oldest = Some(item);
        }
    }
    Ok(inventory)
}

/// Iterate the stored items of `dir`, yielding per-entry metadata failures.
///
/// Names that are not valid UTF-8 can never be identifiers; `name` carries
/// their lossy form while `file_name` keeps the on-disk bytes.
pub(crate) fn list_items(dir: &Path) -> Result<impl Iterator<Item = Result<ItemInfo>> + '_> {
    let entries = fs::read_dir(dir).map_err(|e| PasteError::io(dir, e))?;
    Ok(entries.filter_map(move |entry| {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => return Some(Err(PasteError::io(dir, e))),
        };
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => return Some(Err(PasteError::io(&path, e))),
        };
        if metadata.is_dir() {
            return None;
        }
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => return Some(Err(PasteError::io(&path, e))),
        };
        let file_name = entry.file_name();
        Some(Ok(ItemInfo {
            name: file_name.to_string_lossy().into_owned(),
            file_name,
            size: metadata.len(),
            modified,
        }))
    }))
}
