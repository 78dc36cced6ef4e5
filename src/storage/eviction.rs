//! Oldest-first eviction of stored items.
//!
//! Each call rescans the backing directory, picks the non-directory entry with
//! the earliest modification time and deletes it. Callers hold the allocation
//! lock so the unlink is atomic with the pool and capacity update.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::core::errors::{PasteError, Result};
use crate::storage::inventory::{ItemInfo, list_items};

/// An item removed from the backing directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedItem {
    pub id: String,
    pub size: u64,
}

/// Delete the oldest item in `dir`, ignoring names in `skip`.
///
/// Entries whose metadata can not be read are passed over. Fails with
/// `NothingToEvict` when no candidate exists, the directory can not be listed,
/// or the deletion itself fails.
pub fn evict_oldest(dir: &Path, skip: &HashSet<String>) -> Result<EvictedItem> {
    let nothing = || PasteError::NothingToEvict {
        path: dir.to_path_buf(),
    };

    let oldest = list_items(dir)
        .map_err(|_| nothing())?
        .filter_map(std::result::Result::ok)
        .filter(|item| !skip.contains(&item.name))
        .min_by_key(|item| item.modified)
        .ok_or_else(nothing)?;

    remove(dir, &oldest).map_err(|e| {
        eprintln!("[PASTES-GC] failed to delete {}: {e}", oldest.name);
        nothing()
    })?;

    Ok(EvictedItem {
        id: oldest.name,
        size: oldest.size,
    })
}

fn remove(dir: &Path, item: &ItemInfo) -> std::io::Result<()> {
    fs::remove_file(dir.join(&item.file_name))
}
