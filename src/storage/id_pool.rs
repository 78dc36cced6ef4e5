//! Pool of unused short identifiers.
//!
//! The pool is generated once at startup by enumerating every string of the
//! configured length over [`ALPHABET`], skipping names already present in the
//! backing directory, then shuffled so consecutive pastes get unrelated ids.

#![allow(missing_docs)]

use std::collections::HashSet;

use rand::seq::SliceRandom;

/// Symbols identifiers are drawn from.
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Longest identifier length accepted by configuration (36^5 ≈ 60M entries).
pub const MAX_ID_LENGTH: usize = 5;

/// Unordered collection of identifiers not currently in use.
#[derive(Debug, Default)]
pub struct IdPool {
    free: Vec<String>,
    id_length: usize,
}

impl IdPool {
    /// Enumerate `ALPHABET^id_length`, excluding `used`, in random order.
    #[must_use]
    pub fn generate(id_length: usize, used: &HashSet<String>) -> Self {
        let capacity = total_ids(id_length).saturating_sub(used.len());
        let mut free = Vec::with_capacity(capacity);
        let mut prefix = Vec::with_capacity(id_length);
        enumerate(&mut prefix, id_length, used, &mut free);
        free.shuffle(&mut rand::rng());
        Self { free, id_length }
    }

    /// Remove and return one identifier.
    pub fn take(&mut self) -> Option<String> {
        self.free.pop()
    }

    /// Return an identifier to the pool. Duplicates are not checked.
    pub fn put(&mut self, id: String) {
        self.free.push(id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    #[must_use]
    pub const fn id_length(&self) -> usize {
        self.id_length
    }

    /// Whether `name` could have been handed out by this pool.
    #[must_use]
    pub fn is_valid_id(&self, name: &str) -> bool {
        is_valid_id(name, self.id_length)
    }
}

/// Whether `name` is exactly `id_length` symbols of [`ALPHABET`].
#[must_use]
pub fn is_valid_id(name: &str, id_length: usize) -> bool {
    name.len() == id_length && name.bytes().all(|b| ALPHABET.contains(&b))
}

/// Number of distinct identifiers of `id_length` symbols.
#[must_use]
pub fn total_ids(id_length: usize) -> usize {
    u32::try_from(id_length)
        .ok()
        .and_then(|exp| ALPHABET.len().checked_pow(exp))
        .unwrap_or(usize::MAX)
}

fn enumerate(prefix: &mut Vec<u8>, depth: usize, used: &HashSet<String>, out: &mut Vec<String>) {
    if prefix.len() == depth {
        // Alphabet is ASCII, so every prefix is valid UTF-8.
        let id: String = prefix.iter().map(|&b| char::from(b)).collect();
        if !used.contains(&id) {
            out.push(id);
        }
        return;
    }
    for &symbol in ALPHABET {
        prefix.push(symbol);
        enumerate(prefix, depth, used, out);
        prefix.pop();
    }
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_full_space_for_empty_directory() {
        let pool = IdPool::generate(2, &HashSet::new());
        assert_eq!(pool.len(), 36 * 36);
        assert_eq!(pool.id_length(), 2);
    }

    #[test]
    fn used_names_are_excluded() {
        let used: HashSet<String> = ["a", "b", "9"].iter().map(ToString::to_string).collect();
        let mut pool = IdPool::generate(1, &used);
        assert_eq!(pool.len(), 33);
        let mut seen = HashSet::new();
        while let Some(id) = pool.take() {
            assert!(!used.contains(&id), "{id} is already on disk");
            assert!(seen.insert(id));
        }
        assert!(pool.is_empty());
    }

    #[test]
    fn foreign_names_do_not_shrink_pool() {
        let used: HashSet<String> = ["README.md", "zz"].iter().map(ToString::to_string).collect();
        let pool = IdPool::generate(1, &used);
        assert_eq!(pool.len(), 36);
    }

    #[test]
    fn every_generated_id_is_well_formed() {
        let mut pool = IdPool::generate(2, &HashSet::new());
        while let Some(id) = pool.take() {
            assert!(pool.is_valid_id(&id), "{id}");
        }
    }

    #[test]
    fn put_makes_id_available_again() {
        let mut pool = IdPool::generate(1, &HashSet::new());
        let id = pool.take().unwrap();
        assert_eq!(pool.len(), 35);
        pool.put(id.clone());
        assert_eq!(pool.len(), 36);
        assert_eq!(pool.take().as_deref(), Some(id.as_str()));
    }

    #[test]
    fn validity_checks_length_and_alphabet() {
        assert!(is_valid_id("ab12", 4));
        assert!(!is_valid_id("ab1", 4));
        assert!(!is_valid_id("AB12", 4));
        assert!(!is_valid_id("../x", 4));
        assert!(!is_valid_id("ab-2", 4));
        assert!(!is_valid_id("", 4));
    }

    #[test]
    fn total_ids_matches_alphabet_power() {
        assert_eq!(total_ids(1), 36);
        assert_eq!(total_ids(3), 46_656);
        assert_eq!(total_ids(0), 1);
    }
}
