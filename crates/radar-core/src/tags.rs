//! Case-normalized tag sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Normalize a tag: trimmed and lower-cased. Returns `None` for blank input.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_lowercase())
    }
}

/// A set of normalized tags.
///
/// Every path into the set normalizes, including deserialization, so legacy
/// documents holding `"Tech"` and `"tech"` read back as a single tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag. Returns `false` if it was already present or blank.
    pub fn insert(&mut self, tag: &str) -> bool {
        match normalize_tag(tag) {
            Some(tag) => self.0.insert(tag),
            None => false,
        }
    }

    /// Remove a tag. Returns `false` if it was absent.
    pub fn remove(&mut self, tag: &str) -> bool {
        match normalize_tag(tag) {
            Some(tag) => self.0.remove(&tag),
            None => false,
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        normalize_tag(tag).is_some_and(|tag| self.0.contains(&tag))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True when the two sets share at least one tag.
    pub fn intersects(&self, other: &TagSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.0.iter().any(|tag| large.0.contains(tag))
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        tags.iter().map(String::as_str).collect()
    }
}

impl From<TagSet> for Vec<String> {
    fn from(tags: TagSet) -> Self {
        tags.0.into_iter().collect()
    }
}

impl<'a> FromIterator<&'a str> for TagSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl Extend<String> for TagSet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        for tag in iter {
            self.insert(&tag);
        }
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
