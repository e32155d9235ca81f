use std::collections::HashSet;
use std::fs::File;
use std::hash::Hash;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

const HASH_BUF_SIZE: usize = 64 * 1024;
pub const SHORT_HASH_LEN: usize = 8;

/// SHA-256 of the whole file, hex-encoded.
pub fn content_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn short_hash(path: &Path) -> io::Result<String> {
    let mut full = content_hash(path)?;
    full.truncate(SHORT_HASH_LEN);
    Ok(full)
}

/// Lowercase ASCII slug: accents folded, spaces to `-`, anything outside
/// `[a-z0-9_-]` dropped, `-` runs collapsed. `item` when nothing survives.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.nfkd().flat_map(char::to_lowercase) {
        let c = if c == ' ' { '-' } else { c };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
            continue;
        }
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Output identifier: slug of the filename stem plus the content hash prefix.
pub fn stable_id(stem: &str, short_hash: &str) -> String {
    format!("{}-{}", slugify(stem), short_hash)
}

/// Keep the first item for every key, preserving order. Returns the number dropped.
pub fn keep_first_by<T, K, F>(items: &mut Vec<T>, mut key: F) -> usize
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let before = items.len();
    let mut seen: HashSet<K> = HashSet::with_capacity(items.len());
    items.retain(|item| seen.insert(key(item)));
    before - items.len()
}
