use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::media::{MediaFile, MediaKind};

/// Export subtree holding media files
pub const MEDIA_DIR: &str = "media";

/// Normalize a folder name for comparisons ("Recently Deleted" == "recently_deleted").
fn folder_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Folder names that exclude everything below them.
#[derive(Debug, Clone)]
pub struct Exclusions {
    keys: Vec<String>,
}

impl Exclusions {
    /// The recently-deleted subtree is always excluded in addition to `extra`.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> Self {
        let mut keys = vec![folder_key("recently_deleted")];
        for name in extra {
            let key = folder_key(name.as_ref());
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        Self { keys }
    }

    pub fn excludes(&self, folder_name: &str) -> bool {
        self.keys.contains(&folder_key(folder_name))
    }
}

/// Where to look for media: `<export>/media` when present, else the whole tree.
pub fn media_root(export_root: &Path) -> PathBuf {
    let media = export_root.join(MEDIA_DIR);
    if media.is_dir() {
        media
    } else {
        export_root.to_path_buf()
    }
}

/// Recursively list image and video files in path order, skipping excluded folders.
pub fn discover_media(export_root: &Path, exclusions: &Exclusions) -> Vec<MediaFile> {
    let root = media_root(export_root);
    let mut files = Vec::new();

    let walker = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !exclusions.excludes(&e.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("cannot read {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(kind) = MediaKind::from_path(entry.path()) {
            files.push(MediaFile::new(entry.into_path(), kind));
        }
    }

    log::info!("discovered {} media files under {}", files.len(), root.display());
    files
}
