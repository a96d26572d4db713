/*!
File tree extraction with depth, size and content gating.
*/

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::snapshot::FileNode;

/// Capture the tree under `root`.
///
/// Directories nested more than `max_depth` levels below `root` are listed
/// but not descended into, so anything deeper is omitted. Files of at least
/// `max_file_size` bytes become [`FileNode::Oversized`] without being read;
/// smaller files are sniffed and become [`FileNode::Text`] or
/// [`FileNode::Binary`]. Entries that cannot be read are left out.
pub fn extract_files(root: &Path, max_depth: usize, max_file_size: u64) -> FileNode {
    let mut tree = BTreeMap::new();

    if !root.is_dir() {
        debug!("No files directory at {}", root.display());
        return FileNode::Directory(tree);
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth.saturating_add(1))
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let Some(node) = capture_entry(&entry, max_file_size) else {
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        insert_at(&mut tree, relative, node);
    }

    FileNode::Directory(tree)
}

fn capture_entry(entry: &DirEntry, max_file_size: u64) -> Option<FileNode> {
    let file_type = entry.file_type();
    if file_type.is_dir() {
        return Some(FileNode::empty_dir());
    }
    if !file_type.is_file() {
        return None;
    }

    let metadata = entry
        .metadata()
        .map_err(|e| warn!("Failed to stat {}: {}", entry.path().display(), e))
        .ok()?;
    if metadata.len() >= max_file_size {
        return Some(FileNode::Oversized);
    }

    let content = fs::read(entry.path())
        .map_err(|e| warn!("Failed to read {}: {}", entry.path().display(), e))
        .ok()?;
    debug!(path = %entry.path().display(), size = content.len(), "Captured file");
    Some(classify(content))
}

/// Decide whether file content is captured as text
pub fn classify(content: Vec<u8>) -> FileNode {
    if content.iter().copied().any(is_control_byte) {
        return FileNode::Binary;
    }
    match String::from_utf8(content) {
        Ok(text) => FileNode::Text(text),
        Err(_) => FileNode::Binary,
    }
}

fn is_control_byte(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F)
}

/// Place `node` at `relative` inside `tree`, creating intermediate directories.
///
/// Walk order guarantees parents are visited first; a parent that was
/// skipped leaves its children out as well.
fn insert_at(tree: &mut BTreeMap<String, FileNode>, relative: &Path, node: FileNode) {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let Some((name, parents)) = parts.split_last() else {
        return;
    };

    let mut current = tree;
    for parent in parents {
        match current.get_mut(parent) {
            Some(FileNode::Directory(children)) => current = children,
            _ => return,
        }
    }
    current.insert(name.clone(), node);
}
