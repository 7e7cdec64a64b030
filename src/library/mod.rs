// Library module - share tree walking and the client-side cache layer
//
// The cloud share is an opaque tree of nodes; the core only needs to list
// children, read leaf metadata, and open a byte stream. `FsNode` adapts a
// local directory to the same interface.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::io::ReaderStream;

pub mod cache;
pub mod lookup;
pub mod parser;

use parser::{parse_file_info, ParsedFileInfo};

/// A node in the storage share: either a directory or a leaf file.
pub trait ShareNode: Send + Sync {
    fn name(&self) -> String;
    fn is_directory(&self) -> bool;
    fn size(&self) -> u64;
    fn modified_at(&self) -> Option<DateTime<Utc>>;
    fn children(&self) -> Vec<Arc<dyn ShareNode>>;
    /// Open an incremental byte stream over a leaf node's content.
    fn open_stream(&self) -> BoxStream<'static, std::io::Result<Bytes>>;
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("not a directory")]
    NotADirectory,
    #[error("path not found: {0}")]
    PathNotFound(String),
}

/// A parsed `.mp4` leaf with a handle back to its node.
#[derive(Clone)]
pub struct MediaFile {
    pub info: ParsedFileInfo,
    pub size: u64,
    pub node: Arc<dyn ShareNode>,
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("info", &self.info)
            .field("size", &self.size)
            .finish()
    }
}

/// One entry of a browsable directory listing.
pub enum ShareItem {
    Directory {
        name: String,
        node: Arc<dyn ShareNode>,
    },
    File(MediaFile),
}

impl fmt::Debug for ShareItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareItem::Directory { name, .. } => {
                f.debug_struct("Directory").field("name", name).finish()
            }
            ShareItem::File(file) => f.debug_tuple("File").field(file).finish(),
        }
    }
}

fn is_mp4(name: &str) -> bool {
    name.to_lowercase().ends_with(".mp4")
}

/// List one directory, parsing `.mp4` leaves. `path_segments` navigates
/// from `root` down the tree; the joined segments become the pathname fed
/// to the filename parser.
pub fn directory_contents(
    root: Arc<dyn ShareNode>,
    path_segments: &[String],
) -> Result<Vec<ShareItem>, ShareError> {
    if !root.is_directory() {
        return Err(ShareError::NotADirectory);
    }

    let mut current = root;
    for segment in path_segments {
        let child = current
            .children()
            .into_iter()
            .find(|c| c.is_directory() && c.name() == *segment);
        match child {
            Some(child) => current = child,
            None => return Err(ShareError::PathNotFound(path_segments.join("/"))),
        }
    }

    let pathname = path_segments.join("/");
    let mut items = Vec::new();
    for child in current.children() {
        let name = child.name();
        if child.is_directory() {
            items.push(ShareItem::Directory { name, node: child });
        } else if is_mp4(&name) {
            items.push(ShareItem::File(MediaFile {
                info: parse_file_info(&name, &pathname),
                size: child.size(),
                node: child,
            }));
        }
    }

    Ok(items)
}

/// Recursively collect every `.mp4` leaf under `root`. Each file's
/// pathname is the directory path from the root, so folder keywords like
/// "Movies" or "Shows" reach the parser.
pub fn collect_media_files(root: Arc<dyn ShareNode>) -> Vec<MediaFile> {
    let mut files = Vec::new();

    if !root.is_directory() {
        let name = root.name();
        if is_mp4(&name) {
            files.push(MediaFile {
                info: parse_file_info(&name, ""),
                size: root.size(),
                node: root,
            });
        }
        return files;
    }

    walk(root, String::new(), &mut files);
    files
}

fn walk(node: Arc<dyn ShareNode>, path: String, files: &mut Vec<MediaFile>) {
    for child in node.children() {
        let name = child.name();
        if child.is_directory() {
            let child_path = if path.is_empty() {
                name
            } else {
                format!("{}/{}", path, name)
            };
            walk(child, child_path, files);
        } else if is_mp4(&name) {
            files.push(MediaFile {
                info: parse_file_info(&name, &path),
                size: child.size(),
                node: child,
            });
        }
    }
}

/// Read up to the probe window from a node's stream and report whether
/// progressive playback will work before the full file has downloaded,
/// plus the box layout that led to the verdict.
pub async fn probe_mp4(node: &dyn ShareNode) -> std::io::Result<crate::services::mp4::Mp4Info> {
    let mut stream = node.open_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.extend_from_slice(&chunk);
        if buffer.len() >= crate::services::mp4::MAX_SCAN_BYTES {
            break;
        }
    }

    Ok(crate::services::mp4::mp4_info(&buffer))
}

/// Local-directory adapter for the share interface.
pub struct FsNode {
    path: PathBuf,
}

impl FsNode {
    pub fn new(path: impl Into<PathBuf>) -> Arc<dyn ShareNode> {
        Arc::new(FsNode { path: path.into() })
    }
}

impl ShareNode for FsNode {
    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    fn children(&self) -> Vec<Arc<dyn ShareNode>> {
        let Ok(entries) = std::fs::read_dir(&self.path) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|entry| FsNode::new(entry.path()))
            .collect()
    }

    fn open_stream(&self) -> BoxStream<'static, std::io::Result<Bytes>> {
        let path = self.path.clone();
        futures::stream::once(async move {
            match tokio::fs::File::open(&path).await {
                Ok(file) => ReaderStream::new(file).boxed(),
                Err(err) => futures::stream::once(async move { Err(err) }).boxed(),
            }
        })
        .flatten()
        .boxed()
    }
}
