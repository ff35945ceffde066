//
// intake.rs
// dicom-veil
//
// Input acceptance: single DICOM files by extension, zip archives by media type expanded member by member.
//

use std::io::{Cursor, Read};
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{Result, VeilError};
use crate::registry::{FileId, FileRegistry};

pub const ARCHIVE_MEDIA_TYPES: [&str; 2] = ["application/zip", "application/x-zip-compressed"];
pub const DICOM_EXTENSION: &str = ".dcm";

/// Upper bound on the buffer reserved from a member's declared size.
const MEMBER_PREALLOC_LIMIT: u64 = 16 * 1024 * 1024;

/// One submitted item as the caller received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingItem {
    pub name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl IncomingItem {
    pub fn new(name: impl Into<String>, media_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.map(str::to_string),
            bytes,
        }
    }

    fn is_archive(&self) -> bool {
        self.media_type
            .as_deref()
            .map_or(false, |t| ARCHIVE_MEDIA_TYPES.contains(&t))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Validates one item. Archives expand into every non-directory member.
pub fn accept(item: IncomingItem) -> Result<Vec<AcceptedFile>> {
    if item.is_archive() {
        return expand_archive(&item.name, &item.bytes);
    }
    if !item.name.to_ascii_lowercase().ends_with(DICOM_EXTENSION) {
        return Err(VeilError::rejected(
            item.name,
            "upload a valid .dcm or zip file",
        ));
    }
    Ok(vec![AcceptedFile {
        name: item.name,
        bytes: item.bytes,
    }])
}

fn expand_archive(name: &str, bytes: &[u8]) -> Result<Vec<AcceptedFile>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| VeilError::rejected(name, format!("unreadable archive: {}", e)))?;

    let mut files = Vec::new();
    for idx in 0..archive.len() {
        let mut member = match archive.by_index(idx) {
            Ok(member) => member,
            Err(err) => {
                warn!(archive = %name, index = idx, error = %err, "skipping unreadable archive member");
                continue;
            }
        };
        if member.is_dir() {
            continue;
        }
        let member_name = member.name().to_string();
        let mut content = Vec::with_capacity(capacity_hint(member.size()));
        if let Err(err) = member.read_to_end(&mut content) {
            warn!(archive = %name, member = %member_name, error = %err, "skipping unreadable archive member");
            continue;
        }
        files.push(AcceptedFile {
            name: member_name,
            bytes: content,
        });
    }
    debug!(archive = %name, members = files.len(), "expanded archive");
    Ok(files)
}

// The declared size comes from the archive header and is not trusted.
fn capacity_hint(declared: u64) -> usize {
    declared.min(MEMBER_PREALLOC_LIMIT) as usize
}

/// Accepted ids plus the items that were turned away.
#[derive(Debug, Default)]
pub struct Submission {
    pub accepted: Vec<FileId>,
    pub rejected: Vec<VeilError>,
}

/// Adds every acceptable item to the registry. Rejections never affect other items.
pub fn submit(
    registry: &mut FileRegistry,
    items: impl IntoIterator<Item = IncomingItem>,
) -> Submission {
    let mut submission = Submission::default();
    for item in items {
        match accept(item) {
            Ok(files) => {
                for file in files {
                    submission.accepted.push(registry.add(file.name, file.bytes));
                }
            }
            Err(err) => {
                warn!(error = %err, "input rejected");
                submission.rejected.push(err);
            }
        }
    }
    submission
}

/// Media type guessed from a path, the way a browser would label an upload.
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("zip") => Some(ARCHIVE_MEDIA_TYPES[0]),
        Some("dcm") => Some("application/dicom"),
        _ => None,
    }
}

/// Reads files (and every file below directories) into incoming items.
pub fn collect_inputs(paths: &[impl AsRef<Path>]) -> Result<Vec<IncomingItem>> {
    let mut items = Vec::new();
    for path in paths {
        for entry in WalkDir::new(path.as_ref()).sort_by_file_name() {
            let entry = entry.map_err(|e| VeilError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_path = entry.path();
            let name = file_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let bytes = std::fs::read(file_path)?;
            items.push(IncomingItem::new(
                name,
                media_type_for_path(file_path),
                bytes,
            ));
        }
    }
    Ok(items)
}
