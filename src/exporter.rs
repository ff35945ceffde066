//
// exporter.rs
// dicom-veil
//
// Packages anonymized results into a deliverable (the file itself, or a zip archive) and marks them downloaded.
//

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::registry::{FileId, FileRegistry, FileStatus};

pub const DEFAULT_ARCHIVE_PREFIX: &str = "dicomveil-";
pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Dicom,
    Archive,
}

/// A deliverable byte blob and the name it should be saved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

/// Receives finished artifacts (disk, HTTP response, memory...).
pub trait ArtifactSink {
    fn emit(&mut self, artifact: Artifact) -> Result<()>;
}

impl ArtifactSink for Vec<Artifact> {
    fn emit(&mut self, artifact: Artifact) -> Result<()> {
        self.push(artifact);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// No selected record was ANONYMIZED.
    Nothing,
    Single { id: FileId, name: String },
    Archive { name: String, entries: Vec<FileId> },
}

#[derive(Debug, Clone)]
pub struct PackagingExporter {
    archive_prefix: String,
}

impl Default for PackagingExporter {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_PREFIX)
    }
}

impl PackagingExporter {
    pub fn new(archive_prefix: impl Into<String>) -> Self {
        Self {
            archive_prefix: archive_prefix.into(),
        }
    }

    /// `<prefix><unix millis>.zip`
    pub fn archive_name(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}{}.{}",
            self.archive_prefix,
            now.timestamp_millis(),
            ARCHIVE_EXTENSION
        )
    }

    pub async fn export<S: ArtifactSink>(
        &self,
        registry: &mut FileRegistry,
        selected: &[FileId],
        sink: &mut S,
    ) -> Result<ExportOutcome> {
        self.export_at(registry, selected, sink, Utc::now()).await
    }

    /// Same as [`export`](Self::export) with the export instant pinned.
    pub async fn export_at<S: ArtifactSink>(
        &self,
        registry: &mut FileRegistry,
        selected: &[FileId],
        sink: &mut S,
        now: DateTime<Utc>,
    ) -> Result<ExportOutcome> {
        let ready = registry.select(selected, FileStatus::Anonymized);
        match ready.as_slice() {
            [] => {
                debug!(selected = selected.len(), "nothing to export");
                Ok(ExportOutcome::Nothing)
            }
            [id] => self.export_single(registry, *id, sink),
            _ => self.export_archive(registry, ready, sink, now).await,
        }
    }

    fn export_single<S: ArtifactSink>(
        &self,
        registry: &mut FileRegistry,
        id: FileId,
        sink: &mut S,
    ) -> Result<ExportOutcome> {
        let Some((name, bytes)) = anonymized_result(registry, id) else {
            return Ok(ExportOutcome::Nothing);
        };
        sink.emit(Artifact {
            name: name.clone(),
            kind: ArtifactKind::Dicom,
            bytes,
        })?;
        registry.mark_downloaded(id);
        info!(file = %name, "exported anonymized file");
        Ok(ExportOutcome::Single { id, name })
    }

    async fn export_archive<S: ArtifactSink>(
        &self,
        registry: &mut FileRegistry,
        ids: Vec<FileId>,
        sink: &mut S,
        now: DateTime<Utc>,
    ) -> Result<ExportOutcome> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut used_names = HashSet::new();
        let mut entries = Vec::with_capacity(ids.len());

        for id in ids {
            let Some((name, bytes)) = anonymized_result(registry, id) else {
                continue;
            };
            let entry_name = unique_entry_name(&name, &mut used_names);
            writer.start_file(entry_name.as_str(), options)?;
            writer.write_all(&bytes)?;
            entries.push(id);
            debug!(entry = %entry_name, "added file to archive");
            // Let other tasks run between entries; large batches compress for a while.
            tokio::task::yield_now().await;
        }

        let bytes = writer.finish()?.into_inner();
        let name = self.archive_name(now);
        sink.emit(Artifact {
            name: name.clone(),
            kind: ArtifactKind::Archive,
            bytes,
        })?;
        // Only delivered entries leave the ANONYMIZED state.
        for id in &entries {
            registry.mark_downloaded(*id);
        }
        info!(archive = %name, entries = entries.len(), "exported archive");
        Ok(ExportOutcome::Archive { name, entries })
    }
}

fn anonymized_result(registry: &FileRegistry, id: FileId) -> Option<(String, Vec<u8>)> {
    let record = registry.get(id)?;
    if record.status() != FileStatus::Anonymized {
        return None;
    }
    let bytes = record.result_bytes()?.to_vec();
    Some((record.name().to_string(), bytes))
}

/// Keeps archive entry names distinct: `a.dcm`, `a-2.dcm`, `a-3.dcm`...
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = name
        .rfind('/')
        .map(|idx| &name[..=idx])
        .unwrap_or_default();

    let mut counter = 2;
    loop {
        let candidate = match extension {
            Some(ext) => format!("{}{}-{}.{}", parent, stem, counter, ext),
            None => format!("{}{}-{}", parent, stem, counter),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
