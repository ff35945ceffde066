//
// registry.rs
// dicom-veil
//
// Pure state machine tracking every accepted file from upload through anonymization to download.
//

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Registry-unique file token. Never reused, even after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileId(Uuid);

impl FileId {
    pub fn generate() -> Self {
        FileId(Uuid::new_v4())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Uploaded,
    Anonymized,
    Downloaded,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileStatus::Uploaded => "UPLOADED",
            FileStatus::Anonymized => "ANONYMIZED",
            FileStatus::Downloaded => "DOWNLOADED",
        };
        f.write_str(label)
    }
}

// Result bytes live inside the stage so they exist exactly when the status says they do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    Uploaded,
    Anonymized(Vec<u8>),
    Downloaded(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    id: FileId,
    name: String,
    source: Vec<u8>,
    stage: Stage,
}

impl FileRecord {
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Original file name (archive members keep their in-archive path).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn status(&self) -> FileStatus {
        match self.stage {
            Stage::Uploaded => FileStatus::Uploaded,
            Stage::Anonymized(_) => FileStatus::Anonymized,
            Stage::Downloaded(_) => FileStatus::Downloaded,
        }
    }

    pub fn result_bytes(&self) -> Option<&[u8]> {
        match &self.stage {
            Stage::Uploaded => None,
            Stage::Anonymized(bytes) | Stage::Downloaded(bytes) => Some(bytes),
        }
    }
}

/// Closed set of registry mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCommand {
    Add {
        id: FileId,
        name: String,
        bytes: Vec<u8>,
    },
    Remove(FileId),
    /// Stores `result` on an UPLOADED or ANONYMIZED record; DOWNLOADED records are left as they are.
    MarkAnonymized {
        id: FileId,
        result: Vec<u8>,
    },
    MarkDownloaded(FileId),
    Clear,
}

impl RegistryCommand {
    /// Builds an `Add` command with a freshly generated id.
    pub fn add(name: impl Into<String>, bytes: Vec<u8>) -> (FileId, Self) {
        let id = FileId::generate();
        (
            id,
            RegistryCommand::Add {
                id,
                name: name.into(),
                bytes,
            },
        )
    }
}

/// Insertion-ordered collection of file records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRegistry {
    records: Vec<FileRecord>,
}

/// Applies one command and returns the next registry. No side effects.
pub fn transition(mut registry: FileRegistry, command: RegistryCommand) -> FileRegistry {
    match command {
        RegistryCommand::Add { id, name, bytes } => {
            debug_assert!(registry.get(id).is_none(), "file id {} reused", id);
            registry.records.push(FileRecord {
                id,
                name,
                source: bytes,
                stage: Stage::Uploaded,
            });
        }
        RegistryCommand::Remove(id) => registry.records.retain(|record| record.id != id),
        RegistryCommand::MarkAnonymized { id, result } => {
            if let Some(record) = registry.get_mut(id) {
                // A downloaded file never moves back.
                if !matches!(record.stage, Stage::Downloaded(_)) {
                    record.stage = Stage::Anonymized(result);
                }
            }
        }
        RegistryCommand::MarkDownloaded(id) => {
            if let Some(record) = registry.get_mut(id) {
                let stage = std::mem::replace(&mut record.stage, Stage::Uploaded);
                record.stage = match stage {
                    Stage::Anonymized(bytes) | Stage::Downloaded(bytes) => Stage::Downloaded(bytes),
                    // Nothing to deliver yet.
                    Stage::Uploaded => Stage::Uploaded,
                };
            }
        }
        RegistryCommand::Clear => registry.records.clear(),
    }
    registry
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from a command log.
    pub fn replay(commands: impl IntoIterator<Item = RegistryCommand>) -> Self {
        commands.into_iter().fold(Self::new(), transition)
    }

    pub fn dispatch(&mut self, command: RegistryCommand) {
        let current = std::mem::take(self);
        *self = transition(current, command);
    }

    pub fn add(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> FileId {
        let (id, command) = RegistryCommand::add(name, bytes);
        self.dispatch(command);
        id
    }

    pub fn remove(&mut self, id: FileId) {
        self.dispatch(RegistryCommand::Remove(id));
    }

    pub fn mark_anonymized(&mut self, id: FileId, result: Vec<u8>) {
        self.dispatch(RegistryCommand::MarkAnonymized { id, result });
    }

    pub fn mark_downloaded(&mut self, id: FileId) {
        self.dispatch(RegistryCommand::MarkDownloaded(id));
    }

    pub fn clear(&mut self) {
        self.dispatch(RegistryCommand::Clear);
    }

    pub fn get(&self, id: FileId) -> Option<&FileRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    fn get_mut(&mut self, id: FileId) -> Option<&mut FileRecord> {
        self.records.iter_mut().find(|record| record.id == id)
    }

    pub fn status(&self, id: FileId) -> Option<FileStatus> {
        self.get(id).map(FileRecord::status)
    }

    /// Records in insertion (display) order.
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn ids(&self) -> Vec<FileId> {
        self.records.iter().map(FileRecord::id).collect()
    }

    pub fn ids_with_status(&self, status: FileStatus) -> Vec<FileId> {
        self.records
            .iter()
            .filter(|record| record.status() == status)
            .map(FileRecord::id)
            .collect()
    }

    /// Narrows `selected` to existing records in `status`, keeping selection order and dropping repeats.
    pub fn select(&self, selected: &[FileId], status: FileStatus) -> Vec<FileId> {
        let mut picked: Vec<FileId> = Vec::with_capacity(selected.len());
        for id in selected {
            if self.status(*id) == Some(status) && !picked.contains(id) {
                picked.push(*id);
            }
        }
        picked
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
