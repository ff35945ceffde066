//
// session.rs
// dicom-veil
//
// One anonymization session: accepted files, the user's profile, and the operations that drive them.
//

use tracing::info;

use crate::codec::{Codec, CodecEngine, TagValue};
use crate::dictionary::TagKey;
use crate::error::{Result, VeilError};
use crate::exporter::{ArtifactSink, ExportOutcome, PackagingExporter};
use crate::intake::{self, IncomingItem, Submission};
use crate::orchestrator::{AnonymizationOrchestrator, BatchReport, BusyIndicator};
use crate::profile::{resolve, AnonymizationProfile, ResolvedAction, TokenGenerator};
use crate::registry::{FileId, FileRegistry, FileStatus};

pub struct Session<E> {
    registry: FileRegistry,
    profile: AnonymizationProfile,
    tokens: TokenGenerator,
    orchestrator: AnonymizationOrchestrator<E>,
    exporter: PackagingExporter,
}

impl<E: CodecEngine> Session<E> {
    pub fn new(codec: Codec<E>, exporter: PackagingExporter) -> Self {
        Self {
            registry: FileRegistry::new(),
            profile: AnonymizationProfile::default(),
            tokens: TokenGenerator::from_entropy(),
            orchestrator: AnonymizationOrchestrator::new(codec, BusyIndicator::new()),
            exporter,
        }
    }

    pub fn with_profile(mut self, profile: AnonymizationProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_tokens(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    pub fn profile(&self) -> &AnonymizationProfile {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut AnonymizationProfile {
        &mut self.profile
    }

    pub fn busy(&self) -> &BusyIndicator {
        self.orchestrator.busy()
    }

    pub fn submit(&mut self, items: impl IntoIterator<Item = IncomingItem>) -> Submission {
        intake::submit(&mut self.registry, items)
    }

    pub fn remove(&mut self, id: FileId) {
        self.registry.remove(id);
    }

    pub fn clear(&mut self) {
        self.registry.clear();
    }

    /// Resolves the current profile; tokens are drawn fresh on every call.
    pub fn resolve_actions(&mut self) -> Vec<ResolvedAction> {
        let tokens = &mut self.tokens;
        resolve(&self.profile, || tokens.next_token())
    }

    pub async fn anonymize(&mut self, selected: &[FileId]) -> Result<BatchReport> {
        let actions = self.resolve_actions();
        self.orchestrator
            .run(&mut self.registry, selected, &actions)
            .await
    }

    pub async fn anonymize_pending(&mut self) -> Result<BatchReport> {
        let pending = self.registry.ids_with_status(FileStatus::Uploaded);
        self.anonymize(&pending).await
    }

    pub async fn export<S: ArtifactSink>(
        &mut self,
        selected: &[FileId],
        sink: &mut S,
    ) -> Result<ExportOutcome> {
        self.exporter.export(&mut self.registry, selected, sink).await
    }

    pub async fn export_ready<S: ArtifactSink>(&mut self, sink: &mut S) -> Result<ExportOutcome> {
        let ready = self.registry.ids_with_status(FileStatus::Anonymized);
        let outcome = self.export(&ready, sink).await?;
        info!(?outcome, "export finished");
        Ok(outcome)
    }

    /// Reads field values from a file's current bytes (result bytes once anonymized).
    pub async fn query(&self, id: FileId, keys: &[TagKey]) -> Result<Vec<TagValue>> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| VeilError::UnknownFile(id.to_string()))?;
        let bytes = record.result_bytes().unwrap_or(record.source_bytes());
        self.orchestrator
            .codec()
            .query_values(record.name(), bytes, keys)
            .await
    }
}
