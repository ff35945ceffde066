//
// codec.rs
// dicom-veil
//
// Seam to the byte-level codec: the engine trait, its wire types, and the readiness gate every call goes through.
//

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::dictionary::TagKey;
use crate::error::{Result, VeilError};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode DICOM data: {0}")]
    Decode(String),
    #[error("failed to encode DICOM data: {0}")]
    Encode(String),
    #[error("invalid action payload: {0}")]
    Payload(String),
    #[error("engine initialization failed: {0}")]
    Init(String),
}

/// Operation code understood by the engine (`0 = DELETE`, `1 = UPDATE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OperationType {
    Delete = 0,
    Update = 1,
}

impl From<OperationType> for u8 {
    fn from(value: OperationType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OperationType {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(OperationType::Delete),
            1 => Ok(OperationType::Update),
            other => Err(format!("unknown operation type {}", other)),
        }
    }
}

/// One entry of the flat action list handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecAction {
    pub group: u16,
    pub element: u16,
    pub operationtype: OperationType,
    #[serde(default)]
    pub value: String,
}

pub fn encode_payload(actions: &[CodecAction]) -> Result<String> {
    Ok(serde_json::to_string(actions)?)
}

pub fn decode_payload(payload: &str) -> std::result::Result<Vec<CodecAction>, CodecError> {
    serde_json::from_str(payload).map_err(|e| CodecError::Payload(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagValue {
    pub key: TagKey,
    pub value: Option<String>,
}

/// External engine performing the actual byte-level rewrite.
#[async_trait]
pub trait CodecEngine: Send + Sync + 'static {
    /// One-time handshake; awaited once per session before any other call.
    async fn initialize(&self) -> std::result::Result<(), CodecError>;

    async fn apply_actions(
        &self,
        bytes: &[u8],
        actions: &[CodecAction],
    ) -> std::result::Result<Vec<u8>, CodecError>;

    async fn query_values(
        &self,
        bytes: &[u8],
        keys: &[TagKey],
    ) -> std::result::Result<Vec<TagValue>, CodecError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadyState {
    Pending,
    Ready,
    Failed(String),
}

/// Write side of the readiness flag, owned by the init task.
#[derive(Debug)]
pub struct ReadinessSignal {
    tx: watch::Sender<ReadyState>,
}

impl ReadinessSignal {
    pub fn mark_ready(self) {
        self.tx.send_replace(ReadyState::Ready);
    }

    pub fn mark_failed(self, reason: impl Into<String>) {
        self.tx.send_replace(ReadyState::Failed(reason.into()));
    }
}

/// Read side of the readiness flag. Cheap to clone; every call site holds one.
#[derive(Debug, Clone)]
pub struct CodecReadiness {
    rx: watch::Receiver<ReadyState>,
}

/// Creates a pending readiness flag and the signal that resolves it.
pub fn readiness() -> (ReadinessSignal, CodecReadiness) {
    let (tx, rx) = watch::channel(ReadyState::Pending);
    (ReadinessSignal { tx }, CodecReadiness { rx })
}

impl CodecReadiness {
    /// A flag that is already resolved as ready.
    pub fn ready() -> Self {
        let (signal, readiness) = readiness();
        signal.mark_ready();
        readiness
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.rx.borrow(), ReadyState::Ready)
    }

    /// Suspends until initialization resolves. Fails if it failed or the signal was dropped.
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.rx.clone();
        let state = rx
            .wait_for(|state| *state != ReadyState::Pending)
            .await
            .map_err(|_| VeilError::CodecUnready("initialization was abandoned".into()))?
            .clone();
        match state {
            ReadyState::Ready => Ok(()),
            ReadyState::Failed(reason) => Err(VeilError::CodecUnready(reason)),
            ReadyState::Pending => Err(VeilError::CodecUnready("initialization pending".into())),
        }
    }
}

/// Engine plus its readiness flag. No engine call is issued before the flag resolves as ready.
pub struct Codec<E> {
    engine: Arc<E>,
    readiness: CodecReadiness,
}

impl<E> Clone for Codec<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            readiness: self.readiness.clone(),
        }
    }
}

impl<E: CodecEngine> Codec<E> {
    /// Spawns the one-time initialization task and returns a gated handle immediately.
    pub fn launch(engine: E) -> Self {
        let engine = Arc::new(engine);
        let (signal, readiness) = readiness();
        let init_engine = Arc::clone(&engine);
        tokio::spawn(async move {
            match init_engine.initialize().await {
                Ok(()) => {
                    debug!("codec engine initialized");
                    signal.mark_ready();
                }
                Err(err) => {
                    warn!(error = %err, "codec engine initialization failed");
                    signal.mark_failed(err.to_string());
                }
            }
        });
        Self { engine, readiness }
    }

    /// Wraps an engine with an externally controlled readiness flag.
    pub fn with_readiness(engine: E, readiness: CodecReadiness) -> Self {
        Self {
            engine: Arc::new(engine),
            readiness,
        }
    }

    pub fn readiness(&self) -> &CodecReadiness {
        &self.readiness
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Applies `actions` to one file once the engine is ready. `name` labels the failure.
    pub async fn apply_actions(
        &self,
        name: &str,
        bytes: &[u8],
        actions: &[CodecAction],
    ) -> Result<Vec<u8>> {
        self.readiness.wait().await?;
        self.engine
            .apply_actions(bytes, actions)
            .await
            .map_err(|source| VeilError::CodecFailure {
                name: name.to_string(),
                source,
            })
    }

    pub async fn query_values(
        &self,
        name: &str,
        bytes: &[u8],
        keys: &[TagKey],
    ) -> Result<Vec<TagValue>> {
        self.readiness.wait().await?;
        self.engine
            .query_values(bytes, keys)
            .await
            .map_err(|source| VeilError::CodecFailure {
                name: name.to_string(),
                source,
            })
    }
}
