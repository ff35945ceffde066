//
// lib.rs
// dicom-veil
//
// Exposes the anonymization core (dictionary, profile, registry, orchestrator, exporter) and the CLI entry point.
//

pub mod cli;
pub mod codec;
pub mod config;
pub mod dicom_access;
pub mod dicom_codec;
pub mod dictionary;
pub mod error;
pub mod exporter;
pub mod intake;
pub mod logging;
pub mod orchestrator;
pub mod profile;
pub mod registry;
pub mod session;
pub mod storage;

pub use cli::{run as run_cli, Cli, Commands};
pub use error::{Result, VeilError};
