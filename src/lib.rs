//
// lib.rs
// dicom-deident
//
// Exposes the de-identification pipeline, its collaborators and the CLI entry point.
//

// Leaves first: the pipeline module sequences everything above it.
pub mod anonymize;
pub mod audit;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dicom_access;
pub mod digest;
pub mod error;
pub mod event;
pub mod logging;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod storage;
pub mod stores;
pub mod tag;
pub mod value_repr;

#[cfg(test)]
mod fixtures;

pub use cli::{run as run_cli, Cli, Commands};
pub use error::{DeidentError, InvocationError, Stage, StoreError};
pub use pipeline::{Pipeline, PipelineSettings, UnmatchedPolicy};
