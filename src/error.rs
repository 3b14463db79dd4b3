use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("home directory could not be resolved or is not a directory: {0}")]
    HomeMissing(String),
    #[error("workspace base path missing: {0}")]
    WorkspaceMissing(String),
    #[error("stage `{stage}` requires `{requires}` to have completed in this run")]
    StageOrder {
        stage: &'static str,
        requires: &'static str,
    },
    #[error("refusing to overwrite existing legacy file {}", .0.display())]
    LegacyCollision(PathBuf),
    #[error("legacy reference path {} is occupied by a non-symlink", .0.display())]
    ReferenceOccupied(PathBuf),
    #[error("total isolation requires explicit confirmation (pass --confirm)")]
    IsolationNotConfirmed,
    #[error("config invalid: {0}")]
    InvalidConfig(String),
    #[error("backup snapshot already exists: {}", .0.display())]
    SnapshotExists(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001HomeMissing,
    E002WorkspaceMissing,
    E003StageOrder,
    E004LegacyCollision,
    E005ReferenceOccupied,
    E006IsolationNotConfirmed,
    E007ConfigInvalid,
    E008SnapshotExists,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001HomeMissing => "E001_HOME_MISSING",
            Self::E002WorkspaceMissing => "E002_WORKSPACE_MISSING",
            Self::E003StageOrder => "E003_STAGE_ORDER",
            Self::E004LegacyCollision => "E004_LEGACY_COLLISION",
            Self::E005ReferenceOccupied => "E005_REFERENCE_OCCUPIED",
            Self::E006IsolationNotConfirmed => "E006_ISOLATION_NOT_CONFIRMED",
            Self::E007ConfigInvalid => "E007_CONFIG_INVALID",
            Self::E008SnapshotExists => "E008_SNAPSHOT_EXISTS",
        }
    }
}

impl EnvError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::HomeMissing(_) => ErrorCode::E001HomeMissing,
            Self::WorkspaceMissing(_) => ErrorCode::E002WorkspaceMissing,
            Self::StageOrder { .. } => ErrorCode::E003StageOrder,
            Self::LegacyCollision(_) => ErrorCode::E004LegacyCollision,
            Self::ReferenceOccupied(_) => ErrorCode::E005ReferenceOccupied,
            Self::IsolationNotConfirmed => ErrorCode::E006IsolationNotConfirmed,
            Self::InvalidConfig(_) => ErrorCode::E007ConfigInvalid,
            Self::SnapshotExists(_) => ErrorCode::E008SnapshotExists,
        }
    }
}

/// Best-effort code lookup for an `anyhow` chain, used when rendering
/// the final error line.
pub fn code_of(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<EnvError>())
        .map(EnvError::code)
}
