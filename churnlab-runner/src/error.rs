//! Failure causes shared by both controllers.
//!
//! Controllers wrap a [`StageFailure`] together with the stage it happened
//! in, so every fatal error names where the run stopped.

use thiserror::Error;

use churnlab_core::drift::DriftError;
use churnlab_core::model::ModelError;
use churnlab_core::registry::RegistryError;

use crate::dataset::DatasetError;
use crate::reporting::ReportError;
use crate::tracking::TrackingError;

#[derive(Debug, Error)]
pub enum StageFailure {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Drift(#[from] DriftError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    Report(#[from] ReportError),
}
