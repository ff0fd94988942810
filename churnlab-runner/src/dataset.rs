//! Dataset assembly: entities → point-in-time features → labels.
//!
//! Two variants share the same entity and feature steps:
//! - training: labels are required and the inner join must be non-empty;
//! - monitoring: labels are optional, an empty label set yields features only.
//!
//! Assembled frames are sorted by `(user_id, event_timestamp)` so the same
//! as-of slice always hashes and splits the same way.

use chrono::NaiveDate;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use churnlab_core::domain::DatasetHash;
use churnlab_core::export::{write_parquet, ExportError};
use churnlab_core::features::{FeatureError, FeatureRef, FeatureStore};
use churnlab_core::frame::FeatureFrame;
use churnlab_core::store::{AppliedAlignment, LabelAlignment, SnapshotStore, StoreError};

use crate::config::PipelineConfig;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("labels table has no rows for as_of={as_of} (alignment {alignment})")]
    NoLabels {
        as_of: NaiveDate,
        alignment: LabelAlignment,
    },

    #[error("dataset empty after merging features and labels at as_of={as_of}")]
    EmptyAfterMerge { as_of: NaiveDate },
}

/// One assembled as-of slice.
#[derive(Debug, Clone)]
pub struct AssembledDataset {
    pub as_of: NaiveDate,
    pub frame: FeatureFrame,
    /// `None` when no labels were joined (monitoring, features only).
    pub alignment: Option<AppliedAlignment>,
    pub dataset_hash: DatasetHash,
    pub entity_count: usize,
}

impl AssembledDataset {
    pub fn has_labels(&self) -> bool {
        self.alignment.is_some()
    }
}

/// Builds as-of slices from the snapshot store and a feature store.
pub struct DatasetAssembler<'a> {
    store: &'a SnapshotStore,
    features: &'a dyn FeatureStore,
    refs: &'a [FeatureRef],
    alignment: LabelAlignment,
    label_column: &'a str,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(
        store: &'a SnapshotStore,
        features: &'a dyn FeatureStore,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            store,
            features,
            refs: &config.features.refs,
            alignment: config.labels.alignment,
            label_column: &config.labels.column,
        }
    }

    /// Features joined with labels. Fatal when the snapshot, the label set
    /// or the join is empty.
    pub fn training(&self, as_of: NaiveDate) -> Result<AssembledDataset, DatasetError> {
        let (features, entity_count) = self.features_at(as_of)?;
        let labels = self.store.fetch_labels(as_of, self.alignment)?;
        if labels.is_empty() {
            return Err(DatasetError::NoLabels {
                as_of,
                alignment: self.alignment,
            });
        }

        let frame = features
            .inner_join_labels(&labels.rows, self.label_column)
            .sorted_by_key();
        if frame.is_empty() {
            return Err(DatasetError::EmptyAfterMerge { as_of });
        }
        info!(
            %as_of,
            rows = frame.len(),
            entities = entity_count,
            alignment = %labels.alignment_used,
            "training dataset assembled"
        );
        Ok(Self::finish(as_of, frame, Some(labels.alignment_used), entity_count))
    }

    /// Features, joined with labels when any exist for `as_of`.
    pub fn monitoring(&self, as_of: NaiveDate) -> Result<AssembledDataset, DatasetError> {
        let (features, entity_count) = self.features_at(as_of)?;
        let labels = self.store.fetch_labels(as_of, self.alignment)?;
        if labels.is_empty() {
            warn!(%as_of, "no labels available; monitoring on features only");
            return Ok(Self::finish(as_of, features.sorted_by_key(), None, entity_count));
        }

        let frame = features
            .inner_join_labels(&labels.rows, self.label_column)
            .sorted_by_key();
        if frame.is_empty() {
            return Err(DatasetError::EmptyAfterMerge { as_of });
        }
        info!(%as_of, rows = frame.len(), alignment = %labels.alignment_used, "monitoring dataset assembled");
        Ok(Self::finish(as_of, frame, Some(labels.alignment_used), entity_count))
    }

    fn features_at(&self, as_of: NaiveDate) -> Result<(FeatureFrame, usize), DatasetError> {
        let entities = self.store.fetch_entities(as_of)?;
        let frame = self.features.get_historical_features(&entities, self.refs)?;
        Ok((frame, entities.len()))
    }

    fn finish(
        as_of: NaiveDate,
        frame: FeatureFrame,
        alignment: Option<AppliedAlignment>,
        entity_count: usize,
    ) -> AssembledDataset {
        let dataset_hash = frame.fingerprint();
        AssembledDataset {
            as_of,
            frame,
            alignment,
            dataset_hash,
            entity_count,
        }
    }
}

/// Write an assembled dataset to Parquet for offline inspection.
pub fn export_parquet(dataset: &AssembledDataset, path: &Path) -> Result<usize, DatasetError> {
    let rows = write_parquet(&dataset.frame, path)?;
    info!(path = %path.display(), rows, hash = dataset.dataset_hash.short(), "dataset exported");
    Ok(rows)
}
