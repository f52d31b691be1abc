use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::{
    classify::Classifier,
    descriptor::DatasetDescriptor,
    envelope::EnvelopeRecord,
    error::{Error, ReadError, Result},
};

/// A dataset left out of an expansion under [`ReadFailurePolicy::Skip`].
///
/// [`ReadFailurePolicy::Skip`]: crate::ReadFailurePolicy::Skip
#[derive(Clone, Debug)]
pub struct SkippedDataset {
    dataset: String,
    error: Arc<ReadError>,
}

impl SkippedDataset {
    pub(crate) fn new(descriptor: &DatasetDescriptor, error: ReadError) -> Self {
        Self {
            dataset: descriptor.id().to_string(),
            error: Arc::new(error),
        }
    }

    /// Identifier of the dataset that could not be read
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Get the read failure that caused the skip
    pub fn error(&self) -> &ReadError {
        &self.error
    }
}

/// Result of expanding a dataset handle into row-level records.
///
/// Uses an **error accumulation** strategy for read failures when the
/// expansion was configured to skip them: the records that could be read are
/// kept alongside the datasets that could not. This is a terminal stage; it
/// has no predicate list, so further filtering goes through
/// [`Expanded::sem_filter_each`].
#[derive(Clone, Debug, Default)]
pub struct Expanded {
    records: Vec<EnvelopeRecord>,
    skipped: Vec<SkippedDataset>,
}

impl Expanded {
    pub(crate) fn push_records(&mut self, records: Vec<EnvelopeRecord>) {
        self.records.extend(records);
    }

    pub(crate) fn push_skipped(&mut self, skipped: SkippedDataset) {
        self.skipped.push(skipped);
    }

    /// Envelopes in dataset-collection order, reader order within a dataset
    pub fn records(&self) -> &[EnvelopeRecord] {
        &self.records
    }

    /// Take the envelopes, dropping the skip report
    pub fn into_records(self) -> Vec<EnvelopeRecord> {
        self.records
    }

    /// Get the number of envelopes
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no record survived
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Datasets that were skipped because they could not be read
    pub fn skipped(&self) -> &[SkippedDataset] {
        &self.skipped
    }

    /// Check if any dataset was skipped
    pub fn has_skipped(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Filter the materialized records one by one with `classifier`.
    ///
    /// This is the slow path: nothing is pushed down, and the classifier is
    /// called once per record. Prefer [`DatasetHandle::sem_filter`] before
    /// expanding.
    ///
    /// [`DatasetHandle::sem_filter`]: crate::DatasetHandle::sem_filter
    pub async fn sem_filter_each(
        &self,
        condition: &str,
        classifier: &dyn Classifier,
    ) -> Result<Expanded> {
        let mut kept = Vec::new();
        for envelope in &self.records {
            let subject = Value::Object(envelope.record_data().clone());
            let keep = classifier
                .judge(&subject, condition)
                .await
                .map_err(|source| Error::Judge {
                    dataset: envelope.source_dataset_id().to_string(),
                    source,
                })?;
            if keep {
                kept.push(envelope.clone());
            }
        }
        debug!(
            condition,
            judged = self.records.len(),
            kept = kept.len(),
            "filtered materialized records"
        );
        Ok(Expanded {
            records: kept,
            skipped: self.skipped.clone(),
        })
    }
}
