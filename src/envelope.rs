use serde::{Deserialize, Serialize};

use crate::{
    descriptor::{BackendKind, DatasetDescriptor},
    reader::Record,
};

/// A raw record annotated with the dataset it was read from.
///
/// Field names match the serialized envelope schema
/// (`source_dataset_id`, `source_dataset_desc`, `source_dataset_type`,
/// `record_data`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeRecord {
    source_dataset_id: String,
    source_dataset_desc: String,
    source_dataset_type: BackendKind,
    record_data: Record,
}

impl EnvelopeRecord {
    pub fn new(descriptor: &DatasetDescriptor, record: Record) -> Self {
        Self {
            source_dataset_id: descriptor.id().to_string(),
            source_dataset_desc: descriptor.description().to_string(),
            source_dataset_type: descriptor.kind(),
            record_data: record,
        }
    }

    pub fn source_dataset_id(&self) -> &str {
        &self.source_dataset_id
    }

    pub fn source_dataset_desc(&self) -> &str {
        &self.source_dataset_desc
    }

    pub fn source_dataset_type(&self) -> BackendKind {
        self.source_dataset_type
    }

    pub fn record_data(&self) -> &Record {
        &self.record_data
    }

    pub fn into_record_data(self) -> Record {
        self.record_data
    }
}
