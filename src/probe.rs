use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    classify::Classifier,
    descriptor::{Attribute, BackendKind, DatasetDescriptor},
    error::ProbeError,
    predicate::Predicate,
    reader::DatasetReader,
    translate::QueryTranslator,
};

/// Decides whether a dataset is relevant to a metadata-level condition.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// `depends_on` names the descriptor attributes the condition is about.
    async fn probe_relevance(
        &self,
        descriptor: &DatasetDescriptor,
        condition: &str,
        depends_on: &[Attribute],
    ) -> Result<bool, ProbeError>;
}

#[async_trait]
impl<P: MetadataProbe + ?Sized> MetadataProbe for Arc<P> {
    async fn probe_relevance(
        &self,
        descriptor: &DatasetDescriptor,
        condition: &str,
        depends_on: &[Attribute],
    ) -> Result<bool, ProbeError> {
        (**self)
            .probe_relevance(descriptor, condition, depends_on)
            .await
    }
}

/// Minimal-cost existence query: translate the condition for the dataset's
/// schema and ask the reader whether at least one row satisfies it.
///
/// Ignores `depends_on`; the question answered is always "is there a row".
pub struct ExistenceProbe {
    reader: Arc<dyn DatasetReader>,
    translator: Arc<dyn QueryTranslator>,
}

impl ExistenceProbe {
    pub fn new(reader: Arc<dyn DatasetReader>, translator: Arc<dyn QueryTranslator>) -> Self {
        Self { reader, translator }
    }
}

#[async_trait]
impl MetadataProbe for ExistenceProbe {
    async fn probe_relevance(
        &self,
        descriptor: &DatasetDescriptor,
        condition: &str,
        _depends_on: &[Attribute],
    ) -> Result<bool, ProbeError> {
        let schema = self.reader.schema(descriptor).await?;
        let predicates: [Predicate; 1] = [Arc::from(condition)];
        let filter = self.translator.translate(&predicates, &schema).await?;
        let relevant = self.reader.exists(descriptor, &filter).await?;
        debug!(dataset = descriptor.id(), %filter, relevant, "existence probe");
        Ok(relevant)
    }
}

/// Metadata-only judgement: the classifier sees the projected descriptor
/// attributes and nothing of the content.
pub struct ClassifierProbe {
    classifier: Arc<dyn Classifier>,
}

impl ClassifierProbe {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl MetadataProbe for ClassifierProbe {
    async fn probe_relevance(
        &self,
        descriptor: &DatasetDescriptor,
        condition: &str,
        depends_on: &[Attribute],
    ) -> Result<bool, ProbeError> {
        let subject = descriptor.project(depends_on);
        Ok(self.classifier.judge(&subject, condition).await?)
    }
}

/// Existence queries for relational datasets, classifier judgement for
/// file collections.
pub struct BackendProbe {
    relational: ExistenceProbe,
    files: ClassifierProbe,
}

impl BackendProbe {
    pub fn new(relational: ExistenceProbe, files: ClassifierProbe) -> Self {
        Self { relational, files }
    }
}

#[async_trait]
impl MetadataProbe for BackendProbe {
    async fn probe_relevance(
        &self,
        descriptor: &DatasetDescriptor,
        condition: &str,
        depends_on: &[Attribute],
    ) -> Result<bool, ProbeError> {
        match descriptor.kind() {
            BackendKind::RelationalDb => {
                self.relational
                    .probe_relevance(descriptor, condition, depends_on)
                    .await
            }
            BackendKind::FileDataset => {
                self.files
                    .probe_relevance(descriptor, condition, depends_on)
                    .await
            }
        }
    }
}
