use std::sync::Arc;

use futures_util::{
    StreamExt, TryStreamExt, future,
    stream::{self, BoxStream},
};
use tracing::{debug, info, warn};

use crate::{
    descriptor::DatasetDescriptor,
    envelope::EnvelopeRecord,
    error::{Error, Result},
    predicate::{Predicate, PredicateList},
    reader::DatasetReader,
    result::{Expanded, SkippedDataset},
    translate::{FilterExpr, QueryTranslator},
};

/// What `expand` does when a dataset cannot be read
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReadFailurePolicy {
    /// Fail the whole expansion
    #[default]
    Abort,
    /// Leave the dataset out and record it in [`Expanded::skipped`]
    Skip,
}

/// Options for controlling expansion
#[derive(Clone, Debug)]
pub struct ExpandOptions {
    max_concurrency: usize,
    read_failure: ReadFailurePolicy,
}

impl ExpandOptions {
    /// Create a new builder for ExpandOptions
    ///
    /// # Example
    /// ```
    /// use sift::{ExpandOptions, ReadFailurePolicy};
    ///
    /// let options = ExpandOptions::builder()
    ///     .max_concurrency(4)
    ///     .read_failure(ReadFailurePolicy::Skip)
    ///     .build();
    /// assert_eq!(options.max_concurrency(), 4);
    /// ```
    pub fn builder() -> ExpandOptionsBuilder {
        ExpandOptionsBuilder::default()
    }

    /// Number of datasets expanded at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Get the policy for datasets that cannot be read
    pub fn read_failure(&self) -> ReadFailurePolicy {
        self.read_failure
    }
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            read_failure: ReadFailurePolicy::Abort,
        }
    }
}

/// Builder for ExpandOptions
#[derive(Clone, Debug, Default)]
pub struct ExpandOptionsBuilder {
    max_concurrency: Option<usize>,
    read_failure: Option<ReadFailurePolicy>,
}

impl ExpandOptionsBuilder {
    /// Datasets in flight at once (default: 1, minimum: 1)
    ///
    /// Output order always follows the dataset collection, whatever order
    /// the reads complete in.
    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.max_concurrency = Some(value);
        self
    }

    /// Policy for unreadable datasets (default: [`ReadFailurePolicy::Abort`])
    ///
    /// Translation failures abort regardless of this setting.
    pub fn read_failure(mut self, value: ReadFailurePolicy) -> Self {
        self.read_failure = Some(value);
        self
    }

    pub fn build(self) -> ExpandOptions {
        ExpandOptions {
            max_concurrency: self.max_concurrency.unwrap_or(1).max(1),
            read_failure: self.read_failure.unwrap_or_default(),
        }
    }
}

/// Resolves a predicate list into a pushed-down read for each dataset and
/// wraps what comes back into envelopes.
///
/// Nothing is cached: each call translates and reads again.
#[derive(Clone)]
pub struct ExpansionEngine {
    translator: Arc<dyn QueryTranslator>,
    reader: Arc<dyn DatasetReader>,
    options: ExpandOptions,
}

impl ExpansionEngine {
    /// Create an engine with the default [`ExpandOptions`]
    pub fn new(translator: Arc<dyn QueryTranslator>, reader: Arc<dyn DatasetReader>) -> Self {
        Self {
            translator,
            reader,
            options: ExpandOptions::default(),
        }
    }

    /// Replace the expansion options
    pub fn with_options(self, options: ExpandOptions) -> Self {
        Self { options, ..self }
    }

    pub fn options(&self) -> &ExpandOptions {
        &self.options
    }

    /// Get the reader every dataset is read through
    pub fn reader(&self) -> &Arc<dyn DatasetReader> {
        &self.reader
    }

    /// Get the translator turning predicate lists into filters
    pub fn translator(&self) -> &Arc<dyn QueryTranslator> {
        &self.translator
    }

    /// Filter to push down for `descriptor`, or `None` for an unfiltered read.
    ///
    /// The translator is only consulted when there is something to translate.
    pub async fn resolve_filter(
        &self,
        descriptor: &DatasetDescriptor,
        predicates: &[Predicate],
    ) -> Result<Option<FilterExpr>> {
        if predicates.is_empty() {
            return Ok(None);
        }

        let schema = self
            .reader
            .schema(descriptor)
            .await
            .map_err(|source| Error::Read {
                dataset: descriptor.id().to_string(),
                source,
            })?;
        let filter = self
            .translator
            .translate(predicates, &schema)
            .await
            .map_err(|source| Error::Translation {
                dataset: descriptor.id().to_string(),
                source,
            })?;
        debug!(
            dataset = descriptor.id(),
            predicates = predicates.len(),
            %filter,
            "translated predicates"
        );
        Ok(Some(filter))
    }

    /// Lazily read one dataset as envelopes, in reader order
    pub async fn expand_descriptor(
        &self,
        descriptor: &DatasetDescriptor,
        predicates: &[Predicate],
    ) -> Result<BoxStream<'static, Result<EnvelopeRecord>>> {
        let filter = self.resolve_filter(descriptor, predicates).await?;
        let records = self
            .reader
            .read(descriptor, filter.as_ref())
            .await
            .map_err(|source| Error::Read {
                dataset: descriptor.id().to_string(),
                source,
            })?;

        let descriptor = descriptor.clone();
        Ok(records
            .map(move |record| match record {
                Ok(record) => Ok(EnvelopeRecord::new(&descriptor, record)),
                Err(source) => Err(Error::Read {
                    dataset: descriptor.id().to_string(),
                    source,
                }),
            })
            .boxed())
    }

    async fn collect_descriptor(
        &self,
        descriptor: &DatasetDescriptor,
        predicates: &[Predicate],
    ) -> Result<Vec<EnvelopeRecord>> {
        self.expand_descriptor(descriptor, predicates)
            .await?
            .try_collect()
            .await
    }

    /// Expand every dataset and concatenate the envelopes in collection order.
    pub async fn expand(
        &self,
        datasets: &[DatasetDescriptor],
        predicates: &PredicateList,
    ) -> Result<Expanded> {
        let predicates = predicates.to_vec();
        let mut outcomes = stream::iter(datasets.iter())
            .map(|descriptor| {
                let predicates = &predicates;
                async move {
                    let outcome = self.collect_descriptor(descriptor, predicates).await;
                    (descriptor, outcome)
                }
            })
            .buffered(self.options.max_concurrency);

        let mut expanded = Expanded::default();
        while let Some((descriptor, outcome)) = outcomes.next().await {
            match outcome {
                Ok(records) => expanded.push_records(records),
                Err(Error::Read { dataset, source })
                    if self.options.read_failure == ReadFailurePolicy::Skip =>
                {
                    warn!(dataset = %dataset, error = %source, "skipping unreadable dataset");
                    expanded.push_skipped(SkippedDataset::new(descriptor, source));
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            datasets = datasets.len(),
            predicates = predicates.len(),
            records = expanded.len(),
            skipped = expanded.skipped().len(),
            "expanded datasets"
        );
        Ok(expanded)
    }

    /// Lazy variant of [`ExpansionEngine::expand`]: datasets are read one after
    /// another as the stream is polled.
    ///
    /// Under [`ReadFailurePolicy::Abort`] the first error ends the stream.
    /// Under [`ReadFailurePolicy::Skip`] a read failure only ends the failing
    /// dataset's part of the stream and is logged; records it already yielded
    /// stay yielded. Translation failures end the stream either way.
    pub fn stream(
        &self,
        datasets: Arc<[DatasetDescriptor]>,
        predicates: &PredicateList,
    ) -> BoxStream<'static, Result<EnvelopeRecord>> {
        let engine = self.clone();
        let predicates: Arc<[Predicate]> = predicates.to_vec().into();
        let skip = self.options.read_failure == ReadFailurePolicy::Skip;
        let count = datasets.len();
        stream::iter(0..count)
            .then(move |idx| {
                let engine = engine.clone();
                let datasets = datasets.clone();
                let predicates = predicates.clone();
                async move {
                    match engine.expand_descriptor(&datasets[idx], &predicates).await {
                        Ok(records) if skip => Ok(end_on_read_failure(records)),
                        Err(Error::Read { dataset, source }) if skip => {
                            warn!(dataset = %dataset, error = %source, "skipping unreadable dataset");
                            Ok(stream::empty().boxed())
                        }
                        other => other,
                    }
                }
            })
            .try_flatten()
            .boxed()
    }
}

/// Stop a dataset's envelope stream at its first read failure
fn end_on_read_failure(
    records: BoxStream<'static, Result<EnvelopeRecord>>,
) -> BoxStream<'static, Result<EnvelopeRecord>> {
    records
        .scan((), |_, record| {
            future::ready(match record {
                Err(Error::Read { dataset, source }) => {
                    warn!(dataset = %dataset, error = %source, "dataset failed mid-read, skipping rest");
                    None
                }
                other => Some(other),
            })
        })
        .boxed()
}
