use std::sync::Arc;

use futures_util::{
    StreamExt,
    stream::{self, BoxStream},
};
use tracing::debug;

use crate::{
    catalog::Catalog,
    descriptor::{Attribute, DatasetDescriptor, DescriptorRecord},
    engine::ExpansionEngine,
    envelope::EnvelopeRecord,
    error::{Error, Result},
    predicate::{Predicate, PredicateList},
    probe::MetadataProbe,
    result::Expanded,
};

const DEFAULT_DEPENDS_ON: &[Attribute] = &[Attribute::Description];

/// Immutable, chainable view over a collection of datasets.
///
/// `sem_filter` only records a predicate; nothing is read until `expand`,
/// which pushes the whole predicate list down to each dataset's reader.
///
/// ```no_run
/// # async fn run(handle: sift::DatasetHandle) -> sift::Result<()> {
/// let algebra = handle
///     .sem_filter("questions about algebra")
///     .sem_filter("basic level");
/// let records = algebra.expand().await?;
/// println!("{} records", records.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DatasetHandle {
    datasets: Arc<[DatasetDescriptor]>,
    predicates: PredicateList,
    engine: Arc<ExpansionEngine>,
    probe: Arc<dyn MetadataProbe>,
}

impl DatasetHandle {
    /// Create a handle with an empty predicate list
    pub fn new(
        datasets: impl Into<Arc<[DatasetDescriptor]>>,
        engine: ExpansionEngine,
        probe: Arc<dyn MetadataProbe>,
    ) -> Self {
        Self {
            datasets: datasets.into(),
            predicates: PredicateList::new(),
            engine: Arc::new(engine),
            probe,
        }
    }

    /// Create a handle over every dataset of `catalog`
    pub fn from_catalog(
        catalog: Catalog,
        engine: ExpansionEngine,
        probe: Arc<dyn MetadataProbe>,
    ) -> Self {
        Self::new(catalog.into_descriptors(), engine, probe)
    }

    /// The shared dataset collection
    pub fn datasets(&self) -> &Arc<[DatasetDescriptor]> {
        &self.datasets
    }

    /// Predicates accumulated along this handle's chain
    pub fn predicates(&self) -> &PredicateList {
        &self.predicates
    }

    /// Get the engine shared by every handle of this chain
    pub fn engine(&self) -> &ExpansionEngine {
        &self.engine
    }

    /// Return a new handle with `condition` appended to the predicate list.
    ///
    /// Pure: no I/O, and `self` is left untouched.
    pub fn sem_filter(&self, condition: impl Into<Predicate>) -> Self {
        Self {
            datasets: self.datasets.clone(),
            predicates: self.predicates.push(condition),
            engine: self.engine.clone(),
            probe: self.probe.clone(),
        }
    }

    /// Read every dataset, pushing the predicate list down, and collect the
    /// records into envelopes.
    pub async fn expand(&self) -> Result<Expanded> {
        self.engine.expand(&self.datasets, &self.predicates).await
    }

    /// Lazy variant of [`DatasetHandle::expand`].
    ///
    /// Honours the engine's [`ReadFailurePolicy`](crate::ReadFailurePolicy):
    /// under `Skip` an unreadable dataset is logged and left out, but since
    /// nothing is collected it is not reported as skipped. See
    /// [`ExpansionEngine::stream`].
    pub fn expand_stream(&self) -> BoxStream<'static, Result<EnvelopeRecord>> {
        self.engine.stream(self.datasets.clone(), &self.predicates)
    }

    /// Find the datasets whose metadata satisfies `condition`.
    ///
    /// `depends_on` defaults to the description. The result is a different
    /// stage: it cannot be `sem_filter`ed, but [`Discovery::into_handle`]
    /// starts a new chain over the matches. The accumulated predicate list is
    /// not applied here.
    pub async fn find(&self, condition: &str, depends_on: Option<&[Attribute]>) -> Result<Discovery> {
        let depends_on = depends_on.unwrap_or(DEFAULT_DEPENDS_ON);
        let concurrency = self.engine.options().max_concurrency();
        let mut verdicts = stream::iter(self.datasets.iter())
            .map(|descriptor| async move {
                let verdict = self
                    .probe
                    .probe_relevance(descriptor, condition, depends_on)
                    .await;
                (descriptor, verdict)
            })
            .buffered(concurrency);

        let mut matches = Vec::new();
        while let Some((descriptor, verdict)) = verdicts.next().await {
            let relevant = verdict.map_err(|source| Error::Probe {
                dataset: descriptor.id().to_string(),
                source,
            })?;
            if relevant {
                matches.push(descriptor.clone());
            }
        }
        debug!(
            condition,
            probed = self.datasets.len(),
            matched = matches.len(),
            "found datasets"
        );

        Ok(Discovery {
            datasets: matches.into(),
            engine: self.engine.clone(),
            probe: self.probe.clone(),
        })
    }
}

impl std::fmt::Debug for DatasetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetHandle")
            .field("datasets", &self.datasets.len())
            .field("predicates", &self.predicates)
            .finish()
    }
}

/// Datasets selected by [`DatasetHandle::find`], as metadata records.
pub struct Discovery {
    datasets: Arc<[DatasetDescriptor]>,
    engine: Arc<ExpansionEngine>,
    probe: Arc<dyn MetadataProbe>,
}

impl Discovery {
    /// Matching descriptors, in collection order
    pub fn descriptors(&self) -> &[DatasetDescriptor] {
        &self.datasets
    }

    /// Get the number of matching datasets
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Check if no dataset matched
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Identifiers of the matching datasets
    pub fn ids(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.id()).collect()
    }

    /// Metadata records (`id`, `description`, `type`, `content`, `metadata`)
    pub fn records(&self) -> Vec<DescriptorRecord> {
        self.datasets.iter().map(DescriptorRecord::from).collect()
    }

    /// Start a new, empty predicate chain over the matching datasets
    pub fn into_handle(self) -> DatasetHandle {
        DatasetHandle {
            datasets: self.datasets,
            predicates: PredicateList::new(),
            engine: self.engine,
            probe: self.probe,
        }
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery").field("datasets", &self.ids()).finish()
    }
}
