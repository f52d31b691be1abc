//! Lazy semantic filtering over heterogeneous datasets.
//!
//! A [`DatasetHandle`] accumulates natural-language predicates without doing
//! any work. [`DatasetHandle::expand`] then translates the whole predicate
//! list into one filter per dataset, pushes it down to the dataset's reader
//! (a SQL `WHERE` clause for relational tables, a row filter for file
//! collections) and wraps every surviving row in an [`EnvelopeRecord`].

pub mod catalog;
pub mod classify;
pub mod descriptor;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod handle;
pub mod model;
pub mod predicate;
pub mod probe;
pub mod reader;
pub mod result;
pub mod schema;
pub mod translate;

pub use catalog::Catalog;
pub use classify::{Classifier, LlmClassifier};
pub use descriptor::{
    Attribute, BackendKind, ContentHandle, DatasetDescriptor, DescriptorRecord, FileObject,
};
pub use engine::{ExpandOptions, ExpandOptionsBuilder, ExpansionEngine, ReadFailurePolicy};
pub use envelope::EnvelopeRecord;
pub use error::{
    CatalogError, ClassifyError, Error, ModelError, ProbeError, ReadError, Result, TranslateError,
};
pub use handle::{DatasetHandle, Discovery};
pub use model::CompletionModel;
#[cfg(feature = "ollama")]
pub use model::{OllamaConfig, OllamaModel};
pub use predicate::{Predicate, PredicateList};
pub use probe::{BackendProbe, ClassifierProbe, ExistenceProbe, MetadataProbe};
pub use reader::{
    BackendReader, DatasetReader, FileFormat, FileReader, Record, RecordStream, SqlReader,
};
pub use result::{Expanded, SkippedDataset};
pub use schema::{ColumnDescription, SchemaDescription};
pub use translate::{FilterExpr, LlmTranslator, PassthroughTranslator, QueryTranslator};
