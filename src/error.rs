use arrow_schema::ArrowError;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Errors surfaced by [`DatasetHandle`](crate::DatasetHandle) operations.
///
/// Every variant names the dataset it happened on. None of these are ever
/// downgraded: a failed translation never turns into an unfiltered read.
#[derive(Debug, Error)]
pub enum Error {
    /// The query translator could not turn the predicate list into a filter
    #[error("failed to translate predicates for dataset '{dataset}': {source}")]
    Translation {
        /// Identifier of the dataset being expanded
        dataset: String,
        #[source]
        source: TranslateError,
    },

    /// The dataset reader could not access the dataset's content
    #[error("failed to read dataset '{dataset}': {source}")]
    Read {
        /// Identifier of the dataset being read
        dataset: String,
        #[source]
        source: ReadError,
    },

    /// The relevance probe used by `find` was unavailable or failed
    #[error("relevance probe failed for dataset '{dataset}': {source}")]
    Probe {
        /// Identifier of the dataset being probed
        dataset: String,
        #[source]
        source: ProbeError,
    },

    /// A per-record judgement failed during post-expansion filtering
    #[error("record judgement failed for a record of dataset '{dataset}': {source}")]
    Judge {
        /// Identifier of the dataset the record came from
        dataset: String,
        #[source]
        source: ClassifyError,
    },

    /// The dataset catalog could not be loaded
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by a [`QueryTranslator`](crate::QueryTranslator)
#[derive(Debug, Error, Clone)]
pub enum TranslateError {
    /// Translation was requested for an empty predicate list
    #[error("no predicates to translate")]
    NoPredicates,

    /// The translator produced an empty filter expression
    #[error("translator produced an empty filter expression")]
    EmptyFilter,

    /// The produced filter is not a valid SQL boolean expression
    #[error("invalid filter expression `{expr}`: {reason}")]
    InvalidFilter {
        /// The rejected expression text
        expr: String,
        /// Parser message
        reason: String,
    },

    /// The backing completion model failed
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors produced by a [`CompletionModel`](crate::CompletionModel)
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    /// Transport-level failure talking to the model service
    #[error("model request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status
    #[error("model service returned status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Body or reason phrase
        message: String,
    },

    /// The response body could not be decoded
    #[error("malformed model response: {0}")]
    Response(String),
}

/// Errors produced by a [`Classifier`](crate::Classifier)
#[derive(Debug, Error, Clone)]
pub enum ClassifyError {
    /// The model answer was neither an affirmative nor a negative
    #[error("unparseable classifier answer: {answer:?}")]
    Unparseable {
        /// Raw answer text
        answer: String,
    },

    /// The backing completion model failed
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors produced by a [`DatasetReader`](crate::DatasetReader)
#[derive(Debug, Error)]
pub enum ReadError {
    /// The descriptor's backend is not served by this reader
    #[error("reader does not support {kind} datasets")]
    UnsupportedBackend {
        /// Backend kind tag of the descriptor
        kind: String,
    },

    /// The file collection lists no readable files
    #[error("file collection has no files")]
    NoFiles,

    /// A file in the collection is in a format the reader cannot decode
    #[error("unsupported file format '{format}' for {path}")]
    UnsupportedFormat {
        /// Declared encoding format
        format: String,
        /// Path of the offending file
        path: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced by a [`MetadataProbe`](crate::MetadataProbe)
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The condition could not be translated for an existence query
    #[error(transparent)]
    Translate(#[from] TranslateError),

    /// The existence query failed
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The metadata classifier failed
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

/// Errors produced while loading a [`Catalog`](crate::Catalog)
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog: {0}")]
    Json(#[from] serde_json::Error),

    /// A dataset node is missing a required attribute
    #[error("dataset node is missing '{field}'")]
    MissingField {
        /// Name of the missing attribute
        field: &'static str,
    },
}
