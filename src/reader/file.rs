use std::{fmt, io::Cursor, sync::Arc};

use arrow::{
    array::RecordBatch,
    csv::{self, reader::Format},
    json::{self, reader::infer_json_schema_from_iterator},
};
use arrow_schema::{ArrowError, SchemaRef};
use async_trait::async_trait;
use datafusion::prelude::SessionContext;
use futures_util::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use parquet::arrow::{
    ParquetRecordBatchStreamBuilder, ProjectionMask, arrow_reader::RowFilter,
};
use serde_json::Value;
use tokio::fs::File;
use tracing::debug;

use super::{DatasetReader, RecordStream, into_record_stream, predicate::SqlPredicate};
use crate::{
    descriptor::{ContentHandle, DatasetDescriptor, FileObject},
    error::ReadError,
    schema::SchemaDescription,
    translate::FilterExpr,
};

const DEFAULT_BATCH_SIZE: usize = 1024;

type BatchStream = BoxStream<'static, Result<RecordBatch, ReadError>>;

/// Encoding of one file in a collection
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FileFormat {
    Parquet,
    /// Comma-separated values with a header row
    Csv,
    /// A JSON array of objects, or newline-delimited objects
    Json,
}

impl FileFormat {
    /// Detect the format from the declared encoding, or from the file
    /// extension when no encoding is declared.
    pub fn detect(file: &FileObject) -> Option<Self> {
        let encoding = file.encoding_format.to_ascii_lowercase();
        if encoding.is_empty() {
            let extension = file.path.extension()?.to_str()?.to_ascii_lowercase();
            return match extension.as_str() {
                "parquet" => Some(FileFormat::Parquet),
                "csv" => Some(FileFormat::Csv),
                "json" | "jsonl" | "ndjson" => Some(FileFormat::Json),
                _ => None,
            };
        }
        if encoding.contains("parquet") {
            Some(FileFormat::Parquet)
        } else if encoding.contains("csv") {
            Some(FileFormat::Csv)
        } else if encoding.contains("json") {
            Some(FileFormat::Json)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Parquet => "parquet",
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scan of a single Parquet file.
///
/// Filters are installed as a Parquet row filter, so rows are dropped while
/// decoding rather than after the file is materialized.
pub struct ParquetScanBuilder {
    builder: ParquetRecordBatchStreamBuilder<File>,
    ctx: SessionContext,
    filter: Option<FilterExpr>,
    limit: Option<usize>,
    batch_size: usize,
}

impl ParquetScanBuilder {
    /// Open the file at `file.path` and read its footer
    pub async fn open(file: &FileObject, ctx: SessionContext) -> Result<Self, ReadError> {
        let handle = File::open(&file.path).await?;
        let builder = ParquetRecordBatchStreamBuilder::new(handle).await?;
        Ok(Self {
            builder,
            ctx,
            filter: None,
            limit: None,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Only yield rows satisfying `filter`
    pub fn with_filter(self, filter: FilterExpr) -> Self {
        Self {
            filter: Some(filter),
            ..self
        }
    }

    /// Provide a limit to the number of rows to be read
    pub fn with_limit(self, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..self
        }
    }

    /// Set the number of rows per decoded batch
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Returns the arrow [`SchemaRef`] for this parquet file
    pub fn schema(&self) -> &SchemaRef {
        self.builder.schema()
    }

    /// Build the batch stream
    pub fn build(self) -> Result<BatchStream, ReadError> {
        let mut builder = self
            .builder
            .with_batch_size(self.batch_size)
            .with_projection(ProjectionMask::all());

        if let Some(filter) = self.filter {
            let predicate = SqlPredicate::try_new(&self.ctx, &filter, builder.schema())?;
            builder = builder.with_row_filter(RowFilter::new(vec![Box::new(predicate)]));
        }

        if let Some(limit) = self.limit {
            builder = builder.with_limit(limit);
        }

        Ok(builder.build()?.map_err(ReadError::from).boxed())
    }
}

/// A CSV or JSON file decoded into Arrow batches.
///
/// The whole file is decoded in memory with an inferred schema. These formats
/// have no row filter hook, so the filter runs on each decoded batch and
/// rejected rows never become records.
pub struct TextScan {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl TextScan {
    /// Read and decode `file` as CSV or JSON
    pub async fn open(
        file: &FileObject,
        format: FileFormat,
        batch_size: usize,
    ) -> Result<Self, ReadError> {
        let bytes = tokio::fs::read(&file.path).await?;
        match format {
            FileFormat::Csv => Self::decode_csv(bytes, batch_size),
            FileFormat::Json => Self::decode_json(&bytes, batch_size),
            FileFormat::Parquet => Err(ReadError::UnsupportedFormat {
                format: format.to_string(),
                path: file.path.display().to_string(),
            }),
        }
    }

    fn decode_csv(bytes: Vec<u8>, batch_size: usize) -> Result<Self, ReadError> {
        let (schema, _) = Format::default()
            .with_header(true)
            .infer_schema(Cursor::new(&bytes), None)?;
        let schema = Arc::new(schema);
        let batches = csv::ReaderBuilder::new(schema.clone())
            .with_header(true)
            .with_batch_size(batch_size)
            .build(Cursor::new(bytes))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { schema, batches })
    }

    fn decode_json(bytes: &[u8], batch_size: usize) -> Result<Self, ReadError> {
        let rows = json_rows(bytes)?;
        let schema = Arc::new(infer_json_schema_from_iterator(
            rows.iter().map(Ok::<_, ArrowError>),
        )?);
        let mut decoder = json::ReaderBuilder::new(schema.clone())
            .with_batch_size(batch_size)
            .build_decoder()?;
        let mut batches = Vec::new();
        for chunk in rows.chunks(batch_size) {
            decoder.serialize(chunk)?;
            if let Some(batch) = decoder.flush()? {
                batches.push(batch);
            }
        }
        Ok(Self { schema, batches })
    }

    /// Returns the inferred arrow [`SchemaRef`]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Apply `filter` and `limit`, in file order
    pub fn into_batches(
        self,
        ctx: &SessionContext,
        filter: Option<&FilterExpr>,
        limit: Option<usize>,
    ) -> Result<Vec<RecordBatch>, ReadError> {
        let mut predicate = filter
            .map(|filter| SqlPredicate::try_new(ctx, filter, &self.schema))
            .transpose()?;
        let mut remaining = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for batch in self.batches {
            if remaining == 0 {
                break;
            }
            let batch = match predicate.as_mut() {
                Some(predicate) => predicate.filter_batch(&batch)?,
                None => batch,
            };
            let batch = if batch.num_rows() > remaining {
                batch.slice(0, remaining)
            } else {
                batch
            };
            remaining -= batch.num_rows();
            out.push(batch);
        }
        Ok(out)
    }
}

/// Rows of a JSON array document, or of newline-delimited objects
fn json_rows(bytes: &[u8]) -> Result<Vec<Value>, serde_json::Error> {
    let trimmed = bytes.trim_ascii_start();
    if trimmed.starts_with(b"[") {
        return serde_json::from_slice(trimmed);
    }
    serde_json::Deserializer::from_slice(bytes)
        .into_iter::<Value>()
        .collect()
}

/// [`DatasetReader`] for file collections in Parquet, CSV or JSON.
///
/// Files are read in the order the descriptor lists them. Parquet filters run
/// during decode; CSV and JSON filters run on each decoded batch.
#[derive(Clone)]
pub struct FileReader {
    ctx: SessionContext,
    batch_size: usize,
}

impl Default for FileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileReader {
    /// Create a reader with its own session context and the default batch size
    pub fn new() -> Self {
        Self {
            ctx: SessionContext::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Rows per decoded batch (default 1024)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..self
        }
    }

    fn files(descriptor: &DatasetDescriptor) -> Result<Vec<(FileObject, FileFormat)>, ReadError> {
        let ContentHandle::Files { files } = descriptor.content() else {
            return Err(ReadError::UnsupportedBackend {
                kind: descriptor.kind().to_string(),
            });
        };
        if files.is_empty() {
            return Err(ReadError::NoFiles);
        }
        files
            .iter()
            .map(|file| match FileFormat::detect(file) {
                Some(format) => Ok((file.clone(), format)),
                None => Err(ReadError::UnsupportedFormat {
                    format: file.encoding_format.clone(),
                    path: file.path.display().to_string(),
                }),
            })
            .collect()
    }

    async fn scan(
        &self,
        file: &FileObject,
        format: FileFormat,
        filter: Option<FilterExpr>,
        limit: Option<usize>,
    ) -> Result<BatchStream, ReadError> {
        if format != FileFormat::Parquet {
            let scan = TextScan::open(file, format, self.batch_size).await?;
            let batches = scan.into_batches(&self.ctx, filter.as_ref(), limit)?;
            return Ok(stream::iter(batches.into_iter().map(Ok)).boxed());
        }

        let mut scan = ParquetScanBuilder::open(file, self.ctx.clone())
            .await?
            .with_batch_size(self.batch_size);
        if let Some(filter) = filter {
            scan = scan.with_filter(filter);
        }
        if let Some(limit) = limit {
            scan = scan.with_limit(limit);
        }
        scan.build()
    }

    fn scan_all(
        &self,
        files: Vec<(FileObject, FileFormat)>,
        filter: Option<FilterExpr>,
        limit: Option<usize>,
    ) -> BatchStream {
        let reader = self.clone();
        stream::iter(files)
            .then(move |(file, format)| {
                let reader = reader.clone();
                let filter = filter.clone();
                async move { reader.scan(&file, format, filter, limit).await }
            })
            .try_flatten()
            .boxed()
    }
}

#[async_trait]
impl DatasetReader for FileReader {
    async fn schema(&self, descriptor: &DatasetDescriptor) -> Result<SchemaDescription, ReadError> {
        let files = Self::files(descriptor)?;
        let (file, format) = &files[0];
        let schema = match format {
            FileFormat::Parquet => ParquetScanBuilder::open(file, self.ctx.clone())
                .await?
                .schema()
                .clone(),
            FileFormat::Csv | FileFormat::Json => TextScan::open(file, *format, self.batch_size)
                .await?
                .schema()
                .clone(),
        };
        Ok(SchemaDescription::from_arrow(descriptor.id(), &schema))
    }

    async fn read(
        &self,
        descriptor: &DatasetDescriptor,
        filter: Option<&FilterExpr>,
    ) -> Result<RecordStream, ReadError> {
        let files = Self::files(descriptor)?;
        debug!(
            dataset = descriptor.id(),
            files = files.len(),
            filtered = filter.is_some(),
            "scanning file collection"
        );
        Ok(into_record_stream(
            self.scan_all(files, filter.cloned(), None),
        ))
    }

    async fn exists(
        &self,
        descriptor: &DatasetDescriptor,
        filter: &FilterExpr,
    ) -> Result<bool, ReadError> {
        let files = Self::files(descriptor)?;
        let mut batches = self.scan_all(files, Some(filter.clone()), Some(1));
        while let Some(batch) = batches.try_next().await? {
            if batch.num_rows() > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
