use arrow::{
    array::RecordBatch,
    json::{WriterBuilder, writer::JsonArray},
};
use async_trait::async_trait;
use futures_util::{
    Stream, StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use serde_json::{Map, Value};

use crate::{
    descriptor::{BackendKind, DatasetDescriptor},
    error::ReadError,
    schema::SchemaDescription,
    translate::FilterExpr,
};

pub mod file;
pub mod predicate;
pub mod sql;

pub use self::{
    file::{FileFormat, FileReader},
    sql::SqlReader,
};

/// Raw record payload, one row of a dataset
pub type Record = Map<String, Value>;

/// Lazy sequence of raw records
pub type RecordStream = BoxStream<'static, Result<Record, ReadError>>;

/// Produces raw records for a dataset, optionally filtered at the source.
#[async_trait]
pub trait DatasetReader: Send + Sync {
    /// Schema the filter expression will be evaluated against
    async fn schema(&self, descriptor: &DatasetDescriptor) -> Result<SchemaDescription, ReadError>;

    /// Read the dataset. `None` means an unfiltered read.
    async fn read(
        &self,
        descriptor: &DatasetDescriptor,
        filter: Option<&FilterExpr>,
    ) -> Result<RecordStream, ReadError>;

    /// Whether at least one record satisfies `filter`.
    ///
    /// Backends with a cheaper existence query should override this.
    async fn exists(
        &self,
        descriptor: &DatasetDescriptor,
        filter: &FilterExpr,
    ) -> Result<bool, ReadError> {
        let mut records = self.read(descriptor, Some(filter)).await?;
        Ok(records.try_next().await?.is_some())
    }
}

#[async_trait]
impl<R: DatasetReader + ?Sized> DatasetReader for std::sync::Arc<R> {
    async fn schema(&self, descriptor: &DatasetDescriptor) -> Result<SchemaDescription, ReadError> {
        (**self).schema(descriptor).await
    }

    async fn read(
        &self,
        descriptor: &DatasetDescriptor,
        filter: Option<&FilterExpr>,
    ) -> Result<RecordStream, ReadError> {
        (**self).read(descriptor, filter).await
    }

    async fn exists(
        &self,
        descriptor: &DatasetDescriptor,
        filter: &FilterExpr,
    ) -> Result<bool, ReadError> {
        (**self).exists(descriptor, filter).await
    }
}

/// Routes each descriptor to the reader for its backend kind
#[derive(Clone)]
pub struct BackendReader {
    sql: SqlReader,
    files: FileReader,
}

impl BackendReader {
    pub fn new(sql: SqlReader, files: FileReader) -> Self {
        Self { sql, files }
    }

    pub fn sql(&self) -> &SqlReader {
        &self.sql
    }

    pub fn files(&self) -> &FileReader {
        &self.files
    }

    fn route(&self, descriptor: &DatasetDescriptor) -> &dyn DatasetReader {
        match descriptor.kind() {
            BackendKind::RelationalDb => &self.sql,
            BackendKind::FileDataset => &self.files,
        }
    }
}

#[async_trait]
impl DatasetReader for BackendReader {
    async fn schema(&self, descriptor: &DatasetDescriptor) -> Result<SchemaDescription, ReadError> {
        self.route(descriptor).schema(descriptor).await
    }

    async fn read(
        &self,
        descriptor: &DatasetDescriptor,
        filter: Option<&FilterExpr>,
    ) -> Result<RecordStream, ReadError> {
        self.route(descriptor).read(descriptor, filter).await
    }

    async fn exists(
        &self,
        descriptor: &DatasetDescriptor,
        filter: &FilterExpr,
    ) -> Result<bool, ReadError> {
        self.route(descriptor).exists(descriptor, filter).await
    }
}

/// Convert one Arrow batch into JSON-object records, in row order.
///
/// Every column is present in every record; nulls are kept as `null`.
pub(crate) fn batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>, ReadError> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }
    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    writer.write(batch)?;
    writer.finish()?;
    Ok(serde_json::from_slice(&writer.into_inner())?)
}

/// Flatten a stream of batches into a stream of records
pub(crate) fn into_record_stream<S>(batches: S) -> RecordStream
where
    S: Stream<Item = Result<RecordBatch, ReadError>> + Send + 'static,
{
    batches
        .map(|batch| batch.and_then(|batch| batch_to_records(&batch)))
        .map_ok(|rows| stream::iter(rows.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
}
