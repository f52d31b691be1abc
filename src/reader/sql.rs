use async_trait::async_trait;
use datafusion::{
    common::{TableReference, utils::quote_identifier},
    datasource::TableProvider,
    execution::context::SQLOptions,
    prelude::{DataFrame, SessionContext},
};
use futures_util::TryStreamExt;
use tracing::debug;

use super::{DatasetReader, RecordStream, into_record_stream};
use crate::{
    descriptor::{ContentHandle, DatasetDescriptor},
    error::ReadError,
    schema::SchemaDescription,
    translate::FilterExpr,
};

/// [`DatasetReader`] for relational tables registered in a DataFusion
/// [`SessionContext`].
///
/// Filters are pushed down as the `WHERE` clause of the generated query.
/// Queries run with DDL, DML and statements disabled, so a filter can never
/// change the catalog it reads from.
#[derive(Clone)]
pub struct SqlReader {
    ctx: SessionContext,
}

impl SqlReader {
    /// Create a reader over the tables registered in `ctx`
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// Get the underlying session context
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    fn table(descriptor: &DatasetDescriptor) -> Result<&str, ReadError> {
        match descriptor.content() {
            ContentHandle::Table { table } => Ok(table),
            ContentHandle::Files { .. } => Err(ReadError::UnsupportedBackend {
                kind: descriptor.kind().to_string(),
            }),
        }
    }

    /// Query text for a read of `table`.
    ///
    /// The table name is a single identifier, quoted when it is not a plain
    /// lowercase name, so `-` or `.` in it never change what is read.
    pub fn select(table: &str, filter: Option<&FilterExpr>) -> String {
        let table = quote_identifier(table);
        match filter {
            Some(filter) => format!("SELECT * FROM {table} WHERE {filter}"),
            None => format!("SELECT * FROM {table}"),
        }
    }

    async fn query(&self, sql: &str) -> Result<DataFrame, ReadError> {
        let options = SQLOptions::new()
            .with_allow_ddl(false)
            .with_allow_dml(false)
            .with_allow_statements(false);
        Ok(self.ctx.sql_with_options(sql, options).await?)
    }
}

#[async_trait]
impl DatasetReader for SqlReader {
    async fn schema(&self, descriptor: &DatasetDescriptor) -> Result<SchemaDescription, ReadError> {
        let table = Self::table(descriptor)?;
        let provider = self
            .ctx
            .table_provider(TableReference::bare(table))
            .await?;
        Ok(SchemaDescription::from_arrow(table, provider.schema().as_ref()))
    }

    async fn read(
        &self,
        descriptor: &DatasetDescriptor,
        filter: Option<&FilterExpr>,
    ) -> Result<RecordStream, ReadError> {
        let sql = Self::select(Self::table(descriptor)?, filter);
        debug!(dataset = descriptor.id(), %sql, "querying relational dataset");
        let batches = self.query(&sql).await?.execute_stream().await?;
        Ok(into_record_stream(batches.map_err(ReadError::from)))
    }

    async fn exists(
        &self,
        descriptor: &DatasetDescriptor,
        filter: &FilterExpr,
    ) -> Result<bool, ReadError> {
        let table = quote_identifier(Self::table(descriptor)?);
        let sql = format!("SELECT 1 FROM {table} WHERE {filter} LIMIT 1");
        debug!(dataset = descriptor.id(), %sql, "probing relational dataset");
        let batches = self.query(&sql).await?.collect().await?;
        Ok(batches.iter().any(|batch| batch.num_rows() > 0))
    }
}
