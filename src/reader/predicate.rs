use std::sync::Arc;

use arrow::{
    array::{AsArray, BooleanArray, RecordBatch},
    compute::filter_record_batch,
};
use arrow_schema::{ArrowError, SchemaRef};
use datafusion::{common::DFSchema, physical_expr::PhysicalExpr, prelude::SessionContext};
use parquet::arrow::{ProjectionMask, arrow_reader::ArrowPredicate};

use crate::{error::ReadError, translate::FilterExpr};

/// [`ArrowPredicate`] evaluating a SQL filter expression during Parquet decode.
///
/// The expression is planned once per file against that file's Arrow schema,
/// then evaluated on every decoded batch. Rows where it is false or null are
/// dropped before they ever become records. Formats without a row filter hook
/// use [`SqlPredicate::filter_batch`] on each decoded batch instead.
pub struct SqlPredicate {
    projection: ProjectionMask,
    expr: Arc<dyn PhysicalExpr>,
}

impl SqlPredicate {
    /// Plan `filter` against `schema`
    pub fn try_new(
        ctx: &SessionContext,
        filter: &FilterExpr,
        schema: &SchemaRef,
    ) -> Result<Self, ReadError> {
        let df_schema = DFSchema::try_from(schema.as_ref().clone())?;
        let logical = ctx.parse_sql_expr(filter.as_str(), &df_schema)?;
        let expr = ctx.create_physical_expr(logical, &df_schema)?;
        Ok(Self {
            projection: ProjectionMask::all(),
            expr,
        })
    }

    /// Keep only the rows of `batch` the expression accepts
    pub fn filter_batch(&mut self, batch: &RecordBatch) -> Result<RecordBatch, ReadError> {
        let mask = self.evaluate(batch.clone())?;
        Ok(filter_record_batch(batch, &mask)?)
    }
}

impl ArrowPredicate for SqlPredicate {
    fn projection(&self) -> &ProjectionMask {
        &self.projection
    }

    fn evaluate(&mut self, batch: RecordBatch) -> Result<BooleanArray, ArrowError> {
        let array = self
            .expr
            .evaluate(&batch)
            .and_then(|value| value.into_array(batch.num_rows()))
            .map_err(|e| ArrowError::ComputeError(e.to_string()))?;
        array.as_boolean_opt().cloned().ok_or_else(|| {
            ArrowError::ComputeError(format!(
                "filter evaluated to {} instead of Boolean",
                array.data_type()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{ArrayRef, Int64Array, StringArray};

    use super::*;

    fn batch() -> RecordBatch {
        RecordBatch::try_from_iter(vec![
            ("id", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
            (
                "subject",
                Arc::new(StringArray::from(vec!["algebra", "geometry", "algebra"])) as ArrayRef,
            ),
        ])
        .unwrap()
    }

    #[test]
    fn evaluates_conjunction() {
        let batch = batch();
        let filter = FilterExpr::parse("subject = 'algebra' AND id > 1").unwrap();
        let mut predicate =
            SqlPredicate::try_new(&SessionContext::new(), &filter, &batch.schema()).unwrap();
        let mask = predicate.evaluate(batch).unwrap();
        assert_eq!(mask, BooleanArray::from(vec![false, false, true]));
    }

    #[test]
    fn filter_batch_keeps_matching_rows() {
        let batch = batch();
        let filter = FilterExpr::parse("subject = 'algebra'").unwrap();
        let mut predicate =
            SqlPredicate::try_new(&SessionContext::new(), &filter, &batch.schema()).unwrap();
        let kept = predicate.filter_batch(&batch).unwrap();
        assert_eq!(kept.num_rows(), 2);
        let ids = kept.column(0).as_primitive::<arrow::datatypes::Int64Type>();
        assert_eq!(ids.values().to_vec(), vec![1, 3]);
    }

    #[test]
    fn unknown_column_fails_planning() {
        let batch = batch();
        let filter = FilterExpr::parse("level = 'basic'").unwrap();
        assert!(SqlPredicate::try_new(&SessionContext::new(), &filter, &batch.schema()).is_err());
    }

    #[test]
    fn non_boolean_expression_is_rejected() {
        let batch = batch();
        let filter = FilterExpr::parse("id + 1").unwrap();
        let mut predicate =
            SqlPredicate::try_new(&SessionContext::new(), &filter, &batch.schema()).unwrap();
        assert!(predicate.evaluate(batch).is_err());
    }
}
