//! Row snapshot capture: turn the currently rendered rows into new records.

use std::sync::Arc;

use crate::document::LiveDocument;
use crate::extract::ColumnSpec;
use crate::identity::{identity, SeenSet};
use crate::types::{CaptureResult, FieldValue, Record, RecordBatch, RowScope, Schema};

/// The ordered columns of one session, with their shared schema.
#[derive(Debug, Clone)]
pub struct ColumnSet {
    schema: Arc<Schema>,
    specs: Vec<ColumnSpec>,
}

impl ColumnSet {
    /// Validate names (non-empty, unique) and fix the column order.
    pub fn new(specs: Vec<ColumnSpec>) -> CaptureResult<Self> {
        let schema = Schema::new(specs.iter().map(|c| c.name.clone()))?;
        Ok(Self {
            schema: Arc::new(schema),
            specs,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn specs(&self) -> &[ColumnSpec] {
        &self.specs
    }
}

/// Capture every rendered row in `scope` whose identity is not yet in `seen`.
///
/// Records come back in document order. Each new identity is added to `seen`
/// as its record is built; a row repeated within the same snapshot is
/// therefore captured once. A row missing a required column (a header row,
/// say) is dropped without being marked seen. The document is only read.
pub async fn capture_new_rows(
    document: &dyn LiveDocument,
    scope: &RowScope,
    columns: &ColumnSet,
    seen: &mut SeenSet,
) -> CaptureResult<RecordBatch> {
    let rows = document.rows(scope).await?;
    let mut batch = RecordBatch::new();
    let mut duplicates = 0usize;
    let mut filtered = 0usize;

    for row in &rows {
        let key = match identity(document, row).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Skipping row {}: cannot read identity: {e}", row.index());
                continue;
            }
        };
        if seen.contains(&key) {
            duplicates += 1;
            continue;
        }

        let mut values: Vec<FieldValue> = Vec::with_capacity(columns.specs.len());
        for column in &columns.specs {
            values.push(column.extractor.extract(document, row).await);
        }
        let missing_required = columns
            .specs
            .iter()
            .zip(&values)
            .find(|(spec, value)| spec.required && !value.is_available());
        if let Some((spec, _)) = missing_required {
            tracing::debug!(
                "Row {} ({key}): required column {} unavailable, skipped",
                row.index(),
                spec.name
            );
            filtered += 1;
            continue;
        }

        let unavailable = values.iter().filter(|v| !v.is_available()).count();
        if unavailable > 0 {
            tracing::debug!(
                "Row {} ({key}): {unavailable}/{} fields unavailable",
                row.index(),
                values.len()
            );
        }

        batch.push(Record::new(Arc::clone(&columns.schema), values)?);
        seen.insert(key);
    }

    tracing::debug!(
        "Snapshot: {} rendered, {} new, {duplicates} already seen, {filtered} filtered",
        rows.len(),
        batch.len()
    );
    Ok(batch)
}
