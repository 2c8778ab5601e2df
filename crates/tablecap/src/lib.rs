//! Tablecap: incremental capture of dynamically rendered tables.
//!
//! The capture loop repeatedly snapshots what is rendered, keeps only rows
//! it has not seen before, extracts one record per new row, and then reveals
//! more rows (scroll or "show all"). The browser is abstracted behind the
//! [`LiveDocument`], [`PageControl`] and [`Settle`] capabilities.

pub mod capture;
pub mod document;
pub mod extract;
pub mod identity;
pub mod loader;
pub mod snapshot;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{
    run_capture, CaptureEnv, CaptureOutcome, CapturePlan, CaptureSession, CaptureState,
    CycleReport,
};
pub use document::{
    ControlTarget, LiveDocument, Locator, PageControl, Read, ScrollAmount, Settle, Step,
    TokioSettle,
};
pub use extract::{
    clean_numeric, parse_magnitude, parse_percent, ColumnSpec, FieldExtractor, FieldKind,
    LocatorExtractor,
};
pub use identity::{identity, RowIdentity, SeenSet};
pub use loader::{LoaderContext, LoaderMode, ProgressiveLoader, SettlePolicy, DEFAULT_SETTLE_MS};
pub use snapshot::{capture_new_rows, ColumnSet};
pub use types::*;
