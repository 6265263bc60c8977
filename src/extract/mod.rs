pub mod csv;
pub mod excel;
pub mod pdf;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::error::ImportError;
use crate::model::IncomingRow;

/// Side-channel handles for one extraction run. The progress callback is
/// invoked synchronously per unit of work and must not block; `total` is
/// -1 for streaming sources whose size is unknown up front. Cancellation
/// is cooperative, checked before each page/row.
#[derive(Default, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub progress: Option<&'a dyn Fn(i64, i64)>,
    pub cancel: Option<&'a AtomicBool>,
}

impl ExtractContext<'_> {
    pub fn report(&self, current: i64, total: i64) {
        if let Some(callback) = self.progress {
            callback(current, total);
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if let Some(flag) = self.cancel
            && flag.load(Ordering::Relaxed)
        {
            return Err(ImportError::Cancelled.into());
        }
        Ok(())
    }
}

/// What one extraction run produced: the normalized rows plus the
/// bookkeeping the run manifest records.
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub rows: Vec<IncomingRow>,
    /// Dominant source country across the extracted rows.
    pub country: String,
    /// Batch validity instant; `None` when the source carries none.
    pub cutoff: Option<DateTime<Utc>>,
    pub pages_processed: usize,
    pub rows_skipped: usize,
    pub warnings: Vec<String>,
}

/// One capability, three stateless implementations, selected by the
/// caller from the source file type.
pub trait RosterExtractor {
    fn extract(&self, source: &Path, context: &ExtractContext) -> Result<ExtractOutcome>;
}

pub(crate) fn majority_country(rows: &[IncomingRow]) -> String {
    let mut counts = HashMap::<&str, usize>::new();
    for row in rows {
        if !row.country.is_empty() {
            *counts.entry(row.country.as_str()).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(country, _)| country.to_string())
        .unwrap_or_default()
}
