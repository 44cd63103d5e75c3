use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::models::Verdict;
use crate::strategy::Strategy;

/// Per-symbol research dataset, one pipe-delimited row per closed candle
///
/// The header is `Timestamp|Close` followed by each active strategy's
/// columns in activation order. A strategy that had insufficient history
/// for a tick contributes blank cells so the column layout never shifts.
pub struct DatasetWriter {
    writer: Option<csv::Writer<fs::File>>,
    column_counts: Vec<usize>,
    path: Option<PathBuf>,
}

impl DatasetWriter {
    pub fn create(dir: &Path, symbol: &str, strategies: &[Box<dyn Strategy>]) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating dataset directory {}", dir.display()))?;
        let path = dir.join(format!(
            "{}_{}_dataset.csv",
            symbol,
            Utc::now().format("%Y%m%d%H%M%S")
        ));

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'|')
            .from_path(&path)
            .with_context(|| format!("creating dataset file {}", path.display()))?;

        let mut header = vec!["Timestamp", "Close"];
        for strategy in strategies {
            header.extend_from_slice(strategy.columns());
        }
        writer.write_record(&header).context("writing dataset header")?;
        writer.flush().context("flushing dataset header")?;

        info!(symbol, path = %path.display(), "dataset file created");
        Ok(Self {
            writer: Some(writer),
            column_counts: strategies.iter().map(|s| s.columns().len()).collect(),
            path: Some(path),
        })
    }

    /// Logger that prints rows instead of writing a file, for dry runs
    pub fn disabled(strategies: &[Box<dyn Strategy>]) -> Self {
        Self {
            writer: None,
            column_counts: strategies.iter().map(|s| s.columns().len()).collect(),
            path: None,
        }
    }

    /// Append one tick. `verdicts` follows the activation order used at
    /// construction.
    pub fn record(
        &mut self,
        timestamp: DateTime<Utc>,
        close: f64,
        verdicts: &[Verdict],
    ) -> Result<()> {
        let mut row = vec![timestamp.to_rfc3339(), close.to_string()];
        for (verdict, count) in verdicts.iter().zip(&self.column_counts) {
            if verdict.metrics.is_empty() {
                row.extend(std::iter::repeat(String::new()).take(*count));
            } else {
                row.extend(verdict.metrics.iter().map(|(_, value)| value.clone()));
            }
        }

        match &mut self.writer {
            Some(writer) => writer.write_record(&row).context("writing dataset row")?,
            None => info!(row = %row.join("|"), "dataset row"),
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush().context("flushing dataset file")?;
        }
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
