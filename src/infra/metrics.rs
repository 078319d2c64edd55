// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends evaluation metrics to a CSV file, one row per
// (epoch, dataset, metric):
//
//   epoch,dataset,metric,value
//   1,train,exact_match,0.200000
//   1,dev,exact_match,0.000000
//   1,dev,f1,0.133333
//
// Several evaluators may share one file; each append opens it
// fresh, so clones of the logger can be handed out freely.

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "epoch,dataset,metric,value";

#[derive(Debug, Clone)]
pub struct MetricsCsv {
    csv_path: PathBuf,
}

impl MetricsCsv {
    /// Create the logger, writing the CSV header if the file is new
    /// so repeated runs append to one log.
    pub fn new(csv_path: impl AsRef<Path>) -> Result<Self> {
        let csv_path = csv_path.as_ref().to_path_buf();
        if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one row per metric.
    pub fn append(&self, epoch: usize, dataset: &str, metrics: &[(&str, f64)]) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        for (metric, value) in metrics {
            writeln!(f, "{epoch},{dataset},{metric},{value:.6}")?;
        }
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_appended_per_metric() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("metrics.csv");
        let csv  = MetricsCsv::new(&path).unwrap();

        csv.append(1, "dev", &[("accuracy", 0.5), ("macro_f1", 0.25)]).unwrap();
        csv.clone().append(2, "test", &[("accuracy", 1.0)]).unwrap();

        let text = fs::read_to_string(csv.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                HEADER,
                "1,dev,accuracy,0.500000",
                "1,dev,macro_f1,0.250000",
                "2,test,accuracy,1.000000",
            ]
        );
    }

    #[test]
    fn test_existing_log_is_appended_not_truncated() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        MetricsCsv::new(&path).unwrap().append(1, "dev", &[("f1", 1.0)]).unwrap();
        MetricsCsv::new(&path).unwrap().append(1, "dev", &[("f1", 0.5)]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
