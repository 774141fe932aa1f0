//! Scalar series logging
//!
//! One CSV file per series under the run's log directory, appended as
//! `step,value` lines so runs can be inspected or plotted without any
//! extra tooling.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends scalar series to per-series CSV files.
pub struct ScalarLogger {
    dir: PathBuf,
}

impl ScalarLogger {
    /// Creates the log directory and a logger writing into it.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// File a series is appended to.
    pub fn series_path(&self, series: &str) -> PathBuf {
        self.dir.join(format!("{series}.csv"))
    }

    /// Appends one `step,value` line to the series file.
    pub fn log(&self, series: &str, step: usize, value: f32) -> Result<()> {
        let path = self.series_path(series);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open scalar log: {}", path.display()))?;
        writeln!(file, "{step},{value}")
            .with_context(|| format!("failed to append to scalar log: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_step_value_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ScalarLogger::create(dir.path().join("run")).unwrap();
        logger.log("shape", 1, 0.5).unwrap();
        logger.log("shape", 2, 0.25).unwrap();

        let contents = fs::read_to_string(logger.series_path("shape")).unwrap();
        assert_eq!(contents, "1,0.5\n2,0.25\n");
    }

    #[test]
    fn test_series_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ScalarLogger::create(dir.path()).unwrap();
        logger.log("shape", 1, 1.0).unwrap();
        logger.log("motion", 1, 2.0).unwrap();

        assert!(logger.series_path("shape").exists());
        assert!(logger.series_path("motion").exists());
        assert_ne!(
            fs::read_to_string(logger.series_path("shape")).unwrap(),
            fs::read_to_string(logger.series_path("motion")).unwrap()
        );
    }

    #[test]
    fn test_series_file_is_named_after_series() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ScalarLogger::create(dir.path()).unwrap();
        for series in ["shape", "motion", "emotion"] {
            logger.log(series, 1, 0.0).unwrap();
            assert!(dir.path().join(format!("{series}.csv")).exists());
        }
    }
}
