//! Report directory writer.
//!
//! One directory per run, named `<prefix><workload>_<task>_<timestamp>`:
//!
//! ```text
//! log            run log and per-iteration metrics comparison
//! config.toml    effective run configuration
//! 16_response    hiccup distribution for load 16
//! 16_deadline    deadline distribution for load 16
//! 16_period      period distribution for load 16
//! 16_summary.json
//! ```

use bench_common::config::RunConfig;
use bench_common::error::{BenchError, BenchResult};
use bench_core::report::{IterationReport, ReportSink};
use hdrhistogram::Histogram;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Writes every iteration report of a run into its own directory.
#[derive(Debug)]
pub struct ReportPrinter {
    dir: PathBuf,
    log: BufWriter<File>,
}

impl ReportPrinter {
    /// Create the run directory and its `log` file.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Resource`] if the directory or log cannot be created.
    pub fn create(prefix: &str, workload: &str, task: &str) -> BenchResult<Self> {
        let stamp = humantime::format_rfc3339_seconds(SystemTime::now())
            .to_string()
            .replace(':', "-");
        let dir = PathBuf::from(format!("{prefix}{workload}_{task}_{stamp}"));
        Self::create_in(dir)
    }

    /// Create a printer writing into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Resource`] if the directory or log cannot be created.
    pub fn create_in(dir: PathBuf) -> BenchResult<Self> {
        fs::create_dir_all(&dir).map_err(|e| resource(&dir, &e))?;
        let log_path = dir.join("log");
        let log = File::create(&log_path).map_err(|e| resource(&log_path, &e))?;
        debug!(dir = %dir.display(), "Report directory created");

        Ok(Self {
            dir,
            log: BufWriter::new(log),
        })
    }

    /// Directory the reports are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store the effective run configuration next to the reports.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Resource`] if the file cannot be written.
    pub fn write_config(&self, config: &RunConfig) -> BenchResult<()> {
        let toml = config
            .to_toml()
            .map_err(|e| BenchError::Resource(format!("cannot encode run config: {e}")))?;
        self.write_file("config.toml", &toml)
    }

    fn write_file(&self, name: &str, contents: &str) -> BenchResult<()> {
        let path = self.dir.join(name);
        fs::write(&path, contents).map_err(|e| resource(&path, &e))
    }
}

impl ReportSink for ReportPrinter {
    fn emit(&mut self, report: IterationReport) -> BenchResult<()> {
        let load = report.load();

        self.write_file(
            &format!("{load}_response"),
            &render_percentile_distribution(report.hiccup()),
        )?;
        self.write_file(
            &format!("{load}_deadline"),
            &render_percentile_distribution(report.deadline()),
        )?;
        self.write_file(
            &format!("{load}_period"),
            &render_percentile_distribution(report.period()),
        )?;

        let summary = serde_json::to_string_pretty(&report.summary())
            .map_err(|e| BenchError::Resource(format!("cannot encode summary: {e}")))?;
        self.write_file(&format!("{load}_summary.json"), &summary)?;

        debug!(load, dir = %self.dir.display(), "Iteration report written");
        Ok(())
    }

    fn note(&mut self, line: &str) -> BenchResult<()> {
        let path = self.dir.join("log");
        writeln!(self.log, "{}", line.trim_end())
            .and_then(|()| self.log.flush())
            .map_err(|e| resource(&path, &e))
    }
}

fn resource(path: &Path, err: &std::io::Error) -> BenchError {
    BenchError::Resource(format!("cannot write {}: {err}", path.display()))
}

/// Render a histogram as a percentile distribution table.
///
/// Columns are value, cumulative percentile, total count up to the value and
/// `1/(1-percentile)`, five steps per halving of the remaining distance to
/// 100%. A footer gives mean, standard deviation, maximum and count.
#[must_use]
pub fn render_percentile_distribution(histogram: &Histogram<u64>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>12} {:>14} {:>10} {:>14}\n",
        "Value", "Percentile", "TotalCount", "1/(1-Percentile)"
    );

    let mut total = 0u64;
    for step in histogram.iter_quantiles(5) {
        total += step.count_since_last_iteration();
        let quantile = step.quantile_iterated_to();
        #[allow(clippy::cast_precision_loss)]
        let value = step.value_iterated_to() as f64;
        if quantile < 1.0 {
            let _ = writeln!(
                out,
                "{value:12.3} {quantile:2.12} {total:10} {:14.2}",
                1.0 / (1.0 - quantile)
            );
        } else {
            let _ = writeln!(out, "{value:12.3} {quantile:2.12} {total:10}");
        }
    }

    let (mean, stdev, max) = if histogram.is_empty() {
        (0.0, 0.0, 0)
    } else {
        (histogram.mean(), histogram.stdev(), histogram.max())
    };
    let _ = writeln!(out, "#[Mean    = {mean:12.3}, StdDeviation   = {stdev:12.3}]");
    let _ = writeln!(
        out,
        "#[Max     = {max:12}, Total count    = {:12}]",
        histogram.len()
    );
    out
}
