use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-cutting logger for pipeline orchestration events.
///
/// Use cases report through this trait instead of calling the `log` crate
/// directly, so tests can swap in a silent implementation.
pub trait PipelineLogger: Send {
    /// Report image-level progress.
    fn progress(&mut self, current: usize, total: usize);

    /// Record how long a named stage (`detect`, `align`, `graph`) took.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. reorder depth).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

#[derive(Default)]
struct Series {
    values: Vec<f64>,
}

impl Series {
    fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.total() / self.values.len() as f64
        }
    }

    fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// CLI logger: forwards messages to `log`, and keeps per-stage timings and
/// metrics for a report at the end of the run.
///
/// Progress is logged every `throttle` images and on the last one.
pub struct StdoutPipelineLogger {
    throttle: usize,
    stages: BTreeMap<String, Series>,
    metrics: BTreeMap<String, Series>,
    started: Instant,
    images: usize,
    messages: Vec<String>,
}

impl StdoutPipelineLogger {
    pub fn new(throttle: usize) -> Self {
        Self {
            throttle: throttle.max(1),
            stages: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started: Instant::now(),
            images: 0,
            messages: Vec::new(),
        }
    }

    /// The end-of-run report, or `None` when nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.stages.is_empty() && self.metrics.is_empty() {
            return None;
        }
        let elapsed_s = self.started.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Run summary ({} images in {elapsed_s:.1}s):",
            self.images
        )];

        for (stage, series) in &self.stages {
            lines.push(format!(
                "  {stage:8} {:5} calls  avg {:6.1}ms  total {:7.0}ms",
                series.values.len(),
                series.mean(),
                series.total()
            ));
        }
        for (name, series) in &self.metrics {
            lines.push(format!(
                "  {name}: avg {:.1}, max {:.0}",
                series.mean(),
                series.max()
            ));
        }
        if self.images > 0 && elapsed_s > 0.0 {
            lines.push(format!(
                "  Throughput: {:.1} images/s",
                self.images as f64 / elapsed_s
            ));
        }
        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.stages.get(stage).map(|s| s.values.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|s| s.values.as_slice())
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(25)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.images = total;
        if total > 0 && (current % self.throttle == 0 || current == total) {
            log::info!(
                "Processing: {current}/{total} images ({:.1}%)",
                current as f64 / total as f64 * 100.0
            );
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.stages
            .entry(stage.to_string())
            .or_default()
            .values
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .values
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
        self.messages.push(message.to_string());
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullPipelineLogger;
        logger.progress(3, 4);
        logger.timing("align", 2.0);
        logger.metric("reorder_depth", 1.0);
        logger.info("ignored");
        logger.summary();
    }

    #[test]
    fn test_timings_are_kept_per_stage() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing("detect", 12.0);
        logger.timing("align", 3.0);
        logger.timing("detect", 18.0);

        assert_eq!(logger.timings_for("detect").unwrap(), &[12.0, 18.0]);
        assert_eq!(logger.timings_for("align").unwrap(), &[3.0]);
        assert!(logger.timings_for("graph").is_none());
    }

    #[test]
    fn test_series_statistics() {
        let series = Series {
            values: vec![2.0, 7.0, 3.0],
        };
        assert_relative_eq!(series.total(), 12.0);
        assert_relative_eq!(series.mean(), 4.0);
        assert_relative_eq!(series.max(), 7.0);
        assert_relative_eq!(Series::default().mean(), 0.0);
    }

    #[test]
    fn test_summary_lists_stages_in_name_order() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(2, 2);
        logger.timing("detect", 20.0);
        logger.timing("align", 5.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.starts_with("Run summary (2 images"));
        let align = summary.find("align").unwrap();
        let detect = summary.find("detect").unwrap();
        assert!(align < detect);
    }

    #[test]
    fn test_summary_reports_metric_mean_and_max() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.metric("reorder_depth", 1.0);
        logger.metric("reorder_depth", 4.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("reorder_depth: avg 2.5, max 4"));
    }

    #[test]
    fn test_summary_is_none_without_data() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.info("only a message");
        assert!(logger.summary_string().is_none());
        assert_eq!(logger.messages, vec!["only a message".to_string()]);
    }

    #[test]
    fn test_progress_tracks_total_and_clamps_throttle() {
        let mut logger = StdoutPipelineLogger::new(0);
        assert_eq!(logger.throttle, 1);
        for i in 1..=7 {
            logger.progress(i, 7);
        }
        assert_eq!(logger.images, 7);
        assert_eq!(StdoutPipelineLogger::default().throttle, 25);
    }
}
