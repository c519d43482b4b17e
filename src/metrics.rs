//! Pipeline metrics.
//!
//! Metrics are recorded through the `metrics` facade; the binary does not install an
//! exporter, so they cost nothing unless an embedding application installs a recorder.

use std::time::Instant;

use crate::error::Stage;

/// Stage timing that records its duration when dropped.
pub struct TimingGuard {
    start: Instant,
    stage: Stage,
}

impl TimingGuard {
    pub fn finish(self) {
        // Drop records the duration
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!("artsdata_stage_duration_seconds", "stage" => self.stage.as_str())
            .record(duration);
    }
}

pub fn time_stage(stage: Stage) -> TimingGuard {
    TimingGuard {
        start: Instant::now(),
        stage,
    }
}

pub struct StageMetrics;

impl StageMetrics {
    pub fn record_rows(stage: Stage, rows: usize) {
        ::metrics::counter!("artsdata_rows_processed_total", "stage" => stage.as_str())
            .increment(rows as u64);
    }

    pub fn record_failure(stage: Stage) {
        ::metrics::counter!("artsdata_stage_failures_total", "stage" => stage.as_str()).increment(1);
    }
}

pub struct CriteriaMetrics;

impl CriteriaMetrics {
    pub fn record_outcomes(matched: usize, rank_excluded: usize, unmatched: usize) {
        ::metrics::counter!("artsdata_criteria_rows_total", "outcome" => "matched")
            .increment(matched as u64);
        ::metrics::counter!("artsdata_criteria_rows_total", "outcome" => "rank_excluded")
            .increment(rank_excluded as u64);
        ::metrics::counter!("artsdata_criteria_rows_total", "outcome" => "unmatched")
            .increment(unmatched as u64);
    }
}

pub struct TaxonomyMetrics;

impl TaxonomyMetrics {
    pub fn record_request(source: &'static str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        ::metrics::counter!("artsdata_taxon_requests_total", "source" => source, "outcome" => outcome)
            .increment(1);
    }

    pub fn record_cache_hit() {
        ::metrics::counter!("artsdata_taxon_cache_hits_total").increment(1);
    }

    pub fn record_unparsable_id() {
        ::metrics::counter!("artsdata_taxon_unparsable_ids_total").increment(1);
    }
}
