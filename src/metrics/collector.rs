//! Metrics collection using Prometheus
//!
//! Counters and histograms for recomputes, extraction outcomes and
//! win probability queries.

use crate::comparison::ExclusionReason;
use crate::types::{Algorithm, RatingScope, ScopeSide, Side, WinProbability};
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the rating engine
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    rating_metrics: RatingMetrics,

    extraction_metrics: ExtractionMetrics,

    query_metrics: QueryMetrics,
}

/// Recompute metrics
#[derive(Clone)]
pub struct RatingMetrics {
    /// Recomputes by algorithm, side and mode (full or incremental)
    pub recalculations_total: IntCounterVec,

    /// Recompute wall time by algorithm
    pub recalculation_duration: HistogramVec,

    /// Athletes holding a rating, per scope
    pub rated_athletes: IntGaugeVec,

    /// Bradley-Terry fits that hit the iteration cap
    pub convergence_warnings_total: IntCounterVec,

    /// Incremental Elo updates that fell back to a full replay
    pub incremental_fallbacks_total: IntCounter,
}

/// Comparison extraction metrics
#[derive(Clone)]
pub struct ExtractionMetrics {
    pub sessions_processed_total: IntCounter,

    /// Comparisons emitted, by the swapped seat's side
    pub comparisons_extracted_total: IntCounterVec,

    /// Piece pairs excluded as ambiguous or malformed, by reason
    pub excluded_pairs_total: IntCounterVec,
}

/// Read-side query metrics
#[derive(Clone)]
pub struct QueryMetrics {
    /// Win probability answers by result (estimate or insufficient_data)
    pub win_probability_queries_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let rating_metrics = RatingMetrics::new(&registry)?;
        let extraction_metrics = ExtractionMetrics::new(&registry)?;
        let query_metrics = QueryMetrics::new(&registry)?;

        Ok(Self {
            registry,
            rating_metrics,
            extraction_metrics,
            query_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn rating(&self) -> &RatingMetrics {
        &self.rating_metrics
    }

    pub fn extraction(&self) -> &ExtractionMetrics {
        &self.extraction_metrics
    }

    pub fn query(&self) -> &QueryMetrics {
        &self.query_metrics
    }

    /// Record a completed recompute for a scope
    pub fn record_recalculation(
        &self,
        algorithm: Algorithm,
        scope: &RatingScope,
        incremental: bool,
        athletes: usize,
        duration: Duration,
    ) {
        let mode = if incremental { "incremental" } else { "full" };
        let algorithm_str = algorithm_label(algorithm);
        let side_str = side_label(scope.side);

        self.rating_metrics
            .recalculations_total
            .with_label_values(&[algorithm_str, side_str, mode])
            .inc();

        self.rating_metrics
            .recalculation_duration
            .with_label_values(&[algorithm_str])
            .observe(duration.as_secs_f64());

        self.rating_metrics
            .rated_athletes
            .with_label_values(&[scope.rating_type.as_str(), side_str])
            .set(athletes as i64);
    }

    pub fn record_convergence_warning(&self, side: ScopeSide) {
        self.rating_metrics
            .convergence_warnings_total
            .with_label_values(&[side_label(side)])
            .inc();
    }

    pub fn record_incremental_fallback(&self) {
        self.rating_metrics.incremental_fallbacks_total.inc();
    }

    /// Record the outcome of extracting one session
    pub fn record_extraction<'a, C, E>(&self, comparison_sides: C, exclusions: E)
    where
        C: IntoIterator<Item = Side>,
        E: IntoIterator<Item = &'a ExclusionReason>,
    {
        self.extraction_metrics.sessions_processed_total.inc();

        for side in comparison_sides {
            self.extraction_metrics
                .comparisons_extracted_total
                .with_label_values(&[side_label(side.into())])
                .inc();
        }

        for reason in exclusions {
            self.extraction_metrics
                .excluded_pairs_total
                .with_label_values(&[reason.as_str()])
                .inc();
        }
    }

    pub fn record_win_probability_query(&self, answer: &WinProbability) {
        let result = match answer {
            WinProbability::Estimate(_) => "estimate",
            WinProbability::InsufficientData => "insufficient_data",
        };

        self.query_metrics
            .win_probability_queries_total
            .with_label_values(&[result])
            .inc();
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn algorithm_label(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::Elo => "elo",
        Algorithm::BradleyTerry => "bradley_terry",
    }
}

fn side_label(side: ScopeSide) -> &'static str {
    match side {
        ScopeSide::All => "all",
        ScopeSide::Port => "port",
        ScopeSide::Starboard => "starboard",
        ScopeSide::Coxswain => "coxswain",
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    /// Start timing an operation
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl RatingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let recalculations_total = IntCounterVec::new(
            Opts::new(
                "seat_race_recalculations_total",
                "Total rating recomputes",
            ),
            &["algorithm", "side", "mode"],
        )?;
        registry.register(Box::new(recalculations_total.clone()))?;

        let recalculation_duration = HistogramVec::new(
            HistogramOpts::new(
                "seat_race_recalculation_duration_seconds",
                "Rating recompute time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["algorithm"],
        )?;
        registry.register(Box::new(recalculation_duration.clone()))?;

        let rated_athletes = IntGaugeVec::new(
            Opts::new("seat_race_rated_athletes", "Athletes holding a rating"),
            &["rating_type", "side"],
        )?;
        registry.register(Box::new(rated_athletes.clone()))?;

        let convergence_warnings_total = IntCounterVec::new(
            Opts::new(
                "seat_race_convergence_warnings_total",
                "Bradley-Terry fits that hit the iteration cap",
            ),
            &["side"],
        )?;
        registry.register(Box::new(convergence_warnings_total.clone()))?;

        let incremental_fallbacks_total = IntCounter::new(
            "seat_race_incremental_fallbacks_total",
            "Incremental Elo updates replaced by a full replay",
        )?;
        registry.register(Box::new(incremental_fallbacks_total.clone()))?;

        Ok(Self {
            recalculations_total,
            recalculation_duration,
            rated_athletes,
            convergence_warnings_total,
            incremental_fallbacks_total,
        })
    }
}

impl ExtractionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let sessions_processed_total = IntCounter::new(
            "seat_race_sessions_processed_total",
            "Seat race sessions run through extraction",
        )?;
        registry.register(Box::new(sessions_processed_total.clone()))?;

        let comparisons_extracted_total = IntCounterVec::new(
            Opts::new(
                "seat_race_comparisons_extracted_total",
                "Comparisons extracted from clean swaps",
            ),
            &["side"],
        )?;
        registry.register(Box::new(comparisons_extracted_total.clone()))?;

        let excluded_pairs_total = IntCounterVec::new(
            Opts::new(
                "seat_race_excluded_pairs_total",
                "Piece pairs excluded from extraction",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(excluded_pairs_total.clone()))?;

        Ok(Self {
            sessions_processed_total,
            comparisons_extracted_total,
            excluded_pairs_total,
        })
    }
}

impl QueryMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let win_probability_queries_total = IntCounterVec::new(
            Opts::new(
                "seat_race_win_probability_queries_total",
                "Pairwise win probability queries",
            ),
            &["result"],
        )?;
        registry.register(Box::new(win_probability_queries_total.clone()))?;

        Ok(Self {
            win_probability_queries_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RatingType;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _rating = collector.rating();
        let _extraction = collector.extraction();
        let _query = collector.query();
    }

    #[test]
    fn test_recalculation_recording() {
        let collector = MetricsCollector::new().unwrap();
        let scope = RatingScope::new(RatingType::BradleyTerry, ScopeSide::Port);

        collector.record_recalculation(
            Algorithm::BradleyTerry,
            &scope,
            false,
            12,
            Duration::from_millis(3),
        );
        collector.record_convergence_warning(ScopeSide::Port);

        assert_eq!(
            collector
                .rating()
                .recalculations_total
                .with_label_values(&["bradley_terry", "port", "full"])
                .get(),
            1
        );
        assert_eq!(
            collector
                .rating()
                .rated_athletes
                .with_label_values(&["bradley_terry", "port"])
                .get(),
            12
        );
    }

    #[test]
    fn test_extraction_recording() {
        let collector = MetricsCollector::new().unwrap();
        let reasons = [
            ExclusionReason::MultipleSeatChanges,
            ExclusionReason::MultipleSeatChanges,
            ExclusionReason::MissingResult,
        ];

        collector.record_extraction([Side::Port, Side::Starboard, Side::Port], reasons.iter());

        let extraction = collector.extraction();
        assert_eq!(extraction.sessions_processed_total.get(), 1);
        assert_eq!(
            extraction
                .comparisons_extracted_total
                .with_label_values(&["port"])
                .get(),
            2
        );
        assert_eq!(
            extraction
                .excluded_pairs_total
                .with_label_values(&[ExclusionReason::MultipleSeatChanges.as_str()])
                .get(),
            2
        );
    }

    #[test]
    fn test_render_contains_recorded_metrics() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_win_probability_query(&WinProbability::InsufficientData);
        collector.record_win_probability_query(&WinProbability::Estimate(0.6));

        let text = collector.render().unwrap();
        assert!(text.contains("seat_race_win_probability_queries_total"));
        assert!(text.contains("insufficient_data"));
    }

    #[test]
    fn test_metrics_timer() {
        let timer = MetricsTimer::start();

        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        assert!(timer.stop() >= Duration::from_millis(10));
    }
}
