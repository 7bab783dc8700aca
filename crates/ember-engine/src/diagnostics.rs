//! Per-frame anomalies, frame timing and periodic diagnostic summaries.
//!
//! Systems never return errors from a frame. Anything they recover from
//! locally is reported as an [`Anomaly`] in the frame output; the
//! [`DiagnosticsReporter`] counts them alongside frame timings and emits an
//! `info!` summary every `diagnostics_interval` seconds of simulated time.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use ember_ecs::prelude::EntityId;

// ---------------------------------------------------------------------------
// Anomaly
// ---------------------------------------------------------------------------

/// A per-entity problem that was recovered from within a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Anomaly {
    /// The position became non-finite; it was reset to the origin and the
    /// velocity stopped.
    InvalidPositionRecovered { entity: EntityId },
    /// The position exceeded `max_position` and was clamped.
    ExtremePositionClamped { entity: EntityId },
    /// The entity was excluded from one system's pass.
    CorruptEntitySkipped {
        entity: EntityId,
        system: String,
        reason: String,
    },
}

impl Anomaly {
    pub fn entity(&self) -> EntityId {
        match self {
            Anomaly::InvalidPositionRecovered { entity }
            | Anomaly::ExtremePositionClamped { entity }
            | Anomaly::CorruptEntitySkipped { entity, .. } => *entity,
        }
    }
}

/// Anomaly totals by variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AnomalyCounts {
    pub invalid_position_recovered: u64,
    pub extreme_position_clamped: u64,
    pub corrupt_entity_skipped: u64,
}

impl AnomalyCounts {
    pub fn record(&mut self, anomaly: &Anomaly) {
        match anomaly {
            Anomaly::InvalidPositionRecovered { .. } => self.invalid_position_recovered += 1,
            Anomaly::ExtremePositionClamped { .. } => self.extreme_position_clamped += 1,
            Anomaly::CorruptEntitySkipped { .. } => self.corrupt_entity_skipped += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.invalid_position_recovered + self.extreme_position_clamped + self.corrupt_entity_skipped
    }
}

// ---------------------------------------------------------------------------
// FrameTimings
// ---------------------------------------------------------------------------

/// Wall-clock timing for one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameTimings {
    /// Time per system, in execution order.
    pub systems: Vec<(String, Duration)>,
    /// Time for the whole update, including post-pass despawns.
    pub total: Duration,
}

// ---------------------------------------------------------------------------
// DiagnosticsReporter
// ---------------------------------------------------------------------------

/// Aggregated figures for one reporting window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticsSummary {
    pub frames: u64,
    pub over_budget_frames: u64,
    pub average_frame_ms: f64,
    pub slowest_frame_ms: f64,
    pub anomalies: AnomalyCounts,
    pub entities: usize,
}

/// Accumulates frame figures and reports them periodically.
#[derive(Debug, Default)]
pub struct DiagnosticsReporter {
    window_elapsed: f64,
    frames: u64,
    over_budget_frames: u64,
    frame_time: Duration,
    slowest: Duration,
    window_anomalies: AnomalyCounts,
    lifetime_anomalies: AnomalyCounts,
}

impl DiagnosticsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame in. Returns the window summary when `interval` seconds
    /// of simulated time have accumulated.
    pub fn record_frame(
        &mut self,
        frame: u64,
        dt: f64,
        timings: &FrameTimings,
        anomalies: &[Anomaly],
        entities: usize,
        budget_ms: f64,
        interval: f64,
    ) -> Option<DiagnosticsSummary> {
        let frame_ms = timings.total.as_secs_f64() * 1000.0;
        if frame_ms > budget_ms {
            self.over_budget_frames += 1;
            let slowest_system = timings
                .systems
                .iter()
                .max_by_key(|(_, t)| *t)
                .map_or("-", |(name, _)| name.as_str());
            warn!(frame, frame_ms, budget_ms, slowest_system, "frame over budget");
        }
        for anomaly in anomalies {
            self.window_anomalies.record(anomaly);
            self.lifetime_anomalies.record(anomaly);
        }
        self.frames += 1;
        self.frame_time += timings.total;
        self.slowest = self.slowest.max(timings.total);
        self.window_elapsed += dt;

        if self.window_elapsed < interval {
            return None;
        }
        let summary = DiagnosticsSummary {
            frames: self.frames,
            over_budget_frames: self.over_budget_frames,
            average_frame_ms: self.frame_time.as_secs_f64() * 1000.0 / self.frames as f64,
            slowest_frame_ms: self.slowest.as_secs_f64() * 1000.0,
            anomalies: self.window_anomalies,
            entities,
        };
        info!(
            frames = summary.frames,
            over_budget = summary.over_budget_frames,
            avg_ms = summary.average_frame_ms,
            slowest_ms = summary.slowest_frame_ms,
            anomalies = summary.anomalies.total(),
            entities,
            "frame diagnostics"
        );
        self.reset_window();
        Some(summary)
    }

    /// Anomalies counted since the reporter was created.
    pub fn total_anomalies(&self) -> AnomalyCounts {
        self.lifetime_anomalies
    }

    fn reset_window(&mut self) {
        self.window_elapsed = 0.0;
        self.frames = 0;
        self.over_budget_frames = 0;
        self.frame_time = Duration::ZERO;
        self.slowest = Duration::ZERO;
        self.window_anomalies = AnomalyCounts::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn timings(ms: u64) -> FrameTimings {
        FrameTimings {
            systems: vec![("movement".to_owned(), Duration::from_millis(ms))],
            total: Duration::from_millis(ms),
        }
    }

    #[test]
    fn summary_is_emitted_once_per_interval() {
        let mut reporter = DiagnosticsReporter::new();
        let entity = EntityId::new(0, 0);
        let anomalies = [Anomaly::ExtremePositionClamped { entity }];

        assert!(reporter.record_frame(1, 0.5, &timings(2), &anomalies, 3, 16.0, 1.0).is_none());
        let summary = reporter
            .record_frame(2, 0.5, &timings(4), &[], 3, 16.0, 1.0)
            .expect("interval reached");
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.anomalies.extreme_position_clamped, 1);
        assert_eq!(summary.slowest_frame_ms, 4.0);
        assert_eq!(summary.average_frame_ms, 3.0);

        assert!(reporter.record_frame(3, 0.5, &timings(1), &[], 3, 16.0, 1.0).is_none());
        assert_eq!(reporter.total_anomalies().total(), 1);
    }

    #[test]
    fn over_budget_frames_are_counted() {
        let mut reporter = DiagnosticsReporter::new();
        reporter.record_frame(1, 0.1, &timings(20), &[], 0, 16.0, 0.2);
        let summary = reporter.record_frame(2, 0.1, &timings(5), &[], 0, 16.0, 0.2).unwrap();
        assert_eq!(summary.over_budget_frames, 1);
    }

    #[test]
    fn anomaly_entity_accessor() {
        let entity = EntityId::new(4, 2);
        let a = Anomaly::CorruptEntitySkipped {
            entity,
            system: "collision".to_owned(),
            reason: "missing transform".to_owned(),
        };
        assert_eq!(a.entity(), entity);
    }
}
