//! Segmentation diagnostics: timing and counts for each phase.
//!
//! Every engine run collects diagnostics alongside its result. The same
//! phase boundaries drive the caller's progress callback, so the report
//! and the progress messages always agree.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::types::SegmentationError;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Phases of a segmentation run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    NoiseRemoval,
    Exclusion,
    Threshold,
    HoleClosing,
    Components,
    Sprawl,
    Smoothing,
    ConvexFill,
    ExclusionMerge,
    Done,
}

impl Phase {
    /// Name passed to the progress callback.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoiseRemoval => "Noise removal",
            Self::Exclusion => "Components exclusion apply",
            Self::Threshold => "Threshold calculation",
            Self::HoleClosing => "Holes closing",
            Self::Components => "Components calculating",
            Self::Sprawl => "Sprawl calculation",
            Self::Smoothing => "Smoothing borders",
            Self::ConvexFill => "Convex hull filling",
            Self::ExclusionMerge => "Components exclusion merge",
            Self::Done => "Calculation done",
        }
    }

    /// Step index passed to the progress callback.
    #[must_use]
    pub const fn step(self) -> usize {
        self as usize
    }
}

/// Diagnostics collected from a single segmentation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationDiagnostics {
    /// User-facing name of the algorithm that ran.
    pub algorithm: String,
    /// Executed phases in order; skipped phases are absent.
    pub phases: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts for the final result.
    pub summary: SegmentationSummary,
}

/// Diagnostics for a single phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    pub phase: Phase,
    /// Wall-clock duration of this phase (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Phase-specific metrics.
    pub metrics: StageMetrics,
}

/// Phase-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    NoiseRemoval {
        /// Filter that ran.
        filter: String,
    },
    Threshold {
        /// Threshold actually applied (after any automatic adjustment).
        threshold: f64,
        /// Voxels selected by the threshold.
        foreground_voxels: usize,
    },
    Exclusion {
        /// Voxels reserved by the exclusion mask.
        excluded_voxels: usize,
    },
    HoleClosing {
        /// Largest hole filled, `0` for unlimited.
        max_hole_size: usize,
        /// Voxels added.
        filled_voxels: usize,
    },
    Components {
        /// Components found before filtering.
        found: usize,
        /// Components at least `minimum_size` voxels large.
        kept: usize,
        minimum_size: usize,
    },
    Sprawl {
        strategy: String,
        /// Voxels added to the cores.
        grown_voxels: usize,
    },
    Smoothing {
        strategy: String,
        /// Voxels removed.
        removed_voxels: usize,
    },
    ConvexFill {
        /// Voxels added.
        filled_voxels: usize,
    },
    ExclusionMerge {
        /// Amount added to every new label id.
        label_offset: u32,
    },
}

/// High-level summary of the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SegmentationSummary {
    /// Voxels in the processed volume.
    pub voxel_count: usize,
    /// Non-zero voxels in the result.
    pub foreground_voxels: usize,
    /// Distinct non-zero ids in the result.
    pub component_count: usize,
}

impl SegmentationDiagnostics {
    /// Duration of one phase, if it ran.
    #[must_use]
    pub fn phase(&self, phase: Phase) -> Option<&StageDiagnostics> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Segmentation Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Algorithm: {}  |  Volume: {} voxels",
            self.algorithm, self.summary.voxel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<28} {:>10} {:>10}  {}",
            "Phase", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for stage in &self.phases {
            let ms = duration_ms(stage.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&stage.metrics);
            lines.push(format!(
                "{:<28} {ms:>8.3}ms {pct:>9.1}%  {details}",
                stage.phase.name()
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Components: {}  |  Foreground voxels: {}",
            self.summary.component_count, self.summary.foreground_voxels,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format phase metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::NoiseRemoval { filter } => filter.clone(),
        StageMetrics::Threshold {
            threshold,
            foreground_voxels,
        } => format!("t={threshold} foreground={foreground_voxels}"),
        StageMetrics::Exclusion { excluded_voxels } => format!("excluded={excluded_voxels}"),
        StageMetrics::HoleClosing {
            max_hole_size,
            filled_voxels,
        } => format!("max={max_hole_size} filled={filled_voxels}"),
        StageMetrics::Components {
            found,
            kept,
            minimum_size,
        } => format!("{kept}/{found} components >= {minimum_size}"),
        StageMetrics::Sprawl {
            strategy,
            grown_voxels,
        } => format!("{strategy} +{grown_voxels}"),
        StageMetrics::Smoothing {
            strategy,
            removed_voxels,
        } => format!("{strategy} -{removed_voxels}"),
        StageMetrics::ConvexFill { filled_voxels } => format!("+{filled_voxels}"),
        StageMetrics::ExclusionMerge { label_offset } => format!("offset={label_offset}"),
    }
}

/// Times phases, forwards them to the progress callback and records them.
pub(crate) struct PhaseRecorder<'r> {
    report: &'r mut dyn FnMut(&str, usize),
    phases: Vec<StageDiagnostics>,
    start: Instant,
}

impl<'r> PhaseRecorder<'r> {
    pub(crate) fn new(report: &'r mut dyn FnMut(&str, usize)) -> Self {
        Self {
            report,
            phases: Vec::new(),
            start: Instant::now(),
        }
    }

    /// Run one phase: report it, time it, and keep its metrics.
    pub(crate) fn run<T>(
        &mut self,
        phase: Phase,
        f: impl FnOnce() -> Result<(T, StageMetrics), SegmentationError>,
    ) -> Result<T, SegmentationError> {
        (self.report)(phase.name(), phase.step());
        log::debug!("phase {}", phase.name());
        let started = Instant::now();
        let (value, metrics) = f()?;
        self.phases.push(StageDiagnostics {
            phase,
            duration: started.elapsed(),
            metrics,
        });
        Ok(value)
    }

    /// Report completion and assemble the diagnostics.
    pub(crate) fn finish(
        self,
        algorithm: &str,
        summary: SegmentationSummary,
    ) -> SegmentationDiagnostics {
        (self.report)(Phase::Done.name(), Phase::Done.step());
        SegmentationDiagnostics {
            algorithm: algorithm.to_string(),
            phases: self.phases,
            total_duration: self.start.elapsed(),
            summary,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn phase_steps_follow_order() {
        assert_eq!(Phase::NoiseRemoval.step(), 0);
        assert_eq!(Phase::Exclusion.step(), 1);
        assert_eq!(Phase::Threshold.step(), 2);
        assert!(Phase::Smoothing.step() < Phase::Done.step());
    }

    #[test]
    fn recorder_reports_and_records() {
        let mut seen = Vec::new();
        let mut report = |name: &str, step: usize| seen.push((name.to_string(), step));
        let mut recorder = PhaseRecorder::new(&mut report);
        let value = recorder
            .run(Phase::Threshold, || {
                Ok((
                    7,
                    StageMetrics::Threshold {
                        threshold: 10.0,
                        foreground_voxels: 3,
                    },
                ))
            })
            .unwrap();
        assert_eq!(value, 7);
        let diag = recorder.finish("Lower threshold", SegmentationSummary::default());
        assert_eq!(diag.phases.len(), 1);
        assert!(diag.phase(Phase::Threshold).is_some());
        assert!(diag.phase(Phase::Sprawl).is_none());
        assert_eq!(
            seen,
            vec![
                ("Threshold calculation".to_string(), 2),
                ("Calculation done".to_string(), Phase::Done.step()),
            ]
        );
    }

    #[test]
    fn failed_phase_is_not_recorded() {
        let mut report = |_: &str, _: usize| {};
        let mut recorder = PhaseRecorder::new(&mut report);
        let result: Result<(), _> =
            recorder.run(Phase::Components, || Err(SegmentationError::EmptyInput));
        assert!(result.is_err());
        assert!(recorder.phases.is_empty());
    }

    #[test]
    fn report_produces_nonempty_string() {
        let diag = SegmentationDiagnostics {
            algorithm: "Lower threshold".to_string(),
            phases: vec![
                StageDiagnostics {
                    phase: Phase::Threshold,
                    duration: Duration::from_millis(10),
                    metrics: StageMetrics::Threshold {
                        threshold: 45.0,
                        foreground_voxels: 168_000,
                    },
                },
                StageDiagnostics {
                    phase: Phase::Components,
                    duration: Duration::from_millis(30),
                    metrics: StageMetrics::Components {
                        found: 3,
                        kept: 2,
                        minimum_size: 30_000,
                    },
                },
            ],
            total_duration: Duration::from_millis(40),
            summary: SegmentationSummary {
                voxel_count: 500_000,
                foreground_voxels: 168_000,
                component_count: 2,
            },
        };

        let report = diag.report();
        assert!(report.contains("Segmentation Diagnostics Report"));
        assert!(report.contains("Components calculating"));
        assert!(report.contains("2/3 components >= 30000"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let stage = StageDiagnostics {
            phase: Phase::ConvexFill,
            duration: Duration::from_millis(1500),
            metrics: StageMetrics::ConvexFill { filled_voxels: 4 },
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 1.5).abs() < 1e-9);
        let back: StageDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back, stage);
    }
}
