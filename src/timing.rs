use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Pipeline stages that are timed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadImage,
    Blur,
    PixelsInRectangle,
    BinRectangle,
    FindBilayers,
    CorrectPicks,
    CleanEdges,
    FitSplines,
    WriteOutputs,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::LoadImage,
        Stage::Blur,
        Stage::PixelsInRectangle,
        Stage::BinRectangle,
        Stage::FindBilayers,
        Stage::CorrectPicks,
        Stage::CleanEdges,
        Stage::FitSplines,
        Stage::WriteOutputs,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Stage::LoadImage => "load_image",
            Stage::Blur => "blur",
            Stage::PixelsInRectangle => "pixels_in_rectangle",
            Stage::BinRectangle => "bin_rectangle",
            Stage::FindBilayers => "find_bilayers",
            Stage::CorrectPicks => "correct_picks",
            Stage::CleanEdges => "clean_edges",
            Stage::FitSplines => "fit_splines",
            Stage::WriteOutputs => "write_outputs",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Accumulated wall time per stage. Each unit of parallel work owns one and
/// the results are merged afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    elapsed: [Duration; Stage::ALL.len()],
}

impl StageTimings {
    pub fn add(&mut self, stage: Stage, elapsed: Duration) {
        self.elapsed[stage.index()] += elapsed;
    }

    /// Runs `f` and charges its wall time to `stage`.
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.add(stage, start.elapsed());
        out
    }

    pub fn get(&self, stage: Stage) -> Duration {
        self.elapsed[stage.index()]
    }

    pub fn total(&self) -> Duration {
        self.elapsed.iter().sum()
    }

    pub fn merge(&mut self, other: &StageTimings) {
        for (mine, theirs) in self.elapsed.iter_mut().zip(other.elapsed.iter()) {
            *mine += *theirs;
        }
    }

    pub fn breakdown(&self) -> TimingBreakdown {
        TimingBreakdown {
            total_ms: self.total().as_secs_f64() * 1e3,
            stages: Stage::ALL
                .iter()
                .map(|s| StageTiming {
                    label: s.label().to_string(),
                    elapsed_ms: self.get(*s).as_secs_f64() * 1e3,
                })
                .collect(),
        }
    }
}

/// Serialisable timing entry for one stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

/// Serialisable timing report for a whole run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    pub fn log(&self) {
        for stage in &self.stages {
            log::info!("time in {}: {:.3}s", stage.label, stage.elapsed_ms / 1e3);
        }
        log::info!("total stage time: {:.3}s", self.total_ms / 1e3);
    }
}

#[cfg(test)]
mod timing_tests {
    use super::*;

    #[test]
    fn test_add_and_merge() {
        let mut a = StageTimings::default();
        a.add(Stage::Blur, Duration::from_millis(5));
        a.add(Stage::Blur, Duration::from_millis(5));
        let mut b = StageTimings::default();
        b.add(Stage::FitSplines, Duration::from_millis(7));
        b.add(Stage::Blur, Duration::from_millis(1));

        a.merge(&b);
        assert_eq!(a.get(Stage::Blur), Duration::from_millis(11));
        assert_eq!(a.get(Stage::FitSplines), Duration::from_millis(7));
        assert_eq!(a.total(), Duration::from_millis(18));
    }

    #[test]
    fn test_time_returns_closure_value() {
        let mut t = StageTimings::default();
        let v = t.time(Stage::CleanEdges, || 41 + 1);
        assert_eq!(v, 42);
        assert_eq!(t.get(Stage::LoadImage), Duration::ZERO);
    }

    #[test]
    fn test_breakdown_serialises_every_stage() {
        let mut t = StageTimings::default();
        t.add(Stage::BinRectangle, Duration::from_millis(250));
        let report = t.breakdown();
        assert_eq!(report.stages.len(), Stage::ALL.len());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"bin_rectangle\""));
        assert!((report.total_ms - 250.0).abs() < 1e-9);
    }
}
