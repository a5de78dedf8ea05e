//! Progress aggregation.
//!
//! A stage reports its own 0-100 progress; the [`Reporter`] maps it into the
//! stage's [`ProgressWindow`] of the job's overall progress and prefixes the
//! message with the stage's [`PhaseTag`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Window bounds that violate `lower < upper <= 100`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid progress window [{lower}, {upper}]")]
pub struct InvalidWindow {
    pub lower: u8,
    pub upper: u8,
}

/// Sub-range of overall job progress a stage may report into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u8, u8)", into = "(u8, u8)")]
pub struct ProgressWindow {
    lower: u8,
    upper: u8,
}

impl ProgressWindow {
    /// The whole 0-100 range.
    pub const FULL: ProgressWindow = ProgressWindow { lower: 0, upper: 100 };

    pub fn new(lower: u8, upper: u8) -> Result<Self, InvalidWindow> {
        if lower >= upper || upper > 100 {
            return Err(InvalidWindow { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// Window known at compile time; invalid bounds fail const evaluation.
    pub const fn fixed(lower: u8, upper: u8) -> Self {
        assert!(lower < upper && upper <= 100, "invalid progress window");
        Self { lower, upper }
    }

    pub fn lower(&self) -> u8 {
        self.lower
    }

    pub fn upper(&self) -> u8 {
        self.upper
    }

    pub fn width(&self) -> u8 {
        self.upper - self.lower
    }

    /// Maps a window expressed in this window's own 0-100 scale onto the
    /// overall scale.
    ///
    /// The result always has at least one point of width and never leaves
    /// this window.
    pub fn nested(&self, relative: ProgressWindow) -> ProgressWindow {
        let mut lower = map_progress(*self, relative.lower);
        let mut upper = map_progress(*self, relative.upper);
        if upper <= lower {
            if lower >= self.upper {
                lower = self.upper - 1;
            }
            upper = lower + 1;
        }
        ProgressWindow { lower, upper }
    }

    /// Splits the window into `count` equal consecutive slices and returns
    /// slice `index`.
    pub fn slice(&self, index: usize, count: usize) -> ProgressWindow {
        let count = count.max(1) as u32;
        let index = (index as u32).min(count - 1);
        let lower = (index * 100 / count) as u8;
        let upper = ((index + 1) * 100 / count) as u8;
        self.nested(ProgressWindow { lower, upper: upper.max(lower + 1) })
    }

    pub fn contains(&self, value: u8) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl TryFrom<(u8, u8)> for ProgressWindow {
    type Error = InvalidWindow;

    fn try_from((lower, upper): (u8, u8)) -> Result<Self, Self::Error> {
        Self::new(lower, upper)
    }
}

impl From<ProgressWindow> for (u8, u8) {
    fn from(window: ProgressWindow) -> Self {
        (window.lower, window.upper)
    }
}

impl fmt::Display for ProgressWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Maps a stage's inner percentage onto overall job progress.
///
/// `overall = lower + round(inner / 100 * (upper - lower))`, clamped to the
/// window. Inner values above 100 are treated as 100.
pub fn map_progress(window: ProgressWindow, inner: u8) -> u8 {
    let inner = inner.min(100) as u32;
    let width = window.width() as u32;
    let offset = (inner * width + 50) / 100;
    let overall = window.lower as u32 + offset;
    (overall as u8).clamp(window.lower, window.upper)
}

/// Logical phase shown in front of status messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTag {
    Upload,
    Extract,
    Transcribe,
    Generate,
    Finalize,
}

impl PhaseTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Extract => "extract",
            Self::Transcribe => "transcribe",
            Self::Generate => "generate",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for PhaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Copying the submitted file into job-local temp storage.
    Intake,
    Extract,
    Transcribe,
    Generate,
    Render,
    Upload,
    Finalize,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Extract => "extract",
            Self::Transcribe => "transcribe",
            Self::Generate => "generate",
            Self::Render => "render",
            Self::Upload => "upload",
            Self::Finalize => "finalize",
        }
    }

    /// Static stage to display tag mapping.
    pub fn tag(&self) -> PhaseTag {
        match self {
            Self::Intake | Self::Upload => PhaseTag::Upload,
            Self::Extract => PhaseTag::Extract,
            Self::Transcribe => PhaseTag::Transcribe,
            Self::Generate => PhaseTag::Generate,
            Self::Render | Self::Finalize => PhaseTag::Finalize,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a status line for a tagged message.
pub fn status_line(tag: PhaseTag, message: &str) -> String {
    format!("[{}] {}", tag, message)
}

/// Receives overall progress updates.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// `percent` is already on the overall 0-100 scale.
    async fn publish(&self, percent: u8, message: String);
}

/// Sink that drops every update.
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn publish(&self, _percent: u8, _message: String) {}
}

/// Handle a stage uses to report progress inside its window.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ProgressSink>,
    stage: StageKind,
    window: ProgressWindow,
}

impl Reporter {
    pub fn new(sink: Arc<dyn ProgressSink>, stage: StageKind, window: ProgressWindow) -> Self {
        Self {
            sink,
            stage,
            window,
        }
    }

    /// Reporter that discards updates.
    pub fn noop(stage: StageKind) -> Self {
        Self::new(Arc::new(NoopSink), stage, ProgressWindow::FULL)
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn window(&self) -> ProgressWindow {
        self.window
    }

    /// Reporter for a sub-operation occupying `relative` of this window.
    pub fn child(&self, relative: ProgressWindow) -> Reporter {
        Reporter {
            sink: Arc::clone(&self.sink),
            stage: self.stage,
            window: self.window.nested(relative),
        }
    }

    /// Reporter for tier `index` of `count` sharing this window.
    pub fn tier(&self, index: usize, count: usize) -> Reporter {
        Reporter {
            sink: Arc::clone(&self.sink),
            stage: self.stage,
            window: self.window.slice(index, count),
        }
    }

    /// Same window, different stage identity (and therefore tag).
    pub fn for_stage(&self, stage: StageKind) -> Reporter {
        Reporter {
            sink: Arc::clone(&self.sink),
            stage,
            window: self.window,
        }
    }

    pub async fn report(&self, inner: u8, message: impl Into<String>) {
        let overall = map_progress(self.window, inner);
        let line = status_line(self.stage.tag(), &message.into());
        self.sink.publish(overall, line).await;
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("stage", &self.stage)
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(u8, String)>>);

    #[async_trait]
    impl ProgressSink for Collect {
        async fn publish(&self, percent: u8, message: String) {
            self.0.lock().await.push((percent, message));
        }
    }

    #[test]
    fn test_window_validation() {
        assert!(ProgressWindow::new(5, 40).is_ok());
        assert!(ProgressWindow::new(40, 40).is_err());
        assert!(ProgressWindow::new(50, 10).is_err());
        assert!(ProgressWindow::new(90, 101).is_err());
    }

    #[test]
    fn test_map_progress_endpoints() {
        let w = ProgressWindow::new(5, 40).unwrap();
        assert_eq!(map_progress(w, 0), 5);
        assert_eq!(map_progress(w, 100), 40);
        assert_eq!(map_progress(w, 50), 23); // 5 + round(17.5)
        assert_eq!(map_progress(w, 250), 40);
    }

    #[test]
    fn test_map_progress_bounded_and_monotonic_for_all_windows() {
        for lower in 0u8..100 {
            for upper in (lower + 1)..=100 {
                let w = ProgressWindow::new(lower, upper).unwrap();
                let mut previous = 0u8;
                for p in 0u8..=100 {
                    let v = map_progress(w, p);
                    assert!(w.contains(v), "{} out of {} for {}", v, w, p);
                    assert!(v >= previous, "regressed at {} in {}", p, w);
                    previous = v;
                }
            }
        }
    }

    #[test]
    fn test_slices_are_consecutive() {
        let w = ProgressWindow::new(5, 40).unwrap();
        let slices: Vec<_> = (0..3).map(|i| w.slice(i, 3)).collect();
        assert_eq!(slices[0].lower(), 5);
        assert_eq!(slices[2].upper(), 40);
        for pair in slices.windows(2) {
            assert!(pair[0].upper() <= pair[1].lower());
        }
    }

    #[test]
    fn test_nested_never_degenerate() {
        let w = ProgressWindow::new(98, 100).unwrap();
        let inner = w.nested(ProgressWindow::new(97, 100).unwrap());
        assert!(inner.lower() < inner.upper());
        assert!(inner.upper() <= 100);
    }

    #[test]
    fn test_window_deserializes_from_pair() {
        #[derive(Deserialize)]
        struct Holder {
            window: ProgressWindow,
        }
        let holder: Holder = toml::from_str("window = [40, 90]").unwrap();
        assert_eq!(holder.window, ProgressWindow::new(40, 90).unwrap());

        let bad: Result<Holder, _> = toml::from_str("window = [90, 40]");
        assert!(bad.is_err());
    }

    #[test]
    fn test_tags_are_static() {
        assert_eq!(StageKind::Transcribe.tag(), PhaseTag::Transcribe);
        assert_eq!(StageKind::Intake.tag(), PhaseTag::Upload);
        assert_eq!(StageKind::Render.tag(), PhaseTag::Finalize);
    }

    #[tokio::test]
    async fn test_reporter_maps_and_tags() {
        let sink = Arc::new(Collect::default());
        let reporter = Reporter::new(
            sink.clone(),
            StageKind::Generate,
            ProgressWindow::new(40, 90).unwrap(),
        );
        reporter.report(0, "starting").await;
        reporter.report(100, "done").await;

        let seen = sink.0.lock().await.clone();
        assert_eq!(seen[0], (40, "[generate] starting".to_string()));
        assert_eq!(seen[1], (90, "[generate] done".to_string()));
    }

    #[tokio::test]
    async fn test_tier_reporters_do_not_overlap() {
        let sink = Arc::new(Collect::default());
        let reporter = Reporter::new(
            sink.clone(),
            StageKind::Transcribe,
            ProgressWindow::new(5, 40).unwrap(),
        );
        reporter.tier(0, 3).report(100, "tier one done").await;
        reporter.tier(1, 3).report(0, "tier two start").await;

        let seen = sink.0.lock().await.clone();
        assert!(seen[0].0 <= seen[1].0);
    }
}
