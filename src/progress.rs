//! Progress-callback trait for pipeline stage transitions.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::ExplainConfigBuilder::progress_callback`] to observe the
//! pipeline state machine as a request moves through it:
//!
//! ```text
//! Idle → Extracting → (NoText | ExtractFailed | → Simplifying)
//!      → (GenFailed | → Explained)
//!      → [on request] Synthesizing → (SynthFailed | AudioReady)
//! ```
//!
//! # Example
//!
//! ```rust
//! use label_explain::{ExplainConfig, PipelineStage, StageProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl StageProgressCallback for Printer {
//!     fn on_stage_start(&self, stage: PipelineStage) {
//!         eprintln!("{stage}…");
//!     }
//! }
//!
//! let config = ExplainConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// States of the per-request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Extracting,
    NoText,
    ExtractFailed,
    Simplifying,
    GenFailed,
    Explained,
    Synthesizing,
    SynthFailed,
    AudioReady,
}

impl PipelineStage {
    /// True for states the pipeline cannot leave without a new request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::NoText
                | PipelineStage::ExtractFailed
                | PipelineStage::GenFailed
                | PipelineStage::SynthFailed
                | PipelineStage::AudioReady
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Idle => "Idle",
            PipelineStage::Extracting => "Reading text",
            PipelineStage::NoText => "No text found",
            PipelineStage::ExtractFailed => "Reading failed",
            PipelineStage::Simplifying => "Simplifying",
            PipelineStage::GenFailed => "Simplifying failed",
            PipelineStage::Explained => "Explained",
            PipelineStage::Synthesizing => "Generating audio",
            PipelineStage::SynthFailed => "Audio failed",
            PipelineStage::AudioReady => "Audio ready",
        };
        f.write_str(s)
    }
}

/// Called by the pipeline on every stage transition.
///
/// Implementations must be `Send + Sync`: one callback may be shared by
/// several requests running concurrently. All methods default to no-ops.
pub trait StageProgressCallback: Send + Sync {
    /// A working stage (`Extracting`, `Simplifying`, `Synthesizing`) began.
    fn on_stage_start(&self, stage: PipelineStage) {
        let _ = stage;
    }

    /// The pipeline settled in a state with no automatic next step.
    ///
    /// # Arguments
    /// * `stage`      — the state reached (`NoText`, `ExtractFailed`,
    ///   `GenFailed`, `Explained`, `SynthFailed` or `AudioReady`)
    /// * `elapsed_ms` — time spent in the working stage that led there
    fn on_stage_complete(&self, stage: PipelineStage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExplainConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;
