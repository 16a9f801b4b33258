//! Pipeline stages for label explanation.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own with a stubbed external service.
//!
//! ## Data Flow
//!
//! ```text
//! image ──▶ extract ──▶ generate ──▶ postprocess ──▶ [speech]
//!          (tesseract)  (ollama)    (cleanup)       (espeak-ng)
//! ```
//!
//! 1. [`extract`]     — OCR the whole image and drop noise lines; runs in
//!    `spawn_blocking` because the engine is CPU-bound
//! 2. [`generate`]    — one `/api/generate` call; the only stage with
//!    network I/O
//! 3. [`postprocess`] — deterministic cleanup of model quirks, plus the
//!    emphasis stripping and dosage scanning used downstream
//! 4. [`speech`]      — render the explanation to an audio file with a
//!    per-call engine session

pub mod extract;
pub mod generate;
pub mod postprocess;
pub mod speech;
