//! Speech synthesis: explanation text → audio file.
//!
//! Every call opens its own engine session, slows it down, renders one file
//! and drops the session. Nothing survives between calls, and a session is
//! released on every exit path because release happens in `Drop`.
//!
//! The default engine is `espeak-ng`, driven as a child process with the
//! text on stdin.

use crate::error::SynthesisError;
use crate::output::{AudioArtifact, AudioFormat};
use crate::pipeline::postprocess::strip_emphasis;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Slowest rate a session is ever set to, in words per minute.
pub const MIN_RATE_WPM: u32 = 80;

/// A speech engine that hands out one session per synthesis.
pub trait SpeechEngine: Send + Sync {
    /// Initialise a fresh session.
    fn open(&self) -> Result<Box<dyn SpeechSession>, SynthesisError>;

    /// Container format the sessions write.
    fn format(&self) -> AudioFormat;
}

/// A live engine session. Dropping it releases the engine.
pub trait SpeechSession {
    /// Current speaking rate in words per minute.
    fn rate(&self) -> u32;

    fn set_rate(&mut self, wpm: u32);

    fn set_voice(&mut self, voice: &str);

    /// Speak `text` into an audio file at `path`.
    fn render_to_file(&mut self, text: &str, path: &Path) -> Result<(), SynthesisError>;
}

/// Per-call synthesis settings.
#[derive(Debug, Clone)]
pub struct SpeechOptions {
    pub voice: String,
    /// Words per minute below the engine default.
    pub rate_offset: u32,
    /// Directory receiving the audio file.
    pub out_dir: PathBuf,
}

/// Render `text` to a new audio file.
///
/// `#` and `*` are stripped before the engine sees the text, even if the
/// caller already did so.
pub async fn synthesize(
    engine: Arc<dyn SpeechEngine>,
    text: &str,
    options: &SpeechOptions,
) -> Result<AudioArtifact, SynthesisError> {
    let text = text.to_string();
    let options = options.clone();
    tokio::task::spawn_blocking(move || synthesize_blocking(engine.as_ref(), &text, &options))
        .await
        .map_err(|e| SynthesisError::RenderFailed(format!("speech task panicked: {e}")))?
}

/// Blocking implementation of [`synthesize`].
pub fn synthesize_blocking(
    engine: &dyn SpeechEngine,
    text: &str,
    options: &SpeechOptions,
) -> Result<AudioArtifact, SynthesisError> {
    let plain = strip_emphasis(text);
    if plain.is_empty() {
        return Err(SynthesisError::EmptyText);
    }

    let format = engine.format();
    std::fs::create_dir_all(&options.out_dir).map_err(|source| SynthesisError::Io {
        dir: options.out_dir.clone(),
        source,
    })?;
    // Unique per call; deleted again unless rendering succeeds.
    let target = tempfile::Builder::new()
        .prefix("label-audio-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(&options.out_dir)
        .map_err(|source| SynthesisError::Io {
            dir: options.out_dir.clone(),
            source,
        })?
        .into_temp_path();

    let mut session = engine.open()?;
    let rate = session
        .rate()
        .saturating_sub(options.rate_offset)
        .max(MIN_RATE_WPM);
    session.set_rate(rate);
    session.set_voice(&options.voice);
    debug!(rate, voice = %options.voice, chars = plain.len(), "Rendering speech");
    session.render_to_file(&plain, &target)?;
    drop(session);

    let path = target.keep().map_err(|e| SynthesisError::Io {
        dir: options.out_dir.clone(),
        source: e.error,
    })?;
    info!(path = %path.display(), "Audio ready");
    Ok(AudioArtifact { path, format })
}

// ── espeak-ng ────────────────────────────────────────────────────────────────

/// `espeak-ng` as a speech engine.
#[derive(Debug, Clone)]
pub struct EspeakEngine {
    program: String,
}

impl EspeakEngine {
    /// espeak-ng's default speaking rate.
    pub const DEFAULT_RATE_WPM: u32 = 175;

    pub fn new() -> Self {
        Self {
            program: "espeak-ng".to_string(),
        }
    }

    /// Use a specific executable (e.g. `espeak`) instead of `espeak-ng`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechEngine for EspeakEngine {
    fn open(&self) -> Result<Box<dyn SpeechSession>, SynthesisError> {
        let probe = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SynthesisError::EngineUnavailable(format!("{}: {e}", self.program)))?;
        if !probe.success() {
            return Err(SynthesisError::EngineUnavailable(format!(
                "{} --version exited with {probe}",
                self.program
            )));
        }

        Ok(Box::new(EspeakSession {
            program: self.program.clone(),
            rate: Self::DEFAULT_RATE_WPM,
            voice: "en".to_string(),
            child: None,
        }))
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Wav
    }
}

struct EspeakSession {
    program: String,
    rate: u32,
    voice: String,
    /// Running renderer, if any; reaped on drop.
    child: Option<Child>,
}

impl SpeechSession for EspeakSession {
    fn rate(&self) -> u32 {
        self.rate
    }

    fn set_rate(&mut self, wpm: u32) {
        self.rate = wpm;
    }

    fn set_voice(&mut self, voice: &str) {
        self.voice = voice.to_string();
    }

    fn render_to_file(&mut self, text: &str, path: &Path) -> Result<(), SynthesisError> {
        let child = Command::new(&self.program)
            .arg("-s")
            .arg(self.rate.to_string())
            .arg("-v")
            .arg(&self.voice)
            .arg("-w")
            .arg(path)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SynthesisError::EngineUnavailable(format!("{}: {e}", self.program)))?;
        let child = self.child.insert(child);

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| SynthesisError::RenderFailed(format!("writing to engine: {e}")))?;
        }

        let output = match self.child.take() {
            Some(c) => c
                .wait_with_output()
                .map_err(|e| SynthesisError::RenderFailed(e.to_string()))?,
            None => return Err(SynthesisError::RenderFailed("engine process lost".into())),
        };
        if !output.status.success() {
            return Err(SynthesisError::RenderFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Drop for EspeakSession {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("Stopping unfinished speech engine process");
            let _ = child.kill();
            let _ = child.wait();
        }
        debug!("Speech engine session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        opened: AtomicUsize,
        released: Arc<AtomicUsize>,
        spoken: Arc<Mutex<Vec<(String, u32, String)>>>,
        fail_render: bool,
    }

    struct RecordingSession {
        rate: u32,
        voice: String,
        released: Arc<AtomicUsize>,
        spoken: Arc<Mutex<Vec<(String, u32, String)>>>,
        fail_render: bool,
    }

    impl SpeechEngine for Recording {
        fn open(&self) -> Result<Box<dyn SpeechSession>, SynthesisError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingSession {
                rate: 200,
                voice: String::new(),
                released: Arc::clone(&self.released),
                spoken: Arc::clone(&self.spoken),
                fail_render: self.fail_render,
            }))
        }

        fn format(&self) -> AudioFormat {
            AudioFormat::Wav
        }
    }

    impl SpeechSession for RecordingSession {
        fn rate(&self) -> u32 {
            self.rate
        }
        fn set_rate(&mut self, wpm: u32) {
            self.rate = wpm;
        }
        fn set_voice(&mut self, voice: &str) {
            self.voice = voice.to_string();
        }
        fn render_to_file(&mut self, text: &str, path: &Path) -> Result<(), SynthesisError> {
            if self.fail_render {
                return Err(SynthesisError::RenderFailed("no audio device".into()));
            }
            self.spoken
                .lock()
                .unwrap()
                .push((text.to_string(), self.rate, self.voice.clone()));
            std::fs::write(path, b"RIFF").map_err(|e| SynthesisError::RenderFailed(e.to_string()))
        }
    }

    impl Drop for RecordingSession {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn options(dir: &Path) -> SpeechOptions {
        SpeechOptions {
            voice: "en".into(),
            rate_offset: 50,
            out_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn strips_markers_and_slows_down() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Recording::default();
        let audio =
            synthesize_blocking(&engine, "## Title\n*Warning*", &options(dir.path())).unwrap();

        let spoken = engine.spoken.lock().unwrap();
        assert_eq!(spoken[0].0, "Title\nWarning");
        assert_eq!(spoken[0].1, 150);
        assert_eq!(spoken[0].2, "en");
        assert!(audio.path.exists());
        assert_eq!(audio.format, AudioFormat::Wav);
    }

    #[test]
    fn each_call_gets_a_new_file_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Recording::default();
        let a = synthesize_blocking(&engine, "one", &options(dir.path())).unwrap();
        let b = synthesize_blocking(&engine, "two", &options(dir.path())).unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(engine.opened.load(Ordering::SeqCst), 2);
        assert_eq!(engine.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn session_released_and_file_removed_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Recording {
            fail_render: true,
            ..Default::default()
        };
        let err = synthesize_blocking(&engine, "text", &options(dir.path())).unwrap_err();
        assert!(matches!(err, SynthesisError::RenderFailed(_)));
        assert_eq!(engine.released.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_after_stripping_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Recording::default();
        let err = synthesize_blocking(&engine, "## **", &options(dir.path())).unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyText));
        assert_eq!(engine.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rate_never_drops_below_floor() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Recording::default();
        let mut opts = options(dir.path());
        opts.rate_offset = 500;
        synthesize_blocking(&engine, "slow", &opts).unwrap();
        assert_eq!(engine.spoken.lock().unwrap()[0].1, MIN_RATE_WPM);
    }

    #[test]
    fn missing_espeak_is_unavailable() {
        let engine = EspeakEngine::new().with_program("espeak-ng-does-not-exist-9b2e");
        assert!(matches!(
            engine.open(),
            Err(SynthesisError::EngineUnavailable(_))
        ));
    }
}
