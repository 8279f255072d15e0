//! Local Whisper transcription via whisper.cpp bindings.
//!
//! The model is a scarce exclusive resource: it is loaded lazily inside each
//! transcription call and dropped when the call ends, so peak memory is
//! bounded to one loaded model rather than held for the process lifetime.

use super::{TranscribeError, Transcriber, Transcription};
use crate::progress::ProgressHandle;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper expects 16 kHz mono f32 PCM.
const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// On-device transcription provider backed by whisper.cpp.
pub struct LocalWhisperTranscriber {
    model_path: PathBuf,
}

impl LocalWhisperTranscriber {
    /// Create a new local Whisper transcriber.
    ///
    /// Falls back to the default model location under the user data dir when
    /// no path is configured. The model file must already exist; downloading
    /// models is the surrounding app's concern.
    pub fn new(model_path: Option<PathBuf>) -> Result<Self, TranscribeError> {
        let model_path = model_path.or_else(Self::default_model_path).ok_or_else(|| {
            TranscribeError::ModelNotAvailable("no Whisper model path configured".to_string())
        })?;

        if !model_path.is_file() {
            return Err(TranscribeError::ModelNotAvailable(format!(
                "Whisper model not found: {}",
                model_path.display()
            )));
        }

        Ok(Self { model_path })
    }

    /// Default model storage path (e.g. `~/.local/share/echonote/models`).
    pub fn default_model_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("echonote").join("models").join("ggml-base.en.bin"))
    }

    /// Decode a WAV file into 16 kHz mono f32 samples.
    fn decode_wav(audio_ref: &Path) -> Result<Vec<f32>, TranscribeError> {
        let display = audio_ref.display().to_string();

        let mut reader = hound::WavReader::open(audio_ref).map_err(|e| match e {
            hound::Error::IoError(ref io) if io.kind() == std::io::ErrorKind::NotFound => {
                TranscribeError::FileNotFound(display.clone())
            }
            other => TranscribeError::ConversionFailed(format!(
                "failed to open {}: {}",
                display, other
            )),
        })?;

        let spec = reader.spec();
        if spec.sample_rate != WHISPER_SAMPLE_RATE {
            return Err(TranscribeError::ConversionFailed(format!(
                "expected {} Hz audio, got {} Hz",
                WHISPER_SAMPLE_RATE, spec.sample_rate
            )));
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| TranscribeError::ConversionFailed(e.to_string()))?,
            hound::SampleFormat::Int => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<_, _>>()
                .map_err(|e| TranscribeError::ConversionFailed(e.to_string()))?,
        };

        if samples.is_empty() {
            return Err(TranscribeError::EmptyFile(display));
        }

        let mono = match spec.channels {
            1 => samples,
            2 => samples
                .chunks_exact(2)
                .map(|pair| (pair[0] + pair[1]) / 2.0)
                .collect(),
            n => {
                return Err(TranscribeError::ConversionFailed(format!(
                    "unsupported channel count: {}",
                    n
                )))
            }
        };

        Ok(mono)
    }
}

#[async_trait]
impl Transcriber for LocalWhisperTranscriber {
    async fn transcribe(
        &self,
        audio_ref: &Path,
        language_hint: Option<&str>,
        progress: ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<Transcription, TranscribeError> {
        let model_path = self.model_path.clone();
        let audio_ref = audio_ref.to_path_buf();
        let language = language_hint.map(str::to_owned);
        let cancel = cancel.clone();

        // Inference is CPU-bound; run it on the blocking pool. Cancellation
        // is observed through whisper's abort callback (checked per encoder
        // frame), so we do not need to race the join handle against the
        // token.
        let result = tokio::task::spawn_blocking(move || {
            let samples = Self::decode_wav(&audio_ref)?;
            let duration_secs = samples.len() as f32 / WHISPER_SAMPLE_RATE as f32;
            progress.report(0.05);

            if cancel.is_cancelled() {
                return Err(TranscribeError::Cancelled);
            }

            // Lazy-load the model for this job only; dropped on return.
            let ctx = WhisperContext::new_with_params(
                &model_path.to_string_lossy(),
                WhisperContextParameters::default(),
            )
            .map_err(|e| {
                TranscribeError::ModelNotAvailable(format!("failed to load Whisper model: {}", e))
            })?;

            let mut state = ctx.create_state().map_err(|e| {
                TranscribeError::ModelNotAvailable(format!("failed to create Whisper state: {}", e))
            })?;
            progress.report(0.1);

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_language(language.as_deref());
            params.set_print_special(false);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);

            {
                let progress = progress.clone();
                params.set_progress_callback_safe(move |percent: i32| {
                    // whisper reports 0..100; map into the 0.1..0.9 band.
                    let fraction = (percent.clamp(0, 100) as f32) / 100.0;
                    progress.report(0.1 + fraction * 0.8);
                });
            }

            {
                let cancel = cancel.clone();
                params.set_abort_callback_safe(move || cancel.is_cancelled());
            }

            let run = state.full(params, &samples);

            if cancel.is_cancelled() {
                return Err(TranscribeError::Cancelled);
            }
            run.map_err(|e| {
                TranscribeError::ConversionFailed(format!("Whisper inference failed: {}", e))
            })?;

            let mut text = String::new();
            let segment_count = state.full_n_segments().map_err(|e| {
                TranscribeError::ConversionFailed(format!("Whisper segment error: {}", e))
            })?;
            for i in 0..segment_count {
                let segment = state.full_get_segment_text(i).map_err(|e| {
                    TranscribeError::ConversionFailed(format!("Whisper segment error: {}", e))
                })?;
                text.push_str(&segment);
            }

            progress.report(0.95);
            Ok(Transcription {
                text: text.trim_start().to_string(),
                duration_secs: Some(duration_secs),
            })
        })
        .await
        .map_err(|e| TranscribeError::ConversionFailed(format!("Whisper worker failed: {}", e)))?;

        result
    }

    fn name(&self) -> &'static str {
        "local-whisper"
    }
}
