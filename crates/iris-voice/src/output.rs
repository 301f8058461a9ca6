//! Audio playback for synthesized speech.
//!
//! The arbiter owns exactly one sink; `play` blocks its worker until the
//! utterance finishes, which is what serializes all narration.

use crate::error::{VoiceError, VoiceResult};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use tracing::info;

/// One playback resource. `play` blocks until the audio finishes.
pub trait AudioSink {
    fn play(&mut self, bytes: &[u8]) -> VoiceResult<()>;
    /// Stop immediately and clear anything queued on the device.
    fn stop(&mut self);
}

/// Default output device via rodio. Not `Send` on some platforms, so it is
/// constructed inside the worker thread that uses it.
pub struct SpeakerSink {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
}

impl SpeakerSink {
    pub fn new() -> VoiceResult<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&stream_handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        info!(target: "iris::audio", "speaker sink ready for TTS playback");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
        })
    }
}

impl AudioSink for SpeakerSink {
    fn play(&mut self, bytes: &[u8]) -> VoiceResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let cursor = Cursor::new(bytes.to_vec());
        let source = Decoder::new(cursor)
            .map_err(|e| VoiceError::Playback(format!("decode failed: {e}")))?;
        self.sink.append(source.convert_samples::<f32>());
        self.sink.sleep_until_end();
        Ok(())
    }

    fn stop(&mut self) {
        self.sink.stop();
    }
}
