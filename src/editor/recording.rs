use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::storage::NewAttachment;

/// Where a capture device is writing its audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub uri: String,
    pub file_name: String,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct CaptureError {
    message: String,
}

impl CaptureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn unavailable() -> Self {
        Self::new("no audio capture device configured")
    }
}

/// Platform audio recorder. The session only starts, stops and releases it;
/// the bytes never pass through this crate.
pub trait AudioCapture: fmt::Debug {
    fn start(&mut self) -> Result<CaptureTarget, CaptureError>;
    /// Finalises the output file. The device stays held until `release`.
    fn stop(&mut self) -> Result<(), CaptureError>;
    /// Frees the device. Output that was never stopped is discarded.
    fn release(&mut self);
}

#[derive(Debug)]
struct ActiveRecording {
    target: CaptureTarget,
    started_at: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct Recorder {
    capture: Option<Box<dyn AudioCapture>>,
    active: Option<ActiveRecording>,
    // set from a successful start until the device is released
    held: bool,
}

#[derive(Debug)]
pub(crate) enum Begin {
    Started,
    AlreadyRecording,
}

impl Recorder {
    pub fn set_capture(&mut self, capture: Box<dyn AudioCapture>) {
        self.release();
        self.capture = Some(capture);
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.active
            .as_ref()
            .map(|active| now.saturating_duration_since(active.started_at))
    }

    pub fn begin(&mut self, now: Instant) -> Result<Begin, CaptureError> {
        if self.active.is_some() {
            return Ok(Begin::AlreadyRecording);
        }
        let capture = self.capture.as_mut().ok_or_else(CaptureError::unavailable)?;
        let target = capture.start()?;
        self.held = true;
        tracing::debug!(uri = %target.uri, "recording started");
        self.active = Some(ActiveRecording {
            target,
            started_at: now,
        });
        Ok(Begin::Started)
    }

    /// Stops the active recording and releases the device. `Ok(None)` means
    /// nothing was recording or the recording had no measurable length and
    /// was dropped.
    pub fn finish(&mut self, now: Instant) -> Result<Option<NewAttachment>, CaptureError> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        let Some(capture) = self.capture.as_mut() else {
            return Ok(None);
        };
        let stopped = capture.stop();
        self.release();
        stopped?;
        let duration_ms = now.saturating_duration_since(active.started_at).as_millis() as u64;
        if duration_ms == 0 {
            tracing::debug!(uri = %active.target.uri, "empty recording discarded");
            return Ok(None);
        }
        tracing::debug!(uri = %active.target.uri, duration_ms, "recording finished");
        Ok(Some(NewAttachment::audio(
            active.target.uri,
            active.target.file_name,
            duration_ms,
        )))
    }

    /// Drops the active recording, if any. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        let was_recording = self.active.is_some();
        self.release();
        was_recording
    }

    /// Frees the device if a start left it held. Idempotent.
    pub fn release(&mut self) {
        self.active = None;
        if !std::mem::take(&mut self.held) {
            return;
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.release();
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.active.is_some() {
            tracing::debug!("releasing capture with a recording still running");
        }
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub struct CaptureLog {
        pub starts: usize,
        pub stops: usize,
        pub releases: usize,
    }

    /// In-memory capture that numbers its output files.
    #[derive(Debug, Clone, Default)]
    pub struct FakeCapture {
        pub log: Arc<Mutex<CaptureLog>>,
        pub fail_stop: bool,
    }

    impl AudioCapture for FakeCapture {
        fn start(&mut self) -> Result<CaptureTarget, CaptureError> {
            let mut log = self.log.lock();
            log.starts += 1;
            let file_name = format!("memo-{}.m4a", log.starts);
            Ok(CaptureTarget {
                uri: format!("file:///recordings/{file_name}"),
                file_name,
            })
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            if self.fail_stop {
                return Err(CaptureError::new("device lost"));
            }
            self.log.lock().stops += 1;
            Ok(())
        }

        fn release(&mut self) {
            self.log.lock().releases += 1;
        }
    }
}
