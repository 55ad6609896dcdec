//! Capture of external tool output for synchronous operations.
//!
//! `vagrant up` output is returned to the caller as a transcript while also
//! flowing to a passive wire logger for diagnostics.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Receives output of an external process, one chunk at a time.
pub trait OutputListener: Send + Sync {
    fn on_output(&self, output: &str);
}

/// Logs every chunk at debug level.
#[derive(Debug, Default, Clone)]
pub struct WireLogger {
    label: String,
}

impl WireLogger {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl OutputListener for WireLogger {
    fn on_output(&self, output: &str) {
        debug!(target: "vagrant::wire", project = %self.label, "{}", output.trim_end());
    }
}

/// Forwards and accumulates output while a recording session is active.
///
/// Sessions must not overlap: one `record()`/`stop_recording()` pair at a time.
pub struct OutputRecorder {
    next: Arc<dyn OutputListener>,
    /// `Some` while recording
    buffer: Mutex<Option<String>>,
}

impl OutputRecorder {
    pub fn new(next: Arc<dyn OutputListener>) -> Self {
        Self {
            next,
            buffer: Mutex::new(None),
        }
    }

    /// Start a session, discarding anything left from a previous one.
    pub fn record(&self) {
        *self.buffer.lock() = Some(String::new());
    }

    /// End the session and return everything written since `record()`.
    pub fn stop_recording(&self) -> String {
        self.buffer.lock().take().unwrap_or_default()
    }

    pub fn is_recording(&self) -> bool {
        self.buffer.lock().is_some()
    }
}

impl OutputListener for OutputRecorder {
    fn on_output(&self, output: &str) {
        {
            let mut buffer = self.buffer.lock();
            match buffer.as_mut() {
                Some(buffer) => buffer.push_str(output),
                None => return,
            }
        }
        self.next.on_output(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl OutputListener for Collect {
        fn on_output(&self, output: &str) {
            self.0.lock().push(output.to_string());
        }
    }

    #[test]
    fn test_forwards_only_while_recording() {
        let sink = Arc::new(Collect::default());
        let recorder = OutputRecorder::new(sink.clone());

        recorder.on_output("before\n");
        recorder.record();
        recorder.on_output("Bringing machine 'm1' up...\n");
        recorder.on_output("Machine booted and ready!\n");
        let transcript = recorder.stop_recording();
        recorder.on_output("after\n");

        assert_eq!(
            transcript,
            "Bringing machine 'm1' up...\nMachine booted and ready!\n"
        );
        assert_eq!(
            *sink.0.lock(),
            vec![
                "Bringing machine 'm1' up...\n".to_string(),
                "Machine booted and ready!\n".to_string()
            ]
        );
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_buffer_resets_between_sessions() {
        let recorder = OutputRecorder::new(Arc::new(WireLogger::new("g1")));

        recorder.record();
        recorder.on_output("first");
        assert_eq!(recorder.stop_recording(), "first");

        recorder.record();
        recorder.on_output("second");
        assert_eq!(recorder.stop_recording(), "second");

        // Stopping without a session yields nothing
        assert_eq!(recorder.stop_recording(), "");
    }
}
