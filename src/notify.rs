//! User-visible notifications.

use std::sync::{Arc, Mutex};

/// Message shown when an export fails.
pub const EXPORT_FAILED_MESSAGE: &str = "Failed to generate image. Please try again.";

pub trait Notifier {
    fn notify(&self, message: &str);
}

/// Logs at error level and prints to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::error!("{message}");
        eprintln!("{message}");
    }
}

/// Records messages; clones share storage.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        if let Ok(mut m) = self.messages.lock() {
            m.push(message.to_string());
        }
    }
}
