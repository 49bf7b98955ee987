use std::sync::{Arc, Mutex};

use sigil::engine::Notifier;

/// A notifier that records every (title, body) pair it is asked to show.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

/// A notifier that always fails.
#[derive(Debug, Clone, Default)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _title: &str, _body: &str) -> anyhow::Result<()> {
        anyhow::bail!("notification daemon unavailable")
    }
}
