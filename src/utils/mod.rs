use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Logs how long a CLI operation took when it goes out of scope.
pub struct Timer {
    label: String,
    start: Instant,
    note: Option<String>,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        debug!("⏱  {}", label);
        Self {
            label,
            start: Instant::now(),
            note: None,
        }
    }

    /// Attach a short result summary to the final log line.
    pub fn note(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        match &self.note {
            Some(note) => info!("⏱  {}: {} (took {:.2?})", self.label, note, self.elapsed()),
            None => info!("⏱  {} (took {:.2?})", self.label, self.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_tracks_elapsed_and_note() {
        let mut t = Timer::start("houseTrades");
        t.note("3 records from house-api");
        std::thread::sleep(Duration::from_millis(5));
        assert!(t.elapsed() >= Duration::from_millis(5));
        assert_eq!(t.note.as_deref(), Some("3 records from house-api"));
    }
}
