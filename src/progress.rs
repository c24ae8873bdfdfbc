//! Diagnostics sink for long running import steps.
//!
//! Progress reporting is informational only and never changes what an
//! operation computes.

pub trait Progress {
    fn info(&mut self, message: &str);

    fn warn(&mut self, message: &str);

    /// Report `current` of `total` units done.
    fn set_progress(&mut self, current: usize, total: usize);

    fn set_action(&mut self, action: &str) {
        self.info(action);
    }
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_percent: Option<usize>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Progress for LogProgress {
    fn info(&mut self, message: &str) {
        log::info!("{}", message);
    }

    fn warn(&mut self, message: &str) {
        log::warn!("{}", message);
    }

    fn set_progress(&mut self, current: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = current.min(total) * 100 / total;
        // Only every tenth percent, the loops calling this are tight.
        if self.last_percent.map(|p| p / 10) != Some(percent / 10) {
            self.last_percent = Some(percent);
            log::debug!("{}% ({}/{})", percent, current, total);
        }
    }
}

/// Discards all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn info(&mut self, _message: &str) {}

    fn warn(&mut self, _message: &str) {}

    fn set_progress(&mut self, _current: usize, _total: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        warnings: Vec<String>,
    }

    impl Progress for Recorder {
        fn info(&mut self, _message: &str) {}

        fn warn(&mut self, message: &str) {
            self.warnings.push(message.to_string());
        }

        fn set_progress(&mut self, _current: usize, _total: usize) {}
    }

    #[test]
    fn test_log_progress_tracks_decile() {
        let mut progress = LogProgress::new();
        progress.set_progress(5, 100);
        assert_eq!(progress.last_percent, Some(5));
        progress.set_progress(9, 100);
        assert_eq!(progress.last_percent, Some(5));
        progress.set_progress(10, 100);
        assert_eq!(progress.last_percent, Some(10));
        progress.set_progress(1, 0);
        assert_eq!(progress.last_percent, Some(10));
    }

    #[test]
    fn test_trait_object_usage() {
        let mut recorder = Recorder::default();
        {
            let progress: &mut dyn Progress = &mut recorder;
            progress.set_action("merging");
            progress.warn("odd intersection count");
        }
        assert_eq!(recorder.warnings, vec!["odd intersection count".to_string()]);
    }
}
