//! Progress projection for a fanned-out job.
//!
//! [`FanOutProgress`] is the per-job bookkeeping the runner keeps while its
//! sub-operations poll; [`progress_message`] turns it into the string shown
//! on the job.

pub const QUEUED_MESSAGE: &str = "Queued...";
pub const INITIALIZING_MESSAGE: &str = "Initializing generation...";
pub const COMPLETED_MESSAGE: &str = "Completed";
pub const FAILED_MESSAGE: &str = "Failed";

#[derive(Debug, Clone, PartialEq)]
pub struct FanOutProgress {
    percents: Vec<Option<f64>>,
    last_updated: Option<usize>,
}

impl FanOutProgress {
    pub fn new(total: usize) -> Self {
        Self {
            percents: vec![None; total],
            last_updated: None,
        }
    }

    pub fn total(&self) -> usize {
        self.percents.len()
    }

    /// Records a poll tick for `index`. A missing percentage counts as 0.
    pub fn record(&mut self, index: usize, percent: Option<f64>) {
        if let Some(slot) = self.percents.get_mut(index) {
            *slot = Some(percent.unwrap_or(0.0));
            self.last_updated = Some(index);
        }
    }

    pub fn percent(&self, index: usize) -> Option<f64> {
        self.percents.get(index).copied().flatten()
    }

    pub fn last_updated(&self) -> Option<usize> {
        self.last_updated
    }
}

/// `Generating output i/N... (p%)` for the most recently updated output, or
/// the initializing message while nothing has reported yet.
pub fn progress_message(progress: &FanOutProgress) -> String {
    let Some(index) = progress.last_updated() else {
        return INITIALIZING_MESSAGE.to_string();
    };
    let percent = floor_percent(progress.percent(index));
    format!(
        "Generating output {}/{}... ({}%)",
        index + 1,
        progress.total(),
        percent
    )
}

/// Shown while output `index` (zero-based) of `total` is being fetched.
pub fn downloading_message(index: usize, total: usize) -> String {
    format!("Downloading video for output {}/{}...", index + 1, total)
}

fn floor_percent(percent: Option<f64>) -> u32 {
    match percent {
        Some(p) if p.is_finite() => p.clamp(0.0, 100.0).floor() as u32,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_most_recently_updated_output() {
        let mut progress = FanOutProgress::new(3);
        assert_eq!(progress_message(&progress), INITIALIZING_MESSAGE);

        progress.record(0, Some(12.0));
        assert_eq!(progress_message(&progress), "Generating output 1/3... (12%)");

        progress.record(2, Some(40.9));
        assert_eq!(progress_message(&progress), "Generating output 3/3... (40%)");

        progress.record(0, Some(55.0));
        assert_eq!(progress_message(&progress), "Generating output 1/3... (55%)");
    }

    #[test]
    fn missing_or_odd_percentages_clamp() {
        let mut progress = FanOutProgress::new(2);
        progress.record(1, None);
        assert_eq!(progress_message(&progress), "Generating output 2/2... (0%)");

        progress.record(1, Some(f64::NAN));
        assert_eq!(progress_message(&progress), "Generating output 2/2... (0%)");

        progress.record(1, Some(130.0));
        assert_eq!(progress_message(&progress), "Generating output 2/2... (100%)");

        progress.record(1, Some(-3.0));
        assert_eq!(progress_message(&progress), "Generating output 2/2... (0%)");
    }

    #[test]
    fn download_message_is_one_based() {
        assert_eq!(downloading_message(0, 1), "Downloading video for output 1/1...");
        assert_eq!(downloading_message(2, 4), "Downloading video for output 3/4...");
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut progress = FanOutProgress::new(1);
        progress.record(4, Some(50.0));
        assert_eq!(progress.last_updated(), None);
    }
}
