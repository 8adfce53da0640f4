use std::time::Duration;

/// Staggers the first transfers of a run so `threads` workers do not all
/// open a connection to the destination at once.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    threads: usize,
    cap: Duration,
}

impl Pacer {
    pub fn new(threads: usize, cap: Duration) -> Self {
        Self { threads, cap }
    }

    /// `threads / 10`, rounded half away from zero.
    fn tenth(&self) -> u64 {
        ((self.threads as u64) + 5) / 10
    }

    /// Number of leading units that are delayed at all.
    pub fn window(&self) -> u64 {
        self.threads as u64 + self.tenth().max(1)
    }

    /// Delay before unit `seq` starts transferring.
    pub fn delay_for(&self, seq: u64) -> Duration {
        if self.threads < 2 || seq >= self.window() {
            return Duration::ZERO;
        }
        let secs = seq as f64 / (self.tenth() + 1) as f64;
        Duration::from_secs_f64(secs).min(self.cap)
    }
}
