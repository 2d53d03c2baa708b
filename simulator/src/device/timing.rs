use rand::Rng;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::config::TimingConfig;

pub const DOWNLOAD_STEPS: u8 = 10;

#[derive(Debug, Clone)]
pub struct StageTiming {
    pub min_download: Duration,
    pub install: RangeInclusive<Duration>,
    pub reboot: RangeInclusive<Duration>,
}

impl From<&TimingConfig> for StageTiming {
    fn from(config: &TimingConfig) -> Self {
        let secs = |[low, high]: [f64; 2]| {
            Duration::from_secs_f64(low)..=Duration::from_secs_f64(high)
        };
        Self {
            min_download: Duration::from_secs_f64(config.min_download_secs),
            install: secs(config.install_secs),
            reboot: secs(config.reboot_secs),
        }
    }
}

impl StageTiming {
    pub fn install_duration(&self, rng: &mut impl Rng) -> Duration {
        uniform(&self.install, rng)
    }

    pub fn reboot_duration(&self, rng: &mut impl Rng) -> Duration {
        uniform(&self.reboot, rng)
    }
}

fn uniform(range: &RangeInclusive<Duration>, rng: &mut impl Rng) -> Duration {
    if range.start() >= range.end() {
        return *range.start();
    }
    rng.gen_range(range.clone())
}

/// Download split into equal slices, each followed by a 10% progress step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadPlan {
    pub total: Duration,
}

impl DownloadPlan {
    /// `transfer` is the profile's simulated transfer time; it is floored at
    /// `minimum`.
    pub fn new(transfer: Duration, minimum: Duration) -> Self {
        Self {
            total: transfer.max(minimum),
        }
    }

    pub fn step(&self) -> Duration {
        self.total / u32::from(DOWNLOAD_STEPS)
    }

    /// `(progress, wait)` pairs, progress going 10, 20, .. 100.
    pub fn steps(&self) -> impl Iterator<Item = (u8, Duration)> {
        let step = self.step();
        (1..=DOWNLOAD_STEPS).map(move |index| (index * (100 / DOWNLOAD_STEPS), step))
    }
}
