use rand::Rng;
use rand::seq::index;

use super::types::RatePath;

/// Years after a crash whose growth is floored when recovery is enforced.
pub const RECOVERY_WINDOW_YEARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrashScenario {
    pub num_crashes: u32,
    /// Crash severity in percent, usually negative.
    pub crash_percent: f64,
    pub enforce_recovery: bool,
}

impl CrashScenario {
    /// Crashes per trajectory after capping at the horizon length.
    pub fn effective_crashes(&self, years: usize) -> usize {
        (self.num_crashes as usize).min(years)
    }
}

/// Overwrites crash years in every row of `growth` with the crash rate and,
/// when recovery is enforced, floors the following years at the crash's
/// absolute magnitude.
///
/// Crash years are drawn per row without replacement and processed in draw
/// order. A scenario with no crashes leaves `growth` untouched and consumes no
/// randomness.
pub fn inject_crashes<R: Rng + ?Sized>(growth: &mut RatePath, scenario: CrashScenario, rng: &mut R) {
    let years = growth.cols();
    let crashes = scenario.effective_crashes(years);
    if crashes == 0 {
        return;
    }

    let crash_rate = scenario.crash_percent / 100.0;
    let recovery_floor = scenario.crash_percent.abs() / 100.0;

    for sim in 0..growth.rows() {
        let row = growth.row_mut(sim);
        for year in index::sample(rng, years, crashes).into_iter() {
            row[year] = crash_rate;
            if scenario.enforce_recovery {
                let end = (year + 1 + RECOVERY_WINDOW_YEARS).min(years);
                for rate in &mut row[year + 1..end] {
                    *rate = rate.max(recovery_floor);
                }
            }
        }
    }
}
