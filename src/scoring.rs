// Callback scoring: exponential decay of a target's value over the gap between beacons.
//
// Scores are minute-granular. A gap of exactly one minute earns the full
// target value; a gap that rounds past the decay window earns the floor.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_INTERVAL_SECS: i64 = 59;
pub const DEFAULT_MAX_WINDOW_SECS: i64 = 15 * 60;
pub const DEFAULT_DECAY_BASE: f64 = 1.2;
pub const DEFAULT_DECAY_RATE: f64 = -0.9;

/// Smallest score a scored checkin can be worth.
pub const FLOOR_POINTS: i64 = 1;

const SECS_PER_MINUTE: i64 = 60;

/// Timing rules shared by the intake pipeline and the scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Beacons closer than this to the agent's previous checkin are ignored.
    pub min_interval_secs: i64,
    /// Decay window. Gaps past it score the floor; pairs idle past it are dead.
    pub max_window_secs: i64,
    pub decay_base: f64,
    pub decay_rate: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            min_interval_secs: DEFAULT_MIN_INTERVAL_SECS,
            max_window_secs: DEFAULT_MAX_WINDOW_SECS,
            decay_base: DEFAULT_DECAY_BASE,
            decay_rate: DEFAULT_DECAY_RATE,
        }
    }
}

impl ScoringPolicy {
    /// Points for a beacon arriving `gap_secs` after the previous one.
    ///
    /// `round(value * base^(rate * (minutes - 1)))`, never below [`FLOOR_POINTS`].
    /// The window comparison uses the gap rounded to the nearest minute, while
    /// the exponent uses whole elapsed minutes.
    pub fn callback_points(&self, gap_secs: i64, target_value: i64) -> i64 {
        if round_to_minute(gap_secs) > self.max_window_secs {
            return FLOOR_POINTS;
        }

        let minutes = gap_secs / SECS_PER_MINUTE;
        let points = (target_value as f64 * self.decay_multiplier(minutes)).round() as i64;
        points.max(FLOOR_POINTS)
    }

    /// Multiplier applied to a target's value after `minutes` whole minutes.
    pub fn decay_multiplier(&self, minutes: i64) -> f64 {
        self.decay_base.powf(self.decay_rate * (minutes - 1) as f64)
    }

    /// A pair whose latest checkin is older than the window no longer scores.
    pub fn is_dead(&self, age_secs: i64) -> bool {
        age_secs > self.max_window_secs
    }
}

/// Round seconds to the nearest whole minute, half away from zero.
fn round_to_minute(secs: i64) -> i64 {
    let rounded = (secs.abs() + SECS_PER_MINUTE / 2) / SECS_PER_MINUTE * SECS_PER_MINUTE;
    if secs < 0 {
        -rounded
    } else {
        rounded
    }
}
