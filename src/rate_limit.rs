// Minimum-interval rule for agent beacons.
//
// Agents beacon on a one-minute timer that can fire a few seconds early, so the
// cutoff sits just under a minute. Beacons inside it are ignored, not rejected:
// an agent's retry loop must stay harmless.

use std::fmt;

/// Where a beacon falls relative to the agent's previous checkin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconInterval {
    /// No earlier checkin on record for this agent.
    First,
    /// Arrived before the minimum interval elapsed.
    TooSoon { gap_secs: i64 },
    /// Far enough from the previous checkin to be scored.
    Since { gap_secs: i64 },
}

impl BeaconInterval {
    /// Classify a beacon at `now` against the agent's last checkin time.
    ///
    /// A last checkin in the future (collector clock stepped back) yields a
    /// negative gap, which is always too soon.
    pub fn classify(last_checkin: Option<i64>, now: i64, min_interval_secs: i64) -> Self {
        match last_checkin {
            None => BeaconInterval::First,
            Some(last) => {
                let gap_secs = now - last;
                if gap_secs < min_interval_secs {
                    BeaconInterval::TooSoon { gap_secs }
                } else {
                    BeaconInterval::Since { gap_secs }
                }
            }
        }
    }

    /// Gap to the previous checkin, if there was one.
    pub fn gap_secs(&self) -> Option<i64> {
        match self {
            BeaconInterval::First => None,
            BeaconInterval::TooSoon { gap_secs } | BeaconInterval::Since { gap_secs } => {
                Some(*gap_secs)
            }
        }
    }
}

impl fmt::Display for BeaconInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeaconInterval::First => write!(f, "first checkin"),
            BeaconInterval::TooSoon { gap_secs } => write!(f, "too soon ({gap_secs}s since last)"),
            BeaconInterval::Since { gap_secs } => write!(f, "{gap_secs}s since last"),
        }
    }
}
