//! Flap detection
//!
//! A service keeps the significance codes of its last [`FLAP_HISTORY_LEN`]
//! events, oldest first. State changes between consecutive entries are summed
//! with a weight that grows towards the newer end of the window, giving an
//! instability percentage that is compared against the template's low/high
//! thresholds.
//!
//! ```text
//! history:  0 0 2 0 2 2 0 ...   (oldest → newest)
//! weight:  .80 .82 .84 .86 ...  (+0.02 per step)
//! instability = floor(sum(weight where entry != previous) / 20 * 100)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of samples kept per service
pub const FLAP_HISTORY_LEN: usize = 20;

// Weights in hundredths so the score is exact
const INITIAL_WEIGHT: u32 = 80;
const WEIGHT_STEP: u32 = 2;

/// Code used to pad a short or missing history
const PAD_CODE: u8 = 0;

/// Fixed-length rolling window of state codes
///
/// The window always holds exactly [`FLAP_HISTORY_LEN`] entries. Histories
/// loaded from storage are normalized on the way in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct FlapHistory {
    entries: [u8; FLAP_HISTORY_LEN],
}

impl FlapHistory {
    /// A history of only OK samples
    pub fn new() -> Self {
        Self {
            entries: [PAD_CODE; FLAP_HISTORY_LEN],
        }
    }

    /// Builds a history from a stored sequence of any length
    ///
    /// - empty: reset to all OK
    /// - shorter: left-padded with OK
    /// - longer: only the newest entries are kept
    pub fn normalize(raw: &[u8]) -> Self {
        let mut history = Self::new();
        let kept = &raw[raw.len().saturating_sub(FLAP_HISTORY_LEN)..];
        let offset = FLAP_HISTORY_LEN - kept.len();
        history.entries[offset..].copy_from_slice(kept);
        history
    }

    /// Drops the oldest entry and appends `code` as the newest
    pub fn push(&mut self, code: u8) {
        self.entries.rotate_left(1);
        self.entries[FLAP_HISTORY_LEN - 1] = code;
    }

    pub fn entries(&self) -> &[u8] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Weighted instability score in percent
    pub fn instability_percent(&self) -> u32 {
        let mut weight = INITIAL_WEIGHT;
        let mut changes = 0;
        let mut last = self.entries[0];

        for &entry in &self.entries {
            if entry != last {
                changes += weight;
            }
            weight += WEIGHT_STEP;
            last = entry;
        }

        changes / FLAP_HISTORY_LEN as u32
    }
}

impl Default for FlapHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FlapHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

impl From<Vec<u8>> for FlapHistory {
    fn from(raw: Vec<u8>) -> Self {
        Self::normalize(&raw)
    }
}

impl From<FlapHistory> for Vec<u8> {
    fn from(history: FlapHistory) -> Self {
        history.entries.to_vec()
    }
}

/// Outcome of comparing an instability score against the thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlapEvaluation {
    /// Below the low threshold, was not flapping
    Stable,
    /// Above the high threshold, was already flapping
    Flapping,
    StartsFlapping,
    StopsFlapping,
    /// Inside the hysteresis band, flag left as it was
    Unchanged,
}

impl FlapEvaluation {
    pub fn evaluate(instability: u32, low: u32, high: u32, was_flapping: bool) -> FlapEvaluation {
        if instability < low {
            if was_flapping {
                return FlapEvaluation::StopsFlapping;
            }
            return FlapEvaluation::Stable;
        }

        if instability > high {
            if was_flapping {
                return FlapEvaluation::Flapping;
            }
            return FlapEvaluation::StartsFlapping;
        }

        FlapEvaluation::Unchanged
    }

    /// Flag value after applying this evaluation
    pub fn is_flapping(self, was_flapping: bool) -> bool {
        match self {
            FlapEvaluation::Stable | FlapEvaluation::StopsFlapping => false,
            FlapEvaluation::Flapping | FlapEvaluation::StartsFlapping => true,
            FlapEvaluation::Unchanged => was_flapping,
        }
    }
}
