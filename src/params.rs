// Scoring parameters for the linear gap model.

use crate::error::{AlignError, Result};

/// Alignment mode. Only local (Smith-Waterman-style, 0 floor) is supported;
/// the enum exists so the mode travels with the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentMode {
    Local,
}

/// The four integer costs of the linear gap model. Penalties are stored as
/// non-negative magnitudes and subtracted where they apply.
#[derive(Debug, Clone, Copy)]
pub struct ScoreParams {
    pub match_score: i32,
    pub mismatch: i32,
    pub ins: i32,
    pub del: i32,
    pub mode: AlignmentMode,
}

impl ScoreParams {
    /// Upper bound for each parameter. The traceback phase logs per-cell
    /// vertical score differences in `i8`, which caps the usable magnitudes.
    pub const MAX_PARAM: i32 = 127;

    pub fn new(match_score: i32, mismatch: i32, ins: i32, del: i32) -> Result<Self> {
        for (name, value) in [
            ("match", match_score),
            ("mismatch", mismatch),
            ("ins", ins),
            ("del", del),
        ] {
            if !(0..=Self::MAX_PARAM).contains(&value) {
                return Err(AlignError::InvalidArgument(format!(
                    "scoring parameter --{} must be in 0..={}, got {}",
                    name,
                    Self::MAX_PARAM,
                    value
                )));
            }
        }
        Ok(Self {
            match_score,
            mismatch,
            ins,
            del,
            mode: AlignmentMode::Local,
        })
    }

    /// Substitution score for a query byte against a vertex label.
    #[inline]
    pub fn substitution(&self, query: u8, label: u8) -> i32 {
        if query == label {
            self.match_score
        } else {
            -self.mismatch
        }
    }
}
