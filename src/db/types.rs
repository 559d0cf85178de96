use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

/// Review lifecycle of an exam. Variants are declared in workflow order and
/// the order is load-bearing: an exam only ever moves down this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "previewstate", rename_all = "snake_case")]
pub(crate) enum PreviewState {
    Draft,
    PreviewInProgress,
    PreviewComplete,
    Finalized,
}

/// Whether finalization may skip the preview steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FinalizePolicy {
    pub(crate) require_completed_preview: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// State moved forward; `from` is the state it left.
    Advanced { from: PreviewState },
    /// Target already reached or passed; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum TransitionError {
    #[error("exam is finalized and cannot move to {to}")]
    Finalized { to: PreviewState },
    #[error("exam cannot move from {from} back to {to}")]
    Backward { from: PreviewState, to: PreviewState },
    #[error("preview must be completed before finalizing (current state: {from})")]
    PreviewNotCompleted { from: PreviewState },
}

impl PreviewState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PreviewInProgress => "preview_in_progress",
            Self::PreviewComplete => "preview_complete",
            Self::Finalized => "finalized",
        }
    }

    /// Finalized exams reject every write to questions and marking rules.
    pub(crate) fn is_locked(self) -> bool {
        matches!(self, Self::Finalized)
    }

    /// Decides what moving towards `target` means from the current state.
    ///
    /// Requesting a state the exam already holds, or one it has already
    /// passed, is a no-op as long as the exam is not finalized. Finalized has
    /// no outgoing edges and nothing ever returns to draft.
    pub(crate) fn plan(
        self,
        target: PreviewState,
        policy: FinalizePolicy,
    ) -> Result<Transition, TransitionError> {
        if self == target {
            return Ok(Transition::Unchanged);
        }
        if self.is_locked() {
            return Err(TransitionError::Finalized { to: target });
        }
        if target == Self::Draft {
            return Err(TransitionError::Backward { from: self, to: target });
        }
        if self > target {
            return Ok(Transition::Unchanged);
        }
        if target == Self::Finalized
            && policy.require_completed_preview
            && self != Self::PreviewComplete
        {
            return Err(TransitionError::PreviewNotCompleted { from: self });
        }

        Ok(Transition::Advanced { from: self })
    }
}

impl fmt::Display for PreviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-point mark with two decimal places, stored as hundredths.
///
/// Aggregation is integer arithmetic so recomputing a summary always yields
/// identical output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Type)]
#[sqlx(transparent)]
pub(crate) struct Mark(i64);

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub(crate) enum MarkError {
    #[error("mark must be a finite number")]
    NotFinite,
    #[error("mark {0} has more than two decimal places")]
    TooPrecise(f64),
    #[error("mark {0} is out of range")]
    OutOfRange(f64),
}

impl Mark {
    pub(crate) const SCALE: i64 = 100;
    pub(crate) const ZERO: Mark = Mark(0);
    /// Upper bound for a single question's points or penalty.
    pub(crate) const MAX: Mark = Mark(1_000_000 * Self::SCALE);

    #[cfg(test)]
    pub(crate) const fn from_hundredths(value: i64) -> Self {
        Self(value)
    }

    pub(crate) const fn whole(points: i64) -> Self {
        Self(points * Self::SCALE)
    }

    #[cfg(test)]
    pub(crate) fn hundredths(self) -> i64 {
        self.0
    }

    /// Converts a decimal wire value, refusing anything finer than 0.01.
    pub(crate) fn from_decimal(value: f64) -> Result<Self, MarkError> {
        if !value.is_finite() {
            return Err(MarkError::NotFinite);
        }

        let scaled = value * Self::SCALE as f64;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(MarkError::TooPrecise(value));
        }
        // Wider than MAX so that negative and oversized inputs still reach the
        // range checks of the marking rule with their real value.
        if rounded.abs() > (Self::MAX.0 as f64) * 1_000.0 {
            return Err(MarkError::OutOfRange(value));
        }

        Ok(Self(rounded as i64))
    }

    pub(crate) fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub(crate) fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Divides by `count`, rounding half away from zero. Zero for `count == 0`.
    pub(crate) fn div_round(self, count: usize) -> Self {
        let Ok(divisor) = i64::try_from(count) else {
            return Self::ZERO;
        };
        if divisor == 0 {
            return Self::ZERO;
        }

        let half = divisor / 2;
        let adjusted = if self.0 >= 0 { self.0 + half } else { self.0 - half };
        Self(adjusted / divisor)
    }
}

impl Add for Mark {
    type Output = Mark;

    fn add(self, rhs: Mark) -> Mark {
        Mark(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Mark {
    fn sum<I: Iterator<Item = Mark>>(iter: I) -> Mark {
        iter.fold(Mark::ZERO, Add::add)
    }
}

impl Serialize for Mark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        write!(f, "{sign}{}.{:02}", abs / scale, abs % scale)
    }
}
