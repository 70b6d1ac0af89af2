//! Max-age step schedule
//!
//! An immutable, strictly increasing list of max-age values plus the
//! permanent value committed once the list is exhausted. Reaching the last
//! step does not promote by itself: promotion is a separate operation
//! triggered by a later certificate renewal, so every host spends at least
//! one renewal cycle at the largest non-permanent value.

use autohsts_config::{check_schedule, AutoHstsSettings, ScheduleError};

/// One position in the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// 0-based position
    pub index: usize,
    /// Max-age applied at this position, in seconds
    pub max_age: u64,
    /// Whether this is the final non-permanent position
    pub is_last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSchedule {
    steps: Vec<u64>,
    permanent: u64,
}

impl StepSchedule {
    /// Build a schedule, checking ordering and the permanent value
    pub fn new(steps: Vec<u64>, permanent: u64) -> Result<Self, ScheduleError> {
        check_schedule(&steps, permanent)?;
        Ok(Self { steps, permanent })
    }

    pub fn from_settings(settings: &AutoHstsSettings) -> Result<Self, ScheduleError> {
        Self::new(settings.steps.clone(), settings.permanent_secs)
    }

    /// Number of non-permanent steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; construction rejects empty schedules
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    /// Step at `index`, or `None` past the end
    pub fn step(&self, index: usize) -> Option<Step> {
        self.steps.get(index).map(|&max_age| Step {
            index,
            max_age,
            is_last: index == self.last_index(),
        })
    }

    /// Initial step applied on activation
    pub fn first(&self) -> Step {
        Step {
            index: 0,
            max_age: self.steps[0],
            is_last: self.steps.len() == 1,
        }
    }

    /// Step following `index`, or `None` when `index` is already the last
    pub fn next_after(&self, index: usize) -> Option<Step> {
        index.checked_add(1).and_then(|next| self.step(next))
    }

    pub fn permanent(&self) -> u64 {
        self.permanent
    }

    pub fn steps(&self) -> &[u64] {
        &self.steps
    }
}

impl Default for StepSchedule {
    fn default() -> Self {
        Self {
            steps: autohsts_config::DEFAULT_STEPS.to_vec(),
            permanent: autohsts_config::DEFAULT_PERMANENT_SECS,
        }
    }
}
