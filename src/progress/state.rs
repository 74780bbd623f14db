//! Progress node state.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Level of a node in the progress hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressLevel {
    Application,
    Course,
    ContentType,
    Item,
    Download,
}

impl fmt::Display for ProgressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressLevel::Application => "application",
            ProgressLevel::Course => "course",
            ProgressLevel::ContentType => "content_type",
            ProgressLevel::Item => "item",
            ProgressLevel::Download => "download",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a progress node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Error,
}

impl ProgressStatus {
    /// Only `pending -> active -> {completed | error}` is allowed.
    pub fn can_transition_to(self, next: ProgressStatus) -> bool {
        matches!(
            (self, next),
            (ProgressStatus::Pending, ProgressStatus::Active)
                | (ProgressStatus::Active, ProgressStatus::Completed)
                | (ProgressStatus::Active, ProgressStatus::Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Error)
    }
}

/// One node of the progress hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressState {
    pub level: ProgressLevel,
    pub name: String,
    pub current: u64,
    pub total: u64,
    pub status: ProgressStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    pub warnings: Vec<String>,
}

impl ProgressState {
    pub fn new(level: ProgressLevel, name: impl Into<String>) -> Self {
        Self {
            level,
            name: name.into(),
            current: 0,
            total: 0,
            status: ProgressStatus::Pending,
            started_at: None,
            finished_at: None,
            bytes_downloaded: 0,
            total_bytes: 0,
            success_count: 0,
            error_count: 0,
            skip_count: 0,
            warnings: Vec::new(),
        }
    }

    /// A node that is already active.
    pub fn started(level: ProgressLevel, name: impl Into<String>, total: u64) -> Self {
        let mut state = Self::new(level, name);
        state.total = total;
        state.transition(ProgressStatus::Active);
        state
    }

    /// Move to `next` if the transition is allowed. Returns whether it happened.
    pub fn transition(&mut self, next: ProgressStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::debug!(
                level = %self.level,
                name = %self.name,
                from = ?self.status,
                to = ?next,
                "Ignoring progress transition"
            );
            return false;
        }

        let now = Utc::now();
        match next {
            ProgressStatus::Active => self.started_at = Some(now),
            ProgressStatus::Completed | ProgressStatus::Error => self.finished_at = Some(now),
            ProgressStatus::Pending => {}
        }
        self.status = next;
        true
    }

    /// Advance `current` without ever moving backwards or past `total`.
    pub fn advance_to(&mut self, current: u64) {
        let mut next = current.max(self.current);
        if self.total > 0 {
            next = next.min(self.total);
        }
        self.current = next;
    }

    /// Increment `current` by one, capped at `total` when known.
    pub fn increment(&mut self) {
        self.advance_to(self.current + 1);
    }

    /// `current / total * 100`, or 0 when the total is unknown.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64 * 100.0).min(100.0)
        }
    }

    /// Time since the node became active, up to its end if finished.
    pub fn elapsed(&self) -> Duration {
        let Some(start) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - start).to_std().unwrap_or(Duration::ZERO)
    }

    /// Linear estimate of the remaining time.
    pub fn eta(&self) -> Option<Duration> {
        if self.current == 0 || self.total == 0 || self.current >= self.total {
            return None;
        }
        let per_unit = self.elapsed().as_secs_f64() / self.current as f64;
        Some(Duration::from_secs_f64(
            per_unit * (self.total - self.current) as f64,
        ))
    }

    pub fn speed_bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.bytes_downloaded as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotone_transitions() {
        let mut state = ProgressState::new(ProgressLevel::Course, "c");
        assert!(!state.transition(ProgressStatus::Completed));
        assert!(!state.transition(ProgressStatus::Error));
        assert!(state.transition(ProgressStatus::Active));
        assert!(state.started_at.is_some());
        assert!(!state.transition(ProgressStatus::Pending));
        assert!(state.transition(ProgressStatus::Error));
        assert!(!state.transition(ProgressStatus::Completed));
        assert!(!state.transition(ProgressStatus::Active));
        assert_eq!(state.status, ProgressStatus::Error);
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn test_percentage() {
        let mut state = ProgressState::new(ProgressLevel::ContentType, "files");
        assert_eq!(state.percentage(), 0.0);
        state.advance_to(3);
        assert_eq!(state.percentage(), 0.0);

        state.total = 4;
        state.advance_to(2);
        assert_eq!(state.current, 3);
        assert_eq!(state.percentage(), 75.0);

        state.advance_to(10);
        assert_eq!(state.current, 4);
        assert_eq!(state.percentage(), 100.0);
    }

    #[test]
    fn test_eta_requires_progress() {
        let state = ProgressState::started(ProgressLevel::ContentType, "files", 10);
        assert!(state.eta().is_none());
    }
}
