use chrono::{DateTime, Local};

use crate::models::UsageSession;

/// Splits the day into active computer-usage intervals based on whether any
/// window is visible. At most one session is open at a time.
#[derive(Debug, Default)]
pub struct UsageSessionTracker {
    sessions: Vec<UsageSession>,
}

impl UsageSessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, has_visible_window: bool, now: DateTime<Local>) {
        match (has_visible_window, self.is_active()) {
            (true, false) => {
                log::debug!("[Usage] Session opened at {}", now.format("%H:%M:%S"));
                self.sessions.push(UsageSession {
                    start: now,
                    end: None,
                    duration_seconds: 0.0,
                });
            }
            (false, true) => self.close(now),
            _ => {}
        }
    }

    /// Closes the open session, if any.
    pub fn close(&mut self, now: DateTime<Local>) {
        if let Some(session) = self.sessions.last_mut().filter(|s| s.is_open()) {
            session.end = Some(now);
            session.duration_seconds = seconds_between(session.start, now);
            log::debug!("[Usage] Session closed after {:.0}s", session.duration_seconds);
        }
    }

    pub fn is_active(&self) -> bool {
        self.sessions.last().is_some_and(UsageSession::is_open)
    }

    pub fn sessions(&self) -> &[UsageSession] {
        &self.sessions
    }

    /// Closed durations plus the running time of the open session.
    pub fn total_active_seconds(&self, now: DateTime<Local>) -> f64 {
        self.sessions
            .iter()
            .map(|s| match s.end {
                Some(_) => s.duration_seconds,
                None => seconds_between(s.start, now),
            })
            .sum()
    }
}

fn seconds_between(start: DateTime<Local>, end: DateTime<Local>) -> f64 {
    ((end - start).num_milliseconds() as f64 / 1000.0).max(0.0)
}
