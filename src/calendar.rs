//! Calendar provider: free/busy lookup and meeting creation
//!
//! The booking handler and the session runtime receive an
//! `Arc<dyn CalendarProvider>` built once at startup.

mod availability;
mod credentials;
mod google;

pub use availability::{available_slots, AvailabilityRules};
pub use credentials::{authorize, CredentialStore};
pub use google::GoogleCalendar;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A candidate meeting time offered to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local-time label, e.g. "Monday, March 03 at 09:00 AM"
    pub display: String,
}

/// A reported busy period, UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    /// Intervals overlap unless one ends at or before the other starts
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !(end <= self.start || start >= self.end)
    }
}

/// Everything needed to put a meeting on the calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRequest {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub attendee_email: String,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Calendar credentials missing: {0}")]
    Credentials(String),
    #[error("Calendar authorization failed: {0}")]
    Auth(String),
    #[error("Calendar request failed: {0}")]
    Http(String),
    #[error("Calendar API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Calendar unavailable: {0}")]
    Unavailable(String),
    #[error("Calendar I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy intervals between `time_min` and `time_max`, in order
    async fn list_busy(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError>;

    /// Create the event; returns a confirmation link when the provider gives one
    async fn create_event(&self, meeting: &MeetingRequest) -> Result<Option<String>, CalendarError>;
}

/// Query busy times for the lookahead window and compute free slots
pub async fn find_available_slots(
    provider: &dyn CalendarProvider,
    rules: &AvailabilityRules,
    now: DateTime<Utc>,
) -> Result<Vec<Slot>, CalendarError> {
    let (time_min, time_max) = rules.window(now);
    let busy = provider.list_busy(time_min, time_max).await?;
    Ok(available_slots(rules, now, &busy))
}

/// Stand-in used when credentials could not be acquired at startup
pub struct UnavailableCalendar {
    reason: String,
}

impl UnavailableCalendar {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CalendarProvider for UnavailableCalendar {
    async fn list_busy(
        &self,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        Err(CalendarError::Unavailable(self.reason.clone()))
    }

    async fn create_event(&self, _meeting: &MeetingRequest) -> Result<Option<String>, CalendarError> {
        Err(CalendarError::Unavailable(self.reason.clone()))
    }
}
