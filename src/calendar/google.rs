//! Google Calendar v3 client: freeBusy and events.insert

use super::credentials::CredentialStore;
use super::{BusyInterval, CalendarError, CalendarProvider, MeetingRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

pub struct GoogleCalendar {
    http: Client,
    credentials: Arc<CredentialStore>,
    calendar_id: String,
    base_url: String,
}

impl GoogleCalendar {
    /// HTTP client used for both API calls and token refresh
    pub fn http_client() -> Result<Client, CalendarError> {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CalendarError::Http(format!("Failed to create HTTP client: {e}")))
    }

    pub fn new(http: Client, credentials: Arc<CredentialStore>) -> Self {
        Self {
            http,
            credentials,
            calendar_id: "primary".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Persist credentials on shutdown
    pub async fn release(&self) -> Result<(), CalendarError> {
        self.credentials.release().await
    }

    async fn post<B: Serialize + Sync>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<String, CalendarError> {
        let token = self.credentials.access_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .query(query)
            .json(body)
            .send()
            .await
            .map_err(|e| CalendarError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CalendarError::Http(format!("Failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(CalendarError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn list_busy(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let body = FreeBusyRequest {
            time_min,
            time_max,
            items: vec![CalendarRef {
                id: &self.calendar_id,
            }],
        };
        let url = format!("{}/freeBusy", self.base_url);
        let text = self.post(&url, &[], &body).await?;
        let parsed: FreeBusyResponse = serde_json::from_str(&text)
            .map_err(|e| CalendarError::Http(format!("Failed to parse freeBusy response: {e}")))?;
        Ok(busy_for(parsed, &self.calendar_id))
    }

    async fn create_event(&self, meeting: &MeetingRequest) -> Result<Option<String>, CalendarError> {
        let body = EventBody::from_meeting(meeting);
        let url = format!("{}/calendars/{}/events", self.base_url, self.calendar_id);
        let text = self.post(&url, &[("sendUpdates", "all")], &body).await?;
        let parsed: EventResponse = serde_json::from_str(&text)
            .map_err(|e| CalendarError::Http(format!("Failed to parse event response: {e}")))?;
        tracing::info!(event_id = ?parsed.id, "Calendar event created");
        Ok(parsed.html_link)
    }
}

fn busy_for(response: FreeBusyResponse, calendar_id: &str) -> Vec<BusyInterval> {
    let mut busy: Vec<BusyInterval> = response
        .calendars
        .get(calendar_id)
        .map(|c| c.busy.clone())
        .unwrap_or_default();
    busy.sort_by_key(|b| b.start);
    busy
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: DateTime<Utc>,
    time_max: DateTime<Utc>,
    items: Vec<CalendarRef<'a>>,
}

#[derive(Debug, Serialize)]
struct CalendarRef<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyInterval>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBody {
    summary: String,
    description: String,
    start: EventTime,
    end: EventTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attendees: Vec<Attendee>,
    reminders: Reminders,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: DateTime<Utc>,
    time_zone: &'static str,
}

#[derive(Debug, Serialize)]
struct Attendee {
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
    overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Serialize)]
struct ReminderOverride {
    method: &'static str,
    minutes: u32,
}

impl EventBody {
    fn from_meeting(meeting: &MeetingRequest) -> Self {
        let attendees = if meeting.attendee_email.is_empty() {
            Vec::new()
        } else {
            vec![Attendee {
                email: meeting.attendee_email.clone(),
            }]
        };
        Self {
            summary: meeting.summary.clone(),
            description: meeting.description.clone(),
            start: EventTime {
                date_time: meeting.start,
                time_zone: "UTC",
            },
            end: EventTime {
                date_time: meeting.start + meeting.duration,
                time_zone: "UTC",
            },
            attendees,
            reminders: Reminders {
                use_default: false,
                overrides: vec![
                    ReminderOverride {
                        method: "email",
                        minutes: 24 * 60,
                    },
                    ReminderOverride {
                        method: "popup",
                        minutes: 30,
                    },
                ],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResponse {
    id: Option<String>,
    html_link: Option<String>,
}
