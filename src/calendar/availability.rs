//! Free slot computation
//!
//! Pure: the same `now` and busy set always produce the same slot list.

use super::{BusyInterval, Slot};
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Working-hours policy for offering meeting slots
#[derive(Debug, Clone)]
pub struct AvailabilityRules {
    /// Days after today to scan (today included, so `days_ahead + 1` days)
    pub days_ahead: u32,
    /// First slot start hour, local time
    pub start_hour: u32,
    /// Slots start strictly before this hour, local time
    pub end_hour: u32,
    pub slot_minutes: i64,
    /// Minimum distance between now and a slot start
    pub lead_time: Duration,
    pub max_slots: usize,
    /// Business time zone; working hours follow its DST rules
    pub timezone: Tz,
}

impl Default for AvailabilityRules {
    fn default() -> Self {
        Self {
            days_ahead: 7,
            start_hour: 9,
            end_hour: 18,
            slot_minutes: 30,
            lead_time: Duration::hours(2),
            max_slots: 10,
            timezone: chrono_tz::Asia::Dubai,
        }
    }
}

impl AvailabilityRules {
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(self.slot_minutes)
    }

    /// Free/busy query window for a lookup made at `now`
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now, now + Duration::days(i64::from(self.days_ahead)))
    }

    /// Human-readable label in the business time zone
    pub fn display(&self, start: DateTime<Utc>) -> String {
        start
            .with_timezone(&self.timezone)
            .format("%A, %B %d at %I:%M %p")
            .to_string()
    }
}

/// Hourly candidate slots on weekdays within working hours, skipping anything
/// inside the lead time or overlapping a busy interval. Chronological, capped
/// at `rules.max_slots`.
pub fn available_slots(
    rules: &AvailabilityRules,
    now: DateTime<Utc>,
    busy: &[BusyInterval],
) -> Vec<Slot> {
    let earliest = now + rules.lead_time;
    let today = now.with_timezone(&rules.timezone).date_naive();
    let mut slots = Vec::new();

    for day in 0..=rules.days_ahead {
        let date = today + Duration::days(i64::from(day));
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }

        for hour in rules.start_hour..rules.end_hour {
            let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) else {
                continue;
            };
            // Hours skipped by a DST jump have no start
            let Some(local_start) = rules
                .timezone
                .from_local_datetime(&date.and_time(time))
                .earliest()
            else {
                continue;
            };

            let start = local_start.with_timezone(&Utc);
            if start <= earliest {
                continue;
            }
            let end = start + rules.slot_duration();

            if busy.iter().any(|b| b.overlaps(start, end)) {
                continue;
            }

            slots.push(Slot {
                start,
                end,
                display: rules.display(start),
            });
            if slots.len() >= rules.max_slots {
                return slots;
            }
        }
    }

    slots
}
