use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_EVENT_CAPACITY, MAX_EVENT_DESCRIPTION_LENGTH, MAX_LOCATION_URL_LENGTH, MAX_TITLE_LENGTH,
};
use crate::error::ValidationError;
use crate::raffle::validate_text;

/// An event that LNURL-auth identities can sign up for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub owner: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: EventLocation,
    pub capacity: u16,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLocation {
    pub name: String,
    pub url: String,
}

impl Event {
    pub fn is_in_past(&self, now: DateTime<Utc>) -> bool {
        self.end < now
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_text("title", &self.title, MAX_TITLE_LENGTH)?;
        if self.end <= self.start {
            return Err(ValidationError::new("end", "must be after start"));
        }
        validate_text("location name", &self.location.name, MAX_TITLE_LENGTH)?;
        if self.location.url.len() > MAX_LOCATION_URL_LENGTH
            || !(self.location.url.starts_with("https://")
                || self.location.url.starts_with("http://"))
        {
            return Err(ValidationError::new(
                "location url",
                format!("must be an http(s) URL of at most {MAX_LOCATION_URL_LENGTH} characters"),
            ));
        }
        if self.capacity < 1 || self.capacity > MAX_EVENT_CAPACITY {
            return Err(ValidationError::new(
                "capacity",
                format!("must be between 1 and {MAX_EVENT_CAPACITY}"),
            ));
        }
        validate_text("description", &self.description, MAX_EVENT_DESCRIPTION_LENGTH)
    }

    /// RFC 5545 calendar entry for the event.
    pub fn to_icalendar(&self, host: &str, now: DateTime<Utc>) -> String {
        [
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            "PRODID:-//lnurld//NONSGML LNURL Daemon//EN".to_string(),
            "BEGIN:VEVENT".to_string(),
            format!("UID:event-{}@{}", self.id, host),
            format!("DTSTAMP:{}", icalendar_date_time(now)),
            format!("SUMMARY:{}", icalendar_text(&self.title)),
            format!("DTSTART:{}", icalendar_date_time(self.start)),
            format!("DTEND:{}", icalendar_date_time(self.end)),
            format!("LOCATION:{}", icalendar_text(&self.location.name)),
            format!("DESCRIPTION:{}", icalendar_text(&self.description)),
            "END:VEVENT".to_string(),
            "END:VCALENDAR".to_string(),
        ]
        .iter()
        .map(|line| format!("{line}\n"))
        .collect()
    }
}

fn icalendar_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(';', "\\;")
        .replace(',', "\\,")
}

fn icalendar_date_time(date_time: DateTime<Utc>) -> String {
    date_time.format("%Y%m%dT%H%M%SZ").to_string()
}
