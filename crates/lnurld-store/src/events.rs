//! Event records: `events/<id>/event.json` and the `attendees.csv` log of
//! signed-up identities.

use lnurld_shared::{Event, Identity};

use crate::error::Result;
use crate::records::RecordStore;

const EVENTS: &str = "events";

fn event_key(id: &str, file: &str) -> String {
    format!("{EVENTS}/{id}/{file}")
}

impl RecordStore {
    pub async fn create_event(&self, event: &Event) -> Result<()> {
        self.create_object(&event_key(&event.id, "event.json"), event)
            .await
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        self.read_object(&event_key(id, "event.json")).await
    }

    /// All events, soonest first.
    pub async fn list_events(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for id in self.list_dirs(EVENTS).await? {
            if let Some(event) = self.get_event(&id).await? {
                events.push(event);
            }
        }
        events.sort_by_key(|event| event.start);
        Ok(events)
    }

    pub async fn add_attendee(&self, id: &str, identity: &Identity) -> Result<()> {
        self.append_line(&event_key(id, "attendees.csv"), identity.as_str())
            .await
    }

    /// Signed-up identities in sign-up order, without duplicates.
    pub async fn get_attendees(&self, id: &str) -> Result<Vec<Identity>> {
        let mut attendees: Vec<Identity> = Vec::new();
        for line in self.read_lines(&event_key(id, "attendees.csv")).await? {
            let identity = Identity::new(line);
            if !attendees.contains(&identity) {
                attendees.push(identity);
            }
        }
        Ok(attendees)
    }
}
