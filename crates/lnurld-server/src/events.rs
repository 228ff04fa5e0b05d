//! Events that identities proven through LNURL-auth can sign up for.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lnurld_shared::crypto::random_id;
use lnurld_shared::Event;
use lnurld_store::RecordStore;
use serde::Serialize;
use tracing::info;

use crate::auth::AuthenticationService;
use crate::error::ServerError;

/// Public view of an event. Attendees appear only by public id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    #[serde(flatten)]
    pub event: Event,
    pub attendees: Vec<String>,
    pub is_full: bool,
}

pub struct EventService {
    store: Arc<RecordStore>,
    auth: Arc<AuthenticationService>,
}

impl EventService {
    pub fn new(store: Arc<RecordStore>, auth: Arc<AuthenticationService>) -> Self {
        Self { store, auth }
    }

    pub async fn create_event(&self, owner: &str, mut event: Event) -> Result<Event, ServerError> {
        event.validate()?;
        event.id = random_id();
        event.owner = owner.to_string();
        self.store.create_event(&event).await?;
        info!(event = %event.id, owner, title = %event.title, "Event created");
        Ok(event)
    }

    pub async fn get_event(&self, id: &str) -> Result<Event, ServerError> {
        self.store
            .get_event(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("event {id}")))
    }

    pub async fn list_events(&self) -> Result<Vec<Event>, ServerError> {
        Ok(self.store.list_events().await?)
    }

    pub async fn details(&self, id: &str) -> Result<EventDetails, ServerError> {
        let event = self.get_event(id).await?;
        let attendees: Vec<String> = self
            .store
            .get_attendees(id)
            .await?
            .iter()
            .map(|identity| identity.public_id())
            .collect();
        Ok(EventDetails {
            is_full: attendees.len() >= event.capacity as usize,
            event,
            attendees,
        })
    }

    /// Sign the identity verified under `k1` up for the event. Signing up
    /// twice is accepted and recorded once.
    pub async fn sign_up(&self, id: &str, k1: &str, now: DateTime<Utc>) -> Result<String, ServerError> {
        let identity = self
            .auth
            .get_identity(k1)
            .await
            .ok_or(ServerError::InvalidChallenge)?;
        let event = self.get_event(id).await?;
        if event.is_in_past(now) {
            return Err(ServerError::BadRequest("event has already ended".into()));
        }

        let attendees = self.store.get_attendees(id).await?;
        if attendees.contains(&identity) {
            return Ok(identity.public_id());
        }
        if attendees.len() >= event.capacity as usize {
            return Err(ServerError::BadRequest("event is full".into()));
        }

        self.store.add_attendee(id, &identity).await?;
        info!(event = %id, public_id = %identity.public_id(), "Signed up for event");
        Ok(identity.public_id())
    }
}
