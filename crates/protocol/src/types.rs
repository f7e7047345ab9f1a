//! REST resources shared with the API
//!
//! Field names follow the server's JSON (`_id`, camelCase). Documents the
//! server may or may not populate are modelled with [`Ref`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anything addressable by a server document id
pub trait Identified {
    fn id(&self) -> &str;
}

/// A reference that is either a bare document id or the populated document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Id(String),
    Doc(T),
}

impl<T: Identified> Ref<T> {
    pub fn id(&self) -> &str {
        match self {
            Ref::Id(id) => id,
            Ref::Doc(doc) => doc.id(),
        }
    }

    pub fn doc(&self) -> Option<&T> {
        match self {
            Ref::Id(_) => None,
            Ref::Doc(doc) => Some(doc),
        }
    }
}

/// An account as returned by the API
///
/// Fields this crate does not model are kept in `extra` so a persisted user
/// survives a save/load cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(rename = "isVerified", default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

/// GeoJSON point, coordinates are `[lng, lat]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "point_kind")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

fn point_kind() -> String {
    "Point".to_string()
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            kind: point_kind(),
            coordinates: vec![lng, lat],
        }
    }

    pub fn lng(&self) -> Option<f64> {
        self.coordinates.first().copied()
    }

    pub fn lat(&self) -> Option<f64> {
        self.coordinates.get(1).copied()
    }
}

/// A venue events take place at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
}

impl Identified for Location {
    fn id(&self) -> &str {
        &self.id
    }
}

/// An event; its id doubles as the chat room id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Ref<Location>>,
    #[serde(default)]
    pub attendees: Vec<Ref<User>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Ref<User>>,
}

impl Identified for Event {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Event {
    pub fn has_attendee(&self, user_id: &str) -> bool {
        self.attendees.iter().any(|a| a.id() == user_id)
    }

    pub fn location_name(&self) -> Option<&str> {
        self.location
            .as_ref()
            .and_then(Ref::doc)
            .map(|loc| loc.name.as_str())
    }
}

/// A chat message posted in an event room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Room (event) id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub sender: Ref<User>,
    pub text: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChatMessage {
    pub fn sender_name(&self) -> &str {
        self.sender
            .doc()
            .map(|u| u.username.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("unknown")
    }
}

/// Response of `GET /chat/:roomId`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// One unread notification from `GET /notifications/unread`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadNotification {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Room (event) id the notification belongs to
    pub event: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Response of `GET /users/:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: User,
    #[serde(default)]
    pub events: Vec<Event>,
}

// Auth

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleLoginRequest {
    pub credential: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

// Events, locations, profile

/// Body of `POST /events` and `PUT /events/:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventForm {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
    #[serde(rename = "locationId", default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLocationRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "avatarUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Error body; the API uses either key depending on the route
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.error.or(self.message).filter(|m| !m.trim().is_empty())
    }
}
