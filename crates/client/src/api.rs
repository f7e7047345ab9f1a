//! Typed wrappers for the API endpoints

use loners_protocol::{
    AuthResponse, ChatHistory, CreateLocationRequest, Event, EventForm, GoogleLoginRequest,
    Location, LoginRequest, ResendVerificationRequest, SignupRequest, UnreadNotification,
    UpdateProfileRequest, User, UserProfile,
};

use crate::error::ApiError;
use crate::http::{segment, ApiClient, ApiRequest};
use crate::session::LogoutReason;

impl ApiClient {
    // Auth

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let request = ApiRequest::post("/auth/login").json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        self.establish(request).await
    }

    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        let request = ApiRequest::post("/auth/signup").json(&SignupRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        })?;
        self.establish(request).await
    }

    /// Sign in with a Google identity credential
    pub async fn google_login(&self, credential: &str) -> Result<User, ApiError> {
        let request = ApiRequest::post("/auth/google").json(&GoogleLoginRequest {
            credential: credential.to_string(),
        })?;
        self.establish(request).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), ApiError> {
        self.send_empty(ApiRequest::get(format!(
            "/auth/verify-email/{}",
            segment(token)
        )))
        .await
    }

    pub async fn resend_verification(&self, email: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/resend-verification").json(
            &ResendVerificationRequest {
                email: email.to_string(),
            },
        )?;
        self.send_empty(request).await
    }

    /// Local only; the API keeps no server-side session to end
    pub fn logout(&self) -> Result<(), ApiError> {
        self.session().logout(LogoutReason::UserRequested)?;
        Ok(())
    }

    async fn establish(&self, request: ApiRequest) -> Result<User, ApiError> {
        let auth: AuthResponse = self.send(request).await?;
        self.session()
            .login(auth.user.clone(), auth.token, auth.refresh_token)?;
        Ok(auth.user)
    }

    // Notifications

    pub async fn unread_notifications(&self) -> Result<Vec<UnreadNotification>, ApiError> {
        self.send(ApiRequest::get("/notifications/unread")).await
    }

    pub async fn mark_room_read(&self, room_id: &str) -> Result<(), ApiError> {
        self.send_empty(ApiRequest::post(format!(
            "/notifications/mark-read/{}",
            segment(room_id)
        )))
        .await
    }

    // Chat

    pub async fn chat_history(&self, room_id: &str) -> Result<ChatHistory, ApiError> {
        self.send(ApiRequest::get(format!("/chat/{}", segment(room_id))))
            .await
    }

    /// Events the user can chat in
    pub async fn chat_rooms(&self) -> Result<Vec<Event>, ApiError> {
        self.send(ApiRequest::get("/chat/rooms")).await
    }

    // Events

    pub async fn nearby_events(&self, lat: f64, lng: f64) -> Result<Vec<Event>, ApiError> {
        self.send(
            ApiRequest::get("/events/nearby")
                .query("lat", lat)
                .query("lng", lng),
        )
        .await
    }

    pub async fn event(&self, event_id: &str) -> Result<Event, ApiError> {
        self.send(ApiRequest::get(format!("/events/{}", segment(event_id))))
            .await
    }

    /// Events the user created or joined
    pub async fn my_events(&self) -> Result<Vec<Event>, ApiError> {
        self.send(ApiRequest::get("/events/my-involved")).await
    }

    pub async fn create_event(&self, form: &EventForm) -> Result<(), ApiError> {
        self.send_empty(ApiRequest::post("/events").json(form)?)
            .await
    }

    pub async fn update_event(&self, event_id: &str, form: &EventForm) -> Result<(), ApiError> {
        self.send_empty(ApiRequest::put(format!("/events/{}", segment(event_id))).json(form)?)
            .await
    }

    pub async fn join_event(&self, event_id: &str) -> Result<(), ApiError> {
        self.send_empty(ApiRequest::post(format!(
            "/events/{}/join",
            segment(event_id)
        )))
        .await
    }

    // Locations

    pub async fn search_locations(&self, query: &str) -> Result<Vec<Location>, ApiError> {
        self.send(ApiRequest::get("/locations").query("query", query))
            .await
    }

    pub async fn create_location(
        &self,
        location: &CreateLocationRequest,
    ) -> Result<Location, ApiError> {
        self.send(ApiRequest::post("/locations").json(location)?)
            .await
    }

    // Users

    /// Update the profile and the stored user with the server's copy
    pub async fn update_profile(&self, changes: &UpdateProfileRequest) -> Result<User, ApiError> {
        let user: User = self
            .send(ApiRequest::put("/users/me").json(changes)?)
            .await?;
        self.session().update_user(user.clone())?;
        Ok(user)
    }

    pub async fn user_profile(&self, user_id: &str) -> Result<UserProfile, ApiError> {
        self.send(ApiRequest::get(format!("/users/{}", segment(user_id))))
            .await
    }
}
