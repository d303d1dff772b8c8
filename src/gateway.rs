use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::export::AttributeRow;

// ---------------------------------------------------------------------------
// Configuration Constants
// ---------------------------------------------------------------------------

const TOKEN_PATH: &str = "auth/v1/token";
const LOGOUT_PATH: &str = "auth/v1/logout";
const USERS_PATH: &str = "rest/v1/users";
const SESSIONS_PATH: &str = "rest/v1/sessions";
const SESSION_DATA_PATH: &str = "rest/v1/session_data";
const REQUEST_TIMEOUT_SECS: u64 = 20;

// ---------------------------------------------------------------------------
// Error Handling
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),

    #[error("backend rejected {operation} ({status}): {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("expected exactly one user named {name:?}, found {found}")]
    UserLookup { name: String, found: usize },

    #[error("backend returned no row for {0}")]
    EmptyResponse(&'static str),

    #[error("not signed in")]
    NotAuthenticated,
}

// ---------------------------------------------------------------------------
// Data Structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The athlete the gateway is currently signed in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub athlete: String,
    pub user_id: String,
    access_token: String,
}

impl Identity {
    pub fn new(athlete: impl Into<String>, user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            athlete: athlete.into(),
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSession {
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionRow {
    id: i64,
}

/// The remote store finished sessions are written to.
pub trait SessionGateway {
    /// Signs in as `athlete`, switching away from any other signed-in athlete first.
    fn authenticate(&mut self, athlete: &str, credentials: &Credentials) -> Result<Identity, GatewayError>;
    fn sign_out(&mut self) -> Result<(), GatewayError>;
    fn current_identity(&self) -> Option<&Identity>;
    /// Resolves a user row by name; zero or several matches is an error.
    fn find_user_by_name(&self, name: &str) -> Result<String, GatewayError>;
    fn insert_session(&self, session: &NewSession) -> Result<i64, GatewayError>;
    fn insert_attribute_rows(&self, rows: &[AttributeRow]) -> Result<(), GatewayError>;
}

// ---------------------------------------------------------------------------
// Hosted REST implementation
// ---------------------------------------------------------------------------

/// Talks to a hosted Postgres REST endpoint plus its password auth service.
#[derive(Debug)]
pub struct RestGateway {
    client: Client,
    base_url: Url,
    api_key: String,
    identity: Option<Identity>,
}

impl RestGateway {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            identity: None,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(self.base_url.join(path)?)
    }

    /// Adds the project key and, when signed in, the user's bearer token.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .identity
            .as_ref()
            .map_or(self.api_key.as_str(), |id| id.access_token.as_str());
        request.header("apikey", &self.api_key).bearer_auth(token)
    }

    fn check(response: Response, operation: &'static str) -> Result<Response, GatewayError> {
        let status = response.status();
        debug!("{operation}: HTTP {status}");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        warn!("{operation} rejected with {status}: {body}");
        Err(GatewayError::Rejected {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    fn sign_in(&mut self, athlete: &str, credentials: &Credentials) -> Result<Identity, GatewayError> {
        let mut url = self.endpoint(TOKEN_PATH)?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()?;
        let token: TokenResponse = Self::check(response, "sign in")?.json()?;

        let identity = Identity::new(athlete, token.user.id, token.access_token);
        info!("signed in as {} ({})", identity.athlete, identity.user_id);
        self.identity = Some(identity.clone());
        Ok(identity)
    }
}

impl SessionGateway for RestGateway {
    fn authenticate(&mut self, athlete: &str, credentials: &Credentials) -> Result<Identity, GatewayError> {
        match &self.identity {
            Some(current) if current.athlete == athlete => return Ok(current.clone()),
            Some(current) => {
                info!("switching identity from {} to {}", current.athlete, athlete);
                if let Err(e) = self.sign_out() {
                    warn!("sign out before switching identity failed: {e}");
                }
            }
            None => {}
        }
        self.sign_in(athlete, credentials)
    }

    fn sign_out(&mut self) -> Result<(), GatewayError> {
        let Some(identity) = self.identity.take() else {
            return Ok(());
        };
        let response = self
            .client
            .post(self.endpoint(LOGOUT_PATH)?)
            .header("apikey", &self.api_key)
            .bearer_auth(&identity.access_token)
            .send()?;
        Self::check(response, "sign out")?;
        info!("signed out {}", identity.athlete);
        Ok(())
    }

    fn current_identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn find_user_by_name(&self, name: &str) -> Result<String, GatewayError> {
        let mut url = self.endpoint(USERS_PATH)?;
        url.query_pairs_mut()
            .append_pair("select", "id")
            .append_pair("name", &format!("eq.{name}"));

        let response = self.authorized(self.client.get(url)).send()?;
        let users: Vec<UserRow> = Self::check(response, "user lookup")?.json()?;
        match users.as_slice() {
            [user] => Ok(user.id.clone()),
            _ => Err(GatewayError::UserLookup {
                name: name.to_string(),
                found: users.len(),
            }),
        }
    }

    fn insert_session(&self, session: &NewSession) -> Result<i64, GatewayError> {
        let response = self
            .authorized(self.client.post(self.endpoint(SESSIONS_PATH)?))
            .header("Prefer", "return=representation")
            .json(session)
            .send()?;
        let rows: Vec<SessionRow> = Self::check(response, "session insert")?.json()?;
        let id = rows
            .first()
            .map(|row| row.id)
            .ok_or(GatewayError::EmptyResponse("session insert"))?;
        info!("inserted session {id}");
        Ok(id)
    }

    fn insert_attribute_rows(&self, rows: &[AttributeRow]) -> Result<(), GatewayError> {
        let response = self
            .authorized(self.client.post(self.endpoint(SESSION_DATA_PATH)?))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()?;
        Self::check(response, "attribute insert")?;
        info!("inserted {} attribute rows", rows.len());
        Ok(())
    }
}
