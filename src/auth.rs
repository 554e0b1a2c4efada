// src/auth.rs
use crate::error::AppError;
use crate::models::Flash;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const STATE_COOKIE: &str = "oidc_state";
pub const FLASH_COOKIE: &str = "flash";

const SESSION_HOURS: i64 = 8;
const STATE_MINUTES: i64 = 10;
const FLASH_MINUTES: i64 = 5;

/// The signed-in user, carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginState {
    pub state: String,
    pub next: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlashClaims {
    messages: Vec<Flash>,
    exp: usize,
}

fn expiry(duration: Duration) -> usize {
    (Utc::now() + duration).timestamp() as usize
}

/// HS256 signing for every cookie the application issues.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AppError> {
        Ok(encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(&self.secret),
        )?)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, AppError> {
        let data = decode::<T>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    pub fn create_session_token(&self, claims: &IdClaims) -> Result<String, AppError> {
        self.sign(&UserSession {
            sub: claims.sub.clone(),
            name: claims.name.clone(),
            email: claims.email.clone(),
            exp: expiry(Duration::hours(SESSION_HOURS)),
        })
    }

    pub fn verify_session(&self, token: &str) -> Result<UserSession, AppError> {
        self.verify(token)
    }

    pub fn create_state_token(&self, state: &str, next: &str) -> Result<String, AppError> {
        self.sign(&LoginState {
            state: state.to_string(),
            next: next.to_string(),
            exp: expiry(Duration::minutes(STATE_MINUTES)),
        })
    }

    pub fn verify_state(&self, token: &str) -> Result<LoginState, AppError> {
        self.verify(token)
    }

    pub fn create_flash_token(&self, messages: &[Flash]) -> Result<String, AppError> {
        self.sign(&FlashClaims {
            messages: messages.to_vec(),
            exp: expiry(Duration::minutes(FLASH_MINUTES)),
        })
    }

    /// Unreadable or expired flash cookies are dropped silently.
    pub fn read_flashes(&self, token: Option<&str>) -> Vec<Flash> {
        token
            .and_then(|t| self.verify::<FlashClaims>(t).ok())
            .map(|claims| claims.messages)
            .unwrap_or_default()
    }
}

/// Finds a cookie in a raw `Cookie` request header.
pub fn cookie_value(header: Option<&str>, name: &str) -> Option<String> {
    header?.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

pub fn set_cookie(name: &str, value: &str, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, value);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", name)
}

/// The `web` section of a `client_secrets.json` file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub issuer: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    web: ClientSecrets,
}

impl ClientSecrets {
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let file: ClientSecretsFile = serde_json::from_str(raw)?;
        Ok(file.web)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::One(aud) => aud == client_id,
            Audience::Many(auds) => auds.iter().any(|a| a == client_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdClaims {
    pub sub: String,
    pub iss: Option<String>,
    pub aud: Audience,
    pub exp: i64,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: String,
}

pub struct OidcClient {
    secrets: ClientSecrets,
    redirect_uri: String,
    scopes: Vec<String>,
    client: Client,
}

impl OidcClient {
    pub fn new(
        secrets: ClientSecrets,
        redirect_uri: String,
        scopes: Vec<String>,
        client: Client,
    ) -> Self {
        Self {
            secrets,
            redirect_uri,
            scopes,
            client,
        }
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let scope = self.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Config(format!("invalid auth_uri: {}", e)))?;
        Ok(url.to_string())
    }

    /// Trades an authorization code for the user's identity claims.
    pub async fn exchange_code(&self, code: &str) -> Result<IdClaims, AppError> {
        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("Token endpoint answered HTTP {}", response.status());
            return Err(AppError::Auth(format!(
                "token endpoint returned HTTP {}",
                response.status()
            )));
        }

        let tokens = response.json::<TokenResponse>().await?;
        // Received straight from the token endpoint over TLS, so the claims
        // are checked rather than the signature.
        let claims = jsonwebtoken::dangerous_insecure_decode::<IdClaims>(&tokens.id_token)?.claims;
        self.check_claims(&claims)?;
        info!("User {} signed in", claims.sub);
        Ok(claims)
    }

    pub fn check_claims(&self, claims: &IdClaims) -> Result<(), AppError> {
        if let (Some(expected), Some(actual)) = (&self.secrets.issuer, &claims.iss) {
            if expected.trim_end_matches('/') != actual.trim_end_matches('/') {
                return Err(AppError::Auth(format!("unexpected issuer {}", actual)));
            }
        }
        if !claims.aud.contains(&self.secrets.client_id) {
            return Err(AppError::Auth("id token was issued for another client".into()));
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(AppError::Auth("id token has expired".into()));
        }
        Ok(())
    }
}
