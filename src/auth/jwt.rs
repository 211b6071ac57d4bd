use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{config::JwtConfig, state::AppState};

/// Payload carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub email: String,
}

/// Caller claims plus the registered claims added on mint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims<C> {
    #[serde(flatten)]
    pub claims: C,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }

    /// Signs `claims` with HS256. `ttl` overrides the configured lifetime and
    /// may be negative to produce an already expired token.
    pub fn mint<C: Serialize>(&self, claims: C, ttl: Option<Duration>) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + ttl.unwrap_or(self.ttl);
        let claims = TokenClaims {
            claims,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(exp = claims.exp, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, email: &str) -> anyhow::Result<String> {
        self.mint(
            AccessClaims {
                email: email.to_string(),
            },
            None,
        )
    }

    /// Returns the decoded claims when signature, issuer, audience and expiry
    /// all check out. Every failure collapses to `None`.
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Option<TokenClaims<C>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        match decode::<TokenClaims<C>>(token, &self.decoding, &validation) {
            Ok(data) => {
                debug!(exp = data.claims.exp, "jwt verified");
                Some(data.claims)
            }
            Err(e) => {
                debug!(error = %e, "jwt rejected");
                None
            }
        }
    }
}
