use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::modules::auth::{Account, Role, UserClaim};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,        // account id
    pub jti: String,        // unique token id
    pub iat: i64,
    pub sid: String,        // session id
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Permission claims grouped by claim type, e.g. `{"Permission": ["CanView"]}`.
    #[serde(default)]
    pub permissions: BTreeMap<String, Vec<String>>,
}

pub struct JwtService {
    secret: String,
    issuer: String,
    audience: String,
    access_token_duration: Duration,
}

impl JwtService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_duration: config.access_token_lifetime,
        }
    }

    pub fn create_access_token(
        &self,
        account: &Account,
        claims: &[UserClaim],
        roles: &[Role],
        now: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let mut permissions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for claim in claims {
            permissions
                .entry(claim.claim_type.clone())
                .or_default()
                .push(claim.value.clone());
        }

        let claims = AccessClaims {
            sub: account.id.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            sid: Uuid::new_v4().to_string(),
            email: account.email.clone(),
            given_name: account.given_name.clone(),
            family_name: account.family_name.clone(),
            exp: (now + self.access_token_duration).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            permissions,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    pub fn verify_access_token(
        &self,
        token: &str,
    ) -> Result<TokenData<AccessClaims>, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
    }

    pub fn get_access_token_duration_secs(&self) -> i64 {
        self.access_token_duration.num_seconds()
    }
}
