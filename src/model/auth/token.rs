use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, TokenData, Validation};
use log::debug;
use rocket::{
    http::Status,
    request::{self, FromRequest},
    Request,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{api::ApiId, mongodb::Id};
use crate::Config;

use super::user::{Rights, User};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific principal with specific
/// rights. Tokens are issued by the identity service; we only check them.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AuthToken<U> {
    #[serde(rename = "sub")]
    id: ApiId,
    #[serde(rename = "rgt")]
    rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    /// Get the principal's ID.
    pub fn id(&self) -> Id {
        *self.id
    }

    /// Get the principal's rights.
    pub fn rights(&self) -> Rights {
        self.rights
    }

    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights.permits(target)
    }

    /// Check the signature and expiry of a JWT and extract the token.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let claims = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<U>>| claims.claims)?;
        Ok(claims.token)
    }
}

impl<U> AuthToken<U>
where
    U: User,
{
    /// Create a new [`AuthToken`] for the given principal, with exactly the
    /// rights of user type `U`.
    pub fn new(id: Id) -> Self {
        Self {
            id: id.into(),
            rights: U::RIGHTS,
            phantom: PhantomData,
        }
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Find the raw JWT in the auth cookie or, failing that, a bearer
/// `Authorization` header.
fn raw_token(req: &Request<'_>) -> Option<String> {
    if let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    req.headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User,
{
    type Error = Error;

    /// Get an AuthToken from the request and verify that it carries enough
    /// rights for this user type.
    ///
    /// No token forwards with `401 Unauthorized`; insufficient rights
    /// forward with `403 Forbidden`.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            let err = Error::Internal("Config is not managed".to_string());
            return request::Outcome::Error((Status::InternalServerError, err));
        };

        let Some(raw) = raw_token(req) else {
            return request::Outcome::Forward(Status::Unauthorized);
        };
        let token = match Self::decode(&raw, config) {
            Ok(token) => token,
            Err(err) => {
                debug!("Rejected auth token: {err}");
                return request::Outcome::Error((Status::Unauthorized, err));
            }
        };

        if token.permits(U::RIGHTS) {
            request::Outcome::Success(token)
        } else {
            debug!(
                "Principal {} has {} rights, needs {}",
                token.id(),
                token.rights(),
                U::RIGHTS
            );
            request::Outcome::Forward(Status::Forbidden)
        }
    }
}


#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;
    use crate::model::auth::{Admin, Voter};

    fn config(secret: &str) -> Config {
        Figment::from(Serialized::default("jwt_secret", secret))
            .extract()
            .unwrap()
    }

    #[test]
    fn token_survives_signing() {
        let config = config("secret");
        let id = Id::new();
        let jwt = AuthToken::<Admin>::new(id).encode(&config).unwrap();
        let token = AuthToken::<Admin>::decode(&jwt, &config).unwrap();
        assert_eq!(token.id(), id);
        assert_eq!(token.rights(), Rights::Admin);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let jwt = AuthToken::<Voter>::new(Id::new())
            .encode(&config("secret"))
            .unwrap();
        assert!(AuthToken::<Voter>::decode(&jwt, &config("other")).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = config("secret");
        let claims = Claims {
            token: AuthToken::<Voter>::new(Id::new()),
            expire_at: Utc::now() - chrono::Duration::hours(1),
        };
        let jwt = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(config.jwt_secret()),
        )
        .unwrap();
        let err = AuthToken::<Voter>::decode(&jwt, &config).err().unwrap();
        assert_eq!(err.status(), Status::Unauthorized);
    }

    #[test]
    fn voter_token_does_not_permit_admin() {
        let token = AuthToken::<Voter>::new(Id::new());
        assert!(token.permits(Rights::Voter));
        assert!(!token.permits(Rights::Admin));
    }
}
