use std::fmt::Display;

use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error};
use mongodb::{bson::oid::Error as OidError, error::Error as DbError};
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::mongodb::Id;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    OidParse(#[from] OidError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Election {0} is not open for voting")]
    ElectionClosed(Id),
    #[error("Candidate {candidate} is not standing in election {election}")]
    InvalidCandidate { election: Id, candidate: Id },
    #[error("Voter {voter} has already voted in election {election}")]
    AlreadyVoted { election: Id, voter: Id },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Internal(_) => Status::InternalServerError,
            Self::Jwt(_) => Status::Unauthorized,
            Self::OidParse(_) | Self::BadRequest(_) | Self::InvalidCandidate { .. } => {
                Status::BadRequest
            }
            Self::ElectionClosed(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::Conflict(_) | Self::AlreadyVoted { .. } => Status::Conflict,
        }
    }

    /// A stable machine-readable name for this kind of error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Db(_) | Self::Internal(_) => "INTERNAL_ERROR",
            Self::Jwt(_) => "UNAUTHORIZED",
            Self::OidParse(_) | Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::ElectionClosed(_) => "ELECTION_CLOSED",
            Self::InvalidCandidate { .. } => "INVALID_CANDIDATE",
            Self::AlreadyVoted { .. } => "ALREADY_VOTED",
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        // Never leak storage internals to the client.
        let message = if status.class() == StatusClass::ServerError {
            error!("{self}");
            "An internal error occurred".to_string()
        } else {
            debug!("{self}");
            self.to_string()
        };
        (status, Json(ErrorBody::new(self.kind(), message))).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::errors::ErrorKind as JwtErrorKind;

    use super::*;

    #[test]
    fn voting_errors_are_client_errors() {
        let election = Id::new();
        let other = Id::new();
        let errors = [
            Error::ElectionClosed(election),
            Error::InvalidCandidate {
                election,
                candidate: other,
            },
            Error::AlreadyVoted {
                election,
                voter: other,
            },
            Error::not_found(format!("Election {election}")),
        ];
        for err in errors {
            assert_eq!(err.status().class(), StatusClass::ClientError, "{err}");
        }
    }

    #[test]
    fn already_voted_is_a_conflict() {
        let err = Error::AlreadyVoted {
            election: Id::new(),
            voter: Id::new(),
        };
        assert_eq!(err.status(), Status::Conflict);
        assert_eq!(err.kind(), "ALREADY_VOTED");
    }

    #[test]
    fn every_bad_token_is_unauthorized() {
        for kind in [
            JwtErrorKind::InvalidToken,
            JwtErrorKind::InvalidSignature,
            JwtErrorKind::ExpiredSignature,
        ] {
            let err = Error::from(JwtError::from(kind));
            assert_eq!(err.status(), Status::Unauthorized, "{err}");
            assert_eq!(err.kind(), "UNAUTHORIZED");
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = Error::Internal("connection reset".to_string());
        assert_eq!(err.status(), Status::InternalServerError);
        assert_eq!(err.kind(), "INTERNAL_ERROR");
    }
}
