//! The boundary with the external identity service: who is calling, and
//! with what rights.

mod token;
mod user;

pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
pub use user::{Admin, Rights, User, Voter};
