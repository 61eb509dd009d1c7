//! Shared setup for API tests: a server over the in-memory store, with the
//! clock stopped, and signed tokens to call it with.

use chrono::{DateTime, Utc};
use rocket::{
    figment::{providers::Serialized, Figment},
    http::Header,
    local::asynchronous::Client,
};

use crate::clock::FixedClock;
use crate::model::{
    auth::{AuthToken, User},
    mongodb::Id,
};
use crate::store::Store;
use crate::voting::VotingService;
use crate::Config;

const TEST_JWT_SECRET: &str = "campus-test-secret";

pub fn figment() -> Figment {
    Figment::from(rocket::Config::debug_default())
        .merge(Serialized::default("jwt_secret", TEST_JWT_SECRET))
        .merge(("log_level", "off"))
}

pub fn config() -> Config {
    figment().extract().unwrap()
}

/// A tracked client for a fresh server whose clock reads `now`, plus a handle
/// on the service behind it for seeding and inspecting data.
pub async fn client_at(now: DateTime<Utc>) -> (Client, VotingService) {
    log4rs_test_utils::test_logging::init_logging_once_for(["campus_elections"], None, None);

    let service = VotingService::new(Store::memory(), FixedClock(now));
    let rocket = crate::rocket_for_service(figment(), service.clone());
    let client = Client::tracked(rocket).await.unwrap();
    (client, service)
}

/// An `Authorization` header carrying a token for principal `id` with the
/// rights of `U`.
pub fn bearer<U: User>(id: Id) -> Header<'static> {
    let jwt = AuthToken::<U>::new(id).encode(&config()).unwrap();
    Header::new("Authorization", format!("Bearer {jwt}"))
}
