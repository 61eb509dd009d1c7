#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{figment::Figment, Build, Rocket};

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod voting;

#[cfg(test)]
mod test_util;

pub use config::Config;

/// Build the server from `Rocket.toml` / `ROCKET_*` configuration,
/// connecting to whichever storage backend is configured.
pub fn build() -> Rocket<Build> {
    with_routes(rocket::build()).attach(config::StoreFairing)
}

/// Build the server around an already-constructed voting service, skipping
/// storage configuration entirely.
pub fn rocket_for_service(figment: Figment, service: voting::VotingService) -> Rocket<Build> {
    with_routes(rocket::custom(figment)).manage(service)
}

fn with_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(logging::LoggerFairing)
        .attach(config::ConfigFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}
