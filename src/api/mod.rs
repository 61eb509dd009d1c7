use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};
use serde::Serialize;

use crate::error::ErrorBody;

mod candidates;
mod elections;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = routes![health];
    routes.extend(elections::routes());
    routes.extend(candidates::routes());
    routes.extend(voting::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[get("/health")]
fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Render every error Rocket raises itself (no route, failed guards, bad
/// bodies) in the same shape as our own errors.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<ErrorBody>) {
    let kind = match status.code {
        400 => "BAD_REQUEST",
        401 => "UNAUTHORIZED",
        403 => "FORBIDDEN",
        404 => "NOT_FOUND",
        409 => "CONFLICT",
        422 => "UNPROCESSABLE_ENTITY",
        500..=599 => "INTERNAL_ERROR",
        _ => "ERROR",
    };
    let message = status.reason().unwrap_or("Unknown error");
    (status, Json(ErrorBody::new(kind, message)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rocket::http::Status;

    use crate::error::ErrorBody;
    use crate::model::{
        auth::{AuthToken, Voter},
        mongodb::Id,
    };
    use crate::test_util::{client_at, config};

    #[rocket::async_test]
    async fn health_needs_no_token() {
        let (client, _) = client_at(Utc::now()).await;
        let response = client.get("/health").dispatch().await;
        assert_eq!(Status::Ok, response.status());
    }

    #[rocket::async_test]
    async fn unknown_routes_get_json_errors() {
        let (client, _) = client_at(Utc::now()).await;
        let response = client.get("/nowhere").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.error, "NOT_FOUND");
    }

    #[rocket::async_test]
    async fn token_cookie_is_accepted() {
        let (client, _) = client_at(Utc::now()).await;
        let cookie = AuthToken::<Voter>::new(Id::new())
            .into_cookie(&config())
            .unwrap();

        let response = client.get("/elections").cookie(cookie).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let response = client.get("/elections").dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
