use log::info;
use mongodb::bson::oid::Error as OidError;
use rocket::{http::Status, response::status, serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{CandidateDescription, CandidatePatch, CandidateSpec},
    auth::{Admin, AuthToken, Voter},
    mongodb::Id,
};
use crate::voting::VotingService;

pub fn routes() -> Vec<Route> {
    routes![
        get_candidates,
        get_candidate,
        create_candidate,
        update_candidate,
        delete_candidate,
    ]
}

#[get("/candidates")]
async fn get_candidates(
    _token: AuthToken<Voter>,
    service: &State<VotingService>,
) -> Result<Json<Vec<CandidateDescription>>> {
    Ok(Json(service.all_candidate_descriptions().await?))
}

#[get("/candidates/<candidate_id>")]
async fn get_candidate(
    _token: AuthToken<Voter>,
    candidate_id: std::result::Result<Id, OidError>,
    service: &State<VotingService>,
) -> Result<Json<CandidateDescription>> {
    let candidate = service.store().candidates.candidate(candidate_id?).await?;
    Ok(Json(service.describe_candidate(candidate).await?))
}

#[post("/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    token: AuthToken<Admin>,
    spec: Json<CandidateSpec>,
    service: &State<VotingService>,
) -> Result<status::Created<Json<CandidateDescription>>> {
    let candidate = spec.0.into_candidate()?;
    let candidate = service.store().candidates.create_candidate(candidate).await?;
    info!(
        "Admin {} added candidate {} to election {}",
        token.id(),
        candidate.id,
        candidate.election_id
    );

    let location = format!("/candidates/{}", candidate.id);
    Ok(status::Created::new(location).body(Json(CandidateDescription::new(candidate, 0))))
}

#[put("/candidates/<candidate_id>", data = "<patch>", format = "json")]
async fn update_candidate(
    token: AuthToken<Admin>,
    candidate_id: std::result::Result<Id, OidError>,
    patch: Json<CandidatePatch>,
    service: &State<VotingService>,
) -> Result<Json<CandidateDescription>> {
    let candidate = service
        .store()
        .candidates
        .update_candidate(candidate_id?, patch.0)
        .await?;
    info!("Admin {} updated candidate {}", token.id(), candidate.id);
    Ok(Json(service.describe_candidate(candidate).await?))
}

#[delete("/candidates/<candidate_id>")]
async fn delete_candidate(
    token: AuthToken<Admin>,
    candidate_id: std::result::Result<Id, OidError>,
    service: &State<VotingService>,
) -> Result<Status> {
    let candidate_id = candidate_id?;
    service
        .store()
        .candidates
        .delete_candidate(candidate_id)
        .await?;
    info!("Admin {} deleted candidate {candidate_id}", token.id());
    Ok(Status::NoContent)
}
