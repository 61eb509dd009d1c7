use log::info;
use mongodb::bson::oid::Error as OidError;
use rocket::{http::Status, response::status, serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        CandidateDescription, ElectionDescription, ElectionPatch, ElectionResults, ElectionSpec,
        VoteReceipt,
    },
    auth::{Admin, AuthToken, Voter},
    mongodb::Id,
};
use crate::voting::VotingService;

pub fn routes() -> Vec<Route> {
    routes![
        get_elections,
        get_election,
        create_election,
        update_election,
        delete_election,
        get_results,
        get_candidates,
        get_own_vote,
    ]
}

#[get("/elections")]
async fn get_elections(
    token: AuthToken<Voter>,
    service: &State<VotingService>,
) -> Result<Json<Vec<ElectionDescription>>> {
    let elections = service.store().elections.elections().await?;
    let mut descriptions = Vec::with_capacity(elections.len());
    for election in elections {
        descriptions.push(service.describe(election, token.id()).await?);
    }
    Ok(Json(descriptions))
}

#[get("/elections/<election_id>")]
async fn get_election(
    token: AuthToken<Voter>,
    election_id: std::result::Result<Id, OidError>,
    service: &State<VotingService>,
) -> Result<Json<ElectionDescription>> {
    let election = service.store().elections.election(election_id?).await?;
    Ok(Json(service.describe(election, token.id()).await?))
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    service: &State<VotingService>,
) -> Result<status::Created<Json<ElectionDescription>>> {
    let election = spec.0.into_election()?;
    let election = service.store().elections.create_election(election).await?;
    info!("Admin {} created election {}", token.id(), election.id);

    let location = format!("/elections/{}", election.id);
    let description = service.describe(election, token.id()).await?;
    Ok(status::Created::new(location).body(Json(description)))
}

#[put("/elections/<election_id>", data = "<patch>", format = "json")]
async fn update_election(
    token: AuthToken<Admin>,
    election_id: std::result::Result<Id, OidError>,
    patch: Json<ElectionPatch>,
    service: &State<VotingService>,
) -> Result<Json<ElectionDescription>> {
    let election = service
        .store()
        .elections
        .update_election(election_id?, patch.0)
        .await?;
    info!("Admin {} updated election {}", token.id(), election.id);
    Ok(Json(service.describe(election, token.id()).await?))
}

#[delete("/elections/<election_id>")]
async fn delete_election(
    token: AuthToken<Admin>,
    election_id: std::result::Result<Id, OidError>,
    service: &State<VotingService>,
) -> Result<Status> {
    let election_id = election_id?;
    service
        .store()
        .elections
        .delete_election(election_id)
        .await?;
    info!("Admin {} deleted election {election_id}", token.id());
    Ok(Status::NoContent)
}

#[get("/elections/<election_id>/results")]
async fn get_results(
    _token: AuthToken<Voter>,
    election_id: std::result::Result<Id, OidError>,
    service: &State<VotingService>,
) -> Result<Json<ElectionResults>> {
    Ok(Json(service.results(election_id?).await?))
}

#[get("/elections/<election_id>/candidates")]
async fn get_candidates(
    _token: AuthToken<Voter>,
    election_id: std::result::Result<Id, OidError>,
    service: &State<VotingService>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let election = service.store().elections.election(election_id?).await?;
    Ok(Json(service.candidate_descriptions(election.id).await?))
}

#[get("/elections/<election_id>/vote")]
async fn get_own_vote(
    token: AuthToken<Voter>,
    election_id: std::result::Result<Id, OidError>,
    service: &State<VotingService>,
) -> Result<Json<VoteReceipt>> {
    let vote = service.vote_of(election_id?, token.id()).await?;
    Ok(Json(vote.into()))
}
