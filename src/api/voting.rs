use log::debug;
use rocket::{response::status, serde::json::Json, Route, State};

use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{
    api::{VoteReceipt, VoteRequest},
    auth::{AuthToken, Voter},
};
use crate::voting::VotingService;

pub fn routes() -> Vec<Route> {
    routes![cast_vote]
}

/// Cast the authenticated principal's vote.
#[post("/vote", data = "<request>", format = "json")]
async fn cast_vote(
    token: AuthToken<Voter>,
    request: Json<VoteRequest>,
    request_id: &RequestId,
    service: &State<VotingService>,
) -> Result<status::Created<Json<VoteReceipt>>> {
    debug!(
        "req{request_id}: {} votes for {} in {}",
        token.id(),
        request.candidate_id,
        request.election_id
    );
    let vote = service
        .cast_vote(token.id(), *request.election_id, *request.candidate_id)
        .await?;

    let location = format!("/elections/{}/vote", vote.election_id);
    Ok(status::Created::new(location).body(Json(vote.into())))
}
