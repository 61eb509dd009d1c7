use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    db::{Candidate, CandidateCore, NewCandidate},
};

/// A candidate specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    /// The election the candidate stands in.
    pub election_id: ApiId,
    pub name: String,
    #[serde(default)]
    pub manifesto: String,
    #[serde(default)]
    pub photo: Option<String>,
}

impl CandidateSpec {
    /// Validate this spec and convert it into a storable candidate.
    pub fn into_candidate(self) -> Result<NewCandidate> {
        let candidate = NewCandidate {
            election_id: *self.election_id,
            name: self.name,
            manifesto: self.manifesto,
            photo: self.photo,
        };
        validate(&candidate)?;
        Ok(candidate)
    }
}

/// A partial update to a candidate. The election a candidate stands in can
/// never change, so it is not part of the patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidatePatch {
    pub name: Option<String>,
    pub manifesto: Option<String>,
    /// Absent leaves the photo alone; `null` removes it.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub photo: Option<Option<String>>,
}

/// Deserialise a field that is present, even as `null`, into `Some`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl CandidatePatch {
    pub fn apply(self, mut candidate: CandidateCore) -> Result<CandidateCore> {
        if let Some(name) = self.name {
            candidate.name = name;
        }
        if let Some(manifesto) = self.manifesto {
            candidate.manifesto = manifesto;
        }
        if let Some(photo) = self.photo {
            candidate.photo = photo;
        }
        validate(&candidate)?;
        Ok(candidate)
    }
}

fn validate(candidate: &CandidateCore) -> Result<()> {
    if candidate.name.trim().is_empty() {
        return Err(Error::BadRequest("Candidate name must not be empty".to_string()));
    }
    Ok(())
}

/// An API-friendly candidate description with its current vote count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub election_id: ApiId,
    pub name: String,
    pub manifesto: String,
    pub photo: Option<String>,
    pub vote_count: u64,
}

impl CandidateDescription {
    pub fn new(candidate: Candidate, vote_count: u64) -> Self {
        Self {
            id: candidate.id.into(),
            election_id: candidate.candidate.election_id.into(),
            name: candidate.candidate.name,
            manifesto: candidate.candidate.manifesto,
            photo: candidate.candidate.photo,
            vote_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::{json, serde_json};

    use super::*;
    use crate::model::mongodb::Id;

    #[test]
    fn patch_keeps_election() {
        let election_id = Id::new();
        let original = CandidateCore::example(election_id, "Asha");
        let patch = CandidatePatch {
            name: Some("Asha K.".to_string()),
            photo: Some(Some("candidates/asha.jpg".to_string())),
            ..Default::default()
        };
        let patched = patch.apply(original.clone()).unwrap();
        assert_eq!(patched.election_id, election_id);
        assert_eq!(patched.name, "Asha K.");
        assert_eq!(patched.manifesto, original.manifesto);
        assert_eq!(patched.photo.as_deref(), Some("candidates/asha.jpg"));
    }

    #[test]
    fn null_photo_clears_it() {
        let mut original = CandidateCore::example(Id::new(), "Asha");
        original.photo = Some("candidates/asha.jpg".to_string());

        let untouched: CandidatePatch = serde_json::from_value(json!({ "name": "Asha K." })).unwrap();
        let patched = untouched.apply(original.clone()).unwrap();
        assert_eq!(patched.photo, original.photo);

        let cleared: CandidatePatch = serde_json::from_value(json!({ "photo": null })).unwrap();
        let patched = cleared.apply(original).unwrap();
        assert_eq!(patched.photo, None);
    }

    #[test]
    fn blank_name_is_rejected() {
        let spec = CandidateSpec {
            election_id: Id::new().into(),
            name: "   ".to_string(),
            manifesto: String::new(),
            photo: None,
        };
        assert!(matches!(spec.into_candidate(), Err(Error::BadRequest(_))));
    }
}
