//! Roster file loading.
//!
//! ```json
//! { "participants": ["Alice", "Bob"], "exclusions": { "Alice": ["Bob"] } }
//! ```
//!
//! Exclusions are applied in both directions.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use draw_core::{symmetric_exclusions, Exclusions, ParticipantId};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("cannot read roster: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed roster: {0}")]
    Json(#[from] serde_json::Error),
    #[error("participant names must not be blank")]
    BlankName,
    #[error("{0:?} is listed more than once")]
    Duplicate(String),
    #[error("exclusion mentions unknown participant {0:?}")]
    UnknownParticipant(String),
    #[error("{0:?} cannot exclude themselves")]
    SelfExclusion(String),
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    participants: Vec<String>,
    #[serde(default)]
    exclusions: BTreeMap<String, Vec<String>>,
}

/// Canonical, serializable form of a roster. Persisted next to a draw so a
/// roster edit is noticed on restart.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterSnapshot {
    pub participants: Vec<ParticipantId>,
    pub exclusions: BTreeMap<ParticipantId, BTreeSet<ParticipantId>>,
}

#[derive(Debug, Clone)]
pub struct Roster {
    participants: Vec<ParticipantId>,
    exclusions: Exclusions,
}

impl Roster {
    pub fn new(
        participants: Vec<String>,
        exclusions: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, RosterError> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(participants.len());
        for raw in participants {
            let name = raw.trim();
            if name.is_empty() {
                return Err(RosterError::BlankName);
            }
            if !seen.insert(name.to_string()) {
                return Err(RosterError::Duplicate(name.to_string()));
            }
            names.push(name.to_string());
        }

        let mut one_sided = Exclusions::new();
        for (giver, excluded) in exclusions {
            let giver = known(&seen, &giver)?;
            for other in excluded {
                let other = known(&seen, &other)?;
                if other == giver {
                    return Err(RosterError::SelfExclusion(giver));
                }
                one_sided.entry(giver.clone()).or_default().insert(other);
            }
        }

        Ok(Self {
            participants: names,
            exclusions: symmetric_exclusions(&one_sided),
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, RosterError> {
        let file: RosterFile = serde_json::from_slice(bytes)?;
        Self::new(file.participants, file.exclusions)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_json(&bytes)
    }

    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    /// Symmetric exclusions.
    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        RosterSnapshot {
            participants: self.participants.clone(),
            exclusions: self
                .exclusions
                .iter()
                .filter(|(_, excluded)| !excluded.is_empty())
                .map(|(giver, excluded)| (giver.clone(), excluded.iter().cloned().collect()))
                .collect(),
        }
    }
}

fn known(seen: &HashSet<String>, name: &str) -> Result<String, RosterError> {
    let name = name.trim();
    if seen.contains(name) {
        Ok(name.to_string())
    } else {
        Err(RosterError::UnknownParticipant(name.to_string()))
    }
}
