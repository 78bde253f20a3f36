//! Draw state: the current epoch's assignment and who has looked at theirs.
//!
//! The store owns the only copy of the assignment. Callers get a recipient
//! one giver at a time through [`DrawStore::reveal`]; [`DrawStore::status`]
//! never carries recipients.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use draw_core::{Assignment, DrawConfig, DrawError, ParticipantId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roster::{Roster, RosterSnapshot};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawRecord {
    pub draw_id: String,
    pub epoch: u64,
    pub roster: RosterSnapshot,
    pub assignment: Assignment,
    pub revealed: BTreeMap<ParticipantId, bool>,
    pub generated_at: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("draw failed: {0}")]
    Draw(#[from] DrawError),
    #[error("unknown participant {0:?}")]
    UnknownParticipant(String),
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Reveal {
    pub giver: ParticipantId,
    pub recipient: ParticipantId,
    pub first_time: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ParticipantStatus {
    pub name: ParticipantId,
    pub revealed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct DrawStatus {
    pub draw_id: String,
    pub epoch: u64,
    pub generated_at: u64,
    pub revealed_count: usize,
    pub total: usize,
    pub participants: Vec<ParticipantStatus>,
}

pub struct DrawStore {
    roster: Roster,
    config: DrawConfig,
    persist_path: Option<PathBuf>,
    record: DrawRecord,
}

impl DrawStore {
    /// Draws epoch 1 in memory, without a state file.
    pub fn generate<R>(roster: Roster, config: DrawConfig, rng: &mut R) -> Result<Self, StoreError>
    where
        R: Rng + ?Sized,
    {
        let record = new_record(&roster, &config, 1, rng)?;
        tracing::info!(draw_id = %record.draw_id, epoch = record.epoch, "new draw");
        Ok(Self {
            roster,
            config,
            persist_path: None,
            record,
        })
    }

    /// Loads the draw saved at `path`, or starts a new epoch when there is
    /// none, it cannot be read, it was drawn for a different roster, or it no
    /// longer validates.
    pub async fn open<R>(
        roster: Roster,
        config: DrawConfig,
        path: impl Into<PathBuf>,
        rng: &mut R,
    ) -> Result<Self, StoreError>
    where
        R: Rng + ?Sized,
    {
        let path = path.into();
        let previous = read_record(&path).await?;

        let reusable = previous.as_ref().is_some_and(|saved| {
            if saved.roster != roster.snapshot() {
                tracing::info!(epoch = saved.epoch, "roster changed since last draw");
                return false;
            }
            if let Err(violation) = draw_core::validate(
                roster.participants(),
                roster.exclusions(),
                &saved.assignment,
            ) {
                tracing::warn!(epoch = saved.epoch, %violation, "saved draw is invalid");
                return false;
            }
            true
        });

        let record = match previous {
            Some(saved) if reusable => {
                tracing::info!(draw_id = %saved.draw_id, epoch = saved.epoch, "resuming draw");
                normalize_revealed(saved, &roster)
            }
            previous => {
                let epoch = previous.map_or(1, |saved| saved.epoch + 1);
                let record = new_record(&roster, &config, epoch, rng)?;
                write_record(&path, &record).await?;
                tracing::info!(draw_id = %record.draw_id, epoch, "new draw");
                record
            }
        };

        Ok(Self {
            roster,
            config,
            persist_path: Some(path),
            record,
        })
    }

    pub fn record(&self) -> &DrawRecord {
        &self.record
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Starts a new epoch. On failure the current epoch stays in place.
    pub async fn reset<R>(&mut self, rng: &mut R) -> Result<&DrawRecord, StoreError>
    where
        R: Rng + ?Sized,
    {
        let record = new_record(&self.roster, &self.config, self.record.epoch + 1, rng)?;
        if let Some(path) = &self.persist_path {
            write_record(path, &record).await?;
        }
        tracing::info!(draw_id = %record.draw_id, epoch = record.epoch, "draw reset");
        self.record = record;
        Ok(&self.record)
    }

    /// Discloses `giver`'s recipient and marks it revealed. Asking again
    /// returns the same recipient.
    pub async fn reveal(&mut self, giver: &str) -> Result<Reveal, StoreError> {
        let recipient = self
            .record
            .assignment
            .get(giver)
            .cloned()
            .ok_or_else(|| StoreError::UnknownParticipant(giver.to_string()))?;

        let first_time = !self.record.revealed.get(giver).copied().unwrap_or(false);
        if first_time {
            let mut updated = self.record.clone();
            updated.revealed.insert(giver.to_string(), true);
            if let Some(path) = &self.persist_path {
                write_record(path, &updated).await?;
            }
            self.record = updated;
            tracing::info!(epoch = self.record.epoch, giver, "recipient revealed");
        }

        Ok(Reveal {
            giver: giver.to_string(),
            recipient,
            first_time,
        })
    }

    pub fn status(&self) -> DrawStatus {
        let participants: Vec<ParticipantStatus> = self
            .roster
            .participants()
            .iter()
            .map(|name| ParticipantStatus {
                name: name.clone(),
                revealed: self.record.revealed.get(name).copied().unwrap_or(false),
            })
            .collect();

        DrawStatus {
            draw_id: self.record.draw_id.clone(),
            epoch: self.record.epoch,
            generated_at: self.record.generated_at,
            revealed_count: participants.iter().filter(|p| p.revealed).count(),
            total: participants.len(),
            participants,
        }
    }
}

fn new_record<R>(
    roster: &Roster,
    config: &DrawConfig,
    epoch: u64,
    rng: &mut R,
) -> Result<DrawRecord, StoreError>
where
    R: Rng + ?Sized,
{
    let assignment =
        draw_core::generate_with(roster.participants(), roster.exclusions(), rng, config)
            .inspect_err(|err| tracing::error!(epoch, %err, "draw failed"))?;

    Ok(DrawRecord {
        draw_id: Uuid::new_v4().to_string(),
        epoch,
        roster: roster.snapshot(),
        assignment,
        revealed: roster
            .participants()
            .iter()
            .map(|name| (name.clone(), false))
            .collect(),
        generated_at: now_millis(),
    })
}

fn normalize_revealed(mut record: DrawRecord, roster: &Roster) -> DrawRecord {
    record.revealed = roster
        .participants()
        .iter()
        .map(|name| {
            let seen = record.revealed.get(name).copied().unwrap_or(false);
            (name.clone(), seen)
        })
        .collect();
    record
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn read_record(path: &Path) -> Result<Option<DrawRecord>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    match serde_json::from_slice(&bytes) {
        Ok(record) => Ok(Some(record)),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                %err,
                "discarding unreadable state file, epoch count restarts at 1"
            );
            Ok(None)
        }
    }
}

// Write-then-rename so a crash leaves either the old or the new file.
async fn write_record(path: &Path, record: &DrawRecord) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(record)?;
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));

    let written = match tokio::fs::write(&tmp, json).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(err) => Err(err),
    };
    if let Err(err) = written {
        tracing::error!(path = %path.display(), %err, "persist error");
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}
