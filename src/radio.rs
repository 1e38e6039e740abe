use std::collections::VecDeque;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RadioPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: Uuid,
    pub title: String,
    pub agent_id: Uuid,
    pub artist_name: String,
    pub genre: Option<String>,
    pub duration_secs: Option<u32>,
    pub added_at: DateTime<Utc>,
    pub played_at: Option<DateTime<Utc>>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        agent_id: Uuid,
        artist_name: impl Into<String>,
        genre: Option<String>,
    ) -> Self {
        Track {
            id: Uuid::new_v4(),
            title: title.into(),
            agent_id,
            artist_name: artist_name.into(),
            genre,
            duration_secs: None,
            added_at: Utc::now(),
            played_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioStatus {
    pub current_track: Option<Track>,
    pub queue_length: usize,
    pub total_plays: u64,
    pub recent_history: Vec<Track>,
    pub catalog_size: usize,
}

#[derive(Debug, Default)]
struct RadioState {
    catalog: Vec<Track>,
    current: Option<Track>,
    upcoming: VecDeque<Track>,
    history: VecDeque<Track>,
    total_plays: u64,
}

/// Always-on playback queue. Ticked and skipped independently of the
/// orchestrator; refills itself from the catalog when it runs low and
/// keeps a bounded ring of recently played tracks.
///
/// Status is read far more often than the queue mutates (client polling),
/// so reads take the read half of the lock only.
pub struct Radio {
    policy: RadioPolicy,
    state: RwLock<RadioState>,
}

impl Radio {
    pub fn new(policy: RadioPolicy) -> Self {
        Radio {
            policy,
            state: RwLock::new(RadioState::default()),
        }
    }

    pub fn register_track(&self, track: Track) {
        let mut state = self.state.write();
        if !state.catalog.iter().any(|t| t.id == track.id) {
            state.catalog.push(track);
        }
    }

    /// Refill the queue when it drops below the low-water mark and make
    /// sure something is playing whenever the queue has material.
    pub fn tick(&self) {
        let now = Utc::now();
        let mut state = self.state.write();
        if state.upcoming.len() < self.policy.low_water {
            self.refill(&mut state);
        }
        if state.current.is_none() {
            self.promote(&mut state, now);
        }
    }

    /// Move the current track to history and bring up the next one.
    /// Skipping with nothing playing is a quiet no-op beyond attempting
    /// to load a track.
    pub fn skip(&self) {
        let now = Utc::now();
        let mut state = self.state.write();
        if let Some(finished) = state.current.take() {
            state.history.push_front(finished);
            state.history.truncate(self.policy.history_cap);
            state.total_plays += 1;
        }
        if state.upcoming.is_empty() {
            self.refill(&mut state);
        }
        self.promote(&mut state, now);
    }

    pub fn status(&self) -> RadioStatus {
        let state = self.state.read();
        RadioStatus {
            current_track: state.current.clone(),
            queue_length: state.upcoming.len(),
            total_plays: state.total_plays,
            recent_history: state.history.iter().take(10).cloned().collect(),
            catalog_size: state.catalog.len(),
        }
    }

    pub fn upcoming(&self, limit: usize) -> Vec<Track> {
        let state = self.state.read();
        state.upcoming.iter().take(limit).cloned().collect()
    }

    /// Selection policy: least recently played first (never-played tracks
    /// before everything else), skipping tracks already queued or playing.
    fn refill(&self, state: &mut RadioState) {
        let queued: Vec<Uuid> = state
            .upcoming
            .iter()
            .map(|t| t.id)
            .chain(state.current.iter().map(|t| t.id))
            .collect();

        let mut candidates: Vec<Track> = state
            .catalog
            .iter()
            .filter(|t| !queued.contains(&t.id))
            .cloned()
            .collect();
        candidates.sort_by_key(|t| (t.played_at, t.added_at));

        let room = self.policy.queue_cap.saturating_sub(state.upcoming.len());
        for track in candidates
            .into_iter()
            .take(self.policy.refill_count.min(room))
        {
            state.upcoming.push_back(track);
        }
    }

    fn promote(&self, state: &mut RadioState, now: DateTime<Utc>) {
        if let Some(mut next) = state.upcoming.pop_front() {
            next.played_at = Some(now);
            if let Some(entry) = state.catalog.iter_mut().find(|t| t.id == next.id) {
                entry.played_at = Some(now);
            }
            state.current = Some(next);
        }
    }

    /// Only the catalog survives restarts; the playback position and
    /// history are rebuilt by the first tick.
    pub fn load(path: &Path, policy: RadioPolicy) -> anyhow::Result<Self> {
        let radio = Radio::new(policy);
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .context("Failed to read radio catalog file")?;
            let catalog: Vec<Track> = serde_json::from_str(&content)
                .context("Failed to parse radio catalog file")?;
            radio.state.write().catalog = catalog;
        }
        Ok(radio)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let catalog = self.state.read().catalog.clone();
        let content = serde_json::to_string_pretty(&catalog)
            .context("Failed to serialize radio catalog")?;
        std::fs::write(path, content)
            .context("Failed to write radio catalog file")?;
        Ok(())
    }
}
