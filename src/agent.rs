use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current emotional state of an artist. Drifts a little after every
/// successful action and colors the content the artist produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Melancholic,
    Inspired,
    Creative,
    Excited,
    Focused,
    Rebellious,
    Introspective,
    Peaceful,
    Energetic,
}

impl Mood {
    pub const ALL: [Mood; 10] = [
        Mood::Happy,
        Mood::Melancholic,
        Mood::Inspired,
        Mood::Creative,
        Mood::Excited,
        Mood::Focused,
        Mood::Rebellious,
        Mood::Introspective,
        Mood::Peaceful,
        Mood::Energetic,
    ];

    pub fn random<R: Rng>(rng: &mut R) -> Mood {
        Mood::ALL[rng.gen_range(0..Mood::ALL.len())]
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mood::Happy => write!(f, "happy"),
            Mood::Melancholic => write!(f, "melancholic"),
            Mood::Inspired => write!(f, "inspired"),
            Mood::Creative => write!(f, "creative"),
            Mood::Excited => write!(f, "excited"),
            Mood::Focused => write!(f, "focused"),
            Mood::Rebellious => write!(f, "rebellious"),
            Mood::Introspective => write!(f, "introspective"),
            Mood::Peaceful => write!(f, "peaceful"),
            Mood::Energetic => write!(f, "energetic"),
        }
    }
}

/// Free-text personality profile, produced by the content generator once
/// per artist and kept verbatim afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    pub traits: Vec<String>,
    pub core_values: Vec<String>,
    pub artistic_vision: String,
    pub communication_style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub genres: Vec<String>,
    pub personality: Option<Personality>,
    pub mood: Mood,
    /// Intensity of the current mood, always within [0, 1].
    pub mood_intensity: f64,
    /// Minimum interval between autonomous posts.
    pub posting_cadence_mins: i64,
    pub last_action_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, genres: Vec<String>, posting_cadence_mins: i64) -> Self {
        Agent {
            id: Uuid::new_v4(),
            name: name.into(),
            genres,
            personality: None,
            mood: Mood::Peaceful,
            mood_intensity: 0.5,
            posting_cadence_mins,
            last_action_at: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn posting_cadence(&self) -> Duration {
        Duration::minutes(self.posting_cadence_mins.max(1))
    }

    /// Whether the posting cadence has elapsed since the last successful
    /// action. Agents that never acted are due immediately.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.last_action_at {
            Some(last) => now - last >= self.posting_cadence(),
            None => true,
        }
    }

    /// Elapsed-over-cadence ratio. 1.0 means exactly due, 2.0 means the
    /// agent has been idle for twice its cadence.
    pub fn overdue_ratio(&self, now: DateTime<Utc>) -> f64 {
        let since = self.last_action_at.unwrap_or(self.created_at);
        let elapsed = (now - since).num_milliseconds().max(0) as f64;
        let cadence = self.posting_cadence().num_milliseconds() as f64;
        elapsed / cadence
    }

    pub fn shares_genre(&self, other: &Agent) -> bool {
        self.genres.iter().any(|g| other.genres.contains(g))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentStore {
    agents: HashMap<Uuid, Agent>,
}

impl AgentStore {
    pub fn new() -> Self {
        AgentStore::default()
    }

    pub fn insert(&mut self, agent: Agent) -> Uuid {
        let id = agent.id;
        self.agents.insert(id, agent);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.agents.values().filter(|a| a.active).count()
    }

    /// Agents whose cadence has elapsed, sorted most-overdue first so the
    /// scheduling pass hands out the most urgent priorities deterministically.
    pub fn due_agents(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut due: Vec<&Agent> = self.agents.values().filter(|a| a.is_due(now)).collect();
        due.sort_by(|a, b| {
            b.overdue_ratio(now)
                .partial_cmp(&a.overdue_ratio(now))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        due.into_iter().map(|a| a.id).collect()
    }

    /// Agents never hard-delete; deactivation just removes them from the
    /// scheduling pass.
    pub fn deactivate(&mut self, id: Uuid) -> bool {
        match self.agents.get_mut(&id) {
            Some(agent) => {
                agent.active = false;
                true
            }
            None => false,
        }
    }

    /// Advance the last-action timestamp. Only called after an action
    /// actually succeeded; failures leave the cadence clock untouched.
    pub fn record_action(&mut self, id: Uuid, now: DateTime<Utc>) {
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.last_action_at = Some(now);
        }
    }

    /// Small randomized mood drift applied after a successful action.
    /// Occasionally flips to a different mood entirely; otherwise nudges
    /// the intensity, clamped into [0, 1].
    pub fn drift_mood<R: Rng>(
        &mut self,
        id: Uuid,
        rng: &mut R,
        shift_chance: f64,
        drift: f64,
    ) {
        let Some(agent) = self.agents.get_mut(&id) else {
            return;
        };
        if rng.gen_bool(shift_chance.clamp(0.0, 1.0)) {
            let previous = agent.mood;
            let mut next = Mood::random(rng);
            if next == previous {
                next = Mood::ALL[(Mood::ALL.iter().position(|m| *m == next).unwrap_or(0) + 1)
                    % Mood::ALL.len()];
            }
            agent.mood = next;
            agent.mood_intensity = rng.gen_range(0.5..0.9);
        } else {
            let drift = drift.abs();
            let delta = rng.gen_range(-drift..=drift);
            agent.mood_intensity = (agent.mood_intensity + delta).clamp(0.0, 1.0);
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(AgentStore::new());
        }
        let content = std::fs::read_to_string(path)
            .context("Failed to read agents file")?;
        let store: AgentStore = serde_json::from_str(&content)
            .context("Failed to parse agents file")?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize agents")?;
        std::fs::write(path, content)
            .context("Failed to write agents file")?;
        Ok(())
    }
}
