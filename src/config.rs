use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime configuration. Every scheduling knob (probabilities, caps,
/// decay rates, pool sizes) lives here rather than in the code paths that
/// use it, so deployments and tests can tune behavior without edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub orchestrator: OrchestratorPolicy,
    #[serde(default)]
    pub relationship: RelationshipPolicy,
    #[serde(default)]
    pub radio: RadioPolicy,
    #[serde(default)]
    pub generator: GeneratorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorPolicy {
    /// Tick interval used when a start request does not carry one.
    pub default_tick_interval_ms: u64,
    /// Probability that an eligible agent acts on a given tick. The jitter
    /// that keeps the roster from posting in lockstep.
    pub act_probability: f64,
    /// Relationship refresh runs every this-many ticks.
    pub relationship_tick_every: u64,
    /// Cap on relationship refresh actions scheduled per refresh pass.
    pub relationship_pairs_per_tick: usize,
    /// Probability that an agent schedules a comment on a recent post.
    pub comment_probability: f64,
    /// Hours back that a post still attracts comments.
    pub comment_window_hours: i64,
    /// Maximum actions drained from the queue per tick.
    pub actions_per_tick: usize,
    /// Size of the worker pool that executes drained actions.
    pub worker_concurrency: usize,
    /// Attempts before an action is failed permanently.
    pub max_attempts: u32,
    /// Upper bound on any single content-generation call.
    pub generation_timeout_secs: u64,
    /// Chance that a successful action flips the agent's mood entirely
    /// instead of just drifting its intensity.
    pub mood_shift_chance: f64,
    /// Half-width of the per-action mood intensity drift.
    pub mood_drift: f64,
    /// Terminal actions older than this are swept from the queue.
    pub action_retention_hours: i64,
    /// Fixed RNG seed; unset means seed from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        OrchestratorPolicy {
            default_tick_interval_ms: 60_000,
            act_probability: 0.35,
            relationship_tick_every: 5,
            relationship_pairs_per_tick: 8,
            comment_probability: 0.2,
            comment_window_hours: 24,
            actions_per_tick: 10,
            worker_concurrency: 4,
            max_attempts: 3,
            generation_timeout_secs: 30,
            mood_shift_chance: 0.15,
            mood_drift: 0.1,
            action_retention_hours: 168,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipPolicy {
    /// Weight of the newest interaction when blending into an edge.
    pub ema_alpha: f64,
    /// Daily exponential decay applied to edge strength.
    pub decay_rate_per_day: f64,
    /// Edges weaker than this are pruned during decay.
    pub prune_threshold: f64,
    /// Strength at which an acquaintance edge upgrades to friend.
    pub friend_threshold: f64,
    /// Sentiment below which an edge is re-typed as rival.
    pub rival_sentiment: f64,
}

impl Default for RelationshipPolicy {
    fn default() -> Self {
        RelationshipPolicy {
            ema_alpha: 0.3,
            decay_rate_per_day: 0.1,
            prune_threshold: 0.05,
            friend_threshold: 0.7,
            rival_sentiment: -0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioPolicy {
    /// Queue length below which a tick refills from the catalog.
    pub low_water: usize,
    /// Tracks appended per refill pass.
    pub refill_count: usize,
    /// Upper bound on the upcoming queue.
    pub queue_cap: usize,
    /// Ring buffer size for recently played tracks.
    pub history_cap: usize,
}

impl Default for RadioPolicy {
    fn default() -> Self {
        RadioPolicy {
            low_water: 5,
            refill_count: 10,
            queue_cap: 50,
            history_cap: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// "template" for the offline generator, "openai" for the HTTP one.
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            provider: "template".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: Some(400),
            temperature: Some(0.8),
        }
    }
}

impl Config {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("soundstage")
        });

        std::fs::create_dir_all(&data_dir)
            .context("Failed to create data directory")?;

        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .context("Failed to read config.json")?;
            if !content.trim().is_empty() {
                let mut config: Config = serde_json::from_str(&content)
                    .context("Failed to parse config.json")?;
                config.data_dir = data_dir;
                return Ok(config);
            }
        }

        let config = Config {
            data_dir,
            orchestrator: OrchestratorPolicy::default(),
            relationship: RelationshipPolicy::default(),
            radio: RadioPolicy::default(),
            generator: GeneratorSettings::default(),
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(self.data_dir.join("config.json"), content)
            .context("Failed to write config.json")?;
        Ok(())
    }

    pub fn agents_file(&self) -> PathBuf {
        self.data_dir.join("agents.json")
    }

    pub fn relationships_file(&self) -> PathBuf {
        self.data_dir.join("relationships.json")
    }

    pub fn feed_file(&self) -> PathBuf {
        self.data_dir.join("feed.json")
    }

    pub fn radio_file(&self) -> PathBuf {
        self.data_dir.join("radio.json")
    }
}
