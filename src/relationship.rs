use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentStore;
use crate::config::RelationshipPolicy;

/// Kind of a directed relationship edge between two artists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Friend,
    Collaborator,
    Rival,
    Mentor,
    Fan,
    Acquaintance,
    Neutral,
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationKind::Friend => write!(f, "friend"),
            RelationKind::Collaborator => write!(f, "collaborator"),
            RelationKind::Rival => write!(f, "rival"),
            RelationKind::Mentor => write!(f, "mentor"),
            RelationKind::Fan => write!(f, "fan"),
            RelationKind::Acquaintance => write!(f, "acquaintance"),
            RelationKind::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Collaboration,
    Support,
    Mention,
    Critique,
}

/// One observed interaction, fed into the graph. Magnitude is how strong
/// the interaction was, polarity how positive or negative it felt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InteractionSignal {
    pub kind: InteractionKind,
    pub magnitude: f64,
    pub polarity: f64,
}

impl InteractionSignal {
    pub fn collaboration() -> Self {
        InteractionSignal {
            kind: InteractionKind::Collaboration,
            magnitude: 0.5,
            polarity: 0.7,
        }
    }

    pub fn support() -> Self {
        InteractionSignal {
            kind: InteractionKind::Support,
            magnitude: 0.3,
            polarity: 0.6,
        }
    }

    pub fn mention() -> Self {
        InteractionSignal {
            kind: InteractionKind::Mention,
            magnitude: 0.2,
            polarity: 0.2,
        }
    }

    pub fn critique() -> Self {
        InteractionSignal {
            kind: InteractionKind::Critique,
            magnitude: 0.4,
            polarity: -0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEdge {
    pub kind: RelationKind,
    /// Bond strength, always within [0, 1]. Decays with inactivity.
    pub strength: f64,
    /// Feeling toward the target, always within [-1, 1].
    pub sentiment: f64,
    pub interaction_count: u32,
    pub last_interaction: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: Uuid,
    pub name: String,
    pub genres: Vec<String>,
    pub mood: String,
    pub mood_intensity: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: Uuid,
    pub target: Uuid,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    pub strength: f64,
    pub sentiment: f64,
}

// JSON maps need string keys, so edges are persisted as a flat record list.
#[derive(Serialize, Deserialize)]
struct StoredEdge {
    source: Uuid,
    target: Uuid,
    #[serde(flatten)]
    edge: RelationshipEdge,
}

/// Directed, weighted relationship graph. At most one edge exists per
/// ordered (source, target) pair; edges appear lazily on first interaction
/// and are blended, decayed and eventually pruned afterwards.
#[derive(Debug)]
pub struct RelationshipGraph {
    edges: HashMap<(Uuid, Uuid), RelationshipEdge>,
    policy: RelationshipPolicy,
}

impl RelationshipGraph {
    pub fn new(policy: RelationshipPolicy) -> Self {
        RelationshipGraph {
            edges: HashMap::new(),
            policy,
        }
    }

    pub fn edge(&self, source: Uuid, target: Uuid) -> Option<&RelationshipEdge> {
        self.edges.get(&(source, target))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Create or update the (source, target) edge from an interaction.
    /// New edges take their kind from the signal; existing edges blend the
    /// signal in with an exponential moving average, clamped into bounds.
    pub fn upsert_edge(
        &mut self,
        source: Uuid,
        target: Uuid,
        signal: InteractionSignal,
        now: DateTime<Utc>,
    ) {
        if source == target {
            return;
        }
        let alpha = self.policy.ema_alpha.clamp(0.0, 1.0);
        let friend_threshold = self.policy.friend_threshold;
        let rival_sentiment = self.policy.rival_sentiment;

        match self.edges.get_mut(&(source, target)) {
            Some(edge) => {
                edge.strength =
                    (edge.strength * (1.0 - alpha) + signal.magnitude * alpha).clamp(0.0, 1.0);
                edge.sentiment =
                    (edge.sentiment * (1.0 - alpha) + signal.polarity * alpha).clamp(-1.0, 1.0);
                edge.interaction_count += 1;
                edge.last_interaction = now;

                if edge.sentiment <= rival_sentiment {
                    edge.kind = RelationKind::Rival;
                } else if edge.strength >= friend_threshold
                    && matches!(edge.kind, RelationKind::Acquaintance | RelationKind::Fan)
                {
                    edge.kind = RelationKind::Friend;
                }
            }
            None => {
                let kind = infer_kind(signal);
                self.edges.insert(
                    (source, target),
                    RelationshipEdge {
                        kind,
                        strength: signal.magnitude.clamp(0.0, 1.0),
                        sentiment: signal.polarity.clamp(-1.0, 1.0),
                        interaction_count: 1,
                        last_interaction: now,
                    },
                );
            }
        }
    }

    /// Decay all edge strengths for the elapsed interval and prune edges
    /// that dropped below the threshold. Keeps the graph bounded.
    pub fn decay(&mut self, elapsed: Duration) {
        let days = elapsed.num_milliseconds().max(0) as f64 / 86_400_000.0;
        if days <= 0.0 {
            return;
        }
        let factor = (1.0 - self.policy.decay_rate_per_day.clamp(0.0, 1.0)).powf(days);
        let threshold = self.policy.prune_threshold;

        for edge in self.edges.values_mut() {
            edge.strength = (edge.strength * factor).clamp(0.0, 1.0);
        }
        self.edges.retain(|_, edge| edge.strength >= threshold);
    }

    /// Node/edge lists for visualization. Agents with no edges and no
    /// recorded activity are left out unless explicitly requested.
    pub fn snapshot(
        &self,
        agents: &AgentStore,
        include_isolated: bool,
    ) -> (Vec<GraphNode>, Vec<GraphEdge>) {
        let mut nodes: Vec<GraphNode> = agents
            .all()
            .filter(|agent| {
                include_isolated
                    || agent.last_action_at.is_some()
                    || self
                        .edges
                        .keys()
                        .any(|(s, t)| *s == agent.id || *t == agent.id)
            })
            .map(|agent| GraphNode {
                id: agent.id,
                name: agent.name.clone(),
                genres: agent.genres.clone(),
                mood: agent.mood.to_string(),
                mood_intensity: agent.mood_intensity,
            })
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut edges: Vec<GraphEdge> = self
            .edges
            .iter()
            .map(|((source, target), edge)| GraphEdge {
                source: *source,
                target: *target,
                kind: edge.kind,
                strength: edge.strength,
                sentiment: edge.sentiment,
            })
            .collect();
        edges.sort_by(|a, b| (a.source, a.target).cmp(&(b.source, b.target)));

        (nodes, edges)
    }

    pub fn load(path: &Path, policy: RelationshipPolicy) -> Result<Self> {
        let mut graph = RelationshipGraph::new(policy);
        if !path.exists() {
            return Ok(graph);
        }
        let content = std::fs::read_to_string(path)
            .context("Failed to read relationships file")?;
        let stored: Vec<StoredEdge> = serde_json::from_str(&content)
            .context("Failed to parse relationships file")?;
        for record in stored {
            graph
                .edges
                .insert((record.source, record.target), record.edge);
        }
        Ok(graph)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let stored: Vec<StoredEdge> = self
            .edges
            .iter()
            .map(|((source, target), edge)| StoredEdge {
                source: *source,
                target: *target,
                edge: edge.clone(),
            })
            .collect();
        let content = serde_json::to_string_pretty(&stored)
            .context("Failed to serialize relationships")?;
        std::fs::write(path, content)
            .context("Failed to write relationships file")?;
        Ok(())
    }
}

fn infer_kind(signal: InteractionSignal) -> RelationKind {
    match signal.kind {
        InteractionKind::Collaboration => RelationKind::Collaborator,
        InteractionKind::Support => RelationKind::Fan,
        InteractionKind::Mention => RelationKind::Acquaintance,
        InteractionKind::Critique => {
            if signal.polarity < 0.0 {
                RelationKind::Rival
            } else {
                RelationKind::Acquaintance
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;

    fn graph() -> RelationshipGraph {
        RelationshipGraph::new(RelationshipPolicy::default())
    }

    #[test]
    fn first_interaction_creates_typed_edge() {
        let mut g = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        g.upsert_edge(a, b, InteractionSignal::collaboration(), now);

        let edge = g.edge(a, b).unwrap();
        assert_eq!(edge.kind, RelationKind::Collaborator);
        assert_eq!(edge.interaction_count, 1);
        assert!(g.edge(b, a).is_none());
    }

    #[test]
    fn repeated_upserts_never_duplicate() {
        let mut g = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        for _ in 0..5 {
            g.upsert_edge(a, b, InteractionSignal::support(), now);
        }
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edge(a, b).unwrap().interaction_count, 5);
    }

    #[test]
    fn bounds_hold_under_extreme_signals() {
        let mut g = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        let hot = InteractionSignal {
            kind: InteractionKind::Collaboration,
            magnitude: 5.0,
            polarity: 3.0,
        };
        let cold = InteractionSignal {
            kind: InteractionKind::Critique,
            magnitude: 5.0,
            polarity: -3.0,
        };

        for _ in 0..50 {
            g.upsert_edge(a, b, hot, now);
        }
        let edge = g.edge(a, b).unwrap();
        assert!(edge.strength <= 1.0);
        assert!(edge.sentiment <= 1.0);

        for _ in 0..50 {
            g.upsert_edge(a, b, cold, now);
        }
        let edge = g.edge(a, b).unwrap();
        assert!(edge.strength <= 1.0);
        assert!(edge.sentiment >= -1.0);
    }

    #[test]
    fn negative_sentiment_turns_rival() {
        let mut g = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        g.upsert_edge(a, b, InteractionSignal::mention(), now);
        for _ in 0..10 {
            g.upsert_edge(a, b, InteractionSignal::critique(), now);
        }
        assert_eq!(g.edge(a, b).unwrap().kind, RelationKind::Rival);
    }

    #[test]
    fn strong_acquaintance_upgrades_to_friend() {
        let mut g = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        let warm = InteractionSignal {
            kind: InteractionKind::Mention,
            magnitude: 0.9,
            polarity: 0.5,
        };

        for _ in 0..20 {
            g.upsert_edge(a, b, warm, now);
        }
        assert_eq!(g.edge(a, b).unwrap().kind, RelationKind::Friend);
    }

    #[test]
    fn decay_prunes_weak_edges() {
        let mut g = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        g.upsert_edge(a, b, InteractionSignal::mention(), now);
        assert_eq!(g.edge_count(), 1);

        g.decay(Duration::days(60));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn decay_keeps_strength_in_bounds() {
        let mut g = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        g.upsert_edge(a, b, InteractionSignal::collaboration(), now);
        g.decay(Duration::hours(1));

        let edge = g.edge(a, b).unwrap();
        assert!(edge.strength > 0.0 && edge.strength <= 1.0);
    }

    #[test]
    fn snapshot_excludes_idle_isolated_agents() {
        let mut agents = AgentStore::new();
        let connected = agents.insert(Agent::new("Nova", vec!["techno".to_string()], 60));
        let other = agents.insert(Agent::new("Echo", vec!["ambient".to_string()], 60));
        agents.insert(Agent::new("Idle", vec!["jazz".to_string()], 60));

        let mut g = graph();
        g.upsert_edge(connected, other, InteractionSignal::support(), Utc::now());

        let (nodes, edges) = g.snapshot(&agents, false);
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 1);

        let (all_nodes, _) = g.snapshot(&agents, true);
        assert_eq!(all_nodes.len(), 3);
    }
}
