use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentStore, Mood};
use crate::error::Error;
use crate::relationship::RelationshipGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Thought,
    CreativeProcess,
    MusicSnippet,
    BehindTheScenes,
    Announcement,
    CollaborationCall,
    Inspiration,
    PersonalStory,
}

impl ContentType {
    pub const ALL: [ContentType; 8] = [
        ContentType::Thought,
        ContentType::CreativeProcess,
        ContentType::MusicSnippet,
        ContentType::BehindTheScenes,
        ContentType::Announcement,
        ContentType::CollaborationCall,
        ContentType::Inspiration,
        ContentType::PersonalStory,
    ];

    /// Mood-weighted choice of what kind of content to produce. An
    /// inspired artist leans toward process and inspiration posts, a
    /// melancholic one toward thoughts and personal stories.
    pub fn pick<R: Rng>(mood: Mood, rng: &mut R) -> ContentType {
        let mut weights: HashMap<ContentType, u32> =
            ContentType::ALL.iter().map(|ct| (*ct, 1)).collect();

        match mood {
            Mood::Inspired | Mood::Creative => {
                weights.insert(ContentType::CreativeProcess, 4);
                weights.insert(ContentType::Inspiration, 3);
                weights.insert(ContentType::MusicSnippet, 2);
            }
            Mood::Melancholic | Mood::Introspective => {
                weights.insert(ContentType::Thought, 4);
                weights.insert(ContentType::PersonalStory, 3);
            }
            Mood::Excited | Mood::Energetic => {
                weights.insert(ContentType::Announcement, 3);
                weights.insert(ContentType::CollaborationCall, 3);
                weights.insert(ContentType::MusicSnippet, 2);
            }
            Mood::Focused => {
                weights.insert(ContentType::BehindTheScenes, 3);
                weights.insert(ContentType::CreativeProcess, 2);
            }
            Mood::Rebellious => {
                weights.insert(ContentType::Thought, 3);
                weights.insert(ContentType::Announcement, 2);
            }
            Mood::Happy | Mood::Peaceful => {
                weights.insert(ContentType::Inspiration, 2);
                weights.insert(ContentType::BehindTheScenes, 2);
            }
        }

        let total: u32 = weights.values().sum();
        let mut roll = rng.gen_range(0..total);
        for ct in ContentType::ALL {
            let w = weights[&ct];
            if roll < w {
                return ct;
            }
            roll -= w;
        }
        ContentType::Thought
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Thought => write!(f, "thought"),
            ContentType::CreativeProcess => write!(f, "creative_process"),
            ContentType::MusicSnippet => write!(f, "music_snippet"),
            ContentType::BehindTheScenes => write!(f, "behind_the_scenes"),
            ContentType::Announcement => write!(f, "announcement"),
            ContentType::CollaborationCall => write!(f, "collaboration_call"),
            ContentType::Inspiration => write!(f, "inspiration"),
            ContentType::PersonalStory => write!(f, "personal_story"),
        }
    }
}

/// A published post. Immutable after creation except for the like and
/// comment counters, which only ever grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub content_type: ContentType,
    pub text: String,
    pub hashtags: Vec<String>,
    /// Mood the author was in at post time, denormalized onto the post.
    pub mood: Mood,
    pub visual_description: Option<String>,
    pub likes: u64,
    pub comments: u64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(
        agent_id: Uuid,
        content_type: ContentType,
        text: String,
        hashtags: Vec<String>,
        mood: Mood,
        visual_description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Post {
            id: Uuid::new_v4(),
            agent_id,
            content_type,
            text,
            hashtags,
            mood,
            visual_description,
            likes: 0,
            comments: 0,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub agent_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorView {
    pub id: Uuid,
    pub name: String,
    pub genres: Vec<String>,
    pub mood: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub post: Post,
    pub artist: Option<AuthorView>,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPoster {
    pub agent_id: Uuid,
    pub name: String,
    pub post_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_posts: usize,
    pub recent_posts: usize,
    pub total_comments: usize,
    pub total_relationships: usize,
    pub mood_distribution: HashMap<String, usize>,
    pub top_posters: Vec<TopPoster>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FeedStore {
    posts: Vec<Post>,
    comments: Vec<Comment>,
}

impl FeedStore {
    pub fn new() -> Self {
        FeedStore::default()
    }

    pub fn add_post(&mut self, post: Post) -> Uuid {
        let id = post.id;
        self.posts.push(post);
        id
    }

    pub fn get_post(&self, id: Uuid) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn like_post(&mut self, id: Uuid) -> crate::error::Result<u64> {
        let post = self
            .posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("post {id}")))?;
        post.likes += 1;
        Ok(post.likes)
    }

    /// Attach a comment to its post, bumping the post's counter.
    pub fn add_comment(&mut self, comment: Comment) -> crate::error::Result<Uuid> {
        let post = self
            .posts
            .iter_mut()
            .find(|p| p.id == comment.post_id)
            .ok_or_else(|| Error::NotFound(format!("post {}", comment.post_id)))?;
        post.comments += 1;
        let id = comment.id;
        self.comments.push(comment);
        Ok(id)
    }

    /// Posts newer than the window, newest first.
    pub fn recent_posts(&self, now: DateTime<Utc>, window: Duration) -> Vec<&Post> {
        let cutoff = now - window;
        let mut recent: Vec<&Post> = self
            .posts
            .iter()
            .filter(|p| p.created_at >= cutoff)
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent
    }

    /// Feed view: newest posts with their author and comments.
    pub fn feed(&self, limit: usize, agents: &AgentStore) -> Vec<FeedItem> {
        let mut posts: Vec<&Post> = self.posts.iter().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        posts
            .into_iter()
            .take(limit)
            .map(|post| {
                let mut comments: Vec<Comment> = self
                    .comments
                    .iter()
                    .filter(|c| c.post_id == post.id)
                    .cloned()
                    .collect();
                comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));

                FeedItem {
                    post: post.clone(),
                    artist: agents.get(post.agent_id).map(|agent| AuthorView {
                        id: agent.id,
                        name: agent.name.clone(),
                        genres: agent.genres.clone(),
                        mood: agent.mood.to_string(),
                    }),
                    comments,
                }
            })
            .collect()
    }

    pub fn analytics(
        &self,
        agents: &AgentStore,
        graph: &RelationshipGraph,
        now: DateTime<Utc>,
    ) -> Analytics {
        let recent_posts = self.recent_posts(now, Duration::hours(24)).len();

        let mut mood_distribution: HashMap<String, usize> = HashMap::new();
        for agent in agents.all().filter(|a| a.active) {
            *mood_distribution.entry(agent.mood.to_string()).or_insert(0) += 1;
        }

        let mut per_author: HashMap<Uuid, usize> = HashMap::new();
        for post in &self.posts {
            *per_author.entry(post.agent_id).or_insert(0) += 1;
        }
        let mut top_posters: Vec<TopPoster> = per_author
            .into_iter()
            .filter_map(|(agent_id, post_count)| {
                agents.get(agent_id).map(|agent| TopPoster {
                    agent_id,
                    name: agent.name.clone(),
                    post_count,
                })
            })
            .collect();
        top_posters.sort_by(|a, b| b.post_count.cmp(&a.post_count).then(a.name.cmp(&b.name)));
        top_posters.truncate(5);

        Analytics {
            total_posts: self.posts.len(),
            recent_posts,
            total_comments: self.comments.len(),
            total_relationships: graph.edge_count(),
            mood_distribution,
            top_posters,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(FeedStore::new());
        }
        let content = std::fs::read_to_string(path)
            .context("Failed to read feed file")?;
        let store: FeedStore = serde_json::from_str(&content)
            .context("Failed to parse feed file")?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize feed")?;
        std::fs::write(path, content)
            .context("Failed to write feed file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::config::RelationshipPolicy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn post_for(agent_id: Uuid, now: DateTime<Utc>) -> Post {
        Post::new(
            agent_id,
            ContentType::Thought,
            "late night studio thoughts".to_string(),
            vec!["studio".to_string()],
            Mood::Introspective,
            None,
            now,
        )
    }

    #[test]
    fn comment_bumps_post_counter() {
        let mut feed = FeedStore::new();
        let author = Uuid::new_v4();
        let now = Utc::now();
        let post_id = feed.add_post(post_for(author, now));

        feed.add_comment(Comment {
            id: Uuid::new_v4(),
            post_id,
            agent_id: Uuid::new_v4(),
            text: "this resonates".to_string(),
            created_at: now,
        })
        .unwrap();

        assert_eq!(feed.get_post(post_id).unwrap().comments, 1);
        assert_eq!(feed.comment_count(), 1);
    }

    #[test]
    fn comment_on_unknown_post_is_not_found() {
        let mut feed = FeedStore::new();
        let result = feed.add_comment(Comment {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            text: "lost".to_string(),
            created_at: Utc::now(),
        });
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn likes_only_grow() {
        let mut feed = FeedStore::new();
        let post_id = feed.add_post(post_for(Uuid::new_v4(), Utc::now()));

        assert_eq!(feed.like_post(post_id).unwrap(), 1);
        assert_eq!(feed.like_post(post_id).unwrap(), 2);
        assert!(feed.like_post(Uuid::new_v4()).is_err());
    }

    #[test]
    fn feed_is_newest_first_and_limited() {
        let mut agents = AgentStore::new();
        let author = agents.insert(Agent::new("Lyra", vec!["pop".to_string()], 60));

        let mut feed = FeedStore::new();
        let now = Utc::now();
        for i in 0..5 {
            feed.add_post(post_for(author, now - Duration::minutes(i)));
        }

        let items = feed.feed(3, &agents);
        assert_eq!(items.len(), 3);
        assert!(items[0].post.created_at > items[1].post.created_at);
        assert_eq!(items[0].artist.as_ref().unwrap().name, "Lyra");
    }

    #[test]
    fn analytics_counts_moods_and_top_posters() {
        let mut agents = AgentStore::new();
        let a = agents.insert(Agent::new("Nova", vec!["techno".to_string()], 60));
        let b = agents.insert(Agent::new("Echo", vec!["ambient".to_string()], 60));

        let mut feed = FeedStore::new();
        let now = Utc::now();
        feed.add_post(post_for(a, now));
        feed.add_post(post_for(a, now));
        feed.add_post(post_for(b, now));

        let graph = RelationshipGraph::new(RelationshipPolicy::default());
        let analytics = feed.analytics(&agents, &graph, now);

        assert_eq!(analytics.total_posts, 3);
        assert_eq!(analytics.recent_posts, 3);
        assert_eq!(analytics.top_posters[0].name, "Nova");
        assert_eq!(analytics.mood_distribution["peaceful"], 2);
    }

    #[test]
    fn content_pick_follows_mood_weighting() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut process_count = 0;
        for _ in 0..200 {
            if ContentType::pick(Mood::Inspired, &mut rng) == ContentType::CreativeProcess {
                process_count += 1;
            }
        }
        // 4-of-15 weight should dominate the uniform 1-of-15 types
        assert!(process_count > 20);
    }
}
