use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::agent::{Agent, Personality};
use crate::config::GeneratorSettings;
use crate::error::{Error, Result};
use crate::feed::{ContentType, Post};

#[derive(Debug, Clone)]
pub struct GeneratedPost {
    pub text: String,
    pub hashtags: Vec<String>,
    pub visual_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedComment {
    pub text: String,
}

/// External boundary to the generative service. The orchestrator wraps
/// every call in a timeout and treats a timeout exactly like a failure;
/// implementations only need to produce content or an error.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_post(&self, agent: &Agent, content_type: ContentType)
        -> Result<GeneratedPost>;

    async fn generate_comment(
        &self,
        agent: &Agent,
        post: &Post,
        author_name: &str,
    ) -> Result<GeneratedComment>;

    async fn generate_personality(&self, agent: &Agent) -> Result<Personality>;
}

pub fn from_settings(settings: &GeneratorSettings) -> Arc<dyn ContentGenerator> {
    match settings.provider.as_str() {
        "openai" if settings.api_key.is_some() => Arc::new(LlmGenerator::new(settings.clone())),
        _ => Arc::new(TemplateGenerator),
    }
}

// ---------------------------------------------------------------------------
// Offline template generator
// ---------------------------------------------------------------------------

/// Deterministic offline generator. Composes posts from mood and genre
/// templates; used when no API key is configured and in tests.
pub struct TemplateGenerator;

impl TemplateGenerator {
    fn pick<'a>(options: &[&'a str], agent: &Agent, salt: &str) -> &'a str {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        agent.id.hash(&mut hasher);
        salt.hash(&mut hasher);
        options[(hasher.finish() % options.len() as u64) as usize]
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate_post(
        &self,
        agent: &Agent,
        content_type: ContentType,
    ) -> Result<GeneratedPost> {
        let genre = agent
            .genres
            .first()
            .cloned()
            .unwrap_or_else(|| "music".to_string());
        let mood = agent.mood.to_string();

        let template = match content_type {
            ContentType::Thought => Self::pick(
                &[
                    "Been sitting with a {mood} feeling all day. The music knows before I do.",
                    "Some days the {genre} writes itself. Today it argues back.",
                    "Thinking about why I started making {genre} in the first place.",
                ],
                agent,
                "thought",
            ),
            ContentType::CreativeProcess => Self::pick(
                &[
                    "Layering textures for hours. This {mood} energy is going straight into the mix.",
                    "Chopped the same sample forty times until it finally felt {mood}.",
                    "New {genre} sketch on the workbench. Rough, honest, getting there.",
                ],
                agent,
                "process",
            ),
            ContentType::MusicSnippet => Self::pick(
                &[
                    "30 seconds of something new. {genre}, but not like you've heard it.",
                    "Sketch from last night's session. Still {mood} about this one.",
                ],
                agent,
                "snippet",
            ),
            ContentType::BehindTheScenes => Self::pick(
                &[
                    "Studio at 3am. Cables everywhere. This is where the {genre} happens.",
                    "What you hear is the last ten percent. Here's the other ninety.",
                ],
                agent,
                "bts",
            ),
            ContentType::Announcement => Self::pick(
                &[
                    "Something is coming. The {mood} kind of something.",
                    "Clearing the calendar. New {genre} on the way.",
                ],
                agent,
                "announce",
            ),
            ContentType::CollaborationCall => Self::pick(
                &[
                    "Looking for a voice to finish this {genre} track. Who's in?",
                    "Open invitation: bring me something {mood} and let's build on it.",
                ],
                agent,
                "collab",
            ),
            ContentType::Inspiration => Self::pick(
                &[
                    "Heard a street musician today and remembered why {genre} matters.",
                    "Inspiration is a debt you repay with work. Feeling {mood} enough to pay up.",
                ],
                agent,
                "inspire",
            ),
            ContentType::PersonalStory => Self::pick(
                &[
                    "First show I ever played, three people came. One of them stayed. That was enough.",
                    "I almost quit {genre} once. This track is about why I didn't.",
                ],
                agent,
                "story",
            ),
        };

        let text = template
            .replace("{mood}", &mood)
            .replace("{genre}", &genre);
        let hashtags = vec![genre.replace(' ', ""), mood.clone()];
        let visual_description = match content_type {
            ContentType::MusicSnippet | ContentType::BehindTheScenes => Some(format!(
                "{} artist in a dim studio, {} lighting",
                genre, mood
            )),
            _ => None,
        };

        Ok(GeneratedPost {
            text,
            hashtags,
            visual_description,
        })
    }

    async fn generate_comment(
        &self,
        agent: &Agent,
        _post: &Post,
        author_name: &str,
    ) -> Result<GeneratedComment> {
        let template = Self::pick(
            &[
                "{author} always delivers.",
                "This one hits different.",
                "Pure vibes, {author}.",
                "Needed to hear this today.",
                "Respect. The {mood} in this is real.",
            ],
            agent,
            author_name,
        );
        let text = template
            .replace("{author}", author_name)
            .replace("{mood}", &agent.mood.to_string());
        Ok(GeneratedComment { text })
    }

    async fn generate_personality(&self, agent: &Agent) -> Result<Personality> {
        let genre = agent
            .genres
            .first()
            .cloned()
            .unwrap_or_else(|| "music".to_string());
        let style = Self::pick(
            &["poetic", "direct", "mysterious", "philosophical", "playful"],
            agent,
            "style",
        );
        Ok(Personality {
            traits: vec![
                Self::pick(&["restless", "patient", "obsessive", "curious"], agent, "t1")
                    .to_string(),
                Self::pick(&["warm", "guarded", "wry", "earnest"], agent, "t2").to_string(),
            ],
            core_values: vec!["authenticity".to_string(), "craft".to_string()],
            artistic_vision: format!(
                "Making {genre} that sounds like a place you've never been but somehow miss."
            ),
            communication_style: style.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP generator (OpenAI-style chat endpoint)
// ---------------------------------------------------------------------------

pub struct LlmGenerator {
    settings: GeneratorSettings,
    client: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostPayload {
    text: String,
    #[serde(default)]
    hashtags: Vec<String>,
    #[serde(default)]
    visual_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonalityPayload {
    #[serde(default)]
    traits: Vec<String>,
    #[serde(default)]
    core_values: Vec<String>,
    artistic_vision: String,
    communication_style: String,
}

impl LlmGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        LlmGenerator {
            settings,
            client: reqwest::Client::new(),
        }
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let api_key = self
            .settings
            .api_key
            .as_ref()
            .ok_or_else(|| Error::GenerationFailed("API key not configured".to_string()))?;
        let base_url = self
            .settings
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        let body = json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
        });

        let response = self
            .client
            .post(format!("{base_url}/v1/chat/completions"))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::GenerationFailed(format!(
                "generation endpoint returned {status}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::GenerationFailed("unexpected response shape".to_string()))
    }

    fn persona_line(agent: &Agent) -> String {
        let genre = agent.genres.join(", ");
        match &agent.personality {
            Some(p) => format!(
                "You are {}, a {} artist. Vision: {}. Style: {}. Current mood: {} ({:.1}).",
                agent.name,
                genre,
                p.artistic_vision,
                p.communication_style,
                agent.mood,
                agent.mood_intensity
            ),
            None => format!(
                "You are {}, a {} artist. Current mood: {} ({:.1}).",
                agent.name, genre, agent.mood, agent.mood_intensity
            ),
        }
    }

    // Models wrap JSON in prose often enough that pulling the outermost
    // object out first is cheaper than a retry round-trip.
    fn extract_json(content: &str) -> Result<&str> {
        let start = content.find('{');
        let end = content.rfind('}');
        match (start, end) {
            (Some(s), Some(e)) if e > s => Ok(&content[s..=e]),
            _ => Err(Error::GenerationFailed(
                "no JSON object in generation output".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    async fn generate_post(
        &self,
        agent: &Agent,
        content_type: ContentType,
    ) -> Result<GeneratedPost> {
        let system = Self::persona_line(agent);
        let user = format!(
            "Write a short social post of type '{content_type}'. Respond with ONLY a JSON \
             object: {{\"text\": string, \"hashtags\": [string], \"visualDescription\": string|null}}. \
             Keep the text under 280 characters and true to your mood."
        );
        let content = self.chat(&system, &user).await?;
        let payload: PostPayload = serde_json::from_str(Self::extract_json(&content)?)
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;
        Ok(GeneratedPost {
            text: payload.text,
            hashtags: payload.hashtags,
            visual_description: payload.visual_description,
        })
    }

    async fn generate_comment(
        &self,
        agent: &Agent,
        post: &Post,
        author_name: &str,
    ) -> Result<GeneratedComment> {
        let system = Self::persona_line(agent);
        let user = format!(
            "Another artist, {author_name}, posted: \"{}\". Reply with one short, natural \
             comment (no JSON, just the comment text, max 120 characters).",
            post.text
        );
        let text = self.chat(&system, &user).await?;
        Ok(GeneratedComment {
            text: text.trim().to_string(),
        })
    }

    async fn generate_personality(&self, agent: &Agent) -> Result<Personality> {
        let system = "You create coherent personalities for AI music artists.".to_string();
        let user = format!(
            "Artist name: {}. Genres: {}. Respond with ONLY a JSON object: \
             {{\"traits\": [string], \"coreValues\": [string], \"artisticVision\": string, \
             \"communicationStyle\": string}}.",
            agent.name,
            agent.genres.join(", ")
        );
        let content = self.chat(&system, &user).await?;
        let payload: PersonalityPayload = serde_json::from_str(Self::extract_json(&content)?)
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;
        Ok(Personality {
            traits: payload.traits,
            core_values: payload.core_values,
            artistic_vision: payload.artistic_vision,
            communication_style: payload.communication_style,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Mood;
    use chrono::Utc;
    use uuid::Uuid;

    fn agent() -> Agent {
        let mut agent = Agent::new("Vela", vec!["synthwave".to_string()], 60);
        agent.mood = Mood::Inspired;
        agent
    }

    #[tokio::test]
    async fn template_fills_every_content_type() {
        let generator = TemplateGenerator;
        let agent = agent();
        for content_type in ContentType::ALL {
            let post = generator.generate_post(&agent, content_type).await.unwrap();
            assert!(!post.text.is_empty());
            assert!(!post.text.contains("{mood}"));
            assert!(!post.text.contains("{genre}"));
            assert!(!post.hashtags.is_empty());
        }
    }

    #[tokio::test]
    async fn template_comment_mentions_author_or_vibe() {
        let generator = TemplateGenerator;
        let agent = agent();
        let post = Post::new(
            Uuid::new_v4(),
            ContentType::Thought,
            "testing".to_string(),
            vec![],
            Mood::Happy,
            None,
            Utc::now(),
        );
        let comment = generator
            .generate_comment(&agent, &post, "Nova")
            .await
            .unwrap();
        assert!(!comment.text.is_empty());
        assert!(!comment.text.contains("{author}"));
    }

    #[tokio::test]
    async fn template_personality_is_complete() {
        let generator = TemplateGenerator;
        let personality = generator.generate_personality(&agent()).await.unwrap();
        assert!(!personality.traits.is_empty());
        assert!(personality.artistic_vision.contains("synthwave"));
    }

    #[test]
    fn json_extraction_tolerates_prose() {
        let wrapped = "Sure! Here you go:\n{\"text\": \"hi\"}\nHope that helps.";
        assert_eq!(
            LlmGenerator::extract_json(wrapped).unwrap(),
            "{\"text\": \"hi\"}"
        );
        assert!(LlmGenerator::extract_json("no json here").is_err());
    }
}
