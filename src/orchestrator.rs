use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentStore, Personality};
use crate::config::{Config, OrchestratorPolicy};
use crate::error::{Error, Result};
use crate::feed::{Comment, ContentType, FeedStore, Post};
use crate::generator::ContentGenerator;
use crate::queue::{ActionKind, ActionQueue, PendingAction};
use crate::radio::{Radio, Track};
use crate::relationship::{InteractionSignal, RelationshipGraph};

const COMMENT_PRIORITY: i32 = 15;
const RELATIONSHIP_PRIORITY: i32 = 20;

/// Process-wide scheduler state. Initialized stopped, survives across
/// ticks, and is only ever replaced when the process restarts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub is_running: bool,
    pub tick_interval_ms: u64,
    pub tick_count: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub active_artists: usize,
    pub pending_actions: usize,
}

/// The tick scheduler driving the artist population: selects eligible
/// agents, feeds the action queue, drains it with bounded concurrency,
/// and keeps the relationship graph and feed up to date.
///
/// One instance exists per process, owned behind an `Arc` and threaded
/// into the HTTP handlers; there is no ambient global.
pub struct Orchestrator {
    config: Config,
    generator: Arc<dyn ContentGenerator>,
    pub(crate) agents: RwLock<AgentStore>,
    pub(crate) graph: RwLock<RelationshipGraph>,
    pub(crate) queue: Mutex<ActionQueue>,
    pub(crate) feed: RwLock<FeedStore>,
    pub(crate) radio: Arc<Radio>,
    run: RwLock<RunState>,
    /// Serializes tick bodies. Taken with `try_lock`, so an overlapping
    /// tick coalesces into a no-op instead of queueing behind the gate.
    tick_gate: tokio::sync::Mutex<()>,
    /// Handle of the periodic timer task; aborting it is how `stop`
    /// cancels future ticks. Also serializes start against stop.
    timer: Mutex<Option<JoinHandle<()>>>,
    rng: Mutex<StdRng>,
}

impl Orchestrator {
    pub fn bootstrap(
        config: Config,
        generator: Arc<dyn ContentGenerator>,
        radio: Arc<Radio>,
    ) -> anyhow::Result<Self> {
        let agents = AgentStore::load(&config.agents_file())?;
        let graph =
            RelationshipGraph::load(&config.relationships_file(), config.relationship.clone())?;
        let feed = FeedStore::load(&config.feed_file())?;

        let rng = match config.orchestrator.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let run = RunState {
            is_running: false,
            tick_interval_ms: config.orchestrator.default_tick_interval_ms,
            tick_count: 0,
            last_tick_at: None,
            active_artists: agents.active_count(),
            pending_actions: 0,
        };

        Ok(Orchestrator {
            queue: Mutex::new(ActionQueue::new(config.orchestrator.max_attempts)),
            config,
            generator,
            agents: RwLock::new(agents),
            graph: RwLock::new(graph),
            feed: RwLock::new(feed),
            radio,
            run: RwLock::new(run),
            tick_gate: tokio::sync::Mutex::new(()),
            timer: Mutex::new(None),
            rng: Mutex::new(rng),
        })
    }

    pub fn default_tick_interval(&self) -> u64 {
        self.config.orchestrator.default_tick_interval_ms
    }

    /// Begin periodic ticking. The timer task fires after one full
    /// interval; the tick count does not move until then or until a
    /// manual tick arrives.
    pub fn start(self: &Arc<Self>, interval_ms: u64) -> Result<RunState> {
        if interval_ms == 0 {
            return Err(Error::InvalidArgument(
                "tick interval must be positive".to_string(),
            ));
        }

        let mut timer = self.timer.lock();
        if self.run.read().is_running {
            return Err(Error::AlreadyRunning);
        }
        {
            let mut run = self.run.write();
            run.is_running = true;
            run.tick_interval_ms = interval_ms;
        }

        let orchestrator = Arc::clone(self);
        let period = StdDuration::from_millis(interval_ms);
        // Each tick runs as its own task: aborting the timer cancels
        // future ticks without cutting down one already in flight.
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    if let Err(e) = orchestrator.tick().await {
                        warn!("scheduled tick failed: {e}");
                    }
                });
            }
        });
        *timer = Some(handle);

        info!(interval_ms, "orchestrator started");
        Ok(self.status())
    }

    /// Cancel future ticks. Idempotent; an in-flight tick is left to run
    /// to completion.
    pub fn stop(&self) -> RunState {
        let mut timer = self.timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
            info!("orchestrator stopped");
        }
        self.run.write().is_running = false;
        self.status()
    }

    /// Cheap consistent snapshot for the status surface. Never waits on
    /// an in-flight tick.
    pub fn status(&self) -> RunState {
        let mut run = self.run.read().clone();
        run.active_artists = self.agents.read().active_count();
        run.pending_actions = self.queue.lock().pending_count();
        run
    }

    pub fn recent_actions(&self, n: usize) -> Vec<PendingAction> {
        self.queue.lock().recent(n)
    }

    /// One scheduling pass. Only a single tick body executes at a time
    /// process-wide; a tick that arrives while another is in flight
    /// returns success without doing anything, and without incrementing
    /// the tick count.
    pub async fn tick(&self) -> Result<()> {
        let Ok(_gate) = self.tick_gate.try_lock() else {
            debug!("tick already in flight, coalescing");
            return Ok(());
        };

        let now = Utc::now();
        let policy = self.config.orchestrator.clone();
        let (tick_number, previous_tick_at) = {
            let run = self.run.read();
            (run.tick_count + 1, run.last_tick_at)
        };

        self.schedule_due_posts(now, &policy);

        if tick_number % policy.relationship_tick_every.max(1) == 0 {
            self.schedule_relationship_refresh(now, &policy);
        }

        self.schedule_comments(now, &policy);

        // Edge strength erodes by wall-clock time between executed ticks.
        if let Some(previous) = previous_tick_at {
            self.graph.write().decay(now - previous);
        }

        let batch = self.queue.lock().drain_up_to(policy.actions_per_tick);
        let drained = batch.len();
        let results: Vec<bool> = futures::stream::iter(batch)
            .map(|action| self.execute_action(action))
            .buffer_unordered(policy.worker_concurrency.max(1))
            .collect()
            .await;
        let succeeded = results.iter().filter(|ok| **ok).count();

        self.queue
            .lock()
            .sweep(now, Duration::hours(policy.action_retention_hours));

        {
            let mut run = self.run.write();
            run.tick_count += 1;
            run.last_tick_at = Some(now);
        }
        if let Err(e) = self.persist() {
            warn!("state persistence failed: {e:#}");
        }

        info!(tick = tick_number, drained, succeeded, "tick complete");
        Ok(())
    }

    /// Eligible agents act with a configured probability rather than
    /// deterministically, so the roster never posts in lockstep. Priority
    /// follows how overdue the agent is.
    fn schedule_due_posts(&self, now: DateTime<Utc>, policy: &OrchestratorPolicy) {
        let agents = self.agents.read();
        let mut queue = self.queue.lock();
        let mut rng = self.rng.lock();

        for id in agents.due_agents(now) {
            let Some(agent) = agents.get(id) else { continue };
            if !rng.gen_bool(policy.act_probability.clamp(0.0, 1.0)) {
                continue;
            }
            let content_type = ContentType::pick(agent.mood, &mut *rng);
            let priority = post_priority(agent.overdue_ratio(now));
            match queue.enqueue(id, ActionKind::GeneratePost { content_type }, priority, now) {
                Ok(_) => debug!(artist = %agent.name, %content_type, priority, "post scheduled"),
                Err(Error::DuplicateAction(_)) => {}
                Err(e) => warn!(artist = %agent.name, "enqueue failed: {e}"),
            }
        }
    }

    /// Keep the graph alive even without direct interactions: pair up
    /// active agents that share a genre or were both recently active.
    fn schedule_relationship_refresh(&self, now: DateTime<Utc>, policy: &OrchestratorPolicy) {
        let window = Duration::hours(policy.comment_window_hours);
        let agents = self.agents.read();
        let active: Vec<&Agent> = agents.all().filter(|a| a.active).collect();
        let mut queue = self.queue.lock();
        let mut scheduled = 0;

        'pairs: for (i, a) in active.iter().enumerate() {
            for b in active.iter().skip(i + 1) {
                if scheduled >= policy.relationship_pairs_per_tick {
                    break 'pairs;
                }
                let co_active = a.last_action_at.is_some_and(|t| now - t < window)
                    && b.last_action_at.is_some_and(|t| now - t < window);
                if !a.shares_genre(b) && !co_active {
                    continue;
                }
                let signal = if a.shares_genre(b) {
                    InteractionSignal::mention()
                } else {
                    InteractionSignal::support()
                };
                let kind = ActionKind::UpdateRelationship {
                    target: b.id,
                    signal,
                };
                if queue.enqueue(a.id, kind, RELATIONSHIP_PRIORITY, now).is_ok() {
                    scheduled += 1;
                }
            }
        }
    }

    fn schedule_comments(&self, now: DateTime<Utc>, policy: &OrchestratorPolicy) {
        let window = Duration::hours(policy.comment_window_hours);
        let posts: Vec<(Uuid, Uuid)> = {
            let feed = self.feed.read();
            feed.recent_posts(now, window)
                .iter()
                .map(|p| (p.id, p.agent_id))
                .collect()
        };
        if posts.is_empty() {
            return;
        }

        let agents = self.agents.read();
        let mut queue = self.queue.lock();
        let mut rng = self.rng.lock();

        for agent in agents.all().filter(|a| a.active) {
            let candidates: Vec<Uuid> = posts
                .iter()
                .filter(|(_, author)| *author != agent.id)
                .map(|(post_id, _)| *post_id)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            if !rng.gen_bool(policy.comment_probability.clamp(0.0, 1.0)) {
                continue;
            }
            let post_id = candidates[rng.gen_range(0..candidates.len())];
            let _ = queue.enqueue(
                agent.id,
                ActionKind::Comment { post_id },
                COMMENT_PRIORITY,
                now,
            );
        }
    }

    /// Execute one drained action. Failures are isolated here: they mark
    /// the action for retry and never propagate out of the tick.
    async fn execute_action(&self, action: PendingAction) -> bool {
        let now = Utc::now();
        let success = match action.kind.clone() {
            ActionKind::GeneratePost { content_type } => {
                self.handle_generate_post(&action, content_type, now).await
            }
            ActionKind::Comment { post_id } => self.handle_comment(&action, post_id, now).await,
            ActionKind::UpdateRelationship { target, signal } => {
                self.graph
                    .write()
                    .upsert_edge(action.agent_id, target, signal, now);
                true
            }
        };

        if success {
            self.queue.lock().mark_completed(action.id);
        } else {
            self.queue.lock().mark_failed(action.id);
        }
        success
    }

    async fn handle_generate_post(
        &self,
        action: &PendingAction,
        content_type: ContentType,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(agent) = self.agents.read().get(action.agent_id).cloned() else {
            warn!(agent_id = %action.agent_id, "post action for unknown agent");
            return false;
        };

        match self
            .timed(self.generator.generate_post(&agent, content_type))
            .await
        {
            Ok(generated) => {
                let post = Post::new(
                    agent.id,
                    content_type,
                    generated.text,
                    generated.hashtags,
                    agent.mood,
                    generated.visual_description,
                    now,
                );
                if content_type == ContentType::MusicSnippet {
                    self.radio.register_track(Track::new(
                        snippet_title(&post.text),
                        agent.id,
                        agent.name.clone(),
                        agent.genres.first().cloned(),
                    ));
                }
                self.feed.write().add_post(post);
                self.after_success(agent.id, now);
                true
            }
            Err(e) => {
                warn!(artist = %agent.name, "post generation failed: {e}");
                false
            }
        }
    }

    async fn handle_comment(
        &self,
        action: &PendingAction,
        post_id: Uuid,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(agent) = self.agents.read().get(action.agent_id).cloned() else {
            return false;
        };
        let Some(post) = self.feed.read().get_post(post_id).cloned() else {
            warn!(%post_id, "comment action for unknown post");
            return false;
        };
        let author_name = self
            .agents
            .read()
            .get(post.agent_id)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "Unknown Artist".to_string());

        match self
            .timed(self.generator.generate_comment(&agent, &post, &author_name))
            .await
        {
            Ok(generated) => {
                let comment = Comment {
                    id: Uuid::new_v4(),
                    post_id,
                    agent_id: agent.id,
                    text: generated.text,
                    created_at: now,
                };
                if let Err(e) = self.feed.write().add_comment(comment) {
                    warn!("comment could not be attached: {e}");
                    return false;
                }
                // Commenting on someone's post warms the edge toward them.
                self.graph.write().upsert_edge(
                    agent.id,
                    post.agent_id,
                    InteractionSignal::support(),
                    now,
                );
                self.after_success(agent.id, now);
                true
            }
            Err(e) => {
                warn!(artist = %agent.name, "comment generation failed: {e}");
                false
            }
        }
    }

    /// Post-success bookkeeping: the cadence clock advances and the mood
    /// drifts. Failed actions reach neither.
    fn after_success(&self, agent_id: Uuid, now: DateTime<Utc>) {
        let mut agents = self.agents.write();
        agents.record_action(agent_id, now);
        let mut rng = self.rng.lock();
        agents.drift_mood(
            agent_id,
            &mut *rng,
            self.config.orchestrator.mood_shift_chance,
            self.config.orchestrator.mood_drift,
        );
    }

    /// Bound an adapter call. A timeout is indistinguishable from any
    /// other generation failure downstream.
    async fn timed<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = StdDuration::from_secs(self.config.orchestrator.generation_timeout_secs);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::GenerationFailed(
                "generation call timed out".to_string(),
            )),
        }
    }

    /// Generate a personality for every agent that lacks one. Returns
    /// (generated, failed).
    pub async fn generate_missing_personalities(&self) -> (usize, usize) {
        let missing: Vec<Agent> = self
            .agents
            .read()
            .all()
            .filter(|a| a.personality.is_none())
            .cloned()
            .collect();

        let mut generated = 0;
        let mut failed = 0;
        for agent in missing {
            match self.timed(self.generator.generate_personality(&agent)).await {
                Ok(personality) => {
                    if let Some(stored) = self.agents.write().get_mut(agent.id) {
                        stored.personality = Some(personality);
                        generated += 1;
                    }
                }
                Err(e) => {
                    warn!(artist = %agent.name, "personality generation failed: {e}");
                    failed += 1;
                }
            }
        }

        if generated > 0 {
            if let Err(e) = self.persist() {
                warn!("state persistence failed: {e:#}");
            }
        }
        (generated, failed)
    }

    pub async fn generate_personality_for(&self, agent_id: Uuid) -> Result<Personality> {
        let agent = self
            .agents
            .read()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("agent {agent_id}")))?;

        let personality = self.timed(self.generator.generate_personality(&agent)).await?;
        if let Some(stored) = self.agents.write().get_mut(agent_id) {
            stored.personality = Some(personality.clone());
        }
        if let Err(e) = self.persist() {
            warn!("state persistence failed: {e:#}");
        }
        Ok(personality)
    }

    /// Manual generation path: produce a post for one agent right now,
    /// outside the tick cycle.
    pub async fn generate_post_now(
        &self,
        agent_id: Uuid,
        content_type: Option<ContentType>,
    ) -> Result<Post> {
        let agent = self
            .agents
            .read()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("agent {agent_id}")))?;

        let content_type = match content_type {
            Some(ct) => ct,
            None => {
                let mut rng = self.rng.lock();
                ContentType::pick(agent.mood, &mut *rng)
            }
        };

        let now = Utc::now();
        let generated = self
            .timed(self.generator.generate_post(&agent, content_type))
            .await?;
        let post = Post::new(
            agent.id,
            content_type,
            generated.text,
            generated.hashtags,
            agent.mood,
            generated.visual_description,
            now,
        );
        if content_type == ContentType::MusicSnippet {
            self.radio.register_track(Track::new(
                snippet_title(&post.text),
                agent.id,
                agent.name.clone(),
                agent.genres.first().cloned(),
            ));
        }
        self.feed.write().add_post(post.clone());
        self.after_success(agent_id, now);
        if let Err(e) = self.persist() {
            warn!("state persistence failed: {e:#}");
        }
        Ok(post)
    }

    pub fn persist(&self) -> anyhow::Result<()> {
        self.agents.read().save(&self.config.agents_file())?;
        self.graph.read().save(&self.config.relationships_file())?;
        self.feed.read().save(&self.config.feed_file())?;
        self.radio.save(&self.config.radio_file())?;
        Ok(())
    }
}

/// More overdue means a smaller number, which drains earlier. The result
/// stays within [1, 10]; comments and relationship refreshes sit above
/// that band so content work always wins a full queue.
fn post_priority(overdue_ratio: f64) -> i32 {
    (10.0 - 2.0 * (overdue_ratio - 1.0)).round().clamp(1.0, 10.0) as i32
}

fn snippet_title(text: &str) -> String {
    let title: Vec<&str> = text.split_whitespace().take(4).collect();
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RadioPolicy;
    use crate::generator::{GeneratedComment, GeneratedPost, TemplateGenerator};
    use async_trait::async_trait;

    fn test_config() -> Config {
        let dir = std::env::temp_dir()
            .join("soundstage-test")
            .join(Uuid::new_v4().to_string());
        let mut config = Config::new(Some(dir)).unwrap();
        config.orchestrator.act_probability = 1.0;
        config.orchestrator.comment_probability = 0.0;
        config.orchestrator.rng_seed = Some(11);
        config.orchestrator.generation_timeout_secs = 5;
        config
    }

    fn orchestrator_with(
        config: Config,
        generator: Arc<dyn ContentGenerator>,
    ) -> Arc<Orchestrator> {
        let radio = Arc::new(Radio::new(RadioPolicy::default()));
        Arc::new(Orchestrator::bootstrap(config, generator, radio).unwrap())
    }

    fn due_agent(store: &mut AgentStore) -> Uuid {
        let mut agent = Agent::new("Vela", vec!["synthwave".to_string()], 60);
        agent.last_action_at = Some(Utc::now() - Duration::hours(2));
        store.insert(agent)
    }

    struct FailingGenerator;

    #[async_trait]
    impl ContentGenerator for FailingGenerator {
        async fn generate_post(
            &self,
            _agent: &Agent,
            _content_type: ContentType,
        ) -> Result<GeneratedPost> {
            Err(Error::GenerationFailed("upstream unavailable".to_string()))
        }

        async fn generate_comment(
            &self,
            _agent: &Agent,
            _post: &Post,
            _author_name: &str,
        ) -> Result<GeneratedComment> {
            Err(Error::GenerationFailed("upstream unavailable".to_string()))
        }

        async fn generate_personality(&self, _agent: &Agent) -> Result<Personality> {
            Err(Error::GenerationFailed("upstream unavailable".to_string()))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl ContentGenerator for SlowGenerator {
        async fn generate_post(
            &self,
            agent: &Agent,
            content_type: ContentType,
        ) -> Result<GeneratedPost> {
            tokio::time::sleep(StdDuration::from_millis(200)).await;
            TemplateGenerator.generate_post(agent, content_type).await
        }

        async fn generate_comment(
            &self,
            agent: &Agent,
            post: &Post,
            author_name: &str,
        ) -> Result<GeneratedComment> {
            TemplateGenerator.generate_comment(agent, post, author_name).await
        }

        async fn generate_personality(&self, agent: &Agent) -> Result<Personality> {
            TemplateGenerator.generate_personality(agent).await
        }
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let orchestrator = orchestrator_with(test_config(), Arc::new(TemplateGenerator));

        let state = orchestrator.start(60_000).unwrap();
        assert!(state.is_running);
        assert_eq!(state.tick_count, 0);

        assert!(matches!(
            orchestrator.start(60_000),
            Err(Error::AlreadyRunning)
        ));

        let state = orchestrator.stop();
        assert!(!state.is_running);

        // stopping again is a quiet success
        let state = orchestrator.stop();
        assert!(!state.is_running);

        // and the cycle can begin again
        orchestrator.start(60_000).unwrap();
        orchestrator.stop();
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let orchestrator = orchestrator_with(test_config(), Arc::new(TemplateGenerator));
        assert!(matches!(
            orchestrator.start(0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(!orchestrator.status().is_running);
    }

    #[tokio::test]
    async fn successful_tick_publishes_a_post() {
        let orchestrator = orchestrator_with(test_config(), Arc::new(TemplateGenerator));
        let agent_id = due_agent(&mut orchestrator.agents.write());

        let before = Utc::now();
        orchestrator.tick().await.unwrap();

        let status = orchestrator.status();
        assert_eq!(status.tick_count, 1);
        assert!(status.last_tick_at.is_some());

        assert_eq!(orchestrator.feed.read().post_count(), 1);
        let last_action = orchestrator
            .agents
            .read()
            .get(agent_id)
            .unwrap()
            .last_action_at
            .unwrap();
        assert!(last_action >= before);
    }

    #[tokio::test]
    async fn overlapping_ticks_coalesce() {
        let orchestrator = orchestrator_with(test_config(), Arc::new(SlowGenerator));
        due_agent(&mut orchestrator.agents.write());

        let (a, b) = tokio::join!(orchestrator.tick(), orchestrator.tick());
        a.unwrap();
        b.unwrap();

        // exactly one tick body ran; the other coalesced
        assert_eq!(orchestrator.status().tick_count, 1);
        assert_eq!(orchestrator.feed.read().post_count(), 1);
    }

    #[tokio::test]
    async fn failed_generation_retries_then_fails_permanently() {
        let mut config = test_config();
        config.orchestrator.max_attempts = 3;
        let orchestrator = orchestrator_with(config, Arc::new(FailingGenerator));
        let agent_id = due_agent(&mut orchestrator.agents.write());

        for _ in 0..3 {
            orchestrator.tick().await.unwrap();
        }

        let recent = orchestrator.recent_actions(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].attempts, 3);
        assert_eq!(
            recent[0].status,
            crate::queue::ActionStatus::Failed
        );

        // no post was created and the cadence clock never moved
        assert_eq!(orchestrator.feed.read().post_count(), 0);
        let agent = orchestrator.agents.read().get(agent_id).cloned().unwrap();
        assert!(Utc::now() - agent.last_action_at.unwrap() > Duration::hours(1));

        // terminal actions are not resurrected by later ticks
        orchestrator.tick().await.unwrap();
        let recent = orchestrator.recent_actions(10);
        let failed: Vec<_> = recent
            .iter()
            .filter(|a| a.status == crate::queue::ActionStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_generation_times_out_and_fails_the_action() {
        struct HangingGenerator;

        #[async_trait]
        impl ContentGenerator for HangingGenerator {
            async fn generate_post(
                &self,
                _agent: &Agent,
                _content_type: ContentType,
            ) -> Result<GeneratedPost> {
                tokio::time::sleep(StdDuration::from_secs(3600)).await;
                unreachable!("sleep above outlives every timeout")
            }

            async fn generate_comment(
                &self,
                _agent: &Agent,
                _post: &Post,
                _author_name: &str,
            ) -> Result<GeneratedComment> {
                Err(Error::GenerationFailed("unused".to_string()))
            }

            async fn generate_personality(&self, _agent: &Agent) -> Result<Personality> {
                Err(Error::GenerationFailed("unused".to_string()))
            }
        }

        let mut config = test_config();
        config.orchestrator.generation_timeout_secs = 1;
        let orchestrator = orchestrator_with(config, Arc::new(HangingGenerator));
        due_agent(&mut orchestrator.agents.write());

        orchestrator.tick().await.unwrap();

        // the hung call was abandoned at the timeout, not awaited forever
        assert_eq!(orchestrator.status().tick_count, 1);
        assert_eq!(orchestrator.feed.read().post_count(), 0);
        let recent = orchestrator.recent_actions(1);
        assert_eq!(recent[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_drives_ticks_until_stopped() {
        let orchestrator = orchestrator_with(test_config(), Arc::new(TemplateGenerator));
        due_agent(&mut orchestrator.agents.write());

        orchestrator.start(100).unwrap();
        assert_eq!(orchestrator.status().tick_count, 0);

        tokio::time::sleep(StdDuration::from_millis(350)).await;
        let ticked = orchestrator.status().tick_count;
        assert!(ticked >= 1);

        orchestrator.stop();
        tokio::time::sleep(StdDuration::from_millis(500)).await;
        assert_eq!(orchestrator.status().tick_count, ticked);
    }

    #[tokio::test]
    async fn music_snippet_posts_feed_the_radio() {
        let orchestrator = orchestrator_with(test_config(), Arc::new(TemplateGenerator));
        let agent_id = {
            let mut agents = orchestrator.agents.write();
            agents.insert(Agent::new("Vela", vec!["synthwave".to_string()], 60))
        };

        orchestrator
            .generate_post_now(agent_id, Some(ContentType::MusicSnippet))
            .await
            .unwrap();

        assert_eq!(orchestrator.radio.status().catalog_size, 1);
    }

    #[tokio::test]
    async fn personality_backfill_covers_missing_agents() {
        let orchestrator = orchestrator_with(test_config(), Arc::new(TemplateGenerator));
        {
            let mut agents = orchestrator.agents.write();
            agents.insert(Agent::new("Vela", vec!["synthwave".to_string()], 60));
            agents.insert(Agent::new("Nova", vec!["techno".to_string()], 60));
        }

        let (generated, failed) = orchestrator.generate_missing_personalities().await;
        assert_eq!((generated, failed), (2, 0));

        // a second run finds nothing left to do
        let (generated, _) = orchestrator.generate_missing_personalities().await;
        assert_eq!(generated, 0);
    }

    #[tokio::test]
    async fn unknown_agent_is_not_found() {
        let orchestrator = orchestrator_with(test_config(), Arc::new(TemplateGenerator));
        let result = orchestrator.generate_post_now(Uuid::new_v4(), None).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn relationship_refresh_connects_genre_mates() {
        let mut config = test_config();
        config.orchestrator.relationship_tick_every = 1;
        config.orchestrator.act_probability = 0.0;
        let orchestrator = orchestrator_with(config, Arc::new(TemplateGenerator));

        let (a, b) = {
            let mut agents = orchestrator.agents.write();
            let a = agents.insert(Agent::new("Vela", vec!["synthwave".to_string()], 60));
            let b = agents.insert(Agent::new("Nova", vec!["synthwave".to_string()], 60));
            (a, b)
        };

        orchestrator.tick().await.unwrap();

        let graph = orchestrator.graph.read();
        assert!(graph.edge(a, b).is_some() || graph.edge(b, a).is_some());
    }

    #[test]
    fn priority_tracks_overdueness() {
        assert_eq!(post_priority(1.0), 10);
        assert!(post_priority(3.0) < post_priority(1.5));
        assert_eq!(post_priority(100.0), 1);
    }

    #[test]
    fn snippet_titles_are_short() {
        assert_eq!(snippet_title("one two three four five six"), "one two three four");
        assert_eq!(snippet_title(""), "Untitled");
    }
}
