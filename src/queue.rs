use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::feed::ContentType;
use crate::relationship::InteractionSignal;

/// What a pending action will do when drained. Each variant carries its
/// own payload, validated at enqueue time rather than at execution time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ActionKind {
    GeneratePost { content_type: ContentType },
    Comment { post_id: Uuid },
    UpdateRelationship { target: Uuid, signal: InteractionSignal },
}

impl ActionKind {
    /// Stable name used for dedup and for the status view.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::GeneratePost { .. } => "generate_post",
            ActionKind::Comment { .. } => "comment",
            ActionKind::UpdateRelationship { .. } => "update_relationship",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Processing => write!(f, "processing"),
            ActionStatus::Completed => write!(f, "completed"),
            ActionStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: Uuid,
    pub agent_id: Uuid,
    #[serde(flatten)]
    pub kind: ActionKind,
    /// Lower value means more urgent.
    pub priority: i32,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    seq: u64,
}

/// Priority queue of scheduled agent work. Drains in deterministic order
/// (priority ascending, arrival order as tie-break), dedups per agent and
/// action kind, and retries failures up to a fixed attempt cap. Terminal
/// actions stay visible for the status view until the retention sweep.
#[derive(Debug)]
pub struct ActionQueue {
    actions: Vec<PendingAction>,
    next_seq: u64,
    max_attempts: u32,
}

impl ActionQueue {
    pub fn new(max_attempts: u32) -> Self {
        ActionQueue {
            actions: Vec::new(),
            next_seq: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Schedule an action. Rejects a second action of the same kind for
    /// the same agent while one is still pending or processing, so one
    /// cooldown window never produces duplicate work.
    pub fn enqueue(
        &mut self,
        agent_id: Uuid,
        kind: ActionKind,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let duplicate = self.actions.iter().any(|a| {
            a.agent_id == agent_id
                && a.kind.name() == kind.name()
                && matches!(a.status, ActionStatus::Pending | ActionStatus::Processing)
        });
        if duplicate {
            return Err(Error::DuplicateAction(format!(
                "{} already scheduled for agent {agent_id}",
                kind.name()
            )));
        }

        let id = Uuid::new_v4();
        self.actions.push(PendingAction {
            id,
            agent_id,
            kind,
            priority,
            status: ActionStatus::Pending,
            created_at: now,
            attempts: 0,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        Ok(id)
    }

    /// Atomically take up to `n` pending actions in priority order and
    /// mark them processing. An action handed out here is never handed
    /// out again until a failure returns it to pending.
    pub fn drain_up_to(&mut self, n: usize) -> Vec<PendingAction> {
        let mut pending: Vec<usize> = self
            .actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.status == ActionStatus::Pending)
            .map(|(i, _)| i)
            .collect();
        pending.sort_by_key(|&i| (self.actions[i].priority, self.actions[i].seq));
        pending.truncate(n);

        pending
            .into_iter()
            .map(|i| {
                self.actions[i].status = ActionStatus::Processing;
                self.actions[i].clone()
            })
            .collect()
    }

    pub fn mark_completed(&mut self, id: Uuid) {
        if let Some(action) = self.actions.iter_mut().find(|a| a.id == id) {
            action.status = ActionStatus::Completed;
        }
    }

    /// Record a failed attempt. The action goes back to pending while
    /// attempts remain under the cap, then fails permanently. Terminal
    /// actions are never resurrected.
    pub fn mark_failed(&mut self, id: Uuid) {
        if let Some(action) = self.actions.iter_mut().find(|a| a.id == id) {
            if matches!(action.status, ActionStatus::Completed | ActionStatus::Failed) {
                return;
            }
            action.attempts += 1;
            action.status = if action.attempts >= self.max_attempts {
                ActionStatus::Failed
            } else {
                ActionStatus::Pending
            };
        }
    }

    pub fn pending_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.status == ActionStatus::Pending)
            .count()
    }

    /// Most recently scheduled actions, any status. Failed actions stay
    /// visible here rather than disappearing.
    pub fn recent(&self, n: usize) -> Vec<PendingAction> {
        let mut all: Vec<&PendingAction> = self.actions.iter().collect();
        all.sort_by_key(|a| std::cmp::Reverse(a.seq));
        all.into_iter().take(n).cloned().collect()
    }

    /// Drop terminal actions older than the retention window.
    pub fn sweep(&mut self, now: DateTime<Utc>, retention: Duration) {
        let cutoff = now - retention;
        self.actions.retain(|a| {
            !(matches!(a.status, ActionStatus::Completed | ActionStatus::Failed)
                && a.created_at < cutoff)
        });
    }

    pub fn get(&self, id: Uuid) -> Option<&PendingAction> {
        self.actions.iter().find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_kind() -> ActionKind {
        ActionKind::GeneratePost {
            content_type: ContentType::Thought,
        }
    }

    #[test]
    fn drains_by_priority_then_arrival() {
        let mut q = ActionQueue::new(3);
        let now = Utc::now();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let low = q.enqueue(a, post_kind(), 20, now).unwrap();
        let urgent = q.enqueue(b, post_kind(), 1, now).unwrap();
        let mid = q.enqueue(c, post_kind(), 5, now).unwrap();

        let drained = q.drain_up_to(10);
        let ids: Vec<Uuid> = drained.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![urgent, mid, low]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut q = ActionQueue::new(3);
        let now = Utc::now();
        let first = q.enqueue(Uuid::new_v4(), post_kind(), 5, now).unwrap();
        let second = q.enqueue(Uuid::new_v4(), post_kind(), 5, now).unwrap();

        let drained = q.drain_up_to(2);
        assert_eq!(drained[0].id, first);
        assert_eq!(drained[1].id, second);
    }

    #[test]
    fn duplicate_agent_action_is_rejected() {
        let mut q = ActionQueue::new(3);
        let now = Utc::now();
        let agent = Uuid::new_v4();

        q.enqueue(agent, post_kind(), 5, now).unwrap();
        let dup = q.enqueue(agent, post_kind(), 5, now);
        assert!(matches!(dup, Err(Error::DuplicateAction(_))));

        // a different kind for the same agent is fine
        q.enqueue(
            agent,
            ActionKind::Comment {
                post_id: Uuid::new_v4(),
            },
            5,
            now,
        )
        .unwrap();
    }

    #[test]
    fn drained_actions_are_not_handed_out_twice() {
        let mut q = ActionQueue::new(3);
        let now = Utc::now();
        q.enqueue(Uuid::new_v4(), post_kind(), 5, now).unwrap();

        let first = q.drain_up_to(10);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, ActionStatus::Processing);
        assert!(q.drain_up_to(10).is_empty());
    }

    #[test]
    fn dedup_covers_processing_actions() {
        let mut q = ActionQueue::new(3);
        let now = Utc::now();
        let agent = Uuid::new_v4();
        q.enqueue(agent, post_kind(), 5, now).unwrap();
        q.drain_up_to(1);

        assert!(q.enqueue(agent, post_kind(), 5, now).is_err());
    }

    #[test]
    fn failure_retries_until_cap_then_terminal() {
        let mut q = ActionQueue::new(3);
        let now = Utc::now();
        let id = q.enqueue(Uuid::new_v4(), post_kind(), 5, now).unwrap();

        for attempt in 1..=2 {
            q.drain_up_to(1);
            q.mark_failed(id);
            let action = q.get(id).unwrap();
            assert_eq!(action.status, ActionStatus::Pending);
            assert_eq!(action.attempts, attempt);
        }

        q.drain_up_to(1);
        q.mark_failed(id);
        let action = q.get(id).unwrap();
        assert_eq!(action.status, ActionStatus::Failed);

        // terminal: never drained again, never resurrected
        assert!(q.drain_up_to(10).is_empty());
        q.mark_failed(id);
        assert_eq!(q.get(id).unwrap().attempts, 3);
    }

    #[test]
    fn completed_actions_leave_the_drain_pool() {
        let mut q = ActionQueue::new(3);
        let now = Utc::now();
        let id = q.enqueue(Uuid::new_v4(), post_kind(), 5, now).unwrap();

        q.drain_up_to(1);
        q.mark_completed(id);
        assert_eq!(q.pending_count(), 0);
        assert!(q.drain_up_to(10).is_empty());

        // the agent is free to schedule the same kind again
        let agent = q.get(id).unwrap().agent_id;
        q.enqueue(agent, post_kind(), 5, now).unwrap();
    }

    #[test]
    fn sweep_drops_old_terminal_actions_only() {
        let mut q = ActionQueue::new(3);
        let old = Utc::now() - Duration::days(10);
        let done = q.enqueue(Uuid::new_v4(), post_kind(), 5, old).unwrap();
        let waiting = q.enqueue(Uuid::new_v4(), post_kind(), 5, old).unwrap();

        q.drain_up_to(1);
        q.mark_completed(done);

        q.sweep(Utc::now(), Duration::days(7));
        assert!(q.get(done).is_none());
        assert!(q.get(waiting).is_some());
    }

    #[test]
    fn recent_shows_failed_actions() {
        let mut q = ActionQueue::new(1);
        let now = Utc::now();
        let id = q.enqueue(Uuid::new_v4(), post_kind(), 5, now).unwrap();
        q.drain_up_to(1);
        q.mark_failed(id);

        let recent = q.recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].status, ActionStatus::Failed);
    }
}
