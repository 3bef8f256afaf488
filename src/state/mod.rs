//! Run state and checkpointing
//!
//! A `RunState` is created per `run_agent` call and never mutated in place:
//! every node returns the next state. Finished states are kept in a
//! `Checkpointer` keyed by thread id so a run can be inspected afterwards;
//! the in-memory store only keeps the most recent runs.

use crate::config::DEFAULT_CHECKPOINT_CAPACITY;
use crate::conversation::{Conversation, Message};
use crate::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Conversation plus the number of node executions so far
#[derive(Debug, Clone)]
pub struct RunState {
    pub thread_id: Uuid,
    pub conversation: Conversation,
    pub steps: usize,
}

impl RunState {
    pub fn new(thread_id: Uuid, question: impl Into<String>) -> Self {
        Self {
            thread_id,
            conversation: Conversation::from_question(question),
            steps: 0,
        }
    }

    /// State after one node ran and appended `messages`
    pub fn advance(&self, messages: Vec<Message>) -> Self {
        Self {
            thread_id: self.thread_id,
            conversation: self.conversation.with(messages),
            steps: self.steps + 1,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.conversation.last()
    }
}

/// Trait for run-state persistence
#[async_trait::async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, state: &RunState) -> Result<()>;
    async fn load(&self, thread_id: Uuid) -> Result<Option<RunState>>;
}

struct Checkpoints {
    states: HashMap<Uuid, RunState>,
    // oldest first
    order: VecDeque<Uuid>,
}

/// In-memory checkpointer holding the most recent `capacity` runs
pub struct InMemoryCheckpointer {
    inner: Arc<RwLock<Checkpoints>>,
    capacity: usize,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHECKPOINT_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Checkpoints {
                states: HashMap::new(),
                order: VecDeque::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.states.len()
    }
}

impl Default for InMemoryCheckpointer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, state: &RunState) -> Result<()> {
        let mut inner = self.inner.write().await;

        if inner.states.insert(state.thread_id, state.clone()).is_none() {
            inner.order.push_back(state.thread_id);
        }

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.states.remove(&evicted);
                debug!(thread_id = %evicted, "Evicted checkpoint");
            }
        }
        Ok(())
    }

    async fn load(&self, thread_id: Uuid) -> Result<Option<RunState>> {
        let inner = self.inner.read().await;
        Ok(inner.states.get(&thread_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_leaves_previous_state_untouched() {
        let start = RunState::new(Uuid::new_v4(), "논현역 맛집 추천해줘");
        let next = start.advance(vec![Message::assistant("Answer: 추천 결과")]);

        assert_eq!(start.steps, 0);
        assert_eq!(start.conversation.len(), 1);
        assert_eq!(next.steps, 1);
        assert_eq!(next.conversation.len(), 2);
        assert_eq!(next.thread_id, start.thread_id);
    }

    #[tokio::test]
    async fn test_checkpointer_roundtrip() {
        let store = InMemoryCheckpointer::new();
        let state = RunState::new(Uuid::new_v4(), "q").advance(vec![]);

        store.save(&state).await.unwrap();
        let loaded = store.load(state.thread_id).await.unwrap().unwrap();

        assert_eq!(loaded.steps, 1);
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_checkpointer_evicts_oldest_runs() {
        let store = InMemoryCheckpointer::with_capacity(3);
        let states: Vec<RunState> = (0..5)
            .map(|_| RunState::new(Uuid::new_v4(), "q"))
            .collect();

        for state in &states {
            store.save(state).await.unwrap();
        }
        assert_eq!(store.len().await, 3);
        assert!(store.load(states[0].thread_id).await.unwrap().is_none());
        assert!(store.load(states[1].thread_id).await.unwrap().is_none());
        assert!(store.load(states[4].thread_id).await.unwrap().is_some());

        // saving an existing thread again replaces it in place
        store.save(&states[4].advance(vec![])).await.unwrap();
        assert_eq!(store.len().await, 3);
        assert_eq!(store.load(states[4].thread_id).await.unwrap().unwrap().steps, 1);
        assert!(store.load(states[2].thread_id).await.unwrap().is_some());
    }
}
