//! Per-user conversation history with batch truncation.

use crate::config::ConversationConfig;
use crate::core::turn::{ConversationHistory, ConversationStore, ConversationTurn};
use std::collections::HashMap;

pub const MAX_TURNS: usize = 20;
pub const RETAIN_TURNS: usize = 10;

/// Once a history grows past `max_turns` it drops to its last `retain_turns`
/// turns in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationPolicy {
    max_turns: usize,
    retain_turns: usize,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self {
            max_turns: MAX_TURNS,
            retain_turns: RETAIN_TURNS,
        }
    }
}

impl TruncationPolicy {
    /// `retain_turns` is clamped to `1..=max_turns`.
    pub fn new(max_turns: usize, retain_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            max_turns,
            retain_turns: retain_turns.clamp(1, max_turns),
        }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(config.max_turns, config.retain_turns)
    }

    /// Returns true if the history was truncated.
    pub fn apply(&self, history: &mut ConversationHistory) -> bool {
        if history.len() <= self.max_turns {
            return false;
        }
        let excess = history.len() - self.retain_turns;
        history.drain(..excess);
        true
    }
}

/// What `discard_pending_turn` undid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    /// There was no unanswered user turn.
    Nothing,
    /// The turn only ever lived in memory.
    Unflushed,
    /// A flush wrote the turn out before it was undone, so the snapshot is
    /// stale until the next flush.
    Flushed,
}

#[derive(Debug)]
struct Checkpoint {
    /// `None` means the user had no history yet.
    history: Option<ConversationHistory>,
    flushed: bool,
}

/// Owns the in-memory store. Every mutation goes through here so the
/// truncation policy holds after each append.
#[derive(Debug, Default)]
pub struct HistoryManager {
    store: ConversationStore,
    policy: TruncationPolicy,
    /// History as it was before the latest unanswered user turn.
    checkpoints: HashMap<String, Checkpoint>,
}

impl HistoryManager {
    pub fn new(store: ConversationStore, policy: TruncationPolicy) -> Self {
        Self {
            store,
            policy,
            checkpoints: HashMap::new(),
        }
    }

    pub fn append_user_turn(&mut self, user_id: &str, text: impl Into<String>) {
        let checkpoint = Checkpoint {
            history: self.store.get(user_id).cloned(),
            flushed: false,
        };
        self.checkpoints.insert(user_id.to_string(), checkpoint);
        self.push(user_id, ConversationTurn::user(text));
    }

    pub fn append_assistant_turn(&mut self, user_id: &str, text: impl Into<String>) {
        if !self.store.contains_key(user_id) {
            tracing::warn!(
                "Assistant turn for '{}' without a preceding user turn",
                user_id
            );
        }
        self.checkpoints.remove(user_id);
        self.push(user_id, ConversationTurn::assistant(text));
    }

    /// Restore the user's history to its state before the last unanswered
    /// user turn.
    pub fn discard_pending_turn(&mut self, user_id: &str) -> Rollback {
        let Some(checkpoint) = self.checkpoints.remove(user_id) else {
            return Rollback::Nothing;
        };
        match checkpoint.history {
            Some(history) => {
                self.store.insert(user_id.to_string(), history);
            }
            None => {
                self.store.remove(user_id);
            }
        }
        if checkpoint.flushed {
            Rollback::Flushed
        } else {
            Rollback::Unflushed
        }
    }

    /// Record that the current store reached the snapshot, pending user
    /// turns included.
    pub fn mark_flushed(&mut self) {
        for checkpoint in self.checkpoints.values_mut() {
            checkpoint.flushed = true;
        }
    }

    /// Current bounded history for the user; empty if unknown.
    pub fn get_context(&self, user_id: &str) -> ConversationHistory {
        self.store.get(user_id).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> &ConversationStore {
        &self.store
    }

    pub fn users(&self) -> Vec<String> {
        self.store.keys().cloned().collect()
    }

    fn push(&mut self, user_id: &str, turn: ConversationTurn) {
        let history = self.store.entry(user_id.to_string()).or_default();
        history.push(turn);
        if self.policy.apply(history) {
            tracing::debug!(
                "Truncated history for '{}' to {} turns",
                user_id,
                history.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::turn::Role;

    fn numbered(count: usize) -> ConversationHistory {
        (1..=count)
            .map(|i| {
                if i % 2 == 1 {
                    ConversationTurn::user(format!("turn {}", i))
                } else {
                    ConversationTurn::assistant(format!("turn {}", i))
                }
            })
            .collect()
    }

    fn contents(history: &[ConversationTurn]) -> Vec<String> {
        history.iter().map(|t| t.content.clone()).collect()
    }

    #[test]
    fn test_first_message_creates_history() {
        let mut manager = HistoryManager::default();
        manager.append_user_turn("u1", "hello");

        assert_eq!(manager.get_context("u1"), vec![ConversationTurn::user("hello")]);
        assert_eq!(manager.users(), vec!["u1".to_string()]);
    }

    #[test]
    fn test_unknown_user_has_empty_context() {
        let manager = HistoryManager::default();
        assert!(manager.get_context("nobody").is_empty());
        assert!(manager.snapshot().is_empty());
    }

    #[test]
    fn test_exchange_is_recorded_in_order() {
        let mut manager = HistoryManager::default();
        manager.append_user_turn("u1", "hello");
        manager.append_assistant_turn("u1", "hi there");

        assert_eq!(
            manager.get_context("u1"),
            vec![
                ConversationTurn::user("hello"),
                ConversationTurn::assistant("hi there"),
            ]
        );
    }

    #[test]
    fn test_twenty_turns_are_not_truncated() {
        let mut store = ConversationStore::new();
        store.insert("u2".to_string(), numbered(19));
        let mut manager = HistoryManager::new(store, TruncationPolicy::default());

        manager.append_assistant_turn("u2", "turn 20");
        assert_eq!(manager.get_context("u2").len(), 20);
    }

    #[test]
    fn test_twenty_first_turn_drops_to_last_ten() {
        let mut store = ConversationStore::new();
        store.insert("u2".to_string(), numbered(20));
        let mut manager = HistoryManager::new(store, TruncationPolicy::default());

        manager.append_user_turn("u2", "turn 21");

        let context = manager.get_context("u2");
        assert_eq!(context.len(), 10);
        let expected: Vec<String> = (12..=21).map(|i| format!("turn {}", i)).collect();
        assert_eq!(contents(&context), expected);
        assert_eq!(context.last().map(|t| t.role), Some(Role::User));
    }

    #[test]
    fn test_assistant_append_also_truncates() {
        let mut store = ConversationStore::new();
        store.insert("u2".to_string(), numbered(20));
        let mut manager = HistoryManager::new(store, TruncationPolicy::default());

        manager.append_assistant_turn("u2", "late reply");

        let context = manager.get_context("u2");
        assert_eq!(context.len(), 10);
        assert_eq!(context.last().unwrap().content, "late reply");
    }

    #[test]
    fn test_length_never_exceeds_max_turns() {
        let mut manager = HistoryManager::default();
        let mut lengths = Vec::new();
        for i in 0..50 {
            manager.append_user_turn("u1", format!("q{}", i));
            lengths.push(manager.get_context("u1").len());
            manager.append_assistant_turn("u1", format!("a{}", i));
            lengths.push(manager.get_context("u1").len());
        }

        assert!(lengths.iter().all(|&len| len <= MAX_TURNS));
        // Grows one at a time, then jumps back to RETAIN_TURNS.
        assert_eq!(&lengths[..21], &(1..=20).chain([10]).collect::<Vec<usize>>()[..]);
        let context = manager.get_context("u1");
        assert_eq!(context.last().unwrap().content, "a49");
    }

    #[test]
    fn test_get_context_has_no_side_effects() {
        let mut store = ConversationStore::new();
        store.insert("u1".to_string(), numbered(25));
        let manager = HistoryManager::new(store, TruncationPolicy::default());

        // Loaded histories are only truncated on the next append.
        assert_eq!(manager.get_context("u1").len(), 25);
        assert_eq!(manager.get_context("u1").len(), 25);
    }

    #[test]
    fn test_users_do_not_share_history() {
        let mut manager = HistoryManager::default();
        manager.append_user_turn("a", "from a");
        manager.append_user_turn("b", "from b");

        assert_eq!(contents(&manager.get_context("a")), vec!["from a"]);
        assert_eq!(contents(&manager.get_context("b")), vec!["from b"]);
    }

    #[test]
    fn test_discard_restores_previous_history() {
        let mut store = ConversationStore::new();
        store.insert("u3".to_string(), numbered(20));
        let mut manager = HistoryManager::new(store.clone(), TruncationPolicy::default());

        // Even a truncating append is undone.
        manager.append_user_turn("u3", "turn 21");
        assert_eq!(manager.get_context("u3").len(), 10);

        assert_eq!(manager.discard_pending_turn("u3"), Rollback::Unflushed);
        assert_eq!(manager.snapshot(), &store);
        assert_eq!(manager.discard_pending_turn("u3"), Rollback::Nothing);
    }

    #[test]
    fn test_discard_of_first_message_removes_user() {
        let mut manager = HistoryManager::default();
        manager.append_user_turn("new", "hello");

        assert_eq!(manager.discard_pending_turn("new"), Rollback::Unflushed);
        assert!(manager.snapshot().is_empty());
    }

    #[test]
    fn test_assistant_turn_commits_pending_user_turn() {
        let mut manager = HistoryManager::default();
        manager.append_user_turn("u1", "hello");
        manager.append_assistant_turn("u1", "hi there");

        assert_eq!(manager.discard_pending_turn("u1"), Rollback::Nothing);
        assert_eq!(manager.get_context("u1").len(), 2);
    }

    #[test]
    fn test_discard_after_flush_reports_stale_snapshot() {
        let mut manager = HistoryManager::default();
        manager.append_user_turn("u1", "hello");
        manager.append_assistant_turn("u1", "hi");
        manager.mark_flushed();

        manager.append_user_turn("u1", "slow one");
        manager.append_user_turn("u2", "fresh");
        manager.mark_flushed();

        assert_eq!(manager.discard_pending_turn("u1"), Rollback::Flushed);
        assert_eq!(manager.get_context("u1").len(), 2);

        // A checkpoint taken after the flush starts out clean.
        manager.append_user_turn("u1", "retry");
        assert_eq!(manager.discard_pending_turn("u1"), Rollback::Unflushed);
    }

    #[test]
    fn test_policy_clamps_retain_turns() {
        let policy = TruncationPolicy::new(4, 9);

        let mut history = numbered(5);
        assert!(policy.apply(&mut history));
        assert_eq!(contents(&history), vec!["turn 2", "turn 3", "turn 4", "turn 5"]);
    }
}
