//! Conversation keys and the size-bounded session store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;

/// Where a message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatScope {
    /// A shared room; on Discord, a guild text channel
    Group { group_id: u64 },
    /// A direct message with the bot
    Private,
}

/// Identifier of an isolated dialogue context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Builds the key for a message from `user_id` in `scope`.
    ///
    /// Formats: `group_{group}_{user}` (isolated), `group_{group}` (shared),
    /// `private_{user}`.
    pub fn for_message(scope: ChatScope, user_id: u64, isolated: bool) -> Self {
        let key = match scope {
            ChatScope::Group { group_id } if isolated => format!("group_{group_id}_{user_id}"),
            ChatScope::Group { group_id } => format!("group_{group_id}"),
            ChatScope::Private => format!("private_{user_id}"),
        };
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true for keys built under the isolation setting that was active
/// before it changed to `now_isolated`.
///
/// From a group, enabling isolation drops the shared `group_{G}` key and
/// disabling it drops every per-user `group_{G}_*` key. From a DM every
/// private key is dropped.
pub fn stale_after_isolation_change(key: &str, scope: ChatScope, now_isolated: bool) -> bool {
    match scope {
        ChatScope::Group { group_id } => {
            let shared = format!("group_{group_id}");
            if now_isolated {
                key == shared
            } else {
                key.strip_prefix(&shared)
                    .is_some_and(|rest| rest.starts_with('_'))
            }
        }
        ChatScope::Private => key.starts_with("private_"),
    }
}

struct Entry<S> {
    last_accessed: u64,
    state: Arc<Mutex<S>>,
}

/// Maps conversation keys to per-conversation state, evicting the least
/// recently accessed sessions once `max_sessions` is reached.
///
/// Each state sits behind its own async mutex so turns for one conversation
/// are serialized while different conversations proceed concurrently.
pub struct SessionStore<S> {
    sessions: HashMap<ConversationKey, Entry<S>>,
    max_sessions: usize,
    clock: u64,
}

impl<S> SessionStore<S> {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions: max_sessions.max(1),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Returns the session for `key`, creating it with `init` if missing.
    ///
    /// Always refreshes the access stamp. Creating a session runs a cleanup
    /// pass; the new session carries the newest stamp so it is never the one
    /// evicted.
    pub fn get_or_create(
        &mut self,
        key: &ConversationKey,
        init: impl FnOnce() -> S,
    ) -> Arc<Mutex<S>> {
        let now = self.tick();
        if let Some(entry) = self.sessions.get_mut(key) {
            entry.last_accessed = now;
            return Arc::clone(&entry.state);
        }

        debug!("Creating session {key}");
        let state = Arc::new(Mutex::new(init()));
        self.sessions.insert(
            key.clone(),
            Entry {
                last_accessed: now,
                state: Arc::clone(&state),
            },
        );
        self.cleanup();
        state
    }

    /// Evicts the oldest sessions until the store is back within `max_sessions`.
    pub fn cleanup(&mut self) {
        if self.sessions.len() <= self.max_sessions {
            return;
        }

        let mut by_age: Vec<(u64, ConversationKey)> = self
            .sessions
            .iter()
            .map(|(key, entry)| (entry.last_accessed, key.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(stamp, _)| *stamp);

        let excess = self.sessions.len() - self.max_sessions;
        for (_, key) in by_age.into_iter().take(excess) {
            debug!("Evicting session {key}");
            self.sessions.remove(&key);
        }
    }

    /// Removes every session whose key matches `predicate`, returning how many were removed.
    pub fn clear(&mut self, mut predicate: impl FnMut(&str) -> bool) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|key, _| !predicate(key.as_str()));
        before - self.sessions.len()
    }

    pub fn clear_all(&mut self) -> usize {
        let removed = self.sessions.len();
        self.sessions.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sessions.keys().any(|k| k.as_str() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<S>(store: &SessionStore<S>) -> Vec<String> {
        store.sessions.keys().map(|k| k.as_str().to_string()).collect()
    }

    fn private(user_id: u64) -> ConversationKey {
        ConversationKey::for_message(ChatScope::Private, user_id, false)
    }

    fn group(group_id: u64, user_id: u64, isolated: bool) -> ConversationKey {
        ConversationKey::for_message(ChatScope::Group { group_id }, user_id, isolated)
    }

    #[test]
    fn key_formats() {
        assert_eq!(group(10, 7, true).as_str(), "group_10_7");
        assert_eq!(group(10, 7, false).as_str(), "group_10");
        assert_eq!(private(7).as_str(), "private_7");
        assert_eq!(
            ConversationKey::for_message(ChatScope::Private, 7, true).as_str(),
            "private_7"
        );
    }

    #[test]
    fn get_or_create_reuses_existing_state() {
        let mut store = SessionStore::new(4);
        let first = store.get_or_create(&private(1), || 1_u32);
        let second = store.get_or_create(&private(1), || 2_u32);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn least_recently_accessed_is_evicted() {
        let mut store = SessionStore::new(2);
        store.get_or_create(&private(1), || ());
        store.get_or_create(&private(2), || ());
        store.get_or_create(&private(3), || ());

        let mut keys = keys(&store);
        keys.sort();
        assert_eq!(keys, vec!["private_2", "private_3"]);
    }

    #[test]
    fn access_refreshes_recency() {
        let mut store = SessionStore::new(2);
        store.get_or_create(&private(1), || ());
        store.get_or_create(&private(2), || ());
        store.get_or_create(&private(1), || ());
        store.get_or_create(&private(3), || ());

        assert!(store.contains("private_1"));
        assert!(!store.contains("private_2"));
        assert!(store.contains("private_3"));
    }

    #[test]
    fn size_never_exceeds_maximum() {
        let mut store = SessionStore::new(3);
        for user in 0..20 {
            store.get_or_create(&private(user % 7), || ());
            assert!(store.len() <= 3);
        }
    }

    #[test]
    fn creation_never_evicts_the_new_session() {
        let mut store = SessionStore::new(1);
        store.get_or_create(&private(1), || ());
        store.get_or_create(&private(2), || ());
        assert_eq!(keys(&store), vec!["private_2"]);
        store.cleanup();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn zero_capacity_is_treated_as_one() {
        let mut store = SessionStore::new(0);
        store.get_or_create(&private(1), || ());
        store.get_or_create(&private(2), || ());
        assert_eq!(store.len(), 1);
        assert_eq!(keys(&store), vec!["private_2"]);
    }

    #[test]
    fn clear_removes_matching_keys() {
        let mut store = SessionStore::new(10);
        store.get_or_create(&group(5, 1, true), || ());
        store.get_or_create(&group(5, 2, true), || ());
        store.get_or_create(&group(6, 1, true), || ());
        store.get_or_create(&private(1), || ());

        let removed = store.clear(|key| key.starts_with("group_5_"));
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.clear_all(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn enabling_isolation_drops_shared_group_key_only() {
        let mut store = SessionStore::new(10);
        store.get_or_create(&group(42, 1, false), || ());
        store.get_or_create(&group(420, 1, false), || ());
        store.get_or_create(&private(1), || ());

        let scope = ChatScope::Group { group_id: 42 };
        store.clear(|key| stale_after_isolation_change(key, scope, true));

        assert!(!store.contains("group_42"));
        assert!(store.contains("group_420"));
        assert!(store.contains("private_1"));
    }

    #[test]
    fn disabling_isolation_drops_per_user_keys_of_that_group() {
        let scope = ChatScope::Group { group_id: 42 };
        assert!(stale_after_isolation_change("group_42_7", scope, false));
        assert!(!stale_after_isolation_change("group_420_7", scope, false));
        assert!(!stale_after_isolation_change("group_42", scope, false));
        assert!(!stale_after_isolation_change("private_7", scope, false));
    }

    #[test]
    fn isolation_change_from_private_drops_private_keys() {
        assert!(stale_after_isolation_change("private_7", ChatScope::Private, true));
        assert!(!stale_after_isolation_change("group_1", ChatScope::Private, true));
    }
}
