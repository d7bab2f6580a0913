//! Conversation context (C6): per-session mutable state with bounded
//! histories, one active action per domain, plugin-isolated data, and
//! memory accounting.

use crate::types::Metadata;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Conversation history is trimmed once it exceeds this many entries.
const MAX_CONVERSATION_HISTORY: usize = 100;
/// Command/recent-action history is trimmed once it exceeds this many entries.
const MAX_COMMAND_HISTORY: usize = 50;
/// Failed-action history kept for diagnostics, same quota as commands.
const MAX_FAILED_ACTIONS: usize = 50;
/// Rough per-character cost used for the memory estimate (UTF-8 average).
const BYTES_PER_CHAR_ESTIMATE: usize = 2;

/// Status of a dispatched, not-yet-finished (or just-finished) action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Bookkeeping for one in-flight or finished action within a domain.
#[derive(Debug, Clone)]
pub struct ActionInfo {
    pub action: String,
    pub handler: String,
    pub status: ActionStatus,
    pub started_at: DateTime<Utc>,
    pub task_id: Option<String>,
    pub timeout: Option<f64>,
    pub timeout_at: Option<DateTime<Utc>>,
    pub max_retries: u32,
    pub retry_count: u32,
    pub retry_delay: Option<f64>,
}

impl ActionInfo {
    pub fn new(action: impl Into<String>, handler: impl Into<String>, timeout: Option<f64>) -> Self {
        let started_at = Utc::now();
        Self {
            action: action.into(),
            handler: handler.into(),
            status: ActionStatus::Running,
            started_at,
            task_id: None,
            timeout_at: timeout.map(|t| started_at + chrono::Duration::milliseconds((t * 1000.0) as i64)),
            timeout,
            max_retries: 0,
            retry_count: 0,
            retry_delay: None,
        }
    }
}

/// One entry in the free-form conversation transcript.
#[derive(Debug, Clone)]
pub struct ConversationEntry {
    pub role: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
}

/// A dispatched command, kept for short-term recall (e.g. "repeat that").
#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub text: String,
    pub intent_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A one-shot handler bound to the next input in a session.
#[derive(Debug, Clone)]
pub struct Continuation {
    pub handler: String,
    pub timer_id: u64,
}

/// Which history/action dimensions have exceeded their retention quota.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupFlags {
    pub conversation_history: bool,
    pub command_history: bool,
    pub failed_actions: bool,
}

impl CleanupFlags {
    pub fn any(&self) -> bool {
        self.conversation_history || self.command_history || self.failed_actions
    }
}

/// Per-session mutable state. Only the owning session task may mutate its
/// context directly; other tasks publish changes through the session's
/// command channel instead.
pub struct ConversationContext {
    pub session_id: String,
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    conversation_history: Vec<ConversationEntry>,
    recent_actions: Vec<CommandEntry>,
    failed_actions: Vec<CommandEntry>,
    active_actions: HashMap<String, ActionInfo>,
    plugin_data: HashMap<String, HashMap<String, serde_json::Value>>,
    pub variables: HashMap<String, serde_json::Value>,
    continuation: Option<Continuation>,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: None,
            client_id: None,
            language: "ru".to_string(),
            created_at: now,
            last_updated: now,
            conversation_history: Vec::new(),
            recent_actions: Vec::new(),
            failed_actions: Vec::new(),
            active_actions: HashMap::new(),
            plugin_data: HashMap::new(),
            variables: HashMap::new(),
            continuation: None,
        }
    }

    /// Append a conversation turn, trimming to the retention quota.
    pub fn add_conversation_entry(&mut self, role: impl Into<String>, text: impl Into<String>, metadata: Metadata) {
        self.conversation_history.push(ConversationEntry {
            role: role.into(),
            text: text.into(),
            timestamp: Utc::now(),
            metadata,
        });
        if self.conversation_history.len() > MAX_CONVERSATION_HISTORY {
            let overflow = self.conversation_history.len() - MAX_CONVERSATION_HISTORY;
            self.conversation_history.drain(0..overflow);
        }
        self.last_updated = Utc::now();
    }

    /// Record a dispatched command, trimming to the retention quota.
    pub fn add_command(&mut self, text: impl Into<String>, intent_name: Option<String>) {
        self.recent_actions.push(CommandEntry {
            text: text.into(),
            intent_name,
            timestamp: Utc::now(),
        });
        if self.recent_actions.len() > MAX_COMMAND_HISTORY {
            let overflow = self.recent_actions.len() - MAX_COMMAND_HISTORY;
            self.recent_actions.drain(0..overflow);
        }
        self.last_updated = Utc::now();
    }

    pub fn conversation_history(&self) -> &[ConversationEntry] {
        &self.conversation_history
    }

    pub fn recent_actions(&self) -> &[CommandEntry] {
        &self.recent_actions
    }

    pub fn failed_actions(&self) -> &[CommandEntry] {
        &self.failed_actions
    }

    /// Begin tracking an action in `domain`. Fails if one is already active
    /// there: at most one active action per domain (§3 invariant).
    pub fn start_action(&mut self, domain: impl Into<String>, info: ActionInfo) -> Result<(), String> {
        let domain = domain.into();
        if self.active_actions.contains_key(&domain) {
            return Err(format!("an action is already active in domain '{domain}'"));
        }
        self.active_actions.insert(domain, info);
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Finish the action active in `domain`, recording it as completed or
    /// failed history depending on `status`.
    pub fn finish_action(&mut self, domain: &str, status: ActionStatus, text: impl Into<String>) {
        if let Some(mut info) = self.active_actions.remove(domain) {
            info.status = status;
            let entry = CommandEntry {
                text: text.into(),
                intent_name: Some(info.action.clone()),
                timestamp: Utc::now(),
            };
            if status == ActionStatus::Failed {
                self.failed_actions.push(entry);
                if self.failed_actions.len() > MAX_FAILED_ACTIONS {
                    let overflow = self.failed_actions.len() - MAX_FAILED_ACTIONS;
                    self.failed_actions.drain(0..overflow);
                }
            } else {
                self.recent_actions.push(entry);
                if self.recent_actions.len() > MAX_COMMAND_HISTORY {
                    let overflow = self.recent_actions.len() - MAX_COMMAND_HISTORY;
                    self.recent_actions.drain(0..overflow);
                }
            }
        }
        self.last_updated = Utc::now();
    }

    pub fn active_action(&self, domain: &str) -> Option<&ActionInfo> {
        self.active_actions.get(domain)
    }

    pub fn active_action_count(&self) -> usize {
        self.active_actions.len()
    }

    /// Register a one-shot continuation, cancelling any previous one first.
    /// The caller is responsible for scheduling `timer_id`'s expiry with
    /// the timer scheduler (C8) and calling [`Self::clear_continuation`]
    /// when it fires or is superseded.
    pub fn set_continuation(&mut self, handler: impl Into<String>, timer_id: u64) -> Option<Continuation> {
        let previous = self.continuation.take();
        self.continuation = Some(Continuation {
            handler: handler.into(),
            timer_id,
        });
        self.last_updated = Utc::now();
        previous
    }

    pub fn continuation(&self) -> Option<&Continuation> {
        self.continuation.as_ref()
    }

    pub fn clear_continuation(&mut self) -> Option<Continuation> {
        self.continuation.take()
    }

    /// Per-plugin key-value store; plugins never see each other's keys.
    pub fn get_plugin_data(&self, plugin: &str, key: &str) -> Option<&serde_json::Value> {
        self.plugin_data.get(plugin)?.get(key)
    }

    pub fn set_plugin_data(&mut self, plugin: impl Into<String>, key: impl Into<String>, value: serde_json::Value) {
        self.plugin_data.entry(plugin.into()).or_default().insert(key.into(), value);
        self.last_updated = Utc::now();
    }

    /// Rough estimated size of this context in megabytes, used to decide
    /// whether cleanup is due. Not exact: counts UTF-8 text and JSON value
    /// payloads at a fixed per-character estimate rather than introspecting
    /// serde_json's internal representation.
    pub fn estimated_size_mb(&self) -> f64 {
        let mut bytes = 0usize;
        for entry in &self.conversation_history {
            bytes += entry.text.len() * BYTES_PER_CHAR_ESTIMATE + entry.role.len();
        }
        for entry in self.recent_actions.iter().chain(self.failed_actions.iter()) {
            bytes += entry.text.len() * BYTES_PER_CHAR_ESTIMATE;
        }
        for plugin in self.plugin_data.values() {
            for value in plugin.values() {
                bytes += value.to_string().len();
            }
        }
        bytes as f64 / (1024.0 * 1024.0)
    }

    /// Which dimensions currently exceed their retention quota.
    pub fn should_trigger_cleanup(&self) -> CleanupFlags {
        CleanupFlags {
            conversation_history: self.conversation_history.len() > MAX_CONVERSATION_HISTORY,
            command_history: self.recent_actions.len() > MAX_COMMAND_HISTORY,
            failed_actions: self.failed_actions.len() > MAX_FAILED_ACTIONS,
        }
    }

    /// Trim histories back to their quotas. `aggressive` additionally halves
    /// the retained window, for use under memory pressure.
    pub fn perform_cleanup(&mut self, aggressive: bool) {
        let conv_quota = if aggressive { MAX_CONVERSATION_HISTORY / 2 } else { MAX_CONVERSATION_HISTORY };
        let cmd_quota = if aggressive { MAX_COMMAND_HISTORY / 2 } else { MAX_COMMAND_HISTORY };

        if self.conversation_history.len() > conv_quota {
            let overflow = self.conversation_history.len() - conv_quota;
            self.conversation_history.drain(0..overflow);
        }
        if self.recent_actions.len() > cmd_quota {
            let overflow = self.recent_actions.len() - cmd_quota;
            self.recent_actions.drain(0..overflow);
        }
        if self.failed_actions.len() > cmd_quota {
            let overflow = self.failed_actions.len() - cmd_quota;
            self.failed_actions.drain(0..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_history_is_bounded() {
        let mut ctx = ConversationContext::new("s1");
        for i in 0..150 {
            ctx.add_conversation_entry("user", format!("message {i}"), Metadata::new());
        }
        assert_eq!(ctx.conversation_history().len(), MAX_CONVERSATION_HISTORY);
        assert_eq!(ctx.conversation_history().first().unwrap().text, "message 50");
    }

    #[test]
    fn only_one_active_action_per_domain() {
        let mut ctx = ConversationContext::new("s1");
        ctx.start_action("lights", ActionInfo::new("turn_on", "lights_handler", None)).unwrap();
        let second = ctx.start_action("lights", ActionInfo::new("turn_off", "lights_handler", None));
        assert!(second.is_err());
        assert_eq!(ctx.active_action_count(), 1);
    }

    #[test]
    fn set_continuation_cancels_previous() {
        let mut ctx = ConversationContext::new("s1");
        ctx.set_continuation("handler_a", 1);
        let replaced = ctx.set_continuation("handler_b", 2);
        assert_eq!(replaced.unwrap().handler, "handler_a");
        assert_eq!(ctx.continuation().unwrap().handler, "handler_b");
    }

    #[test]
    fn plugin_data_is_isolated() {
        let mut ctx = ConversationContext::new("s1");
        ctx.set_plugin_data("weather", "city", serde_json::json!("Moscow"));
        ctx.set_plugin_data("timer", "city", serde_json::json!("ignored"));
        assert_eq!(
            ctx.get_plugin_data("weather", "city"),
            Some(&serde_json::json!("Moscow"))
        );
        assert_ne!(ctx.get_plugin_data("timer", "city"), ctx.get_plugin_data("weather", "city"));
    }

    #[test]
    fn cleanup_trims_to_quota() {
        let mut ctx = ConversationContext::new("s1");
        for i in 0..80 {
            ctx.add_command(format!("cmd {i}"), None);
        }
        assert!(!ctx.should_trigger_cleanup().any());
        ctx.perform_cleanup(true);
        assert!(ctx.recent_actions().len() <= MAX_COMMAND_HISTORY / 2);
    }
}
