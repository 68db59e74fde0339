//! TaskRouter: picks the brain that should own a task.
//!
//! Classification is deterministic keyword matching on the lowercased task,
//! evaluated in a fixed precedence order: coding → retrieval → ui. The first
//! category whose brain is registered wins. Everything else falls through to
//! the local brain, which is always registered, so routing never fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::ConversationMessage;
use crate::inference::types::Role;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Id of the always-available local inference brain.
pub const LOCAL_BRAIN: &str = "local";

const CODING_KEYWORDS: &[&str] = &[
    "code",
    "coding",
    "bug",
    "bugs",
    "fix",
    "debug",
    "refactor",
    "implement",
    "function",
    "compile",
    "repo",
    "repository",
    "pull request",
    "commit",
    "script",
    "program",
    "unit test",
];

const RETRIEVAL_KEYWORDS: &[&str] = &[
    "remember",
    "recall",
    "search",
    "find",
    "look up",
    "lookup",
    "what did",
    "history",
    "notes",
    "memory",
    "document",
    "documents",
];

const UI_KEYWORDS: &[&str] = &[
    "ui",
    "interface",
    "design",
    "screen",
    "layout",
    "mockup",
    "wireframe",
    "frontend",
    "website",
    "landing page",
    "pipeline",
    "workflow",
];

/// Cues that mark a task as continuing the previous one.
const FOLLOW_UP_CUES: &[&str] = &["again", "continue", "retry", "keep going", "one more"];

// ─── Categories ─────────────────────────────────────────────────────────────

/// Intent category a specialized brain can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Coding,
    Retrieval,
    Ui,
}

impl Category {
    /// Evaluation order.
    pub const PRECEDENCE: [Category; 3] = [Category::Coding, Category::Retrieval, Category::Ui];

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Category::Coding => CODING_KEYWORDS,
            Category::Retrieval => RETRIEVAL_KEYWORDS,
            Category::Ui => UI_KEYWORDS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Coding => "coding",
            Category::Retrieval => "retrieval",
            Category::Ui => "ui",
        }
    }
}

// ─── Decisions ──────────────────────────────────────────────────────────────

/// Which brain owns a task, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub brain_id: String,
    pub reason: String,
}

/// How a registered brain is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrainBinding {
    /// The local streaming inference adapter.
    Local,
    /// A fixed tool on a tool provider.
    Tool { provider_id: String, tool_name: String },
}

/// Call strategy resolved from a [`RouteDecision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Default,
    Provider { provider_id: String, tool_name: String },
}

// ─── TaskRouter ─────────────────────────────────────────────────────────────

pub struct TaskRouter {
    brains: HashMap<String, BrainBinding>,
    categories: HashMap<Category, String>,
}

impl Default for TaskRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRouter {
    /// Router with only the local brain registered.
    pub fn new() -> Self {
        let mut brains = HashMap::new();
        brains.insert(LOCAL_BRAIN.to_string(), BrainBinding::Local);
        Self {
            brains,
            categories: HashMap::new(),
        }
    }

    /// Register `brain_id` and bind it to `category`.
    ///
    /// Rebinding a category replaces its previous brain. The local brain id is
    /// reserved.
    pub fn register(&mut self, category: Category, brain_id: &str, binding: BrainBinding) -> bool {
        if brain_id == LOCAL_BRAIN {
            tracing::warn!(category = category.as_str(), "brain id 'local' is reserved, ignoring");
            return false;
        }
        tracing::info!(
            brain = brain_id,
            category = category.as_str(),
            binding = ?binding,
            "brain registered"
        );
        self.brains.insert(brain_id.to_string(), binding);
        self.categories.insert(category, brain_id.to_string());
        true
    }

    /// Remove a brain and any category bound to it. The local brain stays.
    pub fn unregister(&mut self, brain_id: &str) {
        if brain_id == LOCAL_BRAIN {
            return;
        }
        self.brains.remove(brain_id);
        self.categories.retain(|_, id| id.as_str() != brain_id);
    }

    pub fn is_registered(&self, brain_id: &str) -> bool {
        self.brains.contains_key(brain_id)
    }

    /// Registered brain ids, sorted.
    pub fn brain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.brains.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Brain bound to `category`, if it is registered.
    fn brain_for(&self, category: Category) -> Option<&str> {
        self.categories
            .get(&category)
            .map(String::as_str)
            .filter(|id| self.brains.contains_key(*id))
    }

    /// Decide which brain owns `task`.
    ///
    /// `context` is the conversation preceding the task (the task itself not
    /// included). It is only consulted for follow-up cues.
    pub fn route(&self, task: &str, context: Option<&[ConversationMessage]>) -> RouteDecision {
        let tokens = tokenize(task);

        let mut unbound: Option<Category> = None;
        for category in Category::PRECEDENCE {
            let Some(keyword) = first_match(&tokens, category.keywords()) else {
                continue;
            };
            match self.brain_for(category) {
                Some(brain_id) => {
                    return RouteDecision {
                        brain_id: brain_id.to_string(),
                        reason: format!("Matched {} keyword '{keyword}'", category.as_str()),
                    };
                }
                None => {
                    unbound.get_or_insert(category);
                }
            }
        }

        if unbound.is_none() && first_match(&tokens, FOLLOW_UP_CUES).is_some() {
            if let Some(decision) = self.follow_up(context) {
                return decision;
            }
        }

        let reason = match unbound {
            Some(category) => format!(
                "{} intent detected but no {} brain is registered; using local model",
                capitalize(category.as_str()),
                category.as_str()
            ),
            None => "No specialized brain matched; using local model".to_string(),
        };
        RouteDecision {
            brain_id: LOCAL_BRAIN.to_string(),
            reason,
        }
    }

    /// Inherit the brain of the most recent user message in `context`.
    fn follow_up(&self, context: Option<&[ConversationMessage]>) -> Option<RouteDecision> {
        let previous = context?.iter().rev().find(|m| m.role == Role::User)?;
        let tokens = tokenize(&previous.content);
        Category::PRECEDENCE.into_iter().find_map(|category| {
            first_match(&tokens, category.keywords())?;
            let brain_id = self.brain_for(category)?;
            Some(RouteDecision {
                brain_id: brain_id.to_string(),
                reason: format!("Follow-up to previous {} task", category.as_str()),
            })
        })
    }

    /// Resolve a decision to a call strategy. `None` for unknown brain ids.
    pub fn resolve(&self, decision: &RouteDecision) -> Option<RouteTarget> {
        match self.brains.get(&decision.brain_id)? {
            BrainBinding::Local => Some(RouteTarget::Default),
            BrainBinding::Tool {
                provider_id,
                tool_name,
            } => Some(RouteTarget::Provider {
                provider_id: provider_id.clone(),
                tool_name: tool_name.clone(),
            }),
        }
    }
}

// ─── Matching ───────────────────────────────────────────────────────────────

/// Lowercased alphanumeric words of `text`.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Endings accepted after a keyword word ("fix" → "fixing", "fixes").
const INFLECTIONS: &[&str] = &["s", "es", "d", "ed", "r", "rs", "ing", "er", "ers"];

/// First keyword (single word or phrase) present as words in `tokens`.
fn first_match(tokens: &[String], keywords: &[&'static str]) -> Option<&'static str> {
    keywords.iter().copied().find(|keyword| {
        let phrase: Vec<&str> = keyword.split_whitespace().collect();
        !phrase.is_empty()
            && tokens
                .windows(phrase.len())
                .any(|window| window.iter().zip(&phrase).all(|(t, p)| word_matches(t, p)))
    })
}

/// `token` is `word` or an inflection of it, optionally doubling the final
/// consonant ("debug" → "debugging", "commit" → "committed").
fn word_matches(token: &str, word: &str) -> bool {
    let Some(rest) = token.strip_prefix(word) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    if word.len() < 3 {
        return false;
    }
    let rest = match word.chars().last() {
        Some(last) if !"aeiou".contains(last) => rest.strip_prefix(last).unwrap_or(rest),
        _ => rest,
    };
    INFLECTIONS.contains(&rest)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(provider: &str, name: &str) -> BrainBinding {
        BrainBinding::Tool {
            provider_id: provider.into(),
            tool_name: name.into(),
        }
    }

    fn full_router() -> TaskRouter {
        let mut router = TaskRouter::new();
        router.register(Category::Coding, "jules", tool("jules", "create_coding_session"));
        router.register(Category::Retrieval, "recall", tool("recall", "search_memory"));
        router.register(Category::Ui, "stitch", tool("stitch", "generate_ui"));
        router
    }

    #[test]
    fn test_coding_task_routes_to_coding_brain() {
        let router = full_router();
        let decision = router.route("fix this code bug", None);
        assert_eq!(decision.brain_id, "jules");
        assert!(decision.reason.contains("coding"));
    }

    #[test]
    fn test_unregistered_coding_brain_falls_back_to_local() {
        let mut router = full_router();
        router.unregister("jules");
        let decision = router.route("fix this code bug", None);
        assert_eq!(decision.brain_id, LOCAL_BRAIN);
        assert!(decision.reason.contains("no coding brain"));
    }

    #[test]
    fn test_precedence_coding_before_ui() {
        let router = full_router();
        assert_eq!(router.route("fix the bug in the login screen", None).brain_id, "jules");
        assert_eq!(router.route("design a login screen", None).brain_id, "stitch");
        assert_eq!(router.route("search my notes for the budget", None).brain_id, "recall");
    }

    #[test]
    fn test_lower_category_wins_when_higher_is_unbound() {
        let mut router = full_router();
        router.unregister("jules");
        assert_eq!(router.route("fix the bug in the login screen", None).brain_id, "stitch");
    }

    #[test]
    fn test_keywords_anchor_at_word_start() {
        let router = full_router();
        // "build" contains "ui", "prefix" contains "fix", "decode" contains "code".
        let decision = router.route("Build me a prefix decoder", None);
        assert_eq!(decision.brain_id, LOCAL_BRAIN);
        assert_eq!(router.route("What does the UI look like?", None).brain_id, "stitch");
    }

    #[test]
    fn test_inflected_keywords() {
        let router = full_router();
        assert_eq!(router.route("Fixing the login", None).brain_id, "jules");
        assert_eq!(router.route("debugging this", None).brain_id, "jules");
        assert_eq!(router.route("it refactored nothing", None).brain_id, "jules");
        assert_eq!(router.route("searching my notes", None).brain_id, "recall");
        // Endings outside the inflection set stay unmatched.
        assert_eq!(router.route("show me the uint sizes", None).brain_id, LOCAL_BRAIN);
        assert_eq!(router.route("a fixture for codecs", None).brain_id, LOCAL_BRAIN);
    }

    #[test]
    fn test_phrase_keywords() {
        let router = full_router();
        assert_eq!(router.route("please look up the invoice", None).brain_id, "recall");
        assert_eq!(router.route("open a pull request", None).brain_id, "jules");
        assert_eq!(router.route("look at this", None).brain_id, LOCAL_BRAIN);
    }

    #[test]
    fn test_default_never_missing() {
        let router = TaskRouter::new();
        for task in ["", "hello there", "fix this code bug", "!!!"] {
            let decision = router.route(task, None);
            assert_eq!(decision.brain_id, LOCAL_BRAIN);
            assert!(router.resolve(&decision).is_some());
        }
    }

    #[test]
    fn test_follow_up_inherits_previous_brain() {
        let router = full_router();
        let context = vec![
            ConversationMessage::new(Role::User, "fix the failing build script"),
            ConversationMessage::new(Role::Assistant, "Session created."),
        ];
        let decision = router.route("try that again", Some(context.as_slice()));
        assert_eq!(decision.brain_id, "jules");
        assert!(decision.reason.starts_with("Follow-up"));

        // No cue → local.
        assert_eq!(router.route("thanks", Some(context.as_slice())).brain_id, LOCAL_BRAIN);
        // Cue without context → local.
        assert_eq!(router.route("again", None).brain_id, LOCAL_BRAIN);
    }

    #[test]
    fn test_follow_up_uses_most_recent_user_message_only() {
        let router = full_router();
        let context = vec![
            ConversationMessage::new(Role::User, "fix the bug"),
            ConversationMessage::new(Role::User, "tell me a joke"),
        ];
        assert_eq!(router.route("one more", Some(context.as_slice())).brain_id, LOCAL_BRAIN);
    }

    #[test]
    fn test_resolve() {
        let router = full_router();
        let local = router.route("hello", None);
        assert_eq!(router.resolve(&local), Some(RouteTarget::Default));

        let coding = router.route("refactor this function", None);
        assert_eq!(
            router.resolve(&coding),
            Some(RouteTarget::Provider {
                provider_id: "jules".into(),
                tool_name: "create_coding_session".into(),
            })
        );

        let bogus = RouteDecision {
            brain_id: "nonexistent".into(),
            reason: String::new(),
        };
        assert_eq!(router.resolve(&bogus), None);
    }

    #[test]
    fn test_local_id_reserved() {
        let mut router = TaskRouter::new();
        assert!(!router.register(Category::Coding, LOCAL_BRAIN, tool("x", "y")));
        router.unregister(LOCAL_BRAIN);
        assert!(router.is_registered(LOCAL_BRAIN));
        assert_eq!(router.brain_ids(), vec!["local"]);
    }
}
