//! Branches: a matcher plus an action, registered at a stage.
//!
//! A branch evaluates itself against the state's message (or cached NLU
//! result) and, on success, appends a record to the state and runs its
//! action. Branches are immutable after registration; evaluation results
//! live only on the state.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::bits;
use crate::conditions::Conditions;
use crate::errors::BranchError;
use crate::messages::Message;
use crate::nlu::NluCriteria;
use crate::state::State;

/// Async callback invoked with the state when a branch matches.
pub type BranchCallback =
    Arc<dyn for<'a> Fn(&'a mut State) -> BoxFuture<'a, Result<(), anyhow::Error>> + Send + Sync>;

/// Async user predicate for custom branches. Returning `Some` is a match;
/// the value becomes the match data.
pub type BranchPredicate = Arc<
    dyn for<'a> Fn(&'a Message, &'a State) -> BoxFuture<'a, Option<Value>> + Send + Sync,
>;

/// Coerce a closure into a [`BranchCallback`].
pub fn callback<F>(f: F) -> BranchCallback
where
    F: for<'a> Fn(&'a mut State) -> BoxFuture<'a, Result<(), anyhow::Error>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Coerce a closure into a [`BranchPredicate`].
pub fn predicate<F>(f: F) -> BranchPredicate
where
    F: for<'a> Fn(&'a Message, &'a State) -> BoxFuture<'a, Option<Value>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What a branch does when it matches.
#[derive(Clone)]
pub enum Action {
    /// Run a callback with the state.
    Callback(BranchCallback),
    /// Run the bit with this id.
    Bit(String),
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Callback(_) => write!(f, "Action::Callback"),
            Action::Bit(id) => write!(f, "Action::Bit({id})"),
        }
    }
}

/// How a branch decides whether it matches.
#[derive(Clone)]
pub enum Matcher {
    /// Conditions over message text.
    Text(Conditions),
    /// Conditions over message text addressed to the bot by name.
    TextDirect(Conditions),
    /// Criteria over the cached NLU result.
    NaturalLanguage(NluCriteria),
    /// NLU criteria, requiring the bot to be addressed by name.
    NaturalLanguageDirect(NluCriteria),
    /// Deep key-equality criteria over a server message payload.
    Server(Value),
    /// Arbitrary async predicate.
    Custom(BranchPredicate),
    /// Matches only when listen/understand produced no match.
    CatchAll,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Matcher::Text(_) => "Text",
            Matcher::TextDirect(_) => "TextDirect",
            Matcher::NaturalLanguage(_) => "NaturalLanguage",
            Matcher::NaturalLanguageDirect(_) => "NaturalLanguageDirect",
            Matcher::Server(_) => "Server",
            Matcher::Custom(_) => "Custom",
            Matcher::CatchAll => "CatchAll",
        };
        write!(f, "Matcher::{name}")
    }
}

/// A matcher, an action, and registration metadata.
#[derive(Clone, Debug)]
pub struct Branch {
    /// Branch id; duplicate registration under the same id replaces.
    pub id: String,
    /// The matcher.
    pub matcher: Matcher,
    /// The action run on match.
    pub action: Action,
    /// Evaluate even when an earlier branch already matched this stage.
    pub force: bool,
    /// Arbitrary metadata attached at registration.
    pub meta: Map<String, Value>,
}

impl Branch {
    /// Create a branch with a generated id.
    pub fn new(matcher: Matcher, action: Action) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            matcher,
            action,
            force: false,
            meta: Map::new(),
        }
    }

    /// Override the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Mark the branch as forced.
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Attach metadata.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Evaluate the matcher against the state and, on success, record the
    /// match. Returns whether the branch matched.
    pub async fn matches(&self, state: &mut State) -> bool {
        let hit = self.evaluate(state).await;
        if let Some((match_data, captured)) = hit {
            let id = self.id.clone();
            state.record_match(&id, match_data, captured);
            true
        } else {
            false
        }
    }

    async fn evaluate(&self, state: &State) -> Option<(Value, Value)> {
        let message = &state.message;
        match &self.matcher {
            Matcher::Text(conditions) => {
                let text = message.text_content()?;
                exec_conditions(conditions, text)
            }
            Matcher::TextDirect(conditions) => {
                let text = message.text_content()?;
                let stripped = strip_direct_prefix(
                    text,
                    &state.bot.settings.name,
                    state.bot.settings.alias.as_deref(),
                )?;
                exec_conditions(conditions, &stripped)
            }
            Matcher::NaturalLanguage(criteria) => {
                let result = state.nlu.as_ref()?;
                criteria.apply(result).map(|data| (data, Value::Null))
            }
            Matcher::NaturalLanguageDirect(criteria) => {
                let text = message.text_content()?;
                strip_direct_prefix(
                    text,
                    &state.bot.settings.name,
                    state.bot.settings.alias.as_deref(),
                )?;
                let result = state.nlu.as_ref()?;
                criteria.apply(result).map(|data| (data, Value::Null))
            }
            Matcher::Server(criteria) => {
                let data = message.server_data()?;
                if value_subset(criteria, data) {
                    Some((data.clone(), Value::Null))
                } else {
                    None
                }
            }
            Matcher::Custom(predicate) => predicate(message, state)
                .await
                .map(|data| (data, Value::Null)),
            Matcher::CatchAll => {
                let unmatched = !state.has_match_at(crate::thought::Stage::Listen)
                    && !state.has_match_at(crate::thought::Stage::Understand);
                if unmatched {
                    Some((Value::Bool(true), Value::Null))
                } else {
                    None
                }
            }
        }
    }

    /// Run the branch action. Errors are wrapped with the branch id.
    pub async fn execute(&self, state: &mut State) -> Result<(), BranchError> {
        match &self.action {
            Action::Callback(cb) => cb(state).await.map_err(|source| BranchError {
                branch_id: self.id.clone(),
                source,
            }),
            Action::Bit(bit_id) => {
                bits::run(bit_id, state).await.map_err(|source| BranchError {
                    branch_id: self.id.clone(),
                    source,
                })
            }
        }
    }
}

fn exec_conditions(conditions: &Conditions, text: &str) -> Option<(Value, Value)> {
    let outcome = conditions.exec(text);
    if outcome.success {
        Some((outcome.match_value(), outcome.captured_value()))
    } else {
        None
    }
}

/// Strip a leading bot name or alias (with optional `@` and trailing `:`/`,`)
/// from the text, returning the remainder. `None` when the text does not
/// address the bot.
pub fn strip_direct_prefix(text: &str, name: &str, alias: Option<&str>) -> Option<String> {
    let trimmed = text.trim_start();
    let mut names: Vec<&str> = vec![name];
    if let Some(alias) = alias {
        names.push(alias);
    }
    for candidate in names {
        if candidate.is_empty() {
            continue;
        }
        let stripped = trimmed.strip_prefix('@').unwrap_or(trimmed);
        if stripped.len() >= candidate.len()
            && stripped.is_char_boundary(candidate.len())
            && stripped[..candidate.len()].eq_ignore_ascii_case(candidate)
        {
            let rest = &stripped[candidate.len()..];
            // Require a separator so "bbq" does not address "bb".
            let rest = match rest.chars().next() {
                None => rest,
                Some(c) if c == ':' || c == ',' || c.is_whitespace() => &rest[c.len_utf8()..],
                Some(_) => continue,
            };
            return Some(rest.trim_start().to_string());
        }
    }
    None
}

/// Whether every key in `criteria` is present in `data` with a deeply equal
/// (or recursively subset-matching) value.
fn value_subset(criteria: &Value, data: &Value) -> bool {
    match (criteria, data) {
        (Value::Object(wanted), Value::Object(actual)) => wanted.iter().all(|(key, value)| {
            actual
                .get(key)
                .map(|found| value_subset(value, found))
                .unwrap_or(false)
        }),
        (wanted, actual) => wanted == actual,
    }
}
