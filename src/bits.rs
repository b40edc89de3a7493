//! Bits: reusable micro-dialogues referenced by id.
//!
//! A bit can send strings, run a callback, and chain follow-up bits through
//! its `next` list. Chaining registers a scoped scene path so the follow-up
//! bits get first claim on the participant's next messages.

use serde::{Deserialize, Serialize};

use crate::branches::{Action, Branch, BranchCallback, Matcher};
use crate::conditions::Conditions;
use crate::nlu::NluCriteria;
use crate::paths::Path;
use crate::state::State;
use crate::thought::{Scene, Stage};

/// Scene lifetime when a chaining bit sets no explicit timeout.
pub const DEFAULT_SCENE_TIMEOUT_MS: u64 = 60_000;

/// Which participants a bit's follow-up scene binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SceneScope {
    /// The triggering user, in any room.
    User,
    /// Everyone in the triggering room.
    Room,
    /// The triggering user in the triggering room only.
    Direct,
}

/// A reusable interaction unit.
#[derive(Clone)]
pub struct Bit {
    /// Registry id.
    pub id: String,
    /// Strings sent before the callback runs.
    pub send: Vec<String>,
    /// Callback run after the strings are queued.
    pub callback: Option<BranchCallback>,
    /// Text entry criteria when this bit is chained into a scene.
    pub condition: Option<Conditions>,
    /// Intent entry criteria when this bit is chained into a scene.
    pub intent: Option<String>,
    /// Follow-up bit ids forming an implicit scene.
    pub next: Vec<String>,
    /// Scene binding for the follow-ups.
    pub scope: SceneScope,
    /// Scene lifetime override in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl Bit {
    /// Create an empty bit with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            send: Vec::new(),
            callback: None,
            condition: None,
            intent: None,
            next: Vec::new(),
            scope: SceneScope::User,
            timeout_ms: None,
        }
    }

    /// Strings to send when the bit runs.
    pub fn saying<S: AsRef<str>>(mut self, strings: &[S]) -> Self {
        self.send = strings.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Callback to run when the bit runs.
    pub fn calling(mut self, callback: BranchCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Text conditions that trigger this bit inside a scene.
    pub fn on_condition(mut self, condition: Conditions) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Intent name that triggers this bit inside a scene.
    pub fn on_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    /// Follow-up bits to offer after this one runs.
    pub fn then<S: AsRef<str>>(mut self, next: &[S]) -> Self {
        self.next = next.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Scene binding for follow-ups.
    pub fn scoped(mut self, scope: SceneScope) -> Self {
        self.scope = scope;
        self
    }

    /// Scene lifetime for follow-ups.
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Whether the bit does anything observable when run.
    pub fn has_interaction(&self) -> bool {
        !self.send.is_empty() || self.callback.is_some()
    }
}

impl std::fmt::Debug for Bit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bit")
            .field("id", &self.id)
            .field("send", &self.send.len())
            .field("callback", &self.callback.is_some())
            .field("next", &self.next)
            .finish()
    }
}

/// Run the bit with this id against the state. A missing id logs and
/// returns without error.
pub async fn run(id: &str, state: &mut State) -> Result<(), anyhow::Error> {
    let Some(bit) = state.bot.bit(id) else {
        log::error!("[bits] no bit registered with id '{id}'");
        return Ok(());
    };
    if !bit.send.is_empty() {
        state.respond(&bit.send);
    }
    if let Some(callback) = &bit.callback {
        callback(state).await?;
    }
    if !bit.next.is_empty() {
        open_scene(&bit, state);
    }
    Ok(())
}

/// Register the scoped scene that offers a bit's follow-ups to the current
/// participants.
fn open_scene(bit: &Bit, state: &mut State) {
    let mut path = Path::new(format!("scene:{}", bit.id));
    for next_id in &bit.next {
        let Some(next_bit) = state.bot.bit(next_id) else {
            log::warn!("[bits] bit '{}' chains unknown bit '{next_id}'", bit.id);
            continue;
        };
        let branch_id = format!("bit:{next_id}");
        if let Some(condition) = &next_bit.condition {
            path.add(
                Branch::new(
                    Matcher::Text(condition.clone()),
                    Action::Bit(next_id.clone()),
                )
                .with_id(branch_id),
                Stage::Listen,
            );
        } else if let Some(intent) = &next_bit.intent {
            path.add(
                Branch::new(
                    Matcher::NaturalLanguage(NluCriteria::intent(intent.clone())),
                    Action::Bit(next_id.clone()),
                )
                .with_id(branch_id),
                Stage::Understand,
            );
        } else {
            log::warn!(
                "[bits] bit '{next_id}' has no entry criteria; not adding to scene"
            );
        }
    }
    if path.is_empty() {
        return;
    }
    let (user_id, room_id) = match bit.scope {
        SceneScope::User => (Some(state.message.user.id.clone()), None),
        SceneScope::Room => (None, Some(state.message.room.id.clone())),
        SceneScope::Direct => (
            Some(state.message.user.id.clone()),
            Some(state.message.room.id.clone()),
        ),
    };
    let timeout = bit.timeout_ms.unwrap_or(DEFAULT_SCENE_TIMEOUT_MS);
    state
        .bot
        .push_scene(Scene::new(path, user_id, room_id, timeout));
}
