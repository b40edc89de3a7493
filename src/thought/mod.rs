//! The thought process: the staged pipeline from a received message to a
//! dispatched, remembered response.
//!
//! Stages run in a fixed order per entry point:
//!
//! - `receive`: hear → listen → understand → act → respond → remember
//! - `serve`:   hear → serve → act → respond → remember
//! - `dispatch`: respond → remember (bot-initiated envelopes)
//!
//! Each stage runs its middleware stack; branch stages evaluate that
//! stage's branches inside the stack's completion hook, so a middleware
//! interrupt suppresses matching for the stage. A `done` flag on the state
//! stops all further stages. Errors inside a stage are logged and absorbed
//! so a failing callback never swallows the rest of the event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use uuid::Uuid;

use crate::adapters::with_timeout;
use crate::bot::Bot;
use crate::branches::Branch;
use crate::envelopes::Envelope;
use crate::messages::Message;
use crate::middleware::{complete_hook, CompleteFn};
use crate::paths::Path;
use crate::state::State;

/// The stages of the thought process, in running order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Hear,
    Listen,
    Understand,
    Serve,
    Act,
    Respond,
    Remember,
}

impl Stage {
    /// All stages, in order.
    pub const ALL: [Stage; 7] = [
        Stage::Hear,
        Stage::Listen,
        Stage::Understand,
        Stage::Serve,
        Stage::Act,
        Stage::Respond,
        Stage::Remember,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Hear => write!(f, "hear"),
            Stage::Listen => write!(f, "listen"),
            Stage::Understand => write!(f, "understand"),
            Stage::Serve => write!(f, "serve"),
            Stage::Act => write!(f, "act"),
            Stage::Respond => write!(f, "respond"),
            Stage::Remember => write!(f, "remember"),
        }
    }
}

/// An ephemeral scoped path bound to a user and/or room. Scene branches get
/// first claim on their participants' messages; the scene is discarded when
/// one of its branches matches, or when it times out.
#[derive(Clone, Debug)]
pub struct Scene {
    /// Scene identity, used for discard after a match.
    pub id: String,
    /// The scoped branches.
    pub path: Path,
    /// Bound user, if scoped to one.
    pub user_id: Option<String>,
    /// Bound room, if scoped to one.
    pub room_id: Option<String>,
    /// When the scene lapses.
    pub expires_at: Instant,
}

impl Scene {
    /// Create a scene lasting `timeout_ms` from now.
    pub fn new(
        path: Path,
        user_id: Option<String>,
        room_id: Option<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path,
            user_id,
            room_id,
            expires_at: Instant::now() + Duration::from_millis(timeout_ms),
        }
    }

    /// Whether the scene binds the message's participants.
    pub fn applies_to(&self, message: &Message) -> bool {
        if let Some(user_id) = &self.user_id {
            if *user_id != message.user.id {
                return false;
            }
        }
        if let Some(room_id) = &self.room_id {
            if *room_id != message.room.id {
                return false;
            }
        }
        true
    }

    /// Whether the scene has lapsed.
    pub fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// One orchestrator pass over a bot context.
pub struct ThoughtProcess {
    bot: Arc<Bot>,
}

impl ThoughtProcess {
    /// Bind a thought process to a bot context.
    pub fn new(bot: Arc<Bot>) -> Self {
        Self { bot }
    }

    /// Process an inbound chat message through the full stage sequence.
    pub async fn receive(&self, message: Message) -> State {
        log::debug!("[thought] receive {}", message.id);
        let mut state = State::new(self.bot.clone(), message);
        self.hear(&mut state).await;
        if !state.done && state.message.is_listenable() {
            self.listen(&mut state).await;
            if !state.done {
                self.understand(&mut state).await;
            }
        }
        if !state.done {
            self.act(&mut state).await;
            self.emit_match_outcome(&state);
        }
        self.finish(&mut state).await;
        state
    }

    /// Process a server-originated message.
    pub async fn serve(&self, message: Message) -> State {
        log::debug!("[thought] serve {}", message.id);
        let mut state = State::new(self.bot.clone(), message);
        self.hear(&mut state).await;
        if !state.done {
            self.serve_stage(&mut state).await;
        }
        if !state.done {
            self.act(&mut state).await;
            self.emit_match_outcome(&state);
        }
        self.finish(&mut state).await;
        state
    }

    /// Dispatch a bot-initiated envelope (respond and remember only).
    pub async fn dispatch(&self, envelope: Envelope) -> State {
        let mut state = State::for_dispatch(self.bot.clone(), envelope);
        self.finish(&mut state).await;
        state
    }

    fn emit_match_outcome(&self, state: &State) {
        if state.has_match() {
            self.bot.events.emit("match", Some(state));
        } else {
            self.bot.events.emit("nomatch", Some(state));
        }
    }

    /// Run the closing stages: respond when envelopes are queued, remember
    /// unless the state was finished early.
    async fn finish(&self, state: &mut State) {
        if state.done {
            return;
        }
        if !state.pending_envelopes().is_empty() {
            self.respond(state).await;
        }
        if !state.done {
            self.remember(state).await;
        }
    }

    async fn run_stage(&self, stage: Stage, state: &mut State, complete: CompleteFn) {
        state.stage = Some(stage);
        let middleware = self.bot.middleware(stage);
        if let Err(err) = middleware.execute(state, complete).await {
            log::error!("[thought] {stage} stage failed: {err}");
        }
        self.bot.events.emit(&stage.to_string(), Some(state));
    }

    async fn hear(&self, state: &mut State) {
        self.run_stage(
            Stage::Hear,
            state,
            complete_hook(|_b: &mut State| Box::pin(async { Ok(()) })),
        )
        .await;
    }

    async fn listen(&self, state: &mut State) {
        let plan = self.branch_plan(Stage::Listen, &state.message);
        if plan.is_empty() {
            return;
        }
        self.run_stage(Stage::Listen, state, branch_complete(Stage::Listen, plan))
            .await;
    }

    async fn understand(&self, state: &mut State) {
        let text_len = state
            .message
            .text_content()
            .map(|t| t.chars().count())
            .unwrap_or(0);
        if text_len == 0 || state.has_match() {
            return;
        }
        if text_len < self.bot.settings.nlu_min_length {
            log::debug!(
                "[thought] text below nlu minimum length ({} < {})",
                text_len,
                self.bot.settings.nlu_min_length
            );
            return;
        }
        if self.bot.adapters.nlu().is_none() {
            return;
        }
        let plan = self.branch_plan(Stage::Understand, &state.message);
        if plan.is_empty() {
            return;
        }
        let complete = complete_hook(move |b: &mut State| {
            Box::pin(async move {
                if b.nlu.is_none() {
                    if let Some(adapter) = b.bot.adapters.nlu() {
                        let timeout = b.bot.settings.request_timeout;
                        match with_timeout(timeout, adapter.process(&b.message)).await {
                            Ok(Ok(result)) => b.nlu = result,
                            Ok(Err(err)) => {
                                log::error!("[thought] nlu processing failed: {err}")
                            }
                            Err(err) => log::error!("[thought] {err}"),
                        }
                    }
                }
                evaluate_branches(Stage::Understand, plan, b).await;
                Ok(())
            })
        });
        self.run_stage(Stage::Understand, state, complete).await;
    }

    async fn serve_stage(&self, state: &mut State) {
        let plan: Vec<(Option<String>, Branch)> = self
            .bot
            .global_branches(Stage::Serve)
            .into_iter()
            .map(|b| (None, b))
            .collect();
        if plan.is_empty() {
            return;
        }
        self.run_stage(Stage::Serve, state, branch_complete(Stage::Serve, plan))
            .await;
    }

    async fn act(&self, state: &mut State) {
        if state.has_match() || state.message.is_catch_all() {
            return;
        }
        // The unmatched message is always re-wrapped for the act stage,
        // whether or not any act branches are registered.
        let original = state.message.clone();
        state.message = Message::catch_all(original);
        let plan: Vec<(Option<String>, Branch)> = self
            .bot
            .global_branches(Stage::Act)
            .into_iter()
            .map(|b| (None, b))
            .collect();
        self.run_stage(Stage::Act, state, branch_complete(Stage::Act, plan))
            .await;
    }

    async fn respond(&self, state: &mut State) {
        let complete = complete_hook(|b: &mut State| {
            Box::pin(async move {
                let sent = b.dispatch_envelopes().await?;
                log::debug!("[thought] dispatched {sent} envelope(s)");
                Ok(())
            })
        });
        self.run_stage(Stage::Respond, state, complete).await;
    }

    async fn remember(&self, state: &mut State) {
        let complete = complete_hook(|b: &mut State| {
            Box::pin(async move {
                if b.message.user.id != "system" {
                    b.bot.memory.remember_user(&b.message.user);
                }
                if b.message.room.id != "direct" {
                    b.bot.memory.remember_room(&b.message.room);
                }
                if let Some(storage) = b.bot.adapters.storage() {
                    let timeout = b.bot.settings.request_timeout;
                    let record = interaction_record(b);
                    match with_timeout(timeout, storage.keep("states", record)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            log::error!("[thought] interaction persist failed: {err}")
                        }
                        Err(err) => log::error!("[thought] {err}"),
                    }
                }
                Ok(())
            })
        });
        self.run_stage(Stage::Remember, state, complete).await;
    }

    /// The ordered branches to evaluate for a stage: applicable scene
    /// branches first, then the global path. When a scene supplies branches
    /// for the stage, attention narrows and only forced global branches
    /// join the plan.
    fn branch_plan(&self, stage: Stage, message: &Message) -> Vec<(Option<String>, Branch)> {
        let mut plan: Vec<(Option<String>, Branch)> = Vec::new();
        for (scene_id, branches) in self.bot.scene_branches(stage, message) {
            for branch in branches {
                plan.push((Some(scene_id.clone()), branch));
            }
        }
        if plan.is_empty() {
            for branch in self.bot.global_branches(stage) {
                plan.push((None, branch));
            }
        } else {
            let mut narrowed = self.bot.global_path();
            if narrowed.forced(stage) > 0 {
                for branch in narrowed.branches(stage) {
                    plan.push((None, branch.clone()));
                }
            }
        }
        plan
    }
}

/// Build a stage completion hook that evaluates a branch plan.
fn branch_complete(stage: Stage, plan: Vec<(Option<String>, Branch)>) -> CompleteFn {
    complete_hook(move |b: &mut State| {
        Box::pin(async move {
            evaluate_branches(stage, plan, b).await;
            Ok(())
        })
    })
}

/// Evaluate branches in plan order. A branch is skipped once the stage has
/// a match, unless it is forced. Execution errors are logged and do not
/// stop the stage. Scenes whose branches matched are discarded afterwards.
async fn evaluate_branches(stage: Stage, plan: Vec<(Option<String>, Branch)>, state: &mut State) {
    let mut matched_scenes: Vec<String> = Vec::new();
    for (scene_id, branch) in plan {
        if state.has_match_at(stage) && !branch.force {
            continue;
        }
        if branch.matches(state).await {
            log::debug!("[thought] branch {} matched at {stage}", branch.id);
            if let Err(err) = branch.execute(state).await {
                log::error!("[thought] {err}");
            }
            if let Some(id) = scene_id {
                if !matched_scenes.contains(&id) {
                    matched_scenes.push(id);
                }
            }
        }
    }
    if !matched_scenes.is_empty() {
        state.bot.remove_scenes(&matched_scenes);
    }
}

fn interaction_record(state: &State) -> Value {
    let matched: Vec<Value> = state
        .matched()
        .iter()
        .map(|record| {
            json!({
                "branch": record.branch_id,
                "stage": record.stage.to_string(),
                "captured": record.captured,
                "time": record.time.to_rfc3339(),
            })
        })
        .collect();
    json!({
        "id": state.id,
        "message": state.message,
        "matched": matched,
        "dispatched": state.dispatched_envelopes().len(),
    })
}
