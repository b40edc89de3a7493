//! Per-event state: the envelope threaded through every stage.
//!
//! A [`State`] is created by the orchestrator for each inbound message and
//! owned by that invocation until it resolves. It records what matched, what
//! the NLU adapter said, which envelopes are queued for dispatch, and scratch
//! data shared between middleware pieces and branch callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::bot::Bot;
use crate::envelopes::{Envelope, Method};
use crate::errors::{AdapterError, EnvelopeMethodConflict};
use crate::messages::Message;
use crate::nlu::NluResult;
use crate::thought::Stage;

/// One matched branch: which branch, at which stage, with what match data.
#[derive(Debug, Clone)]
pub struct BranchRecord {
    /// Id of the branch that matched.
    pub branch_id: String,
    /// Stage the match happened in.
    pub stage: Stage,
    /// Raw match data from the matcher.
    pub match_data: Value,
    /// Canonical captures, if the matcher produces them.
    pub captured: Value,
    /// When the match was recorded.
    pub time: DateTime<Utc>,
}

/// The mutable envelope threaded through all stages of one thought process.
pub struct State {
    /// Unique state id.
    pub id: String,
    /// The bot context this state runs under.
    pub bot: Arc<Bot>,
    /// The message being processed. Replaced by the catch-all wrapper when
    /// the act stage re-evaluates an unmatched message.
    pub message: Message,
    /// Stage currently executing.
    pub stage: Option<Stage>,
    /// Cached NLU result, populated once by the understand stage.
    pub nlu: Option<NluResult>,
    /// Set by middleware to terminate further stages.
    pub done: bool,
    /// Scratch storage for middleware and callbacks.
    pub scratch: HashMap<String, Value>,
    matched: Vec<BranchRecord>,
    envelopes: Vec<Envelope>,
    dispatched: Vec<Envelope>,
}

impl State {
    /// Create a state for an inbound message.
    pub fn new(bot: Arc<Bot>, message: Message) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bot,
            message,
            stage: None,
            nlu: None,
            done: false,
            scratch: HashMap::new(),
            matched: Vec::new(),
            envelopes: Vec::new(),
            dispatched: Vec::new(),
        }
    }

    /// Create a state for a bot-initiated envelope (no inbound message).
    pub fn for_dispatch(bot: Arc<Bot>, envelope: Envelope) -> Self {
        let mut state = Self::new(bot, Message::server(Value::Null));
        state.envelopes.push(envelope);
        state
    }

    // -----------------------------------------------------------------------
    // Matches
    // -----------------------------------------------------------------------

    /// The matched records, in match order.
    pub fn matched(&self) -> &[BranchRecord] {
        &self.matched
    }

    /// Record a branch match at the current stage.
    pub fn record_match(&mut self, branch_id: &str, match_data: Value, captured: Value) {
        let stage = self.stage.unwrap_or(Stage::Listen);
        self.matched.push(BranchRecord {
            branch_id: branch_id.to_string(),
            stage,
            match_data,
            captured,
            time: Utc::now(),
        });
    }

    /// Whether any branch matched so far.
    pub fn has_match(&self) -> bool {
        !self.matched.is_empty()
    }

    /// Whether any branch matched at the given stage.
    pub fn has_match_at(&self, stage: Stage) -> bool {
        self.matched.iter().any(|r| r.stage == stage)
    }

    // -----------------------------------------------------------------------
    // Envelopes
    // -----------------------------------------------------------------------

    /// The envelope currently being composed, creating one addressed back at
    /// the source message if none is pending.
    fn composing(&mut self) -> &mut Envelope {
        if self.envelopes.is_empty() {
            self.envelopes.push(Envelope::responding_to(&self.message));
        }
        self.envelopes.last_mut().expect("envelope just ensured")
    }

    /// Queue strings for the source room (default `send` method).
    pub fn respond<S: AsRef<str>>(&mut self, strings: &[S]) {
        self.composing().write(strings);
    }

    /// Queue strings without touching the method tag.
    pub fn write<S: AsRef<str>>(&mut self, strings: &[S]) {
        self.composing().write(strings);
    }

    /// Queue strings addressed back at the originating user.
    pub fn reply<S: AsRef<str>>(
        &mut self,
        strings: &[S],
    ) -> Result<(), EnvelopeMethodConflict> {
        let envelope = self.composing();
        envelope.write(strings);
        envelope.via(Method::Reply)?;
        Ok(())
    }

    /// Queue an emote.
    pub fn emote<S: AsRef<str>>(
        &mut self,
        strings: &[S],
    ) -> Result<(), EnvelopeMethodConflict> {
        let envelope = self.composing();
        envelope.write(strings);
        envelope.via(Method::Emote)?;
        Ok(())
    }

    /// Queue a reaction to the source message.
    pub fn react<S: AsRef<str>>(
        &mut self,
        strings: &[S],
    ) -> Result<(), EnvelopeMethodConflict> {
        let envelope = self.composing();
        envelope.write(strings);
        envelope.via(Method::React)?;
        Ok(())
    }

    /// Queue a room topic change.
    pub fn topic(&mut self, topic: &str) -> Result<(), EnvelopeMethodConflict> {
        let envelope = self.composing();
        envelope.write(&[topic]);
        envelope.via(Method::Topic)?;
        Ok(())
    }

    /// Queue a fully-formed envelope.
    pub fn queue(&mut self, envelope: Envelope) {
        self.envelopes.push(envelope);
    }

    /// Envelopes waiting for dispatch.
    pub fn pending_envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    /// Envelopes already handed to the message adapter.
    pub fn dispatched_envelopes(&self) -> &[Envelope] {
        &self.dispatched
    }

    /// Flush queued envelopes through the message adapter. Individual
    /// dispatch failures are logged and skipped; the envelope count that
    /// went out is returned.
    pub async fn dispatch_envelopes(&mut self) -> Result<usize, AdapterError> {
        if self.envelopes.is_empty() {
            return Ok(0);
        }
        let adapter = self
            .bot
            .adapters
            .message()
            .ok_or_else(|| AdapterError::Failed(anyhow::anyhow!("no message adapter loaded")))?;
        let timeout = self.bot.settings.request_timeout;
        let mut sent = 0;
        for envelope in std::mem::take(&mut self.envelopes) {
            match crate::adapters::with_timeout(timeout, adapter.dispatch(&envelope)).await {
                Ok(Ok(())) => {
                    sent += 1;
                    self.dispatched.push(envelope);
                }
                Ok(Err(err)) => {
                    log::error!("[state] envelope {} dispatch failed: {err}", envelope.id);
                }
                Err(timeout_err) => {
                    log::error!(
                        "[state] envelope {} dispatch timed out: {timeout_err}",
                        envelope.id
                    );
                }
            }
        }
        Ok(sent)
    }

    // -----------------------------------------------------------------------
    // Scratch
    // -----------------------------------------------------------------------

    /// Store a scratch value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.scratch.insert(key.into(), value);
    }

    /// Read a scratch value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.scratch.get(key)
    }

    /// Terminate further stages after the current one resolves.
    pub fn finish(&mut self) {
        self.done = true;
    }
}
