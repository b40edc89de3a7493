//! # botflow
//!
//! A conversational-bot framework. Inbound messages from chat platforms are
//! routed through a staged thought process (`hear → listen → understand →
//! act → respond → remember`, plus `serve` for server events) that decides
//! whether, how, and with what content to respond, remembers state across
//! interactions, and persists it through a pluggable storage backend.
//!
//! The building blocks:
//!
//! - [`conditions`]: declarative match conditions compiled to regexes
//! - [`branches`] and [`paths`]: matchers plus callbacks, grouped by stage
//! - [`middleware`]: interruptible async stacks run at every stage
//! - [`state`] and [`envelopes`]: the per-event record and outgoing queue
//! - [`thought`]: the stage orchestrator
//! - [`memory`]: the key/collection store with storage snapshotting
//! - [`adapters`]: message/NLU/storage collaborator contracts and registry
//! - [`bits`]: reusable micro-dialogues chained into scenes
//! - [`bot`]: the context and lifecycle controller that ties it together

pub mod adapters;
pub mod bits;
pub mod bot;
pub mod branches;
pub mod conditions;
pub mod envelopes;
pub mod errors;
pub mod events;
pub mod memory;
pub mod messages;
pub mod middleware;
pub mod nlu;
pub mod paths;
pub mod settings;
pub mod state;
pub mod thought;

pub use bits::{Bit, SceneScope};
pub use bot::{Bot, BotStatus};
pub use branches::{callback, predicate, Action, Branch, Matcher};
pub use conditions::{Condition, Conditions, ConditionsOptions};
pub use envelopes::{Envelope, Method};
pub use errors::{AdapterError, BranchError, ExpressionError, MiddlewareError};
pub use messages::{Message, MessagePayload, Room, User};
pub use nlu::{NluCriteria, NluCriterion, NluResult};
pub use paths::Path;
pub use settings::Settings;
pub use state::State;
pub use thought::{Scene, Stage, ThoughtProcess};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
