//! Interruptible async middleware stacks.
//!
//! Each stage of the thought process owns a [`Middleware`]: an ordered list
//! of pieces executed sequentially over the state. A piece resolves to
//! [`PieceFlow::Continue`] to pass control on, or [`PieceFlow::Interrupt`]
//! to stop the stack, in which case the stage's completion hook never runs.
//!
//! A piece can also push cleanup continuations onto the execution context;
//! they drain in LIFO order after the completion hook (or after an
//! interrupt, in its place).

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::errors::MiddlewareError;
use crate::state::State;

/// What a piece decided about the rest of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceFlow {
    /// Run the next piece (then the completion hook).
    Continue,
    /// Stop here; no further piece and no completion hook.
    Interrupt,
}

/// A deferred continuation run after the completion hook, in LIFO order.
pub type CleanupFn = Box<dyn for<'a> FnOnce(&'a mut State) -> BoxFuture<'a, ()> + Send>;

/// One function in a middleware stack.
pub type Piece = Arc<
    dyn for<'a> Fn(
            &'a mut State,
            &'a mut PieceContext,
        ) -> BoxFuture<'a, Result<PieceFlow, anyhow::Error>>
        + Send
        + Sync,
>;

/// The completion hook a stage supplies; runs only when every piece
/// continued.
pub type CompleteFn =
    Box<dyn for<'a> FnOnce(&'a mut State) -> BoxFuture<'a, Result<(), anyhow::Error>> + Send>;

/// Coerce a closure into a [`Piece`].
pub fn piece<F>(f: F) -> Piece
where
    F: for<'a> Fn(
            &'a mut State,
            &'a mut PieceContext,
        ) -> BoxFuture<'a, Result<PieceFlow, anyhow::Error>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Coerce a closure into a [`CleanupFn`].
pub fn cleanup<F>(f: F) -> CleanupFn
where
    F: for<'a> FnOnce(&'a mut State) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// Coerce a closure into a [`CompleteFn`].
pub fn complete_hook<F>(f: F) -> CompleteFn
where
    F: for<'a> FnOnce(&'a mut State) -> BoxFuture<'a, Result<(), anyhow::Error>> + Send + 'static,
{
    Box::new(f)
}

/// Per-execution context handed to every piece.
#[derive(Default)]
pub struct PieceContext {
    cleanups: Vec<CleanupFn>,
}

impl PieceContext {
    /// Push a continuation to run after the completion hook. Continuations
    /// drain newest-first.
    pub fn defer(&mut self, cleanup: CleanupFn) {
        self.cleanups.push(cleanup);
    }

    async fn drain(&mut self, state: &mut State) {
        while let Some(cleanup) = self.cleanups.pop() {
            cleanup(state).await;
        }
    }
}

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareOutcome {
    /// Every piece continued and the completion hook ran.
    Completed,
    /// A piece interrupted the stack; the completion hook did not run.
    Interrupted,
}

/// An ordered, interruptible stack of pieces for one stage.
#[derive(Clone)]
pub struct Middleware {
    kind: String,
    pieces: Vec<Piece>,
}

impl Middleware {
    /// Create an empty stack tagged with its stage kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            pieces: Vec::new(),
        }
    }

    /// The stage kind this stack belongs to.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Append a piece. Pieces run in registration order.
    pub fn register(&mut self, piece: Piece) {
        self.pieces.push(piece);
    }

    /// Number of registered pieces.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Whether the stack has no pieces.
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Run the stack over the state, then the completion hook, then any
    /// deferred continuations. Starts on the next turn of the task queue so
    /// the registering frame always completes first.
    pub async fn execute(
        &self,
        state: &mut State,
        complete: CompleteFn,
    ) -> Result<MiddlewareOutcome, MiddlewareError> {
        tokio::task::yield_now().await;
        let mut context = PieceContext::default();
        for piece in &self.pieces {
            match piece(state, &mut context).await {
                Ok(PieceFlow::Continue) => {}
                Ok(PieceFlow::Interrupt) => {
                    log::debug!("[middleware] '{}' interrupted", self.kind);
                    context.drain(state).await;
                    return Ok(MiddlewareOutcome::Interrupted);
                }
                Err(source) => {
                    let err = MiddlewareError {
                        middleware: self.kind.clone(),
                        source,
                    };
                    log::error!("[middleware] {err}");
                    return Err(err);
                }
            }
        }
        if let Err(source) = complete(state).await {
            let err = MiddlewareError {
                middleware: self.kind.clone(),
                source,
            };
            log::error!("[middleware] completion hook failed: {err}");
            return Err(err);
        }
        context.drain(state).await;
        Ok(MiddlewareOutcome::Completed)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Middleware({}, {} pieces)", self.kind, self.pieces.len())
    }
}
