//! Built-in shell message adapter.
//!
//! Prints dispatched envelopes to standard output. This is the default
//! message adapter so a bot is usable before any platform adapter is
//! configured, and it doubles as a harness for local experiments.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::adapters::{Adapter, MessageAdapter};
use crate::envelopes::Envelope;

/// Registry name of the shell adapter.
pub const NAME: &str = "shell";

/// Message adapter writing to standard output.
#[derive(Default)]
pub struct ShellAdapter {
    dispatched: AtomicUsize,
}

impl ShellAdapter {
    /// Create a shell adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes dispatched so far.
    pub fn sent(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for ShellAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), anyhow::Error> {
        log::info!("[shell] ready for output");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), anyhow::Error> {
        log::info!("[shell] closed");
        Ok(())
    }
}

#[async_trait]
impl MessageAdapter for ShellAdapter {
    async fn dispatch(&self, envelope: &Envelope) -> Result<(), anyhow::Error> {
        let target = envelope
            .room
            .as_ref()
            .map(|r| r.id.clone())
            .or_else(|| envelope.user.as_ref().map(|u| u.id.clone()))
            .unwrap_or_else(|| "-".to_string());
        for line in &envelope.strings {
            println!("[{}] {} {}", target, envelope.method(), line);
        }
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Room;

    #[tokio::test]
    async fn test_dispatch_counts() {
        let adapter = ShellAdapter::new();
        let envelope = Envelope::new()
            .to_room(Room::new("general"))
            .compose(&["one", "two"]);
        adapter.dispatch(&envelope).await.unwrap();
        adapter.dispatch(&envelope).await.unwrap();
        assert_eq!(adapter.sent(), 2);
    }
}
