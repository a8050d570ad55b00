//! Seam to the pub/sub transport.
//!
//! The exchange engine only ever publishes opaque frames to a named channel;
//! subscription and delivery are wired by the embedding process, which calls
//! [`crate::ChannelManager::handle_message`] from the transport's receive
//! callback on the event-loop thread.

use thiserror::Error;

/// Capability to publish one frame on a named pub/sub channel.
pub trait Transport {
    /// Publish `frame` on `channel`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Publish`] if the transport could not accept the
    /// frame. The exchange treats this as fatal for the current attempt; the
    /// orchestration recovers by restarting with the next epoch.
    fn publish(&self, channel: &str, frame: &[u8]) -> Result<(), TransportError>;
}

/// Failure reported by a [`Transport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport rejected or could not deliver a publish.
    #[error("publish on {channel} failed: {reason}")]
    Publish {
        /// Channel the publish targeted.
        channel: String,
        /// Transport-specific reason.
        reason: String,
    },
}
