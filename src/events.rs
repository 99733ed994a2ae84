//! Events emitted by an in-flight assistant request.

use crate::adapter::AdapterError;
use crate::chat::ChatMessage;

/// Stream protocol between the adapter task and the conversation manager.
///
/// `Delta` fragments arrive in stream order and are the only place partial
/// output becomes visible; exactly one `Completed` or `Failed` terminates the
/// stream.
#[derive(Debug)]
pub enum AssistantEvent {
    /// Decoded text fragment from the streaming reply.
    Delta(String),
    /// Final assembled assistant message.
    Completed(ChatMessage),
    /// The request failed; `AdapterError::Cancelled` must unwind silently.
    Failed(AdapterError),
}
