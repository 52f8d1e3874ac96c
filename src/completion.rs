use std::future::Future;
use std::pin::Pin;

use crate::error::CompletionError;
use crate::model::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    Done,
}

pub type FragmentFuture<'a> = Pin<Box<dyn Future<Output = Result<StreamEvent, CompletionError>> + 'a>>;

/// One assistant reply arriving piece by piece.
///
/// Yields [`StreamEvent::Done`] once the upstream signals completion and keeps
/// yielding it afterwards.
pub trait FragmentStream {
    fn next_event<'a>(&'a mut self) -> FragmentFuture<'a>;
}

pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Box<dyn FragmentStream>, CompletionError>> + 'a>>;

pub trait CompletionClient {
    /// Starts a streamed completion for `messages`. The request is fully built
    /// before the returned stream is handed out, so the stream does not borrow
    /// the messages.
    fn send<'a>(&'a self, messages: &'a [Message], model: &'a str) -> CompletionFuture<'a>;
}
