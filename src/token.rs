//! Shareable channel handles used as pipeline dependencies.

use crate::channel::Channel;
use crate::error::Result;
use std::sync::Arc;

/// A cheap, clonable handle to a [`Channel`].
///
/// Passing a token between pipeline stages expresses "a channel exists and
/// is safe to use here": a stage that consumes the token runs after the
/// stage that produced it. Dropping the last token does not reset the
/// channel.
#[derive(Debug, Clone)]
pub struct Token(Arc<Channel>);

impl Token {
    /// Wrap a channel.
    pub fn new(channel: Channel) -> Self {
        Self(Arc::new(channel))
    }

    /// The channel this token refers to.
    pub fn channel(&self) -> &Channel {
        &self.0
    }

    /// A token over a duplicate of this token's channel.
    ///
    /// Unlike [`clone`](Clone::clone), the new token does not share a
    /// transport context with this one.
    pub fn duplicate(&self) -> Result<Token> {
        Ok(Token::new(self.0.duplicate()?))
    }

    /// Whether both tokens refer to the same channel.
    pub fn ptr_eq(&self, other: &Token) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Channel> for Token {
    fn from(channel: Channel) -> Self {
        Token::new(channel)
    }
}
