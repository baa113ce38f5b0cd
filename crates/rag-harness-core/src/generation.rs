//! Generation service abstraction.
//!
//! A [`Generator`] turns prompt messages into an answer, either whole or as
//! a [`TextStream`] of incremental fragments.
//!
//! # Stream contract
//!
//! A `TextStream` is finite (it ends when the model signals completion),
//! consumed once, and not restartable. Dropping it before the end must
//! cancel the underlying generation: implementations own their transport
//! inside the stream so that drop releases it.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::models::ChatMessage;

/// Incremental answer fragments. An `Err` item ends the stream.
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier reported in stats and health output.
    fn model_name(&self) -> &str;

    /// Produce a complete answer.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Start generation and return the fragment stream.
    async fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TextStream>;
}
