// src/error.rs
// Typed errors for the crate boundary; internal paths use anyhow.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedpilotError {
    /// The filter endpoint could not be reached or answered non-2xx.
    #[error("filter transport error: {0}")]
    OracleTransport(#[from] reqwest::Error),

    /// The filter endpoint answered, but not with the shape we asked for.
    #[error("malformed filter response: {0}")]
    OracleResponse(String),

    /// A persisted value failed to encode or decode.
    #[error("store codec error: {0}")]
    StoreCodec(#[from] serde_json::Error),

    /// The peer context was torn down (page navigation) before answering.
    #[error("messaging peer is gone")]
    PeerGone,
}
