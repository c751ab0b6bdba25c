//! studi-gateway — HTTP server relaying streamed completions to the widget
//!
//! Exposes the chat endpoint the web widget talks to. Each request drives a
//! lazy token sequence from studi-core and serializes it as server-sent
//! events over a chunked response body.

pub mod relay;
pub mod server;

pub use server::ChatServer;
