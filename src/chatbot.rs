//! AI chatbot module - trigger matching, message adaptation, orchestration and replies.

mod adapter;
mod graph;
mod handler;
mod reply;
mod segments;
mod service;
mod trigger;

pub use graph::GraphBuilder;
pub use handler::handle_message;
pub use service::{ChatService, ModelFactory};
