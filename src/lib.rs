pub mod bot;
pub mod chatbot;
pub mod commands;
pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod session;
pub mod tools;
pub mod types;

pub use bot::run;
