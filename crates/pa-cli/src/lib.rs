//! pamir-assistant: Headless terminal front-end for PamirAI Assistant
//!
//! Reads lines from stdin, maps slash commands onto session orchestrator
//! operations and prints the conversation log as it changes.

pub mod app;
pub mod commands;
pub mod output;
pub mod view;
