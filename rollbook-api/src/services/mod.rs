//! Domain services: reconciliation, aggregation, and the chat translator

pub mod llm;
pub mod reconciler;
pub mod stats;
pub mod translator;
