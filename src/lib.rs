//! Agent Tasks: lifecycle registry for work delegated between agents.

pub mod agents;
pub mod config;
pub mod context;
pub mod error;
pub mod tasks;
pub mod tools;
