//! Built-in tools for delegating work and managing delegated tasks.

pub mod delegate;
pub mod task_manager;

pub use delegate::DelegateTool;
pub use task_manager::TaskManagerTool;
