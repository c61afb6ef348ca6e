pub mod hook_runner;
pub mod version_control;

pub use hook_runner::{HookRunnerAgent, HookStage};
pub use version_control::VersionControlAgent;
