pub mod agent;
pub mod command;
pub mod fragment;
pub mod hook;
pub mod mcp;
pub mod plugin;
pub mod registry;
pub mod r#trait;

pub use agent::AgentValidator;
pub use command::CommandValidator;
pub use fragment::FragmentValidator;
pub use hook::HookValidator;
pub use mcp::McpValidator;
pub use plugin::PluginValidator;
pub use registry::ValidatorRegistry;
pub use r#trait::ExtensionValidator;
