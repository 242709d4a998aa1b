use crate::models::ExtensionKind;
use crate::validators::r#trait::ExtensionValidator;
use crate::validators::{
    agent::AgentValidator, command::CommandValidator, hook::HookValidator, mcp::McpValidator,
};
use std::sync::Arc;

/// Registry mapping each extension kind to its validator.
///
/// The kind set is closed, so the table is built once at startup; there is
/// no runtime discovery.
pub struct ValidatorRegistry {
    validators: Vec<Arc<dyn ExtensionValidator>>,
}

impl ValidatorRegistry {
    /// Create a registry covering every kind
    pub fn new() -> Self {
        Self {
            validators: vec![
                Arc::new(HookValidator::new()),
                Arc::new(McpValidator::new()),
                Arc::new(AgentValidator::new()),
                Arc::new(CommandValidator::new()),
            ],
        }
    }

    /// The validator for a kind
    pub fn get(&self, kind: ExtensionKind) -> Arc<dyn ExtensionValidator> {
        self.validators
            .iter()
            .find(|v| v.kind() == kind)
            .cloned()
            .unwrap_or_else(|| unreachable!("every kind has a registered validator"))
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
