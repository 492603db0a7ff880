//! Capability contracts and the engine-wide capability registry.
//!
//! A capability is a named interface contract (`http-server`,
//! `message-broker`, …). Plugins declare themselves providers and/or
//! consumers of capabilities; a configuration's `requires.capabilities`
//! block demands that providers be present before the engine builds.
//!
//! The registry is write-once: populated during plugin load, then frozen
//! for the remainder of the engine lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

// =============================================================================
// Contracts and declarations
// =============================================================================

/// One required method of a capability's interface shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Method name.
    pub name: String,
    /// Parameter type tags.
    pub params: Vec<String>,
    /// Return type tags.
    pub returns: Vec<String>,
}

impl MethodSignature {
    /// Creates a method signature.
    pub fn new(
        name: impl Into<String>,
        params: impl IntoIterator<Item = &'static str>,
        returns: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().map(String::from).collect(),
            returns: returns.into_iter().map(String::from).collect(),
        }
    }
}

/// A named capability contract, unique by name within a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityContract {
    /// Capability name (e.g. `http-server`).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Optional interface shape a provider must satisfy.
    pub interface: Option<Vec<MethodSignature>>,
}

impl CapabilityContract {
    /// Creates a contract without an interface shape.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            interface: None,
        }
    }

    /// Attaches an interface shape.
    pub fn with_interface(mut self, methods: Vec<MethodSignature>) -> Self {
        self.interface = Some(methods);
        self
    }
}

/// Which side of a capability a plugin sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityRole {
    /// The plugin provides the capability.
    Provider,
    /// The plugin consumes the capability.
    Consumer,
    /// The plugin both provides and consumes it.
    Both,
}

impl CapabilityRole {
    /// Returns whether this role counts as providing.
    pub fn provides(self) -> bool {
        matches!(self, Self::Provider | Self::Both)
    }
}

/// A plugin-local capability claim.
#[derive(Debug, Clone)]
pub struct CapabilityDeclaration {
    /// Capability name claimed.
    pub capability: String,
    /// Role the plugin plays.
    pub role: CapabilityRole,
    /// Relative priority among providers of the same capability.
    pub priority: i32,
}

impl CapabilityDeclaration {
    /// Declares a provider-role claim.
    pub fn provider(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            role: CapabilityRole::Provider,
            priority: 0,
        }
    }

    /// Declares a consumer-role claim.
    pub fn consumer(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            role: CapabilityRole::Consumer,
            priority: 0,
        }
    }

    /// Sets the claim priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Errors from capability registration.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// A contract name was re-registered with a different interface shape.
    #[error("capability contract conflict for '{name}': interface shape differs")]
    ContractConflict {
        /// Conflicting contract name.
        name: String,
    },

    /// The registry has been frozen.
    #[error("capability registry is frozen")]
    Frozen,
}

/// Engine-wide record of capability contracts and plugin claims.
pub struct CapabilityRegistry {
    contracts: RwLock<HashMap<String, CapabilityContract>>,
    /// Plugin name → declarations, the cross-product of which forms the
    /// claim graph.
    declarations: RwLock<HashMap<String, Vec<CapabilityDeclaration>>>,
    frozen: AtomicBool,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            contracts: RwLock::new(HashMap::new()),
            declarations: RwLock::new(HashMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Registers a capability contract.
    ///
    /// Re-registering an identical contract is a no-op; a conflicting
    /// interface shape is an error.
    pub fn register_contract(&self, contract: CapabilityContract) -> Result<(), CapabilityError> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(CapabilityError::Frozen);
        }
        let mut contracts = self.contracts.write();
        if let Some(existing) = contracts.get(&contract.name) {
            if existing.interface != contract.interface {
                return Err(CapabilityError::ContractConflict {
                    name: contract.name,
                });
            }
            return Ok(());
        }
        debug!(capability = %contract.name, "Capability contract registered");
        contracts.insert(contract.name.clone(), contract);
        Ok(())
    }

    /// Records a plugin's capability declarations.
    pub fn declare(
        &self,
        plugin: &str,
        decls: Vec<CapabilityDeclaration>,
    ) -> Result<(), CapabilityError> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(CapabilityError::Frozen);
        }
        self.declarations
            .write()
            .entry(plugin.to_string())
            .or_default()
            .extend(decls);
        Ok(())
    }

    /// Freezes the registry; further registration fails.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    /// Returns a registered contract by name.
    pub fn contract(&self, name: &str) -> Option<CapabilityContract> {
        self.contracts.read().get(name).cloned()
    }

    /// Returns the plugins providing a capability, highest priority first.
    pub fn providers_of(&self, capability: &str) -> Vec<(String, i32)> {
        let declarations = self.declarations.read();
        let mut providers: Vec<(String, i32)> = declarations
            .iter()
            .flat_map(|(plugin, decls)| {
                decls
                    .iter()
                    .filter(|d| d.capability == capability && d.role.provides())
                    .map(|d| (plugin.clone(), d.priority))
            })
            .collect();
        providers.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        providers
    }

    /// Returns the required capability names with no provider-role
    /// declaration, in input order.
    pub fn missing_providers(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.providers_of(name).is_empty())
            .cloned()
            .collect()
    }
}
