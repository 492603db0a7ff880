//! Module-type schemas and the schema registry.
//!
//! Every module type known to the engine carries a UI-facing schema: a
//! label, a category, a description, and an ordered list of config field
//! definitions with defaults. The registry answers "do you know type X?"
//! and supplies the defaults used to synthesise missing config sections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Schema model
// =============================================================================

/// The kind of a config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free-form string.
    String,
    /// Integer or float.
    Number,
    /// Boolean flag.
    Bool,
    /// Ordered list.
    Array,
    /// String-keyed mapping.
    Map,
    /// Arbitrary JSON value.
    Json,
    /// One of a fixed set of options.
    Select,
}

/// One config field definition within a module schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigField {
    /// Config key.
    pub key: String,
    /// UI label.
    pub label: String,
    /// Field kind.
    pub kind: FieldKind,
    /// Whether the field must be supplied.
    #[serde(default)]
    pub required: bool,
    /// Default value when absent.
    #[serde(default)]
    pub default: Option<Value>,
    /// Options for `Select` fields.
    #[serde(default)]
    pub options: Vec<String>,
    /// Optional UI grouping hint.
    #[serde(default)]
    pub group: Option<String>,
    /// Optional "inherit from this other key" hint.
    #[serde(default)]
    pub inherit_from: Option<String>,
}

impl ConfigField {
    /// Creates a field with the key doubling as label.
    pub fn new(key: impl Into<String>, kind: FieldKind) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            kind,
            required: false,
            default: None,
            options: Vec::new(),
            group: None,
            inherit_from: None,
        }
    }

    /// Sets the UI label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Marks the field required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the default value.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the option list for a `Select` field.
    pub fn options(mut self, options: impl IntoIterator<Item = &'static str>) -> Self {
        self.options = options.into_iter().map(String::from).collect();
        self
    }

    /// Sets the grouping hint.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// UI-facing description of a module type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSchema {
    /// Display label.
    pub label: String,
    /// Category tag (`transport`, `storage`, `observability`, …).
    pub category: String,
    /// Textual description.
    pub description: String,
    /// Ordered config field definitions.
    #[serde(default)]
    pub fields: Vec<ConfigField>,
    /// Input port names.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Output port names.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Named configuration section this module type expects the engine to
    /// register (`auth`, `database`, `scheduler`, `httpserver`, …).
    #[serde(default)]
    pub config_section: Option<String>,
}

impl ModuleSchema {
    /// Creates a schema with no fields.
    pub fn new(
        label: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            category: category.into(),
            description: description.into(),
            fields: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config_section: None,
        }
    }

    /// Adds a field definition.
    pub fn field(mut self, field: ConfigField) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares the named config section this module type expects.
    pub fn config_section(mut self, section: impl Into<String>) -> Self {
        self.config_section = Some(section.into());
        self
    }

    /// Builds a sensible default config section from the field defaults.
    pub fn default_section(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|f| f.default.clone().map(|d| (f.key.clone(), d)))
            .collect();
        Value::Object(map)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Errors from schema registration.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A module type is already owned by another plugin.
    #[error("module type '{module_type}' already registered")]
    DuplicateType {
        /// The conflicting type tag.
        module_type: String,
    },

    /// The registry has been frozen.
    #[error("schema registry is frozen")]
    Frozen,
}

/// Engine-wide map of module type → schema.
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, ModuleSchema>>,
    frozen: AtomicBool,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Registers the schema for a module type. Duplicate types fail.
    pub fn register(&self, module_type: &str, schema: ModuleSchema) -> Result<(), SchemaError> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(SchemaError::Frozen);
        }
        let mut schemas = self.schemas.write();
        if schemas.contains_key(module_type) {
            return Err(SchemaError::DuplicateType {
                module_type: module_type.to_string(),
            });
        }
        schemas.insert(module_type.to_string(), schema);
        Ok(())
    }

    /// Freezes the registry; further registration fails.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    /// Returns whether the type is known.
    pub fn knows(&self, module_type: &str) -> bool {
        self.schemas.read().contains_key(module_type)
    }

    /// Returns the schema for a module type.
    pub fn get(&self, module_type: &str) -> Option<ModuleSchema> {
        self.schemas.read().get(module_type).cloned()
    }

    /// Returns all known module types, sorted.
    pub fn known_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.schemas.read().keys().cloned().collect();
        types.sort();
        types
    }
}
