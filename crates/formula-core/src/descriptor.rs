#![forbid(unsafe_code)]

//! Plain-data field descriptors.
//!
//! A [`FieldDescriptor`] is the serializable subset of a [`FieldConfig`]:
//! everything except closures. Descriptors are typically loaded from JSON
//! and converted with [`FieldDescriptor::into_config`], which compiles the
//! `hidden`/`disabled` decision expressions against an operator registry.
//!
//! ```json
//! {
//!   "id": "license",
//!   "component": "input",
//!   "hidden": { "not": "isAdult" },
//!   "recoverValueOnShown": true,
//!   "validator": { "initiative": { "submit": [{ "schema": { "required": true } }] } }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FieldConfig;
use crate::error::Result;
use crate::expr::DecisionExpr;
use crate::operator::OperatorRegistry;
use crate::validation::ValidatorConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<DecisionExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<DecisionExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub recover_value_on_hidden: bool,
    #[serde(default)]
    pub recover_value_on_shown: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<FieldDescriptor>,
    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl FieldDescriptor {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a JSON array of descriptors.
    pub fn list_from_json(text: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(text)?)
    }

    /// Compile into a [`FieldConfig`] (recursively).
    pub fn into_config(self, registry: &OperatorRegistry) -> Result<FieldConfig> {
        let mut config = FieldConfig::new(self.id)
            .with_recover_value_on_hidden(self.recover_value_on_hidden)
            .with_recover_value_on_shown(self.recover_value_on_shown)
            .with_validator(self.validator);
        if let Some(component) = self.component {
            config = config.with_component(component);
        }
        if let Some(hidden) = self.hidden {
            config = config.with_hidden(hidden.compile(registry)?);
        }
        if let Some(disabled) = self.disabled {
            config = config.with_disabled(disabled.compile(registry)?);
        }
        if let Some(props) = self.props {
            config = config.with_props(props);
        }
        if let Some(value) = self.default_value {
            config = config.with_default_value(value);
        }
        for child in self.properties {
            config = config.with_property(child.into_config(registry)?);
        }
        Ok(config)
    }

    /// Compile against the process-wide operator registry.
    pub fn into_config_global(self) -> Result<FieldConfig> {
        self.into_config(OperatorRegistry::global())
    }
}
