#![forbid(unsafe_code)]

//! Formula public facade crate.
//!
//! Re-exports the reactive runtime and the form model behind one import:
//!
//! ```
//! use formula::prelude::*;
//! use serde_json::json;
//!
//! let form = AbstractModel::new(
//!     FormConfig::new("pet")
//!         .with_bool("hasPet", |model| model.value("pet") != serde_json::Value::Null)
//!         .with_field(FieldConfig::new("pet"))
//!         .with_field(FieldConfig::new("petName").with_hidden(D::not("hasPet"))),
//! )
//! .unwrap();
//!
//! assert!(form.get_field("petName").unwrap().hidden());
//! form.set_field_value("pet", json!("cat")).unwrap();
//! assert!(!form.get_field("petName").unwrap().hidden());
//! ```

pub use formula_core as core;
pub use formula_runtime as runtime;

#[cfg(feature = "tracing-json")]
pub mod logging;

pub mod prelude {
    pub use formula_core::{
        AbstractModel, BoolContext, D, Decision, DecisionExpr, ErrorMessage, Field, FieldConfig, FieldDescriptor,
        FormConfig, FormGroup, FormSnapshot, FormulaError, ModelRef, OperatorRegistry, Relation, Resolver,
        SyncResolver, ValidateItem, ValidationReport, ValidationResult, ValidatorConfig,
    };
    pub use formula_runtime::{Computed, Effect, Observable, batch, untrack};
}
