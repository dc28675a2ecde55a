#![forbid(unsafe_code)]

//! Declarative form modelling on a reactive field graph.
//!
//! A form is described by a [`FormConfig`]: a tree of [`FieldConfig`]s,
//! boolean predicates over the model, and validator engines. Building it
//! with [`AbstractModel::new`] yields a live graph in which
//!
//! - each field's `hidden`/`disabled` flags are [`Decision`]s evaluated over
//!   a cached [`BoolContext`],
//! - [`Relation`]s recompute derived values when their dependencies change,
//!   once per batch,
//! - validation runs per trigger and only the newest result is applied.
//!
//! # Example
//!
//! ```
//! use formula_core::{AbstractModel, D, FieldConfig, FormConfig};
//! use serde_json::json;
//!
//! let form = AbstractModel::new(
//!     FormConfig::new("signup")
//!         .with_bool("isAdult", |m| m.value("age").as_u64().is_some_and(|a| a >= 18))
//!         .with_field(FieldConfig::new("age"))
//!         .with_field(FieldConfig::new("license").with_hidden(D::not("isAdult"))),
//! )
//! .unwrap();
//!
//! let license = form.get_field("license").unwrap();
//! assert!(license.hidden());
//! form.set_field_value("age", json!(21)).unwrap();
//! assert!(!license.hidden());
//! ```

pub mod bools;
pub mod config;
pub mod decision;
pub mod descriptor;
pub mod error;
pub mod expr;
pub mod field;
pub mod form_group;
pub mod graph;
pub mod model;
pub mod operator;
pub mod path;
pub mod relation;
pub mod validation;

pub use bools::{BoolContext, BoolsConfig};
pub use config::{FieldActions, FieldConfig, FormConfig, LifecycleHooks};
pub use decision::{BoolLookup, D, Decision};
pub use descriptor::FieldDescriptor;
pub use error::{FormulaError, Result, ValidationEngineError};
pub use expr::DecisionExpr;
pub use field::{Field, WeakField};
pub use form_group::FormGroup;
pub use graph::FieldGraph;
pub use model::{AbstractModel, FormSnapshot, ModelRef, SubmitOutcome};
pub use operator::{Arity, Operator, OperatorRegistry, register_custom_operator};
pub use relation::{Relation, RelationDeps, define_relation, define_relations};
pub use validation::{
    DiscardReason, ErrorMessage, FieldErrors, Resolver, SyncResolver, ValidateItem,
    ValidationReport, ValidationResult, ValidatorConfig,
};
