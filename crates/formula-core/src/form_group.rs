#![forbid(unsafe_code)]

//! Registry of form instances keyed by form id.

use ahash::AHashMap;

use crate::config::FormConfig;
use crate::error::{FormulaError, Result};
use crate::model::AbstractModel;

/// Forms by id. At most one instance per id.
#[derive(Debug, Default)]
pub struct FormGroup {
    forms: AHashMap<String, AbstractModel>,
}

impl FormGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a form from `config` and register it.
    pub fn create(&mut self, config: FormConfig) -> Result<AbstractModel> {
        if self.forms.contains_key(config.id()) {
            return Err(FormulaError::DuplicateForm {
                id: config.id().to_string(),
            });
        }
        let form = AbstractModel::new(config)?;
        self.forms.insert(form.id().to_string(), form.clone());
        tracing::debug!(message = "formula.group.create", id = %form.id(), forms = self.forms.len());
        Ok(form)
    }

    /// Register an existing form under its own id.
    pub fn add(&mut self, form: AbstractModel) -> Result<&mut Self> {
        if self.forms.contains_key(form.id()) {
            return Err(FormulaError::DuplicateForm {
                id: form.id().to_string(),
            });
        }
        self.forms.insert(form.id().to_string(), form);
        Ok(self)
    }

    /// Unregister and return the form called `id`. The form itself is left
    /// intact; call [`AbstractModel::dispose`] to tear it down.
    pub fn remove(&mut self, id: &str) -> Option<AbstractModel> {
        self.forms.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<AbstractModel> {
        self.forms.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.forms.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.forms.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
