//! Structured-output reconciliation for model responses.
//!
//! Raw text is parsed, reshaped to the role's schema, validated, and, when it
//! falls short, sent back to the model with a description of the defect. The
//! retry budget is fixed; once it is spent the session salvages what it can or
//! returns a skeleton.

pub mod controller;
pub mod defaults;
pub mod error;
pub mod log;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod prompts;
pub mod registry;
pub mod repair;
pub mod sanitize;
pub mod schema;
pub mod strategies;
pub mod validate;

#[cfg(test)]
mod tests;

pub use controller::{Artifact, Attempt, Controller, Reconciliation, SalvageSource, Verdict};
pub use error::ReconcileError;
pub use log::{CompensationLog, Defect, LogSink, MemorySink, NullSink, TracingSink};
pub use model::{ModelClient, ReplayModel};
pub use registry::{RoleSchemas, SchemaRegistry};
pub use schema::{Schema, SchemaError};
pub use validate::{RequiredFieldValidator, SchemaValidator, Validation, ValidatorPolicy};

use crate::config::ReconcileConfig;
use std::sync::Arc;

/// What a role gets back.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Structured(Reconciliation),
    /// The role has no schema; the response was only stripped of code fences.
    Unstructured(String),
}

/// Collaborators and settings shared by every session.
///
/// Holds no per-session state, so one instance can serve concurrent sessions.
pub struct Reconciler {
    registry: Arc<dyn SchemaRegistry>,
    validator: Arc<dyn SchemaValidator>,
    model: Arc<dyn ModelClient>,
    sink: Arc<dyn LogSink>,
    budget: controller::Budget,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn SchemaRegistry>,
        model: Arc<dyn ModelClient>,
        config: &ReconcileConfig,
    ) -> Self {
        Self {
            registry,
            validator: Arc::new(RequiredFieldValidator::new(config.validator_policy())),
            model,
            sink: Arc::new(TracingSink),
            budget: config.budget(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Reconcile `initial` for `role`, or pass it through if the role has no schema.
    pub async fn reconcile(
        &self,
        role: &str,
        initial: impl Into<String>,
    ) -> Result<Reconciled, ReconcileError> {
        let initial = initial.into();
        let Some(schema) = self.registry.schema_for_role(role) else {
            tracing::debug!(role, "no schema registered; passing response through");
            return Ok(Reconciled::Unstructured(
                sanitize::strip_fences(&initial).trim().to_string(),
            ));
        };

        let controller = Controller {
            model: self.model.as_ref(),
            validator: self.validator.as_ref(),
            sink: self.sink.as_ref(),
            budget: &self.budget,
        };
        controller
            .run(role, &schema, initial)
            .await
            .map(Reconciled::Structured)
    }
}
