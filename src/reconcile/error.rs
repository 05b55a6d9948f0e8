/// Failures a reconciliation session surfaces to its caller.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Validation still failed after every retry and the final repair pass.
    #[error(
        "could not produce valid structured output for role '{role}' (missing: {})",
        missing_fields.join(", ")
    )]
    Incomplete {
        role: String,
        missing_fields: Vec<String>,
    },
    /// The model call itself failed; passed through untouched.
    #[error("model call failed: {0}")]
    Model(#[source] anyhow::Error),
}

impl ReconcileError {
    pub fn missing_fields(&self) -> &[String] {
        match self {
            ReconcileError::Incomplete { missing_fields, .. } => missing_fields,
            ReconcileError::Model(_) => &[],
        }
    }
}
