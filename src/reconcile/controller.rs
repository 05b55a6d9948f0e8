//! Bounded compensation-retry state machine.
//!
//! Each loop iteration produces an immutable [`Attempt`]; the pure [`decide`]
//! function maps it to a [`Verdict`], and the controller folds attempts until
//! a verdict is terminal. Only the model call suspends.

use super::defaults::synthesize;
use super::error::ReconcileError;
use super::log::{CompensationLog, Defect, LogSink};
use super::model::ModelClient;
use super::normalize::normalize;
use super::parse::{parse_response, salvage, ParseFailure};
use super::prompts::{compensation_prompt, PromptTemplates};
use super::repair::repair_required;
use super::schema::Schema;
use super::validate::{SchemaValidator, Validation};
use crate::util::excerpt;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Result of reading one raw response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Unparsed(ParseFailure),
    /// Parsed and normalized, with the validator's verdict.
    Parsed { value: Value, validation: Validation },
}

/// One iteration of the session. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub index: usize,
    pub raw: String,
    pub outcome: Outcome,
}

impl Attempt {
    pub fn evaluate(
        index: usize,
        raw: String,
        schema: &Schema,
        validator: &dyn SchemaValidator,
    ) -> Self {
        let outcome = match parse_response(&raw) {
            Ok(parsed) => {
                let value = normalize(parsed, schema);
                let validation = validator.validate(&value, schema);
                Outcome::Parsed { value, validation }
            }
            Err(failure) => Outcome::Unparsed(failure),
        };
        Self {
            index,
            raw,
            outcome,
        }
    }

    fn parsed_value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Parsed { value, .. } => Some(value),
            Outcome::Unparsed(_) => None,
        }
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    Compensate(Defect),
    /// Parse failed with no retries left.
    Salvage,
    /// Validation failed with no retries left.
    Repair,
}

/// Pure transition function for the state machine.
pub fn decide(attempt: &Attempt, max_attempts: usize, excerpt_chars: usize) -> Verdict {
    let retries_remain = attempt.index < max_attempts;
    match &attempt.outcome {
        Outcome::Unparsed(failure) if retries_remain => Verdict::Compensate(Defect::ParseError {
            message: failure.message.clone(),
            excerpt: excerpt(&attempt.raw, excerpt_chars),
        }),
        Outcome::Unparsed(_) => Verdict::Salvage,
        Outcome::Parsed { validation, .. } if validation.is_valid => Verdict::Accept,
        Outcome::Parsed { validation, .. } if retries_remain => {
            Verdict::Compensate(Defect::MissingFields {
                fields: validation.missing_fields.clone(),
            })
        }
        Outcome::Parsed { .. } => Verdict::Repair,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SalvageSource {
    /// A late salvage parse (or an earlier parsed attempt) was repaired into shape.
    RecoveredParse,
    /// Parsed fine but incomplete; required fields were filled with defaults.
    AutoFilled,
}

/// The single value a session hands back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Normalized { value: Value },
    Salvaged { value: Value, source: SalvageSource },
    Skeleton { value: Value },
}

impl Artifact {
    pub fn value(&self) -> &Value {
        match self {
            Artifact::Normalized { value }
            | Artifact::Salvaged { value, .. }
            | Artifact::Skeleton { value } => value,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Artifact::Normalized { value }
            | Artifact::Salvaged { value, .. }
            | Artifact::Skeleton { value } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Artifact::Skeleton { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub session_id: Uuid,
    pub role: String,
    pub artifact: Artifact,
    /// Number of attempts evaluated, including the initial response.
    pub attempts: usize,
    pub log: CompensationLog,
}

/// Retry budget and prompt settings for one controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Budget {
    pub max_retries: u32,
    pub excerpt_chars: usize,
    pub templates: PromptTemplates,
}

impl Budget {
    pub fn max_attempts(&self) -> usize {
        1 + self.max_retries as usize
    }
}

/// Folded session state carried between attempts.
struct Session {
    index: usize,
    raw: String,
    log: CompensationLog,
    last_parsed: Option<Value>,
}

impl Session {
    fn start(initial: String) -> Self {
        Self {
            index: 1,
            raw: initial,
            log: CompensationLog::new(),
            last_parsed: None,
        }
    }

    fn next(self, attempt: &Attempt, defect: Defect, raw: String) -> Self {
        Self {
            index: attempt.index + 1,
            raw,
            log: self.log.appended(attempt.index, defect),
            last_parsed: attempt.parsed_value().cloned().or(self.last_parsed),
        }
    }
}

pub struct Controller<'a> {
    pub model: &'a dyn ModelClient,
    pub validator: &'a dyn SchemaValidator,
    pub sink: &'a dyn LogSink,
    pub budget: &'a Budget,
}

impl Controller<'_> {
    /// Reconcile `initial` against `schema`, calling the model for compensation rounds.
    pub async fn run(
        &self,
        role: &str,
        schema: &Schema,
        initial: String,
    ) -> Result<Reconciliation, ReconcileError> {
        let session_id = Uuid::new_v4();
        let max_attempts = self.budget.max_attempts();
        let mut session = Session::start(initial);

        loop {
            let raw = std::mem::take(&mut session.raw);
            let attempt = Attempt::evaluate(session.index, raw, schema, self.validator);
            let verdict = decide(&attempt, max_attempts, self.budget.excerpt_chars);
            tracing::debug!(
                session = %session_id,
                role,
                attempt = attempt.index,
                verdict = ?verdict,
                "evaluated attempt"
            );

            let artifact = match verdict {
                Verdict::Accept => Artifact::Normalized {
                    value: attempt
                        .parsed_value()
                        .cloned()
                        .unwrap_or_else(|| synthesize(schema)),
                },
                Verdict::Compensate(defect) => {
                    tracing::warn!(
                        session = %session_id,
                        role,
                        attempt = attempt.index,
                        "{}",
                        defect.summary()
                    );
                    self.sink.log(
                        role,
                        &format!("compensation round {} of {}", attempt.index, max_attempts - 1),
                        Some(&json!(defect)),
                    );
                    let prompt = compensation_prompt(role, &defect, schema, &self.budget.templates);
                    let regenerated = self
                        .model
                        .complete(&prompt)
                        .await
                        .map_err(ReconcileError::Model)?;
                    session = session.next(&attempt, defect, regenerated);
                    continue;
                }
                Verdict::Salvage => {
                    self.salvage(role, schema, &attempt, session.last_parsed.take())
                }
                Verdict::Repair => self.repair(role, schema, &attempt)?,
            };

            tracing::info!(
                session = %session_id,
                role,
                attempts = attempt.index,
                degraded = artifact.is_degraded(),
                "reconciliation finished"
            );
            return Ok(Reconciliation {
                session_id,
                role: role.to_string(),
                artifact,
                attempts: attempt.index,
                log: session.log,
            });
        }
    }

    fn salvage(
        &self,
        role: &str,
        schema: &Schema,
        attempt: &Attempt,
        last_parsed: Option<Value>,
    ) -> Artifact {
        let candidates = salvage(&attempt.raw)
            .map(|value| normalize(value, schema))
            .into_iter()
            .chain(last_parsed);

        for value in candidates {
            let repaired = repair_required(value, schema);
            if self.validator.validate(&repaired, schema).is_valid {
                self.sink.log(role, "salvaged", Some(&repaired));
                return Artifact::Salvaged {
                    value: repaired,
                    source: SalvageSource::RecoveredParse,
                };
            }
        }

        tracing::warn!(role, attempt = attempt.index, "no parseable response; using skeleton");
        let skeleton = synthesize(schema);
        self.sink.log(role, "degraded to skeleton", Some(&skeleton));
        Artifact::Skeleton { value: skeleton }
    }

    fn repair(
        &self,
        role: &str,
        schema: &Schema,
        attempt: &Attempt,
    ) -> Result<Artifact, ReconcileError> {
        let value = attempt
            .parsed_value()
            .cloned()
            .unwrap_or_else(|| synthesize(schema));
        let repaired = repair_required(value, schema);
        let validation = self.validator.validate(&repaired, schema);
        if validation.is_valid {
            self.sink.log(role, "auto-filled defaults", Some(&repaired));
            return Ok(Artifact::Salvaged {
                value: repaired,
                source: SalvageSource::AutoFilled,
            });
        }

        tracing::warn!(
            role,
            missing = ?validation.missing_fields,
            "required fields still incomplete after repair"
        );
        self.sink.log(
            role,
            "incomplete after repair",
            Some(&json!(validation.missing_fields)),
        );
        Err(ReconcileError::Incomplete {
            role: role.to_string(),
            missing_fields: validation.missing_fields,
        })
    }
}
