use super::*;
use serde_json::json;

const FENCED_NAMES: &str = "Here is the data: ```json\n{\"characters\": \"Alice, Bob\"}\n```";
const VALID_CAST: &str = r#"{"characters": [{"name": "Alice", "description": "a cartographer"}, {"name": "Bob", "description": "her rival"}]}"#;

struct Harness {
    model: Arc<ReplayModel>,
    sink: Arc<MemorySink>,
    reconciler: Reconciler,
}

fn harness(responses: &[&str], config: ReconcileConfig) -> Harness {
    harness_with(RoleSchemas::builtin().unwrap(), responses, config)
}

fn harness_with(registry: RoleSchemas, responses: &[&str], config: ReconcileConfig) -> Harness {
    let model = Arc::new(ReplayModel::new(responses.iter().copied()));
    let sink = Arc::new(MemorySink::new());
    let reconciler = Reconciler::new(Arc::new(registry), model.clone(), &config)
        .with_sink(sink.clone());
    Harness {
        model,
        sink,
        reconciler,
    }
}

fn strict(max_retries: u32) -> ReconcileConfig {
    ReconcileConfig {
        max_retries,
        empty_arrays_incomplete: true,
        ..ReconcileConfig::default()
    }
}

fn structured(result: Result<Reconciled, ReconcileError>) -> Reconciliation {
    match result {
        Ok(Reconciled::Structured(reconciliation)) => reconciliation,
        other => panic!("expected structured result, got {:?}", other),
    }
}

#[tokio::test]
async fn valid_response_succeeds_on_first_attempt() {
    let h = harness(&[], ReconcileConfig::default());
    let out = structured(h.reconciler.reconcile("character_extractor", VALID_CAST).await);

    assert_eq!(out.attempts, 1);
    assert!(out.log.is_empty());
    assert_eq!(h.model.calls(), 0);
    match out.artifact {
        Artifact::Normalized { value } => assert_eq!(value["characters"][1]["name"], "Bob"),
        other => panic!("unexpected artifact {:?}", other),
    }
}

#[tokio::test]
async fn scalar_names_trigger_one_compensation_then_succeed() {
    let h = harness(&[VALID_CAST], strict(2));
    let out = structured(h.reconciler.reconcile("character_extractor", FENCED_NAMES).await);

    assert_eq!(out.attempts, 2);
    assert_eq!(h.model.calls(), 1);
    assert_eq!(out.log.len(), 1);
    assert_eq!(
        out.log.entries()[0].defect,
        Defect::MissingFields {
            fields: vec!["characters".to_string()]
        }
    );
    assert!(h.model.prompts()[0].contains("- characters"));
    assert_eq!(out.artifact.value()["characters"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_required_array_fails_loudly_when_budget_runs_out() {
    let h = harness(&[FENCED_NAMES], strict(1));
    let err = h
        .reconciler
        .reconcile("character_extractor", FENCED_NAMES)
        .await
        .unwrap_err();

    assert_eq!(err.missing_fields(), ["characters".to_string()]);
    assert!(err.to_string().contains("could not produce valid structured output"));
    assert_eq!(h.model.calls(), 1);
    assert!(h.sink.messages().contains(&"incomplete after repair".to_string()));
}

#[tokio::test]
async fn lenient_policy_accepts_empty_array() {
    let h = harness(&[], ReconcileConfig::default());
    let out = structured(h.reconciler.reconcile("character_extractor", FENCED_NAMES).await);

    assert_eq!(h.model.calls(), 0);
    assert_eq!(
        out.artifact,
        Artifact::Normalized {
            value: json!({"characters": []})
        }
    );
}

#[tokio::test]
async fn never_parsing_response_degrades_to_skeleton() {
    let prose = "I'm sorry, I can't format that as JSON.";
    let h = harness(&[prose, prose], ReconcileConfig::default());
    let out = structured(h.reconciler.reconcile("outline_planner", prose).await);

    assert_eq!(out.attempts, 3);
    assert_eq!(
        out.artifact,
        Artifact::Skeleton {
            value: json!({"title": "", "chapters": []})
        }
    );
    let attempts: Vec<usize> = out.log.entries().iter().map(|e| e.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);
    assert!(matches!(
        out.log.entries()[0].defect,
        Defect::ParseError { .. }
    ));
    assert!(h.model.prompts()[0].contains("I'm sorry, I can't format that as JSON."));
    assert!(h.sink.messages().contains(&"degraded to skeleton".to_string()));
}

#[tokio::test]
async fn earlier_parsed_attempt_is_salvaged_after_parse_failures() {
    let partial = r#"{"chapters": [{"title": "One", "summary": "Fog rolls in"}]}"#;
    let h = harness(&["not json", "still not json"], ReconcileConfig::default());
    let out = structured(h.reconciler.reconcile("outline_planner", partial).await);

    assert_eq!(
        out.artifact,
        Artifact::Salvaged {
            value: json!({"title": "", "chapters": [{"title": "One", "summary": "Fog rolls in"}]}),
            source: SalvageSource::RecoveredParse,
        }
    );
    assert!(h.sink.messages().contains(&"salvaged".to_string()));
}

#[tokio::test]
async fn truncated_final_response_is_salvaged() {
    let truncated = r#"{"title": "Dusk", "chapters": [{"title": "One", "summary": "The fog"#;
    let h = harness(&[], strict(0));
    let out = structured(h.reconciler.reconcile("outline_planner", truncated).await);

    assert_eq!(out.attempts, 1);
    match out.artifact {
        Artifact::Salvaged { value, source } => {
            assert_eq!(source, SalvageSource::RecoveredParse);
            assert_eq!(value["chapters"][0]["summary"], "The fog");
        }
        other => panic!("unexpected artifact {:?}", other),
    }
}

#[tokio::test]
async fn wrong_leaf_types_are_auto_filled_at_budget_end() {
    let loose = r#"{"curve": [{"position": "3", "emotion": "dread", "intensity": "0.8"}]}"#;
    let h = harness(&[loose], ReconcileConfig {
        max_retries: 1,
        ..ReconcileConfig::default()
    });
    let out = structured(h.reconciler.reconcile("emotion_analyst", loose).await);

    assert_eq!(out.log.len(), 1);
    assert_eq!(
        out.log.entries()[0].defect,
        Defect::MissingFields {
            fields: vec![
                "curve[0].position".to_string(),
                "curve[0].intensity".to_string()
            ]
        }
    );
    assert_eq!(
        out.artifact,
        Artifact::Salvaged {
            value: json!({"curve": [{"position": 3, "emotion": "dread", "intensity": 0.8}]}),
            source: SalvageSource::AutoFilled,
        }
    );
    assert!(h.sink.messages().contains(&"auto-filled defaults".to_string()));
}

#[tokio::test]
async fn comma_separated_numbers_are_repaired_not_rejected() {
    let mut registry = RoleSchemas::new();
    registry.insert(
        "scorer",
        Schema::object(
            [("scores".to_string(), Schema::array(Schema::Integer))],
            ["scores".to_string()],
        )
        .unwrap(),
    );
    let listed = r#"{"scores": "1, 2, 3"}"#;
    let h = harness_with(registry, &[listed], ReconcileConfig {
        max_retries: 1,
        ..ReconcileConfig::default()
    });
    let out = structured(h.reconciler.reconcile("scorer", listed).await);

    assert_eq!(out.attempts, 2);
    assert_eq!(
        out.artifact,
        Artifact::Salvaged {
            value: json!({"scores": [1, 2, 3]}),
            source: SalvageSource::AutoFilled,
        }
    );
}

#[tokio::test]
async fn earlier_attempt_is_tried_when_salvaged_tail_stays_incomplete() {
    let untitled = r#"{"chapters": [{"title": "One", "summary": "Fog rolls in"}]}"#;
    let cut_off = r#"{"title": "Dusk", "chapters": ["#;
    let h = harness(&[cut_off], strict(1));
    let out = structured(h.reconciler.reconcile("outline_planner", untitled).await);

    assert_eq!(out.attempts, 2);
    assert_eq!(
        out.artifact,
        Artifact::Salvaged {
            value: json!({"title": "", "chapters": [{"title": "One", "summary": "Fog rolls in"}]}),
            source: SalvageSource::RecoveredParse,
        }
    );
}

#[tokio::test]
async fn model_failure_aborts_the_session() {
    let h = harness(&[], ReconcileConfig::default());
    let err = h
        .reconciler
        .reconcile("line_editor", "{\"suggestions\": 5, \"oops\": }")
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Model(_)));
    assert_eq!(h.model.calls(), 1);
}

#[tokio::test]
async fn unregistered_role_bypasses_reconciliation() {
    let h = harness(&[], ReconcileConfig::default());
    let out = h
        .reconciler
        .reconcile("freeform_chat", "```\nOnce upon a time\n```")
        .await
        .unwrap();

    assert_eq!(out, Reconciled::Unstructured("Once upon a time".to_string()));
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn independent_sessions_run_concurrently() {
    let h = harness(&[], ReconcileConfig::default());
    let edits = r#"{"suggestions": {"original": "teh", "replacement": "the", "reason": "typo"}}"#;
    let (a, b) = futures::join!(
        h.reconciler.reconcile("character_extractor", VALID_CAST),
        h.reconciler.reconcile("line_editor", edits),
    );

    let a = structured(a);
    let b = structured(b);
    assert_ne!(a.session_id, b.session_id);
    assert_eq!(
        b.artifact.value()["suggestions"],
        json!([{"original": "teh", "replacement": "the", "reason": "typo"}])
    );
}
