use colloquy_validators::default_validator_set;

#[tokio::test]
async fn default_set_registers_every_strategy() {
    let set = default_validator_set();
    for name in [
        "contains",
        "not_contains",
        "regex",
        "answer_relevancy",
        "contextual_relevancy",
        "faithfulness",
    ] {
        assert!(set.contains(name), "missing validator: {name}");
    }
}

#[tokio::test]
async fn dispatch_routes_by_type_string() {
    let set = default_validator_set();

    let params = serde_json::json!({ "text": "world", "case_sensitive": false });
    let verdict = set.dispatch("contains", "Hello World", &params).await.unwrap();
    assert!(verdict.passed);
    assert_eq!(verdict.score, Some(1.0));

    let params = serde_json::json!({ "text": "world", "case_sensitive": true });
    let verdict = set.dispatch("contains", "Hello World", &params).await.unwrap();
    assert!(!verdict.passed);
    assert_eq!(verdict.score, Some(0.0));

    let verdict = set
        .dispatch("made_up", "anything", &serde_json::json!({}))
        .await
        .unwrap();
    assert!(!verdict.passed);
    assert!(verdict.details["message"]
        .as_str()
        .unwrap()
        .contains("made_up"));
}
