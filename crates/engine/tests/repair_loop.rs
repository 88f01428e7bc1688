//! Bounds and feedback behavior of the SQL validate-execute-repair loop,
//! plus the diagnostics short-circuit.

mod common;

use serde_json::json;

use common::{engine, sql_result, FakeSql, FakeStructured, FakeText};

fn classify_metrics(structured: &FakeStructured) {
    structured.push_ok(json!({"agent": "metrics_agent", "reasoning": "data question"}));
}

#[tokio::test]
async fn generation_is_invoked_at_most_three_times() {
    let structured = FakeStructured::new();
    let text = FakeText::new();
    let sql = FakeSql::new();

    classify_metrics(&structured);
    for _ in 0..3 {
        structured.push_ok(json!({
            "sql_query": "DELETE FROM agent_runs",
            "reasoning": "oops"
        }));
    }

    let state = engine(&structured, &text, &sql)
        .advance("show me run data", None)
        .await
        .unwrap();

    // One classification plus exactly three generation attempts; the
    // summary capability is never reached.
    assert_eq!(structured.call_count(), 4);
    assert!(sql.executed().is_empty());
    assert!(!state.has_error);
    let last = state.messages.last().unwrap();
    assert!(last.content.contains("3 attempts"));
    assert!(last.content.contains("DELETE FROM agent_runs"));
    assert!(last.content.contains("SELECT"));
}

#[tokio::test]
async fn validation_failure_is_repaired_with_feedback() {
    let structured = FakeStructured::new();
    let text = FakeText::new();
    let sql = FakeSql::new();

    classify_metrics(&structured);
    structured.push_ok(json!({
        "sql_query": "SELECT * FROM runs_table LIMIT 5",
        "reasoning": "first guess"
    }));
    structured.push_ok(json!({
        "sql_query": "SELECT * FROM agent_runs LIMIT 5",
        "reasoning": "corrected table"
    }));
    structured.push_ok(json!({"summary": "1. a row", "reasoning": "done"}));
    sql.push_ok(sql_result(&["run_id"], vec![vec!["a".into()]]));

    let state = engine(&structured, &text, &sql)
        .advance("show me run data", None)
        .await
        .unwrap();

    assert!(!state.has_error);
    assert_eq!(sql.executed(), vec!["SELECT * FROM agent_runs LIMIT 5"]);
    // The repair call carried the failed SQL and the check failure.
    let repair_call = structured.call(2);
    let feedback = &repair_call.last().unwrap().content;
    assert!(feedback.contains("runs_table"));
    assert!(feedback.contains("agent_runs, call_model, call_tool, call_chain"));
}

#[tokio::test]
async fn execution_failure_shares_the_repair_path() {
    let structured = FakeStructured::new();
    let text = FakeText::new();
    let sql = FakeSql::new();

    classify_metrics(&structured);
    structured.push_ok(json!({
        "sql_query": "SELECT missing_column FROM agent_runs LIMIT 5",
        "reasoning": "guess"
    }));
    structured.push_ok(json!({
        "sql_query": "SELECT run_id FROM agent_runs LIMIT 5",
        "reasoning": "existing column"
    }));
    structured.push_ok(json!({"summary": "1. a row", "reasoning": "done"}));
    sql.push_err("no such column: missing_column");
    sql.push_ok(sql_result(&["run_id"], vec![vec!["a".into()]]));

    let state = engine(&structured, &text, &sql)
        .advance("show me run data", None)
        .await
        .unwrap();

    assert!(!state.has_error);
    assert_eq!(sql.executed().len(), 2);
    let call = structured.call(2);
    let feedback = &call.last().unwrap().content;
    assert!(feedback.contains("no such column"));
}

#[tokio::test]
async fn missing_limit_gets_the_default_cap() {
    let structured = FakeStructured::new();
    let text = FakeText::new();
    let sql = FakeSql::new();

    classify_metrics(&structured);
    structured.push_ok(json!({
        "sql_query": "SELECT run_id FROM agent_runs",
        "reasoning": "no limit supplied"
    }));
    structured.push_ok(json!({"summary": "done", "reasoning": "done"}));
    sql.push_ok(sql_result(&["run_id"], vec![]));

    engine(&structured, &text, &sql)
        .advance("show me run data", None)
        .await
        .unwrap();

    assert_eq!(sql.executed(), vec!["SELECT run_id FROM agent_runs LIMIT 100"]);
}

#[tokio::test]
async fn empty_overall_step_skips_to_the_summary() {
    let structured = FakeStructured::new();
    let text = FakeText::new();
    let sql = FakeSql::new();

    // Only the overall step runs: generation + summary, zero rows back.
    structured.push_ok(json!({
        "sql_query": "SELECT 'w' AS window_label, AVG(tool_latency_ms) AS avg_value \
                      FROM call_tool LIMIT 10",
        "reasoning": "overall comparison"
    }));
    structured.push_ok(json!({"summary": "no rows", "reasoning": "nothing to compare"}));
    sql.push_ok(sql_result(&["window_label", "avg_value"], vec![]));

    let state = engine(&structured, &text, &sql)
        .advance("why did latency spike in the last 4 hours", None)
        .await
        .unwrap();

    // by_tool and by_agent never ran.
    assert_eq!(sql.executed().len(), 1);
    assert_eq!(state.diagnostics.results.len(), 1);
    assert_eq!(state.diagnostics.results[0].name, "overall_change");

    // The summary agent still ran, but with no evidence it reports the
    // skip instead of calling the narrative capability.
    assert_eq!(text.call_count(), 0);
    assert!(state
        .messages
        .last()
        .is_some_and(|m| m.content.contains("had no data to compare")));
    assert!(!state.has_error);
}

#[tokio::test]
async fn capability_failure_during_summary_falls_back_to_enumeration() {
    let structured = FakeStructured::new();
    let text = FakeText::new();
    let sql = FakeSql::new();

    classify_metrics(&structured);
    structured.push_ok(json!({
        "sql_query": "SELECT run_id FROM agent_runs LIMIT 2",
        "reasoning": "list runs"
    }));
    // No scripted summary reply: the call fails and the deterministic
    // enumeration takes over.
    sql.push_ok(sql_result(
        &["run_id"],
        vec![vec!["a".into()], vec!["b".into()]],
    ));

    let state = engine(&structured, &text, &sql)
        .advance("show me run data", None)
        .await
        .unwrap();

    assert!(!state.has_error);
    let last = state.messages.last().unwrap();
    assert!(last.content.contains("1. run_id=\"a\""));
    assert!(last.content.contains("2. run_id=\"b\""));
}
