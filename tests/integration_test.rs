use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use quiz_router::clients::{ChatProvider, MockProvider};
use quiz_router::config::Config;
use quiz_router::error::{ErrorCode, GradingError};
use quiz_router::models::{LetterGrade, Question, RequestContext, RouterRequest, Task};
use quiz_router::orchestrator::AiRouter;
use quiz_router::utils::logging;
use quiz_router::workflow::GradingCascade;
use quiz_router::{App, Cli};
use tokio_test::{assert_err, assert_ok};

fn router_with(provider: Arc<MockProvider>) -> Arc<AiRouter> {
    Arc::new(AiRouter::new(provider, Arc::new(Config::default())))
}

fn short(id: &str, prompt: &str, reference: Option<&str>) -> Question {
    Question::Short {
        id: id.to_string(),
        prompt: prompt.to_string(),
        reference: reference.map(str::to_string),
    }
}

fn responses(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(id, answer)| (id.to_string(), answer.to_string()))
        .collect()
}

#[tokio::test]
async fn test_provider_outage_switches_to_fallback_once() {
    logging::init(false);

    let provider = Arc::new(
        MockProvider::new()
            .push_status(503, "upstream overloaded")
            .push_text(r#"{"questions":[]}"#),
    );
    let result = router_with(provider.clone())
        .route(RouterRequest::new(Task::QuizGeneration, "notes"))
        .await;

    assert!(result.success);
    assert!(result.metrics.fallback_triggered);
    assert_eq!(result.metrics.attempt_count, 2);
    assert_eq!(result.metrics.model_used, "gpt-5-mini");
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_auth_error_is_final() {
    let provider = Arc::new(
        MockProvider::new()
            .push_status(401, "invalid api key")
            .push_text("{}"),
    );
    let result = router_with(provider.clone())
        .route(RouterRequest::new(Task::GradeShort, "grade"))
        .await;

    assert!(!result.success);
    assert!(!result.metrics.fallback_triggered);
    assert_eq!(result.metrics.attempt_count, 1);
    let error = result.error.expect("失败结果应带错误");
    assert_eq!(error.code, ErrorCode::AuthError);
    assert!(!error.recoverable);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_reasoning_model_params() {
    let provider = Arc::new(MockProvider::new().push_text("{}"));
    let config = Config {
        grading_default_model: "o3-mini".to_string(),
        ..Config::default()
    };
    let router = AiRouter::new(provider.clone(), Arc::new(config));
    let request = RouterRequest::new(Task::GradeShort, "grade")
        .with_temperature(0.9)
        .with_context(RequestContext {
            correlation_id: Some("reasoning-1".to_string()),
            ..Default::default()
        });

    let result = router.route(request).await;
    assert!(result.success);

    let call = &provider.calls()[0];
    assert_eq!(call.model, "o3-mini");
    assert_eq!(call.params.temperature, None);
    assert_eq!(call.params.max_output_tokens, 2000);
}

#[tokio::test]
async fn test_mixed_batch_aggregates_to_88() {
    let provider = Arc::new(MockProvider::new().push_text(
        r#"```json
{"results":[{"id":"q3","score":0.78,"band":"mostly_correct","why":"Names the organelle but not its role.","improvements":["Say what the organelle produces."],"missing_terms":["ATP"]}]}
```"#,
    ));
    let questions = vec![
        short("q1", "Capital of France?", Some("Paris")),
        short(
            "q2",
            "What does photosynthesis do?",
            Some("photosynthesis converts light into energy"),
        ),
        short("q3", "What is the powerhouse of the cell?", None),
    ];
    let answers = responses(&[
        ("q1", "Paris."),
        ("q2", "photosynthesis converts light energy"),
        ("q3", "mitochondria"),
    ]);

    let report = GradingCascade::new(router_with(provider.clone()))
        .grade_submission(&questions, &answers, Some("batch-1".to_string()))
        .await;
    let report = assert_ok!(report);

    assert_eq!(provider.call_count(), 1);
    assert_eq!(report.percent, 88);
    assert_eq!(report.letter_grade, LetterGrade::B);
    assert_eq!(report.correct_count, 1);

    let scores: Vec<f64> = report.breakdown.iter().map(|b| b.score).collect();
    assert_eq!(scores, vec![1.0, 0.85, 0.78]);
    assert!(report.breakdown[0].correct);
    assert!(!report.breakdown[1].correct);
    assert!(!report.breakdown[2].correct);
    assert_eq!(
        report.breakdown[2].missing_terms.as_deref(),
        Some(&["ATP".to_string()][..])
    );

    // 只有第三题进入模型批次
    let prompt = &provider.calls()[0].prompt;
    assert!(prompt.contains("\"q3\""));
    assert!(!prompt.contains("\"q1\""));
}

#[tokio::test]
async fn test_exact_match_skips_model() {
    let provider = Arc::new(MockProvider::new());
    let questions = vec![short("q1", "Capital of France?", Some("paris"))];

    let report = GradingCascade::new(router_with(provider.clone()))
        .grade_submission(&questions, &responses(&[("q1", "Paris.")]), None)
        .await
        .expect("不需要模型时评分不应失败");

    assert_eq!(provider.call_count(), 0);
    assert_eq!(report.breakdown[0].score, 1.0);
    assert!(report.breakdown[0].correct);
    assert_eq!(report.percent, 100);
}

#[tokio::test]
async fn test_model_scores_are_clamped() {
    let provider = Arc::new(MockProvider::new().push_text(
        r#"{"results":[{"id":"q1","score":1.4,"why":"Perfect."},{"id":"q2","score":-0.2,"why":"Off topic."}]}"#,
    ));
    let questions = vec![
        short("q1", "Define osmosis.", None),
        short("q2", "Define diffusion.", None),
    ];

    let report = GradingCascade::new(router_with(provider))
        .grade_submission(
            &questions,
            &responses(&[("q1", "water across a membrane"), ("q2", "a kind of rock")]),
            None,
        )
        .await
        .expect("评分应成功");

    assert_eq!(report.breakdown[0].score, 1.0);
    assert_eq!(report.breakdown[1].score, 0.0);
    assert_eq!(report.percent, 50);
}

#[tokio::test]
async fn test_malformed_batch_is_an_error() {
    let provider = Arc::new(MockProvider::new().push_text(r#"{"grades":{"q1":0.9}}"#));
    let questions = vec![short("q1", "Define osmosis.", None)];

    let result = GradingCascade::new(router_with(provider))
        .grade_submission(&questions, &responses(&[("q1", "water moving")]), None)
        .await;

    let err = assert_err!(result);
    assert!(matches!(err, GradingError::BatchParse { .. }));
    assert_eq!(err.code(), ErrorCode::AiGradingParseError);
}

#[tokio::test]
async fn test_batch_without_usable_ids_is_an_error() {
    let questions = vec![
        short("q1", "Define osmosis.", None),
        short("q2", "Define diffusion.", None),
    ];
    let answers = responses(&[("q1", "water moving"), ("q2", "particles spreading")]);

    for content in [
        r#"{"results":[]}"#,
        r#"{"results":[{"id":"1","score":0.9},{"id":"2","score":0.8}]}"#,
    ] {
        let provider = Arc::new(MockProvider::new().push_text(content));
        let result = GradingCascade::new(router_with(provider.clone()))
            .grade_submission(&questions, &answers, None)
            .await;

        let err = assert_err!(result);
        assert_eq!(err.code(), ErrorCode::AiGradingParseError);
        assert_eq!(provider.call_count(), 1);
    }
}

#[test]
fn test_cli_grade_end_to_end() {
    let dir = std::env::temp_dir().join(format!("quiz-router-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("创建临时目录失败");
    let path = dir.join("submission.toml");
    std::fs::write(
        &path,
        r#"
quiz_id = "cli-1"

[[questions]]
type = "mcq"
id = "q1"
prompt = "2 + 2 = ?"
options = ["3", "4", "5"]
answer = "4"

[[questions]]
type = "short"
id = "q2"
prompt = "Capital of Italy?"
reference = "Rome"

[responses]
q1 = "B"
q2 = "rome"
"#,
    )
    .expect("写入临时文件失败");

    let provider: Arc<dyn ChatProvider> = Arc::new(MockProvider::new());
    let app = App::with_provider(Config::default(), provider);
    let cli = Cli::try_parse_from(["quiz-router", "grade", path.to_str().unwrap_or_default()])
        .expect("命令解析失败");

    let output = tokio_test::block_on(app.run(&cli.command)).expect("评分命令应成功");
    let report: serde_json::Value = serde_json::from_str(&output).expect("输出应为 JSON");
    assert_eq!(report["percent"], 100);
    assert_eq!(report["letter_grade"], "A");
    assert_eq!(report["breakdown"].as_array().map(Vec::len), Some(2));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
#[ignore] // 默认忽略，需要 LLM_API_KEY：cargo test -- --ignored
async fn test_live_grading_call() {
    logging::init(false);

    let config = Config::from_env();
    let app_router = {
        let provider: Arc<dyn ChatProvider> =
            Arc::new(quiz_router::OpenAiProvider::new(&config));
        Arc::new(AiRouter::new(provider, Arc::new(config)))
    };

    let questions = vec![short("q1", "What gas do plants absorb for photosynthesis?", None)];
    let report = GradingCascade::new(app_router)
        .grade_submission(&questions, &responses(&[("q1", "carbon dioxide")]), None)
        .await
        .expect("真实评分调用失败");

    assert_eq!(report.total, 1);
}
