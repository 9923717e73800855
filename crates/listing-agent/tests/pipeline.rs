//! Executor and engine driven end to end against a scripted page.

mod common;

use common::*;
use listing_agent::automation::outcome::UNCONFIRMED_NOTE;
use listing_agent::automation::EngineTimings;
use listing_agent::executor::{SubmissionPipeline, SubmissionRequest};
use listing_core::{
    ErrorKind, FieldType, FormDetectionResult, FormField, PipelineState, ProductSnapshot, Step,
    StepStatus, SubmissionJob,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn request() -> SubmissionRequest {
    SubmissionRequest::for_job(&SubmissionJob::new(product(), directory()))
}

fn has_log(run: &listing_core::RunResult, step: Step, status: StepStatus) -> bool {
    run.logs.iter().any(|l| l.step == step && l.status == status)
}

#[tokio::test]
async fn test_http_error_aborts_before_detection() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = PageScript::form();
    script.status = Some(500);
    let renderer = Arc::new(FakeRenderer::new(script));
    let (exec, calls) = executor(Arc::clone(&renderer), dir.path());

    let run = exec.execute(&request()).await;

    assert!(!run.success);
    assert_eq!(run.error.as_deref(), Some("Failed to load page"));
    assert_eq!(run.error_kind, Some(ErrorKind::NavigationFailure));
    assert_eq!(run.final_state, PipelineState::Error);
    assert!(!run.attempted(Step::DetectForm));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(renderer.actions().last(), Some(&Action::Closed));
}

#[tokio::test]
async fn test_missing_status_is_navigation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = PageScript::form();
    script.status = None;
    let renderer = Arc::new(FakeRenderer::new(script));
    let (exec, _) = executor(renderer, dir.path());

    let run = exec.execute(&request()).await;
    assert_eq!(run.error_kind, Some(ErrorKind::NavigationFailure));
}

#[tokio::test]
async fn test_confirmed_submission_fills_and_uploads_logo() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(FakeRenderer::new(PageScript::form()));
    let (exec, calls) = executor(Arc::clone(&renderer), dir.path());

    let run = exec.execute(&request()).await;

    assert!(run.success, "run failed: {:?}", run.error);
    assert_eq!(run.final_state, PipelineState::Done);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(has_log(&run, Step::DetectForm, StepStatus::Success));
    assert!(has_log(&run, Step::Submit, StepStatus::Success));
    assert!(run.outcome_note.is_none());

    let actions = renderer.actions();
    assert!(actions.contains(&Action::Files(
        "#logo".into(),
        vec!["/tmp/acme-logo.png".into()]
    )));
    assert!(actions.contains(&Action::Typed("#product_name".into(), "Acme Rockets".into())));
    assert!(actions.contains(&Action::Typed("#email".into(), "hi@acme.io".into())));
    assert!(actions.contains(&Action::Clicked(SUBMIT_BUTTON.into())));
    assert_eq!(run.fill_results.get("#logo"), Some(&true));
    assert_eq!(run.filled_fields["#logo"].field_type, FieldType::File);

    let fill = run.logs.iter().find(|l| l.step == Step::FillForm).unwrap();
    assert_eq!(fill.failed, Some(0));

    let shot = run.screenshot_path.as_deref().unwrap();
    assert!(shot.starts_with("screenshots/result_"));
    assert!(dir.path().join(shot).exists());
}

#[tokio::test]
async fn test_missing_field_is_tallied_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let script = PageScript::form().without_element("#website");
    let renderer = Arc::new(FakeRenderer::new(script));
    let (exec, _) = executor(renderer, dir.path());

    let run = exec.execute(&request()).await;

    assert!(run.success);
    assert_eq!(run.fill_results.get("#website"), Some(&false));
    let fill = run.logs.iter().find(|l| l.step == Step::FillForm).unwrap();
    assert_eq!(fill.failed, Some(1));
}

#[tokio::test]
async fn test_captcha_blocks_before_submit() {
    let dir = tempfile::tempdir().unwrap();
    let script = PageScript::form().with_element(".g-recaptcha");
    let renderer = Arc::new(FakeRenderer::new(script));
    let (exec, _) = executor(Arc::clone(&renderer), dir.path());

    let run = exec.execute(&request()).await;

    assert!(!run.success);
    assert_eq!(run.error_kind, Some(ErrorKind::CaptchaDetected));
    assert_eq!(
        run.error.as_deref(),
        Some("CAPTCHA detected, requires manual intervention")
    );
    assert!(has_log(&run, Step::CaptchaCheck, StepStatus::Blocked));
    assert!(!renderer
        .actions()
        .iter()
        .any(|a| matches!(a, Action::Clicked(_))));
    assert!(run.screenshot_path.as_deref().unwrap().starts_with("screenshots/error_"));
}

#[tokio::test]
async fn test_unconfirmed_outcome_counts_as_success() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = PageScript::form();
    script.result_html = "<p>Your listing is on its way.</p>".into();
    let renderer = Arc::new(FakeRenderer::new(script));
    let (exec, _) = executor(renderer, dir.path());

    let run = exec.execute(&request()).await;

    assert!(run.success);
    assert_eq!(run.outcome_note.as_deref(), Some(UNCONFIRMED_NOTE));
    let entry = run
        .logs
        .iter()
        .find(|l| l.step == Step::Submit && l.status == StepStatus::Unknown)
        .unwrap();
    assert_eq!(entry.note.as_deref(), Some(UNCONFIRMED_NOTE));
}

#[tokio::test]
async fn test_error_phrase_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = PageScript::form();
    script.result_html = "<p>This product already exists</p>".into();
    let renderer = Arc::new(FakeRenderer::new(script));
    let (exec, _) = executor(renderer, dir.path());

    let run = exec.execute(&request()).await;

    assert!(!run.success);
    assert_eq!(run.error_kind, Some(ErrorKind::OutcomeRejected));
    assert_eq!(run.error.as_deref(), Some("Detected error phrase: already exists"));
    assert!(run.screenshot_path.as_deref().unwrap().starts_with("screenshots/result_"));
}

#[tokio::test]
async fn test_no_submit_control() {
    let dir = tempfile::tempdir().unwrap();
    let script = PageScript::form().without_element(SUBMIT_BUTTON);
    let renderer = Arc::new(FakeRenderer::new(script));
    let (exec, _) = executor(renderer, dir.path());

    let run = exec.execute(&request()).await;
    assert_eq!(run.error_kind, Some(ErrorKind::SubmitControlNotFound));
    assert_eq!(run.error.as_deref(), Some("Could not find submit button"));
}

#[tokio::test]
async fn test_page_without_form() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = PageScript::form();
    script.html = "<html><body><p>Nothing to see</p></body></html>".into();
    let renderer = Arc::new(FakeRenderer::new(script));
    let (exec, _) = executor(renderer, dir.path());

    let run = exec.execute(&request()).await;
    assert_eq!(run.error_kind, Some(ErrorKind::FormNotFound));
    assert!(has_log(&run, Step::DetectForm, StepStatus::Failed));
    assert!(!run.attempted(Step::FillForm));
}

#[tokio::test]
async fn test_cached_schema_skips_detection() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(FakeRenderer::new(PageScript::form()));
    let (exec, calls) = executor(Arc::clone(&renderer), dir.path());

    let mut req = request();
    req.cached_schema = Some(FormDetectionResult {
        url: req.url.clone(),
        form_found: true,
        form_selector: Some("#listing".into()),
        fields: vec![FormField {
            name: "website".into(),
            field_type: FieldType::Url,
            label: None,
            placeholder: None,
            required: true,
            selector: "#website".into(),
            options: None,
        }],
        submit_button_selector: Some(SUBMIT_BUTTON.into()),
        confidence: 0.9,
    });

    let run = exec.execute(&req).await;

    assert!(run.success);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(has_log(&run, Step::DetectForm, StepStatus::Cached));
    assert!(renderer
        .actions()
        .contains(&Action::Typed("#website".into(), "https://acme.io".into())));
}

/// Selectors of the fill actions, in the order they happened.
fn fill_order(actions: &[Action]) -> Vec<String> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Typed(sel, _)
            | Action::Files(sel, _)
            | Action::Selected(sel, _)
            | Action::Checked(sel, _) => Some(sel.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_fields_fill_in_document_order() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(FakeRenderer::new(PageScript::form()));
    let (exec, _) = executor(Arc::clone(&renderer), dir.path());

    let run = exec.execute(&request()).await;

    assert!(run.success, "run failed: {:?}", run.error);
    assert_eq!(
        fill_order(&renderer.actions()),
        ["#product_name", "#website", "#description", "#email", "#logo"]
    );
}

fn choice_request(pricing_model: &str) -> SubmissionRequest {
    let product = ProductSnapshot {
        category: Some("Developer Tools".into()),
        pricing_model: Some(pricing_model.into()),
        logo_path: None,
        ..product()
    };
    SubmissionRequest::for_job(&SubmissionJob::new(product, directory()))
}

#[tokio::test]
async fn test_select_checkbox_and_radio_fills() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(FakeRenderer::new(PageScript::choices()));
    let (exec, _) = executor(Arc::clone(&renderer), dir.path());

    let run = exec.execute(&choice_request("yes")).await;

    assert!(run.success, "run failed: {:?}", run.error);
    let actions = renderer.actions();
    assert!(actions.contains(&Action::Selected("#category".into(), "Developer Tools".into())));
    assert!(actions.contains(&Action::Checked("#free_pricing".into(), true)));
    assert!(actions.contains(&Action::Checked("#listing_type".into(), true)));
    assert!(!actions.iter().any(|a| matches!(a, Action::Typed(sel, _) if sel != "#product_name")));
    assert_eq!(
        fill_order(&actions),
        ["#product_name", "#category", "#free_pricing", "#listing_type"]
    );
}

#[tokio::test]
async fn test_falsy_checkbox_is_unchecked_and_radio_still_checked() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(FakeRenderer::new(PageScript::choices()));
    let (exec, _) = executor(Arc::clone(&renderer), dir.path());

    let run = exec.execute(&choice_request("paid")).await;

    assert!(run.success, "run failed: {:?}", run.error);
    let actions = renderer.actions();
    assert!(actions.contains(&Action::Checked("#free_pricing".into(), false)));
    assert!(!actions.contains(&Action::Checked("#free_pricing".into(), true)));
    assert!(actions.contains(&Action::Checked("#listing_type".into(), true)));
    assert_eq!(run.fill_results.get("#free_pricing"), Some(&true));
}

#[tokio::test(start_paused = true)]
async fn test_field_pacing_is_applied_between_fills() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(FakeRenderer::new(PageScript::form()));
    let timings = EngineTimings {
        field_pacing: Duration::from_millis(300),
        ..EngineTimings::instant()
    };
    let (exec, _) = executor_with(Arc::clone(&renderer), dir.path(), timings);

    let began = tokio::time::Instant::now();
    let run = exec.execute(&request()).await;

    assert!(run.success, "run failed: {:?}", run.error);
    // Five fills, four gaps between them.
    assert!(began.elapsed() >= Duration::from_millis(1200));
}

#[tokio::test]
async fn test_panic_inside_page_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(FakeRenderer::new(PageScript::form().panicking_on("#email")));
    let (exec, _) = executor(Arc::clone(&renderer), dir.path());

    let run = exec.execute(&request()).await;

    assert!(!run.success);
    assert_eq!(run.error_kind, Some(ErrorKind::Crashed));
    assert!(run
        .error
        .as_deref()
        .unwrap()
        .contains("page state lost while typing into #email"));
    assert!(has_log(&run, Step::Error, StepStatus::Failed));
    let shot = run.screenshot_path.as_deref().unwrap();
    assert!(shot.starts_with("screenshots/error_"));
    assert!(dir.path().join(shot).exists());

    let actions = renderer.actions();
    assert_eq!(actions.last(), Some(&Action::Closed));
    assert!(!actions.iter().any(|a| matches!(a, Action::Clicked(_))));
}
