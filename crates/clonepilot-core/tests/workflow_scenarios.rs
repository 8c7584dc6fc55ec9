//! End-to-end sessions against the scripted remote UI.
//!
//! The tokio clock is paused, so the 35-minute monitoring ceiling and every
//! settle wait elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use clonepilot_core::artifacts::ArtifactStore;
use clonepilot_core::browser::mock::{ScriptedLauncher, ScriptedUi, ScriptedUiBuilder, UiAction};
use clonepilot_core::browser::{RemoteUi, SessionLauncher};
use clonepilot_core::platform::PublishLocators;
use clonepilot_core::publish::AddressRule;
use clonepilot_core::UiError;
use clonepilot_core::workflow::Phase;
use clonepilot_core::{
    run_session, Credentials, EngineContext, Outcome, PlatformProfile, ProgressChannel,
    ProgressEvent, SessionReport, SessionRequest, WorkflowConfig,
};

struct Harness {
    ui: ScriptedUi,
    launcher: Arc<ScriptedLauncher>,
    profile: PlatformProfile,
    _dir: tempfile::TempDir,
    ctx: EngineContext,
}

fn harness(script: impl FnOnce(ScriptedUiBuilder) -> ScriptedUiBuilder) -> Harness {
    harness_with(script, Launch::Scripted)
}

enum Launch {
    Scripted,
    Failing,
}

fn harness_with(
    script: impl FnOnce(ScriptedUiBuilder) -> ScriptedUiBuilder,
    launch: Launch,
) -> Harness {
    let profile = PlatformProfile::default();
    let ui = script(ScriptedUi::builder(profile.clone())).build();
    let launcher = Arc::new(match launch {
        Launch::Scripted => ScriptedLauncher::new(ui.clone()),
        Launch::Failing => ScriptedLauncher::failing(),
    });
    let dir = tempfile::tempdir().unwrap();
    let ctx = EngineContext::new(
        launcher.clone() as Arc<dyn SessionLauncher>,
        ArtifactStore::new(dir.path(), "/screenshots"),
    )
    .with_platform(profile.clone())
    .with_credentials(Some(Credentials::new("pilot@example.com", "s3cret")));

    Harness {
        ui,
        launcher,
        profile,
        _dir: dir,
        ctx,
    }
}

impl Harness {
    fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.ctx = self.ctx.with_workflow(workflow);
        self
    }

    fn without_credentials(mut self) -> Self {
        self.ctx = self.ctx.with_credentials(None);
        self
    }

    async fn run(
        self,
        url: &str,
        instructions: Option<&str>,
    ) -> (Finished, SessionReport, Vec<ProgressEvent>) {
        let request = SessionRequest::new(url, instructions).unwrap();
        let (channel, mut rx) = ProgressChannel::new();
        let report = run_session(request, Arc::new(self.ctx), channel).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (
            Finished {
                ui: self.ui,
                launcher: self.launcher,
                profile: self.profile,
            },
            report,
            events,
        )
    }
}

/// What a test inspects after the session ended.
struct Finished {
    ui: ScriptedUi,
    launcher: Arc<ScriptedLauncher>,
    profile: PlatformProfile,
}

fn statuses(events: &[ProgressEvent]) -> Vec<(String, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Status { message, step, .. } => Some((message.clone(), *step)),
            _ => None,
        })
        .collect()
}

fn has_status(events: &[ProgressEvent], wanted: &str) -> bool {
    statuses(events).iter().any(|(m, _)| m == wanted)
}

fn progress_messages(events: &[ProgressEvent]) -> Vec<(String, Option<u8>)> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress {
                message, progress, ..
            } => Some((message.clone(), *progress)),
            _ => None,
        })
        .collect()
}

/// Exactly one terminal event and it is the last one.
fn terminal(events: &[ProgressEvent]) -> &ProgressEvent {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "expected one terminal event in {:?}", events);
    let last = events.last().unwrap();
    assert!(last.is_terminal());
    last
}

fn assert_ordered(phases: &[Phase]) {
    for pair in phases.windows(2) {
        assert!(
            pair[0].can_advance_to(pair[1]),
            "out of order: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_generation_and_publish_succeed() {
    let h = harness(|b| {
        b.ready_after(Duration::from_secs(90))
            .progress_frame(Duration::ZERO, &["Header", "Scanning page elements: 31%"])
            .progress_frame(Duration::from_secs(20), &["Scanning page elements: 31%"])
            .progress_frame(Duration::from_secs(40), &["Creating visual direction"])
    });
    let (h, report, events) = h.run("https://example.com", None).await;

    match terminal(&events) {
        ProgressEvent::Complete {
            success,
            screenshot,
            preview_screenshot,
            edit_url,
            published_url,
            message,
        } => {
            assert!(*success);
            assert_eq!(
                published_url.as_deref(),
                Some("https://mock-site.dev.animaapp.io")
            );
            assert!(preview_screenshot
                .as_deref()
                .unwrap()
                .starts_with("/screenshots/preview-"));
            assert!(screenshot
                .as_deref()
                .unwrap()
                .starts_with("/screenshots/clone-final-"));
            assert!(h.profile.is_result_url(edit_url.as_deref().unwrap()));
            assert_eq!(message, "Landing page generated and published successfully!");
        }
        other => panic!("unexpected terminal event {:?}", other),
    }

    assert!(matches!(report.outcome, Outcome::Published { .. }));
    assert_ordered(&report.phases);
    assert_eq!(report.phases.first(), Some(&Phase::Init));
    assert!(report.phases.contains(&Phase::Published));
    assert_eq!(report.phases.last(), Some(&Phase::Complete));
    assert!(!report.phases.contains(&Phase::AuthChallenged));

    assert_eq!(
        progress_messages(&events),
        vec![
            ("Scanning page elements: 31% (31%)".to_string(), Some(31)),
            ("Creating visual direction".to_string(), None),
        ]
    );

    let first = &events[0];
    assert_eq!(first, &ProgressEvent::status("Starting clone process...", 1));
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::Status { message, progress: Some(100), step: 21 } if message == "Preview is ready!"
    )));
    let preview_at = events
        .iter()
        .position(|e| matches!(e, ProgressEvent::PreviewReady { .. }))
        .unwrap();
    let publishing_at = events
        .iter()
        .position(|e| matches!(e, ProgressEvent::Status { message, .. } if message == "Publishing website..."))
        .unwrap();
    assert!(preview_at < publishing_at);

    assert_eq!(h.ui.publish_attempts(), 1);
    assert_eq!(h.ui.submissions(), 1);
    assert!(h.ui.is_closed());
    assert_eq!(h.launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_publish_fails_twice_shows_preview() {
    let h = harness(|b| b.publish_never_succeeds());
    let (h, report, events) = h.run("https://example.com", None).await;

    match terminal(&events) {
        ProgressEvent::Complete {
            success,
            screenshot,
            preview_screenshot,
            published_url,
            message,
            ..
        } => {
            assert!(*success);
            assert_eq!(*published_url, None);
            assert!(preview_screenshot.is_some());
            assert!(screenshot.is_some());
            assert_eq!(
                message,
                "Landing page generated! Publish could not be completed, preview shown below."
            );
        }
        other => panic!("unexpected terminal event {:?}", other),
    }

    assert_eq!(h.ui.publish_attempts(), 2);
    assert!(has_status(&events, "Retrying publish (attempt 2/2)..."));
    assert!(has_status(
        &events,
        "Publish could not be completed. Showing preview."
    ));
    assert!(report.phases.contains(&Phase::PublishFailed));
    assert!(!report.phases.contains(&Phase::Published));
    assert_ordered(&report.phases);
}

#[tokio::test(start_paused = true)]
async fn test_publish_stops_after_first_success() {
    let h = harness(|b| b.publish_succeeds_on(1));
    let (h, _, events) = h.run("https://example.com", None).await;

    assert_eq!(h.ui.publish_attempts(), 1);
    assert!(!has_status(&events, "Retrying publish (attempt 2/2)..."));
}

#[tokio::test(start_paused = true)]
async fn test_address_rules_come_from_engine() {
    struct FixedHost;

    #[async_trait::async_trait]
    impl AddressRule for FixedHost {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn find(
            &self,
            _ui: &dyn RemoteUi,
            _locators: &PublishLocators,
        ) -> Result<Option<String>, UiError> {
            Ok(Some("custom.dev.animaapp.io".to_string()))
        }
    }

    let mut h = harness(|b| b.publish_never_succeeds());
    h.ctx.address_rules = vec![Box::new(FixedHost)];
    let (h, report, _) = h.run("https://example.com", None).await;

    match &report.outcome {
        Outcome::Published { url, artifacts } => {
            assert_eq!(url, "https://custom.dev.animaapp.io");
            assert!(artifacts
                .screenshot_paths
                .iter()
                .any(|p| p.starts_with("/screenshots/published-")));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(h.ui.publish_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_challenge_resubmits_once_with_instructions() {
    let h = harness(|b| b.login_required());
    let (h, report, events) = h.run("https://example.com", Some("Make it dark")).await;

    assert!(matches!(terminal(&events), ProgressEvent::Complete { success: true, .. }));
    assert_eq!(h.ui.submissions(), 2);
    assert_eq!(
        h.ui.navigations(),
        vec![h.profile.landing_url.clone(), h.profile.landing_url.clone()]
    );
    assert_eq!(h.ui.clicked(&h.profile.auth.sign_in_button), 1);
    assert_eq!(h.ui.clicked(&h.profile.compose.menu_action), 2);

    let submitting: Vec<_> = statuses(&events)
        .into_iter()
        .filter(|(m, _)| m == "Submitting...")
        .collect();
    assert_eq!(submitting, vec![("Submitting...".to_string(), 18)]);
    assert!(statuses(&events)
        .contains(&("Generation process started! Monitoring progress...".to_string(), 19)));

    let prompt = h.profile.compose.prompt_field.clone();
    assert!(h.ui.actions().contains(&UiAction::Fill(
        prompt.clone(),
        "Make it dark\n\n\n".to_string()
    )));
    assert!(h
        .ui
        .actions()
        .contains(&UiAction::Type(prompt, "/".to_string())));

    for phase in [Phase::AuthChallenged, Phase::Authenticated, Phase::Resubmitted] {
        assert!(report.phases.contains(&phase), "missing {:?}", phase);
    }
    assert_ordered(&report.phases);
}

#[tokio::test(start_paused = true)]
async fn test_login_without_credentials_fails() {
    let h = harness(|b| b.login_required()).without_credentials();
    let (h, report, events) = h.run("https://example.com", None).await;

    match terminal(&events) {
        ProgressEvent::Error { error, .. } => {
            assert!(error.starts_with("Failed to clone website: login required"));
        }
        other => panic!("unexpected terminal event {:?}", other),
    }
    assert!(matches!(report.outcome, Outcome::Failed { .. }));
    assert_eq!(report.phases.last(), Some(&Phase::Failed));
    assert!(h.ui.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_monitor_ceiling_still_completes() {
    let h = harness(|b| b.never_ready());
    let started = tokio::time::Instant::now();
    let (h, report, events) = h.run("https://example.com", None).await;
    assert!(started.elapsed() >= Duration::from_secs(35 * 60));

    match terminal(&events) {
        ProgressEvent::Complete {
            success,
            screenshot,
            preview_screenshot,
            published_url,
            message,
            ..
        } => {
            assert!(*success);
            assert!(screenshot.is_some());
            assert_eq!(*preview_screenshot, None);
            assert_eq!(*published_url, None);
            assert_eq!(
                message,
                "Generation process completed (check platform for results)"
            );
        }
        other => panic!("unexpected terminal event {:?}", other),
    }

    assert!(matches!(
        report.outcome,
        Outcome::PreviewOnly {
            preview_reached: false,
            ..
        }
    ));
    assert!(!report.phases.contains(&Phase::PreviewReady));
    assert_eq!(h.ui.publish_attempts(), 0);

    // One progress capture per 30 s of monitoring, plus the final one.
    let shots = h.ui.screenshots();
    assert!(shots.len() >= 60, "only {} screenshots", shots.len());
}

#[tokio::test(start_paused = true)]
async fn test_blank_instructions_never_compose() {
    let h = harness(|b| b);
    let (h, _, events) = h.run("https://example.com", Some("   ")).await;

    assert!(!has_status(&events, "Adding custom instructions..."));
    assert_eq!(h.ui.clicked(&h.profile.compose.secondary_region), 0);
    assert_eq!(h.ui.clicked(&h.profile.compose.menu_action), 0);
    assert!(!h
        .ui
        .actions()
        .iter()
        .any(|a| matches!(a, UiAction::Type(..))));
    assert!(statuses(&events)
        .contains(&("Generation process started! Monitoring progress...".to_string(), 17)));
}

#[tokio::test(start_paused = true)]
async fn test_compose_failure_is_soft() {
    let profile = PlatformProfile::default();
    let menu = profile.compose.menu_action.clone();
    let h = harness(move |b| b.fail_locator(menu));
    let (h, report, events) = h.run("https://example.com", Some("Use a serif font")).await;

    assert!(has_status(&events, "Adding custom instructions..."));
    assert!(matches!(report.outcome, Outcome::Published { .. }));

    let url_fills = h
        .ui
        .actions()
        .iter()
        .filter(|a| matches!(a, UiAction::Fill(l, v) if *l == h.profile.url_field && v == "https://example.com"))
        .count();
    assert_eq!(url_fills, 2);
    assert_eq!(h.ui.submissions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_failure_is_fatal() {
    let h = harness(|b| b.fail_navigation());
    let (h, report, events) = h.run("https://example.com", None).await;

    match terminal(&events) {
        ProgressEvent::Error { error, details } => {
            assert!(error.starts_with("Failed to clone website: could not load https://dev.animaapp.com/"));
            assert!(details.contains("caused by:"));
        }
        other => panic!("unexpected terminal event {:?}", other),
    }
    assert_eq!(report.phases, vec![Phase::Init, Phase::Failed]);
    assert_eq!(h.ui.submissions(), 0);
    assert!(h.ui.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_reports_error() {
    let h = harness_with(|b| b, Launch::Failing);
    let (h, report, events) = h.run("https://example.com", None).await;

    assert_eq!(events.len(), 2);
    match terminal(&events) {
        ProgressEvent::Error { error, .. } => {
            assert!(error.contains("Failed to launch browser"));
        }
        other => panic!("unexpected terminal event {:?}", other),
    }
    assert!(!report.outcome.is_success());
    assert_eq!(h.launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_screenshot_failures_are_contained() {
    let h = harness(|b| b.fail_screenshots());
    let (h, report, events) = h.run("https://example.com", None).await;

    assert!(has_status(
        &events,
        "Publish process encountered an issue. Showing preview."
    ));
    match terminal(&events) {
        ProgressEvent::Complete {
            success,
            screenshot,
            preview_screenshot,
            published_url,
            ..
        } => {
            assert!(*success);
            // Nothing was ever captured, so there is nothing to fall back to.
            assert_eq!(*screenshot, None);
            assert_eq!(*preview_screenshot, None);
            assert_eq!(*published_url, None);
        }
        other => panic!("unexpected terminal event {:?}", other),
    }
    assert!(report.outcome.is_success());
    assert_eq!(h.ui.publish_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_edits_and_loading() {
    let h = harness(|b| {
        b.edits_for(Duration::from_secs(120))
            .loading_for(Duration::from_secs(150))
    });
    let (_, report, events) = h.run("https://example.com", None).await;

    assert!(has_status(
        &events,
        "Waiting for \"Making edits...\" to complete before publishing..."
    ));
    assert!(has_status(&events, "Edits complete. Proceeding to publish..."));
    assert!(has_status(&events, "Waiting for \"Loading...\" to complete..."));
    assert!(report.phases.contains(&Phase::EditsSettling));
    assert!(report.phases.contains(&Phase::ContentLoading));
    assert!(matches!(report.outcome, Outcome::Published { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_edits_that_never_finish_still_publish() {
    let h = harness(|b| b.edits_for(Duration::from_secs(3600)));
    let (h, report, events) = h.run("https://example.com", None).await;

    assert!(!has_status(&events, "Edits complete. Proceeding to publish..."));
    assert!(matches!(report.outcome, Outcome::Published { .. }));
    assert_eq!(h.ui.publish_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_preview_clip_falls_back_to_viewport() {
    let h = harness(|b| b.preview_box(None));
    let (h, _, events) = h.run("https://example.com", None).await;

    let preview = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::PreviewReady {
                preview_screenshot, ..
            } => Some(preview_screenshot.clone()),
            _ => None,
        })
        .unwrap();
    let file_name = preview.trim_start_matches("/screenshots/");
    let (_, clip) = h
        .ui
        .screenshots()
        .into_iter()
        .find(|(path, _)| path.ends_with(file_name))
        .unwrap();
    assert_eq!(clip, None);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_when_enabled() {
    let workflow = WorkflowConfig {
        cancel_on_disconnect: true,
        ..WorkflowConfig::default()
    };
    let h = harness(|b| b.never_ready()).with_workflow(workflow);

    let request = SessionRequest::new("https://example.com", None).unwrap();
    let (channel, rx) = ProgressChannel::new();
    drop(rx);
    let started = tokio::time::Instant::now();
    let report = run_session(request, Arc::new(h.ctx), channel).await;

    match &report.outcome {
        Outcome::Failed { reason, .. } => assert_eq!(reason, "caller disconnected"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(h.ui.is_closed());
}
