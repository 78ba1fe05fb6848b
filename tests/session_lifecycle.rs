use std::{sync::Arc, time::Duration};

use tubeplay_lib::{
    config::PlayerConfig,
    error::PlaybackError,
    progress::ProgressStore,
    session::{dispatch, PlayerCommand, SessionPhase},
    settings::{PlayerSettings, SettingsStore},
    storage::{MemoryGateway, PersistenceGateway},
    visibility::InputKind,
    widget::{PlaybackWidget, SimulatedWidget, WidgetCall, WidgetState},
    PlayerApp,
};

async fn tick(secs: u64) {
    for _ in 0..secs {
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
    }
}

fn app_with(settings: PlayerSettings) -> PlayerApp {
    PlayerApp::in_memory(settings, PlayerConfig::default())
}

async fn start_playing(app: &PlayerApp, content_id: &str, duration: f64) -> Arc<SimulatedWidget> {
    let controller = app.controller();
    controller.open(content_id).await;
    let widget = Arc::new(SimulatedWidget::new(duration));
    let handle: Arc<dyn PlaybackWidget> = widget.clone();
    controller.on_ready(handle).await.unwrap();
    controller.on_state_change(WidgetState::Playing).await;
    widget
}

#[tokio::test(start_paused = true)]
async fn ready_seeks_to_saved_position_before_playing() {
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
    {
        let mut store = ProgressStore::load(gateway.clone(), Default::default());
        store.record("abc123", 42.0, 300.0);
    }
    let app = PlayerApp::with_gateway(
        gateway,
        SettingsStore::in_memory(PlayerSettings::default()),
        PlayerConfig::default(),
    );

    let controller = app.controller();
    controller.open("abc123").await;
    assert_eq!(controller.phase(), SessionPhase::Unstarted);

    let widget = Arc::new(SimulatedWidget::new(300.0));
    let handle: Arc<dyn PlaybackWidget> = widget.clone();
    controller.on_ready(handle).await.unwrap();

    assert_eq!(
        widget.calls(),
        vec![
            WidgetCall::SetRate(1.0),
            WidgetCall::SetVolume(80),
            WidgetCall::Seek(42.0),
            WidgetCall::Play,
        ]
    );
    assert_eq!(controller.phase(), SessionPhase::Ready);
    assert_eq!(controller.snapshot().await.unwrap().session.current_time, 42.0);
}

#[tokio::test(start_paused = true)]
async fn no_autoplay_and_no_resume_for_fresh_content() {
    let app = app_with(PlayerSettings {
        autoplay: false,
        ..PlayerSettings::default()
    });
    let controller = app.controller();
    controller.open("fresh").await;

    let widget = Arc::new(SimulatedWidget::new(300.0));
    let handle: Arc<dyn PlaybackWidget> = widget.clone();
    controller.on_ready(handle).await.unwrap();

    assert!(!widget.calls().contains(&WidgetCall::Play));
    assert!(!widget
        .calls()
        .iter()
        .any(|call| matches!(call, WidgetCall::Seek(_))));
}

#[tokio::test(start_paused = true)]
async fn teardown_flushes_position_between_samples() {
    let app = app_with(PlayerSettings::default());
    let widget = start_playing(&app, "abc123", 200.0).await;

    widget.set_position(50.0);
    app.controller().teardown().await;

    let record = app.progress_for("abc123").unwrap();
    assert_eq!(record.current_time, 50.0);
    assert_eq!(record.duration, 200.0);
    assert_eq!(record.percentage, 25.0);
    assert_eq!(app.controller().phase(), SessionPhase::TornDown);
    assert_eq!(
        app.controller().snapshot().await.unwrap_err(),
        PlaybackError::NoActiveSession
    );
}

#[tokio::test(start_paused = true)]
async fn sampling_records_progress_while_playing() {
    let app = app_with(PlayerSettings::default());
    let _widget = start_playing(&app, "v1", 600.0).await;

    tick(3).await;
    assert!(app.progress_for("v1").is_none());

    tick(7).await;
    let record = app.progress_for("v1").unwrap();
    assert!(record.current_time > 5.0);
    assert!(record.current_time <= 10.0);

    let snapshot = app.controller().snapshot().await.unwrap();
    assert!(snapshot.session.playing);
    assert!(snapshot.session.buffered > 0.0);
}

#[tokio::test(start_paused = true)]
async fn pause_takes_a_final_sample_and_settles_usage() {
    let app = app_with(PlayerSettings::default());
    let widget = start_playing(&app, "v1", 600.0).await;

    widget.set_position(120.0);
    app.controller().on_state_change(WidgetState::Paused).await;

    assert_eq!(app.progress_for("v1").unwrap().current_time, 120.0);
    assert_eq!(app.controller().phase(), SessionPhase::Paused);

    // Bootstrap charge plus nothing accrued: no time passed while playing.
    assert_eq!(app.usage_stats().total_units, 2.0);

    // Paused: the sampler no longer writes.
    widget.set_position(130.0);
    tick(3).await;
    assert_eq!(app.progress_for("v1").unwrap().current_time, 120.0);
}

#[tokio::test(start_paused = true)]
async fn playing_time_accrues_usage() {
    let app = app_with(PlayerSettings::default());
    let _widget = start_playing(&app, "v1", 6000.0).await;

    tick(60).await;
    app.controller().on_state_change(WidgetState::Paused).await;

    let total = app.usage_stats().total_units;
    assert!((total - 12.0).abs() < 1e-6, "total was {total}");
}

#[tokio::test(start_paused = true)]
async fn ending_past_threshold_clears_resume_point() {
    let app = app_with(PlayerSettings::default());
    let widget = start_playing(&app, "v1", 300.0).await;

    widget.set_position(100.0);
    tick(2).await;
    assert!(app.progress_for("v1").unwrap().current_time > 100.0);

    widget.set_position(290.0);
    app.controller().on_state_change(WidgetState::Ended).await;

    assert!(app.progress_for("v1").is_none());
    assert_eq!(app.controller().phase(), SessionPhase::Ended);
}

#[tokio::test(start_paused = true)]
async fn ending_early_behaves_like_pause() {
    let app = app_with(PlayerSettings::default());
    let widget = start_playing(&app, "v1", 300.0).await;

    widget.set_position(200.0);
    app.controller().on_state_change(WidgetState::Ended).await;

    assert_eq!(app.progress_for("v1").unwrap().current_time, 200.0);
}

#[tokio::test(start_paused = true)]
async fn opening_new_content_tears_down_previous_timers() {
    let app = app_with(PlayerSettings::default());
    let old_widget = start_playing(&app, "a", 600.0).await;
    old_widget.set_position(30.0);

    app.controller().open("b").await;
    assert_eq!(app.progress_for("a").unwrap().current_time, 30.0);
    assert_eq!(app.controller().phase(), SessionPhase::Unstarted);

    // The old widget keeps advancing; nothing from the old session may write.
    tick(10).await;
    assert_eq!(app.progress_for("a").unwrap().current_time, 30.0);
    assert!(app.progress_for("b").is_none());
}

#[tokio::test(start_paused = true)]
async fn invalid_duration_skips_persistence() {
    let app = app_with(PlayerSettings::default());
    let widget = start_playing(&app, "live", 0.0).await;

    tick(10).await;
    assert!(app.progress_for("live").is_none());

    widget.set_duration(f64::NAN);
    app.controller().on_state_change(WidgetState::Ended).await;
    app.controller().teardown().await;
    assert!(app.progress_for("live").is_none());
}

#[tokio::test(start_paused = true)]
async fn storage_failure_keeps_session_running() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.set_fail_writes(true);
    let app = PlayerApp::with_gateway(
        gateway.clone(),
        SettingsStore::in_memory(PlayerSettings::default()),
        PlayerConfig::default(),
    );

    let widget = start_playing(&app, "v1", 600.0).await;
    widget.set_position(40.0);
    tick(2).await;

    assert!(app.progress_for("v1").unwrap().current_time >= 40.0);
    assert_eq!(app.controller().phase(), SessionPhase::Playing);
    assert_eq!(gateway.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn intent_commands_drive_widget_and_session() {
    let app = app_with(PlayerSettings::default());
    let widget = start_playing(&app, "v1", 100.0).await;
    let controller = app.controller();

    controller.set_volume(0).await.unwrap();
    assert!(controller.snapshot().await.unwrap().session.muted);

    assert!(!controller.toggle_mute().await.unwrap());
    let session = controller.snapshot().await.unwrap().session;
    assert_eq!(session.volume, 50);
    assert_eq!(widget.volume(), 50);

    controller.seek(500.0).await.unwrap();
    assert_eq!(widget.current_time(), 100.0);

    controller.seek(5.0).await.unwrap();
    controller.skip_back().await.unwrap();
    assert_eq!(controller.snapshot().await.unwrap().session.current_time, 0.0);

    assert!(matches!(
        controller.set_rate(0.0).await,
        Err(PlaybackError::InvalidCommand(_))
    ));
    controller.set_rate(1.5).await.unwrap();
    assert_eq!(widget.rate(), 1.5);

    let snapshot = dispatch(controller, PlayerCommand::ToggleFullscreen)
        .await
        .unwrap();
    assert!(snapshot.session.fullscreen);

    let snapshot = dispatch(controller, PlayerCommand::SkipForward).await.unwrap();
    assert_eq!(snapshot.session.current_time, 10.0);
}

#[tokio::test(start_paused = true)]
async fn commands_without_session_are_rejected() {
    let app = app_with(PlayerSettings::default());
    assert_eq!(
        app.controller().play().await,
        Err(PlaybackError::NoActiveSession)
    );
    assert_eq!(
        dispatch(app.controller(), PlayerCommand::Pause)
            .await
            .unwrap_err(),
        PlaybackError::NoActiveSession
    );
}

#[tokio::test(start_paused = true)]
async fn commands_before_ready_are_no_ops() {
    let app = app_with(PlayerSettings::default());
    app.controller().open("v1").await;

    app.controller().play().await.unwrap();
    app.controller().seek(30.0).await.unwrap();
    assert!(!app.controller().widget().is_ready());
}

#[tokio::test(start_paused = true)]
async fn controls_hide_while_playing_and_return_on_pause() {
    let app = app_with(PlayerSettings {
        auto_hide_controls: true,
        ..PlayerSettings::default()
    });
    let _widget = start_playing(&app, "v1", 600.0).await;
    let controller = app.controller();

    controller.on_user_activity(InputKind::Pointer).await.unwrap();
    tick(4).await;
    assert!(!controller.snapshot().await.unwrap().controls_visible);

    controller.on_state_change(WidgetState::Paused).await;
    assert!(controller.snapshot().await.unwrap().controls_visible);
}

#[tokio::test(start_paused = true)]
async fn controls_stay_visible_without_auto_hide() {
    let app = app_with(PlayerSettings::default());
    let _widget = start_playing(&app, "v1", 600.0).await;
    let controller = app.controller();

    controller.on_user_activity(InputKind::Touch).await.unwrap();
    tick(10).await;
    assert!(controller.snapshot().await.unwrap().controls_visible);
}

#[tokio::test(start_paused = true)]
async fn sleep_timer_from_settings_pauses_playback() {
    let app = app_with(PlayerSettings {
        sleep_timer_minutes: 1,
        ..PlayerSettings::default()
    });
    let controller = app.controller();
    controller.open("v1").await;
    let widget = Arc::new(SimulatedWidget::new(6000.0));
    let handle: Arc<dyn PlaybackWidget> = widget.clone();
    controller.on_ready(handle).await.unwrap();

    assert_eq!(
        controller.snapshot().await.unwrap().sleep_timer_remaining_secs,
        Some(60)
    );
    assert!(widget.is_playing());

    tokio::time::advance(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;
    assert!(!widget.is_playing());
    assert_eq!(app.settings().get().sleep_timer_minutes, 0);

    controller.open("v2").await;
    let next = Arc::new(SimulatedWidget::new(6000.0));
    let handle: Arc<dyn PlaybackWidget> = next.clone();
    controller.on_ready(handle).await.unwrap();
    assert_eq!(
        controller.snapshot().await.unwrap().sleep_timer_remaining_secs,
        None
    );

    tokio::time::advance(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;
    assert!(next.is_playing());
}

#[tokio::test(start_paused = true)]
async fn sleep_timer_commands_are_remembered_in_settings() {
    let app = app_with(PlayerSettings::default());
    let _widget = start_playing(&app, "v1", 6000.0).await;
    let controller = app.controller();

    controller.start_sleep_timer(15).await.unwrap();
    assert_eq!(app.settings().get().sleep_timer_minutes, 15);
    assert_eq!(
        controller.snapshot().await.unwrap().sleep_timer_remaining_secs,
        Some(15 * 60)
    );

    controller.cancel_sleep_timer().await.unwrap();
    assert_eq!(app.settings().get().sleep_timer_minutes, 0);
    assert_eq!(
        controller.snapshot().await.unwrap().sleep_timer_remaining_secs,
        None
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_carries_usage_only_when_enabled() {
    let app = app_with(PlayerSettings::default());
    let _widget = start_playing(&app, "v1", 600.0).await;

    let usage = app.controller().snapshot().await.unwrap().usage.unwrap();
    assert_eq!(usage.total_units, 2.0);

    app.settings()
        .update(|s| s.show_usage_stats = false)
        .unwrap();
    assert!(app.controller().snapshot().await.unwrap().usage.is_none());
}

#[tokio::test(start_paused = true)]
async fn buffering_keeps_phase() {
    let app = app_with(PlayerSettings::default());
    let _widget = start_playing(&app, "v1", 600.0).await;
    let controller = app.controller();

    controller.on_state_change(WidgetState::Buffering).await;
    let snapshot = controller.snapshot().await.unwrap();
    assert!(snapshot.session.buffering);
    assert_eq!(snapshot.session.phase, SessionPhase::Playing);

    controller.on_state_change(WidgetState::Playing).await;
    assert!(!controller.snapshot().await.unwrap().session.buffering);
}
