use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use triangle_slideshow::config::{Configuration, SurfaceRetry};
use triangle_slideshow::events::{
    Caption, PauseReason, PlaybackCommand, PresentationEvent, PresentationStatus, Visibility,
};
use triangle_slideshow::render::surface::{HeadlessSurface, RenderSurface, ShapeId, SurfaceProbe};
use triangle_slideshow::tasks::scheduler;
use triangle_slideshow::testkit::{FlakySurface, MemorySource, events_until, fixtures};

struct Harness {
    commands: Sender<PlaybackCommand>,
    events: Receiver<PresentationEvent>,
    cancel: CancellationToken,
    task: JoinHandle<anyhow::Result<()>>,
    started: Instant,
}

fn launch<R: RenderSurface>(cfg: Configuration, source: MemorySource, surface: R) -> Harness {
    let (commands, command_rx) = mpsc::channel(8);
    let (event_tx, events) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    let started = Instant::now();
    let task = tokio::spawn(scheduler::run(
        cfg,
        Arc::new(source),
        surface,
        command_rx,
        event_tx,
        cancel.clone(),
    ));
    Harness {
        commands,
        events,
        cancel,
        task,
        started,
    }
}

fn launch_headless(source: MemorySource) -> (Harness, SurfaceProbe) {
    let surface = HeadlessSurface::new();
    let probe = surface.probe();
    (launch(Configuration::default(), source, surface), probe)
}

fn drain(rx: &mut Receiver<PresentationEvent>) -> Vec<PresentationEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    seen
}

fn is_settled(event: &PresentationEvent) -> bool {
    matches!(event, PresentationEvent::Settled { .. })
}

fn is_advance_from(from: usize) -> impl Fn(&PresentationEvent) -> bool {
    move |event| matches!(event, PresentationEvent::Advanced { from: f, .. } if *f == from)
}

const WITHIN: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn first_advance_animates_and_commits_after_transition_duration() {
    let (mut h, _probe) = launch_headless(fixtures::three_slide_show());

    let seen = events_until(&mut h.events, WITHIN, is_settled).await;
    let elapsed = h.started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5_100),
        "settled after {elapsed:?}"
    );

    assert_eq!(
        seen,
        vec![
            PresentationEvent::Status(PresentationStatus::Loading),
            PresentationEvent::PaletteChanged(fixtures::palette_for(0)),
            PresentationEvent::CaptionChanged(Caption {
                index: 0,
                name: "Slide 0".into(),
                source_image: Some("images/slide_0.jpg".into()),
            }),
            PresentationEvent::Status(PresentationStatus::Playing),
            PresentationEvent::PaletteChanged(fixtures::palette_for(1)),
            PresentationEvent::FirstTransitionStarted,
            PresentationEvent::Advanced {
                from: 0,
                to: 1,
                animated: true
            },
            PresentationEvent::Settled { current: 1, next: 2 },
        ]
    );

    let caption = events_until(&mut h.events, WITHIN, |e| {
        matches!(e, PresentationEvent::CaptionChanged(_))
    })
    .await;
    assert!(matches!(
        caption.last(),
        Some(PresentationEvent::CaptionChanged(Caption { index: 1, .. }))
    ));

    // Second advance one full period after the first; the start event is not repeated.
    let seen = events_until(&mut h.events, WITHIN, is_advance_from(1)).await;
    assert!(!seen.contains(&PresentationEvent::FirstTransitionStarted));
    let elapsed = h.started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(12) && elapsed < Duration::from_millis(12_100),
        "second advance after {elapsed:?}"
    );

    h.cancel.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn playback_wraps_around_to_the_first_slide() {
    let (mut h, _probe) = launch_headless(fixtures::three_slide_show());

    let seen = events_until(&mut h.events, WITHIN, |e| {
        matches!(e, PresentationEvent::Settled { current: 0, .. })
    })
    .await;
    assert!(seen.contains(&PresentationEvent::Advanced {
        from: 2,
        to: 0,
        animated: true
    }));
    assert!(seen.contains(&PresentationEvent::Settled { current: 0, next: 1 }));

    h.cancel.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn missing_transition_cuts_but_still_commits() {
    let source = fixtures::three_slide_show();
    source.remove_file(&fixtures::transition_file(1, 2));
    let (mut h, probe) = launch_headless(source);

    let seen = events_until(&mut h.events, WITHIN, |e| {
        matches!(e, PresentationEvent::CaptionChanged(Caption { index: 2, .. }))
    })
    .await;

    let advance = seen
        .iter()
        .position(|e| *e == PresentationEvent::Advanced { from: 1, to: 2, animated: false })
        .expect("cut advance from 1 to 2");
    let palette = seen
        .iter()
        .position(|e| *e == PresentationEvent::PaletteChanged(fixtures::palette_for(2)))
        .expect("palette of slide 2");
    let settled = seen
        .iter()
        .position(|e| *e == PresentationEvent::Settled { current: 2, next: 0 })
        .expect("commit to slide 2");
    assert!(palette < advance && advance < settled);

    // The cut rebuilt the scene with slide 2's triangles.
    assert_eq!(probe.clear_count(), 2);
    assert_eq!(probe.shape_count(), fixtures::TRIANGLES_PER_SLIDE);
    let red = probe.shape(ShapeId(0)).unwrap().fill.red;
    assert!((red - 80.0 / 255.0).abs() < 1e-4);

    h.cancel.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn out_of_range_pairing_is_skipped_and_the_rest_animate() {
    let source = fixtures::three_slide_show().with_file(
        &fixtures::transition_file(0, 1),
        r#"[{"from_index": 0, "to_index": 0},
            {"from_index": 1, "to_index": 99},
            {"from_index": 2, "to_index": 2},
            {"from_index": 3, "to_index": 3}]"#,
    );
    let (mut h, probe) = launch_headless(source);

    let seen = events_until(&mut h.events, WITHIN, is_settled).await;
    assert!(seen.contains(&PresentationEvent::Advanced {
        from: 0,
        to: 1,
        animated: true
    }));

    // All staggered tweens are done before the next period.
    sleep(Duration::from_secs(5)).await;
    let moved = probe.shape(ShapeId(0)).unwrap().fill.red;
    let skipped = probe.shape(ShapeId(1)).unwrap().fill.red;
    assert!((moved - 40.0 / 255.0).abs() < 1e-4, "shape 0 red = {moved}");
    assert!(skipped.abs() < 1e-6, "shape 1 red = {skipped}");

    // The skipped source faded out; slide 1's triangle 1 faded in on a new shape.
    assert!(probe.shape(ShapeId(1)).unwrap().fill.alpha.abs() < 1e-6);
    assert_eq!(probe.shape_count(), fixtures::TRIANGLES_PER_SLIDE + 1);
    let appeared = probe.shape(ShapeId(4)).unwrap().fill;
    assert!((appeared.red - 40.0 / 255.0).abs() < 1e-4);
    assert!((appeared.alpha - 1.0).abs() < 1e-6);

    h.cancel.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn visibility_pause_defers_settle_and_resumes() {
    let (mut h, _probe) = launch_headless(fixtures::three_slide_show());
    events_until(&mut h.events, WITHIN, is_advance_from(0)).await;

    h.commands
        .send(PlaybackCommand::Visibility(Visibility::Hidden))
        .await
        .unwrap();
    let seen = events_until(&mut h.events, WITHIN, |e| {
        matches!(e, PresentationEvent::PauseChanged { .. })
    })
    .await;
    assert_eq!(
        seen.last(),
        Some(&PresentationEvent::PauseChanged {
            paused: true,
            reason: Some(PauseReason::Visibility)
        })
    );

    sleep(Duration::from_secs(20)).await;
    let during_pause = drain(&mut h.events);
    assert!(
        !during_pause
            .iter()
            .any(|e| is_settled(e) || matches!(e, PresentationEvent::Advanced { .. })),
        "no playback progress while hidden: {during_pause:?}"
    );

    let resumed_at = Instant::now();
    h.commands
        .send(PlaybackCommand::Visibility(Visibility::Visible))
        .await
        .unwrap();
    let seen = events_until(&mut h.events, WITHIN, is_settled).await;
    assert_eq!(
        seen,
        vec![
            PresentationEvent::PauseChanged {
                paused: false,
                reason: None
            },
            PresentationEvent::Settled { current: 1, next: 2 },
        ]
    );
    assert!(resumed_at.elapsed() < Duration::from_millis(50));

    events_until(&mut h.events, WITHIN, is_advance_from(1)).await;
    let waited = resumed_at.elapsed();
    assert!(
        waited >= Duration::from_secs(12) && waited < Duration::from_millis(12_100),
        "next advance {waited:?} after resume"
    );

    h.cancel.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn manual_pause_survives_visibility_changes() {
    let (mut h, _probe) = launch_headless(fixtures::three_slide_show());
    events_until(&mut h.events, WITHIN, is_advance_from(0)).await;

    h.commands.send(PlaybackCommand::TogglePause).await.unwrap();
    h.commands
        .send(PlaybackCommand::Visibility(Visibility::Hidden))
        .await
        .unwrap();
    h.commands
        .send(PlaybackCommand::Visibility(Visibility::Visible))
        .await
        .unwrap();

    sleep(Duration::from_secs(30)).await;
    let during_pause = drain(&mut h.events);
    assert_eq!(
        during_pause,
        vec![PresentationEvent::PauseChanged {
            paused: true,
            reason: Some(PauseReason::Manual)
        }]
    );

    h.commands.send(PlaybackCommand::TogglePause).await.unwrap();
    let seen = events_until(&mut h.events, WITHIN, is_settled).await;
    assert_eq!(
        seen,
        vec![
            PresentationEvent::PauseChanged {
                paused: false,
                reason: None
            },
            PresentationEvent::Settled { current: 1, next: 2 },
        ]
    );

    h.cancel.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn unavailable_next_slide_stalls_until_it_appears() {
    let source = fixtures::three_slide_show();
    let body = source.remove_file(&fixtures::slide_file(1)).unwrap();
    let source = Arc::new(source);

    let (commands, command_rx) = mpsc::channel(8);
    let (event_tx, mut events) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    let started = Instant::now();
    let task = tokio::spawn(scheduler::run(
        Configuration::default(),
        source.clone(),
        HeadlessSurface::new(),
        command_rx,
        event_tx,
        cancel.clone(),
    ));

    events_until(&mut events, WITHIN, |e| {
        *e == PresentationEvent::Status(PresentationStatus::Playing)
    })
    .await;
    sleep(Duration::from_secs(1)).await;
    assert!(
        !drain(&mut events)
            .iter()
            .any(|e| matches!(e, PresentationEvent::Advanced { .. })),
        "advance must stall while slide 1 is missing"
    );

    source.insert_file(&fixtures::slide_file(1), body);
    events_until(&mut events, WITHIN, is_advance_from(0)).await;
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(12) && elapsed < Duration::from_millis(12_100),
        "advance retried after {elapsed:?}"
    );

    drop(commands);
    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn missing_manifest_fails_the_session() {
    let (mut h, probe) = launch_headless(MemorySource::new());

    let seen = events_until(&mut h.events, WITHIN, |e| {
        matches!(e, PresentationEvent::Status(PresentationStatus::Failed(_)))
    })
    .await;
    assert_eq!(
        seen[0],
        PresentationEvent::Status(PresentationStatus::Loading)
    );
    let err = h.task.await.unwrap().unwrap_err();
    assert!(format!("{err:#}").contains("manifest"), "{err:#}");
    assert_eq!(probe.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn manifest_server_error_fails_the_session() {
    let source = fixtures::three_slide_show().with_status("manifest.json", 503);
    let (mut h, _probe) = launch_headless(source);

    let seen = events_until(&mut h.events, WITHIN, |e| {
        matches!(e, PresentationEvent::Status(PresentationStatus::Failed(_)))
    })
    .await;
    let Some(PresentationEvent::Status(PresentationStatus::Failed(reason))) = seen.last() else {
        unreachable!();
    };
    assert!(reason.contains("503"), "{reason}");
    assert!(h.task.await.unwrap().is_err());
}

#[tokio::test(start_paused = true)]
async fn empty_manifest_reports_no_slides() {
    let source = MemorySource::new().with_file("manifest.json", r#"{"total_slides": 0, "slides": []}"#);
    let (mut h, _probe) = launch_headless(source);

    let seen = events_until(&mut h.events, WITHIN, |e| {
        matches!(e, PresentationEvent::Status(PresentationStatus::Failed(_)))
    })
    .await;
    assert_eq!(
        seen.last(),
        Some(&PresentationEvent::Status(PresentationStatus::Failed(
            "no slides found in manifest".into()
        )))
    );
    assert!(h.task.await.unwrap().is_err());
}

#[tokio::test(start_paused = true)]
async fn missing_first_slide_fails_the_session() {
    let source = fixtures::three_slide_show();
    source.remove_file(&fixtures::slide_file(0));
    let (h, _probe) = launch_headless(source);

    let err = h.task.await.unwrap().unwrap_err();
    assert!(format!("{err:#}").contains("first slide"), "{err:#}");
}

#[tokio::test(start_paused = true)]
async fn surface_that_never_becomes_ready_is_fatal() {
    let cfg = Configuration {
        surface_ready: SurfaceRetry {
            attempts: 3,
            interval: Duration::from_millis(100),
        },
        ..Configuration::default()
    };
    let surface = FlakySurface::never_ready();
    let probe = surface.probe();
    let mut h = launch(cfg, fixtures::three_slide_show(), surface);

    let seen = events_until(&mut h.events, WITHIN, |e| {
        matches!(e, PresentationEvent::Status(PresentationStatus::Failed(_)))
    })
    .await;
    let Some(PresentationEvent::Status(PresentationStatus::Failed(reason))) = seen.last() else {
        unreachable!();
    };
    assert!(reason.contains("3 attempts"), "{reason}");
    assert!(h.task.await.unwrap().is_err());
    assert_eq!(probe.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_surface_is_waited_for() {
    let surface = FlakySurface::ready_after(4);
    let probe = surface.probe();
    let mut h = launch(Configuration::default(), fixtures::three_slide_show(), surface);

    events_until(&mut h.events, WITHIN, |e| {
        *e == PresentationEvent::Status(PresentationStatus::Playing)
    })
    .await;
    assert!(h.started.elapsed() >= Duration::from_millis(300));
    assert_eq!(probe.shape_count(), fixtures::TRIANGLES_PER_SLIDE);

    h.cancel.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_surface_updates() {
    let (mut h, probe) = launch_headless(fixtures::three_slide_show());
    events_until(&mut h.events, WITHIN, is_advance_from(0)).await;
    sleep(Duration::from_secs(1)).await;

    h.cancel.cancel();
    h.task.await.unwrap().unwrap();
    let frozen = probe.mutation_count();
    assert!(frozen > 0);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(probe.mutation_count(), frozen);
    assert!(
        !drain(&mut h.events).iter().any(is_settled),
        "no settle after teardown"
    );
}
