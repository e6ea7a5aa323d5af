//! Playback clock: owns the playback state, the animator and the surface, and
//! multiplexes commands, period ticks, settle notifications and frame ticks.

pub mod pause;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Configuration;
use crate::error::{EngineError, StoreError};
use crate::events::{Caption, PlaybackCommand, PresentationEvent, PresentationStatus, Visibility};
use crate::manifest::load_manifest;
use crate::render::animator::TransitionAnimator;
use crate::render::surface::{RenderSurface, wait_until_ready};
use crate::source::DataSource;
use crate::store::SlideStore;
use crate::tasks::preloader::{self, PreloadRequest};

use self::pause::PauseController;
use self::state::{Committed, PlaybackState};

/// Fired by a settle timer once the transition of `generation` has run its course.
#[derive(Debug, Clone, Copy)]
struct SettleDue(u64);

/// Runs the presentation until `cancel` fires.
///
/// Startup failures (manifest, first slide, surface) are reported as a
/// `Failed` status and returned as errors.
#[instrument(skip_all, name = "scheduler")]
pub async fn run<S, R>(
    cfg: Configuration,
    source: Arc<S>,
    surface: R,
    mut commands: Receiver<PlaybackCommand>,
    events: Sender<PresentationEvent>,
    cancel: CancellationToken,
) -> Result<()>
where
    S: DataSource,
    R: RenderSurface,
{
    let (settle_tx, mut settle_rx) = mpsc::channel::<SettleDue>(4);
    let mut session = match Session::start(&cfg, source, surface, events.clone(), settle_tx, &cancel).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!("cancelled during startup");
            return Ok(());
        }
        Err(err) => {
            error!(error = %err, "presentation failed to start");
            emit(&events, PresentationEvent::Status(PresentationStatus::Failed(err.to_string()))).await;
            return Err(err.into());
        }
    };

    let period = cfg.playback.period();
    let mut frames = interval(cfg.playback.frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut commands_open = true;

    session.advance(&cancel).await;
    let mut next_tick = Some(Instant::now() + period);

    loop {
        let animating = session.visible && session.animator.is_active();
        select! {
            _ = cancel.cancelled() => break,

            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    if let Some(resumed) = session.on_command(command).await {
                        next_tick = resumed.then(|| Instant::now() + period);
                    }
                }
                None => {
                    debug!("command channel closed");
                    commands_open = false;
                }
            },

            _ = sleep_until(next_tick.unwrap_or_else(Instant::now)), if next_tick.is_some() => {
                let scheduled = next_tick.unwrap_or_else(Instant::now);
                if session.pause.is_paused() {
                    next_tick = None;
                    continue;
                }
                session.advance(&cancel).await;
                let now = Instant::now();
                let mut upcoming = scheduled + period;
                if upcoming <= now {
                    upcoming = now + period;
                }
                next_tick = Some(upcoming);
            }

            Some(SettleDue(generation)) = settle_rx.recv() => {
                session.on_settle(generation).await;
            }

            _ = frames.tick(), if animating => {
                session.animator.frame(Instant::now(), &mut session.surface);
            }
        }
    }

    session.shutdown().await;
    info!("playback stopped");
    Ok(())
}

struct Session<S, R> {
    store: SlideStore<S>,
    surface: R,
    animator: TransitionAnimator,
    state: PlaybackState,
    pause: PauseController,
    visible: bool,
    events: Sender<PresentationEvent>,
    preloader: PreloaderHandle,
    preload_count: usize,
    transition_duration: Duration,
    settle_tx: Sender<SettleDue>,
    settle_timer: Option<JoinHandle<()>>,
    caption_index: Option<usize>,
    first_transition_started: bool,
}

impl<S: DataSource, R: RenderSurface> Session<S, R> {
    /// Loads the manifest and slide 0, waits for the surface and draws the
    /// first slide. `Ok(None)` means cancellation arrived first.
    async fn start(
        cfg: &Configuration,
        source: Arc<S>,
        mut surface: R,
        events: Sender<PresentationEvent>,
        settle_tx: Sender<SettleDue>,
        cancel: &CancellationToken,
    ) -> Result<Option<Self>, EngineError> {
        emit(&events, PresentationEvent::Status(PresentationStatus::Loading)).await;

        let Some(manifest) = cancel.run_until_cancelled(load_manifest(source.as_ref())).await else {
            return Ok(None);
        };
        let manifest = manifest?;
        if manifest.is_empty() {
            return Err(EngineError::EmptyManifest);
        }
        let store = SlideStore::new(source, manifest);

        if let Some(entry) = store.manifest().entry(0) {
            emit(&events, PresentationEvent::PaletteChanged(entry.dominant_colors.clone())).await;
        }
        match cancel.run_until_cancelled(store.ensure_slide_loaded(0)).await {
            None => return Ok(None),
            Some(result) => result.map_err(EngineError::FirstSlide)?,
        }
        let first = store
            .get_slide(0)
            .ok_or(EngineError::FirstSlide(StoreError::UnknownSlide(0)))?;

        let preloader = PreloaderHandle::spawn(store.clone(), cfg.preload.max_concurrent, cancel);
        let state = PlaybackState::new(store.manifest().total_slides);
        preloader.request(state.lookahead(cfg.preload.count));

        let ready = cancel
            .run_until_cancelled(wait_until_ready(&mut surface, &cfg.surface_ready))
            .await;
        match ready {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                preloader.shutdown().await;
                return Err(err.into());
            }
            None => {
                preloader.shutdown().await;
                return Ok(None);
            }
        }

        let mut session = Self {
            store,
            surface,
            animator: TransitionAnimator::new(&cfg.playback),
            state,
            pause: PauseController::new(),
            visible: true,
            events,
            preloader,
            preload_count: cfg.preload.count,
            transition_duration: cfg.playback.transition_duration,
            settle_tx,
            settle_timer: None,
            caption_index: None,
            first_transition_started: false,
        };
        session.animator.render_initial(&first, &mut session.surface);
        session.update_caption(0).await;
        emit(&session.events, PresentationEvent::Status(PresentationStatus::Playing)).await;
        info!(
            total_slides = session.store.manifest().total_slides,
            "playback started"
        );
        Ok(Some(session))
    }

    /// Starts the `current -> next` advance. Returns false when the advance
    /// stalled because the next slide is unavailable.
    #[instrument(skip_all, fields(from = self.state.current(), to = self.state.next()))]
    async fn advance(&mut self, cancel: &CancellationToken) -> bool {
        if let Some(committed) = self.state.flush() {
            debug!("committing unsettled advance before the next one");
            self.after_commit(committed).await;
        }
        let (from, to) = (self.state.current(), self.state.next());

        if !self.store.contains_slide(to) {
            debug!(slide = to, "next slide not preloaded; loading now");
            match cancel.run_until_cancelled(self.store.ensure_slide_loaded(to)).await {
                None => return false,
                Some(Err(err)) => {
                    warn!(slide = to, error = %err, "next slide unavailable; holding current slide");
                    return false;
                }
                Some(Ok(())) => {}
            }
        }
        let (Some(from_slide), Some(to_slide)) = (self.store.get_slide(from), self.store.get_slide(to))
        else {
            warn!("slide vanished from store; holding current slide");
            return false;
        };

        if let Some(entry) = self.store.manifest().entry(to) {
            let palette = entry.dominant_colors.clone();
            emit(&self.events, PresentationEvent::PaletteChanged(palette)).await;
        }

        let advance = self.state.begin();
        let animated = match self.store.get_transition(from, to) {
            Some(transition) => {
                self.animator
                    .start(&transition, &from_slide, &to_slide, Instant::now(), &mut self.surface);
                true
            }
            None => {
                warn!("no transition available; cutting to next slide");
                self.animator.snap_to(&to_slide, &mut self.surface);
                false
            }
        };

        if !self.first_transition_started {
            self.first_transition_started = true;
            emit(&self.events, PresentationEvent::FirstTransitionStarted).await;
        }
        emit(&self.events, PresentationEvent::Advanced { from, to, animated }).await;
        self.arm_settle(advance.generation);
        true
    }

    fn arm_settle(&mut self, generation: u64) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        let tx = self.settle_tx.clone();
        let delay = self.transition_duration;
        debug!(generation, "settle timer armed");
        self.settle_timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(SettleDue(generation)).await;
        }));
    }

    async fn on_settle(&mut self, generation: u64) {
        if self.pause.is_paused() {
            if self.state.defer(generation) {
                debug!(generation, "settle deferred while paused");
            }
            return;
        }
        match self.state.commit(generation) {
            Some(committed) => self.after_commit(committed).await,
            None => debug!(generation, "stale settle ignored"),
        }
    }

    async fn after_commit(&mut self, committed: Committed) {
        debug!(current = committed.current, next = committed.next, "advance settled");
        emit(&self.events, PresentationEvent::Settled {
            current: committed.current,
            next: committed.next,
        })
        .await;
        self.update_caption(committed.current).await;
        self.preloader
            .request(self.state.lookahead(self.preload_count));
    }

    /// Applies a command. Returns `Some(true)` on resume, `Some(false)` on
    /// pause and `None` when the pause state did not change.
    async fn on_command(&mut self, command: PlaybackCommand) -> Option<bool> {
        if let PlaybackCommand::Visibility(visibility) = command {
            self.visible = visibility == Visibility::Visible;
        }
        let change = self.pause.on_command(command)?;
        let resumed = change.resumed();
        info!(paused = !resumed, reason = ?self.pause.reason(), "pause state changed");
        emit(&self.events, PresentationEvent::PauseChanged {
            paused: !resumed,
            reason: self.pause.reason(),
        })
        .await;
        if resumed {
            if let Some(generation) = self.state.take_deferred() {
                if let Some(committed) = self.state.commit(generation) {
                    self.after_commit(committed).await;
                }
            }
        }
        Some(resumed)
    }

    async fn update_caption(&mut self, index: usize) {
        if self.caption_index == Some(index) {
            return;
        }
        let Some(entry) = self.store.manifest().entry(index) else {
            return;
        };
        let source_image = entry
            .image_path
            .clone()
            .or_else(|| self.store.get_slide(index).and_then(|s| s.image_path.clone()));
        let caption = Caption {
            index,
            name: entry.name.clone(),
            source_image,
        };
        self.caption_index = Some(index);
        emit(&self.events, PresentationEvent::CaptionChanged(caption)).await;
    }

    async fn shutdown(mut self) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        self.preloader.shutdown().await;
    }
}

async fn emit(events: &Sender<PresentationEvent>, event: PresentationEvent) {
    if events.send(event).await.is_err() {
        debug!("presentation listener gone; dropping event");
    }
}

struct PreloaderHandle {
    requests: Sender<PreloadRequest>,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl PreloaderHandle {
    fn spawn<S: DataSource>(store: SlideStore<S>, max_in_flight: usize, parent: &CancellationToken) -> Self {
        let (requests, rx) = mpsc::channel(8);
        let cancel = parent.child_token();
        let task = tokio::spawn(preloader::run(store, rx, cancel.clone(), max_in_flight));
        Self {
            requests,
            cancel,
            task,
        }
    }

    fn request(&self, indices: Vec<usize>) {
        if indices.is_empty() {
            return;
        }
        if let Err(err) = self.requests.try_send(PreloadRequest(indices)) {
            debug!("preload request dropped: {err}");
        }
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        match self.task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("preloader exited with error: {err:?}"),
            Err(err) => warn!("preloader task failed: {err}"),
        }
    }
}
