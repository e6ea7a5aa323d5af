/// Whether the presentation is currently shown to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Inputs to the scheduler from the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    TogglePause,
    Visibility(Visibility),
}

/// Who requested the current pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Manual,
    Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationStatus {
    Loading,
    Playing,
    Failed(String),
}

/// Caption text for the committed slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub index: usize,
    pub name: String,
    pub source_image: Option<String>,
}

/// Coarse notifications for the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationEvent {
    Status(PresentationStatus),
    /// Dominant colors of the slide being transitioned to.
    PaletteChanged(Vec<String>),
    CaptionChanged(Caption),
    /// Sent once per session, when the first advance begins.
    FirstTransitionStarted,
    Advanced {
        from: usize,
        to: usize,
        animated: bool,
    },
    Settled {
        current: usize,
        next: usize,
    },
    PauseChanged {
        paused: bool,
        reason: Option<PauseReason>,
    },
}
