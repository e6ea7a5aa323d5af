use crate::events::{PauseReason, PlaybackCommand, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Running,
    Paused(PauseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseChange {
    pub from: PlaybackMode,
    pub to: PlaybackMode,
}

impl PauseChange {
    pub fn resumed(&self) -> bool {
        self.to == PlaybackMode::Running
    }
}

/// Tracks whether playback is paused and who asked for it.
///
/// A visibility pause lifts itself when the presentation becomes visible
/// again; a manual pause only lifts on an explicit toggle.
pub struct PauseController {
    mode: PlaybackMode,
}

impl Default for PauseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseController {
    pub fn new() -> Self {
        Self {
            mode: PlaybackMode::Running,
        }
    }

    pub fn current(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.mode, PlaybackMode::Paused(_))
    }

    pub fn reason(&self) -> Option<PauseReason> {
        match self.mode {
            PlaybackMode::Running => None,
            PlaybackMode::Paused(reason) => Some(reason),
        }
    }

    pub fn on_command(&mut self, cmd: PlaybackCommand) -> Option<PauseChange> {
        match cmd {
            PlaybackCommand::TogglePause => self.toggle(),
            PlaybackCommand::Visibility(Visibility::Hidden) => self.on_hidden(),
            PlaybackCommand::Visibility(Visibility::Visible) => self.on_visible(),
        }
    }

    pub fn toggle(&mut self) -> Option<PauseChange> {
        match self.mode {
            PlaybackMode::Running => self.goto(PlaybackMode::Paused(PauseReason::Manual)),
            PlaybackMode::Paused(_) => self.goto(PlaybackMode::Running),
        }
    }

    pub fn on_hidden(&mut self) -> Option<PauseChange> {
        match self.mode {
            PlaybackMode::Running => self.goto(PlaybackMode::Paused(PauseReason::Visibility)),
            PlaybackMode::Paused(_) => None,
        }
    }

    pub fn on_visible(&mut self) -> Option<PauseChange> {
        match self.mode {
            PlaybackMode::Paused(PauseReason::Visibility) => self.goto(PlaybackMode::Running),
            _ => None,
        }
    }

    fn goto(&mut self, to: PlaybackMode) -> Option<PauseChange> {
        if self.mode == to {
            return None;
        }
        let change = PauseChange {
            from: self.mode,
            to,
        };
        self.mode = to;
        Some(change)
    }
}
