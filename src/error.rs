use thiserror::Error;

/// Failure to retrieve a single data file from a [`crate::source::DataSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The file does not exist under the data root.
    #[error("{path}: not found")]
    NotFound { path: String },

    /// The server answered with a non-success status.
    #[error("{path}: HTTP status {status}")]
    Status { path: String, status: u16 },

    /// Transport or filesystem failure.
    #[error("{path}: {message}")]
    Transport { path: String, message: String },
}

/// The manifest could not be loaded; fatal for the session.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    #[error("failed to fetch manifest: {0}")]
    Fetch(#[from] FetchError),

    #[error("manifest is not valid JSON: {0}")]
    Parse(String),

    #[error("manifest is inconsistent: {0}")]
    Invalid(String),
}

/// Per-resource load failures reported by the slide store.
///
/// These never abort playback: the scheduler only observes whether a slide
/// or transition ended up in the store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("slide {0} is not listed in the manifest")]
    UnknownSlide(usize),

    #[error("failed to fetch slide {index}: {source}")]
    SlideFetch { index: usize, source: FetchError },

    #[error("slide {index} ({filename}) is malformed: {message}")]
    SlideParse {
        index: usize,
        filename: String,
        message: String,
    },

    #[error("failed to fetch transition {from} -> {to}: {source}")]
    TransitionFetch {
        from: usize,
        to: usize,
        source: FetchError,
    },

    #[error("transition {from} -> {to} ({filename}) is malformed: {message}")]
    TransitionParse {
        from: usize,
        to: usize,
        filename: String,
        message: String,
    },
}

/// Rendering surface problems.
#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    #[error("render surface was not ready after {attempts} attempts")]
    NotReady { attempts: u32 },
}

/// Fatal startup failures; the presentation shows an error state instead of playing.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("no slides found in manifest")]
    EmptyManifest,

    #[error("first slide could not be loaded: {0}")]
    FirstSlide(StoreError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}
