//! In-memory doubles and fixture data for unit and integration tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::time::{sleep, timeout};

use crate::error::FetchError;
use crate::events::PresentationEvent;
use crate::render::surface::{HeadlessSurface, RenderSurface, ShapeId, ShapeStyle, SurfaceProbe};
use crate::source::DataSource;

/// `DataSource` backed by a map of paths to bodies. Counts every fetch.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, Vec<u8>>>,
    statuses: Mutex<HashMap<String, u16>>,
    fetches: Mutex<HashMap<String, usize>>,
    latency: Option<Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, body: impl Into<Vec<u8>>) -> Self {
        self.insert_file(path, body);
        self
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answers fetches of `path` with an HTTP-style status error.
    pub fn with_status(self, path: &str, status: u16) -> Self {
        self.statuses
            .lock()
            .expect("statuses poisoned")
            .insert(path.to_string(), status);
        self
    }

    pub fn insert_file(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .expect("files poisoned")
            .insert(path.to_string(), body.into());
    }

    pub fn remove_file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().expect("files poisoned").remove(path)
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches
            .lock()
            .expect("fetches poisoned")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().expect("fetches poisoned").values().sum()
    }
}

impl DataSource for MemorySource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        *self
            .fetches
            .lock()
            .expect("fetches poisoned")
            .entry(path.to_string())
            .or_default() += 1;
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
        if let Some(&status) = self.statuses.lock().expect("statuses poisoned").get(path) {
            return Err(FetchError::Status {
                path: path.to_string(),
                status,
            });
        }
        self.files
            .lock()
            .expect("files poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                path: path.to_string(),
            })
    }
}

/// Wraps a [`HeadlessSurface`] but only reports ready after a number of polls.
pub struct FlakySurface {
    inner: HeadlessSurface,
    ready_after: Option<u32>,
    polls: u32,
}

impl FlakySurface {
    pub fn never_ready() -> Self {
        Self {
            inner: HeadlessSurface::new(),
            ready_after: None,
            polls: 0,
        }
    }

    /// Ready on poll number `polls` (1-based).
    pub fn ready_after(polls: u32) -> Self {
        Self {
            inner: HeadlessSurface::new(),
            ready_after: Some(polls),
            polls: 0,
        }
    }

    pub fn probe(&self) -> SurfaceProbe {
        self.inner.probe()
    }
}

impl RenderSurface for FlakySurface {
    fn is_ready(&mut self) -> bool {
        self.polls += 1;
        self.ready_after.is_some_and(|n| self.polls >= n)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn create_shape(&mut self, id: ShapeId, style: &ShapeStyle) {
        self.inner.create_shape(id, style);
    }

    fn update_shape(&mut self, id: ShapeId, style: &ShapeStyle) {
        self.inner.update_shape(id, style);
    }
}

/// Receives events until one matches `pred`, returning everything seen.
///
/// Panics if the channel closes or nothing matches within `within`.
pub async fn events_until(
    rx: &mut Receiver<PresentationEvent>,
    within: Duration,
    pred: impl Fn(&PresentationEvent) -> bool,
) -> Vec<PresentationEvent> {
    let mut seen = Vec::new();
    let result = timeout(within, async {
        while let Some(event) = rx.recv().await {
            let done = pred(&event);
            seen.push(event);
            if done {
                return true;
            }
        }
        false
    })
    .await;
    match result {
        Ok(true) => seen,
        Ok(false) => panic!("event channel closed; saw {seen:?}"),
        Err(_) => panic!("no matching event within {within:?}; saw {seen:?}"),
    }
}

/// Synthetic slide shows. Every slide has four triangles laid out in a 2x2
/// grid on a 1000x800 canvas; transitions pair triangles one to one.
pub mod fixtures {
    use serde_json::{Value, json};

    use super::MemorySource;
    use crate::manifest::MANIFEST_PATH;

    pub const TRIANGLES_PER_SLIDE: usize = 4;

    pub fn slide_file(index: usize) -> String {
        format!("slide_{index}.json")
    }

    pub fn transition_file(from: usize, to: usize) -> String {
        format!("transition_{from}_to_{to}.json")
    }

    pub fn palette_for(index: usize) -> Vec<String> {
        vec![format!("#{:02x}64c8", (index * 40) % 256), "#ffffff".into()]
    }

    pub fn slide_json(index: usize) -> Value {
        let triangles: Vec<Value> = (0..TRIANGLES_PER_SLIDE)
            .map(|k| {
                let x = (k % 2) as f32 * 500.0;
                let y = (k / 2) as f32 * 400.0;
                json!({
                    "coordinates": [[x, y], [x + 500.0, y], [x, y + 400.0]],
                    "color": [(index * 40) % 256, 100, 200],
                })
            })
            .collect();
        json!({
            "name": format!("Slide {index}"),
            "triangles": triangles,
            "image_path": format!("images/slide_{index}.jpg"),
        })
    }

    /// Bare pairing array mapping triangle `k` onto triangle `k`.
    pub fn identity_pairings_json() -> Value {
        Value::Array(
            (0..TRIANGLES_PER_SLIDE)
                .map(|k| json!({"from_index": k, "to_index": k, "distance": 0.0}))
                .collect(),
        )
    }

    pub fn manifest_json(total: usize, edges: &[(usize, usize)]) -> Value {
        let slides: Vec<Value> = (0..total)
            .map(|index| {
                let transitions: Vec<Value> = edges
                    .iter()
                    .filter(|(from, _)| *from == index)
                    .map(|&(from, to)| json!({"to": to, "filename": transition_file(from, to)}))
                    .collect();
                json!({
                    "index": index,
                    "name": format!("Slide {index}"),
                    "filename": slide_file(index),
                    "dominant_colors": palette_for(index),
                    "transitions": transitions,
                })
            })
            .collect();
        json!({"total_slides": total, "slides": slides})
    }

    /// A complete show with `total` slides and a transition file per edge.
    pub fn show(total: usize, edges: &[(usize, usize)]) -> MemorySource {
        let mut source =
            MemorySource::new().with_file(MANIFEST_PATH, manifest_json(total, edges).to_string());
        for index in 0..total {
            source = source.with_file(&slide_file(index), slide_json(index).to_string());
        }
        for &(from, to) in edges {
            source = source.with_file(
                &transition_file(from, to),
                identity_pairings_json().to_string(),
            );
        }
        source
    }

    /// Three slides chained in a loop: 0 -> 1 -> 2 -> 0.
    pub fn three_slide_show() -> MemorySource {
        show(3, &[(0, 1), (1, 2), (2, 0)])
    }
}
