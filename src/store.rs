//! Session cache of slides and transitions.
//!
//! Slides are fetched at most once per load attempt: concurrent callers asking
//! for the same index await a single shared load. Nothing is ever evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::{Manifest, Slide, Transition, TransitionRef};
use crate::source::DataSource;

type SharedLoad = Shared<BoxFuture<'static, Result<(), StoreError>>>;

pub struct SlideStore<S> {
    inner: Arc<StoreInner<S>>,
}

struct StoreInner<S> {
    source: Arc<S>,
    manifest: Arc<Manifest>,
    slides: RwLock<HashMap<usize, Arc<Slide>>>,
    transitions: RwLock<HashMap<(usize, usize), Arc<Transition>>>,
    in_flight: Mutex<HashMap<usize, SharedLoad>>,
}

impl<S> Clone for SlideStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DataSource> SlideStore<S> {
    pub fn new(source: Arc<S>, manifest: Manifest) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                source,
                manifest: Arc::new(manifest),
                slides: RwLock::new(HashMap::new()),
                transitions: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    pub fn get_slide(&self, index: usize) -> Option<Arc<Slide>> {
        self.inner
            .slides
            .read()
            .expect("slide cache poisoned")
            .get(&index)
            .cloned()
    }

    pub fn contains_slide(&self, index: usize) -> bool {
        self.inner
            .slides
            .read()
            .expect("slide cache poisoned")
            .contains_key(&index)
    }

    pub fn loaded_slide_count(&self) -> usize {
        self.inner.slides.read().expect("slide cache poisoned").len()
    }

    pub fn get_transition(&self, from: usize, to: usize) -> Option<Arc<Transition>> {
        self.inner
            .transitions
            .read()
            .expect("transition cache poisoned")
            .get(&(from, to))
            .cloned()
    }

    /// Loads slide `index` and its outgoing transitions unless already cached.
    ///
    /// Only slide failures are returned; a transition that fails to load is
    /// logged and simply stays absent.
    pub async fn ensure_slide_loaded(&self, index: usize) -> Result<(), StoreError> {
        if self.contains_slide(index) {
            debug!(slide = index, "slide already cached");
            return Ok(());
        }
        let load = {
            let mut in_flight = self.inner.in_flight.lock().expect("in-flight map poisoned");
            // A load may have completed between the check above and taking the lock.
            if self.contains_slide(index) {
                return Ok(());
            }
            in_flight
                .entry(index)
                .or_insert_with(|| {
                    debug!(slide = index, "starting slide load");
                    let store = self.clone();
                    async move {
                        let result = store.load(index).await;
                        store
                            .inner
                            .in_flight
                            .lock()
                            .expect("in-flight map poisoned")
                            .remove(&index);
                        result
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };
        load.await
    }

    async fn load(&self, index: usize) -> Result<(), StoreError> {
        let entry = self
            .inner
            .manifest
            .entry(index)
            .cloned()
            .ok_or(StoreError::UnknownSlide(index))?;

        let bytes = self
            .inner
            .source
            .fetch(&entry.filename)
            .await
            .map_err(|source| StoreError::SlideFetch { index, source })?;
        let slide: Slide =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::SlideParse {
                index,
                filename: entry.filename.clone(),
                message: e.to_string(),
            })?;
        debug!(
            slide = index,
            triangles = slide.triangles.len(),
            "slide stored"
        );
        self.inner
            .slides
            .write()
            .expect("slide cache poisoned")
            .insert(index, Arc::new(slide));

        let loads = entry
            .transitions
            .iter()
            .map(|reference| self.load_transition(index, reference));
        for result in join_all(loads).await {
            if let Err(err) = result {
                warn!(slide = index, error = %err, "transition unavailable");
            }
        }
        Ok(())
    }

    async fn load_transition(&self, from: usize, reference: &TransitionRef) -> Result<(), StoreError> {
        let to = reference.to;
        if self.get_transition(from, to).is_some() {
            return Ok(());
        }
        let bytes = self
            .inner
            .source
            .fetch(&reference.filename)
            .await
            .map_err(|source| StoreError::TransitionFetch { from, to, source })?;
        let transition = Transition::from_json(&bytes, &reference.filename).map_err(|message| {
            StoreError::TransitionParse {
                from,
                to,
                filename: reference.filename.clone(),
                message,
            }
        })?;
        if (transition.from, transition.to) != (from, to) {
            warn!(
                from,
                to,
                file_from = transition.from,
                file_to = transition.to,
                "transition file disagrees with manifest; keeping manifest indices"
            );
        }
        debug!(from, to, pairings = transition.pairings.len(), "transition stored");
        self.inner
            .transitions
            .write()
            .expect("transition cache poisoned")
            .insert(
                (from, to),
                Arc::new(Transition {
                    from,
                    to,
                    pairings: transition.pairings,
                }),
            );
        Ok(())
    }
}
