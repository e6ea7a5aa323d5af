use std::collections::{HashSet, VecDeque};

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::source::DataSource;
use crate::store::SlideStore;

/// Slides the scheduler expects to need soon, nearest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadRequest(pub Vec<usize>);

/// Loads each listed slide that is not yet cached, one after another.
/// Failures are logged and skipped.
pub async fn preload<S: DataSource>(store: &SlideStore<S>, indices: &[usize]) {
    for &index in indices {
        if store.contains_slide(index) {
            continue;
        }
        if let Err(err) = store.ensure_slide_loaded(index).await {
            warn!(slide = index, error = %err, "preload failed");
        }
    }
}

/// Background preloader:
/// - queues requested indices that are neither cached nor already queued,
/// - keeps up to `max_in_flight` loads running,
/// - logs failures; the scheduler notices missing slides on its own.
pub async fn run<S: DataSource>(
    store: SlideStore<S>,
    mut requests: Receiver<PreloadRequest>,
    cancel: CancellationToken,
    max_in_flight: usize,
) -> Result<()> {
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut in_flight: HashSet<usize> = HashSet::new();
    let mut tasks: JoinSet<(usize, Result<(), StoreError>)> = JoinSet::new();
    let mut requests_open = true;

    loop {
        while in_flight.len() < max_in_flight {
            let Some(index) = queue.pop_front() else {
                break;
            };
            if store.contains_slide(index) || in_flight.contains(&index) {
                continue;
            }
            let store = store.clone();
            tasks.spawn(async move { (index, store.ensure_slide_loaded(index).await) });
            in_flight.insert(index);
            debug!(slide = index, "preloading");
        }

        select! {
            _ = cancel.cancelled() => break,

            request = requests.recv(), if requests_open => match request {
                Some(PreloadRequest(indices)) => {
                    for index in indices {
                        let pending = queue.contains(&index) || in_flight.contains(&index);
                        if !pending && !store.contains_slide(index) {
                            queue.push_back(index);
                        }
                    }
                }
                None => requests_open = false,
            },

            Some(joined) = tasks.join_next() => match joined {
                Ok((index, result)) => {
                    in_flight.remove(&index);
                    match result {
                        Ok(()) => debug!(slide = index, "preloaded"),
                        Err(err) => warn!(slide = index, error = %err, "preload failed"),
                    }
                }
                Err(err) => warn!("preload task failed to join: {err}"),
            },

            else => break,
        }
    }

    tasks.abort_all();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::fixtures;
    use std::sync::Arc;

    #[tokio::test]
    async fn preload_skips_cached_and_continues_after_failure() {
        let source = fixtures::show(4, &[]);
        source.remove_file("slide_2.json");
        let source = Arc::new(source);
        let manifest = crate::manifest::load_manifest(source.as_ref()).await.unwrap();
        let store = SlideStore::new(source.clone(), manifest);

        store.ensure_slide_loaded(1).await.unwrap();
        preload(&store, &[1, 2, 3]).await;

        assert_eq!(source.fetch_count("slide_1.json"), 1);
        assert!(!store.contains_slide(2));
        assert!(store.contains_slide(3));
    }
}
