//! Live projection of the shop collection.
//!
//! `LiveShopFeed` owns at most one store listener on the ordered shop query
//! and republishes the mapped list through a `watch` channel. Every snapshot
//! replaces the list wholesale with a new `Arc`, so consumers can detect
//! changes with `Arc::ptr_eq`; the `Arc` stays the same while nothing is pushed.
//!
//! State machine: `Idle -> Subscribed` on [`LiveShopFeed::start`], back to
//! `Idle` on [`LiveShopFeed::stop`], and `Subscribed -> Error` when the
//! listener reports a transport failure. An errored feed keeps its last list
//! and only resumes after another `start`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::shop::{map_shop, Shop};
use crate::repository::ShopRepository;
use crate::store::{Document, ListenerHandle, SnapshotSink, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Idle,
    Subscribed,
    Error,
}

/// What subscribers of the feed observe.
#[derive(Debug, Clone)]
pub struct FeedView {
    pub shops: Arc<[Shop]>,
    pub status: FeedStatus,
    /// Last listener or refresh failure, cleared by the next successful publish.
    pub error: Option<String>,
    /// True until the first snapshot of the current subscription arrives.
    pub loading: bool,
}

impl Default for FeedView {
    fn default() -> Self {
        Self {
            shops: Arc::from(Vec::new()),
            status: FeedStatus::Idle,
            error: None,
            loading: false,
        }
    }
}

struct Inner {
    // bumped by every start and stop; listener callbacks of older generations are ignored
    generation: u64,
    // bumped by stop only; refreshes spanning a stop are not published
    stops: u64,
    status: FeedStatus,
    listener: Option<ListenerHandle>,
}

struct Shared {
    state: Mutex<Inner>,
    tx: watch::Sender<FeedView>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct LiveShopFeed {
    repo: ShopRepository,
    shared: Arc<Shared>,
}

fn map_documents(docs: &[Document]) -> Arc<[Shop]> {
    docs.iter().map(|d| map_shop(&d.id, &d.fields)).collect()
}

impl LiveShopFeed {
    pub fn new(repo: ShopRepository) -> Self {
        let (tx, _) = watch::channel(FeedView::default());
        Self {
            repo,
            shared: Arc::new(Shared {
                state: Mutex::new(Inner {
                    generation: 0,
                    stops: 0,
                    status: FeedStatus::Idle,
                    listener: None,
                }),
                tx,
            }),
        }
    }

    pub fn current(&self) -> FeedView {
        self.shared.tx.borrow().clone()
    }

    #[cfg(test)]
    pub fn status(&self) -> FeedStatus {
        self.shared.lock().status
    }

    #[cfg(test)]
    /// Receiver notified on every publish, list or status.
    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.shared.tx.subscribe()
    }

    /// Opens the live listener, replacing any listener already open.
    pub async fn start(&self) -> Result<(), AppError> {
        let (generation, previous) = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.status = FeedStatus::Subscribed;
            self.shared.tx.send_modify(|view| {
                view.status = FeedStatus::Subscribed;
                view.error = None;
                view.loading = true;
            });
            (inner.generation, inner.listener.take())
        };
        // released outside the state lock: cancelling waits for an in-flight delivery
        drop(previous);

        let subscribed = self
            .repo
            .store()
            .subscribe(&ShopRepository::ordered_query(), self.sink(generation))
            .await;

        let mut inner = self.shared.lock();
        match subscribed {
            Ok(handle) if inner.generation == generation => {
                inner.listener = Some(handle);
                info!(generation, "shop feed subscribed");
                Ok(())
            }
            Ok(handle) => {
                // superseded by a later start or stop while subscribing
                drop(inner);
                drop(handle);
                Ok(())
            }
            Err(e) => {
                if inner.generation == generation {
                    Self::enter_error(&self.shared, &mut inner, &e);
                }
                Err(e.into())
            }
        }
    }

    /// Releases the listener. Nothing is pushed once this returns.
    pub fn stop(&self) {
        let previous = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.stops += 1;
            let was = inner.status;
            inner.status = FeedStatus::Idle;
            if was != FeedStatus::Idle {
                info!(generation = inner.generation, "shop feed stopped");
                self.shared.tx.send_modify(|view| {
                    view.status = FeedStatus::Idle;
                    view.loading = false;
                });
            }
            inner.listener.take()
        };
        drop(previous);
    }

    /// One-shot fetch that republishes the list without waiting for a push.
    ///
    /// Concurrent refreshes are not coalesced; whichever completes last wins.
    pub async fn refresh(&self) -> Result<Arc<[Shop]>, AppError> {
        let stops = self.shared.lock().stops;
        let fetched = self.repo.list().await;

        let inner = self.shared.lock();
        let current = inner.stops == stops;
        match fetched {
            Ok(list) => {
                let shops: Arc<[Shop]> = list.into();
                if current {
                    let published = shops.clone();
                    // an errored listener keeps reporting until the next start
                    let clear_error = inner.status != FeedStatus::Error;
                    self.shared.tx.send_modify(|view| {
                        view.shops = published;
                        if clear_error {
                            view.error = None;
                        }
                    });
                }
                Ok(shops)
            }
            Err(e) => {
                if current {
                    let message = e.to_string();
                    self.shared.tx.send_modify(|view| view.error = Some(message));
                }
                Err(e)
            }
        }
    }

    fn sink(&self, generation: u64) -> SnapshotSink {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |snapshot: Result<Vec<Document>, StoreError>| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mapped = snapshot.as_deref().map(map_documents);
            let mut inner = shared.lock();
            if inner.generation != generation || inner.status != FeedStatus::Subscribed {
                return;
            }
            match mapped {
                Ok(shops) => shared.tx.send_modify(|view| {
                    view.shops = shops;
                    view.error = None;
                    view.loading = false;
                }),
                Err(e) => Self::enter_error(&shared, &mut inner, e),
            }
        })
    }

    fn enter_error(shared: &Shared, inner: &mut Inner, err: &StoreError) {
        warn!(error = %err, "shop feed listener failed");
        inner.status = FeedStatus::Error;
        let message = err.to_string();
        shared.tx.send_modify(|view| {
            view.status = FeedStatus::Error;
            view.error = Some(message);
            view.loading = false;
        });
    }
}

impl Drop for LiveShopFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
