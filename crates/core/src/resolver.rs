//! Fetch-once resolver.
//!
//! Turns "give me the bytes for this URL" into a cache-first lookup backed by
//! at most one network fetch per URL at a time:
//!
//! 1. Store hit: bytes are returned without touching the network.
//! 2. Store miss: the caller joins the in-flight fetch for the URL, or
//!    registers a new one. Registration is a single `entry()` call under the
//!    registry lock.
//! 3. Each fetch runs on its own task, bounded by a semaphore. On success the
//!    payload is written to the store, the URL is deregistered, and every
//!    waiter receives the bytes. On failure nothing is written and every
//!    waiter receives the same error.
//!
//! A fetch whose waiters have all gone away is cancelled, which drops the
//! underlying network request. [`Resolver::close`] cancels everything and
//! closes the store.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;

use crate::progress::{ProgressChannel, ProgressState, ProgressSubscription};
use crate::{BlobStore, Error, FetchError, Fetcher};

/// Resolver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Upper bound on simultaneous network fetches across all URLs.
    pub max_concurrent_fetches: usize,
    /// Fail the resolve when the store write after a successful fetch fails.
    /// When false the bytes are still delivered, just not cached.
    pub strict_writes: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self { max_concurrent_fetches: 8, strict_writes: false }
    }
}

/// Counters since the resolver was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverStats {
    /// Resolves answered from the store without a fetch.
    pub hits: u64,
    /// Cache-first resolves that missed the store.
    pub misses: u64,
    /// Fetcher invocations.
    pub fetches: u64,
    /// Callers that joined a fetch already in flight.
    pub coalesced: u64,
    /// Flights that ended in an error.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ResolverStats {
        ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    CacheFirst,
    Refresh,
}

type Outcome = Option<Result<Bytes, Error>>;

/// One in-flight fetch, shared by all of its waiters.
struct Flight {
    progress: ProgressChannel,
    outcome: watch::Sender<Outcome>,
    cancel: CancellationToken,
    /// Only changed while holding the registry lock.
    waiters: AtomicUsize,
    /// Skip the store re-check before fetching.
    force: AtomicBool,
    /// The re-check found the entry, so this flight will not fetch. Only
    /// changed while holding the registry lock.
    served_from_store: AtomicBool,
}

impl Flight {
    fn new(cancel: CancellationToken) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            progress: ProgressChannel::new(),
            outcome,
            cancel,
            waiters: AtomicUsize::new(0),
            force: AtomicBool::new(false),
            served_from_store: AtomicBool::new(false),
        }
    }

    fn is_settled(&self) -> bool {
        self.outcome.borrow().is_some()
    }
}

struct Inner {
    store: BlobStore,
    fetcher: Arc<dyn Fetcher>,
    options: ResolverOptions,
    permits: Semaphore,
    flights: Mutex<HashMap<String, Arc<Flight>>>,
    shutdown: CancellationToken,
    counters: Counters,
}

/// Deduplicating, cache-first resolver over a [`BlobStore`] and a [`Fetcher`].
///
/// Cheap to clone; clones share the registry, the store and the worker pool.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl Resolver {
    pub fn new(store: BlobStore, fetcher: Arc<dyn Fetcher>, options: ResolverOptions) -> Self {
        let workers = options.max_concurrent_fetches.max(1);
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                options,
                permits: Semaphore::new(workers),
                flights: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Bytes for `url`, from the store if present, otherwise fetched once and
    /// stored.
    ///
    /// # Errors
    ///
    /// - `Error::StoreClosed` after [`Resolver::close`]
    /// - `Error::Fetch` when the network or status check fails
    /// - `Error::StorageWrite` when storing fails and `strict_writes` is set
    pub async fn resolve(&self, url: &str) -> Result<Bytes, Error> {
        self.resolve_with(url, Lookup::CacheFirst, &mut |_| {}).await
    }

    /// [`Resolver::resolve`], calling `observe` with each progress snapshot of
    /// the fetch this call waits on. A store hit reports nothing.
    pub async fn resolve_observed(
        &self, url: &str, mut observe: impl FnMut(ProgressState) + Send,
    ) -> Result<Bytes, Error> {
        self.resolve_with(url, Lookup::CacheFirst, &mut observe).await
    }

    /// Fetch `url` again even if it is stored, replacing the stored entry.
    ///
    /// Joins a fetch already in flight for `url` instead of starting another,
    /// unless that flight is answering from the store without fetching.
    pub async fn refresh(&self, url: &str) -> Result<Bytes, Error> {
        self.resolve_with(url, Lookup::Refresh, &mut |_| {}).await
    }

    /// [`Resolver::refresh`] with progress reporting, as in
    /// [`Resolver::resolve_observed`].
    pub async fn refresh_observed(
        &self, url: &str, mut observe: impl FnMut(ProgressState) + Send,
    ) -> Result<Bytes, Error> {
        self.resolve_with(url, Lookup::Refresh, &mut observe).await
    }

    async fn resolve_with(
        &self, url: &str, lookup: Lookup, observe: &mut (dyn FnMut(ProgressState) + Send),
    ) -> Result<Bytes, Error> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::StoreClosed);
        }

        if lookup == Lookup::CacheFirst {
            if let Some(bytes) = self.inner.store.get(url).await? {
                Counters::bump(&self.inner.counters.hits);
                tracing::debug!(url, bytes = bytes.len(), "cache hit");
                return Ok(bytes);
            }
            Counters::bump(&self.inner.counters.misses);
        }

        self.attach(url, lookup)?.wait(observe).await
    }

    /// Join the flight for `url`, registering and starting one if needed.
    fn attach(&self, url: &str, lookup: Lookup) -> Result<Waiter, Error> {
        let mut flights = self.inner.flights.lock();

        if self.inner.shutdown.is_cancelled() {
            return Err(Error::StoreClosed);
        }

        let flight = match flights.entry(url.to_string()) {
            // A refresh must not settle for bytes the flight is about to hand
            // out from the store.
            Entry::Occupied(mut entry)
                if lookup == Lookup::Refresh && entry.get().served_from_store.load(Ordering::Acquire) =>
            {
                tracing::debug!(url, "in-flight entry answered from store; starting refresh");
                let flight = self.start(url);
                entry.insert(Arc::clone(&flight));
                flight
            }
            Entry::Occupied(entry) => {
                Counters::bump(&self.inner.counters.coalesced);
                tracing::debug!(url, "joining in-flight fetch");
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                let flight = self.start(url);
                entry.insert(Arc::clone(&flight));
                flight
            }
        };

        if lookup == Lookup::Refresh {
            flight.force.store(true, Ordering::Release);
        }
        flight.waiters.fetch_add(1, Ordering::AcqRel);
        let rx = flight.outcome.subscribe();

        Ok(Waiter { inner: Arc::clone(&self.inner), url: url.to_string(), flight, rx })
    }

    /// Spawn the task driving a new flight. Caller registers it.
    fn start(&self, url: &str) -> Arc<Flight> {
        let flight = Arc::new(Flight::new(self.inner.shutdown.child_token()));
        tokio::spawn(Inner::run(Arc::clone(&self.inner), url.to_string(), Arc::clone(&flight)));
        flight
    }

    /// Progress of the fetch currently in flight for `url`.
    ///
    /// None when nothing is in flight for `url`. Has no side effects.
    pub fn progress_of(&self, url: &str) -> Option<ProgressSubscription> {
        self.inner.flights.lock().get(url).map(|flight| flight.progress.subscribe())
    }

    /// Number of URLs with a fetch in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.lock().len()
    }

    pub fn stats(&self) -> ResolverStats {
        self.inner.counters.snapshot()
    }

    /// The store this resolver reads and writes.
    pub fn store(&self) -> &BlobStore {
        &self.inner.store
    }

    /// Tear down: cancel every in-flight fetch, reject new work, close the
    /// store.
    ///
    /// Waiters of cancelled fetches receive `StoreClosed`. Calling this more
    /// than once is harmless.
    pub async fn close(&self) -> Result<(), Error> {
        {
            let flights = self.inner.flights.lock();
            if !self.inner.shutdown.is_cancelled() {
                tracing::info!(in_flight = flights.len(), "closing resolver");
            }
            self.inner.shutdown.cancel();
            self.inner.permits.close();
        }

        self.inner.store.close().await
    }
}

impl Inner {
    /// Drive one flight to its single outcome and deliver it.
    async fn run(self: Arc<Self>, url: String, flight: Arc<Flight>) {
        let settle = Settle { inner: &self, url: &url, flight: &flight };

        let outcome = tokio::select! {
            biased;
            _ = flight.cancel.cancelled() => {
                if self.shutdown.is_cancelled() {
                    Err(Error::StoreClosed)
                } else {
                    tracing::debug!(url, "fetch cancelled; no waiters left");
                    Err(Error::Cancelled)
                }
            }
            result = self.fetch_and_store(&url, &flight) => result,
        };

        settle.deliver(outcome);
    }

    async fn fetch_and_store(&self, url: &str, flight: &Flight) -> Result<Bytes, Error> {
        let _permit = self.permits.acquire().await.map_err(|_| Error::StoreClosed)?;

        if !flight.force.load(Ordering::Acquire)
            && let Some(bytes) = self.store.get(url).await?
        {
            let _flights = self.flights.lock();
            if !flight.force.load(Ordering::Acquire) {
                flight.served_from_store.store(true, Ordering::Release);
                tracing::debug!(url, "entry stored while queued; skipping fetch");
                return Ok(bytes);
            }
        }

        Counters::bump(&self.counters.fetches);
        tracing::info!(url, "fetching");
        let started = Instant::now();

        let report = |received: u64, total: Option<u64>| flight.progress.advance(received, total);
        let bytes = self.fetcher.fetch(url, &report).await.map_err(|e: FetchError| {
            tracing::warn!(url, status = ?e.status, cause = %e.cause, "fetch failed");
            Error::Fetch(e)
        })?;
        flight.progress.advance(bytes.len() as u64, None);

        if let Err(e) = self.store.put(url, &bytes).await {
            if self.options.strict_writes {
                tracing::error!(url, error = %e, "store write failed");
                return Err(e);
            }
            tracing::warn!(url, error = %e, "store write failed; delivering uncached bytes");
            return Ok(bytes);
        }

        tracing::info!(
            url,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched and stored"
        );
        Ok(bytes)
    }
}

/// Finishes a flight exactly once: terminal progress, deregistration, then
/// delivery to waiters. If the flight task dies first, waiters still get an
/// error instead of hanging.
struct Settle<'a> {
    inner: &'a Inner,
    url: &'a str,
    flight: &'a Arc<Flight>,
}

impl Settle<'_> {
    fn deliver(&self, outcome: Result<Bytes, Error>) {
        match &outcome {
            Ok(_) => self.flight.progress.finish_cached(),
            Err(_) => {
                Counters::bump(&self.inner.counters.failures);
                self.flight.progress.finish_failed();
            }
        }

        {
            let mut flights = self.inner.flights.lock();
            if flights.get(self.url).is_some_and(|current| Arc::ptr_eq(current, self.flight)) {
                flights.remove(self.url);
            }
        }

        self.flight.outcome.send_replace(Some(outcome));
    }
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        if !self.flight.is_settled() {
            self.deliver(Err(Error::Fetch(FetchError::transport("fetch task ended without an outcome"))));
        }
    }
}

/// A caller attached to a flight.
///
/// Dropping the last waiter of an unsettled flight cancels it.
struct Waiter {
    inner: Arc<Inner>,
    url: String,
    flight: Arc<Flight>,
    rx: watch::Receiver<Outcome>,
}

impl Waiter {
    async fn wait(mut self, observe: &mut (dyn FnMut(ProgressState) + Send)) -> Result<Bytes, Error> {
        let mut progress = self.flight.progress.subscribe();
        observe(progress.current());
        let mut watching = true;

        let settled = async { self.rx.wait_for(Option::is_some).await.ok().and_then(|o| o.clone()) };
        tokio::pin!(settled);

        loop {
            tokio::select! {
                biased;
                outcome = &mut settled => {
                    return outcome.unwrap_or_else(|| {
                        Err(Error::Fetch(FetchError::transport("fetch task ended without an outcome")))
                    });
                }
                state = progress.changed(), if watching => match state {
                    Some(state) => observe(state),
                    None => watching = false,
                },
            }
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let mut flights = self.inner.flights.lock();
        let remaining = self.flight.waiters.fetch_sub(1, Ordering::AcqRel) - 1;

        if remaining == 0 && !self.flight.is_settled() {
            self.flight.cancel.cancel();
            if flights.get(&self.url).is_some_and(|current| Arc::ptr_eq(current, &self.flight)) {
                flights.remove(&self.url);
            }
            tracing::debug!(url = %self.url, "all waiters detached");
        }
    }
}
