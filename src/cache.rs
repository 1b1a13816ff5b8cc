use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;

pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;
type FetchFn<T> = Box<dyn Fn() -> FetchFuture<T> + Send + Sync>;

struct Entry<T> {
    value: Option<Result<T>>,
    fetched_at: Option<Instant>,
}

/// A lazily refreshed value with a freshness window.
///
/// The lock is held for the whole fetch, so at most one fetch runs per
/// cache and callers that queue behind it get its result. Failures are
/// cached like values until the window expires or [`Cache::reset`] is
/// called.
pub struct Cache<T> {
    name: &'static str,
    fetch: FetchFn<T>,
    duration: Duration,
    entry: Mutex<Entry<T>>,
}

impl<T: Clone + Send + 'static> Cache<T> {
    pub fn new<F, Fut>(name: &'static str, duration: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            name,
            fetch: Box::new(move || Box::pin(fetch())),
            duration,
            entry: Mutex::new(Entry {
                value: None,
                fetched_at: None,
            }),
        }
    }

    pub async fn get(&self) -> Result<T> {
        let mut entry = self.entry.lock().await;

        if let (Some(value), Some(fetched_at)) = (&entry.value, entry.fetched_at) {
            if fetched_at.elapsed() < self.duration {
                return value.clone();
            }
        }

        debug!("Refreshing {} cache", self.name);
        let result = (self.fetch)().await;
        entry.value = Some(result.clone());
        entry.fetched_at = Some(Instant::now());
        result
    }

    /// Forces the next [`Cache::get`] to fetch.
    pub async fn reset(&self) {
        debug!("Resetting {} cache", self.name);
        self.entry.lock().await.fetched_at = None;
    }
}
