use crate::wire::{BEGIN_US_HEADER, END_US_HEADER};
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Microseconds since the Unix epoch on this host.
pub fn now_micros() -> u64 {
    u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0)
}

/// Window during which a node worked on one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTiming {
    pub begin_us: u64,
    pub end_us: u64,
}

impl ServerTiming {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &str| -> Option<u64> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        };
        let begin_us = read(BEGIN_US_HEADER)?;
        let end_us = read(END_US_HEADER)?;
        (end_us >= begin_us).then_some(Self { begin_us, end_us })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.end_us - self.begin_us)
    }
}

/// Node-reported timings collected by a client, keyed by client operation.
#[derive(Debug, Default)]
pub struct TimingProfile {
    entries: Mutex<BTreeMap<String, Vec<ServerTiming>>>,
}

impl TimingProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, operation: &str, timing: ServerTiming) {
        self.entries
            .lock()
            .await
            .entry(operation.to_string())
            .or_default()
            .push(timing);
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Vec<ServerTiming>> {
        self.entries.lock().await.clone()
    }

    pub async fn get(&self, operation: &str) -> Option<Vec<ServerTiming>> {
        self.entries.lock().await.get(operation).cloned()
    }

    /// Total number of recorded timings across all operations.
    pub async fn count(&self) -> usize {
        self.entries.lock().await.values().map(Vec::len).sum()
    }

    pub async fn total(&self, operation: &str) -> Duration {
        self.entries
            .lock()
            .await
            .get(operation)
            .map(|timings| timings.iter().map(ServerTiming::duration).sum())
            .unwrap_or_default()
    }

    pub async fn clear(&self) {
        for timings in self.entries.lock().await.values_mut() {
            timings.clear();
        }
    }

    /// Clears one operation; returns false if it was never recorded.
    pub async fn clear_operation(&self, operation: &str) -> bool {
        match self.entries.lock().await.get_mut(operation) {
            Some(timings) => {
                timings.clear();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_timing_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(ServerTiming::from_headers(&headers).is_none());

        headers.insert(BEGIN_US_HEADER, HeaderValue::from_static("100"));
        headers.insert(END_US_HEADER, HeaderValue::from_static("350"));
        let timing = ServerTiming::from_headers(&headers).unwrap();
        assert_eq!(timing.duration(), Duration::from_micros(250));

        headers.insert(END_US_HEADER, HeaderValue::from_static("50"));
        assert!(ServerTiming::from_headers(&headers).is_none());
        headers.insert(END_US_HEADER, HeaderValue::from_static("soon"));
        assert!(ServerTiming::from_headers(&headers).is_none());
    }

    #[tokio::test]
    async fn test_profile_groups_by_operation() {
        let profile = TimingProfile::new();
        profile
            .record("store_meta", ServerTiming { begin_us: 0, end_us: 10 })
            .await;
        profile
            .record("store_meta", ServerTiming { begin_us: 20, end_us: 25 })
            .await;
        profile
            .record("get_prefix", ServerTiming { begin_us: 5, end_us: 6 })
            .await;

        assert_eq!(profile.count().await, 3);
        assert_eq!(profile.get("store_meta").await.unwrap().len(), 2);
        assert_eq!(profile.total("store_meta").await, Duration::from_micros(15));
        assert!(profile.get("load_layers").await.is_none());

        assert!(profile.clear_operation("store_meta").await);
        assert!(!profile.clear_operation("load_layers").await);
        assert_eq!(profile.count().await, 1);

        profile.clear().await;
        assert_eq!(profile.count().await, 0);
        assert_eq!(profile.snapshot().await.len(), 2);
    }
}
