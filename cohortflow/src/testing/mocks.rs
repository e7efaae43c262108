//! Scripted capabilities for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::{Fetcher, Persister, StatsSink, Transform};
use crate::core::{Artifact, StoredArtifact, TransformedArtifact, WorkUnit};
use crate::errors::{FetchError, PersistError, TransformError};

/// Per-reference delays and failures shared by the scripted capabilities.
#[derive(Debug, Default)]
struct Script {
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    jitter: Option<Duration>,
    failures: HashSet<String>,
    calls: Mutex<Vec<String>>,
    completed: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Script {
    fn delay_for(&self, reference: &str) -> Duration {
        let base = self.delays.get(reference).copied().unwrap_or(self.default_delay);
        match self.jitter {
            Some(max) if !max.is_zero() => {
                let extra = rand::thread_rng().gen_range(0..=max.as_micros());
                base + Duration::from_micros(u64::try_from(extra).unwrap_or(u64::MAX))
            }
            _ => base,
        }
    }

    /// Records the call, waits out its delay and reports whether it should fail.
    async fn play(&self, reference: &str) -> bool {
        self.calls.lock().push(reference.to_string());
        let _guard = InFlight::enter(&self.in_flight, &self.peak);

        let delay = self.delay_for(reference);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.failures.contains(reference)
    }

    fn complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts a call as in flight until dropped, including when the future is
/// cancelled mid-delay.
struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fetcher that returns each reference's bytes as its payload, unless a
/// payload was scripted for it.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    script: Script,
    payloads: HashMap<String, Vec<u8>>,
}

impl ScriptedFetcher {
    /// Creates a fetcher that succeeds immediately for every reference.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the payload returned for `reference`.
    #[must_use]
    pub fn with_payload(mut self, reference: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        self.payloads.insert(reference.into(), payload.into());
        self
    }

    /// Delays fetches of `reference`.
    #[must_use]
    pub fn with_delay(mut self, reference: impl Into<String>, delay: Duration) -> Self {
        self.script.delays.insert(reference.into(), delay);
        self
    }

    /// Delays every fetch without its own delay.
    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.script.default_delay = delay;
        self
    }

    /// Adds up to `max` random extra delay to every fetch.
    #[must_use]
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.script.jitter = Some(max);
        self
    }

    /// Makes fetches of `reference` fail with [`FetchError::NotFound`].
    #[must_use]
    pub fn failing_on(mut self, reference: impl Into<String>) -> Self {
        self.script.failures.insert(reference.into());
        self
    }

    /// Returns every reference fetched, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.script.calls.lock().clone()
    }

    /// Returns how many fetches succeeded.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.script.completed.load(Ordering::SeqCst)
    }

    /// Returns the highest number of fetches seen in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.script.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, unit: &WorkUnit) -> Result<Artifact, FetchError> {
        let reference = unit.reference();
        if self.script.play(reference).await {
            return Err(FetchError::NotFound(reference.to_string()));
        }
        let payload = self
            .payloads
            .get(reference)
            .cloned()
            .unwrap_or_else(|| reference.as_bytes().to_vec());
        self.script.complete();
        Ok(Artifact::new(unit.clone(), payload))
    }
}

/// A transform that appends `+<name>` to the payload.
#[derive(Debug)]
pub struct ScriptedTransform {
    name: String,
    script: Script,
}

impl ScriptedTransform {
    /// Creates a transform named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Script::default(),
        }
    }

    /// Delays the transform of artifacts fetched from `reference`.
    #[must_use]
    pub fn with_delay(mut self, reference: impl Into<String>, delay: Duration) -> Self {
        self.script.delays.insert(reference.into(), delay);
        self
    }

    /// Delays every application without its own delay.
    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.script.default_delay = delay;
        self
    }

    /// Adds up to `max` random extra delay to every application.
    #[must_use]
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.script.jitter = Some(max);
        self
    }

    /// Fails on artifacts fetched from `reference`.
    #[must_use]
    pub fn failing_on(mut self, reference: impl Into<String>) -> Self {
        self.script.failures.insert(reference.into());
        self
    }

    /// Returns the origins of every artifact seen, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.script.calls.lock().clone()
    }

    /// Returns how many applications succeeded.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.script.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transform for ScriptedTransform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, artifact: &Artifact) -> Result<TransformedArtifact, TransformError> {
        let reference = artifact.origin.reference();
        if self.script.play(reference).await {
            return Err(TransformError::Failed(format!("{} rejected {reference}", self.name)));
        }
        let mut payload = artifact.payload.clone();
        payload.push(b'+');
        payload.extend_from_slice(self.name.as_bytes());
        self.script.complete();
        Ok(artifact.transformed(&self.name, payload))
    }
}

/// A persister that keeps artifacts in memory.
///
/// Locations have the form `mem://<transform>/<reference>`.
#[derive(Debug, Default)]
pub struct RecordingPersister {
    script: Script,
    persisted: Mutex<Vec<TransformedArtifact>>,
}

impl RecordingPersister {
    /// Creates an empty persister.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays persisting artifacts fetched from `reference`.
    #[must_use]
    pub fn with_delay(mut self, reference: impl Into<String>, delay: Duration) -> Self {
        self.script.delays.insert(reference.into(), delay);
        self
    }

    /// Delays every write without its own delay.
    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.script.default_delay = delay;
        self
    }

    /// Adds up to `max` random extra delay to every write.
    #[must_use]
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.script.jitter = Some(max);
        self
    }

    /// Rejects artifacts fetched from `reference`.
    #[must_use]
    pub fn failing_on(mut self, reference: impl Into<String>) -> Self {
        self.script.failures.insert(reference.into());
        self
    }

    /// Returns the persisted artifacts in completion order.
    #[must_use]
    pub fn persisted(&self) -> Vec<TransformedArtifact> {
        self.persisted.lock().clone()
    }

    /// Returns the number of persisted artifacts.
    #[must_use]
    pub fn count(&self) -> usize {
        self.persisted.lock().len()
    }

    /// Clears persisted artifacts.
    pub fn clear(&self) {
        self.persisted.lock().clear();
    }
}

#[async_trait]
impl Persister for RecordingPersister {
    async fn persist(&self, artifact: &TransformedArtifact) -> Result<StoredArtifact, PersistError> {
        let reference = artifact.origin().reference();
        if self.script.play(reference).await {
            return Err(PersistError::Rejected(reference.to_string()));
        }
        self.persisted.lock().push(artifact.clone());
        self.script.complete();
        let location = format!("mem://{}/{reference}", artifact.transform());
        Ok(StoredArtifact::new(artifact, location))
    }
}

/// A stats sink that remembers every report.
#[derive(Debug, Default)]
pub struct CollectingStatsSink {
    reports: Mutex<Vec<(String, usize)>>,
}

impl CollectingStatsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all reports as `(run_name, stored_count)`.
    #[must_use]
    pub fn reports(&self) -> Vec<(String, usize)> {
        self.reports.lock().clone()
    }

    /// Returns true if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl StatsSink for CollectingStatsSink {
    fn report(&self, run_name: &str, stored_count: usize) {
        self.reports.lock().push((run_name.to_string(), stored_count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    #[tokio::test]
    async fn test_scripted_fetcher_defaults() {
        let fetcher = ScriptedFetcher::new().with_payload("b", b"custom".to_vec());

        let a = fetcher.fetch(&WorkUnit::new("a")).await.unwrap();
        let b = fetcher.fetch(&WorkUnit::new("b")).await.unwrap();

        assert_eq!(a.payload, b"a");
        assert_eq!(b.payload, b"custom");
        assert_eq!(fetcher.calls(), vec!["a", "b"]);
        assert_eq!(fetcher.completed(), 2);
        assert_eq!(fetcher.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_scripted_fetcher_failure_and_delay() {
        let fetcher = ScriptedFetcher::new()
            .with_delay("slow", Duration::from_millis(20))
            .failing_on("slow");

        let start = Instant::now();
        let err = fetcher.fetch(&WorkUnit::new("slow")).await.unwrap_err();

        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(matches!(err, FetchError::NotFound(_)));
        assert_eq!(fetcher.completed(), 0);
    }

    #[tokio::test]
    async fn test_jitter_stays_within_bounds() {
        let fetcher = ScriptedFetcher::new()
            .with_default_delay(Duration::from_millis(1))
            .with_jitter(Duration::from_millis(5));

        for _ in 0..10 {
            let delay = fetcher.script.delay_for("x");
            assert!(delay >= Duration::from_millis(1));
            assert!(delay <= Duration::from_millis(6));
        }
    }

    #[tokio::test]
    async fn test_in_flight_released_on_cancel() {
        let fetcher = ScriptedFetcher::new().with_default_delay(Duration::from_secs(30));
        let unit = WorkUnit::new("x");

        let fetch = fetcher.fetch(&unit);
        assert!(tokio::time::timeout(Duration::from_millis(10), fetch).await.is_err());
        assert_eq!(fetcher.script.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_scripted_transform() {
        let transform = ScriptedTransform::new("up").failing_on("bad");
        let good = Artifact::new(WorkUnit::new("ok"), b"ok".to_vec());
        let bad = Artifact::new(WorkUnit::new("bad"), b"bad".to_vec());

        let output = transform.apply(&good).await.unwrap();
        assert_eq!(output.payload(), b"ok+up");
        assert!(matches!(transform.apply(&bad).await, Err(TransformError::Failed(_))));
        assert_eq!(transform.calls(), vec!["ok", "bad"]);
    }

    #[tokio::test]
    async fn test_recording_persister() {
        let persister = RecordingPersister::new();
        let artifact = Artifact::new(WorkUnit::new("u1"), b"x".to_vec()).transformed("t1", b"y".to_vec());

        let stored = persister.persist(&artifact).await.unwrap();
        assert_eq!(stored.location, "mem://t1/u1");
        assert_eq!(persister.count(), 1);

        persister.clear();
        assert_eq!(persister.count(), 0);
    }

    #[test]
    fn test_collecting_stats_sink() {
        let sink = CollectingStatsSink::new();
        assert!(sink.is_empty());
        sink.report("run", 6);
        assert_eq!(sink.reports(), vec![("run".to_string(), 6)]);
    }
}
