use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::error::{LoadFailure, ResourceLoadError};
use super::resource::{
    LoadResult, LoadedResource, ModelAssets, ResourceKey, ResourceMetadata, ResourceState,
};
use crate::runtime::{LoadPoll, ResourceRuntime};

/// Retry policy for the poll loop
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPolicy {
    /// Wait between two polls of a still-loading resource
    pub poll_interval: Duration,
    /// Give up once a load has been polling for this long
    pub timeout: Option<Duration>,
    /// Give up after this many polls
    pub max_polls: Option<u32>,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            timeout: Some(Duration::from_secs(30)),
            max_polls: None,
        }
    }
}

/// Terminal state kept per key. "Loading" is a held section, not a stored value.
#[derive(Debug, Clone)]
enum Entry {
    NotRequested,
    Loaded(LoadedResource),
    Errored(ResourceLoadError),
}

/// One key's async section plus the state `ResourceLoader::state` reports for it
struct KeySection {
    entry: AsyncMutex<Entry>,
    // only written while `entry` is held
    published: Mutex<ResourceState>,
}

impl KeySection {
    fn new() -> Self {
        Self {
            entry: AsyncMutex::new(Entry::NotRequested),
            published: Mutex::new(ResourceState::NotRequested),
        }
    }

    fn publish(&self, state: ResourceState) {
        *self.published.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn published(&self) -> ResourceState {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

type Section = Arc<KeySection>;

/// Resets the published state if a load is dropped before it finishes.
struct LoadInFlight<'a> {
    section: &'a KeySection,
    finished: bool,
}

impl Drop for LoadInFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.section.publish(ResourceState::NotRequested);
        }
    }
}

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

struct LoaderInner {
    runtime: Arc<dyn ResourceRuntime>,
    policy: LoadPolicy,
    // Only held for get-or-insert, never across an await.
    sections: Mutex<HashMap<ResourceKey, Section>>,
    sequences: AtomicU64,
}

/// Deduplicating model/texture loader. Clones share the same cache.
#[derive(Clone)]
pub struct ResourceLoader {
    inner: Arc<LoaderInner>,
}

impl ResourceLoader {
    /// A zero poll interval is raised to one millisecond.
    pub fn new(runtime: Arc<dyn ResourceRuntime>, mut policy: LoadPolicy) -> Self {
        if policy.poll_interval.is_zero() {
            warn!("Loader poll interval of zero raised to {:?}", MIN_POLL_INTERVAL);
            policy.poll_interval = MIN_POLL_INTERVAL;
        }
        info!("Creating resource loader with policy: {:?}", policy);
        Self {
            inner: Arc::new(LoaderInner {
                runtime,
                policy,
                sections: Mutex::new(HashMap::new()),
                sequences: AtomicU64::new(0),
            }),
        }
    }

    pub fn policy(&self) -> &LoadPolicy {
        &self.inner.policy
    }

    /// Number of load sequences this loader has started against the runtime.
    pub fn load_sequences(&self) -> u64 {
        self.inner.sequences.load(Ordering::Relaxed)
    }

    fn section(&self, key: &ResourceKey) -> Section {
        let mut sections = self
            .inner
            .sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sections
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeySection::new()))
            .clone()
    }

    fn existing_section(&self, key: &ResourceKey) -> Option<Section> {
        self.inner
            .sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Loads `key`, or returns the cached outcome of an earlier load.
    ///
    /// Requests for the same key are serialized; whoever gets the section first polls the
    /// runtime and every later request reads the stored result. Failures are cached too and
    /// are not retried until the key is freed.
    ///
    /// Dropping the returned future while it polls releases the section with the key still
    /// unrequested, so the next request starts a fresh load.
    pub async fn request(&self, key: ResourceKey) -> LoadResult {
        let section = self.section(&key);
        let mut entry = section.entry.lock().await;

        match &*entry {
            Entry::Loaded(resource) => {
                debug!("Cache hit for {}", key);
                return Ok(resource.clone());
            }
            Entry::Errored(err) => {
                debug!("Cached failure for {}", key);
                return Err(err.clone());
            }
            Entry::NotRequested => {}
        }

        self.inner.sequences.fetch_add(1, Ordering::Relaxed);
        section.publish(ResourceState::Loading);
        let mut in_flight = LoadInFlight {
            section: &section,
            finished: false,
        };
        let result = self.poll_until_ready(&key).await;
        in_flight.finished = true;

        match &result {
            Ok(resource) => {
                info!("Loaded {} ({:?})", key, resource.metadata);
                *entry = Entry::Loaded(resource.clone());
                section.publish(ResourceState::Loaded(resource.clone()));
            }
            Err(err) => {
                warn!("{}", err);
                *entry = Entry::Errored(err.clone());
                section.publish(ResourceState::Errored(err.clone()));
            }
        }
        result
    }

    /// Runs [`ResourceLoader::request`] on a background task and hands the result to
    /// `callback` there.
    pub fn spawn_request<F>(&self, key: ResourceKey, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(LoadResult) + Send + 'static,
    {
        let loader = self.clone();
        tokio::spawn(async move {
            let result = loader.request(key).await;
            callback(result);
        })
    }

    /// Loads a render model and then the diffuse texture it references, if any.
    pub async fn request_model_with_texture(
        &self,
        name: &str,
    ) -> Result<ModelAssets, ResourceLoadError> {
        let model = self.request(ResourceKey::model(name)).await?;
        let texture = match model.metadata {
            ResourceMetadata::Model {
                diffuse_texture: Some(id),
                ..
            } => Some(self.request(ResourceKey::texture(id)).await?),
            _ => None,
        };
        Ok(ModelAssets { model, texture })
    }

    /// Releases the native handle of `key` and forgets the cached outcome.
    ///
    /// A no-op for keys that were never requested. Waits for an in-flight load of the same
    /// key to finish first. The loader does not track consumers: callers must be done with the
    /// handle. Returns whether a native handle was released.
    pub async fn free(&self, key: &ResourceKey) -> bool {
        let Some(section) = self.existing_section(key) else {
            debug!("Free of never requested {} ignored", key);
            return false;
        };
        let mut entry = section.entry.lock().await;
        section.publish(ResourceState::NotRequested);
        match std::mem::replace(&mut *entry, Entry::NotRequested) {
            Entry::Loaded(resource) => {
                match key {
                    ResourceKey::Model(_) => self.inner.runtime.free_model(resource.handle),
                    ResourceKey::Texture(_) => self.inner.runtime.free_texture(resource.handle),
                }
                info!("Freed {} ({:?})", key, resource.handle);
                true
            }
            Entry::Errored(_) => {
                debug!("Cleared cached failure for {}", key);
                false
            }
            Entry::NotRequested => false,
        }
    }

    /// Current state of `key` without waiting.
    ///
    /// Loading is reported only while a load sequence is polling the runtime. Cache hits and
    /// frees holding the section do not change what is reported.
    pub fn state(&self, key: &ResourceKey) -> ResourceState {
        self.existing_section(key)
            .map_or(ResourceState::NotRequested, |section| section.published())
    }

    async fn poll_until_ready(&self, key: &ResourceKey) -> LoadResult {
        let policy = &self.inner.policy;
        let started = Instant::now();
        let mut ticker = tokio::time::interval(policy.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls: u32 = 0;

        debug!("Starting load sequence for {}", key);
        loop {
            ticker.tick().await;
            polls += 1;

            if let Some(result) = self.poll_once(key) {
                debug!("Load of {} finished after {} polls", key, polls);
                return result;
            }

            if let Some(max) = policy.max_polls {
                if polls >= max {
                    error!("Giving up on {} after {} polls", key, polls);
                    return Err(key.failure(LoadFailure::PollLimitReached(polls)));
                }
            }
            if let Some(timeout) = policy.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    error!("Giving up on {} after {:?}", key, elapsed);
                    return Err(key.failure(LoadFailure::TimedOut(elapsed)));
                }
            }
        }
    }

    fn poll_once(&self, key: &ResourceKey) -> Option<LoadResult> {
        let runtime = &self.inner.runtime;
        match key {
            ResourceKey::Model(name) => match runtime.load_model(name) {
                LoadPoll::Loading => None,
                LoadPoll::Ready(data) => Some(Ok(LoadedResource {
                    key: key.clone(),
                    handle: data.handle,
                    metadata: ResourceMetadata::Model {
                        vertex_count: data.vertex_count,
                        triangle_count: data.triangle_count,
                        diffuse_texture: data.diffuse_texture,
                    },
                })),
                LoadPoll::Failed(reason) => Some(Err(key.failure(LoadFailure::Runtime(reason)))),
            },
            ResourceKey::Texture(id) => match runtime.load_texture(*id) {
                LoadPoll::Loading => None,
                LoadPoll::Ready(data) => Some(Ok(LoadedResource {
                    key: key.clone(),
                    handle: data.handle,
                    metadata: ResourceMetadata::Texture {
                        width: data.width,
                        height: data.height,
                    },
                })),
                LoadPoll::Failed(reason) => Some(Err(key.failure(LoadFailure::Runtime(reason)))),
            },
        }
    }
}
