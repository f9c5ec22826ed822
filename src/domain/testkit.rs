//! Hand-rolled in-memory implementations of the port traits, shared by the
//! orchestrator and resolver tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;

use super::model::{ContainerSnapshot, ImageIdentity, LocalImage, RunSpec};
use super::port::{
    ContainerRuntime, HealthChecker, Notifier, RuntimeError, RuntimeResult, SnapshotStore,
};

#[derive(Default)]
pub struct EngineState {
    /// name -> functional spec of the running container
    pub containers: HashMap<String, ContainerSnapshot>,
    /// name -> identity of the image backing the container
    pub container_images: HashMap<String, ImageIdentity>,
    /// reference -> identity of a locally stored image
    pub local_images: HashMap<String, ImageIdentity>,
    /// reference -> identity the registry currently serves; absent means
    /// the pull fails
    pub pullable: HashMap<String, ImageIdentity>,
    /// chronological record of state-mutating engine calls
    pub destructive_ops: Vec<String>,
    pub pulls: Vec<String>,
    pub removed_images: Vec<String>,
    pub unreferenced: Vec<LocalImage>,
    /// image references whose `run` fails
    pub fail_run_for_image: HashSet<String>,
    pub fail_remove_image: HashSet<String>,
}

#[derive(Clone)]
pub struct MockRuntime {
    state: Arc<Mutex<EngineState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        MockRuntime { state: Arc::new(Mutex::new(EngineState::default())) }
    }

    pub fn state(&self) -> Arc<Mutex<EngineState>> {
        Arc::clone(&self.state)
    }

    pub fn with_container(&self, name: &str, image: &str, identity: &str) {
        let mut state = self.state.lock().unwrap();
        state.containers.insert(
            name.into(),
            ContainerSnapshot {
                name: name.into(),
                image: image.into(),
                ports: Vec::new(),
                env: Vec::new(),
            },
        );
        state
            .container_images
            .insert(name.into(), ImageIdentity(identity.into()));
    }

    pub fn with_pullable(&self, reference: &str, identity: &str) {
        self.state
            .lock()
            .unwrap()
            .pullable
            .insert(reference.into(), ImageIdentity(identity.into()));
    }

    pub fn fail_runs_of(&self, reference: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_run_for_image
            .insert(reference.into());
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> RuntimeResult<()> {
        Ok(())
    }

    async fn container_image_identity(&self, name: &str) -> RuntimeResult<Option<ImageIdentity>> {
        Ok(self.state.lock().unwrap().container_images.get(name).cloned())
    }

    async fn pull_image(&self, reference: &str) -> RuntimeResult<ImageIdentity> {
        let mut state = self.state.lock().unwrap();
        state.pulls.push(reference.into());
        match state.pullable.get(reference).cloned() {
            Some(identity) => {
                state.local_images.insert(reference.into(), identity.clone());
                Ok(identity)
            }
            None => Err(RuntimeError::Pull {
                reference: reference.into(),
                message: "registry unreachable".into(),
            }),
        }
    }

    async fn image_identity(&self, reference: &str) -> RuntimeResult<Option<ImageIdentity>> {
        Ok(self.state.lock().unwrap().local_images.get(reference).cloned())
    }

    async fn container_spec(&self, name: &str) -> RuntimeResult<ContainerSnapshot> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(name.into()))
    }

    async fn stop_and_remove(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.destructive_ops.push(format!("stop_and_remove {name}"));
        state.containers.remove(name);
        state.container_images.remove(name);
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .destructive_ops
            .push(format!("run {} {}", spec.name, spec.image));
        if state.fail_run_for_image.contains(&spec.image) {
            return Err(RuntimeError::Engine(anyhow!(
                "no such image: {}",
                spec.image
            )));
        }
        let identity = state
            .local_images
            .get(&spec.image)
            .cloned()
            .unwrap_or_else(|| ImageIdentity(format!("id:{}", spec.image)));
        state.containers.insert(
            spec.name.clone(),
            ContainerSnapshot {
                name: spec.name.clone(),
                image: spec.image.clone(),
                ports: spec.ports.clone(),
                env: spec.env.clone(),
            },
        );
        state.container_images.insert(spec.name.clone(), identity);
        Ok(())
    }

    async fn unreferenced_images(&self) -> RuntimeResult<Vec<LocalImage>> {
        Ok(self.state.lock().unwrap().unreferenced.clone())
    }

    async fn remove_image(&self, image: &LocalImage) -> RuntimeResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_remove_image.contains(&image.id.0) {
            return Err(RuntimeError::Engine(anyhow!("image is being extracted")));
        }
        state.removed_images.push(image.id.0.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockStore {
    records: Arc<Mutex<HashMap<String, ContainerSnapshot>>>,
    fail_save: Arc<AtomicBool>,
}

impl MockStore {
    pub fn new() -> Self {
        MockStore {
            records: Arc::new(Mutex::new(HashMap::new())),
            fail_save: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn records(&self) -> Arc<Mutex<HashMap<String, ContainerSnapshot>>> {
        Arc::clone(&self.records)
    }

    pub fn fail_saves(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotStore for MockStore {
    async fn save(&self, snapshot: &ContainerSnapshot) -> Result<(), anyhow::Error> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(anyhow!("state directory not writable"));
        }
        self.records
            .lock()
            .unwrap()
            .insert(snapshot.name.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<ContainerSnapshot>, anyhow::Error> {
        Ok(self.records.lock().unwrap().get(name).cloned())
    }
}

#[derive(Clone)]
pub struct MockHealth {
    healthy: bool,
    calls: Arc<AtomicUsize>,
}

impl MockHealth {
    pub fn reporting(healthy: bool) -> Self {
        MockHealth { healthy, calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl HealthChecker for MockHealth {
    async fn check(&self, _url: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.healthy
    }
}

#[derive(Clone)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier { messages: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn messages(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.messages)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.into());
    }
}
