use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use async_trait::async_trait;

use crate::domain::model::ContainerSnapshot;
use crate::domain::port::SnapshotStore;

/// One JSON document per container name under the state directory. Writes
/// go to a temp sibling and are renamed into place so a partially written
/// record can never be read back.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        FileSnapshotStore { dir: dir.as_ref().to_path_buf() }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &ContainerSnapshot) -> Result<(), Error> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating state directory {}", self.dir.display()))?;
        let body = serde_json::to_vec_pretty(snapshot)?;
        let path = self.record_path(&snapshot.name);
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, body)
            .with_context(|| format!("writing snapshot for {}", snapshot.name))?;
        std::fs::rename(&staging, &path)
            .with_context(|| format!("committing snapshot for {}", snapshot.name))?;
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<ContainerSnapshot>, Error> {
        match std::fs::read(self.record_path(name)) {
            Ok(bytes) => {
                let snapshot = serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt snapshot for {name}"))?;
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading snapshot for {name}")),
        }
    }
}
