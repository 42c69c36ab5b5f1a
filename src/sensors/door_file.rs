use async_trait::async_trait;
use std::path::PathBuf;

use super::DoorStateSource;
use crate::error::SensorError;
use crate::room::DoorId;

/// Reads the `door<N>.state` files kept up to date by the door-switch watcher
pub struct FileDoorSource {
    data_dir: PathBuf,
}

impl FileDoorSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn state_file(&self, door: DoorId) -> PathBuf {
        self.data_dir.join(format!("{}.state", door))
    }
}

#[async_trait]
impl DoorStateSource for FileDoorSource {
    async fn read_raw(&self, door: DoorId) -> Result<String, SensorError> {
        let path = self.state_file(door);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SensorError::DoorRead {
                door,
                reason: format!("{}: {}", path.display(), e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_state_files_per_door() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("door1.state"), "closed").unwrap();
        let source = FileDoorSource::new(dir.path());

        assert_eq!(source.read_raw(DoorId::One).await.unwrap(), "closed");
        assert!(matches!(
            source.read_raw(DoorId::Two).await,
            Err(SensorError::DoorRead { door: DoorId::Two, .. })
        ));
    }
}
