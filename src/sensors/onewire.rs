//! DS18B20-style probes on the Linux 1-Wire bus
//!
//! The kernel exposes every slave under `/sys/bus/w1/devices/<id>/w1_slave`:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::{ProbeDescriptor, TemperatureProbe};
use crate::error::SensorError;

const BUS_MASTER_PREFIX: &str = "w1_bus_master";
const SLAVE_FILE: &str = "w1_slave";

pub struct OneWireProbe {
    devices_dir: PathBuf,
}

impl OneWireProbe {
    pub fn new(devices_dir: impl Into<PathBuf>) -> Self {
        Self {
            devices_dir: devices_dir.into(),
        }
    }
}

#[async_trait]
impl TemperatureProbe for OneWireProbe {
    async fn enumerate(&self) -> Result<Vec<ProbeDescriptor>, SensorError> {
        let mut entries = tokio::fs::read_dir(&self.devices_dir)
            .await
            .map_err(|e| SensorError::ProbeEnumeration(e.to_string()))?;

        let mut probes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SensorError::ProbeEnumeration(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(BUS_MASTER_PREFIX) {
                continue;
            }
            probes.push(ProbeDescriptor {
                id: name.clone(),
                name,
            });
        }
        // read_dir order is unspecified; keep "first probe" stable
        probes.sort_by(|a, b| a.id.cmp(&b.id));
        debug!("Found {} one-wire devices", probes.len());
        Ok(probes)
    }

    async fn read_celsius(&self, probe: &ProbeDescriptor) -> Result<f64, SensorError> {
        let path = self.devices_dir.join(&probe.id).join(SLAVE_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SensorError::ProbeRead(format!("{}: {}", path.display(), e)))?;
        parse_w1_slave(&content)
    }
}

/// Extracts degrees Celsius from a `w1_slave` dump
pub fn parse_w1_slave(content: &str) -> Result<f64, SensorError> {
    let mut lines = content.lines();

    let crc_line = lines
        .next()
        .ok_or_else(|| SensorError::ProbeRead("empty w1_slave".to_string()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(SensorError::ProbeRead(format!("CRC check failed: {}", crc_line)));
    }

    let data_line = lines
        .next()
        .ok_or_else(|| SensorError::ProbeRead("missing temperature line".to_string()))?;
    let (_, raw) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| SensorError::ProbeRead(format!("no reading in: {}", data_line)))?;

    let millis: i64 = raw
        .trim()
        .parse()
        .map_err(|e| SensorError::ProbeRead(format!("invalid reading {:?}: {}", raw.trim(), e)))?;
    Ok(millis as f64 / 1000.0)
}
