//! [`Transport`] over the platform Bluetooth stack via `btleplug`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{DeviceInfo, NotificationStream, Transport};
use crate::core::LinkError;
use crate::protocol::WriteMode;

/// Gap between two polls of the adapter's peripheral list while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

fn backend(err: btleplug::Error) -> LinkError {
    LinkError::Backend(err.to_string())
}

/// BLE transport backed by the first available adapter.
pub struct BtleTransport {
    adapter: Adapter,
    discovered: HashMap<String, Peripheral>,
    peripheral: Option<Peripheral>,
    characteristics: Vec<Characteristic>,
}

impl BtleTransport {
    /// Open the first Bluetooth adapter on this host.
    pub async fn new() -> Result<Self, LinkError> {
        let manager = Manager::new().await.map_err(backend)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(backend)?
            .into_iter()
            .next()
            .ok_or(LinkError::NoAdapter)?;

        Ok(Self {
            adapter,
            discovered: HashMap::new(),
            peripheral: None,
            characteristics: Vec::new(),
        })
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, LinkError> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or(LinkError::CharacteristicNotFound(uuid))
    }

    fn peripheral(&self) -> Result<&Peripheral, LinkError> {
        self.peripheral.as_ref().ok_or(LinkError::Disconnected)
    }

    async fn find_by_name(&mut self, name: &str) -> Result<Option<DeviceInfo>, LinkError> {
        for peripheral in self.adapter.peripherals().await.map_err(backend)? {
            let Some(properties) = peripheral.properties().await.map_err(backend)? else {
                continue;
            };
            if properties.local_name.as_deref() != Some(name) {
                continue;
            }

            let device = DeviceInfo {
                id: peripheral.id().to_string(),
                name: name.to_string(),
            };
            self.discovered.insert(device.id.clone(), peripheral);
            return Ok(Some(device));
        }
        Ok(None)
    }
}

#[async_trait]
impl Transport for BtleTransport {
    #[instrument(skip(self), level = "debug")]
    async fn scan(&mut self, name: &str, window: Duration) -> Result<Option<DeviceInfo>, LinkError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(backend)?;

        let deadline = Instant::now() + window;
        let found = loop {
            if let Some(device) = self.find_by_name(name).await? {
                break Some(device);
            }
            if Instant::now() >= deadline {
                break None;
            }
            sleep(SCAN_POLL_INTERVAL).await;
        };

        if let Err(err) = self.adapter.stop_scan().await {
            debug!(error = %err, "failed to stop scan cleanly");
        }
        Ok(found)
    }

    #[instrument(skip(self, device), fields(device = %device.id), level = "debug")]
    async fn connect(&mut self, device: &DeviceInfo, bound: Duration) -> Result<(), LinkError> {
        let peripheral = self
            .discovered
            .get(&device.id)
            .cloned()
            .ok_or_else(|| LinkError::Backend(format!("peripheral {} was not scanned", device.id)))?;

        let setup = async {
            if !peripheral.is_connected().await? {
                peripheral.connect().await?;
            }
            peripheral.discover_services().await
        };
        timeout(bound, setup)
            .await
            .map_err(|_| LinkError::ConnectTimeout(bound))?
            .map_err(backend)?;

        self.characteristics = peripheral.characteristics().into_iter().collect();
        info!(
            characteristics = self.characteristics.len(),
            "peripheral connected"
        );
        self.peripheral = Some(peripheral);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.characteristics.clear();
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(err) = peripheral.disconnect().await {
                warn!(error = %err, "disconnect failed");
            }
        }
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<NotificationStream, LinkError> {
        let target = self.characteristic(characteristic)?.clone();
        let peripheral = self.peripheral()?;

        peripheral.subscribe(&target).await.map_err(backend)?;
        let notifications = peripheral.notifications().await.map_err(backend)?;

        let stream = notifications.filter_map(move |notification| async move {
            (notification.uuid == characteristic).then_some(notification.value)
        });
        Ok(Box::pin(stream))
    }

    async fn write(
        &mut self,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), LinkError> {
        let target = self.characteristic(characteristic)?.clone();
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };

        self.peripheral()?
            .write(&target, data, write_type)
            .await
            .map_err(|err| LinkError::WriteRejected(err.to_string()))
    }

    fn supports_acknowledged_write(&self, characteristic: Uuid) -> bool {
        self.characteristic(characteristic)
            .map(|c| c.properties.contains(CharPropFlags::WRITE))
            .unwrap_or(false)
    }
}
