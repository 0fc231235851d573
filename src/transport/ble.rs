// BLE UART transport. Makes a peripheral operable for one request, then
// releases it — the peripheral handle is single-use per exchange.

use super::{Transport, UART_NOTIFY_CHAR_UUID, UART_SERVICE_UUID, UART_WRITE_CHAR_UUID};
use crate::error::ProxyError;
use crate::frame::{parse_response, Response};
use btleplug::api::{Central, Characteristic, Peripheral as _, ScanFilter, WriteType};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

const COMPONENT: &str = "ble-transport";

fn uart_service_uuid() -> Uuid {
    Uuid::parse_str(UART_SERVICE_UUID).expect("UART service UUID is a fixed, valid literal")
}

fn uart_write_uuid() -> Uuid {
    Uuid::parse_str(UART_WRITE_CHAR_UUID).expect("UART write UUID is a fixed, valid literal")
}

fn uart_notify_uuid() -> Uuid {
    Uuid::parse_str(UART_NOTIFY_CHAR_UUID).expect("UART notify UUID is a fixed, valid literal")
}

/// Runtime configuration for the BLE transport.
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Advertised local name of the HSM peripheral to connect to.
    pub device_name: String,
    /// How long to scan before giving up with `PeripheralNotFound`.
    pub scan_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            device_name: "ArmorD".to_string(),
            scan_timeout: Duration::from_millis(1000),
        }
    }
}

/// Owns a connected peripheral handle for the lifetime of one exchange.
///
/// Disconnection normally happens via the explicit `disconnect()` call at
/// the end of `exchange`, but if the exchange's future is dropped instead
/// of polled to completion — caller cancellation — that call never runs.
/// `Drop` is the backstop: it spawns a detached task to force the
/// disconnect, so a cancelled exchange can never leave the peripheral
/// half-open.
struct PeripheralGuard<P> {
    peripheral: Option<P>,
}

impl<P> PeripheralGuard<P> {
    fn new(peripheral: P) -> Self {
        Self {
            peripheral: Some(peripheral),
        }
    }

    fn peripheral(&self) -> &P {
        self.peripheral.as_ref().expect("disconnect() consumes the guard")
    }
}

impl<P> PeripheralGuard<P>
where
    P: btleplug::api::Peripheral + 'static,
{
    /// Disconnect and consume the guard on the normal exit path.
    async fn disconnect(mut self) -> Result<(), btleplug::Error> {
        let peripheral = self.peripheral.take().expect("not yet disconnected");
        peripheral.disconnect().await
    }
}

impl<P> Drop for PeripheralGuard<P>
where
    P: btleplug::api::Peripheral + 'static,
{
    fn drop(&mut self) {
        if let Some(peripheral) = self.peripheral.take() {
            tokio::spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    tracing::warn!(
                        component = COMPONENT,
                        error = %e,
                        "forced disconnect after cancellation failed",
                    );
                }
            });
        }
    }
}

/// BLE UART transport over a `btleplug` central adapter.
///
/// The adapter is treated as a process-wide singleton (the underlying BLE
/// stack genuinely is one); a mutex around scanning forbids overlapping
/// scans from this transport instance.
pub struct BleUartTransport<A: Central> {
    adapter: A,
    config: BleConfig,
    scan_lock: tokio::sync::Mutex<()>,
}

impl<A: Central> BleUartTransport<A> {
    pub fn new(adapter: A, config: BleConfig) -> Self {
        Self {
            adapter,
            config,
            scan_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Scan for a peripheral advertising the UART service whose local
    /// name matches the configured device name. Stops scanning on first
    /// match or when the scan timeout elapses.
    async fn find_peripheral(&self) -> Result<A::Peripheral, ProxyError> {
        let _guard = self.scan_lock.lock().await;

        self.adapter
            .start_scan(ScanFilter {
                services: vec![uart_service_uuid()],
            })
            .await
            .map_err(|e| ProxyError::transport(COMPONENT, e))?;

        let deadline = Instant::now() + self.config.scan_timeout;
        let found = 'scan: loop {
            let peripherals = self
                .adapter
                .peripherals()
                .await
                .map_err(|e| ProxyError::transport(COMPONENT, e))?;

            for peripheral in peripherals {
                if let Some(props) = peripheral
                    .properties()
                    .await
                    .map_err(|e| ProxyError::transport(COMPONENT, e))?
                {
                    if props.local_name.as_deref() == Some(self.config.device_name.as_str()) {
                        break 'scan Some(peripheral);
                    }
                }
            }

            if Instant::now() >= deadline {
                break 'scan None;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        };

        let _ = self.adapter.stop_scan().await;
        found.ok_or_else(|| ProxyError::peripheral_not_found(COMPONENT))
    }

    /// Connect, discover the UART service and its two characteristics,
    /// and subscribe to notifications.
    async fn discover_uart(
        &self,
        peripheral: &A::Peripheral,
    ) -> Result<(Characteristic, Characteristic), ProxyError> {
        peripheral
            .connect()
            .await
            .map_err(|e| ProxyError::transport(COMPONENT, e))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| ProxyError::transport(COMPONENT, e))?;

        let uart_services: Vec<_> = peripheral
            .services()
            .into_iter()
            .filter(|service| service.uuid == uart_service_uuid())
            .collect();
        if uart_services.len() != 1 {
            return Err(ProxyError::service_missing(COMPONENT));
        }

        let characteristics = peripheral.characteristics();
        let write_char = characteristics
            .iter()
            .find(|c| c.uuid == uart_write_uuid())
            .cloned();
        let notify_char = characteristics
            .iter()
            .find(|c| c.uuid == uart_notify_uuid())
            .cloned();

        let (write_char, notify_char) = match (write_char, notify_char) {
            (Some(w), Some(n)) => (w, n),
            _ => return Err(ProxyError::characteristics_missing(COMPONENT)),
        };

        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| ProxyError::transport(COMPONENT, e))?;

        Ok((write_char, notify_char))
    }

    /// Write every block in order, awaiting exactly one notification per
    /// write, returning the last (primary) block's response.
    async fn run_exchange(
        &self,
        peripheral: &A::Peripheral,
        blocks: &[Vec<u8>],
    ) -> Result<Vec<u8>, ProxyError> {
        let (write_char, _notify_char) = self.discover_uart(peripheral).await?;

        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| ProxyError::transport(COMPONENT, e))?;

        let mut last_response = Vec::new();
        for block in blocks {
            peripheral
                .write(&write_char, block, WriteType::WithResponse)
                .await
                .map_err(|e| ProxyError::transport(COMPONENT, e))?;

            let notification = notifications
                .next()
                .await
                .ok_or_else(|| ProxyError::transport(COMPONENT, "notification stream ended"))?;
            last_response = notification.value;

            if let Response::Error(code) = parse_response(&last_response) {
                return Err(ProxyError::block_rejected(COMPONENT, code));
            }
        }

        Ok(last_response)
    }
}

impl<A: Central> Transport for BleUartTransport<A> {
    async fn exchange(&self, blocks: &[Vec<u8>]) -> Result<Vec<u8>, ProxyError> {
        let peripheral = self.find_peripheral().await?;
        let guard = PeripheralGuard::new(peripheral);
        let outcome = self.run_exchange(guard.peripheral(), blocks).await;

        // Every exit path disconnects, success or failure; a half-open
        // connection on the way out is a bug, not a retryable condition.
        // If this future is dropped instead of reaching here, the
        // guard's `Drop` forces the disconnect instead.
        if let Err(disconnect_err) = guard.disconnect().await {
            tracing::warn!(
                component = COMPONENT,
                error = %disconnect_err,
                "failed to disconnect peripheral after exchange",
            );
        }

        outcome
    }
}
