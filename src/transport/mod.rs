// Transport module — BLE UART, and the abstraction it implements.
//
// `Transport` is deliberately narrow: one method, covering exactly the
// lifecycle of a single request/response exchange (scan, connect,
// discover, subscribe, write-then-notify per block, disconnect). The
// request engine retries whole exchanges; nothing below this trait knows
// about retry.

mod ble;

pub use ble::{BleConfig, BleUartTransport};

use crate::error::ProxyError;

/// UART service and characteristic UUIDs (Nordic UART Service profile).
pub const UART_SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
pub const UART_WRITE_CHAR_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
pub const UART_NOTIFY_CHAR_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Abstract transport: run one request's worth of blocks through a
/// peripheral and return the primary block's response.
#[allow(async_fn_in_trait)]
pub trait Transport: Send + Sync {
    /// Scan, connect, discover, subscribe, write each block in order
    /// awaiting its notification, then disconnect — on every exit path,
    /// success or failure.
    async fn exchange(&self, blocks: &[Vec<u8>]) -> Result<Vec<u8>, ProxyError>;
}
