// Request Engine — sequences one logical request through the transport
// with bounded, whole-exchange retry.

use crate::error::ProxyError;
use crate::frame::{self, Op, Response};
use crate::transport::Transport;

const COMPONENT: &str = "request-engine";

pub struct RequestEngine<T: Transport> {
    transport: T,
    max_attempts: u32,
}

impl<T: Transport> RequestEngine<T> {
    pub fn new(transport: T, max_attempts: u32) -> Self {
        Self {
            transport,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Encode `op`/`args`, segment into blocks, and run the exchange,
    /// retrying up to `max_attempts` whole attempts before giving up.
    pub async fn request(&self, op: Op, args: &[Vec<u8>]) -> Result<Response, ProxyError> {
        let body = frame::encode(op, args)?;
        let blocks = frame::segment(&body);

        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.transport.exchange(&blocks).await {
                Ok(bytes) => return Ok(frame::parse_response(&bytes)),
                Err(err) => {
                    tracing::warn!(
                        component = COMPONENT,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "HSM exchange attempt failed",
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(ProxyError::request_failed(
            COMPONENT,
            last_err.expect("loop runs at least once since max_attempts is clamped to >= 1"),
        ))
    }
}
