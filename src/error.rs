// Error taxonomy for the HSM proxy.
//
// Every public operation returns `ProxyError`. Each variant carries the
// name of the component that raised it (the frame codec, the transport,
// the request engine, the config store, or the lifecycle controller) so
// that a caller chaining several of these proxies can tell where in the
// stack a failure originated.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("[{component}] operation not permitted in the current key-lifecycle state")]
    InvalidState { component: &'static str },

    #[error("[{component}] no peripheral advertising the expected service matched before the scan timed out")]
    PeripheralNotFound { component: &'static str },

    #[error("[{component}] peripheral does not expose exactly one UART service")]
    ServiceMissing { component: &'static str },

    #[error("[{component}] peripheral is missing the write or notify UART characteristic")]
    CharacteristicsMissing { component: &'static str },

    #[error("[{component}] transport failure: {cause}")]
    Transport { component: &'static str, cause: String },

    #[error("[{component}] HSM rejected a block with status code {code}")]
    BlockRejected { component: &'static str, code: u8 },

    #[error("[{component}] request failed after exhausting the retry budget: {cause}")]
    RequestFailed { component: &'static str, cause: String },

    #[error("[{component}] argument of length {len} exceeds the 65535-byte wire limit")]
    ArgumentTooLarge { component: &'static str, len: usize },

    #[error("[{component}] config store failure: {cause}")]
    ConfigStore { component: &'static str, cause: String },

    #[error("[{component}] HSM key state changed but persistence did not commit; manual recovery required")]
    InconsistentState { component: &'static str },

    #[error("[{component}] unexpected error: {cause}")]
    Unexpected { component: &'static str, cause: String },
}

impl ProxyError {
    pub fn invalid_state(component: &'static str) -> Self {
        Self::InvalidState { component }
    }

    pub fn peripheral_not_found(component: &'static str) -> Self {
        Self::PeripheralNotFound { component }
    }

    pub fn service_missing(component: &'static str) -> Self {
        Self::ServiceMissing { component }
    }

    pub fn characteristics_missing(component: &'static str) -> Self {
        Self::CharacteristicsMissing { component }
    }

    pub fn transport(component: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Transport {
            component,
            cause: cause.to_string(),
        }
    }

    pub fn block_rejected(component: &'static str, code: u8) -> Self {
        Self::BlockRejected { component, code }
    }

    pub fn request_failed(component: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::RequestFailed {
            component,
            cause: cause.to_string(),
        }
    }

    pub fn argument_too_large(component: &'static str, len: usize) -> Self {
        Self::ArgumentTooLarge { component, len }
    }

    pub fn config_store(component: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::ConfigStore {
            component,
            cause: cause.to_string(),
        }
    }

    pub fn inconsistent_state(component: &'static str) -> Self {
        Self::InconsistentState { component }
    }

    pub fn unexpected(component: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Unexpected {
            component,
            cause: cause.to_string(),
        }
    }

    /// The component name this error was raised from, regardless of variant.
    pub fn component(&self) -> &'static str {
        match self {
            Self::InvalidState { component }
            | Self::PeripheralNotFound { component }
            | Self::ServiceMissing { component }
            | Self::CharacteristicsMissing { component }
            | Self::Transport { component, .. }
            | Self::BlockRejected { component, .. }
            | Self::RequestFailed { component, .. }
            | Self::ArgumentTooLarge { component, .. }
            | Self::ConfigStore { component, .. }
            | Self::InconsistentState { component }
            | Self::Unexpected { component, .. } => component,
        }
    }
}
