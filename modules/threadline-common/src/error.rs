use std::time::Duration;

use thiserror::Error;

use crate::types::ComponentId;

#[derive(Error, Debug)]
pub enum ThreadlineError {
    #[error("Graph backend error: {0}")]
    Backend(String),

    #[error("Malformed component {component_id}: {reason}")]
    MalformedComponent {
        component_id: ComponentId,
        reason: String,
    },

    #[error("Backend still failing after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("Result channel closed before the task finished")]
    ChannelClosed,

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Sink did not finish within {0:?} after the last task")]
    SinkTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T, E = ThreadlineError> = std::result::Result<T, E>;
