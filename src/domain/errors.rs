use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Broker connection failed: {0}")]
    Connection(String),
    #[error("Publish of {event_type} failed: {reason}")]
    Publish { event_type: String, reason: String },
    #[error("Payload for {event_type} could not be decoded: {reason}")]
    Decode { event_type: String, reason: String },
    #[error("Retries exhausted for {event_type} after {attempts} attempts: {reason}")]
    Exhausted {
        event_type: String,
        attempts: u32,
        reason: String,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
