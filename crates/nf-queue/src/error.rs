use nf_common::NotifyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("SQS error: {0}")]
    Sqs(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("queue is stopped")]
    Stopped,
    #[error("configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Best-effort split between connection-class failures (worth a retry)
    /// and everything else. SQS's SDK error surface doesn't expose a stable
    /// error-kind enum the way sqlx does, so this falls back to matching on
    /// the rendered message for the handful of transport failures that
    /// matter operationally.
    pub fn is_connection_error(&self) -> bool {
        match self {
            QueueError::Sqs(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("timeout")
                    || lower.contains("connection")
                    || lower.contains("dispatch failure")
                    || lower.contains("service unavailable")
            }
            _ => false,
        }
    }
}

impl From<QueueError> for NotifyError {
    fn from(e: QueueError) -> Self {
        if e.is_connection_error() {
            NotifyError::PubSubConnection(e.to_string())
        } else {
            NotifyError::PubSubPublish(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeout_and_dispatch_failures_as_connection_class() {
        assert!(QueueError::Sqs("request timeout".to_string()).is_connection_error());
        assert!(QueueError::Sqs("dispatch failure: connection reset".to_string()).is_connection_error());
        assert!(QueueError::Sqs("Service Unavailable".to_string()).is_connection_error());
    }

    #[test]
    fn does_not_classify_validation_errors_as_connection_class() {
        assert!(!QueueError::Sqs("InvalidMessageContents".to_string()).is_connection_error());
        assert!(!QueueError::Stopped.is_connection_error());
    }

    #[test]
    fn connection_class_maps_to_pubsub_connection_variant() {
        let err: NotifyError = QueueError::Sqs("connection refused".to_string()).into();
        assert!(matches!(err, NotifyError::PubSubConnection(_)));
    }

    #[test]
    fn non_connection_class_maps_to_pubsub_publish_variant() {
        let err: NotifyError = QueueError::Config("missing queue url".to_string()).into();
        assert!(matches!(err, NotifyError::PubSubPublish(_)));
    }
}
