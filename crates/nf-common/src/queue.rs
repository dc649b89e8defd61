//! Types shared between the Messaging Gateway and its callers: the inbound
//! message envelope-as-received-from-the-broker, and the ack/nack capability
//! a handler uses to signal terminal disposition.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// One message as delivered by the broker, before JSON parsing.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub publish_time: DateTime<Utc>,
    pub attributes: HashMap<String, String>,
    pub data: Vec<u8>,
    /// Opaque broker handle used to ack/nack/extend this specific delivery.
    pub receipt_handle: String,
}

/// Disposition a handler applies to a received message. `Ack` and `Nack` are
/// the only terminal actions; `ExtendVisibility` is used mid-processing when
/// a task needs more time than the broker's default visibility timeout.
#[derive(Debug, Clone)]
pub enum AckNack {
    Ack,
    Nack { delay_seconds: Option<u32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTopic {
    Immediate,
    Daily,
}
