//! Identifier data structures.

use std::fmt;

use super::types;

/// Identifies a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConnectionId {
    pub value: Option<String>,
}

impl ConnectionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }
}

impl_data_structure!(ConnectionId, types::CONNECTION_ID);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value.as_deref().unwrap_or(""))
    }
}

/// Identifies a session within a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SessionId {
    pub connection_id: Option<String>,
    pub value: i64,
}

impl SessionId {
    pub fn new(connection: &ConnectionId, value: i64) -> Self {
        Self {
            connection_id: connection.value.clone(),
            value,
        }
    }

    pub fn parent_id(&self) -> ConnectionId {
        ConnectionId {
            value: self.connection_id.clone(),
        }
    }
}

impl_data_structure!(SessionId, types::SESSION_ID);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.connection_id.as_deref().unwrap_or(""),
            self.value
        )
    }
}

/// Identifies a producer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProducerId {
    pub connection_id: Option<String>,
    pub value: i64,
    pub session_id: i64,
}

impl ProducerId {
    pub fn new(session: &SessionId, value: i64) -> Self {
        Self {
            connection_id: session.connection_id.clone(),
            value,
            session_id: session.value,
        }
    }

    pub fn parent_id(&self) -> SessionId {
        SessionId {
            connection_id: self.connection_id.clone(),
            value: self.session_id,
        }
    }
}

impl_data_structure!(ProducerId, types::PRODUCER_ID);

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.connection_id.as_deref().unwrap_or(""),
            self.session_id,
            self.value
        )
    }
}

/// Identifies a consumer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConsumerId {
    pub connection_id: Option<String>,
    pub session_id: i64,
    pub value: i64,
}

impl ConsumerId {
    pub fn new(session: &SessionId, value: i64) -> Self {
        Self {
            connection_id: session.connection_id.clone(),
            session_id: session.value,
            value,
        }
    }
}

impl_data_structure!(ConsumerId, types::CONSUMER_ID);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.connection_id.as_deref().unwrap_or(""),
            self.session_id,
            self.value
        )
    }
}

/// Identifies one message sent by a producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MessageId {
    pub producer_id: Option<ProducerId>,
    pub producer_sequence_id: i64,
    pub broker_sequence_id: i64,
}

impl MessageId {
    pub fn new(producer_id: ProducerId, producer_sequence_id: i64) -> Self {
        Self {
            producer_id: Some(producer_id),
            producer_sequence_id,
            broker_sequence_id: 0,
        }
    }
}

impl_data_structure!(MessageId, types::MESSAGE_ID);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.producer_id {
            Some(p) => write!(f, "{}:{}", p, self.producer_sequence_id),
            None => write!(f, ":{}", self.producer_sequence_id),
        }
    }
}

/// Identifies a local (non-XA) transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LocalTransactionId {
    pub value: i64,
    pub connection_id: Option<ConnectionId>,
}

impl LocalTransactionId {
    pub fn new(connection_id: ConnectionId, value: i64) -> Self {
        Self {
            value,
            connection_id: Some(connection_id),
        }
    }
}

impl_data_structure!(LocalTransactionId, types::LOCAL_TRANSACTION_ID);

impl fmt::Display for LocalTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.connection_id {
            Some(c) => write!(f, "TX:{}:{}", c, self.value),
            None => write!(f, "TX::{}", self.value),
        }
    }
}

/// Identifies a broker in a network of brokers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BrokerId {
    pub value: Option<String>,
}

impl BrokerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }
}

impl_data_structure!(BrokerId, types::BROKER_ID);

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value.as_deref().unwrap_or(""))
    }
}
