//! Commands that open, describe and close connection resources, plus
//! message dispatch.

use super::{
    types, ActiveMQDestination, BrokerId, ConnectionId, ConsumerId, DataStructure,
    MessageCommand, ProducerId, SessionId,
};

/// Opens a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub command_id: i32,
    pub response_required: bool,
    pub connection_id: Option<ConnectionId>,
    pub client_id: Option<String>,
    pub password: Option<String>,
    pub user_name: Option<String>,
    pub broker_path: Option<Vec<BrokerId>>,
    pub broker_master_connector: bool,
    pub manageable: bool,
    /// Version 2 and later.
    pub client_master: bool,
    /// Version 6 and later.
    pub fault_tolerant: bool,
    /// Version 6 and later.
    pub failover_reconnect: bool,
    /// Version 8 and later.
    pub client_ip: Option<String>,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            command_id: 0,
            response_required: false,
            connection_id: None,
            client_id: None,
            password: None,
            user_name: None,
            broker_path: None,
            broker_master_connector: false,
            manageable: false,
            client_master: true,
            fault_tolerant: false,
            failover_reconnect: false,
            client_ip: None,
        }
    }
}

impl ConnectionInfo {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id: Some(connection_id),
            ..Self::default()
        }
    }
}

impl_command!(ConnectionInfo, types::CONNECTION_INFO);

/// Opens a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionInfo {
    pub command_id: i32,
    pub response_required: bool,
    pub session_id: Option<SessionId>,
}

impl SessionInfo {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::default()
        }
    }
}

impl_command!(SessionInfo, types::SESSION_INFO);

/// Registers a producer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProducerInfo {
    pub command_id: i32,
    pub response_required: bool,
    pub producer_id: Option<ProducerId>,
    pub destination: Option<ActiveMQDestination>,
    pub broker_path: Option<Vec<BrokerId>>,
    /// Version 2 and later.
    pub dispatch_async: bool,
    /// Version 3 and later.
    pub window_size: i32,
}

impl ProducerInfo {
    pub fn new(producer_id: ProducerId) -> Self {
        Self {
            producer_id: Some(producer_id),
            ..Self::default()
        }
    }
}

impl_command!(ProducerInfo, types::PRODUCER_INFO);

/// Closes the resource named by `object_id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoveInfo {
    pub command_id: i32,
    pub response_required: bool,
    /// Connection, session, producer or consumer id.
    pub object_id: Option<Box<dyn DataStructure>>,
    /// Version 5 and later.
    pub last_delivered_sequence_id: i64,
}

impl RemoveInfo {
    pub fn new(object_id: impl DataStructure) -> Self {
        Self {
            object_id: Some(Box::new(object_id)),
            ..Self::default()
        }
    }
}

impl_command!(RemoveInfo, types::REMOVE_INFO);

/// Delivers a message to a consumer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageDispatch {
    pub command_id: i32,
    pub response_required: bool,
    pub consumer_id: Option<ConsumerId>,
    pub destination: Option<ActiveMQDestination>,
    message: Option<Box<dyn DataStructure>>,
    pub redelivery_counter: i32,
}

impl MessageDispatch {
    pub fn new(consumer_id: ConsumerId, message: impl MessageCommand) -> Self {
        let destination = message.message().destination.clone();
        Self {
            consumer_id: Some(consumer_id),
            destination,
            message: Some(Box::new(message)),
            ..Self::default()
        }
    }

    /// The dispatched message, if any.
    pub fn message(&self) -> Option<&dyn MessageCommand> {
        self.message.as_deref().and_then(|m| m.as_message())
    }

    pub fn set_message(&mut self, message: Option<Box<dyn DataStructure>>) {
        self.message = message;
    }

    pub(crate) fn message_data(&self) -> Option<&dyn DataStructure> {
        self.message.as_deref()
    }

    pub fn take_message(&mut self) -> Option<Box<dyn DataStructure>> {
        self.message.take()
    }
}

impl_command!(MessageDispatch, types::MESSAGE_DISPATCH);
