//! Queue and topic destinations.

use std::fmt;

use super::{types, DataStructure};

/// Kind of destination, which also selects the type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DestinationType {
    #[default]
    Queue,
    Topic,
    TempQueue,
    TempTopic,
}

impl DestinationType {
    pub fn data_structure_type(self) -> u8 {
        match self {
            DestinationType::Queue => types::ACTIVEMQ_QUEUE,
            DestinationType::Topic => types::ACTIVEMQ_TOPIC,
            DestinationType::TempQueue => types::ACTIVEMQ_TEMP_QUEUE,
            DestinationType::TempTopic => types::ACTIVEMQ_TEMP_TOPIC,
        }
    }

    pub fn from_data_structure_type(code: u8) -> Option<Self> {
        match code {
            types::ACTIVEMQ_QUEUE => Some(DestinationType::Queue),
            types::ACTIVEMQ_TOPIC => Some(DestinationType::Topic),
            types::ACTIVEMQ_TEMP_QUEUE => Some(DestinationType::TempQueue),
            types::ACTIVEMQ_TEMP_TOPIC => Some(DestinationType::TempTopic),
            _ => None,
        }
    }

    /// URI-style prefix used when rendering.
    pub fn prefix(self) -> &'static str {
        match self {
            DestinationType::Queue => "queue://",
            DestinationType::Topic => "topic://",
            DestinationType::TempQueue => "temp-queue://",
            DestinationType::TempTopic => "temp-topic://",
        }
    }

    #[inline]
    pub fn is_temporary(self) -> bool {
        matches!(self, DestinationType::TempQueue | DestinationType::TempTopic)
    }
}

/// A named queue or topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ActiveMQDestination {
    pub destination_type: DestinationType,
    pub physical_name: Option<String>,
}

impl ActiveMQDestination {
    pub fn new(destination_type: DestinationType, physical_name: impl Into<String>) -> Self {
        Self {
            destination_type,
            physical_name: Some(physical_name.into()),
        }
    }

    pub fn queue(name: impl Into<String>) -> Self {
        Self::new(DestinationType::Queue, name)
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(DestinationType::Topic, name)
    }

    pub fn temp_queue(name: impl Into<String>) -> Self {
        Self::new(DestinationType::TempQueue, name)
    }

    pub fn temp_topic(name: impl Into<String>) -> Self {
        Self::new(DestinationType::TempTopic, name)
    }
}

impl DataStructure for ActiveMQDestination {
    fn data_structure_type(&self) -> u8 {
        self.destination_type.data_structure_type()
    }
}

impl fmt::Display for ActiveMQDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.destination_type.prefix(),
            self.physical_name.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_follows_kind() {
        assert_eq!(ActiveMQDestination::queue("a").data_structure_type(), 100);
        assert_eq!(ActiveMQDestination::topic("a").data_structure_type(), 101);
        assert_eq!(ActiveMQDestination::temp_queue("a").data_structure_type(), 102);
        assert_eq!(ActiveMQDestination::temp_topic("a").data_structure_type(), 103);

        for code in 100..=103u8 {
            let kind = DestinationType::from_data_structure_type(code).unwrap();
            assert_eq!(kind.data_structure_type(), code);
        }
        assert_eq!(DestinationType::from_data_structure_type(99), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ActiveMQDestination::queue("orders").to_string(), "queue://orders");
        assert_eq!(ActiveMQDestination::temp_topic("t").to_string(), "temp-topic://t");
        assert!(DestinationType::TempQueue.is_temporary());
        assert!(!DestinationType::Topic.is_temporary());
    }
}
