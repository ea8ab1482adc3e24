//! Command and data structure types.
//!
//! Everything that travels inside a frame implements [`DataStructure`] and is
//! identified by a one-byte type code. Top-level frames must additionally be
//! a [`Command`]. Embedded values (identifiers, destinations, messages inside
//! a dispatch) are plain data structures marshalled through the nested entry
//! points of the wire format.

use std::any::Any;
use std::fmt;

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::WireFormat;

/// Implements [`DataStructure`] for a type with a fixed type code.
macro_rules! impl_data_structure {
    ($ty:ty, $code:expr) => {
        impl $crate::commands::DataStructure for $ty {
            fn data_structure_type(&self) -> u8 {
                $code
            }
        }
    };
}

/// Implements [`DataStructure`] and [`Command`] for a type carrying
/// `command_id` and `response_required` fields.
macro_rules! impl_command {
    ($ty:ty, $code:expr) => {
        impl_command!(@impl $ty, $code, {});
    };
    ($ty:ty, $code:expr, response) => {
        impl_command!(@impl $ty, $code, {
            fn is_response(&self) -> bool {
                true
            }
        });
    };
    (@impl $ty:ty, $code:expr, { $($extra:tt)* }) => {
        impl $crate::commands::DataStructure for $ty {
            fn data_structure_type(&self) -> u8 {
                $code
            }

            fn as_command(&self) -> Option<&dyn $crate::commands::Command> {
                Some(self)
            }

            fn into_command(self: Box<Self>) -> Option<Box<dyn $crate::commands::Command>> {
                Some(self)
            }
        }

        impl $crate::commands::Command for $ty {
            fn command_id(&self) -> i32 {
                self.command_id
            }

            fn set_command_id(&mut self, id: i32) {
                self.command_id = id;
            }

            fn is_response_required(&self) -> bool {
                self.response_required
            }

            fn set_response_required(&mut self, required: bool) {
                self.response_required = required;
            }

            fn as_data_structure(&self) -> &dyn $crate::commands::DataStructure {
                self
            }

            $($extra)*
        }
    };
}

mod control;
mod destination;
mod ids;
mod info;
mod message;
pub mod types;

pub use control::{
    BrokerError, ExceptionResponse, KeepAliveInfo, Response, ShutdownInfo, StackTraceElement,
    WireFormatInfo, MAGIC,
};
pub use destination::{ActiveMQDestination, DestinationType};
pub use ids::{
    BrokerId, ConnectionId, ConsumerId, LocalTransactionId, MessageId, ProducerId, SessionId,
};
pub use info::{ConnectionInfo, MessageDispatch, ProducerInfo, RemoveInfo, SessionInfo};
pub(crate) use message::impl_message_command;
pub use message::{ActiveMQMessage, Message, MessageCommand, DEFAULT_PRIORITY};

/// Object-safe plumbing shared by every data structure.
///
/// Implemented automatically for any `DataStructure + Clone + PartialEq`.
pub trait DataStructureBase: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_data_structure(&self) -> Box<dyn DataStructure>;
    /// Structural equality against another data structure of any type.
    fn equals(&self, other: &dyn DataStructure) -> bool;
}

impl<T> DataStructureBase for T
where
    T: DataStructure + Clone + PartialEq + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_data_structure(&self) -> Box<dyn DataStructure> {
        Box::new(self.clone())
    }

    fn equals(&self, other: &dyn DataStructure) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

/// A value that can be marshalled by a registered marshaller.
pub trait DataStructure: DataStructureBase + fmt::Debug + Send + Sync {
    /// Type code selecting the marshaller.
    fn data_structure_type(&self) -> u8;

    /// Marshal-aware types carry an extra tight flag in nested position that
    /// says whether a cached encoded form follows.
    fn is_marshal_aware(&self) -> bool {
        false
    }

    /// Previously produced tight, size-prefixed frame for this value.
    fn marshaled_form(&self) -> Option<Bytes> {
        None
    }

    /// Runs once after the value's fields were decoded.
    fn after_unmarshal(&mut self, _wire_format: &WireFormat) -> Result<()> {
        Ok(())
    }

    fn as_command(&self) -> Option<&dyn Command> {
        None
    }

    fn into_command(self: Box<Self>) -> Option<Box<dyn Command>> {
        None
    }

    fn as_message(&self) -> Option<&dyn MessageCommand> {
        None
    }
}

/// A data structure that may travel as a top-level frame.
pub trait Command: DataStructure {
    fn command_id(&self) -> i32;
    fn set_command_id(&mut self, id: i32);
    fn is_response_required(&self) -> bool;
    fn set_response_required(&mut self, required: bool);
    fn as_data_structure(&self) -> &dyn DataStructure;

    fn is_response(&self) -> bool {
        false
    }
}

impl<'a> dyn DataStructure + 'a {
    pub fn downcast_ref<T: DataStructure>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: DataStructure>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl<'a> dyn Command + 'a {
    pub fn downcast_ref<T: Command>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Command>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Take ownership of the concrete command.
    pub fn downcast<T: Command>(self: Box<Self>) -> std::result::Result<Box<T>, Box<dyn Any>> {
        self.into_any().downcast::<T>()
    }
}

impl Clone for Box<dyn DataStructure> {
    fn clone(&self) -> Self {
        self.as_ref().clone_data_structure()
    }
}

impl PartialEq for Box<dyn DataStructure> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref().equals(other.as_ref())
    }
}
