//! Marshallers and the registry that selects them by type code.
//!
//! Every registered type has one marshaller that knows its field layout in
//! both encodings. Marshallers receive the [`WireFormat`] on every call so
//! they can consult the negotiated version and delegate embedded objects to
//! the nested entry points.
//!
//! Concrete layouts are written against [`TypedMarshaller`], which works on
//! the concrete type; [`Typed`] adapts one to the object-safe
//! [`DataStreamMarshaller`] stored in the registry.

use std::fmt;

use bytes::BytesMut;
use tracing::warn;

use crate::commands::{types, DataStructure};
use crate::error::{OpenWireError, Result};
use crate::protocol::{BooleanStream, DataInput, WireFormat};

mod control;
mod ids;
mod info;
mod message;
pub mod support;

pub use control::{
    ExceptionResponseMarshaller, KeepAliveInfoMarshaller, ResponseMarshaller,
    ShutdownInfoMarshaller, WireFormatInfoMarshaller,
};
pub use ids::{
    BrokerIdMarshaller, ConnectionIdMarshaller, ConsumerIdMarshaller, DestinationMarshaller,
    LocalTransactionIdMarshaller, MessageIdMarshaller, ProducerIdMarshaller, SessionIdMarshaller,
};
pub use info::{
    ConnectionInfoMarshaller, MessageDispatchMarshaller, ProducerInfoMarshaller,
    RemoveInfoMarshaller, SessionInfoMarshaller,
};
pub use message::MessageMarshaller;

/// Object-safe marshaller interface used by the wire format engine.
pub trait DataStreamMarshaller: Send + Sync {
    fn data_structure_type(&self) -> u8;

    /// Blank instance to unmarshal into.
    fn create_object(&self) -> Box<dyn DataStructure>;

    /// First tight pass: record flags, return the payload size in bytes.
    fn tight_marshal1(
        &self,
        wf: &WireFormat,
        o: &dyn DataStructure,
        bs: &mut BooleanStream,
    ) -> Result<usize>;

    /// Second tight pass: write the payload, consuming flags in pass 1 order.
    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &dyn DataStructure,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()>;

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut dyn DataStructure,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()>;

    fn loose_marshal(&self, wf: &WireFormat, o: &dyn DataStructure, out: &mut BytesMut)
        -> Result<()>;

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut dyn DataStructure,
        input: &mut DataInput<'_>,
    ) -> Result<()>;
}

/// Field layout of one concrete data structure type.
pub trait TypedMarshaller: Send + Sync + 'static {
    type Target: DataStructure;

    fn data_structure_type(&self) -> u8;

    fn create(&self) -> Self::Target;

    fn tight_marshal1(
        &self,
        wf: &WireFormat,
        o: &Self::Target,
        bs: &mut BooleanStream,
    ) -> Result<usize>;

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &Self::Target,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()>;

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut Self::Target,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()>;

    fn loose_marshal(&self, wf: &WireFormat, o: &Self::Target, out: &mut BytesMut) -> Result<()>;

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut Self::Target,
        input: &mut DataInput<'_>,
    ) -> Result<()>;
}

/// Adapts a [`TypedMarshaller`] to [`DataStreamMarshaller`] by downcasting.
pub struct Typed<M> {
    inner: M,
}

impl<M: TypedMarshaller> Typed<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    pub fn boxed(inner: M) -> Box<dyn DataStreamMarshaller> {
        Box::new(Self::new(inner))
    }
}

impl<M: TypedMarshaller> DataStreamMarshaller for Typed<M> {
    fn data_structure_type(&self) -> u8 {
        self.inner.data_structure_type()
    }

    fn create_object(&self) -> Box<dyn DataStructure> {
        Box::new(self.inner.create())
    }

    fn tight_marshal1(
        &self,
        wf: &WireFormat,
        o: &dyn DataStructure,
        bs: &mut BooleanStream,
    ) -> Result<usize> {
        self.inner.tight_marshal1(wf, support::cast(o)?, bs)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &dyn DataStructure,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        self.inner.tight_marshal2(wf, support::cast(o)?, out, bs)
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut dyn DataStructure,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        self.inner
            .tight_unmarshal(wf, support::cast_mut(o)?, input, bs)
    }

    fn loose_marshal(
        &self,
        wf: &WireFormat,
        o: &dyn DataStructure,
        out: &mut BytesMut,
    ) -> Result<()> {
        self.inner.loose_marshal(wf, support::cast(o)?, out)
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut dyn DataStructure,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        self.inner.loose_unmarshal(wf, support::cast_mut(o)?, input)
    }
}

/// Fixed table of marshallers indexed by type code.
///
/// Populated before traffic flows and only read afterwards.
pub struct MarshallerRegistry {
    marshallers: [Option<Box<dyn DataStreamMarshaller>>; 256],
}

impl MarshallerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            marshallers: std::array::from_fn(|_| None),
        }
    }

    /// Registry holding every built-in command and data structure.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for marshaller in default_marshallers() {
            registry.insert(marshaller);
        }
        registry
    }

    /// Install a marshaller, replacing and returning the one previously
    /// registered for the same type code. Code 0 is reserved for null.
    pub fn register(
        &mut self,
        marshaller: Box<dyn DataStreamMarshaller>,
    ) -> Result<Option<Box<dyn DataStreamMarshaller>>> {
        if marshaller.data_structure_type() == types::NULL {
            return Err(OpenWireError::IllegalState(
                "Type code 0 is reserved for null".into(),
            ));
        }
        Ok(self.insert(marshaller))
    }

    fn insert(
        &mut self,
        marshaller: Box<dyn DataStreamMarshaller>,
    ) -> Option<Box<dyn DataStreamMarshaller>> {
        let code = marshaller.data_structure_type();
        self.marshallers[usize::from(code)].replace(marshaller)
    }

    pub fn get(&self, code: u8) -> Option<&dyn DataStreamMarshaller> {
        self.marshallers[usize::from(code)].as_deref()
    }

    /// Like [`get`](Self::get) but unknown codes are an error.
    pub fn lookup(&self, code: u8) -> Result<&dyn DataStreamMarshaller> {
        self.get(code).ok_or_else(|| {
            warn!(data_type = code, "No marshaller registered for data type");
            OpenWireError::UnknownDataType(code)
        })
    }

    pub fn contains(&self, code: u8) -> bool {
        self.marshallers[usize::from(code)].is_some()
    }

    /// Registered type codes in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|&code| self.contains(code))
    }

    pub fn len(&self) -> usize {
        self.marshallers.iter().filter(|m| m.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MarshallerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for MarshallerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshallerRegistry")
            .field("codes", &self.codes().collect::<Vec<_>>())
            .finish()
    }
}

fn default_marshallers() -> Vec<Box<dyn DataStreamMarshaller>> {
    use crate::commands::{ActiveMQMessage, DestinationType};
    use crate::message::{StreamMessage, TextMessage};

    vec![
        Typed::boxed(WireFormatInfoMarshaller),
        Typed::boxed(ConnectionInfoMarshaller),
        Typed::boxed(SessionInfoMarshaller),
        Typed::boxed(ProducerInfoMarshaller),
        Typed::boxed(KeepAliveInfoMarshaller),
        Typed::boxed(ShutdownInfoMarshaller),
        Typed::boxed(RemoveInfoMarshaller),
        Typed::boxed(MessageDispatchMarshaller),
        Typed::boxed(MessageMarshaller::<ActiveMQMessage>::new()),
        Typed::boxed(MessageMarshaller::<StreamMessage>::new()),
        Typed::boxed(MessageMarshaller::<TextMessage>::new()),
        Typed::boxed(ResponseMarshaller),
        Typed::boxed(ExceptionResponseMarshaller),
        Typed::boxed(DestinationMarshaller::new(DestinationType::Queue)),
        Typed::boxed(DestinationMarshaller::new(DestinationType::Topic)),
        Typed::boxed(DestinationMarshaller::new(DestinationType::TempQueue)),
        Typed::boxed(DestinationMarshaller::new(DestinationType::TempTopic)),
        Typed::boxed(MessageIdMarshaller),
        Typed::boxed(LocalTransactionIdMarshaller),
        Typed::boxed(ConnectionIdMarshaller),
        Typed::boxed(SessionIdMarshaller),
        Typed::boxed(ConsumerIdMarshaller),
        Typed::boxed(ProducerIdMarshaller),
        Typed::boxed(BrokerIdMarshaller),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_builtin_types() {
        let registry = MarshallerRegistry::with_defaults();
        for code in [1u8, 3, 4, 6, 10, 11, 12, 21, 23, 27, 28, 30, 31] {
            assert!(registry.contains(code), "missing command {code}");
        }
        for code in 100u8..=103 {
            assert!(registry.contains(code));
        }
        for code in [110u8, 111, 120, 121, 122, 123, 124] {
            assert!(registry.contains(code), "missing data structure {code}");
        }
        assert_eq!(registry.len(), 24);
        assert!(!registry.contains(types::NULL));
    }

    #[test]
    fn test_unknown_code() {
        let registry = MarshallerRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.lookup(42),
            Err(OpenWireError::UnknownDataType(42))
        ));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = MarshallerRegistry::new();
        assert!(registry
            .register(Typed::boxed(BrokerIdMarshaller))
            .unwrap()
            .is_none());
        let previous = registry.register(Typed::boxed(BrokerIdMarshaller)).unwrap();
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.codes().collect::<Vec<_>>(), vec![types::BROKER_ID]);
    }

    #[test]
    fn test_created_objects_match_code() {
        let registry = MarshallerRegistry::with_defaults();
        for code in registry.codes().collect::<Vec<_>>() {
            let marshaller = registry.lookup(code).unwrap();
            assert_eq!(marshaller.create_object().data_structure_type(), code);
        }
    }
}
