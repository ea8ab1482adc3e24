//! Identifier and destination layouts.

use bytes::{BufMut, BytesMut};

use super::support::*;
use super::TypedMarshaller;
use crate::commands::{
    types, ActiveMQDestination, BrokerId, ConnectionId, ConsumerId, DestinationType,
    LocalTransactionId, MessageId, ProducerId, SessionId,
};
use crate::error::Result;
use crate::protocol::{BooleanStream, DataInput, WireFormat};

/// Layout for identifiers made of a single string.
macro_rules! string_id_marshaller {
    ($name:ident, $target:ty, $code:expr) => {
        pub struct $name;

        impl TypedMarshaller for $name {
            type Target = $target;

            fn data_structure_type(&self) -> u8 {
                $code
            }

            fn create(&self) -> $target {
                <$target>::default()
            }

            fn tight_marshal1(
                &self,
                _wf: &WireFormat,
                o: &$target,
                bs: &mut BooleanStream,
            ) -> Result<usize> {
                tight_marshal_string1(o.value.as_deref(), bs)
            }

            fn tight_marshal2(
                &self,
                _wf: &WireFormat,
                o: &$target,
                out: &mut BytesMut,
                bs: &mut BooleanStream,
            ) -> Result<()> {
                tight_marshal_string2(o.value.as_deref(), out, bs)
            }

            fn tight_unmarshal(
                &self,
                _wf: &WireFormat,
                o: &mut $target,
                input: &mut DataInput<'_>,
                bs: &mut BooleanStream,
            ) -> Result<()> {
                o.value = tight_unmarshal_string(input, bs)?;
                Ok(())
            }

            fn loose_marshal(&self, _wf: &WireFormat, o: &$target, out: &mut BytesMut) -> Result<()> {
                loose_marshal_string(o.value.as_deref(), out)
            }

            fn loose_unmarshal(
                &self,
                _wf: &WireFormat,
                o: &mut $target,
                input: &mut DataInput<'_>,
            ) -> Result<()> {
                o.value = loose_unmarshal_string(input)?;
                Ok(())
            }
        }
    };
}

string_id_marshaller!(ConnectionIdMarshaller, ConnectionId, types::CONNECTION_ID);
string_id_marshaller!(BrokerIdMarshaller, BrokerId, types::BROKER_ID);

pub struct SessionIdMarshaller;

impl TypedMarshaller for SessionIdMarshaller {
    type Target = SessionId;

    fn data_structure_type(&self) -> u8 {
        types::SESSION_ID
    }

    fn create(&self) -> SessionId {
        SessionId::default()
    }

    fn tight_marshal1(&self, _wf: &WireFormat, o: &SessionId, bs: &mut BooleanStream) -> Result<usize> {
        let mut rc = tight_marshal_string1(o.connection_id.as_deref(), bs)?;
        rc += tight_marshal_long1(o.value, bs);
        Ok(rc)
    }

    fn tight_marshal2(
        &self,
        _wf: &WireFormat,
        o: &SessionId,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_string2(o.connection_id.as_deref(), out, bs)?;
        tight_marshal_long2(o.value, out, bs)
    }

    fn tight_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut SessionId,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        o.connection_id = tight_unmarshal_string(input, bs)?;
        o.value = tight_unmarshal_long(input, bs)?;
        Ok(())
    }

    fn loose_marshal(&self, _wf: &WireFormat, o: &SessionId, out: &mut BytesMut) -> Result<()> {
        loose_marshal_string(o.connection_id.as_deref(), out)?;
        out.put_i64(o.value);
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut SessionId,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        o.connection_id = loose_unmarshal_string(input)?;
        o.value = input.read_i64()?;
        Ok(())
    }
}

pub struct ConsumerIdMarshaller;

impl TypedMarshaller for ConsumerIdMarshaller {
    type Target = ConsumerId;

    fn data_structure_type(&self) -> u8 {
        types::CONSUMER_ID
    }

    fn create(&self) -> ConsumerId {
        ConsumerId::default()
    }

    fn tight_marshal1(&self, _wf: &WireFormat, o: &ConsumerId, bs: &mut BooleanStream) -> Result<usize> {
        let mut rc = tight_marshal_string1(o.connection_id.as_deref(), bs)?;
        rc += tight_marshal_long1(o.session_id, bs);
        rc += tight_marshal_long1(o.value, bs);
        Ok(rc)
    }

    fn tight_marshal2(
        &self,
        _wf: &WireFormat,
        o: &ConsumerId,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_string2(o.connection_id.as_deref(), out, bs)?;
        tight_marshal_long2(o.session_id, out, bs)?;
        tight_marshal_long2(o.value, out, bs)
    }

    fn tight_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut ConsumerId,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        o.connection_id = tight_unmarshal_string(input, bs)?;
        o.session_id = tight_unmarshal_long(input, bs)?;
        o.value = tight_unmarshal_long(input, bs)?;
        Ok(())
    }

    fn loose_marshal(&self, _wf: &WireFormat, o: &ConsumerId, out: &mut BytesMut) -> Result<()> {
        loose_marshal_string(o.connection_id.as_deref(), out)?;
        out.put_i64(o.session_id);
        out.put_i64(o.value);
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut ConsumerId,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        o.connection_id = loose_unmarshal_string(input)?;
        o.session_id = input.read_i64()?;
        o.value = input.read_i64()?;
        Ok(())
    }
}

/// Producer ids put the producer value ahead of the session id.
pub struct ProducerIdMarshaller;

impl TypedMarshaller for ProducerIdMarshaller {
    type Target = ProducerId;

    fn data_structure_type(&self) -> u8 {
        types::PRODUCER_ID
    }

    fn create(&self) -> ProducerId {
        ProducerId::default()
    }

    fn tight_marshal1(&self, _wf: &WireFormat, o: &ProducerId, bs: &mut BooleanStream) -> Result<usize> {
        let mut rc = tight_marshal_string1(o.connection_id.as_deref(), bs)?;
        rc += tight_marshal_long1(o.value, bs);
        rc += tight_marshal_long1(o.session_id, bs);
        Ok(rc)
    }

    fn tight_marshal2(
        &self,
        _wf: &WireFormat,
        o: &ProducerId,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_string2(o.connection_id.as_deref(), out, bs)?;
        tight_marshal_long2(o.value, out, bs)?;
        tight_marshal_long2(o.session_id, out, bs)
    }

    fn tight_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut ProducerId,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        o.connection_id = tight_unmarshal_string(input, bs)?;
        o.value = tight_unmarshal_long(input, bs)?;
        o.session_id = tight_unmarshal_long(input, bs)?;
        Ok(())
    }

    fn loose_marshal(&self, _wf: &WireFormat, o: &ProducerId, out: &mut BytesMut) -> Result<()> {
        loose_marshal_string(o.connection_id.as_deref(), out)?;
        out.put_i64(o.value);
        out.put_i64(o.session_id);
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut ProducerId,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        o.connection_id = loose_unmarshal_string(input)?;
        o.value = input.read_i64()?;
        o.session_id = input.read_i64()?;
        Ok(())
    }
}

pub struct MessageIdMarshaller;

impl TypedMarshaller for MessageIdMarshaller {
    type Target = MessageId;

    fn data_structure_type(&self) -> u8 {
        types::MESSAGE_ID
    }

    fn create(&self) -> MessageId {
        MessageId::default()
    }

    fn tight_marshal1(&self, wf: &WireFormat, o: &MessageId, bs: &mut BooleanStream) -> Result<usize> {
        let mut rc = tight_marshal_nested1(wf, o.producer_id.as_ref(), bs)?;
        rc += tight_marshal_long1(o.producer_sequence_id, bs);
        rc += tight_marshal_long1(o.broker_sequence_id, bs);
        Ok(rc)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &MessageId,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_nested2(wf, o.producer_id.as_ref(), out, bs)?;
        tight_marshal_long2(o.producer_sequence_id, out, bs)?;
        tight_marshal_long2(o.broker_sequence_id, out, bs)
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut MessageId,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        o.producer_id = tight_unmarshal_nested(wf, input, bs)?;
        o.producer_sequence_id = tight_unmarshal_long(input, bs)?;
        o.broker_sequence_id = tight_unmarshal_long(input, bs)?;
        Ok(())
    }

    fn loose_marshal(&self, wf: &WireFormat, o: &MessageId, out: &mut BytesMut) -> Result<()> {
        loose_marshal_nested(wf, o.producer_id.as_ref(), out)?;
        out.put_i64(o.producer_sequence_id);
        out.put_i64(o.broker_sequence_id);
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut MessageId,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        o.producer_id = loose_unmarshal_nested(wf, input)?;
        o.producer_sequence_id = input.read_i64()?;
        o.broker_sequence_id = input.read_i64()?;
        Ok(())
    }
}

pub struct LocalTransactionIdMarshaller;

impl TypedMarshaller for LocalTransactionIdMarshaller {
    type Target = LocalTransactionId;

    fn data_structure_type(&self) -> u8 {
        types::LOCAL_TRANSACTION_ID
    }

    fn create(&self) -> LocalTransactionId {
        LocalTransactionId::default()
    }

    fn tight_marshal1(
        &self,
        wf: &WireFormat,
        o: &LocalTransactionId,
        bs: &mut BooleanStream,
    ) -> Result<usize> {
        let mut rc = tight_marshal_long1(o.value, bs);
        rc += tight_marshal_nested1(wf, o.connection_id.as_ref(), bs)?;
        Ok(rc)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &LocalTransactionId,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_long2(o.value, out, bs)?;
        tight_marshal_nested2(wf, o.connection_id.as_ref(), out, bs)
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut LocalTransactionId,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        o.value = tight_unmarshal_long(input, bs)?;
        o.connection_id = tight_unmarshal_nested(wf, input, bs)?;
        Ok(())
    }

    fn loose_marshal(
        &self,
        wf: &WireFormat,
        o: &LocalTransactionId,
        out: &mut BytesMut,
    ) -> Result<()> {
        out.put_i64(o.value);
        loose_marshal_nested(wf, o.connection_id.as_ref(), out)
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut LocalTransactionId,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        o.value = input.read_i64()?;
        o.connection_id = loose_unmarshal_nested(wf, input)?;
        Ok(())
    }
}

/// One instance is registered per destination kind.
pub struct DestinationMarshaller {
    destination_type: DestinationType,
}

impl DestinationMarshaller {
    pub fn new(destination_type: DestinationType) -> Self {
        Self { destination_type }
    }
}

impl TypedMarshaller for DestinationMarshaller {
    type Target = ActiveMQDestination;

    fn data_structure_type(&self) -> u8 {
        self.destination_type.data_structure_type()
    }

    fn create(&self) -> ActiveMQDestination {
        ActiveMQDestination {
            destination_type: self.destination_type,
            physical_name: None,
        }
    }

    fn tight_marshal1(
        &self,
        _wf: &WireFormat,
        o: &ActiveMQDestination,
        bs: &mut BooleanStream,
    ) -> Result<usize> {
        tight_marshal_string1(o.physical_name.as_deref(), bs)
    }

    fn tight_marshal2(
        &self,
        _wf: &WireFormat,
        o: &ActiveMQDestination,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_string2(o.physical_name.as_deref(), out, bs)
    }

    fn tight_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut ActiveMQDestination,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        o.physical_name = tight_unmarshal_string(input, bs)?;
        Ok(())
    }

    fn loose_marshal(
        &self,
        _wf: &WireFormat,
        o: &ActiveMQDestination,
        out: &mut BytesMut,
    ) -> Result<()> {
        loose_marshal_string(o.physical_name.as_deref(), out)
    }

    fn loose_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut ActiveMQDestination,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        o.physical_name = loose_unmarshal_string(input)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::{
        ActiveMQDestination, ConnectionId, DestinationType, ProducerId, ProducerInfo, SessionId,
    };
    use crate::protocol::WireFormat;

    #[test]
    fn test_destination_kind_follows_type_code() {
        let session = SessionId::new(&ConnectionId::new("ID:x"), 1);
        for destination in [
            ActiveMQDestination::queue("q"),
            ActiveMQDestination::topic("t"),
            ActiveMQDestination::temp_queue("tq"),
            ActiveMQDestination::temp_topic("tt"),
        ] {
            let mut info = ProducerInfo::new(ProducerId::new(&session, 7));
            info.destination = Some(destination.clone());

            for tight in [false, true] {
                let mut wf = WireFormat::default();
                wf.set_tight_encoding_enabled(tight).unwrap();
                let frame = wf.marshal_to_bytes(Some(&info)).unwrap();
                let decoded = wf.unmarshal_bytes(&frame).unwrap().unwrap();
                let decoded = decoded.downcast_ref::<ProducerInfo>().unwrap();
                assert_eq!(decoded.destination.as_ref(), Some(&destination));
                assert_eq!(decoded.producer_id, Some(ProducerId::new(&session, 7)));
            }
        }
    }

    #[test]
    fn test_temp_destination_types() {
        assert_eq!(
            ActiveMQDestination::temp_topic("x").destination_type,
            DestinationType::TempTopic
        );
    }
}
