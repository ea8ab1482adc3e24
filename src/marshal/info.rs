//! Connection, session, producer, remove and dispatch layouts.
//!
//! Fields introduced after version 1 are only present when the negotiated
//! version reaches their introduction version.

use bytes::{BufMut, BytesMut};

use super::support::*;
use super::TypedMarshaller;
use crate::commands::{
    types, ConnectionInfo, MessageDispatch, ProducerInfo, RemoveInfo, SessionInfo,
};
use crate::error::Result;
use crate::protocol::{BooleanStream, DataInput, DataOutput, WireFormat};

pub struct ConnectionInfoMarshaller;

impl TypedMarshaller for ConnectionInfoMarshaller {
    type Target = ConnectionInfo;

    fn data_structure_type(&self) -> u8 {
        types::CONNECTION_INFO
    }

    fn create(&self) -> ConnectionInfo {
        ConnectionInfo::default()
    }

    fn tight_marshal1(
        &self,
        wf: &WireFormat,
        o: &ConnectionInfo,
        bs: &mut BooleanStream,
    ) -> Result<usize> {
        let version = wf.version();
        let mut rc = tight_marshal_command1(o, bs);
        rc += tight_marshal_nested1(wf, o.connection_id.as_ref(), bs)?;
        rc += tight_marshal_string1(o.client_id.as_deref(), bs)?;
        rc += tight_marshal_string1(o.password.as_deref(), bs)?;
        rc += tight_marshal_string1(o.user_name.as_deref(), bs)?;
        rc += tight_marshal_object_array1(wf, o.broker_path.as_deref(), bs)?;
        bs.write_boolean(o.broker_master_connector);
        bs.write_boolean(o.manageable);
        if version >= 2 {
            bs.write_boolean(o.client_master);
        }
        if version >= 6 {
            bs.write_boolean(o.fault_tolerant);
            bs.write_boolean(o.failover_reconnect);
        }
        if version >= 8 {
            rc += tight_marshal_string1(o.client_ip.as_deref(), bs)?;
        }
        Ok(rc)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &ConnectionInfo,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        let version = wf.version();
        tight_marshal_command2(o, out, bs)?;
        tight_marshal_nested2(wf, o.connection_id.as_ref(), out, bs)?;
        tight_marshal_string2(o.client_id.as_deref(), out, bs)?;
        tight_marshal_string2(o.password.as_deref(), out, bs)?;
        tight_marshal_string2(o.user_name.as_deref(), out, bs)?;
        tight_marshal_object_array2(wf, o.broker_path.as_deref(), out, bs)?;
        bs.read_boolean()?;
        bs.read_boolean()?;
        if version >= 2 {
            bs.read_boolean()?;
        }
        if version >= 6 {
            bs.read_boolean()?;
            bs.read_boolean()?;
        }
        if version >= 8 {
            tight_marshal_string2(o.client_ip.as_deref(), out, bs)?;
        }
        Ok(())
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut ConnectionInfo,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        let version = wf.version();
        tight_unmarshal_command(o, input, bs)?;
        o.connection_id = tight_unmarshal_nested(wf, input, bs)?;
        o.client_id = tight_unmarshal_string(input, bs)?;
        o.password = tight_unmarshal_string(input, bs)?;
        o.user_name = tight_unmarshal_string(input, bs)?;
        o.broker_path = tight_unmarshal_object_array(wf, input, bs)?;
        o.broker_master_connector = bs.read_boolean()?;
        o.manageable = bs.read_boolean()?;
        if version >= 2 {
            o.client_master = bs.read_boolean()?;
        }
        if version >= 6 {
            o.fault_tolerant = bs.read_boolean()?;
            o.failover_reconnect = bs.read_boolean()?;
        }
        if version >= 8 {
            o.client_ip = tight_unmarshal_string(input, bs)?;
        }
        Ok(())
    }

    fn loose_marshal(&self, wf: &WireFormat, o: &ConnectionInfo, out: &mut BytesMut) -> Result<()> {
        let version = wf.version();
        loose_marshal_command(o, out);
        loose_marshal_nested(wf, o.connection_id.as_ref(), out)?;
        loose_marshal_string(o.client_id.as_deref(), out)?;
        loose_marshal_string(o.password.as_deref(), out)?;
        loose_marshal_string(o.user_name.as_deref(), out)?;
        loose_marshal_object_array(wf, o.broker_path.as_deref(), out)?;
        out.write_bool(o.broker_master_connector);
        out.write_bool(o.manageable);
        if version >= 2 {
            out.write_bool(o.client_master);
        }
        if version >= 6 {
            out.write_bool(o.fault_tolerant);
            out.write_bool(o.failover_reconnect);
        }
        if version >= 8 {
            loose_marshal_string(o.client_ip.as_deref(), out)?;
        }
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut ConnectionInfo,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        let version = wf.version();
        loose_unmarshal_command(o, input)?;
        o.connection_id = loose_unmarshal_nested(wf, input)?;
        o.client_id = loose_unmarshal_string(input)?;
        o.password = loose_unmarshal_string(input)?;
        o.user_name = loose_unmarshal_string(input)?;
        o.broker_path = loose_unmarshal_object_array(wf, input)?;
        o.broker_master_connector = input.read_bool()?;
        o.manageable = input.read_bool()?;
        if version >= 2 {
            o.client_master = input.read_bool()?;
        }
        if version >= 6 {
            o.fault_tolerant = input.read_bool()?;
            o.failover_reconnect = input.read_bool()?;
        }
        if version >= 8 {
            o.client_ip = loose_unmarshal_string(input)?;
        }
        Ok(())
    }
}

pub struct SessionInfoMarshaller;

impl TypedMarshaller for SessionInfoMarshaller {
    type Target = SessionInfo;

    fn data_structure_type(&self) -> u8 {
        types::SESSION_INFO
    }

    fn create(&self) -> SessionInfo {
        SessionInfo::default()
    }

    fn tight_marshal1(&self, wf: &WireFormat, o: &SessionInfo, bs: &mut BooleanStream) -> Result<usize> {
        let rc = tight_marshal_command1(o, bs);
        Ok(rc + tight_marshal_nested1(wf, o.session_id.as_ref(), bs)?)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &SessionInfo,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_command2(o, out, bs)?;
        tight_marshal_nested2(wf, o.session_id.as_ref(), out, bs)
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut SessionInfo,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_unmarshal_command(o, input, bs)?;
        o.session_id = tight_unmarshal_nested(wf, input, bs)?;
        Ok(())
    }

    fn loose_marshal(&self, wf: &WireFormat, o: &SessionInfo, out: &mut BytesMut) -> Result<()> {
        loose_marshal_command(o, out);
        loose_marshal_nested(wf, o.session_id.as_ref(), out)
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut SessionInfo,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        loose_unmarshal_command(o, input)?;
        o.session_id = loose_unmarshal_nested(wf, input)?;
        Ok(())
    }
}

pub struct ProducerInfoMarshaller;

impl TypedMarshaller for ProducerInfoMarshaller {
    type Target = ProducerInfo;

    fn data_structure_type(&self) -> u8 {
        types::PRODUCER_INFO
    }

    fn create(&self) -> ProducerInfo {
        ProducerInfo::default()
    }

    fn tight_marshal1(&self, wf: &WireFormat, o: &ProducerInfo, bs: &mut BooleanStream) -> Result<usize> {
        let version = wf.version();
        let mut rc = tight_marshal_command1(o, bs);
        rc += tight_marshal_nested1(wf, o.producer_id.as_ref(), bs)?;
        rc += tight_marshal_nested1(wf, o.destination.as_ref(), bs)?;
        rc += tight_marshal_object_array1(wf, o.broker_path.as_deref(), bs)?;
        if version >= 2 {
            bs.write_boolean(o.dispatch_async);
        }
        if version >= 3 {
            rc += 4;
        }
        Ok(rc)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &ProducerInfo,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        let version = wf.version();
        tight_marshal_command2(o, out, bs)?;
        tight_marshal_nested2(wf, o.producer_id.as_ref(), out, bs)?;
        tight_marshal_nested2(wf, o.destination.as_ref(), out, bs)?;
        tight_marshal_object_array2(wf, o.broker_path.as_deref(), out, bs)?;
        if version >= 2 {
            bs.read_boolean()?;
        }
        if version >= 3 {
            out.put_i32(o.window_size);
        }
        Ok(())
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut ProducerInfo,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        let version = wf.version();
        tight_unmarshal_command(o, input, bs)?;
        o.producer_id = tight_unmarshal_nested(wf, input, bs)?;
        o.destination = tight_unmarshal_nested(wf, input, bs)?;
        o.broker_path = tight_unmarshal_object_array(wf, input, bs)?;
        if version >= 2 {
            o.dispatch_async = bs.read_boolean()?;
        }
        if version >= 3 {
            o.window_size = input.read_i32()?;
        }
        Ok(())
    }

    fn loose_marshal(&self, wf: &WireFormat, o: &ProducerInfo, out: &mut BytesMut) -> Result<()> {
        let version = wf.version();
        loose_marshal_command(o, out);
        loose_marshal_nested(wf, o.producer_id.as_ref(), out)?;
        loose_marshal_nested(wf, o.destination.as_ref(), out)?;
        loose_marshal_object_array(wf, o.broker_path.as_deref(), out)?;
        if version >= 2 {
            out.write_bool(o.dispatch_async);
        }
        if version >= 3 {
            out.put_i32(o.window_size);
        }
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut ProducerInfo,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        let version = wf.version();
        loose_unmarshal_command(o, input)?;
        o.producer_id = loose_unmarshal_nested(wf, input)?;
        o.destination = loose_unmarshal_nested(wf, input)?;
        o.broker_path = loose_unmarshal_object_array(wf, input)?;
        if version >= 2 {
            o.dispatch_async = input.read_bool()?;
        }
        if version >= 3 {
            o.window_size = input.read_i32()?;
        }
        Ok(())
    }
}

/// The removed object may be any registered data structure.
pub struct RemoveInfoMarshaller;

impl TypedMarshaller for RemoveInfoMarshaller {
    type Target = RemoveInfo;

    fn data_structure_type(&self) -> u8 {
        types::REMOVE_INFO
    }

    fn create(&self) -> RemoveInfo {
        RemoveInfo::default()
    }

    fn tight_marshal1(&self, wf: &WireFormat, o: &RemoveInfo, bs: &mut BooleanStream) -> Result<usize> {
        let mut rc = tight_marshal_command1(o, bs);
        rc += wf.tight_marshal_nested1(o.object_id.as_deref(), bs)?;
        if wf.version() >= 5 {
            rc += tight_marshal_long1(o.last_delivered_sequence_id, bs);
        }
        Ok(rc)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &RemoveInfo,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_command2(o, out, bs)?;
        wf.tight_marshal_nested2(o.object_id.as_deref(), out, bs)?;
        if wf.version() >= 5 {
            tight_marshal_long2(o.last_delivered_sequence_id, out, bs)?;
        }
        Ok(())
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut RemoveInfo,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_unmarshal_command(o, input, bs)?;
        o.object_id = wf.tight_unmarshal_nested(input, bs)?;
        if wf.version() >= 5 {
            o.last_delivered_sequence_id = tight_unmarshal_long(input, bs)?;
        }
        Ok(())
    }

    fn loose_marshal(&self, wf: &WireFormat, o: &RemoveInfo, out: &mut BytesMut) -> Result<()> {
        loose_marshal_command(o, out);
        wf.loose_marshal_nested(o.object_id.as_deref(), out)?;
        if wf.version() >= 5 {
            out.put_i64(o.last_delivered_sequence_id);
        }
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut RemoveInfo,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        loose_unmarshal_command(o, input)?;
        o.object_id = wf.loose_unmarshal_nested(input)?;
        if wf.version() >= 5 {
            o.last_delivered_sequence_id = input.read_i64()?;
        }
        Ok(())
    }
}

/// The dispatched message goes through the nested path, so a message with a
/// cached frame is emitted verbatim.
pub struct MessageDispatchMarshaller;

impl TypedMarshaller for MessageDispatchMarshaller {
    type Target = MessageDispatch;

    fn data_structure_type(&self) -> u8 {
        types::MESSAGE_DISPATCH
    }

    fn create(&self) -> MessageDispatch {
        MessageDispatch::default()
    }

    fn tight_marshal1(
        &self,
        wf: &WireFormat,
        o: &MessageDispatch,
        bs: &mut BooleanStream,
    ) -> Result<usize> {
        let mut rc = tight_marshal_command1(o, bs);
        rc += tight_marshal_nested1(wf, o.consumer_id.as_ref(), bs)?;
        rc += tight_marshal_nested1(wf, o.destination.as_ref(), bs)?;
        rc += wf.tight_marshal_nested1(o.message_data(), bs)?;
        Ok(rc + 4)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &MessageDispatch,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_command2(o, out, bs)?;
        tight_marshal_nested2(wf, o.consumer_id.as_ref(), out, bs)?;
        tight_marshal_nested2(wf, o.destination.as_ref(), out, bs)?;
        wf.tight_marshal_nested2(o.message_data(), out, bs)?;
        out.put_i32(o.redelivery_counter);
        Ok(())
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut MessageDispatch,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_unmarshal_command(o, input, bs)?;
        o.consumer_id = tight_unmarshal_nested(wf, input, bs)?;
        o.destination = tight_unmarshal_nested(wf, input, bs)?;
        o.set_message(wf.tight_unmarshal_nested(input, bs)?);
        o.redelivery_counter = input.read_i32()?;
        Ok(())
    }

    fn loose_marshal(&self, wf: &WireFormat, o: &MessageDispatch, out: &mut BytesMut) -> Result<()> {
        loose_marshal_command(o, out);
        loose_marshal_nested(wf, o.consumer_id.as_ref(), out)?;
        loose_marshal_nested(wf, o.destination.as_ref(), out)?;
        wf.loose_marshal_nested(o.message_data(), out)?;
        out.put_i32(o.redelivery_counter);
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut MessageDispatch,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        loose_unmarshal_command(o, input)?;
        o.consumer_id = loose_unmarshal_nested(wf, input)?;
        o.destination = loose_unmarshal_nested(wf, input)?;
        o.set_message(wf.loose_unmarshal_nested(input)?);
        o.redelivery_counter = input.read_i32()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::{
        ActiveMQMessage, Command, ConnectionId, ConnectionInfo, ConsumerId, MessageDispatch,
        ProducerId, ProducerInfo, RemoveInfo, SessionId, SessionInfo,
    };
    use crate::protocol::WireFormat;

    fn loose(version: i32) -> WireFormat {
        let mut wf = WireFormat::default();
        wf.set_version(version).unwrap();
        wf
    }

    fn loose_len(version: i32, command: &dyn Command) -> usize {
        loose(version).marshal_to_bytes(Some(command)).unwrap().len()
    }

    #[test]
    fn test_loose_session_info_layout() {
        let session = SessionId::new(&ConnectionId::new("c"), 5);
        let frame = loose(1)
            .marshal_to_bytes(Some(&SessionInfo::new(session)))
            .unwrap();
        assert_eq!(
            &frame[..],
            &[
                0, 0, 0, 20, // size
                4, // SessionInfo
                0, 0, 0, 0, 0, // command id, response required
                1, 121, // nested SessionId
                1, 0, 1, b'c', // connection id
                0, 0, 0, 0, 0, 0, 0, 5, // value
            ]
        );
    }

    #[test]
    fn test_connection_info_version_gates() {
        let info = ConnectionInfo::new(ConnectionId::new("ID:x"));
        assert_eq!(loose_len(2, &info), loose_len(1, &info) + 1);
        assert_eq!(loose_len(6, &info), loose_len(5, &info) + 2);
        assert_eq!(loose_len(8, &info), loose_len(7, &info) + 1);
        assert_eq!(loose_len(9, &info), loose_len(8, &info));
    }

    #[test]
    fn test_producer_and_remove_version_gates() {
        let session = SessionId::new(&ConnectionId::new("ID:x"), 1);
        let producer = ProducerInfo::new(ProducerId::new(&session, 1));
        assert_eq!(loose_len(2, &producer), loose_len(1, &producer) + 1);
        assert_eq!(loose_len(3, &producer), loose_len(2, &producer) + 4);

        let remove = RemoveInfo::new(session);
        assert_eq!(loose_len(5, &remove), loose_len(4, &remove) + 8);
    }

    #[test]
    fn test_remove_info_keeps_id_type() {
        let session = SessionId::new(&ConnectionId::new("ID:x"), 1);
        let mut remove = RemoveInfo::new(ConsumerId::new(&session, 3));
        remove.last_delivered_sequence_id = 1_000;

        for tight in [false, true] {
            let mut wf = WireFormat::default();
            wf.set_version(9).unwrap();
            wf.set_tight_encoding_enabled(tight).unwrap();
            let frame = wf.marshal_to_bytes(Some(&remove)).unwrap();
            let decoded = wf.unmarshal_bytes(&frame).unwrap().unwrap();
            let decoded = decoded.downcast_ref::<RemoveInfo>().unwrap();
            let id = decoded.object_id.as_deref().unwrap();
            assert_eq!(id.downcast_ref::<ConsumerId>(), Some(&ConsumerId::new(&session, 3)));
            assert_eq!(decoded.last_delivered_sequence_id, 1_000);
        }
    }

    #[test]
    fn test_dispatch_without_message() {
        let mut dispatch = MessageDispatch::new(ConsumerId::default(), ActiveMQMessage::new());
        dispatch.take_message();
        let wf = loose(9);
        let frame = wf.marshal_to_bytes(Some(&dispatch)).unwrap();
        let decoded = wf.unmarshal_bytes(&frame).unwrap().unwrap();
        let decoded = decoded.downcast_ref::<MessageDispatch>().unwrap();
        assert!(decoded.message().is_none());
        assert_eq!(decoded.consumer_id, Some(ConsumerId::default()));
    }
}
