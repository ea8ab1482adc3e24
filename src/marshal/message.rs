//! Message header layout, shared by every message kind.

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};

use super::support::*;
use super::TypedMarshaller;
use crate::commands::MessageCommand;
use crate::error::Result;
use crate::protocol::{BooleanStream, DataInput, DataOutput, WireFormat};

/// Marshals any [`MessageCommand`]; the body travels as an opaque byte
/// sequence and properties as an encoded primitive map.
pub struct MessageMarshaller<T> {
    code: u8,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MessageMarshaller<T>
where
    T: MessageCommand + Default,
{
    pub fn new() -> Self {
        Self {
            code: T::default().data_structure_type(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for MessageMarshaller<T>
where
    T: MessageCommand + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TypedMarshaller for MessageMarshaller<T>
where
    T: MessageCommand + Default + 'static,
{
    type Target = T;

    fn data_structure_type(&self) -> u8 {
        self.code
    }

    fn create(&self) -> T {
        T::default()
    }

    fn tight_marshal1(&self, wf: &WireFormat, o: &T, bs: &mut BooleanStream) -> Result<usize> {
        let version = wf.version();
        let m = o.message();
        let content = m.content();
        let properties = m.encoded_properties()?;

        let mut rc = tight_marshal_command1(o, bs);
        rc += tight_marshal_nested1(wf, m.producer_id.as_ref(), bs)?;
        rc += tight_marshal_nested1(wf, m.destination.as_ref(), bs)?;
        rc += tight_marshal_nested1(wf, m.transaction_id.as_ref(), bs)?;
        rc += tight_marshal_nested1(wf, m.original_destination.as_ref(), bs)?;
        rc += tight_marshal_nested1(wf, m.message_id.as_ref(), bs)?;
        rc += tight_marshal_nested1(wf, m.original_transaction_id.as_ref(), bs)?;
        rc += tight_marshal_string1(m.group_id.as_deref(), bs)?;
        rc += tight_marshal_string1(m.correlation_id.as_deref(), bs)?;
        bs.write_boolean(m.persistent);
        rc += tight_marshal_long1(m.expiration, bs);
        rc += tight_marshal_nested1(wf, m.reply_to.as_ref(), bs)?;
        rc += tight_marshal_long1(m.timestamp, bs);
        rc += tight_marshal_string1(m.message_type.as_deref(), bs)?;
        rc += tight_marshal_byte_sequence1(non_empty(&content), bs);
        rc += tight_marshal_byte_sequence1(properties.as_deref(), bs);
        rc += wf.tight_marshal_nested1(m.data_structure.as_deref(), bs)?;
        rc += tight_marshal_nested1(wf, m.target_consumer_id.as_ref(), bs)?;
        bs.write_boolean(m.compressed);
        rc += tight_marshal_object_array1(wf, m.broker_path.as_deref(), bs)?;
        rc += tight_marshal_long1(m.arrival, bs);
        rc += tight_marshal_string1(m.user_id.as_deref(), bs)?;
        bs.write_boolean(m.received_by_dfbridge);
        if version >= 2 {
            bs.write_boolean(m.droppable);
        }
        if version >= 3 {
            rc += tight_marshal_object_array1(wf, m.cluster.as_deref(), bs)?;
            rc += tight_marshal_long1(m.broker_in_time, bs);
            rc += tight_marshal_long1(m.broker_out_time, bs);
        }

        // group sequence, priority, redelivery counter
        Ok(rc + 9)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &T,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        let version = wf.version();
        let m = o.message();
        let content = m.content();
        let properties = m.encoded_properties()?;

        tight_marshal_command2(o, out, bs)?;
        tight_marshal_nested2(wf, m.producer_id.as_ref(), out, bs)?;
        tight_marshal_nested2(wf, m.destination.as_ref(), out, bs)?;
        tight_marshal_nested2(wf, m.transaction_id.as_ref(), out, bs)?;
        tight_marshal_nested2(wf, m.original_destination.as_ref(), out, bs)?;
        tight_marshal_nested2(wf, m.message_id.as_ref(), out, bs)?;
        tight_marshal_nested2(wf, m.original_transaction_id.as_ref(), out, bs)?;
        tight_marshal_string2(m.group_id.as_deref(), out, bs)?;
        out.put_i32(m.group_sequence);
        tight_marshal_string2(m.correlation_id.as_deref(), out, bs)?;
        bs.read_boolean()?;
        tight_marshal_long2(m.expiration, out, bs)?;
        out.put_u8(m.priority);
        tight_marshal_nested2(wf, m.reply_to.as_ref(), out, bs)?;
        tight_marshal_long2(m.timestamp, out, bs)?;
        tight_marshal_string2(m.message_type.as_deref(), out, bs)?;
        tight_marshal_byte_sequence2(non_empty(&content), out, bs)?;
        tight_marshal_byte_sequence2(properties.as_deref(), out, bs)?;
        wf.tight_marshal_nested2(m.data_structure.as_deref(), out, bs)?;
        tight_marshal_nested2(wf, m.target_consumer_id.as_ref(), out, bs)?;
        bs.read_boolean()?;
        out.put_i32(m.redelivery_counter);
        tight_marshal_object_array2(wf, m.broker_path.as_deref(), out, bs)?;
        tight_marshal_long2(m.arrival, out, bs)?;
        tight_marshal_string2(m.user_id.as_deref(), out, bs)?;
        bs.read_boolean()?;
        if version >= 2 {
            bs.read_boolean()?;
        }
        if version >= 3 {
            tight_marshal_object_array2(wf, m.cluster.as_deref(), out, bs)?;
            tight_marshal_long2(m.broker_in_time, out, bs)?;
            tight_marshal_long2(m.broker_out_time, out, bs)?;
        }
        Ok(())
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut T,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        let version = wf.version();
        tight_unmarshal_command(o, input, bs)?;

        let m = o.message_mut();
        m.producer_id = tight_unmarshal_nested(wf, input, bs)?;
        m.destination = tight_unmarshal_nested(wf, input, bs)?;
        m.transaction_id = tight_unmarshal_nested(wf, input, bs)?;
        m.original_destination = tight_unmarshal_nested(wf, input, bs)?;
        m.message_id = tight_unmarshal_nested(wf, input, bs)?;
        m.original_transaction_id = tight_unmarshal_nested(wf, input, bs)?;
        m.group_id = tight_unmarshal_string(input, bs)?;
        m.group_sequence = input.read_i32()?;
        m.correlation_id = tight_unmarshal_string(input, bs)?;
        m.persistent = bs.read_boolean()?;
        m.expiration = tight_unmarshal_long(input, bs)?;
        m.priority = input.read_u8()?;
        m.reply_to = tight_unmarshal_nested(wf, input, bs)?;
        m.timestamp = tight_unmarshal_long(input, bs)?;
        m.message_type = tight_unmarshal_string(input, bs)?;
        m.set_received_content(tight_unmarshal_byte_sequence(input, bs)?);
        m.set_marshalled_properties(tight_unmarshal_byte_sequence(input, bs)?);
        m.data_structure = wf.tight_unmarshal_nested(input, bs)?;
        m.target_consumer_id = tight_unmarshal_nested(wf, input, bs)?;
        m.compressed = bs.read_boolean()?;
        m.redelivery_counter = input.read_i32()?;
        m.broker_path = tight_unmarshal_object_array(wf, input, bs)?;
        m.arrival = tight_unmarshal_long(input, bs)?;
        m.user_id = tight_unmarshal_string(input, bs)?;
        m.received_by_dfbridge = bs.read_boolean()?;
        if version >= 2 {
            m.droppable = bs.read_boolean()?;
        }
        if version >= 3 {
            m.cluster = tight_unmarshal_object_array(wf, input, bs)?;
            m.broker_in_time = tight_unmarshal_long(input, bs)?;
            m.broker_out_time = tight_unmarshal_long(input, bs)?;
        }
        Ok(())
    }

    fn loose_marshal(&self, wf: &WireFormat, o: &T, out: &mut BytesMut) -> Result<()> {
        let version = wf.version();
        let m = o.message();
        let content = m.content();
        let properties = m.encoded_properties()?;

        loose_marshal_command(o, out);
        loose_marshal_nested(wf, m.producer_id.as_ref(), out)?;
        loose_marshal_nested(wf, m.destination.as_ref(), out)?;
        loose_marshal_nested(wf, m.transaction_id.as_ref(), out)?;
        loose_marshal_nested(wf, m.original_destination.as_ref(), out)?;
        loose_marshal_nested(wf, m.message_id.as_ref(), out)?;
        loose_marshal_nested(wf, m.original_transaction_id.as_ref(), out)?;
        loose_marshal_string(m.group_id.as_deref(), out)?;
        out.put_i32(m.group_sequence);
        loose_marshal_string(m.correlation_id.as_deref(), out)?;
        out.write_bool(m.persistent);
        out.put_i64(m.expiration);
        out.put_u8(m.priority);
        loose_marshal_nested(wf, m.reply_to.as_ref(), out)?;
        out.put_i64(m.timestamp);
        loose_marshal_string(m.message_type.as_deref(), out)?;
        loose_marshal_byte_sequence(non_empty(&content), out)?;
        loose_marshal_byte_sequence(properties.as_deref(), out)?;
        wf.loose_marshal_nested(m.data_structure.as_deref(), out)?;
        loose_marshal_nested(wf, m.target_consumer_id.as_ref(), out)?;
        out.write_bool(m.compressed);
        out.put_i32(m.redelivery_counter);
        loose_marshal_object_array(wf, m.broker_path.as_deref(), out)?;
        out.put_i64(m.arrival);
        loose_marshal_string(m.user_id.as_deref(), out)?;
        out.write_bool(m.received_by_dfbridge);
        if version >= 2 {
            out.write_bool(m.droppable);
        }
        if version >= 3 {
            loose_marshal_object_array(wf, m.cluster.as_deref(), out)?;
            out.put_i64(m.broker_in_time);
            out.put_i64(m.broker_out_time);
        }
        Ok(())
    }

    fn loose_unmarshal(&self, wf: &WireFormat, o: &mut T, input: &mut DataInput<'_>) -> Result<()> {
        let version = wf.version();
        loose_unmarshal_command(o, input)?;

        let m = o.message_mut();
        m.producer_id = loose_unmarshal_nested(wf, input)?;
        m.destination = loose_unmarshal_nested(wf, input)?;
        m.transaction_id = loose_unmarshal_nested(wf, input)?;
        m.original_destination = loose_unmarshal_nested(wf, input)?;
        m.message_id = loose_unmarshal_nested(wf, input)?;
        m.original_transaction_id = loose_unmarshal_nested(wf, input)?;
        m.group_id = loose_unmarshal_string(input)?;
        m.group_sequence = input.read_i32()?;
        m.correlation_id = loose_unmarshal_string(input)?;
        m.persistent = input.read_bool()?;
        m.expiration = input.read_i64()?;
        m.priority = input.read_u8()?;
        m.reply_to = loose_unmarshal_nested(wf, input)?;
        m.timestamp = input.read_i64()?;
        m.message_type = loose_unmarshal_string(input)?;
        m.set_received_content(loose_unmarshal_byte_sequence(input)?);
        m.set_marshalled_properties(loose_unmarshal_byte_sequence(input)?);
        m.data_structure = wf.loose_unmarshal_nested(input)?;
        m.target_consumer_id = loose_unmarshal_nested(wf, input)?;
        m.compressed = input.read_bool()?;
        m.redelivery_counter = input.read_i32()?;
        m.broker_path = loose_unmarshal_object_array(wf, input)?;
        m.arrival = input.read_i64()?;
        m.user_id = loose_unmarshal_string(input)?;
        m.received_by_dfbridge = input.read_bool()?;
        if version >= 2 {
            m.droppable = input.read_bool()?;
        }
        if version >= 3 {
            m.cluster = loose_unmarshal_object_array(wf, input)?;
            m.broker_in_time = input.read_i64()?;
            m.broker_out_time = input.read_i64()?;
        }
        Ok(())
    }
}

/// Empty bodies travel as an absent sequence.
fn non_empty(content: &[u8]) -> Option<&[u8]> {
    (!content.is_empty()).then_some(content)
}
