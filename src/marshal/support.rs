//! Field encodings shared by the concrete marshallers.
//!
//! Tight helpers come in three parts: `*1` records the flags a field needs in
//! the boolean stream and returns its payload size, `*2` writes the payload
//! while consuming the same flags, and `tight_unmarshal_*` reads it back.
//! Loose helpers write presence markers inline.
//!
//! Fields a broker may cache are written in nested form; the codec never
//! negotiates cache encoding on.

use bytes::{BufMut, Bytes, BytesMut};

use crate::commands::{BrokerError, Command, DataStructure, StackTraceElement};
use crate::error::{OpenWireError, Result};
use crate::protocol::{
    is_modified_ascii, modified_utf8_len, BooleanStream, DataInput, DataOutput, WireFormat,
};

// ---- downcasts ----

/// View a data structure as the concrete type a marshaller handles.
pub fn cast<T: DataStructure>(o: &dyn DataStructure) -> Result<&T> {
    let code = o.data_structure_type();
    o.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| mismatch::<T>(code))
}

pub fn cast_mut<T: DataStructure>(o: &mut dyn DataStructure) -> Result<&mut T> {
    let code = o.data_structure_type();
    o.as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| mismatch::<T>(code))
}

/// Take ownership of a decoded nested value of a known type.
pub fn downcast_boxed<T: DataStructure>(o: Box<dyn DataStructure>) -> Result<T> {
    let code = o.data_structure_type();
    o.into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| mismatch::<T>(code))
}

fn mismatch<T>(code: u8) -> OpenWireError {
    OpenWireError::Protocol(format!(
        "Data structure type {code} is not a {}",
        std::any::type_name::<T>()
    ))
}

// ---- command header ----

pub fn tight_marshal_command1(o: &dyn Command, bs: &mut BooleanStream) -> usize {
    bs.write_boolean(o.is_response_required());
    4
}

pub fn tight_marshal_command2(
    o: &dyn Command,
    out: &mut BytesMut,
    bs: &mut BooleanStream,
) -> Result<()> {
    out.put_i32(o.command_id());
    bs.read_boolean()?;
    Ok(())
}

pub fn tight_unmarshal_command(
    o: &mut dyn Command,
    input: &mut DataInput<'_>,
    bs: &mut BooleanStream,
) -> Result<()> {
    o.set_command_id(input.read_i32()?);
    o.set_response_required(bs.read_boolean()?);
    Ok(())
}

pub fn loose_marshal_command(o: &dyn Command, out: &mut BytesMut) {
    out.put_i32(o.command_id());
    out.write_bool(o.is_response_required());
}

pub fn loose_unmarshal_command(o: &mut dyn Command, input: &mut DataInput<'_>) -> Result<()> {
    o.set_command_id(input.read_i32()?);
    o.set_response_required(input.read_bool()?);
    Ok(())
}

// ---- longs ----

/// Longs take 0, 2, 4 or 8 bytes depending on magnitude, selected by two
/// flags.
pub fn tight_marshal_long1(value: i64, bs: &mut BooleanStream) -> usize {
    let bits = value as u64;
    if bits == 0 {
        bs.write_boolean(false);
        bs.write_boolean(false);
        0
    } else if bits & 0xFFFF_FFFF_FFFF_0000 == 0 {
        bs.write_boolean(false);
        bs.write_boolean(true);
        2
    } else if bits & 0xFFFF_FFFF_0000_0000 == 0 {
        bs.write_boolean(true);
        bs.write_boolean(false);
        4
    } else {
        bs.write_boolean(true);
        bs.write_boolean(true);
        8
    }
}

pub fn tight_marshal_long2(value: i64, out: &mut BytesMut, bs: &mut BooleanStream) -> Result<()> {
    if bs.read_boolean()? {
        if bs.read_boolean()? {
            out.put_i64(value);
        } else {
            out.put_u32(value as u32);
        }
    } else if bs.read_boolean()? {
        out.put_u16(value as u16);
    }
    Ok(())
}

pub fn tight_unmarshal_long(input: &mut DataInput<'_>, bs: &mut BooleanStream) -> Result<i64> {
    if bs.read_boolean()? {
        if bs.read_boolean()? {
            input.read_i64()
        } else {
            Ok(i64::from(input.read_i32()? as u32))
        }
    } else if bs.read_boolean()? {
        Ok(i64::from(input.read_u16()?))
    } else {
        Ok(0)
    }
}

// ---- strings ----

pub fn tight_marshal_string1(value: Option<&str>, bs: &mut BooleanStream) -> Result<usize> {
    bs.write_boolean(value.is_some());
    let Some(value) = value else {
        return Ok(0);
    };
    let len = modified_utf8_len(value);
    if len >= i16::MAX as usize {
        return Err(OpenWireError::Protocol(format!(
            "String of {len} encoded bytes is too long to marshal"
        )));
    }
    bs.write_boolean(is_modified_ascii(value));
    Ok(len + 2)
}

pub fn tight_marshal_string2(
    value: Option<&str>,
    out: &mut BytesMut,
    bs: &mut BooleanStream,
) -> Result<()> {
    if !bs.read_boolean()? {
        return Ok(());
    }
    let value = value.unwrap_or_default();
    if bs.read_boolean()? {
        out.put_u16(value.len() as u16);
        out.put_slice(value.as_bytes());
        Ok(())
    } else {
        out.write_utf(value)
    }
}

pub fn tight_unmarshal_string(
    input: &mut DataInput<'_>,
    bs: &mut BooleanStream,
) -> Result<Option<String>> {
    if !bs.read_boolean()? {
        return Ok(None);
    }
    if bs.read_boolean()? {
        let len = usize::from(input.read_u16()?);
        let raw = input.read_bytes(len)?;
        Ok(Some(raw.iter().map(|&b| char::from(b)).collect()))
    } else {
        input.read_utf().map(Some)
    }
}

pub fn loose_marshal_string(value: Option<&str>, out: &mut BytesMut) -> Result<()> {
    out.write_bool(value.is_some());
    match value {
        Some(value) => out.write_utf(value),
        None => Ok(()),
    }
}

pub fn loose_unmarshal_string(input: &mut DataInput<'_>) -> Result<Option<String>> {
    if input.read_bool()? {
        input.read_utf().map(Some)
    } else {
        Ok(None)
    }
}

// ---- byte sequences ----

pub fn tight_marshal_byte_sequence1(value: Option<&[u8]>, bs: &mut BooleanStream) -> usize {
    bs.write_boolean(value.is_some());
    value.map_or(0, |v| v.len() + 4)
}

pub fn tight_marshal_byte_sequence2(
    value: Option<&[u8]>,
    out: &mut BytesMut,
    bs: &mut BooleanStream,
) -> Result<()> {
    if bs.read_boolean()? {
        out.write_sized_bytes(value.unwrap_or_default())?;
    }
    Ok(())
}

pub fn tight_unmarshal_byte_sequence(
    input: &mut DataInput<'_>,
    bs: &mut BooleanStream,
) -> Result<Option<Bytes>> {
    if bs.read_boolean()? {
        read_byte_sequence(input).map(Some)
    } else {
        Ok(None)
    }
}

pub fn loose_marshal_byte_sequence(value: Option<&[u8]>, out: &mut BytesMut) -> Result<()> {
    out.write_bool(value.is_some());
    match value {
        Some(value) => out.write_sized_bytes(value),
        None => Ok(()),
    }
}

pub fn loose_unmarshal_byte_sequence(input: &mut DataInput<'_>) -> Result<Option<Bytes>> {
    if input.read_bool()? {
        read_byte_sequence(input).map(Some)
    } else {
        Ok(None)
    }
}

fn read_byte_sequence(input: &mut DataInput<'_>) -> Result<Bytes> {
    let start = input.position();
    let len = input.read_i32()?;
    let len = usize::try_from(len).map_err(|_| {
        input.set_position(start);
        OpenWireError::Protocol(format!("Negative byte sequence length: {len}"))
    })?;
    match input.read_bytes(len) {
        Ok(raw) => Ok(Bytes::copy_from_slice(raw)),
        Err(e) => {
            input.set_position(start);
            Err(e)
        }
    }
}

/// Fixed-size arrays are written raw in both encodings.
pub fn marshal_const_byte_array(value: &[u8], out: &mut BytesMut) {
    out.put_slice(value);
}

pub fn unmarshal_const_byte_array<const N: usize>(input: &mut DataInput<'_>) -> Result<[u8; N]> {
    let mut value = [0u8; N];
    value.copy_from_slice(input.read_bytes(N)?);
    Ok(value)
}

// ---- nested objects ----

pub fn tight_marshal_nested1<T: DataStructure>(
    wf: &WireFormat,
    value: Option<&T>,
    bs: &mut BooleanStream,
) -> Result<usize> {
    wf.tight_marshal_nested1(value.map(|v| v as &dyn DataStructure), bs)
}

pub fn tight_marshal_nested2<T: DataStructure>(
    wf: &WireFormat,
    value: Option<&T>,
    out: &mut BytesMut,
    bs: &mut BooleanStream,
) -> Result<()> {
    wf.tight_marshal_nested2(value.map(|v| v as &dyn DataStructure), out, bs)
}

pub fn tight_unmarshal_nested<T: DataStructure>(
    wf: &WireFormat,
    input: &mut DataInput<'_>,
    bs: &mut BooleanStream,
) -> Result<Option<T>> {
    wf.tight_unmarshal_nested(input, bs)?
        .map(downcast_boxed)
        .transpose()
}

pub fn loose_marshal_nested<T: DataStructure>(
    wf: &WireFormat,
    value: Option<&T>,
    out: &mut BytesMut,
) -> Result<()> {
    wf.loose_marshal_nested(value.map(|v| v as &dyn DataStructure), out)
}

pub fn loose_unmarshal_nested<T: DataStructure>(
    wf: &WireFormat,
    input: &mut DataInput<'_>,
) -> Result<Option<T>> {
    wf.loose_unmarshal_nested(input)?
        .map(downcast_boxed)
        .transpose()
}

// ---- object arrays ----

fn array_len(len: usize) -> Result<i16> {
    i16::try_from(len)
        .map_err(|_| OpenWireError::Protocol(format!("Array of {len} elements is too long")))
}

fn read_array_len(input: &mut DataInput<'_>) -> Result<usize> {
    let len = input.read_i16()?;
    usize::try_from(len)
        .map_err(|_| OpenWireError::Protocol(format!("Negative array length: {len}")))
}

fn required<T>(element: Option<T>) -> Result<T> {
    element.ok_or_else(|| OpenWireError::Protocol("Null element in object array".into()))
}

pub fn tight_marshal_object_array1<T: DataStructure>(
    wf: &WireFormat,
    values: Option<&[T]>,
    bs: &mut BooleanStream,
) -> Result<usize> {
    bs.write_boolean(values.is_some());
    let Some(values) = values else {
        return Ok(0);
    };
    let mut rc = 2;
    for value in values {
        rc += tight_marshal_nested1(wf, Some(value), bs)?;
    }
    Ok(rc)
}

pub fn tight_marshal_object_array2<T: DataStructure>(
    wf: &WireFormat,
    values: Option<&[T]>,
    out: &mut BytesMut,
    bs: &mut BooleanStream,
) -> Result<()> {
    if !bs.read_boolean()? {
        return Ok(());
    }
    let values = values.unwrap_or_default();
    out.put_i16(array_len(values.len())?);
    for value in values {
        tight_marshal_nested2(wf, Some(value), out, bs)?;
    }
    Ok(())
}

pub fn tight_unmarshal_object_array<T: DataStructure>(
    wf: &WireFormat,
    input: &mut DataInput<'_>,
    bs: &mut BooleanStream,
) -> Result<Option<Vec<T>>> {
    if !bs.read_boolean()? {
        return Ok(None);
    }
    let len = read_array_len(input)?;
    let mut values = Vec::with_capacity(len.min(input.remaining()));
    for _ in 0..len {
        values.push(required(tight_unmarshal_nested(wf, input, bs)?)?);
    }
    Ok(Some(values))
}

pub fn loose_marshal_object_array<T: DataStructure>(
    wf: &WireFormat,
    values: Option<&[T]>,
    out: &mut BytesMut,
) -> Result<()> {
    out.write_bool(values.is_some());
    let Some(values) = values else {
        return Ok(());
    };
    out.put_i16(array_len(values.len())?);
    for value in values {
        loose_marshal_nested(wf, Some(value), out)?;
    }
    Ok(())
}

pub fn loose_unmarshal_object_array<T: DataStructure>(
    wf: &WireFormat,
    input: &mut DataInput<'_>,
) -> Result<Option<Vec<T>>> {
    if !input.read_bool()? {
        return Ok(None);
    }
    let len = read_array_len(input)?;
    let mut values = Vec::with_capacity(len.min(input.remaining()));
    for _ in 0..len {
        values.push(required(loose_unmarshal_nested(wf, input)?)?);
    }
    Ok(Some(values))
}

// ---- broker errors ----

/// Stack traces and causes only travel when stack trace propagation is on.
pub fn tight_marshal_throwable1(
    wf: &WireFormat,
    error: Option<&BrokerError>,
    bs: &mut BooleanStream,
) -> Result<usize> {
    bs.write_boolean(error.is_some());
    let Some(error) = error else {
        return Ok(0);
    };
    let mut rc = tight_marshal_string1(error.exception_class.as_deref(), bs)?;
    rc += tight_marshal_string1(error.message.as_deref(), bs)?;
    if wf.is_stack_trace_enabled() {
        rc += 2;
        for element in &error.stack_trace {
            rc += tight_marshal_string1(element.class_name.as_deref(), bs)?;
            rc += tight_marshal_string1(element.method_name.as_deref(), bs)?;
            rc += tight_marshal_string1(element.file_name.as_deref(), bs)?;
            rc += 4;
        }
        rc += tight_marshal_throwable1(wf, error.cause.as_deref(), bs)?;
    }
    Ok(rc)
}

pub fn tight_marshal_throwable2(
    wf: &WireFormat,
    error: Option<&BrokerError>,
    out: &mut BytesMut,
    bs: &mut BooleanStream,
) -> Result<()> {
    if !bs.read_boolean()? {
        return Ok(());
    }
    let Some(error) = error else {
        return Err(OpenWireError::IllegalState(
            "Error vanished between marshal passes".into(),
        ));
    };
    tight_marshal_string2(error.exception_class.as_deref(), out, bs)?;
    tight_marshal_string2(error.message.as_deref(), out, bs)?;
    if wf.is_stack_trace_enabled() {
        out.put_i16(array_len(error.stack_trace.len())?);
        for element in &error.stack_trace {
            tight_marshal_string2(element.class_name.as_deref(), out, bs)?;
            tight_marshal_string2(element.method_name.as_deref(), out, bs)?;
            tight_marshal_string2(element.file_name.as_deref(), out, bs)?;
            out.put_i32(element.line_number);
        }
        tight_marshal_throwable2(wf, error.cause.as_deref(), out, bs)?;
    }
    Ok(())
}

pub fn tight_unmarshal_throwable(
    wf: &WireFormat,
    input: &mut DataInput<'_>,
    bs: &mut BooleanStream,
) -> Result<Option<BrokerError>> {
    if !bs.read_boolean()? {
        return Ok(None);
    }
    let mut error = BrokerError {
        exception_class: tight_unmarshal_string(input, bs)?,
        message: tight_unmarshal_string(input, bs)?,
        ..BrokerError::default()
    };
    if wf.is_stack_trace_enabled() {
        let len = read_array_len(input)?;
        for _ in 0..len {
            error.stack_trace.push(StackTraceElement {
                class_name: tight_unmarshal_string(input, bs)?,
                method_name: tight_unmarshal_string(input, bs)?,
                file_name: tight_unmarshal_string(input, bs)?,
                line_number: input.read_i32()?,
            });
        }
        error.cause = tight_unmarshal_throwable(wf, input, bs)?.map(Box::new);
    }
    Ok(Some(error))
}

pub fn loose_marshal_throwable(
    wf: &WireFormat,
    error: Option<&BrokerError>,
    out: &mut BytesMut,
) -> Result<()> {
    out.write_bool(error.is_some());
    let Some(error) = error else {
        return Ok(());
    };
    loose_marshal_string(error.exception_class.as_deref(), out)?;
    loose_marshal_string(error.message.as_deref(), out)?;
    if wf.is_stack_trace_enabled() {
        out.put_i16(array_len(error.stack_trace.len())?);
        for element in &error.stack_trace {
            loose_marshal_string(element.class_name.as_deref(), out)?;
            loose_marshal_string(element.method_name.as_deref(), out)?;
            loose_marshal_string(element.file_name.as_deref(), out)?;
            out.put_i32(element.line_number);
        }
        loose_marshal_throwable(wf, error.cause.as_deref(), out)?;
    }
    Ok(())
}

pub fn loose_unmarshal_throwable(
    wf: &WireFormat,
    input: &mut DataInput<'_>,
) -> Result<Option<BrokerError>> {
    if !input.read_bool()? {
        return Ok(None);
    }
    let mut error = BrokerError {
        exception_class: loose_unmarshal_string(input)?,
        message: loose_unmarshal_string(input)?,
        ..BrokerError::default()
    };
    if wf.is_stack_trace_enabled() {
        let len = read_array_len(input)?;
        for _ in 0..len {
            error.stack_trace.push(StackTraceElement {
                class_name: loose_unmarshal_string(input)?,
                method_name: loose_unmarshal_string(input)?,
                file_name: loose_unmarshal_string(input)?,
                line_number: input.read_i32()?,
            });
        }
        error.cause = loose_unmarshal_throwable(wf, input)?.map(Box::new);
    }
    Ok(Some(error))
}
