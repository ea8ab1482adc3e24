//! Handshake, keep-alive, shutdown and response layouts.

use bytes::{BufMut, Bytes, BytesMut};

use super::support::*;
use super::TypedMarshaller;
use crate::commands::{
    types, ExceptionResponse, KeepAliveInfo, Response, ShutdownInfo, WireFormatInfo,
};
use crate::error::Result;
use crate::primitive::codec;
use crate::protocol::{BooleanStream, DataInput, WireFormat};

/// Magic, version and encoded properties. No command header.
pub struct WireFormatInfoMarshaller;

fn encoded_properties(o: &WireFormatInfo) -> Result<Option<Bytes>> {
    if o.properties().is_empty() {
        Ok(None)
    } else {
        codec::marshal_map_to_bytes(o.properties()).map(Some)
    }
}

fn decode_properties(o: &mut WireFormatInfo, raw: Option<Bytes>) -> Result<()> {
    if let Some(raw) = raw {
        o.set_properties(codec::unmarshal_map_from_bytes(&raw)?);
    }
    Ok(())
}

impl TypedMarshaller for WireFormatInfoMarshaller {
    type Target = WireFormatInfo;

    fn data_structure_type(&self) -> u8 {
        types::WIREFORMAT_INFO
    }

    fn create(&self) -> WireFormatInfo {
        WireFormatInfo::default()
    }

    fn tight_marshal1(
        &self,
        _wf: &WireFormat,
        o: &WireFormatInfo,
        bs: &mut BooleanStream,
    ) -> Result<usize> {
        let properties = encoded_properties(o)?;
        let rc = o.magic.len() + tight_marshal_byte_sequence1(properties.as_deref(), bs);
        Ok(rc + 4)
    }

    fn tight_marshal2(
        &self,
        _wf: &WireFormat,
        o: &WireFormatInfo,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        marshal_const_byte_array(&o.magic, out);
        out.put_i32(o.version);
        let properties = encoded_properties(o)?;
        tight_marshal_byte_sequence2(properties.as_deref(), out, bs)
    }

    fn tight_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut WireFormatInfo,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        o.magic = unmarshal_const_byte_array(input)?;
        o.version = input.read_i32()?;
        let raw = tight_unmarshal_byte_sequence(input, bs)?;
        decode_properties(o, raw)
    }

    fn loose_marshal(&self, _wf: &WireFormat, o: &WireFormatInfo, out: &mut BytesMut) -> Result<()> {
        marshal_const_byte_array(&o.magic, out);
        out.put_i32(o.version);
        let properties = encoded_properties(o)?;
        loose_marshal_byte_sequence(properties.as_deref(), out)
    }

    fn loose_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut WireFormatInfo,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        o.magic = unmarshal_const_byte_array(input)?;
        o.version = input.read_i32()?;
        let raw = loose_unmarshal_byte_sequence(input)?;
        decode_properties(o, raw)
    }
}

/// Layout for commands that carry only the command header.
macro_rules! header_only_marshaller {
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
                Ok(tight_marshal_command1(o, bs))
            }

            fn tight_marshal2(
                &self,
                _wf: &WireFormat,
                o: &$target,
                out: &mut BytesMut,
                bs: &mut BooleanStream,
            ) -> Result<()> {
                tight_marshal_command2(o, out, bs)
            }

            fn tight_unmarshal(
                &self,
                _wf: &WireFormat,
                o: &mut $target,
                input: &mut DataInput<'_>,
                bs: &mut BooleanStream,
            ) -> Result<()> {
                tight_unmarshal_command(o, input, bs)
            }

            fn loose_marshal(&self, _wf: &WireFormat, o: &$target, out: &mut BytesMut) -> Result<()> {
                loose_marshal_command(o, out);
                Ok(())
            }

            fn loose_unmarshal(
                &self,
                _wf: &WireFormat,
                o: &mut $target,
                input: &mut DataInput<'_>,
            ) -> Result<()> {
                loose_unmarshal_command(o, input)
            }
        }
    };
}

header_only_marshaller!(KeepAliveInfoMarshaller, KeepAliveInfo, types::KEEP_ALIVE_INFO);
header_only_marshaller!(ShutdownInfoMarshaller, ShutdownInfo, types::SHUTDOWN_INFO);

pub struct ResponseMarshaller;

impl TypedMarshaller for ResponseMarshaller {
    type Target = Response;

    fn data_structure_type(&self) -> u8 {
        types::RESPONSE
    }

    fn create(&self) -> Response {
        Response::default()
    }

    fn tight_marshal1(&self, _wf: &WireFormat, o: &Response, bs: &mut BooleanStream) -> Result<usize> {
        Ok(tight_marshal_command1(o, bs) + 4)
    }

    fn tight_marshal2(
        &self,
        _wf: &WireFormat,
        o: &Response,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_command2(o, out, bs)?;
        out.put_i32(o.correlation_id);
        Ok(())
    }

    fn tight_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut Response,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_unmarshal_command(o, input, bs)?;
        o.correlation_id = input.read_i32()?;
        Ok(())
    }

    fn loose_marshal(&self, _wf: &WireFormat, o: &Response, out: &mut BytesMut) -> Result<()> {
        loose_marshal_command(o, out);
        out.put_i32(o.correlation_id);
        Ok(())
    }

    fn loose_unmarshal(
        &self,
        _wf: &WireFormat,
        o: &mut Response,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        loose_unmarshal_command(o, input)?;
        o.correlation_id = input.read_i32()?;
        Ok(())
    }
}

/// Response fields followed by the broker error.
pub struct ExceptionResponseMarshaller;

impl TypedMarshaller for ExceptionResponseMarshaller {
    type Target = ExceptionResponse;

    fn data_structure_type(&self) -> u8 {
        types::EXCEPTION_RESPONSE
    }

    fn create(&self) -> ExceptionResponse {
        ExceptionResponse::default()
    }

    fn tight_marshal1(
        &self,
        wf: &WireFormat,
        o: &ExceptionResponse,
        bs: &mut BooleanStream,
    ) -> Result<usize> {
        let rc = tight_marshal_command1(o, bs) + 4;
        Ok(rc + tight_marshal_throwable1(wf, o.exception.as_ref(), bs)?)
    }

    fn tight_marshal2(
        &self,
        wf: &WireFormat,
        o: &ExceptionResponse,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_marshal_command2(o, out, bs)?;
        out.put_i32(o.correlation_id);
        tight_marshal_throwable2(wf, o.exception.as_ref(), out, bs)
    }

    fn tight_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut ExceptionResponse,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        tight_unmarshal_command(o, input, bs)?;
        o.correlation_id = input.read_i32()?;
        o.exception = tight_unmarshal_throwable(wf, input, bs)?;
        Ok(())
    }

    fn loose_marshal(
        &self,
        wf: &WireFormat,
        o: &ExceptionResponse,
        out: &mut BytesMut,
    ) -> Result<()> {
        loose_marshal_command(o, out);
        out.put_i32(o.correlation_id);
        loose_marshal_throwable(wf, o.exception.as_ref(), out)
    }

    fn loose_unmarshal(
        &self,
        wf: &WireFormat,
        o: &mut ExceptionResponse,
        input: &mut DataInput<'_>,
    ) -> Result<()> {
        loose_unmarshal_command(o, input)?;
        o.correlation_id = input.read_i32()?;
        o.exception = loose_unmarshal_throwable(wf, input)?;
        Ok(())
    }
}
