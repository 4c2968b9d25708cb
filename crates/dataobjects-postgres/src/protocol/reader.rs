//! PostgreSQL message decoder.
//!
//! Bytes arrive in arbitrary chunks; `MessageReader` buffers them and yields
//! complete backend messages.

use dataobjects_core::ProtocolError;

use super::messages::{
    BackendMessage, ErrorFields, FieldDescription, TransactionStatus, auth_type, backend_type,
};

/// Largest message body accepted from the server.
const MAX_MESSAGE_LEN: usize = 1 << 30;

/// Incremental decoder for backend messages.
#[derive(Debug, Default)]
pub struct MessageReader {
    buf: Vec<u8>,
    pos: usize,
}

impl MessageReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        if self.pos > 0 && self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    /// Decode the next complete message, or `None` if more bytes are needed.
    pub fn next_message(&mut self) -> Result<Option<BackendMessage>, ProtocolError> {
        let available = &self.buf[self.pos..];
        if available.len() < 5 {
            return Ok(None);
        }

        let type_byte = available[0];
        let len = i32::from_be_bytes([available[1], available[2], available[3], available[4]]);
        let len = usize::try_from(len)
            .ok()
            .filter(|l| (4..=MAX_MESSAGE_LEN).contains(l))
            .ok_or_else(|| protocol_error(format!("invalid message length {len}")))?;

        if available.len() < 1 + len {
            return Ok(None);
        }

        let body = &available[5..=len];
        let msg = parse_message(type_byte, body)?;
        self.pos += 1 + len;
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos > 64 * 1024 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        Ok(Some(msg))
    }
}

fn parse_message(type_byte: u8, body: &[u8]) -> Result<BackendMessage, ProtocolError> {
    let mut c = Cursor::new(body);
    let msg = match type_byte {
        backend_type::AUTHENTICATION => parse_auth(&mut c)?,
        backend_type::BACKEND_KEY_DATA => BackendMessage::BackendKeyData {
            process_id: c.read_i32()?,
            secret_key: c.read_i32()?,
        },
        backend_type::PARAMETER_STATUS => BackendMessage::ParameterStatus {
            name: c.read_cstr()?,
            value: c.read_cstr()?,
        },
        backend_type::READY_FOR_QUERY => {
            let b = c.read_u8()?;
            let status = TransactionStatus::from_byte(b).ok_or_else(|| {
                protocol_error(format!("invalid transaction status 0x{b:02x}"))
            })?;
            BackendMessage::ReadyForQuery(status)
        }
        backend_type::ROW_DESCRIPTION => {
            let count = c.read_count()?;
            let mut fields = Vec::with_capacity(count);
            for _ in 0..count {
                fields.push(FieldDescription {
                    name: c.read_cstr()?,
                    table_oid: c.read_u32()?,
                    column_id: c.read_i16()?,
                    type_oid: c.read_u32()?,
                    type_size: c.read_i16()?,
                    type_modifier: c.read_i32()?,
                    format: c.read_i16()?,
                });
            }
            BackendMessage::RowDescription(fields)
        }
        backend_type::DATA_ROW => {
            let count = c.read_count()?;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let len = c.read_i32()?;
                if len < 0 {
                    values.push(None);
                } else {
                    let len = usize::try_from(len)
                        .map_err(|_| protocol_error("invalid field length"))?;
                    values.push(Some(c.read_bytes(len)?.to_vec()));
                }
            }
            BackendMessage::DataRow(values)
        }
        backend_type::COMMAND_COMPLETE => BackendMessage::CommandComplete(c.read_cstr()?),
        backend_type::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        backend_type::ERROR_RESPONSE => BackendMessage::ErrorResponse(parse_error_fields(&mut c)?),
        backend_type::NOTICE_RESPONSE => {
            BackendMessage::NoticeResponse(parse_error_fields(&mut c)?)
        }
        backend_type::NOTIFICATION_RESPONSE => BackendMessage::NotificationResponse {
            process_id: c.read_i32()?,
            channel: c.read_cstr()?,
            payload: c.read_cstr()?,
        },
        backend_type::COPY_IN_RESPONSE => BackendMessage::CopyInResponse,
        backend_type::COPY_OUT_RESPONSE => BackendMessage::CopyOutResponse,
        backend_type::PARSE_COMPLETE => BackendMessage::ParseComplete,
        backend_type::BIND_COMPLETE => BackendMessage::BindComplete,
        backend_type::CLOSE_COMPLETE => BackendMessage::CloseComplete,
        backend_type::NO_DATA => BackendMessage::NoData,
        backend_type::PARAMETER_DESCRIPTION => {
            let count = c.read_count()?;
            let mut oids = Vec::with_capacity(count);
            for _ in 0..count {
                oids.push(c.read_u32()?);
            }
            BackendMessage::ParameterDescription(oids)
        }
        other => {
            return Err(ProtocolError {
                message: format!("unknown backend message type '{}'", other as char),
                raw_data: Some(body.to_vec()),
                source: None,
            });
        }
    };
    Ok(msg)
}

fn parse_auth(c: &mut Cursor<'_>) -> Result<BackendMessage, ProtocolError> {
    let code = c.read_i32()?;
    let msg = match code {
        auth_type::OK => BackendMessage::AuthenticationOk,
        auth_type::CLEARTEXT_PASSWORD => BackendMessage::AuthenticationCleartextPassword,
        auth_type::MD5_PASSWORD => {
            let salt = c.read_bytes(4)?;
            BackendMessage::AuthenticationMD5Password([salt[0], salt[1], salt[2], salt[3]])
        }
        auth_type::SASL => {
            let mut mechanisms = Vec::new();
            loop {
                let name = c.read_cstr()?;
                if name.is_empty() {
                    break;
                }
                mechanisms.push(name);
            }
            BackendMessage::AuthenticationSASL(mechanisms)
        }
        auth_type::SASL_CONTINUE => BackendMessage::AuthenticationSASLContinue(c.rest().to_vec()),
        auth_type::SASL_FINAL => BackendMessage::AuthenticationSASLFinal(c.rest().to_vec()),
        other => {
            return Err(protocol_error(format!(
                "unsupported authentication request {other}"
            )));
        }
    };
    Ok(msg)
}

fn parse_error_fields(c: &mut Cursor<'_>) -> Result<ErrorFields, ProtocolError> {
    let mut fields = ErrorFields::default();
    loop {
        let tag = c.read_u8()?;
        if tag == 0 {
            break;
        }
        let value = c.read_cstr()?;
        match tag {
            // 'V' is the non-localized severity; prefer it when present
            b'S' if fields.severity.is_empty() => fields.severity = value,
            b'V' => fields.severity = value,
            b'C' => fields.code = value,
            b'M' => fields.message = value,
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            b'P' => fields.position = value.parse().ok(),
            b'W' => fields.where_ = Some(value),
            _ => {}
        }
    }
    Ok(fields)
}

fn protocol_error(message: impl Into<String>) -> ProtocolError {
    ProtocolError {
        message: message.into(),
        raw_data: None,
        source: None,
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| protocol_error("message truncated"))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let b = self.read_bytes(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_count(&mut self) -> Result<usize, ProtocolError> {
        let n = self.read_i16()?;
        usize::try_from(n).map_err(|_| protocol_error(format!("negative count {n}")))
    }

    fn read_cstr(&mut self) -> Result<String, ProtocolError> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| protocol_error("unterminated string"))?;
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }
}
