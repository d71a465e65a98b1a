use std::fmt;

use bytes::{Buf, BufMut};
use tracing::warn;

use crate::error::{EnvelopeError, Result};
use crate::tag::{DataType, Tag};

/// Size of a field header (tag + size), also the size of the envelope header.
pub const FIELD_HEADER_SIZE: usize = 8;

/// Allocation granularity. Buffers grow in whole chunks and never shrink.
pub const CHUNK_SIZE: usize = 512;

/// An owned, growable envelope buffer.
///
/// Built envelopes are always structurally valid. Adopted envelopes (bytes
/// received from a peer) are untrusted until [`Envelope::validate`] accepts
/// them; lookups on an unvalidated buffer never panic, they just stop at the
/// first structural problem.
#[derive(Clone)]
pub struct Envelope {
    buf: Vec<u8>,
    capacity: usize,
}

impl Envelope {
    /// Empty envelope: a RAW header with size 0, one chunk allocated.
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(CHUNK_SIZE);
        buf.put_u32_le(DataType::Raw as u32);
        buf.put_u32_le(0);
        Self {
            buf,
            capacity: CHUNK_SIZE,
        }
    }

    /// Take ownership of received bytes. Nothing is checked here.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let capacity = bytes.len();
        Self {
            buf: bytes,
            capacity,
        }
    }

    /// Build an envelope from owned fields, in order.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a Field>) -> Result<Self> {
        let mut envelope = Self::new();
        for field in fields {
            envelope.append(field)?;
        }
        Ok(envelope)
    }

    /// Replace the storage with received bytes, dropping the previous buffer.
    pub fn adopt(&mut self, bytes: Vec<u8>) {
        *self = Self::from_bytes(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Encoded length in bytes, header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when there are no fields after the header.
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= FIELD_HEADER_SIZE
    }

    /// Allocated size, always a whole number of chunks for built envelopes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size recorded in the header, if there is one.
    pub fn declared_size(&self) -> Option<u32> {
        read_field_header(&self.buf, 0).map(|(_, size)| size)
    }

    pub fn append_uint(&mut self, tag: Tag, value: u32) -> Result<usize> {
        check_type(tag, DataType::UInt)?;
        self.push_field(tag, &[&value.to_le_bytes()])
    }

    /// Append a string field. The stored payload (and the returned length)
    /// includes the terminating NUL.
    pub fn append_string(&mut self, tag: Tag, value: &str) -> Result<usize> {
        check_type(tag, DataType::String)?;
        if value.as_bytes().contains(&0) {
            warn!(%tag, "refusing string value with embedded NUL");
            return Err(EnvelopeError::InteriorNul { tag });
        }
        self.push_field(tag, &[value.as_bytes(), &[0]])
    }

    pub fn append_raw(&mut self, tag: Tag, value: &[u8]) -> Result<usize> {
        check_type(tag, DataType::Raw)?;
        self.push_field(tag, &[value])
    }

    pub fn append(&mut self, field: &Field) -> Result<usize> {
        match &field.value {
            Value::Raw(bytes) => self.append_raw(field.tag, bytes),
            Value::UInt(value) => self.append_uint(field.tag, *value),
            Value::String(value) => self.append_string(field.tag, value),
        }
    }

    /// Copy every field of `other` onto the end of this envelope.
    pub fn extend_from(&mut self, other: &Envelope) -> Result<usize> {
        let mut written = 0;
        for field in other.fields() {
            written += self.push_field(field.tag, &[field.payload])?;
        }
        Ok(written)
    }

    /// Structural check of the whole buffer. Fail-closed: any anomaly
    /// rejects the envelope.
    pub fn validate(&self) -> Result<()> {
        let len = self.buf.len();
        let Some((tag, declared)) = read_field_header(&self.buf, 0) else {
            return Err(EnvelopeError::TooShort { len });
        };

        if Tag::from_raw(tag).type_byte() != DataType::Raw as u8 {
            return Err(EnvelopeError::HeaderType { tag });
        }

        let actual = len - FIELD_HEADER_SIZE;
        if declared as usize != actual {
            return Err(EnvelopeError::HeaderSize { declared, actual });
        }

        let mut offset = FIELD_HEADER_SIZE;
        while offset < len {
            let Some((tag, size)) = read_field_header(&self.buf, offset) else {
                return Err(EnvelopeError::FieldOverrun {
                    tag: 0,
                    offset,
                    size: 0,
                    len,
                });
            };

            match (offset + FIELD_HEADER_SIZE).checked_add(size as usize) {
                Some(end) if end <= len => offset = end,
                _ => {
                    return Err(EnvelopeError::FieldOverrun {
                        tag,
                        offset,
                        size,
                        len,
                    })
                }
            }
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Fields after the header, in order.
    pub fn fields(&self) -> Fields<'_> {
        Fields {
            buf: &self.buf,
            offset: FIELD_HEADER_SIZE,
        }
    }

    /// First field with `tag`, or with a cursor, the first one whose payload
    /// offset is strictly past `cursor`. Chain `FieldRef::offset` through
    /// repeated calls to walk a multi-valued tag.
    pub fn find(&self, tag: Tag, cursor: Option<usize>) -> Option<FieldRef<'_>> {
        self.fields()
            .find(|field| field.tag == tag && cursor.is_none_or(|after| field.offset > after))
    }

    pub fn get_uint(&self, tag: Tag) -> Option<u32> {
        self.next_uint(tag, None).map(|(_, value)| value)
    }

    pub fn get_string(&self, tag: Tag) -> Option<&str> {
        self.next_string(tag, None).map(|(_, value)| value)
    }

    /// Next UInt occurrence after `cursor`, with its payload offset.
    pub fn next_uint(&self, tag: Tag, cursor: Option<usize>) -> Option<(usize, u32)> {
        if check_type(tag, DataType::UInt).is_err() {
            return None;
        }
        let field = self.find(tag, cursor)?;
        field.as_uint().map(|value| (field.offset, value))
    }

    /// Next String occurrence after `cursor`, with its payload offset.
    pub fn next_string(&self, tag: Tag, cursor: Option<usize>) -> Option<(usize, &str)> {
        if check_type(tag, DataType::String).is_err() {
            return None;
        }
        let field = self.find(tag, cursor)?;
        field.as_str().map(|value| (field.offset, value))
    }

    /// Every string stored under `tag`, in insertion order.
    pub fn strings(&self, tag: Tag) -> impl Iterator<Item = &str> + '_ {
        self.fields()
            .filter(move |field| field.tag == tag)
            .filter_map(|field| field.as_str())
    }

    /// Every integer stored under `tag`, in insertion order.
    pub fn uints(&self, tag: Tag) -> impl Iterator<Item = u32> + '_ {
        self.fields()
            .filter(move |field| field.tag == tag)
            .filter_map(|field| field.as_uint())
    }

    /// Decode every field into owned values.
    pub fn to_fields(&self) -> Result<Vec<Field>> {
        self.fields().map(|field| field.to_field()).collect()
    }

    fn push_field(&mut self, tag: Tag, parts: &[&[u8]]) -> Result<usize> {
        let Some(declared) = self.declared_size() else {
            return Err(EnvelopeError::MissingHeader);
        };

        let len: usize = parts.iter().map(|part| part.len()).sum();
        let too_large = || EnvelopeError::PayloadTooLarge { tag, size: len };
        let size = u32::try_from(len).map_err(|_| too_large())?;
        let declared = declared
            .checked_add(size)
            .and_then(|total| total.checked_add(FIELD_HEADER_SIZE as u32))
            .ok_or_else(too_large)?;

        self.grow(self.buf.len() + FIELD_HEADER_SIZE + len)?;

        self.buf.put_u32_le(tag.raw());
        self.buf.put_u32_le(size);
        for part in parts {
            self.buf.put_slice(part);
        }
        self.buf[4..FIELD_HEADER_SIZE].copy_from_slice(&declared.to_le_bytes());

        Ok(len)
    }

    fn grow(&mut self, needed: usize) -> Result<()> {
        if needed <= self.capacity {
            return Ok(());
        }

        let chunks = (needed - self.capacity).div_ceil(CHUNK_SIZE);
        let target = self.capacity + chunks * CHUNK_SIZE;
        self.buf
            .try_reserve_exact(target - self.buf.len())
            .map_err(|err| {
                warn!(needed, target, error = %err, "envelope allocation failed");
                EnvelopeError::Alloc(err)
            })?;
        self.capacity = target;
        Ok(())
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf
    }
}

impl Eq for Envelope {}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("len", &self.buf.len())
            .field("declared", &self.declared_size())
            .field(
                "fields",
                &self.fields().map(|field| field.tag).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn check_type(tag: Tag, expected: DataType) -> Result<()> {
    if tag.is(expected) {
        return Ok(());
    }
    warn!(%tag, %expected, "envelope tag used with the wrong type");
    Err(EnvelopeError::TypeMismatch { tag, expected })
}

fn read_field_header(buf: &[u8], offset: usize) -> Option<(u32, u32)> {
    let mut header = buf.get(offset..offset.checked_add(FIELD_HEADER_SIZE)?)?;
    Some((header.get_u32_le(), header.get_u32_le()))
}

/// Borrowed view of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef<'a> {
    pub tag: Tag,
    /// Offset of the payload within the envelope buffer.
    pub offset: usize,
    pub payload: &'a [u8],
}

impl<'a> FieldRef<'a> {
    pub fn as_uint(&self) -> Option<u32> {
        if !self.tag.is(DataType::UInt) {
            return None;
        }
        let mut payload: &[u8] = self.payload;
        if payload.len() != 4 {
            return None;
        }
        Some(payload.get_u32_le())
    }

    /// String payload up to its NUL terminator. `None` for unterminated or
    /// non-UTF-8 payloads.
    pub fn as_str(&self) -> Option<&'a str> {
        if !self.tag.is(DataType::String) {
            return None;
        }
        let nul = self.payload.iter().position(|b| *b == 0)?;
        std::str::from_utf8(&self.payload[..nul]).ok()
    }

    /// Decode into an owned field. Unknown type bytes decode as raw.
    pub fn to_field(&self) -> Result<Field> {
        let value = match self.tag.data_type() {
            Some(DataType::UInt) => Value::UInt(self.as_uint().ok_or(
                EnvelopeError::MalformedPayload {
                    tag: self.tag,
                    expected: DataType::UInt,
                },
            )?),
            Some(DataType::String) => Value::String(
                self.as_str()
                    .ok_or(EnvelopeError::MalformedPayload {
                        tag: self.tag,
                        expected: DataType::String,
                    })?
                    .to_string(),
            ),
            Some(DataType::Raw) | None => Value::Raw(self.payload.to_vec()),
        };
        Ok(Field {
            tag: self.tag,
            value,
        })
    }
}

/// Iterator over the fields of an envelope. Stops at the first field that
/// would run past the end of the buffer.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Fields<'a> {
    type Item = FieldRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (tag, size) = read_field_header(self.buf, self.offset)?;
        let start = self.offset + FIELD_HEADER_SIZE;
        let end = start.checked_add(size as usize)?;
        let payload = self.buf.get(start..end)?;
        self.offset = end;
        Some(FieldRef {
            tag: Tag::from_raw(tag),
            offset: start,
            payload,
        })
    }
}

/// Owned field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Raw(Vec<u8>),
    UInt(u32),
    String(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Raw(_) => DataType::Raw,
            Value::UInt(_) => DataType::UInt,
            Value::String(_) => DataType::String,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Raw(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::UInt(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
        }
    }
}

/// Owned field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: Tag,
    pub value: Value,
}

impl Field {
    pub fn uint(tag: Tag, value: u32) -> Self {
        Self {
            tag,
            value: Value::UInt(value),
        }
    }

    pub fn string(tag: Tag, value: impl Into<String>) -> Self {
        Self {
            tag,
            value: Value::String(value.into()),
        }
    }

    pub fn raw(tag: Tag, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            value: Value::Raw(value.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::*;

    fn header(tag: u32, size: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u32_le(tag);
        buf.put_u32_le(size);
        buf
    }

    #[test]
    fn new_envelope_is_header_only() {
        let env = Envelope::new();
        assert_eq!(env.as_bytes(), &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(env.capacity(), CHUNK_SIZE);
        assert!(env.is_empty());
        assert!(env.is_valid());
    }

    #[test]
    fn append_uint_updates_header() {
        let mut env = Envelope::new();
        assert_eq!(env.append_uint(MB_REQUEST, 5).unwrap(), 4);
        assert_eq!(env.len(), 16);
        assert_eq!(env.declared_size(), Some(12));
        assert_eq!(&env.as_bytes()[8..], &[0x02, 0x02, 0, 0, 4, 0, 0, 0, 5, 0, 0, 0]);
        assert!(env.is_valid());
    }

    #[test]
    fn append_string_includes_terminator() {
        let mut env = Envelope::new();
        assert_eq!(env.append_string(MB_APN, "internet").unwrap(), 9);

        let field = env.find(MB_APN, None).unwrap();
        assert_eq!(field.payload, b"internet\0");
        assert_eq!(env.declared_size(), Some(8 + 9));
        assert_eq!(env.get_string(MB_APN), Some("internet"));
    }

    #[test]
    fn empty_string_is_just_the_terminator() {
        let mut env = Envelope::new();
        assert_eq!(env.append_string(MB_USERNAME, "").unwrap(), 1);
        assert_eq!(env.get_string(MB_USERNAME), Some(""));
    }

    #[test]
    fn type_mismatch_leaves_buffer_untouched() {
        let mut env = Envelope::new();
        env.append_string(MB_APN, "apn").unwrap();
        let before = env.as_bytes().to_vec();

        let err = env.append_uint(MB_APN, 7).unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::TypeMismatch {
                expected: DataType::UInt,
                ..
            }
        ));
        assert!(env.append_string(MB_REQUEST, "x").is_err());
        assert_eq!(env.get_uint(MB_APN), None);
        assert_eq!(env.as_bytes(), before.as_slice());
        assert!(env.is_valid());
    }

    #[test]
    fn interior_nul_rejected() {
        let mut env = Envelope::new();
        let err = env.append_string(MB_PIN_CODE, "12\034").unwrap_err();
        assert!(matches!(err, EnvelopeError::InteriorNul { .. }));
        assert!(env.is_empty());
    }

    #[test]
    fn growth_rounds_to_chunks_and_never_shrinks() {
        let mut env = Envelope::new();
        env.append_raw(Tag::new(200, DataType::Raw), &[0xAA; 600])
            .unwrap();
        assert_eq!(env.len(), 8 + 8 + 600);
        assert_eq!(env.capacity(), 2 * CHUNK_SIZE);

        env.append_uint(MB_SESSION_TID, 1).unwrap();
        assert_eq!(env.capacity(), 2 * CHUNK_SIZE);

        env.append_raw(Tag::new(201, DataType::Raw), &[0xBB; 1500])
            .unwrap();
        assert_eq!(env.capacity() % CHUNK_SIZE, 0);
        assert!(env.capacity() >= env.len());
        assert!(env.is_valid());
    }

    #[test]
    fn validate_rejects_empty_buffer() {
        let env = Envelope::from_bytes(Vec::new());
        assert!(matches!(
            env.validate(),
            Err(EnvelopeError::TooShort { len: 0 })
        ));
        assert!(!env.is_valid());
    }

    #[test]
    fn validate_rejects_short_buffer() {
        let env = Envelope::from_bytes(vec![1, 0, 0]);
        assert!(!env.is_valid());
    }

    #[test]
    fn validate_rejects_header_size_mismatch() {
        let mut env = Envelope::new();
        env.append_uint(MB_REQUEST, 0).unwrap();
        let mut bytes = env.into_bytes();
        bytes[4] = 99;

        let env = Envelope::from_bytes(bytes);
        assert!(matches!(
            env.validate(),
            Err(EnvelopeError::HeaderSize {
                declared: 99,
                actual: 12
            })
        ));
    }

    #[test]
    fn validate_rejects_trailing_garbage() {
        let mut env = Envelope::new();
        env.append_uint(MB_REQUEST, 0).unwrap();
        let mut bytes = env.into_bytes();
        bytes.push(0);

        assert!(!Envelope::from_bytes(bytes).is_valid());
    }

    #[test]
    fn validate_rejects_non_raw_header() {
        let env = Envelope::from_bytes(header(MB_REQUEST.raw(), 0));
        assert!(matches!(
            env.validate(),
            Err(EnvelopeError::HeaderType { .. })
        ));
    }

    #[test]
    fn validate_rejects_field_overrun() {
        let mut bytes = header(1, 12);
        bytes.put_u32_le(MB_REQUEST.raw());
        bytes.put_u32_le(400);
        bytes.put_u32_le(0);

        let env = Envelope::from_bytes(bytes);
        assert!(matches!(
            env.validate(),
            Err(EnvelopeError::FieldOverrun {
                offset: 8,
                size: 400,
                ..
            })
        ));
        assert!(env.find(MB_REQUEST, None).is_none());
    }

    #[test]
    fn validate_rejects_truncated_field_header() {
        let mut bytes = header(1, 4);
        bytes.put_u32_le(MB_REQUEST.raw());

        assert!(!Envelope::from_bytes(bytes).is_valid());
    }

    #[test]
    fn validate_rejects_huge_declared_field_size() {
        let mut bytes = header(1, 8);
        bytes.put_u32_le(MB_APN.raw());
        bytes.put_u32_le(u32::MAX);

        assert!(!Envelope::from_bytes(bytes).is_valid());
    }

    #[test]
    fn cursor_walks_repeated_tags_in_order() {
        let mut env = Envelope::new();
        env.append_string(MB_IPV4_ADDR, "10.0.0.1/24").unwrap();
        env.append_uint(MB_IPV4_NB, 3).unwrap();
        env.append_string(MB_IPV4_ADDR, "10.0.0.2/24").unwrap();
        env.append_string(MB_IPV4_ADDR, "10.0.0.3/24").unwrap();

        let (first, a) = env.next_string(MB_IPV4_ADDR, None).unwrap();
        let (second, b) = env.next_string(MB_IPV4_ADDR, Some(first)).unwrap();
        let (third, c) = env.next_string(MB_IPV4_ADDR, Some(second)).unwrap();

        assert_eq!((a, b, c), ("10.0.0.1/24", "10.0.0.2/24", "10.0.0.3/24"));
        assert!(first < second && second < third);
        assert!(env.next_string(MB_IPV4_ADDR, Some(third)).is_none());

        let all: Vec<&str> = env.strings(MB_IPV4_ADDR).collect();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn find_skips_the_header() {
        let env = Envelope::new();
        assert!(env.find(Tag::from_raw(1), None).is_none());
    }

    #[test]
    fn missing_field_is_not_found() {
        let mut env = Envelope::new();
        env.append_uint(MB_REQUEST, 1).unwrap();
        assert_eq!(env.get_uint(MB_PROTOCOL), None);
        assert_eq!(env.get_string(MB_ERROR), None);
    }

    #[test]
    fn unterminated_string_reads_as_missing() {
        let mut bytes = header(1, 11);
        bytes.put_u32_le(MB_APN.raw());
        bytes.put_u32_le(3);
        bytes.put_slice(b"abc");

        let env = Envelope::from_bytes(bytes);
        assert!(env.is_valid());
        assert_eq!(env.get_string(MB_APN), None);
        assert!(env.to_fields().is_err());
    }

    #[test]
    fn short_uint_payload_reads_as_missing() {
        let mut bytes = header(1, 10);
        bytes.put_u32_le(MB_REQUEST.raw());
        bytes.put_u32_le(2);
        bytes.put_u16_le(1);

        let env = Envelope::from_bytes(bytes);
        assert!(env.is_valid());
        assert_eq!(env.get_uint(MB_REQUEST), None);
    }

    #[test]
    fn fields_survive_a_byte_level_round_trip() {
        let fields = vec![
            Field::uint(MB_RESPONSE, 0),
            Field::string(MB_DEVICE, "/dev/cdc-wdm0"),
            Field::string(MB_IPV6_ADDR, "fe80::1/64"),
            Field::raw(Tag::new(300, DataType::Raw), vec![1, 2, 3]),
            Field::string(MB_IPV6_ADDR, "2001:db8::1/64"),
            Field::uint(MB_IPV6_NB, 2),
        ];

        let built = Envelope::from_fields(&fields).unwrap();
        let received = Envelope::from_bytes(built.as_bytes().to_vec());

        assert!(received.is_valid());
        assert_eq!(received.to_fields().unwrap(), fields);
        assert_eq!(received, built);
    }

    #[test]
    fn extend_from_copies_fields_in_order() {
        let mut staging = Envelope::new();
        staging.append_uint(MB_PIN_STATUS, 0).unwrap();
        staging.append_string(MB_SUB_TEL_NUM, "+100").unwrap();

        let mut response = Envelope::new();
        response.append_string(MB_DEVICE, "/dev/cdc-wdm0").unwrap();
        response.extend_from(&staging).unwrap();

        let tags: Vec<Tag> = response.fields().map(|f| f.tag).collect();
        assert_eq!(tags, vec![MB_DEVICE, MB_PIN_STATUS, MB_SUB_TEL_NUM]);
        assert!(response.is_valid());
    }

    #[test]
    fn adopt_replaces_without_validating() {
        let mut env = Envelope::new();
        env.append_uint(MB_REQUEST, 0).unwrap();

        env.adopt(vec![0xFF; 3]);
        assert_eq!(env.len(), 3);
        assert!(!env.is_valid());
        assert_eq!(env.fields().count(), 0);
    }

    #[test]
    fn append_to_headerless_buffer_fails() {
        let mut env = Envelope::from_bytes(Vec::new());
        assert!(matches!(
            env.append_uint(MB_REQUEST, 1),
            Err(EnvelopeError::MissingHeader)
        ));
    }
}
