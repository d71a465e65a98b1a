use std::fmt;

/// Primitive payload type carried in a tag's low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Raw = 1,
    UInt = 2,
    String = 3,
}

impl DataType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(DataType::Raw),
            2 => Some(DataType::UInt),
            3 => Some(DataType::String),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Raw => "raw",
            DataType::UInt => "uint",
            DataType::String => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 32-bit field tag: `(id << 8) | type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u32);

impl Tag {
    /// Build a tag from a semantic id (24 bits) and a payload type.
    pub const fn new(id: u32, data_type: DataType) -> Self {
        Self(((id & 0x00ff_ffff) << 8) | data_type as u32)
    }

    /// Wrap a raw tag as read from the wire.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn id(self) -> u32 {
        self.0 >> 8
    }

    pub const fn type_byte(self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// Decoded payload type, `None` when the type byte is not recognised.
    pub fn data_type(self) -> Option<DataType> {
        DataType::from_u8(self.type_byte())
    }

    pub fn is(self, data_type: DataType) -> bool {
        self.type_byte() == data_type as u8
    }

    /// Well-known name from the mbgate vocabulary.
    pub fn name(self) -> Option<&'static str> {
        crate::tags::name(self)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl From<Tag> for u32 {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_layout() {
        let tag = Tag::new(5, DataType::String);
        assert_eq!(tag.raw(), (5 << 8) | 3);
        assert_eq!(tag.id(), 5);
        assert_eq!(tag.data_type(), Some(DataType::String));
        assert!(tag.is(DataType::String));
        assert!(!tag.is(DataType::UInt));
    }

    #[test]
    fn unknown_type_byte() {
        let tag = Tag::from_raw(0x0000_0107);
        assert_eq!(tag.data_type(), None);
        assert_eq!(tag.to_string(), "0x00000107");
    }

    #[test]
    fn known_tag_displays_name() {
        assert_eq!(crate::tags::MB_APN.to_string(), "MB_APN");
    }
}
