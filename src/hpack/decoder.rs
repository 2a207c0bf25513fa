use super::header::BytesStr;
use super::{huffman, table, Header};

use bytes::{Buf, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};

use std::cmp;
use std::fmt;
use std::io::Cursor;

/// Decodes headers using HPACK
#[derive(Debug)]
pub struct Decoder {
    /// The maximum size the peer may resize the dynamic table to, bounded by
    /// our HEADER_TABLE_SIZE setting.
    max_size_allowed: usize,

    /// The dynamic table
    table: table::Table,

    /// Scratch buffer for Huffman decoding
    buffer: BytesMut,
}

/// Represents all errors that can be encountered while performing the
/// decoding of an HPACK header set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecoderError {
    InvalidIntegerPrefix,
    InvalidTableIndex,
    InvalidHuffmanCode,
    InvalidUtf8,
    InvalidStatusCode,
    InvalidMethod,
    InvalidPseudoheader,
    InvalidHeaderName,
    InvalidHeaderValue,
    InvalidMaxDynamicSize,
    InvalidTableSizeUpdate,
    IntegerOverflow,
    HeaderListTooLarge,
    NeedMore(NeedMore),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NeedMore {
    UnexpectedEndOfStream,
    IntegerUnderflow,
    StringUnderflow,
}

enum Representation {
    /// Indexed header field representation
    ///
    /// An indexed header field representation identifies an entry in either
    /// the static table or the dynamic table (see Section 2.3).
    Indexed,

    /// Literal Header Field with Incremental Indexing
    ///
    /// A literal header field with incremental indexing representation
    /// results in appending a header field to the decoded header list and
    /// inserting it as a new entry into the dynamic table.
    LiteralWithIndexing,

    /// Literal Header Field without Indexing
    ///
    /// A literal header field without indexing representation results in
    /// appending a header field to the decoded header list without altering
    /// the dynamic table.
    LiteralWithoutIndexing,

    /// Literal Header Field Never Indexed
    ///
    /// A literal header field never-indexed representation results in
    /// appending a header field to the decoded header list without altering
    /// the dynamic table. Intermediaries MUST use the same representation
    /// for encoding this header field.
    LiteralNeverIndexed,

    /// Dynamic Table Size Update
    ///
    /// A dynamic table size update signals a change to the size of the
    /// dynamic table.
    SizeUpdate,
}

impl Representation {
    fn load(byte: u8) -> Result<Representation, DecoderError> {
        const INDEXED: u8 = 0b1000_0000;
        const LITERAL_WITH_INDEXING: u8 = 0b0100_0000;
        const SIZE_UPDATE_MASK: u8 = 0b1110_0000;
        const SIZE_UPDATE: u8 = 0b0010_0000;
        const LITERAL_NEVER_INDEXED_MASK: u8 = 0b1111_0000;
        const LITERAL_NEVER_INDEXED: u8 = 0b0001_0000;

        if byte & INDEXED == INDEXED {
            Ok(Representation::Indexed)
        } else if byte & LITERAL_WITH_INDEXING == LITERAL_WITH_INDEXING {
            Ok(Representation::LiteralWithIndexing)
        } else if byte & SIZE_UPDATE_MASK == SIZE_UPDATE {
            Ok(Representation::SizeUpdate)
        } else if byte & LITERAL_NEVER_INDEXED_MASK == LITERAL_NEVER_INDEXED {
            Ok(Representation::LiteralNeverIndexed)
        } else {
            Ok(Representation::LiteralWithoutIndexing)
        }
    }
}

// ===== impl Decoder =====

impl Decoder {
    /// Creates a new `Decoder` with all settings set to default values.
    pub fn new(size: usize) -> Decoder {
        Decoder {
            max_size_allowed: size,
            table: table::Table::new(size),
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Queues a potential size update
    ///
    /// A shrink is applied immediately (evicting as needed); a growth only
    /// raises the bound the peer may resize up to.
    pub fn set_max_table_size(&mut self, size: usize) {
        self.max_size_allowed = size;
        if size < self.table.max_size() {
            self.table.set_max_size(size);
        }
    }

    /// Decodes the headers found in the given buffer.
    ///
    /// `f` is called once per decoded header, in order; it may fail the
    /// decode, which is how the frame layer enforces its header-list size
    /// budget.
    pub fn decode<F>(
        &mut self,
        src: &mut Cursor<&[u8]>,
        mut f: F,
    ) -> Result<(), DecoderError>
    where
        F: FnMut(Header) -> Result<(), DecoderError>,
    {
        use self::Representation::*;

        let mut can_resize = true;

        while src.has_remaining() {
            // At this point we are always at the beginning of the next block
            // within the HPACK data. The type of the block can always be
            // determined from the first byte.
            match Representation::load(peek_u8(src)?)? {
                Indexed => {
                    can_resize = false;
                    let entry = self.decode_indexed(src)?;
                    f(entry)?;
                }
                LiteralWithIndexing => {
                    can_resize = false;
                    let entry = self.decode_literal(src, true)?;

                    // Insert the header into the table
                    self.table.insert(entry.clone());

                    f(entry)?;
                }
                LiteralWithoutIndexing => {
                    can_resize = false;
                    let entry = self.decode_literal(src, false)?;
                    f(entry)?;
                }
                LiteralNeverIndexed => {
                    can_resize = false;
                    let mut entry = self.decode_literal(src, false)?;

                    if let Header::Field { ref mut value, .. } = entry {
                        value.set_sensitive(true);
                    }

                    f(entry)?;
                }
                SizeUpdate => {
                    // A dynamic table size update must occur at the
                    // beginning of the first header block following a
                    // change; it may not follow any header representation.
                    if !can_resize {
                        return Err(DecoderError::InvalidTableSizeUpdate);
                    }

                    self.process_size_update(src)?;
                }
            }
        }

        Ok(())
    }

    fn process_size_update(&mut self, buf: &mut Cursor<&[u8]>) -> Result<(), DecoderError> {
        let new_size = decode_int(buf, 5)?;

        if new_size > self.max_size_allowed {
            return Err(DecoderError::InvalidMaxDynamicSize);
        }

        tracing::debug!(
            "hpack table size update; from={} to={}",
            self.table.max_size(),
            new_size
        );

        self.table.set_max_size(new_size);

        Ok(())
    }

    fn decode_indexed(&mut self, buf: &mut Cursor<&[u8]>) -> Result<Header, DecoderError> {
        let index = decode_int(buf, 7)?;
        self.get_indexed(index)
    }

    fn decode_literal(
        &mut self,
        buf: &mut Cursor<&[u8]>,
        index: bool,
    ) -> Result<Header, DecoderError> {
        let prefix = if index { 6 } else { 4 };

        // Extract the table index for the name, or 0 if not indexed
        let table_idx = decode_int(buf, prefix)?;

        if table_idx == 0 {
            // Read the name as a literal
            let name = self.decode_string(buf)?;
            let value = self.decode_string(buf)?;

            Header::new(name, value)
        } else {
            let name_source = self.get_indexed(table_idx)?;
            let value = self.decode_string(buf)?;

            header_with_value(name_source, value)
        }
    }

    fn get_indexed(&self, index: usize) -> Result<Header, DecoderError> {
        // Index 0 is not used; RFC 7541 § 6.1 calls it a decoding error.
        if index == 0 {
            return Err(DecoderError::InvalidTableIndex);
        }

        if index < table::DYN_OFFSET {
            table::static_header(index)
        } else {
            self.table.get(index - table::DYN_OFFSET)
        }
    }

    fn decode_string(&mut self, buf: &mut Cursor<&[u8]>) -> Result<Bytes, DecoderError> {
        const HUFF_FLAG: u8 = 0b1000_0000;

        // The first byte in the string's header carries the huffman flag.
        let huff = peek_u8(buf)? & HUFF_FLAG == HUFF_FLAG;

        // Decode the string length using 7 bit prefix
        let len = decode_int(buf, 7)?;

        if len > buf.remaining() {
            tracing::trace!("hpack decode error; string underflow");
            return Err(DecoderError::NeedMore(NeedMore::StringUnderflow));
        }

        let pos = buf.position() as usize;
        let raw = &buf.get_ref()[pos..pos + len];
        buf.set_position((pos + len) as u64);

        if huff {
            self.buffer.clear();
            huffman::decode(raw, &mut self.buffer)?;
            Ok(self.buffer.split().freeze())
        } else {
            Ok(Bytes::copy_from_slice(raw))
        }
    }
}

impl Default for Decoder {
    fn default() -> Decoder {
        Decoder::new(4096)
    }
}

/// Re-pair an indexed name with a literal value.
fn header_with_value(name_source: Header, value: Bytes) -> Result<Header, DecoderError> {
    match name_source {
        Header::Field { name, .. } => {
            let value =
                HeaderValue::from_maybe_shared(value).map_err(|_| DecoderError::InvalidHeaderValue)?;
            Ok(Header::Field { name, value })
        }
        Header::Authority(_) => Ok(Header::Authority(BytesStr::try_from(value)?)),
        Header::Method(_) => {
            let method = Method::from_bytes(&value).map_err(|_| DecoderError::InvalidMethod)?;
            Ok(Header::Method(method))
        }
        Header::Scheme(_) => Ok(Header::Scheme(BytesStr::try_from(value)?)),
        Header::Path(_) => Ok(Header::Path(BytesStr::try_from(value)?)),
        Header::Status(_) => {
            let status =
                StatusCode::from_bytes(&value).map_err(|_| DecoderError::InvalidStatusCode)?;
            Ok(Header::Status(status))
        }
    }
}

fn peek_u8(buf: &Cursor<&[u8]>) -> Result<u8, DecoderError> {
    let pos = buf.position() as usize;
    buf.get_ref()
        .get(pos)
        .copied()
        .ok_or(DecoderError::NeedMore(NeedMore::UnexpectedEndOfStream))
}

/// Decode an HPACK variable length integer with a prefix of `prefix_size`
/// bits.
pub fn decode_int(buf: &mut Cursor<&[u8]>, prefix_size: u8) -> Result<usize, DecoderError> {
    // The octet limit is chosen such that the maximum allowed *value* can
    // never overflow an unsigned 32-bit integer. The maximum value of any
    // integer that can be encoded with 5 octets is ~2^28
    const MAX_BYTES: usize = 5;
    const VARINT_FLAG: usize = 0b0111_1111;

    if prefix_size < 1 || prefix_size > 8 {
        return Err(DecoderError::InvalidIntegerPrefix);
    }

    if !buf.has_remaining() {
        return Err(DecoderError::NeedMore(NeedMore::IntegerUnderflow));
    }

    let mask = if prefix_size == 8 {
        0xFF
    } else {
        (1u16 << prefix_size).wrapping_sub(1) as u8
    };

    let mut ret = (get_u8(buf)? & mask) as usize;

    if ret < mask as usize {
        // Value fits in the prefix bits
        return Ok(ret);
    }

    // The int did not fit in the prefix bits, so continue reading.
    //
    // The total number of bytes used to represent the int. The first byte was
    // the prefix, so start at 1.
    let mut bytes = 1;

    // The rest of the int is stored as a varint -- 7 bits for the value and 1
    // bit to indicate if it is the last byte.
    let mut shift = 0;

    while buf.has_remaining() {
        let b = get_u8(buf)? as usize;

        bytes += 1;
        ret += (b & VARINT_FLAG) << shift;
        shift += 7;

        if b & 0b1000_0000 == 0 {
            return Ok(ret);
        }

        if bytes == MAX_BYTES {
            // RFC 7541 requires this situation to be treated as an error.
            return Err(DecoderError::IntegerOverflow);
        }
    }

    Err(DecoderError::NeedMore(NeedMore::IntegerUnderflow))
}

fn get_u8(buf: &mut Cursor<&[u8]>) -> Result<u8, DecoderError> {
    if buf.has_remaining() {
        Ok(buf.get_u8())
    } else {
        Err(DecoderError::NeedMore(NeedMore::UnexpectedEndOfStream))
    }
}

impl From<DecoderError> for crate::frame::Error {
    fn from(src: DecoderError) -> Self {
        crate::frame::Error::Hpack(src)
    }
}

impl fmt::Display for DecoderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::DecoderError::*;

        match *self {
            InvalidIntegerPrefix => write!(f, "invalid integer prefix"),
            InvalidTableIndex => write!(f, "invalid table index"),
            InvalidHuffmanCode => write!(f, "invalid huffman code"),
            InvalidUtf8 => write!(f, "invalid utf-8"),
            InvalidStatusCode => write!(f, "invalid status code"),
            InvalidMethod => write!(f, "invalid method"),
            InvalidPseudoheader => write!(f, "invalid pseudo-header"),
            InvalidHeaderName => write!(f, "invalid header name"),
            InvalidHeaderValue => write!(f, "invalid header value"),
            InvalidMaxDynamicSize => write!(f, "dynamic table size update exceeds bound"),
            InvalidTableSizeUpdate => write!(f, "misplaced dynamic table size update"),
            IntegerOverflow => write!(f, "integer overflow"),
            HeaderListTooLarge => write!(f, "header list exceeds size limit"),
            NeedMore(_) => write!(f, "truncated header block"),
        }
    }
}

impl std::error::Error for DecoderError {}
