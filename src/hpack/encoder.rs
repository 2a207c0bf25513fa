use super::table::{EncoderTable, Index};
use super::{huffman, Header};

use bytes::{BufMut, BytesMut};

/// Encodes headers using HPACK
#[derive(Debug)]
pub struct Encoder {
    table: EncoderTable,
    size_update: Option<SizeUpdate>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SizeUpdate {
    One(usize),
    /// Both a shrink and a subsequent grow must be conveyed in order.
    Two(usize, usize),
}

impl Encoder {
    pub fn new(max_size: usize) -> Encoder {
        Encoder {
            table: EncoderTable::new(max_size),
            size_update: None,
        }
    }

    /// Queues a max size update.
    ///
    /// The next call to `encode` will include a dynamic size update frame.
    pub fn update_max_size(&mut self, val: usize) {
        match self.size_update {
            Some(SizeUpdate::One(old)) => {
                if val == old {
                    return;
                }
                if val > old {
                    self.size_update = Some(SizeUpdate::Two(old, val));
                } else {
                    self.size_update = Some(SizeUpdate::One(val));
                }
            }
            Some(SizeUpdate::Two(min, _)) => {
                if val < min {
                    self.size_update = Some(SizeUpdate::One(val));
                } else {
                    self.size_update = Some(SizeUpdate::Two(min, val));
                }
            }
            None => {
                if val != self.table.max_size() {
                    // Don't bother writing a frame if the size already matches
                    self.size_update = Some(SizeUpdate::One(val));
                }
            }
        }
    }

    /// Encode a header list into `dst`.
    pub fn encode<I>(&mut self, headers: I, dst: &mut BytesMut)
    where
        I: IntoIterator<Item = Header>,
    {
        if let Some(update) = self.size_update.take() {
            match update {
                SizeUpdate::One(val) => {
                    self.table.set_max_size(val);
                    encode_size_update(val, dst);
                }
                SizeUpdate::Two(min, max) => {
                    self.table.set_max_size(min);
                    self.table.set_max_size(max);
                    encode_size_update(min, dst);
                    encode_size_update(max, dst);
                }
            }
        }

        for header in headers {
            self.encode_header(header, dst);
        }
    }

    fn encode_header(&mut self, header: Header, dst: &mut BytesMut) {
        if header.is_sensitive() {
            // Sensitive fields are sent literal-never-indexed so that no
            // intermediary stores them in a compression context.
            let name_index = match self.table.find(&header) {
                Index::Indexed(i) | Index::Name(i) => Some(i),
                Index::NotIndexed => None,
            };
            encode_literal(&header, name_index, 0b0001_0000, 4, dst);
            return;
        }

        match self.table.find(&header) {
            Index::Indexed(i) => {
                encode_int(i, 7, 0b1000_0000, dst);
            }
            Index::Name(i) => {
                self.table.insert(header.clone());
                encode_literal(&header, Some(i), 0b0100_0000, 6, dst);
            }
            Index::NotIndexed => {
                self.table.insert(header.clone());
                encode_literal(&header, None, 0b0100_0000, 6, dst);
            }
        }
    }
}

impl Default for Encoder {
    fn default() -> Encoder {
        Encoder::new(4096)
    }
}

fn encode_literal(
    header: &Header,
    name_index: Option<usize>,
    opcode: u8,
    prefix_bits: u8,
    dst: &mut BytesMut,
) {
    match name_index {
        Some(i) => encode_int(i, prefix_bits, opcode, dst),
        None => {
            dst.put_u8(opcode);
            encode_str(header.name().as_slice(), dst);
        }
    }

    encode_str(header.value_slice(), dst);
}

fn encode_size_update(val: usize, dst: &mut BytesMut) {
    encode_int(val, 5, 0b0010_0000, dst)
}

/// Encode a string literal, Huffman-coding it when the heuristic says the
/// coding pays off.
fn encode_str(val: &[u8], dst: &mut BytesMut) {
    if should_huffman(val) {
        let len = huffman::encoded_len(val);

        if len < val.len() {
            encode_int(len, 7, 0b1000_0000, dst);
            huffman::encode(val, dst);
            return;
        }
    }

    encode_int(val.len(), 7, 0, dst);
    dst.put_slice(val);
}

/// Decide whether Huffman coding is worth attempting.
///
/// Short strings barely compress and base64-looking material (tokens,
/// signatures, session blobs) usually expands, so both are sent raw. This
/// is purely an optimization; either choice decodes identically.
fn should_huffman(val: &[u8]) -> bool {
    const MIN_HUFFMAN_LEN: usize = 8;

    if val.len() < MIN_HUFFMAN_LEN {
        return false;
    }

    let mut base64ish = 0usize;
    let mut seen = [false; 256];
    let mut distinct = 0usize;

    for &b in val {
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' | b'=') {
            base64ish += 1;
        }
        if !seen[b as usize] {
            seen[b as usize] = true;
            distinct += 1;
        }
    }

    let high_entropy = distinct * 2 > val.len().min(64);
    let looks_base64 = base64ish * 10 >= val.len() * 9;

    !(looks_base64 && high_entropy)
}

/// Encode an integer into the given destination buffer using the HPACK
/// variable length encoding with the given prefix size.
fn encode_int(mut value: usize, prefix_bits: u8, first_byte: u8, dst: &mut BytesMut) {
    let limit = (1usize << prefix_bits) - 1;

    if value < limit {
        dst.put_u8(first_byte | value as u8);
        return;
    }

    dst.put_u8(first_byte | limit as u8);
    value -= limit;

    while value >= 128 {
        dst.put_u8(0b1000_0000 | (value as u8 & 0b0111_1111));
        value >>= 7;
    }

    dst.put_u8(value as u8);
}

#[cfg(test)]
mod tests {
    use super::super::{Decoder, DecoderError};
    use super::*;
    use bytes::Bytes;
    use std::io::Cursor;

    fn field(name: &str, value: &str) -> Header {
        Header::new(
            Bytes::copy_from_slice(name.as_bytes()),
            Bytes::copy_from_slice(value.as_bytes()),
        )
        .unwrap()
    }

    fn decode_all(decoder: &mut Decoder, src: &[u8]) -> Result<Vec<Header>, DecoderError> {
        let mut cursor = Cursor::new(src);
        let mut headers = vec![];
        decoder.decode(&mut cursor, |h| {
            headers.push(h);
            Ok(())
        })?;
        Ok(headers)
    }

    #[test]
    fn encode_int_fixtures() {
        let mut dst = BytesMut::new();
        encode_int(10, 5, 0, &mut dst);
        assert_eq!(&dst[..], &[0b01010]);

        let mut dst = BytesMut::new();
        encode_int(1337, 5, 0, &mut dst);
        assert_eq!(&dst[..], &[0b11111, 0b10011010, 0b00001010]);

        let mut dst = BytesMut::new();
        encode_int(42, 8, 0, &mut dst);
        assert_eq!(&dst[..], &[42]);
    }

    #[test]
    fn static_full_match_is_a_single_byte() {
        let mut encoder = Encoder::default();
        let mut dst = BytesMut::new();
        encoder.encode(vec![Header::Method(http::Method::GET)], &mut dst);
        assert_eq!(&dst[..], &[0x82]);
    }

    #[test]
    fn second_occurrence_hits_the_dynamic_table() {
        let mut encoder = Encoder::default();

        let mut first = BytesMut::new();
        encoder.encode(vec![field("x-trace-id", "abc")], &mut first);

        let mut second = BytesMut::new();
        encoder.encode(vec![field("x-trace-id", "abc")], &mut second);

        // Newest dynamic entry sits at index 62.
        assert_eq!(&second[..], &[0x80 | 62]);
    }

    #[test]
    fn sensitive_fields_are_never_indexed() {
        let mut encoder = Encoder::default();

        let mut dst = BytesMut::new();
        encoder.encode(vec![field("authorization", "Bearer t0ps3cret")], &mut dst);

        // Never-indexed literal with the static name index for
        // `authorization` (23), 4-bit prefix.
        assert_eq!(dst[0], 0b0001_0000 | 15);
        assert_eq!(dst[1], 23 - 15);

        // A second encode must not find it in the dynamic table.
        let mut again = BytesMut::new();
        encoder.encode(vec![field("authorization", "Bearer t0ps3cret")], &mut again);
        assert_eq!(dst, again);
    }

    #[test]
    fn size_update_is_emitted_before_the_block() {
        let mut encoder = Encoder::default();
        encoder.update_max_size(0);

        let mut dst = BytesMut::new();
        encoder.encode(vec![Header::Method(http::Method::GET)], &mut dst);
        assert_eq!(&dst[..], &[0x20, 0x82]);

        // And a decoder accepts the stream.
        let mut decoder = Decoder::default();
        assert!(decode_all(&mut decoder, &dst).is_ok());
    }

    #[test]
    fn shrink_then_grow_emits_both_updates() {
        let mut encoder = Encoder::default();
        encoder.update_max_size(0);
        encoder.update_max_size(4096);

        let mut dst = BytesMut::new();
        encoder.encode(Vec::<Header>::new(), &mut dst);

        let mut decoder = Decoder::default();
        assert!(decode_all(&mut decoder, &dst).is_ok());
        assert_eq!(dst[0], 0x20);
    }

    #[test]
    fn round_trips_a_request_header_list() {
        let mut encoder = Encoder::default();
        let mut decoder = Decoder::default();

        let headers = vec![
            Header::Method(http::Method::GET),
            Header::Scheme(super::super::header::BytesStr::from_static("https")),
            Header::Path(super::super::header::BytesStr::from_static("/metrics")),
            Header::Authority(super::super::header::BytesStr::from_static("example.com")),
            field("accept", "*/*"),
            field("x-request-id", "0123456789abcdef"),
        ];

        for _ in 0..3 {
            let mut dst = BytesMut::new();
            encoder.encode(headers.clone(), &mut dst);
            let decoded = decode_all(&mut decoder, &dst).unwrap();
            assert_eq!(decoded, headers);
        }
    }

    #[test]
    fn huffman_heuristic_skips_short_and_base64_values() {
        assert!(!should_huffman(b"short"));
        assert!(!should_huffman(b"dGhpcyBpcyBiYXNlNjQgZGF0YSBmb3Igc3VyZQ=="));
        assert!(should_huffman(b"text/html; charset=utf-8"));
        assert!(should_huffman(b"www.example.com"));
    }
}
