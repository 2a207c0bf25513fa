mod table;

use self::table::ENCODE_TABLE;
use crate::hpack::DecoderError;

use bytes::{BufMut, BytesMut};
use std::sync::OnceLock;

/// The EOS symbol.
const EOS: u16 = 256;

/// A node in the canonical Huffman decode trie.
///
/// The trie is built once, lazily, from `ENCODE_TABLE`; decoding walks it
/// bit by bit. This trades a little speed for a table that cannot drift
/// from the code definitions.
#[derive(Default)]
struct Node {
    children: [Option<usize>; 2],
    symbol: Option<u16>,
}

fn trie() -> &'static Vec<Node> {
    static TRIE: OnceLock<Vec<Node>> = OnceLock::new();
    TRIE.get_or_init(|| {
        let mut nodes: Vec<Node> = vec![Node::default()];

        for (symbol, &(nbits, code)) in ENCODE_TABLE.iter().enumerate() {
            let mut cursor = 0;

            for i in (0..nbits).rev() {
                let bit = ((code >> i) & 1) as usize;

                cursor = match nodes[cursor].children[bit] {
                    Some(next) => next,
                    None => {
                        nodes.push(Node::default());
                        let next = nodes.len() - 1;
                        nodes[cursor].children[bit] = Some(next);
                        next
                    }
                };
            }

            debug_assert!(nodes[cursor].symbol.is_none());
            nodes[cursor].symbol = Some(symbol as u16);
        }

        nodes
    })
}

/// Decode a Huffman-coded string into `buf`.
///
/// The EOS symbol inside the stream is a compression error, as is padding
/// longer than 7 bits or padding that is not a prefix of the EOS code
/// (i.e. not all ones).
pub fn decode(src: &[u8], buf: &mut BytesMut) -> Result<(), DecoderError> {
    let trie = trie();

    let mut cursor = 0;
    let mut bits_since_symbol = 0u32;
    let mut all_ones = true;

    for &byte in src {
        for shift in (0..8).rev() {
            let bit = ((byte >> shift) & 1) as usize;

            cursor = match trie[cursor].children[bit] {
                Some(next) => next,
                None => return Err(DecoderError::InvalidHuffmanCode),
            };

            bits_since_symbol += 1;
            if bit == 0 {
                all_ones = false;
            }

            if let Some(symbol) = trie[cursor].symbol {
                if symbol == EOS {
                    // The EOS symbol MUST be treated as a decoding error.
                    return Err(DecoderError::InvalidHuffmanCode);
                }

                buf.put_u8(symbol as u8);
                cursor = 0;
                bits_since_symbol = 0;
                all_ones = true;
            }
        }
    }

    // Remaining bits are padding and must be the most significant bits of
    // the EOS code, at most 7 of them.
    if bits_since_symbol > 7 || !all_ones {
        return Err(DecoderError::InvalidHuffmanCode);
    }

    Ok(())
}

/// Huffman-encode `src` into `dst`, padding the final byte with EOS bits.
pub fn encode(src: &[u8], dst: &mut BytesMut) {
    let mut bits: u64 = 0;
    let mut bits_left: u32 = 40;

    for &b in src {
        let (nbits, code) = ENCODE_TABLE[b as usize];

        bits |= u64::from(code) << (bits_left - u32::from(nbits));
        bits_left -= u32::from(nbits);

        while bits_left <= 32 {
            dst.put_u8((bits >> 32) as u8);
            bits <<= 8;
            bits_left += 8;
        }
    }

    if bits_left != 40 {
        // Fill the rest of the final byte with ones (the EOS prefix).
        bits |= (1 << bits_left) - 1;
        dst.put_u8((bits >> 32) as u8);
    }
}

/// Number of bytes `src` occupies once Huffman-coded.
pub fn encoded_len(src: &[u8]) -> usize {
    let bits: u64 = src
        .iter()
        .map(|&b| u64::from(ENCODE_TABLE[b as usize].0))
        .sum();
    ((bits + 7) / 8) as usize
}
