mod decoder;
mod encoder;
pub(crate) mod header;
mod huffman;
mod table;

pub use self::decoder::{Decoder, DecoderError, NeedMore};
pub use self::encoder::Encoder;
pub use self::header::{BytesStr, Header};
