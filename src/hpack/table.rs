use super::header::BytesStr;
use super::{DecoderError, Header};

use fnv::FnvHashMap;
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};

use std::collections::VecDeque;

/// The entries of the HPACK static table (RFC 7541 Appendix A), indices
/// 1 through 61.
const STATIC_ENTRIES: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// The combined static + dynamic index space starts the dynamic entries
/// here.
pub const DYN_OFFSET: usize = STATIC_ENTRIES.len() + 1;

/// Resolve a static table index into a header.
pub fn static_header(index: usize) -> Result<Header, DecoderError> {
    debug_assert!((1..DYN_OFFSET).contains(&index));

    let header = match index {
        1 => Header::Authority(BytesStr::from_static("")),
        2 => Header::Method(Method::GET),
        3 => Header::Method(Method::POST),
        4 => Header::Path(BytesStr::from_static("/")),
        5 => Header::Path(BytesStr::from_static("/index.html")),
        6 => Header::Scheme(BytesStr::from_static("http")),
        7 => Header::Scheme(BytesStr::from_static("https")),
        8 => Header::Status(StatusCode::OK),
        9 => Header::Status(StatusCode::NO_CONTENT),
        10 => Header::Status(StatusCode::PARTIAL_CONTENT),
        11 => Header::Status(StatusCode::NOT_MODIFIED),
        12 => Header::Status(StatusCode::BAD_REQUEST),
        13 => Header::Status(StatusCode::NOT_FOUND),
        14 => Header::Status(StatusCode::INTERNAL_SERVER_ERROR),
        _ => {
            let (name, value) = STATIC_ENTRIES[index - 1];
            Header::Field {
                name: HeaderName::from_static(name),
                value: HeaderValue::from_static(value),
            }
        }
    };

    Ok(header)
}

/// How well a header matched against a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// Name and value matched; carries the wire index.
    Indexed(usize),
    /// Only the name matched; carries the wire index of the name.
    Name(usize),
    /// No match at all.
    NotIndexed,
}

/// Look a header up in the static table.
fn static_find(header: &Header) -> Index {
    use self::Index::*;

    match *header {
        Header::Authority(ref v) => {
            if v.is_empty() {
                Indexed(1)
            } else {
                Name(1)
            }
        }
        Header::Method(ref v) => match *v {
            Method::GET => Indexed(2),
            Method::POST => Indexed(3),
            _ => Name(2),
        },
        Header::Path(ref v) => match v.as_str() {
            "/" => Indexed(4),
            "/index.html" => Indexed(5),
            _ => Name(4),
        },
        Header::Scheme(ref v) => match v.as_str() {
            "http" => Indexed(6),
            "https" => Indexed(7),
            _ => Name(6),
        },
        Header::Status(v) => match v.as_u16() {
            200 => Indexed(8),
            204 => Indexed(9),
            206 => Indexed(10),
            304 => Indexed(11),
            400 => Indexed(12),
            404 => Indexed(13),
            500 => Indexed(14),
            _ => Name(8),
        },
        Header::Field {
            ref name,
            ref value,
        } => {
            // Entries 15.. are plain fields; all but accept-encoding carry
            // an empty placeholder value.
            for (i, &(n, v)) in STATIC_ENTRIES[14..].iter().enumerate() {
                if name.as_str() == n {
                    let index = i + 15;
                    return if value.as_bytes() == v.as_bytes() {
                        Indexed(index)
                    } else {
                        Name(index)
                    };
                }
            }

            NotIndexed
        }
    }
}

// ===== Decoder-side dynamic table =====

/// The decoder's dynamic table: a FIFO of entries addressed relative to the
/// newest insertion.
#[derive(Debug, Default)]
pub struct Table {
    entries: VecDeque<Header>,
    size: usize,
    max_size: usize,
}

impl Table {
    pub fn new(max_size: usize) -> Table {
        Table {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get an entry; zero is the most recent insertion.
    pub fn get(&self, index: usize) -> Result<Header, DecoderError> {
        self.entries
            .get(index)
            .cloned()
            .ok_or(DecoderError::InvalidTableIndex)
    }

    pub fn insert(&mut self, entry: Header) {
        let len = entry.len();

        self.reserve(len);

        if len <= self.max_size {
            self.size += len;
            self.entries.push_front(entry);
        }
        // An entry larger than the table empties the table and is not
        // inserted (RFC 7541 § 4.4).
    }

    pub fn set_max_size(&mut self, size: usize) {
        self.max_size = size;
        self.consolidate();
    }

    fn reserve(&mut self, len: usize) {
        while self.size + len > self.max_size {
            match self.entries.pop_back() {
                Some(evicted) => {
                    self.size -= evicted.len();
                }
                None => return,
            }
        }
    }

    fn consolidate(&mut self) {
        while self.size > self.max_size {
            let evicted = self
                .entries
                .pop_back()
                .expect("size and entries out of sync");
            self.size -= evicted.len();
        }
    }
}

// ===== Encoder-side dynamic table =====

/// The encoder's dynamic table.
///
/// On top of the FIFO, a name-keyed index maps to the insertion sequence
/// numbers of live entries carrying that name, so a name-only and a
/// name-and-value lookup share one probe without building a composite key.
#[derive(Debug, Default)]
pub struct EncoderTable {
    entries: VecDeque<Header>,
    by_name: FnvHashMap<Vec<u8>, Vec<u64>>,
    /// Total number of insertions ever performed. The newest live entry has
    /// sequence number `inserted - 1`.
    inserted: u64,
    size: usize,
    max_size: usize,
}

impl EncoderTable {
    pub fn new(max_size: usize) -> EncoderTable {
        EncoderTable {
            max_size,
            ..EncoderTable::default()
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Find the best match for `header` across the static and dynamic
    /// tables, returning a wire index.
    pub fn find(&self, header: &Header) -> Index {
        let statik = static_find(header);

        if let Index::Indexed(_) = statik {
            return statik;
        }

        // Dynamic entries: scan the per-name bucket, newest first.
        if let Some(seqs) = self.by_name.get(header.name().as_slice()) {
            let mut name_only = None;

            for &seq in seqs.iter().rev() {
                let index = self.wire_index(seq);
                if name_only.is_none() {
                    name_only = Some(index);
                }

                let pos = (self.inserted - 1 - seq) as usize;
                if self.entries[pos].value_eq(header) {
                    return Index::Indexed(index);
                }
            }

            if let Some(index) = name_only {
                return Index::Name(index);
            }
        }

        statik
    }

    /// Insert an entry, evicting from the oldest end until it fits.
    pub fn insert(&mut self, entry: Header) {
        let len = entry.len();

        self.reserve(len);

        if len > self.max_size {
            // Too large to ever reside in the table; reserve() already
            // emptied it.
            return;
        }

        let name = entry.name().as_slice().to_vec();
        self.by_name.entry(name).or_default().push(self.inserted);
        self.size += len;
        self.entries.push_front(entry);
        self.inserted += 1;
    }

    pub fn set_max_size(&mut self, size: usize) {
        self.max_size = size;
        while self.size > self.max_size {
            self.evict();
        }
    }

    fn wire_index(&self, seq: u64) -> usize {
        DYN_OFFSET + (self.inserted - 1 - seq) as usize
    }

    fn reserve(&mut self, len: usize) {
        while !self.entries.is_empty() && self.size + len > self.max_size {
            self.evict();
        }
    }

    fn evict(&mut self) {
        let evicted = match self.entries.pop_back() {
            Some(entry) => entry,
            None => return,
        };

        self.size -= evicted.len();

        // The oldest live entry has the smallest sequence number, which sits
        // at the front of its name bucket.
        let evicted_name = evicted.name();
        let name = evicted_name.as_slice();
        if let Some(seqs) = self.by_name.get_mut(name) {
            seqs.remove(0);
            if seqs.is_empty() {
                self.by_name.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn field(name: &str, value: &str) -> Header {
        Header::new(
            Bytes::copy_from_slice(name.as_bytes()),
            Bytes::copy_from_slice(value.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn static_lookup_prefers_full_matches() {
        assert_eq!(static_find(&Header::Method(Method::GET)), Index::Indexed(2));
        assert_eq!(static_find(&Header::Method(Method::PUT)), Index::Name(2));
        assert_eq!(
            static_find(&field("accept-encoding", "gzip, deflate")),
            Index::Indexed(16)
        );
        assert_eq!(static_find(&field("user-agent", "curl")), Index::Name(58));
        assert_eq!(static_find(&field("x-custom", "1")), Index::NotIndexed);
    }

    #[test]
    fn newest_entry_takes_the_lowest_dynamic_index() {
        let mut table = EncoderTable::new(4096);
        table.insert(field("x-a", "1"));
        table.insert(field("x-b", "2"));

        assert_eq!(table.find(&field("x-b", "2")), Index::Indexed(62));
        assert_eq!(table.find(&field("x-a", "1")), Index::Indexed(63));
        assert_eq!(table.find(&field("x-a", "other")), Index::Name(63));
    }

    #[test]
    fn size_tracks_the_rfc_formula() {
        let mut table = EncoderTable::new(4096);
        table.insert(field("x-a", "1"));
        table.insert(field("x-b", "22"));
        assert_eq!(table.size(), (3 + 1 + 32) + (3 + 2 + 32));
    }

    #[test]
    fn eviction_is_oldest_first_and_reindexes() {
        // Room for two small entries only.
        let mut table = EncoderTable::new(80);
        table.insert(field("x-a", "1")); // 36
        table.insert(field("x-b", "2")); // 36
        table.insert(field("x-c", "3")); // evicts x-a

        assert_eq!(table.find(&field("x-a", "1")), Index::NotIndexed);
        assert_eq!(table.find(&field("x-c", "3")), Index::Indexed(62));
        assert_eq!(table.find(&field("x-b", "2")), Index::Indexed(63));
        assert!(table.size() <= 80);
    }

    #[test]
    fn shrinking_max_size_evicts_immediately() {
        let mut table = EncoderTable::new(4096);
        table.insert(field("x-a", "1"));
        table.insert(field("x-b", "2"));
        table.set_max_size(40);
        assert_eq!(table.size(), 36);
        assert_eq!(table.find(&field("x-b", "2")), Index::Indexed(62));
    }

    #[test]
    fn decoder_table_matches_spec_eviction() {
        let mut table = Table::new(72);
        table.insert(field("x-a", "1"));
        table.insert(field("x-b", "2"));
        assert_eq!(table.size(), 72);

        table.insert(field("x-c", "3"));
        assert_eq!(table.size(), 72);
        assert_eq!(table.get(0).unwrap(), field("x-c", "3"));
        assert_eq!(table.get(1).unwrap(), field("x-b", "2"));
        assert!(table.get(2).is_err());
    }
}
