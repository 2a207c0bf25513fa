use super::DecoderError;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};

use std::fmt;

/// An HPACK header field, either a regular field or one of the defined
/// pseudo headers.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Header {
    Field {
        name: HeaderName,
        value: HeaderValue,
    },
    // TODO: Change these types to `http::uri` types.
    Authority(BytesStr),
    Method(Method),
    Scheme(BytesStr),
    Path(BytesStr),
    Status(StatusCode),
}

/// The header field name
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Name<'a> {
    Field(&'a HeaderName),
    Authority,
    Method,
    Scheme,
    Path,
    Status,
}

/// A `Bytes` buffer that is known to hold valid UTF-8.
#[derive(Clone, Eq, PartialEq, Hash, Default)]
pub struct BytesStr(Bytes);

// ===== impl Header =====

impl Header {
    /// Build a header from raw wire bytes.
    ///
    /// Names beginning with `:` must match one of the request/response
    /// pseudo headers; anything else is a compression error. Regular names
    /// are validated against the HTTP token set before being interned.
    pub fn new(name: Bytes, value: Bytes) -> Result<Header, DecoderError> {
        if name.is_empty() {
            return Err(DecoderError::NeedMore(super::decoder::NeedMore::UnexpectedEndOfStream));
        }
        if name[0] == b':' {
            match &name[..] {
                b":authority" => {
                    let value = BytesStr::try_from(value)?;
                    Ok(Header::Authority(value))
                }
                b":method" => {
                    let method = Method::from_bytes(&value)
                        .map_err(|_| DecoderError::InvalidMethod)?;
                    Ok(Header::Method(method))
                }
                b":scheme" => {
                    let value = BytesStr::try_from(value)?;
                    Ok(Header::Scheme(value))
                }
                b":path" => {
                    let value = BytesStr::try_from(value)?;
                    Ok(Header::Path(value))
                }
                b":status" => {
                    let status = StatusCode::from_bytes(&value)
                        .map_err(|_| DecoderError::InvalidStatusCode)?;
                    Ok(Header::Status(status))
                }
                _ => Err(DecoderError::InvalidPseudoheader),
            }
        } else {
            // Field names carried on the wire must already be lowercase
            // tokens. `HeaderName::from_bytes` would silently accept and
            // normalize uppercase, so the raw bytes are checked first.
            validate_field_name(&name)?;

            let name = HeaderName::from_bytes(&name)
                .map_err(|_| DecoderError::InvalidHeaderName)?;
            let value = HeaderValue::from_maybe_shared(value)
                .map_err(|_| DecoderError::InvalidHeaderValue)?;

            Ok(Header::Field { name, value })
        }
    }

    /// The size of the header, as described by RFC 7541 § 4.1: name length
    /// plus value length plus a 32 byte overhead.
    pub fn len(&self) -> usize {
        match *self {
            Header::Field {
                ref name,
                ref value,
            } => name.as_str().len() + value.len() + 32,
            Header::Authority(ref v) => 42 + v.len(),
            Header::Method(ref v) => 39 + v.as_str().len(),
            Header::Scheme(ref v) => 39 + v.len(),
            Header::Path(ref v) => 37 + v.len(),
            Header::Status(_) => 42,
        }
    }

    /// Returns the header name
    pub fn name(&self) -> Name {
        match *self {
            Header::Field { ref name, .. } => Name::Field(name),
            Header::Authority(..) => Name::Authority,
            Header::Method(..) => Name::Method,
            Header::Scheme(..) => Name::Scheme,
            Header::Path(..) => Name::Path,
            Header::Status(..) => Name::Status,
        }
    }

    pub fn value_slice(&self) -> &[u8] {
        match *self {
            Header::Field { ref value, .. } => value.as_bytes(),
            Header::Authority(ref v) => v.as_str().as_bytes(),
            Header::Method(ref v) => v.as_str().as_bytes(),
            Header::Scheme(ref v) => v.as_str().as_bytes(),
            Header::Path(ref v) => v.as_str().as_bytes(),
            Header::Status(ref v) => v.as_str().as_bytes(),
        }
    }

    pub fn value_eq(&self, other: &Header) -> bool {
        self.value_slice() == other.value_slice()
    }

    /// Whether this field must never enter a dynamic table or be
    /// Huffman-learnable state on an intermediary.
    pub fn is_sensitive(&self) -> bool {
        match *self {
            Header::Field {
                ref name,
                ref value,
            } => {
                if value.is_sensitive() {
                    return true;
                }

                match *name {
                    http::header::AUTHORIZATION | http::header::PROXY_AUTHORIZATION => true,
                    // Large cookie values tend to be session-unique; keeping
                    // them out of the dynamic table avoids both churn and
                    // accidental persistence of credentials.
                    http::header::COOKIE => value.len() >= 64,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl<'a> Name<'a> {
    pub fn as_slice(&self) -> &[u8] {
        match *self {
            Name::Field(name) => name.as_str().as_bytes(),
            Name::Authority => b":authority",
            Name::Method => b":method",
            Name::Scheme => b":scheme",
            Name::Path => b":path",
            Name::Status => b":status",
        }
    }
}

// ===== impl BytesStr =====

impl BytesStr {
    pub const fn from_static(value: &'static str) -> Self {
        BytesStr(Bytes::from_static(value.as_bytes()))
    }

    pub fn from(value: &str) -> Self {
        BytesStr(Bytes::copy_from_slice(value.as_bytes()))
    }

    pub fn try_from(bytes: Bytes) -> Result<Self, DecoderError> {
        std::str::from_utf8(bytes.as_ref()).map_err(|_| DecoderError::InvalidUtf8)?;
        Ok(BytesStr(bytes))
    }

    pub fn as_str(&self) -> &str {
        // Safety: the constructors verify that the bytes are valid UTF-8.
        unsafe { std::str::from_utf8_unchecked(self.0.as_ref()) }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

impl std::ops::Deref for BytesStr {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for BytesStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// RFC 9113 § 8.2.1: a field name must be a non-empty, all-lowercase HTTP
/// token. Uppercase letters, spaces, control bytes and anything outside
/// ASCII are rejected.
pub fn validate_field_name(name: &[u8]) -> Result<(), DecoderError> {
    if name.is_empty() {
        return Err(DecoderError::InvalidHeaderName);
    }

    for &b in name {
        let valid = matches!(b,
            b'a'..=b'z'
            | b'0'..=b'9'
            | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*'
            | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~');

        if !valid {
            return Err(DecoderError::InvalidHeaderName);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercase_names_are_rejected() {
        let err = Header::new(Bytes::from_static(b"Content-Length"), Bytes::from_static(b"0"))
            .unwrap_err();
        assert_eq!(err, DecoderError::InvalidHeaderName);
    }

    #[test]
    fn unknown_pseudo_headers_are_rejected() {
        let err = Header::new(Bytes::from_static(b":version"), Bytes::from_static(b"11"))
            .unwrap_err();
        assert_eq!(err, DecoderError::InvalidPseudoheader);
    }

    #[test]
    fn control_and_high_bytes_are_rejected() {
        for name in [&b"x\x00y"[..], &b"x y"[..], &b"x\x7f"[..], &b"caf\xc3\xa9"[..]] {
            let err = Header::new(
                Bytes::copy_from_slice(name),
                Bytes::from_static(b"v"),
            )
            .unwrap_err();
            assert_eq!(err, DecoderError::InvalidHeaderName, "name: {:?}", name);
        }
    }

    #[test]
    fn entry_size_matches_rfc_formula() {
        let header = Header::new(
            Bytes::from_static(b"content-type"),
            Bytes::from_static(b"text/plain"),
        )
        .unwrap();
        assert_eq!(header.len(), 12 + 10 + 32);
    }
}
