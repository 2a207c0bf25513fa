use crate::frame::{self, Error, Frame, Head, Kind, StreamId};

/// A PRIORITY frame.
///
/// Parsed and validated for protocol correctness; this client does not act
/// on peer-advertised priorities.
#[derive(Debug, Eq, PartialEq)]
pub struct Priority {
    stream_id: StreamId,
    dependency: StreamDependency,
}

#[derive(Debug, Eq, PartialEq)]
pub struct StreamDependency {
    /// The ID of the stream dependency target
    dependency_id: StreamId,

    /// The weight for the stream. The value exposed (and set) here is always
    /// in the range [0, 255], instead of [1, 256] (as defined in section
    /// 5.3.2) so that the value fits into a `u8`.
    weight: u8,

    /// True if the stream dependency is exclusive.
    is_exclusive: bool,
}

impl Priority {
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(head.kind(), Kind::Priority);

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        // A PRIORITY frame with a length other than 5 octets MUST be treated
        // as a stream error of type FRAME_SIZE_ERROR.
        if payload.len() != 5 {
            return Err(Error::BadFrameSize);
        }

        let dependency = StreamDependency::load(payload)?;

        if dependency.dependency_id() == head.stream_id() {
            // A stream cannot depend on itself. An endpoint MUST treat this
            // as a stream error of type PROTOCOL_ERROR.
            return Err(Error::InvalidDependencyId);
        }

        Ok(Priority {
            stream_id: head.stream_id(),
            dependency,
        })
    }
}

impl From<Priority> for Frame {
    fn from(src: Priority) -> Self {
        Frame::Priority(src)
    }
}

// ===== impl StreamDependency =====

impl StreamDependency {
    pub fn new(dependency_id: StreamId, weight: u8, is_exclusive: bool) -> Self {
        StreamDependency {
            dependency_id,
            weight,
            is_exclusive,
        }
    }

    pub fn load(src: &[u8]) -> Result<Self, Error> {
        if src.len() != 5 {
            return Err(Error::InvalidPayloadLength);
        }

        // Parse the stream ID and exclusive flag
        let (dependency_id, is_exclusive) = StreamId::parse(&src[..4]);

        // Read the weight
        let weight = src[4];

        Ok(StreamDependency::new(dependency_id, weight, is_exclusive))
    }

    pub fn dependency_id(&self) -> StreamId {
        self.dependency_id
    }

    pub fn weight(&self) -> u8 {
        self.weight
    }

    pub fn is_exclusive(&self) -> bool {
        self.is_exclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_dependency_is_rejected() {
        let head = Head::new(Kind::Priority, 0, StreamId::from(1));
        let err = Priority::load(head, &[0, 0, 0, 1, 16]).unwrap_err();
        assert!(matches!(err, Error::InvalidDependencyId));
    }

    #[test]
    fn wrong_length_is_a_frame_size_error() {
        let head = Head::new(Kind::Priority, 0, StreamId::from(1));
        let err = Priority::load(head, &[0, 0, 0, 3]).unwrap_err();
        assert!(matches!(err, Error::BadFrameSize));
    }
}
