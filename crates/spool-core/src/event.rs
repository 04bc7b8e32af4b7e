//! The unit of data flowing through the pipeline

use bytes::Bytes;

/// A single telemetry record as handed over by a feature.
///
/// Both `data` and `metadata` are already serialized; storage never looks
/// inside them. Metadata stays small and is used by some features to
/// group events at upload time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    /// Serialized event payload
    pub data: Bytes,
    /// Optional serialized metadata attached to the payload
    pub metadata: Option<Bytes>,
}

impl Event {
    /// Create an event without metadata
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata: None,
        }
    }

    /// Attach metadata to the event
    pub fn with_metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Size of the payload plus metadata, in bytes
    pub fn size(&self) -> usize {
        self.data.len() + self.metadata.as_ref().map_or(0, Bytes::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_size_counts_metadata() {
        let event = Event::new(b"abc".to_vec()).with_metadata(b"de".to_vec());
        assert_eq!(event.size(), 5);
        assert_eq!(Event::new(Bytes::new()).size(), 0);
    }
}
