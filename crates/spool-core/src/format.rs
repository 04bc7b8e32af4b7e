//! Wire envelope for a batch of events

use bytes::{BufMut, Bytes, BytesMut};

use crate::event::Event;

/// Describes how a batch of event payloads is joined into one request body.
///
/// A JSON array intake uses `[`, `]` and `,`; newline-delimited intakes
/// use an empty prefix and suffix with `\n` as separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFormat {
    prefix: Bytes,
    suffix: Bytes,
    separator: Bytes,
}

impl DataFormat {
    /// Create a custom format
    pub fn new(prefix: &str, suffix: &str, separator: &str) -> Self {
        Self {
            prefix: Bytes::copy_from_slice(prefix.as_bytes()),
            suffix: Bytes::copy_from_slice(suffix.as_bytes()),
            separator: Bytes::copy_from_slice(separator.as_bytes()),
        }
    }

    /// `[e1,e2,...]`
    pub fn json_array() -> Self {
        Self::new("[", "]", ",")
    }

    /// `e1\ne2\n...`
    pub fn newline_delimited() -> Self {
        Self::new("", "", "\n")
    }

    /// Join raw payloads with the separator and wrap them in prefix and suffix
    pub fn format<'a>(&self, payloads: impl IntoIterator<Item = &'a [u8]>) -> Bytes {
        let mut out = BytesMut::new();
        out.put_slice(&self.prefix);
        for (i, payload) in payloads.into_iter().enumerate() {
            if i > 0 {
                out.put_slice(&self.separator);
            }
            out.put_slice(payload);
        }
        out.put_slice(&self.suffix);
        out.freeze()
    }

    /// Format the `data` of every event, ignoring metadata
    pub fn format_events(&self, events: &[Event]) -> Bytes {
        self.format(events.iter().map(|event| event.data.as_ref()))
    }
}

impl Default for DataFormat {
    fn default() -> Self {
        Self::json_array()
    }
}
