//! The producer-facing sink

use serde::Serialize;

use crate::error::EncodingError;
use crate::event::Event;
use crate::telemetry::Telemetry;

/// Accepts events from features.
///
/// Implementations must return promptly: persistence happens on a
/// background context and failures are reported through telemetry,
/// never to the caller.
pub trait Writer: Send + Sync {
    /// Hand an event over for persistence
    fn write(&self, event: Event);
}

/// Writer that drops everything, used when consent is not granted
#[derive(Debug, Clone, Copy, Default)]
pub struct NopWriter;

impl Writer for NopWriter {
    fn write(&self, _event: Event) {}
}

/// Convenience methods for writing serializable values
pub trait WriterExt: Writer {
    /// Encode `value` and `metadata` as JSON and write them as one event.
    ///
    /// Returns the encoding error so callers holding a [`Telemetry`] can
    /// report it; nothing is written in that case.
    fn write_value<T, M>(&self, value: &T, metadata: Option<&M>) -> Result<(), EncodingError>
    where
        T: Serialize + ?Sized,
        M: Serialize + ?Sized,
    {
        let data = serde_json::to_vec(value)?;
        let mut event = Event::new(data);
        if let Some(metadata) = metadata {
            event = event.with_metadata(serde_json::to_vec(metadata)?);
        }
        self.write(event);
        Ok(())
    }

    /// Like [`write_value`](Self::write_value) but reports encoding failures
    /// to `telemetry` and drops the value
    fn write_value_or_report<T, M>(&self, value: &T, metadata: Option<&M>, telemetry: &dyn Telemetry)
    where
        T: Serialize + ?Sized,
        M: Serialize + ?Sized,
    {
        if let Err(e) = self.write_value(value, metadata) {
            telemetry.error("Failed to encode data", Some(&e));
        }
    }
}

impl<W: Writer + ?Sized> WriterExt for W {}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use parking_lot::Mutex;
    use serde::ser::Error as _;

    use super::*;
    use crate::telemetry::RecordingTelemetry;

    #[derive(Default)]
    struct CollectingWriter {
        events: Mutex<Vec<Event>>,
    }

    impl Writer for CollectingWriter {
        fn write(&self, event: Event) {
            self.events.lock().push(event);
        }
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("value refuses to encode"))
        }
    }

    #[test]
    fn test_write_value_encodes_json() {
        let writer = CollectingWriter::default();
        let value = BTreeMap::from([("key1", "value1")]);
        let metadata = BTreeMap::from([("meta", 1)]);

        writer.write_value(&value, Some(&metadata)).unwrap();

        let events = writer.events.lock();
        assert_eq!(&events[0].data[..], br#"{"key1":"value1"}"#);
        assert_eq!(events[0].metadata.as_deref(), Some(&br#"{"meta":1}"#[..]));
    }

    #[test]
    fn test_encoding_failure_is_reported_and_dropped() {
        let writer = CollectingWriter::default();
        let telemetry = RecordingTelemetry::new();

        writer.write_value_or_report(&Unencodable, None::<&()>, &telemetry);

        assert!(writer.events.lock().is_empty());
        assert_eq!(telemetry.error_messages(), vec!["Failed to encode data"]);
    }

    #[test]
    fn test_nop_writer_accepts_anything() {
        NopWriter.write(Event::new(b"ignored".to_vec()));
    }
}
