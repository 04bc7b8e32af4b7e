//! Layer and writer factories used by the subscriber builder

use std::fs::{self, File};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{Layer, Registry, fmt};

use crate::config::{ConsoleFormat, FileConfig, JsonlConfig, RotationStrategy};
use crate::LoggingError;

/// Type-erased layer over the base registry
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// JSON lines layer writing to `writer`
pub fn jsonl_layer<W>(writer: W, config: &JsonlConfig) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_current_span(config.include_spans)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_writer(writer)
        .boxed()
}

/// Stdout layer for `format`, `None` when the console is off
pub fn console_layer(format: ConsoleFormat, ansi: bool, jsonl: &JsonlConfig) -> Option<BoxedLayer> {
    match format {
        ConsoleFormat::Off => None,
        ConsoleFormat::Pretty => Some(fmt::layer().with_ansi(ansi).with_target(true).boxed()),
        ConsoleFormat::Jsonl => Some(jsonl_layer(std::io::stdout, jsonl)),
    }
}

/// Non-blocking writer for file output.
///
/// The guard flushes buffered lines when dropped and must outlive logging.
pub fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let file = File::create(config.directory.join(format!("{}.log", config.prefix)))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    Ok(tracing_appender::non_blocking(builder.build(&config.directory)?))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_jsonl_layer_writes_one_object_per_event() {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = Registry::default().with(jsonl_layer(move || writer.clone(), &JsonlConfig::default()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(feature = "logs", "Opened feature storage");
            tracing::warn!("Dropped event");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["message"], "Opened feature storage");
        assert_eq!(lines[0]["feature"], "logs");
        assert_eq!(lines[1]["level"], "WARN");
    }

    #[test]
    fn test_console_off_has_no_layer() {
        assert!(console_layer(ConsoleFormat::Off, false, &JsonlConfig::default()).is_none());
        assert!(console_layer(ConsoleFormat::Pretty, true, &JsonlConfig::default()).is_some());
    }

    #[test]
    fn test_single_file_writer() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            directory: dir.path().join("logs"),
            prefix: "host".to_string(),
            rotation: RotationStrategy::Never,
            max_files: None,
        };
        let (_writer, guard) = file_writer(&config).unwrap();
        drop(guard);
        assert!(dir.path().join("logs").join("host.log").exists());
    }

    #[test]
    fn test_rolling_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            directory: dir.path().join("rolling"),
            ..FileConfig::default()
        };
        let (_writer, _guard) = file_writer(&config).unwrap();
        assert!(dir.path().join("rolling").is_dir());
    }
}
