#![warn(missing_docs)]
//! # Logging for the docstore transaction adapter
//!
//! `docstore_tpc` logs through [tracing]: staging and refreshes at `debug`,
//! phase outcomes at `info`, partial compensation at `warn`. This crate
//! picks which of those events are written and where.
//!
//! Filter with `RUST_LOG`, for example to follow compensation only:
//! ```bash
//! RUST_LOG='docstore_tpc[tpc_abort]=debug' cargo test
//! ```
//! Without `RUST_LOG` only warnings from `docstore_tpc` get through.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        format::{DefaultFields, Format},
        MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

pub use tracing;

/// Directive used when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVE: &str = "docstore_tpc=warn";

/// Run logging in a unit test.
///
/// RUST_LOG must be set or this is a no-op. Only the first call in a process
/// installs anything; later calls return [TracingError::SetGlobal].
pub fn test_run() -> Result<(), TracingError> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }
    init_fmt()
}

/// Install the console subscriber, writing to stderr with [standard_filter]
pub fn init_fmt() -> Result<(), TracingError> {
    let filter = standard_filter()?;
    Registry::default()
        .with(fmt_layer(std::io::stderr).with_filter(filter))
        .try_init()?;
    Ok(())
}

/// `RUST_LOG` if it is set, [DEFAULT_DIRECTIVE] otherwise
pub fn standard_filter() -> Result<EnvFilter, TracingError> {
    match std::env::var("RUST_LOG") {
        Ok(directives) => filter_from(&directives),
        Err(_) => filter_from(DEFAULT_DIRECTIVE),
    }
}

/// Parse a comma-separated list of filter directives
pub fn filter_from(directives: &str) -> Result<EnvFilter, TracingError> {
    Ok(EnvFilter::try_new(directives)?)
}

/// The console layer, unfiltered. Events carry their target, file and line.
pub fn fmt_layer<W, S>(writer: W) -> tracing_subscriber::fmt::Layer<S, DefaultFields, Format, W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::Layer::default()
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
}

/// Run `f` with a subscriber scoped to the current thread and return what it
/// logged, without colours.
pub fn capture<F: FnOnce()>(directives: &str, f: F) -> Result<String, TracingError> {
    let buffer = Buffer::default();
    let subscriber = Registry::default().with(
        fmt_layer(buffer.clone())
            .with_ansi(false)
            .with_filter(filter_from(directives)?),
    );
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.0.lock().clone();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'w> MakeWriter<'w> for Buffer {
    type Writer = Buffer;

    fn make_writer(&'w self) -> Self::Writer {
        self.clone()
    }
}

/// Error in the tracing/logging setup
#[allow(missing_docs)] // should be self-explanatory
#[derive(thiserror::Error, Debug)]
pub enum TracingError {
    #[error(transparent)]
    SetGlobal(#[from] tracing_subscriber::util::TryInitError),
    #[error(transparent)]
    BadDirective(#[from] tracing_subscriber::filter::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info_span, warn};

    #[test]
    fn default_directive_only_lets_adapter_warnings_through() {
        let logged = capture(DEFAULT_DIRECTIVE, || {
            warn!(target: "docstore_tpc::manager", "batch was only partially undone");
            debug!(target: "docstore_tpc::manager", "staged");
            warn!(target: "somewhere_else", "unrelated");
        })
        .unwrap();

        assert!(logged.contains("batch was only partially undone"), "{}", logged);
        assert!(!logged.contains("staged"));
        assert!(!logged.contains("unrelated"));
    }

    #[test]
    fn span_filters_select_one_phase() {
        let logged = capture("docstore_tpc[tpc_abort]=debug", || {
            info_span!(target: "docstore_tpc::manager", "tpc_abort").in_scope(|| {
                debug!(target: "docstore_tpc::manager::compensate", "restored")
            });
            info_span!(target: "docstore_tpc::manager", "commit").in_scope(|| {
                debug!(target: "docstore_tpc::manager::commit", "applied")
            });
        })
        .unwrap();

        assert!(logged.contains("tpc_abort"), "{}", logged);
        assert!(logged.contains("restored"));
        assert!(!logged.contains("applied"));
    }

    #[test]
    fn bad_directives_are_reported() {
        assert!(matches!(
            filter_from("docstore_tpc=loudly"),
            Err(TracingError::BadDirective(_))
        ));
        assert!(filter_from("docstore_tpc=debug,warn").is_ok());
    }
}
