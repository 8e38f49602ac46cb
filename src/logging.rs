//! Tracing setup for binaries and tests that embed the decoder.
//!
//! The library itself only emits events: unit and line-program milestones
//! at `debug`, per-entry and per-opcode detail at `trace`. Nothing is
//! printed until a subscriber is installed.

use std::sync::Once;

use tracing::debug;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "elfdwarf=info";

/// Install a human-readable subscriber. Only the first call (of this or
/// [`init_tracing_json`]) has an effect.
pub fn init_tracing() {
    install(false);
}

/// Install a subscriber that writes one JSON object per event, including
/// the enclosing `unit`/`lookup` span fields.
pub fn init_tracing_json() {
    install(true);
}

fn install(json: bool) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let base = fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_line_number(true);
        let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
            Box::new(base.json().with_current_span(true))
        } else {
            Box::new(base)
        };

        // Someone else's subscriber wins
        let _ = tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init();

        debug!(json, "tracing installed");
    });
}

/// Debug-level span around one decoding step.
///
/// ```
/// let span = elfdwarf::span_trace!("unit", offset = 0x2a);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! span_trace {
    ($name:expr) => {
        tracing::debug_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::debug_span!($name, $($field)*)
    };
}

/// Log an error at `debug` and evaluate to it, for use inside `map_err`.
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {{
        let e = $err;
        tracing::debug!(error = %e, "decode failed");
        e
    }};
    ($err:expr, $context:expr) => {{
        let e = $err;
        tracing::debug!(error = %e, context = $context, "decode failed");
        e
    }};
}
