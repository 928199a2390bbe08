//! Sigtrace - Async-Signal-Safe Crash Diagnostics
//!
//! This crate installs POSIX signal handlers that explain what hit the
//! process: a structured description of the signal (number, name, cause,
//! fault address) followed by a symbolized backtrace, written to stderr,
//! then a configurable exit policy.
//!
//! # Architecture
//!
//! The crate is built from a few small subsystems:
//!
//! - **Registry**: per-signal configuration (exit action, callback),
//!   mutated only by ordinary application code
//! - **Handler**: the installed dispatcher, restricted to allocation-free,
//!   lock-free primitives
//! - **Describe**: signal and `si_code` description tables and rendering
//! - **Trace**: stack collection and printing over the unwinding backend
//! - **Demangle**: table-driven (safe) or ABI-based (allocating) symbol
//!   demangling, selected at build time
//! - **Output**: raw-write and integer-formatting primitives, the only I/O
//!   allowed in signal context
//!
//! # Usage
//!
//! ```no_run
//! use sigtrace::ExitAction;
//!
//! // Report and exit on every fatal signal.
//! sigtrace::register_fatal_defaults().expect("failed to install handlers");
//!
//! // Or pick a signal, resume afterwards, and get a callback.
//! fn on_signal(sig: libc::c_int) {
//!     // Must itself be async-signal-safe.
//!     let _ = sig;
//! }
//! sigtrace::register(libc::SIGUSR1, ExitAction::Return, Some(on_signal))
//!     .expect("failed to install handler");
//! ```
//!
//! # Safety model
//!
//! Everything the handler executes after a signal fires must tolerate an
//! unknown, possibly corrupted program state. The handler path therefore
//! uses only the primitives in this crate's allow-list: raw `write(2)`,
//! in-buffer integer formatting, table lookups, the unwind walk, and the
//! table-driven demangler. The `abi-demangle` feature swaps in a demangler
//! that allocates; opt in only when that trade-off is understood.
//!
//! Limitations: the alternate signal stack is process-wide and singular, so
//! concurrent signal delivery to multiple threads sharing it is unsupported;
//! registration must happen-before the signal deliveries it governs.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(not(unix))]
compile_error!("sigtrace requires a POSIX-like system");

mod altstack;
mod demangle;
mod describe;
mod handler;
mod output;
#[cfg(feature = "rank")]
mod rank;
mod registry;
mod trace;

pub use demangle::{Demangle, TableDemangler, DEFAULT_DEMANGLER};
#[cfg(feature = "abi-demangle")]
pub use demangle::AbiDemangler;
pub use describe::{describe_signal, lookup_signal, SignalDescriptor, FATAL_SIGNALS, SIGNALS};
pub use output::{format_int, write_all, write_stderr, write_str, STDERR};
#[cfg(feature = "rank")]
pub use rank::{set_rank_query, RankQuery};
pub use registry::{
    clear_callback, global_registry, register, register_fatal_defaults, register_many,
    set_callback, set_exit_action, ExitAction, SignalCallback, SignalRegistry, EXIT_ACTION_ENV,
};
pub use trace::{
    collect, print_frames, print_from_here, stack_depth, Frame, MAX_FRAMES, SYMBOL_CAPACITY,
};

/// Errors surfaced by registration calls.
///
/// The handler path itself never returns errors; anything fatal there is
/// reported on stderr before the process terminates.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The signal number has no descriptor on this platform.
    #[error("unknown signal number {0}")]
    UnknownSignal(libc::c_int),

    /// The exit-action environment override held something other than
    /// `EXIT`, `RETURN` or `RERAISE`.
    #[error("unrecognized exit-action override {0:?}")]
    InvalidOverride(String),

    /// The alternate signal stack could not be mapped or installed.
    #[error("failed to install the alternate signal stack")]
    AltStack(#[source] std::io::Error),

    /// The OS rejected the handler installation.
    #[error("failed to install the handler for signal {signal}")]
    HandlerInstall {
        /// Signal whose installation failed.
        signal: libc::c_int,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}
