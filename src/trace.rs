//! Backtrace collection and rendering.
//!
//! The collector walks the current call stack through the `backtrace` crate's
//! unsynchronized entry points into caller-owned, fixed-capacity buffers; the
//! printer renders collected frames to a file descriptor using only the
//! allocation-free primitives from [`crate::output`].

use std::os::unix::io::RawFd;

use crate::demangle::{Demangle, DEFAULT_DEMANGLER};
use crate::output::{format_int, write_all, write_str};

/// Capacity of a frame's symbol storage, in bytes. Longer names truncate.
pub const SYMBOL_CAPACITY: usize = 1024;

/// Number of frames [`print_from_here`] renders at most.
pub const MAX_FRAMES: usize = 64;

const UNKNOWN_SYMBOL: &[u8] = b"(unknown symbol)";

/// A collected stack frame: program counter plus raw (mangled) symbol name.
#[derive(Clone, Copy)]
pub struct Frame {
    addr: usize,
    symbol: [u8; SYMBOL_CAPACITY],
    symbol_len: usize,
}

impl Frame {
    /// An empty frame, for pre-sizing collection buffers.
    pub const EMPTY: Frame = Frame {
        addr: 0,
        symbol: [0; SYMBOL_CAPACITY],
        symbol_len: 0,
    };

    /// The frame's program counter.
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// The raw symbol bytes, still mangled; empty only for [`Frame::EMPTY`].
    pub fn symbol(&self) -> &[u8] {
        &self.symbol[..self.symbol_len]
    }

    fn set_symbol(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(SYMBOL_CAPACITY);
        self.symbol[..len].copy_from_slice(&bytes[..len]);
        self.symbol_len = len;
    }
}

/// Returns the number of frames obtainable from the current context,
/// including this call's own frame.
///
/// Allocating at least this many [`Frame`] entries is sufficient for
/// [`collect`] to capture the complete stack.
pub fn stack_depth() -> usize {
    let mut depth = 0;
    // SAFETY: single walk of our own thread's stack; no concurrent walk is
    // possible from this call site and signal-context callers accept the
    // platform unwinder's reentrancy guarantees.
    unsafe {
        backtrace::trace_unsynchronized(|_| {
            depth += 1;
            true
        });
    }
    depth
}

/// Collects the current call stack into `frames`, starting just above this
/// function's own frame, and returns the number of entries written.
///
/// Each frame's program counter is resolved to the nearest preceding symbol,
/// truncated to [`SYMBOL_CAPACITY`] bytes, or to `(unknown symbol)` when
/// resolution fails. Collection stops at the buffer's capacity or the end of
/// the stack; there is no failure mode once a valid execution context exists.
///
/// Note: symbol resolution goes through the platform symbolizer, which on
/// some backends may allocate the first time a module's symbols are touched.
/// This mirrors what every fd-targeted crash reporter accepts in practice.
pub fn collect(frames: &mut [Frame]) -> usize {
    let mut count = 0;
    let mut skipped_self = false;
    // SAFETY: see stack_depth.
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            if !skipped_self {
                // The first frame reported is this walk itself.
                skipped_self = true;
                return true;
            }
            if count == frames.len() {
                return false;
            }
            let slot = &mut frames[count];
            slot.addr = frame.ip() as usize;
            slot.symbol_len = 0;
            backtrace::resolve_frame_unsynchronized(frame, |symbol| {
                if slot.symbol_len == 0 {
                    if let Some(name) = symbol.name() {
                        slot.set_symbol(name.as_bytes());
                    }
                }
            });
            if slot.symbol_len == 0 {
                slot.set_symbol(UNKNOWN_SYMBOL);
            }
            count += 1;
            true
        });
    }
    count
}

/// Prints collected frames to `fd`, innermost first, one line per frame.
///
/// Each line carries the frame index right-justified to at least three
/// columns, then the demangled symbol if `demangler` succeeds (followed by
/// the raw form in parentheses for backends that self-report partial
/// output), or the raw symbol unchanged on failure.
///
/// Signal-safety is inherited from `demangler`; with the table-driven
/// backend this is safe to call from a signal handler.
pub fn print_frames<D: Demangle>(demangler: &D, frames: &[Frame], fd: RawFd) {
    let mut index_buf = [0u8; 32];
    let mut demangled = [0u8; SYMBOL_CAPACITY];
    for (index, frame) in frames.iter().enumerate() {
        if index < 10 {
            write_str("  ", fd);
        } else if index < 100 {
            write_str(" ", fd);
        }
        if let Some(rendered) = format_int(index as isize, &mut index_buf, 10, 0) {
            write_str(rendered, fd);
        }
        write_str(": ", fd);
        let raw = frame.symbol();
        let mut printed = false;
        if let Ok(mangled) = std::str::from_utf8(raw) {
            if let Some(len) = demangler.demangle(mangled, &mut demangled) {
                write_all(&demangled[..len], fd);
                if D::PARTIAL_OUTPUT {
                    write_str(" (", fd);
                    write_all(raw, fd);
                    write_str(")", fd);
                }
                printed = true;
            }
        }
        if !printed {
            write_all(raw, fd);
        }
        write_str("\n", fd);
    }
}

/// Collects and prints a backtrace from the caller's current location.
///
/// Composes [`stack_depth`], [`collect`] and [`print_frames`] over a
/// fixed-capacity buffer, using the build-selected demangler backend. This is
/// what the installed signal handler calls to report a crash site.
pub fn print_from_here(fd: RawFd) {
    let depth = stack_depth().min(MAX_FRAMES);
    let mut frames = [Frame::EMPTY; MAX_FRAMES];
    let count = collect(&mut frames[..depth]);
    print_frames(&DEFAULT_DEMANGLER, &frames[..count], fd);
}
