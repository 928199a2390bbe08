//! Symbol demangling backends.
//!
//! Two interchangeable backends share the [`Demangle`] contract:
//!
//! - [`TableDemangler`] (default) decodes Rust mangled names with
//!   `rustc-demangle`, writing straight into a caller-supplied buffer. It
//!   performs no allocation and is safe to use from a signal handler.
//! - [`AbiDemangler`] (cargo feature `abi-demangle`) decodes Itanium C++ ABI
//!   names with `cpp_demangle`. It allocates and therefore must not be used
//!   where strict async-signal-safety is required.
//!
//! The backend wired into the handler path is selected at build time; see
//! [`DEFAULT_DEMANGLER`].

use std::fmt::{self, Write as _};

/// A symbol demangling strategy.
pub trait Demangle {
    /// True when this backend is known to leave parts of a name mangled, in
    /// which case the backtrace printer appends the raw form in parentheses.
    const PARTIAL_OUTPUT: bool = false;

    /// Demangles `mangled` into `out`, returning the number of bytes written.
    ///
    /// Fails, writing nothing the caller should read, when the input is not a
    /// recognized mangled name or the output does not fit in `out`. The
    /// buffer is never overrun.
    fn demangle(&self, mangled: &str, out: &mut [u8]) -> Option<usize>;
}

/// Table-driven demangler for Rust symbols (legacy and v0 mangling).
///
/// Allocation-free and safe to call from a signal handler.
pub struct TableDemangler;

impl Demangle for TableDemangler {
    fn demangle(&self, mangled: &str, out: &mut [u8]) -> Option<usize> {
        let symbol = rustc_demangle::try_demangle(mangled).ok()?;
        let mut sink = FixedSink { buf: out, len: 0 };
        // Alternate form drops the trailing hash.
        write!(sink, "{:#}", symbol).ok()?;
        Some(sink.len)
    }
}

/// ABI-facility demangler for Itanium C++ symbols.
///
/// Delegates to `cpp_demangle`, which allocates while parsing and printing.
/// Unsafe to use from a signal handler; only wire it in when the host process
/// tolerates allocation inside the handler.
#[cfg(feature = "abi-demangle")]
pub struct AbiDemangler;

#[cfg(feature = "abi-demangle")]
impl Demangle for AbiDemangler {
    fn demangle(&self, mangled: &str, out: &mut [u8]) -> Option<usize> {
        let symbol = cpp_demangle::Symbol::new(mangled).ok()?;
        let text = symbol.to_string();
        if text.len() > out.len() {
            return None;
        }
        out[..text.len()].copy_from_slice(text.as_bytes());
        Some(text.len())
    }
}

/// The backend the backtrace printer uses, selected at build time.
#[cfg(not(feature = "abi-demangle"))]
pub const DEFAULT_DEMANGLER: TableDemangler = TableDemangler;

/// The backend the backtrace printer uses, selected at build time.
#[cfg(feature = "abi-demangle")]
pub const DEFAULT_DEMANGLER: AbiDemangler = AbiDemangler;

/// `fmt::Write` over a fixed buffer; errors instead of growing.
struct FixedSink<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl fmt::Write for FixedSink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let end = self.len.checked_add(bytes.len()).ok_or(fmt::Error)?;
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}
