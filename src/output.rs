//! Allocation-free output primitives.
//!
//! Everything in this module is safe to call from a signal handler: the
//! writer uses only the raw `write(2)` system call and the integer formatter
//! works entirely in a caller-supplied buffer. These are the only I/O and
//! formatting operations the handler path is allowed to use.

use std::os::unix::io::RawFd;

/// File descriptor for standard error.
pub const STDERR: RawFd = libc::STDERR_FILENO;

/// Writes all of `bytes` to `fd` using the raw `write(2)` system call.
///
/// Short writes are resumed from where they left off; an interrupted call
/// (`EINTR`) is retried. Any other write error aborts the attempt silently,
/// since there is nothing useful a signal handler can do about an unwritable
/// descriptor.
///
/// This function is safe to call from a signal handler.
pub fn write_all(bytes: &[u8], fd: RawFd) {
    let mut written = 0;
    while written < bytes.len() {
        let remaining = &bytes[written..];
        let rc = unsafe {
            libc::write(
                fd,
                remaining.as_ptr() as *const libc::c_void,
                remaining.len(),
            )
        };
        if rc < 0 {
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return;
        }
        written += rc as usize;
    }
}

/// Writes a string to `fd`. See [`write_all`].
pub fn write_str(s: &str, fd: RawFd) {
    write_all(s.as_bytes(), fd);
}

/// Writes a string to standard error. See [`write_all`].
pub fn write_stderr(s: &str) {
    write_str(s, STDERR);
}

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Formats an integer into `buf` without allocating.
///
/// Writes the canonical base-`base` representation, most significant digit
/// first, and returns the formatted region of `buf`. Bases 2 through 16 are
/// supported. Negative values are rendered with a leading `-` for base 10
/// only; for other bases the two's-complement bit pattern is formatted, which
/// is what callers printing addresses want. `pad` prepends zeros until at
/// least that many digits follow the optional sign.
///
/// Returns `None`, rendering nothing, if `base` is out of range or `buf` is
/// too small for the result.
///
/// This function is safe to call from a signal handler.
///
/// # Example
///
/// ```
/// let mut buf = [0u8; 32];
/// assert_eq!(sigtrace::format_int(-42, &mut buf, 10, 0), Some("-42"));
/// let mut buf = [0u8; 32];
/// assert_eq!(sigtrace::format_int(255, &mut buf, 16, 4), Some("00ff"));
/// ```
pub fn format_int(value: isize, buf: &mut [u8], base: u32, pad: usize) -> Option<&str> {
    if !(2..=16).contains(&base) || buf.is_empty() {
        return None;
    }
    let base = base as usize;
    let mut pos = 0;
    let negative = value < 0 && base == 10;
    if negative {
        buf[0] = b'-';
        pos = 1;
    }
    // unsigned_abs negates without overflowing on isize::MIN; non-decimal
    // bases reinterpret the bits instead, like a uintptr_t cast.
    let mut rest = if negative {
        value.unsigned_abs()
    } else {
        value as usize
    };
    let digits_start = pos;
    let mut pad = pad;
    // Always emit at least one digit (zero).
    loop {
        if pos >= buf.len() {
            return None;
        }
        buf[pos] = DIGITS[rest % base];
        pos += 1;
        rest /= base;
        pad = pad.saturating_sub(1);
        if rest == 0 && pad == 0 {
            break;
        }
    }
    // Digits were produced least significant first.
    buf[digits_start..pos].reverse();
    std::str::from_utf8(&buf[..pos]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_format_roundtrip_all_bases() {
        let samples: &[isize] = &[0, 1, 7, 42, 255, 4096, 65535, isize::MAX];
        for &value in samples {
            for base in 2..=16u32 {
                let mut buf = [0u8; 80];
                let s = format_int(value, &mut buf, base, 0).expect("format failed");
                assert_eq!(
                    isize::from_str_radix(s, base).unwrap(),
                    value,
                    "value {value} base {base} rendered as {s:?}"
                );
            }
        }
    }

    #[test]
    fn test_format_negative_base_ten() {
        let samples: &[isize] = &[-1, -42, -65536, isize::MIN];
        for &value in samples {
            let mut buf = [0u8; 80];
            let s = format_int(value, &mut buf, 10, 0).expect("format failed");
            assert_eq!(s, value.to_string());
        }
    }

    #[test]
    fn test_format_padding() {
        let mut buf = [0u8; 32];
        assert_eq!(format_int(0, &mut buf, 16, 12), Some("000000000000"));
        let mut buf = [0u8; 32];
        assert_eq!(format_int(0xdead, &mut buf, 16, 12), Some("00000000dead"));
        let mut buf = [0u8; 32];
        // Padding counts digits, not the sign.
        assert_eq!(format_int(-5, &mut buf, 10, 3), Some("-005"));
        let mut buf = [0u8; 32];
        // Values longer than the pad are not truncated.
        assert_eq!(format_int(123456, &mut buf, 10, 2), Some("123456"));
    }

    #[test]
    fn test_format_insufficient_buffer() {
        let mut buf = [0u8; 3];
        assert!(format_int(1234, &mut buf, 10, 0).is_none());
        let mut buf = [0u8; 0];
        assert!(format_int(0, &mut buf, 10, 0).is_none());
        let mut buf = [0u8; 1];
        // Sign plus digit does not fit.
        assert!(format_int(-1, &mut buf, 10, 0).is_none());
    }

    #[test]
    fn test_format_bad_base() {
        let mut buf = [0u8; 32];
        assert!(format_int(42, &mut buf, 1, 0).is_none());
        assert!(format_int(42, &mut buf, 17, 0).is_none());
    }

    #[test]
    fn test_write_all_to_file() {
        let mut file = tempfile::tempfile().unwrap();
        write_str("signal output\n", file.as_raw_fd());
        file.flush().unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "signal output\n");
    }
}
