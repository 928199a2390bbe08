//! Alternate signal stack management.
//!
//! The dispatcher must be able to run even when the interrupted thread's own
//! stack is exhausted (stack-overflow SIGSEGV being the obvious case), so
//! registration lazily installs a dedicated stack region for handler
//! execution. The region is process-wide and singular: concurrent signal
//! delivery to multiple threads sharing it is a documented limitation.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Size of the alternate stack. Generous compared to `SIGSTKSZ` because the
/// backtrace printer keeps its frame buffer (64 frames of 1 KiB symbol
/// storage) on this stack.
pub(crate) const ALT_STACK_SIZE: usize = 256 * 1024;

static ALT_STACK: AtomicPtr<libc::c_void> = AtomicPtr::new(ptr::null_mut());

/// Maps and installs the alternate signal stack if not already present.
///
/// Called from registration, never from signal context. The mapping is
/// released exactly once at process teardown.
pub(crate) fn ensure_installed() -> io::Result<()> {
    if !ALT_STACK.load(Ordering::Acquire).is_null() {
        return Ok(());
    }
    // SAFETY: anonymous private mapping with no address hint.
    let base = unsafe {
        libc::mmap(
            ptr::null_mut(),
            ALT_STACK_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    let stack = libc::stack_t {
        ss_sp: base,
        ss_flags: 0,
        ss_size: ALT_STACK_SIZE,
    };
    // SAFETY: stack describes the mapping created above.
    if unsafe { libc::sigaltstack(&stack, ptr::null_mut()) } != 0 {
        let err = io::Error::last_os_error();
        // SAFETY: base was returned by mmap above and never published.
        unsafe { libc::munmap(base, ALT_STACK_SIZE) };
        return Err(err);
    }
    match ALT_STACK.compare_exchange(
        ptr::null_mut(),
        base,
        Ordering::AcqRel,
        Ordering::Acquire,
    ) {
        Ok(_) => {
            // SAFETY: release is an extern "C" fn with no preconditions.
            unsafe { libc::atexit(release) };
        }
        Err(_) => {
            // Another registration raced us; keep theirs.
            // SAFETY: our mapping was never installed as the active stack,
            // since the winner's sigaltstack call came after ours.
            unsafe { libc::munmap(base, ALT_STACK_SIZE) };
        }
    }
    Ok(())
}

extern "C" fn release() {
    let base = ALT_STACK.swap(ptr::null_mut(), Ordering::AcqRel);
    if !base.is_null() {
        // SAFETY: base came from mmap in ensure_installed; the swap above
        // guarantees a single unmap.
        unsafe { libc::munmap(base, ALT_STACK_SIZE) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_installed_is_idempotent() {
        ensure_installed().unwrap();
        let first = ALT_STACK.load(Ordering::Acquire);
        assert!(!first.is_null());
        ensure_installed().unwrap();
        assert_eq!(ALT_STACK.load(Ordering::Acquire), first);
    }
}
