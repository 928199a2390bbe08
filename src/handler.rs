//! The installed OS-level signal handler.
//!
//! Everything on this path runs as an asynchronous interrupt of whichever
//! thread the kernel picked, so it is restricted to a strict allow-list of
//! primitives: the raw writer and integer formatter from [`crate::output`],
//! the table rendering in [`crate::describe`], the unwind walk in
//! [`crate::trace`], and the build-selected demangler. Nothing here may
//! allocate, lock, or call into non-reentrant library code.

use libc::c_int;

use crate::output::{write_stderr, STDERR};
use crate::registry::{global_registry, ExitAction};
use crate::{describe, trace};

/// The handler registration installs for every signal.
///
/// Renders the signal description and a backtrace to stderr, invokes any
/// registered callback, then applies the stored exit action.
pub(crate) unsafe extern "C" fn dispatch(
    sig: c_int,
    info: *mut libc::siginfo_t,
    _ucontext: *mut libc::c_void,
) {
    let registry = global_registry();
    if describe::lookup_signal(sig).is_none() {
        // Registration refuses signals without a descriptor, so reaching
        // this means the build and the installed handlers disagree; the
        // process state is not trustworthy enough to continue.
        write_stderr("sigtrace: no descriptor for signal in handler\n");
        libc::_exit(1);
    }
    describe::describe_signal(sig, info.as_ref(), registry.rank(), STDERR);
    write_stderr("Backtrace:\n");
    trace::print_from_here(STDERR);
    if let Some(callback) = registry.stored_callback(sig) {
        callback(sig);
    }
    match registry.stored_action(sig) {
        Some(ExitAction::Exit) => libc::_exit(1),
        Some(ExitAction::Return) => {}
        Some(ExitAction::Reraise) => reraise_default(sig),
        None => {
            write_stderr("sigtrace: unknown exit action\n");
            libc::_exit(1);
        }
    }
}

/// Restores the default disposition for `sig` and re-delivers it to self.
fn reraise_default(sig: c_int) {
    // SAFETY: plain sigaction/raise syscalls; the zeroed struct is fully
    // initialized before use.
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = libc::SIG_DFL;
        libc::sigfillset(&mut sa.sa_mask);
        sa.sa_flags = libc::SA_RESTART;
        if libc::sigaction(sig, &sa, std::ptr::null_mut()) != 0 {
            write_stderr("sigtrace: failed to restore the default signal disposition\n");
            libc::_exit(1);
        }
        libc::raise(sig);
    }
}
