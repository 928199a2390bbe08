//! Process-wide signal registration.
//!
//! The registry is an explicitly constructed, process-scoped context object:
//! an immutable descriptor table (see [`crate::describe`]) paired with one
//! mutable state slot per representable signal number. Registration calls
//! mutate slots and install the OS-level handler; the handler only ever
//! reads. No locking protects the slots, so callers must ensure registration
//! happens-before any signal delivery it is meant to govern.
//!
//! Tests may build isolated [`SignalRegistry`] instances and exercise every
//! non-installing operation on them; the installed handler is always backed
//! by the process-global instance returned by [`global_registry`].

use std::io;
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicUsize, Ordering};

use libc::c_int;

use crate::describe::{self, FATAL_SIGNALS};
use crate::{altstack, handler, SignalError};

/// Environment variable overriding the exit action for registration calls.
///
/// Recognized values are `EXIT`, `RETURN` and `RERAISE`. The variable is read
/// fresh on every registration call and overrides the caller-supplied action
/// for that call only; an unrecognized value fails the registration.
pub const EXIT_ACTION_ENV: &str = "SIGTRACE_EXIT_ACTION";

// Linux tops out at signal 64 inclusive.
pub(crate) const MAX_SIGNAL: usize = 65;

/// Disposition applied by the handler once diagnostics are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitAction {
    /// Terminate the process immediately with failure status, bypassing
    /// normal cleanup.
    Exit = 0,
    /// Return from the handler and resume the interrupted context. Only
    /// meaningful for continuable signals.
    Return = 1,
    /// Restore the default disposition and re-deliver the signal to self,
    /// e.g. to produce a core dump.
    Reraise = 2,
}

impl ExitAction {
    pub(crate) fn from_stored(value: u8) -> Option<ExitAction> {
        match value {
            0 => Some(ExitAction::Exit),
            1 => Some(ExitAction::Return),
            2 => Some(ExitAction::Reraise),
            _ => None,
        }
    }
}

/// Per-signal callback invoked by the handler after the backtrace.
///
/// Runs in signal context; the callback's own async-signal-safety is the
/// caller's obligation.
pub type SignalCallback = fn(c_int);

const NO_CALLBACK: usize = 0;

struct SignalState {
    action: AtomicU8,
    callback: AtomicUsize,
}

impl SignalState {
    const INIT: SignalState = SignalState {
        action: AtomicU8::new(ExitAction::Exit as u8),
        callback: AtomicUsize::new(NO_CALLBACK),
    };
}

/// Process-scoped signal configuration.
///
/// Holds one mutable state slot per representable signal number plus the
/// cached distributed rank. All mutation happens through registration calls
/// made outside signal context; the installed handler only reads.
pub struct SignalRegistry {
    states: [SignalState; MAX_SIGNAL],
    /// Cached distributed rank; negative while unknown.
    rank: AtomicI32,
}

static GLOBAL: SignalRegistry = SignalRegistry::new();

/// Returns the process-global registry backing the installed handlers.
pub fn global_registry() -> &'static SignalRegistry {
    &GLOBAL
}

impl SignalRegistry {
    /// Creates an empty registry: every slot defaults to [`ExitAction::Exit`]
    /// with no callback, and no rank is cached.
    pub const fn new() -> SignalRegistry {
        SignalRegistry {
            states: [SignalState::INIT; MAX_SIGNAL],
            rank: AtomicI32::new(-1),
        }
    }

    fn state(&self, sig: c_int) -> Result<&SignalState, SignalError> {
        if describe::lookup_signal(sig).is_none() {
            return Err(SignalError::UnknownSignal(sig));
        }
        usize::try_from(sig)
            .ok()
            .and_then(|index| self.states.get(index))
            .ok_or(SignalError::UnknownSignal(sig))
    }

    /// Registers the diagnostic handler for `sig`.
    ///
    /// Stores the exit action (subject to the [`EXIT_ACTION_ENV`] override)
    /// and callback, installs the alternate signal stack on the first
    /// successful call, and installs the OS-level handler configured to block
    /// all signals during execution, restart interrupted system calls, run on
    /// the alternate stack, and receive extended fault info.
    pub fn register(
        &self,
        sig: c_int,
        action: ExitAction,
        callback: Option<SignalCallback>,
    ) -> Result<(), SignalError> {
        let state = self.state(sig)?;
        let action = effective_action(action)?;
        #[cfg(feature = "rank")]
        self.cache_rank();
        state.action.store(action as u8, Ordering::SeqCst);
        state.callback.store(
            callback.map_or(NO_CALLBACK, |callback| callback as usize),
            Ordering::SeqCst,
        );
        altstack::ensure_installed().map_err(SignalError::AltStack)?;
        // SAFETY: dispatch matches the SA_SIGINFO handler signature and the
        // sigaction struct is fully initialized below.
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = handler::dispatch as usize;
            libc::sigfillset(&mut sa.sa_mask);
            sa.sa_flags = libc::SA_RESTART | libc::SA_SIGINFO | libc::SA_ONSTACK;
            if libc::sigaction(sig, &sa, std::ptr::null_mut()) != 0 {
                return Err(SignalError::HandlerInstall {
                    signal: sig,
                    source: io::Error::last_os_error(),
                });
            }
        }
        log::debug!("installed diagnostic handler for signal {sig} with {action:?}");
        Ok(())
    }

    /// Registers the diagnostic handler for each signal in `sigs`, in order.
    ///
    /// Stops at the first failure; prior successful registrations stay in
    /// effect. There is deliberately no rollback.
    pub fn register_many(
        &self,
        sigs: &[c_int],
        action: ExitAction,
        callback: Option<SignalCallback>,
    ) -> Result<(), SignalError> {
        for &sig in sigs {
            self.register(sig, action, callback)?;
        }
        Ok(())
    }

    /// Registers the diagnostic handler, with [`ExitAction::Exit`] and no
    /// callback, for every platform signal that terminates or dumps core by
    /// default.
    pub fn register_fatal_defaults(&self) -> Result<(), SignalError> {
        self.register_many(FATAL_SIGNALS, ExitAction::Exit, None)
    }

    /// Replaces the callback stored for `sig`.
    ///
    /// Only mutates the stored field; it neither requires nor installs a
    /// handler. Fails only if `sig` is unknown.
    pub fn set_callback(&self, sig: c_int, callback: SignalCallback) -> Result<(), SignalError> {
        self.state(sig)?
            .callback
            .store(callback as usize, Ordering::SeqCst);
        Ok(())
    }

    /// Removes any callback stored for `sig`.
    pub fn clear_callback(&self, sig: c_int) -> Result<(), SignalError> {
        self.state(sig)?.callback.store(NO_CALLBACK, Ordering::SeqCst);
        Ok(())
    }

    /// Replaces the exit action stored for `sig`.
    ///
    /// Only mutates the stored field; the [`EXIT_ACTION_ENV`] override does
    /// not apply here. Fails only if `sig` is unknown.
    pub fn set_exit_action(&self, sig: c_int, action: ExitAction) -> Result<(), SignalError> {
        self.state(sig)?.action.store(action as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Returns the exit action currently stored for `sig`.
    pub fn exit_action(&self, sig: c_int) -> Result<ExitAction, SignalError> {
        let stored = self.state(sig)?.action.load(Ordering::SeqCst);
        match ExitAction::from_stored(stored) {
            Some(action) => Ok(action),
            // Slots only ever hold bytes written from an ExitAction.
            None => unreachable!("corrupt exit-action byte {stored} for signal {sig}"),
        }
    }

    pub(crate) fn stored_action(&self, sig: c_int) -> Option<ExitAction> {
        let index = usize::try_from(sig).ok()?;
        let stored = self.states.get(index)?.action.load(Ordering::SeqCst);
        ExitAction::from_stored(stored)
    }

    pub(crate) fn stored_callback(&self, sig: c_int) -> Option<SignalCallback> {
        let index = usize::try_from(sig).ok()?;
        let raw = self.states.get(index)?.callback.load(Ordering::SeqCst);
        if raw == NO_CALLBACK {
            return None;
        }
        // SAFETY: the slot only ever holds a SignalCallback stored by
        // register/set_callback.
        Some(unsafe { std::mem::transmute::<usize, SignalCallback>(raw) })
    }

    pub(crate) fn rank(&self) -> Option<i32> {
        let rank = self.rank.load(Ordering::SeqCst);
        (rank >= 0).then_some(rank)
    }

    /// Queries and caches the distributed rank. Retried on each registration
    /// until the runtime reports one.
    #[cfg(feature = "rank")]
    fn cache_rank(&self) {
        if self.rank.load(Ordering::SeqCst) < 0 {
            if let Some(rank) = crate::rank::query_rank() {
                self.rank.store(rank, Ordering::SeqCst);
            }
        }
    }
}

impl Default for SignalRegistry {
    fn default() -> SignalRegistry {
        SignalRegistry::new()
    }
}

fn parse_override(value: &str) -> Option<ExitAction> {
    match value {
        "EXIT" => Some(ExitAction::Exit),
        "RETURN" => Some(ExitAction::Return),
        "RERAISE" => Some(ExitAction::Reraise),
        _ => None,
    }
}

/// Resolves the exit action for one registration call, consulting the
/// environment override fresh each time.
fn effective_action(requested: ExitAction) -> Result<ExitAction, SignalError> {
    match std::env::var(EXIT_ACTION_ENV) {
        Ok(value) => parse_override(&value).ok_or_else(|| {
            log::warn!("rejecting registration: {EXIT_ACTION_ENV}={value:?} is not recognized");
            SignalError::InvalidOverride(value)
        }),
        Err(std::env::VarError::NotPresent) => Ok(requested),
        Err(std::env::VarError::NotUnicode(raw)) => Err(SignalError::InvalidOverride(
            raw.to_string_lossy().into_owned(),
        )),
    }
}

/// Registers the diagnostic handler for `sig` on the process-global
/// registry. See [`SignalRegistry::register`].
pub fn register(
    sig: c_int,
    action: ExitAction,
    callback: Option<SignalCallback>,
) -> Result<(), SignalError> {
    GLOBAL.register(sig, action, callback)
}

/// Registers several signals on the process-global registry. See
/// [`SignalRegistry::register_many`].
pub fn register_many(
    sigs: &[c_int],
    action: ExitAction,
    callback: Option<SignalCallback>,
) -> Result<(), SignalError> {
    GLOBAL.register_many(sigs, action, callback)
}

/// Registers all fatal platform signals on the process-global registry. See
/// [`SignalRegistry::register_fatal_defaults`].
pub fn register_fatal_defaults() -> Result<(), SignalError> {
    GLOBAL.register_fatal_defaults()
}

/// Replaces the callback for `sig` on the process-global registry. See
/// [`SignalRegistry::set_callback`].
pub fn set_callback(sig: c_int, callback: SignalCallback) -> Result<(), SignalError> {
    GLOBAL.set_callback(sig, callback)
}

/// Removes the callback for `sig` on the process-global registry. See
/// [`SignalRegistry::clear_callback`].
pub fn clear_callback(sig: c_int) -> Result<(), SignalError> {
    GLOBAL.clear_callback(sig)
}

/// Replaces the exit action for `sig` on the process-global registry. See
/// [`SignalRegistry::set_exit_action`].
pub fn set_exit_action(sig: c_int, action: ExitAction) -> Result<(), SignalError> {
    GLOBAL.set_exit_action(sig, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_sig: c_int) {}

    #[test]
    fn test_unknown_signal_is_rejected() {
        let registry = SignalRegistry::new();
        assert!(matches!(
            registry.register(4096, ExitAction::Exit, None),
            Err(SignalError::UnknownSignal(4096))
        ));
        assert!(matches!(
            registry.set_exit_action(0, ExitAction::Return),
            Err(SignalError::UnknownSignal(0))
        ));
        assert!(matches!(
            registry.set_callback(-3, noop),
            Err(SignalError::UnknownSignal(-3))
        ));
    }

    #[test]
    fn test_stored_fields_reflect_latest_write() {
        let registry = SignalRegistry::new();
        assert_eq!(
            registry.exit_action(libc::SIGUSR1).unwrap(),
            ExitAction::Exit
        );
        registry
            .set_exit_action(libc::SIGUSR1, ExitAction::Reraise)
            .unwrap();
        assert_eq!(
            registry.exit_action(libc::SIGUSR1).unwrap(),
            ExitAction::Reraise
        );
        registry
            .set_exit_action(libc::SIGUSR1, ExitAction::Return)
            .unwrap();
        assert_eq!(
            registry.exit_action(libc::SIGUSR1).unwrap(),
            ExitAction::Return
        );
    }

    #[test]
    fn test_register_many_keeps_applied_prefix() {
        let registry = SignalRegistry::new();
        // The bogus middle entry stops the batch; SIGUSR1 was already
        // registered and deliberately stays that way, SIGUSR2 is untouched.
        let err = registry
            .register_many(&[libc::SIGUSR1, 4096, libc::SIGUSR2], ExitAction::Return, None)
            .unwrap_err();
        assert!(matches!(err, SignalError::UnknownSignal(4096)));
        assert_eq!(
            registry.exit_action(libc::SIGUSR1).unwrap(),
            ExitAction::Return
        );
        assert_eq!(
            registry.exit_action(libc::SIGUSR2).unwrap(),
            ExitAction::Exit
        );
    }

    #[test]
    fn test_callback_slot_roundtrip() {
        let registry = SignalRegistry::new();
        assert!(registry.stored_callback(libc::SIGUSR2).is_none());
        registry.set_callback(libc::SIGUSR2, noop).unwrap();
        let stored = registry.stored_callback(libc::SIGUSR2).unwrap();
        assert_eq!(stored as usize, noop as usize);
        registry.clear_callback(libc::SIGUSR2).unwrap();
        assert!(registry.stored_callback(libc::SIGUSR2).is_none());
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(parse_override("EXIT"), Some(ExitAction::Exit));
        assert_eq!(parse_override("RETURN"), Some(ExitAction::Return));
        assert_eq!(parse_override("RERAISE"), Some(ExitAction::Reraise));
        assert_eq!(parse_override("exit"), None);
        assert_eq!(parse_override("EXITANYTHING"), None);
        assert_eq!(parse_override(""), None);
    }

    #[test]
    fn test_rank_defaults_to_absent() {
        let registry = SignalRegistry::new();
        assert_eq!(registry.rank(), None);
    }
}
