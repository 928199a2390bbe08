//! Signal descriptions and diagnostic rendering.
//!
//! Static tables describe every platform-supported signal plus the `si_code`
//! sub-reasons (one generic table, one per signal family), and
//! [`describe_signal`] renders them to a file descriptor using only the
//! allocation-free primitives from [`crate::output`]. Everything here is safe
//! to call from a signal handler.

use std::os::unix::io::RawFd;

use libc::c_int;

use crate::output::{format_int, write_str};

/// Description of one platform-supported signal.
pub struct SignalDescriptor {
    /// Signal number.
    pub num: c_int,
    /// Short name, without the `SIG` prefix.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

/// Description of one `si_code` value.
struct SignalCode {
    num: c_int,
    name: &'static str,
    description: &'static str,
}

const fn sig(num: c_int, name: &'static str, description: &'static str) -> SignalDescriptor {
    SignalDescriptor {
        num,
        name,
        description,
    }
}

const fn code(num: c_int, name: &'static str, description: &'static str) -> SignalCode {
    SignalCode {
        num,
        name,
        description,
    }
}

#[cfg(target_os = "linux")]
mod tables {
    use super::{code, sig, SignalCode, SignalDescriptor};
    use libc::c_int;

    /// Every signal this build knows how to describe.
    pub static SIGNALS: &[SignalDescriptor] = &[
        sig(libc::SIGABRT, "ABRT", "Abort signal"),
        sig(libc::SIGALRM, "ALRM", "Timer signal"),
        sig(libc::SIGBUS, "BUS", "Bus error"),
        sig(libc::SIGCHLD, "CHLD", "Child stopped or terminated"),
        sig(libc::SIGCONT, "CONT", "Continue if stopped"),
        sig(libc::SIGFPE, "FPE", "Floating-point exception"),
        sig(libc::SIGHUP, "HUP", "Hangup detected"),
        sig(libc::SIGILL, "ILL", "Illegal instruction"),
        sig(libc::SIGINT, "INT", "Interrupt"),
        // SIGPOLL is the same number; one entry covers both names.
        sig(libc::SIGIO, "IO", "I/O now possible"),
        sig(libc::SIGKILL, "KILL", "Kill"),
        sig(libc::SIGPIPE, "PIPE", "Broken pipe"),
        sig(libc::SIGPROF, "PROF", "Profiling timer expired"),
        sig(libc::SIGPWR, "PWR", "Power failure"),
        sig(libc::SIGQUIT, "QUIT", "Quit"),
        sig(libc::SIGSEGV, "SEGV", "Invalid memory reference"),
        sig(libc::SIGSTKFLT, "STKFLT", "Stack fault on coprocessor"),
        sig(libc::SIGSTOP, "STOP", "Stop process"),
        sig(libc::SIGSYS, "SYS", "Bad system call"),
        sig(libc::SIGTERM, "TERM", "Terminate"),
        sig(libc::SIGTRAP, "TRAP", "Trace/breakpoint trap"),
        sig(libc::SIGTSTP, "TSTP", "Stop typed at terminal"),
        sig(libc::SIGTTIN, "TTIN", "Terminal input for background process"),
        sig(libc::SIGTTOU, "TTOU", "Terminal output for background process"),
        sig(libc::SIGURG, "URG", "Urgent condition on socket"),
        sig(libc::SIGUSR1, "USR1", "User-defined signal 1"),
        sig(libc::SIGUSR2, "USR2", "User-defined signal 2"),
        sig(libc::SIGVTALRM, "VTALRM", "Virtual alarm clock"),
        sig(libc::SIGWINCH, "WINCH", "Window resize"),
        sig(libc::SIGXCPU, "XCPU", "CPU time limit exceeded"),
        sig(libc::SIGXFSZ, "XFSZ", "File size limit exceeded"),
    ];

    /// Signals whose default disposition terminates or dumps core.
    pub static FATAL_SIGNALS: &[c_int] = &[
        libc::SIGABRT,
        libc::SIGALRM,
        libc::SIGBUS,
        libc::SIGFPE,
        libc::SIGHUP,
        libc::SIGILL,
        libc::SIGINT,
        libc::SIGIO,
        libc::SIGPIPE,
        libc::SIGPROF,
        libc::SIGPWR,
        libc::SIGQUIT,
        libc::SIGSEGV,
        libc::SIGSTKFLT,
        libc::SIGSYS,
        libc::SIGTERM,
        libc::SIGTRAP,
        libc::SIGUSR1,
        libc::SIGUSR2,
        libc::SIGVTALRM,
        libc::SIGXCPU,
        libc::SIGXFSZ,
    ];

    // Generic si_code values from the kernel ABI. The libc crate's coverage
    // of these is spotty across targets, so they are spelled out here.
    pub const SI_USER: c_int = 0;
    pub const SI_KERNEL: c_int = 0x80;
    pub const SI_QUEUE: c_int = -1;
    const SI_TIMER: c_int = -2;
    const SI_MESGQ: c_int = -3;
    const SI_ASYNCIO: c_int = -4;
    const SI_SIGIO: c_int = -5;
    const SI_TKILL: c_int = -6;

    /// Cross-signal si_code causes.
    pub static GENERIC_CODES: &[SignalCode] = &[
        code(SI_USER, "USER", "Signal sent via kill"),
        code(SI_KERNEL, "KERNEL", "Signal sent by the kernel"),
        code(SI_QUEUE, "QUEUE", "Signal sent via sigqueue"),
        code(SI_TIMER, "TIMER", "POSIX timer expired"),
        code(SI_MESGQ, "MESGQ", "POSIX message queue state changed"),
        code(SI_ASYNCIO, "ASYNCIO", "AIO completed"),
        code(SI_SIGIO, "SIGIO", "Queued SIGIO"),
        code(SI_TKILL, "TKILL", "Signal sent via tkill/tgkill"),
    ];

    pub static SYS_CODES: &[SignalCode] =
        &[code(1, "SECCOMP", "Triggered by seccomp filter rule")];
}

#[cfg(not(target_os = "linux"))]
mod tables {
    use super::{code, sig, SignalCode, SignalDescriptor};
    use libc::c_int;

    /// Every signal this build knows how to describe.
    pub static SIGNALS: &[SignalDescriptor] = &[
        sig(libc::SIGABRT, "ABRT", "Abort signal"),
        sig(libc::SIGALRM, "ALRM", "Timer signal"),
        sig(libc::SIGBUS, "BUS", "Bus error"),
        sig(libc::SIGCHLD, "CHLD", "Child stopped or terminated"),
        sig(libc::SIGCONT, "CONT", "Continue if stopped"),
        sig(libc::SIGEMT, "EMT", "Emulator trap"),
        sig(libc::SIGFPE, "FPE", "Floating-point exception"),
        sig(libc::SIGHUP, "HUP", "Hangup detected"),
        sig(libc::SIGILL, "ILL", "Illegal instruction"),
        sig(libc::SIGINFO, "INFO", "Status request from keyboard"),
        sig(libc::SIGINT, "INT", "Interrupt"),
        sig(libc::SIGIO, "IO", "I/O now possible"),
        sig(libc::SIGKILL, "KILL", "Kill"),
        sig(libc::SIGPIPE, "PIPE", "Broken pipe"),
        sig(libc::SIGPROF, "PROF", "Profiling timer expired"),
        sig(libc::SIGQUIT, "QUIT", "Quit"),
        sig(libc::SIGSEGV, "SEGV", "Invalid memory reference"),
        sig(libc::SIGSTOP, "STOP", "Stop process"),
        sig(libc::SIGSYS, "SYS", "Bad system call"),
        sig(libc::SIGTERM, "TERM", "Terminate"),
        sig(libc::SIGTRAP, "TRAP", "Trace/breakpoint trap"),
        sig(libc::SIGTSTP, "TSTP", "Stop typed at terminal"),
        sig(libc::SIGTTIN, "TTIN", "Terminal input for background process"),
        sig(libc::SIGTTOU, "TTOU", "Terminal output for background process"),
        sig(libc::SIGURG, "URG", "Urgent condition on socket"),
        sig(libc::SIGUSR1, "USR1", "User-defined signal 1"),
        sig(libc::SIGUSR2, "USR2", "User-defined signal 2"),
        sig(libc::SIGVTALRM, "VTALRM", "Virtual alarm clock"),
        sig(libc::SIGWINCH, "WINCH", "Window resize"),
        sig(libc::SIGXCPU, "XCPU", "CPU time limit exceeded"),
        sig(libc::SIGXFSZ, "XFSZ", "File size limit exceeded"),
    ];

    /// Signals whose default disposition terminates or dumps core.
    pub static FATAL_SIGNALS: &[c_int] = &[
        libc::SIGABRT,
        libc::SIGALRM,
        libc::SIGBUS,
        libc::SIGEMT,
        libc::SIGFPE,
        libc::SIGHUP,
        libc::SIGILL,
        libc::SIGINT,
        libc::SIGIO,
        libc::SIGPIPE,
        libc::SIGPROF,
        libc::SIGQUIT,
        libc::SIGSEGV,
        libc::SIGSYS,
        libc::SIGTERM,
        libc::SIGTRAP,
        libc::SIGUSR1,
        libc::SIGUSR2,
        libc::SIGVTALRM,
        libc::SIGXCPU,
        libc::SIGXFSZ,
    ];

    // Generic si_code values as numbered on the BSDs and macOS.
    pub const SI_USER: c_int = 0x10001;
    pub const SI_QUEUE: c_int = 0x10002;
    const SI_TIMER: c_int = 0x10003;
    const SI_ASYNCIO: c_int = 0x10004;
    const SI_MESGQ: c_int = 0x10005;

    /// Cross-signal si_code causes.
    pub static GENERIC_CODES: &[SignalCode] = &[
        code(SI_USER, "USER", "Signal sent via kill"),
        code(SI_QUEUE, "QUEUE", "Signal sent via sigqueue"),
        code(SI_TIMER, "TIMER", "POSIX timer expired"),
        code(SI_ASYNCIO, "ASYNCIO", "AIO completed"),
        code(SI_MESGQ, "MESGQ", "POSIX message queue state changed"),
    ];

    pub static SYS_CODES: &[SignalCode] = &[];
}

pub use tables::{FATAL_SIGNALS, SIGNALS};

// Per-family si_code values; these are common across POSIX-like systems.

static ILL_CODES: &[SignalCode] = &[
    code(1, "ILLOPC", "Illegal opcode"),
    code(2, "ILLOPN", "Illegal operand"),
    code(3, "ILLADR", "Illegal addressing mode"),
    code(4, "ILLTRP", "Illegal trap"),
    code(5, "PRVOPC", "Privileged opcode"),
    code(6, "PRVREG", "Privileged register"),
    code(7, "COPROC", "Coprocessor error"),
    code(8, "BADSTK", "Internal stack error"),
];

static FPE_CODES: &[SignalCode] = &[
    code(1, "INTDIV", "Integer divide by zero"),
    code(2, "INTOVF", "Integer overflow"),
    code(3, "FLTDIV", "Floating-point divide by zero"),
    code(4, "FLTOVF", "Floating-point overflow"),
    code(5, "FLTUND", "Floating-point underflow"),
    code(6, "FLTRES", "Floating-point inexact result"),
    code(7, "FLTINV", "Floating-point invalid operation"),
    code(8, "FLTSUB", "Subscript out of range"),
];

static SEGV_CODES: &[SignalCode] = &[
    code(1, "MAPERR", "Address not mapped to object"),
    code(2, "ACCERR", "Invalid permissions for mapped object"),
    code(3, "BNDERR", "Failed address bound checks"),
    code(4, "PKUERR", "Access denied by memory protection keys"),
];

static BUS_CODES: &[SignalCode] = &[
    code(1, "ADRALN", "Invalid address alignment"),
    code(2, "ADRERR", "Nonexistent physical address"),
    code(3, "OBJERR", "Object-specific hardware error"),
    code(
        4,
        "MCEERR_AR",
        "Hardware memory error consumed on a machine check",
    ),
    code(
        5,
        "MCEERR_AO",
        "Hardware memory error detected in process but not consumed",
    ),
];

static TRAP_CODES: &[SignalCode] = &[
    code(1, "BRKPT", "Process breakpoint"),
    code(2, "TRACE", "Process trace trap"),
    code(3, "BRANCH", "Process taken branch trap"),
    code(4, "HWBKPT", "Hardware breakpoint/watchpoint"),
];

static POLL_CODES: &[SignalCode] = &[
    code(1, "IN", "Data input available"),
    code(2, "OUT", "Output buffers available"),
    code(3, "MSG", "Input message available"),
    code(4, "ERR", "I/O error"),
    code(5, "PRI", "High priority input available"),
    code(6, "HUP", "Device disconnected"),
];

/// Looks up the descriptor for a signal number.
pub fn lookup_signal(sig: c_int) -> Option<&'static SignalDescriptor> {
    SIGNALS.iter().find(|descriptor| descriptor.num == sig)
}

fn lookup_code(table: &'static [SignalCode], num: c_int) -> Option<&'static SignalCode> {
    table.iter().find(|code| code.num == num)
}

/// The family-specific code table for a signal, plus whether the family
/// delivers a fault address worth printing.
fn family(sig: c_int) -> Option<(&'static [SignalCode], bool)> {
    match sig {
        libc::SIGILL => Some((ILL_CODES, true)),
        libc::SIGFPE => Some((FPE_CODES, true)),
        libc::SIGSEGV => Some((SEGV_CODES, true)),
        libc::SIGBUS => Some((BUS_CODES, true)),
        libc::SIGTRAP => Some((TRAP_CODES, true)),
        libc::SIGIO => Some((POLL_CODES, false)),
        libc::SIGSYS => Some((tables::SYS_CODES, false)),
        _ => None,
    }
}

#[cfg(target_os = "linux")]
fn source_pid(info: &libc::siginfo_t) -> libc::pid_t {
    // SAFETY: only consulted for SI_USER/SI_QUEUE, where the kernel fills
    // the sender fields.
    unsafe { info.si_pid() }
}

#[cfg(target_os = "linux")]
fn source_uid(info: &libc::siginfo_t) -> libc::uid_t {
    // SAFETY: see source_pid.
    unsafe { info.si_uid() }
}

#[cfg(target_os = "linux")]
fn fault_addr(info: &libc::siginfo_t) -> usize {
    // SAFETY: only consulted for fault signals, where si_addr is valid.
    unsafe { info.si_addr() as usize }
}

#[cfg(not(target_os = "linux"))]
fn source_pid(info: &libc::siginfo_t) -> libc::pid_t {
    info.si_pid
}

#[cfg(not(target_os = "linux"))]
fn source_uid(info: &libc::siginfo_t) -> libc::uid_t {
    info.si_uid
}

#[cfg(not(target_os = "linux"))]
fn fault_addr(info: &libc::siginfo_t) -> usize {
    info.si_addr as usize
}

fn write_int(value: isize, base: u32, pad: usize, fd: RawFd) {
    let mut buf = [0u8; 72];
    if let Some(rendered) = format_int(value, &mut buf, base, pad) {
        write_str(rendered, fd);
    }
}

fn write_rank(rank: Option<i32>, fd: RawFd) {
    if let Some(rank) = rank {
        write_str(" on rank ", fd);
        write_int(rank as isize, 10, 0, fd);
    }
}

/// Renders the diagnostic description of `sig` to `fd`.
///
/// Emits a fallback line for signals without a descriptor; otherwise a header
/// with number, name, description, and optional rank, followed, when extended
/// fault info is present, by a generic `si_code` line (with source PID/UID
/// for kill- and sigqueue-originated signals) and a signal-family-specific
/// code line carrying a 12-digit hex fault address where the signal delivers
/// one.
///
/// This function is safe to call from a signal handler.
pub fn describe_signal(sig: c_int, info: Option<&libc::siginfo_t>, rank: Option<i32>, fd: RawFd) {
    let descriptor = match lookup_signal(sig) {
        Some(descriptor) => descriptor,
        None => {
            write_str("Received unknown signal ", fd);
            write_int(sig as isize, 10, 0, fd);
            write_rank(rank, fd);
            write_str("\n", fd);
            return;
        }
    };
    write_str("Received signal ", fd);
    write_int(sig as isize, 10, 0, fd);
    write_str(" ", fd);
    write_str(descriptor.name, fd);
    write_str(" - ", fd);
    write_str(descriptor.description, fd);
    write_rank(rank, fd);

    let info = match info {
        Some(info) => info,
        None => return,
    };
    let code_num = info.si_code;

    // Cross-signal causes first.
    let generic = lookup_code(tables::GENERIC_CODES, code_num);
    match generic {
        Some(generic) => {
            write_str("\n  ", fd);
            write_str(generic.name, fd);
            write_str(" - ", fd);
            write_str(generic.description, fd);
        }
        // The section boundary still needs its newline.
        None => write_str("\n", fd),
    }
    if code_num == tables::SI_USER || code_num == tables::SI_QUEUE {
        write_str(" - Source PID: ", fd);
        write_int(source_pid(info) as isize, 10, 0, fd);
        write_str(" - UID: ", fd);
        write_int(source_uid(info) as isize, 10, 0, fd);
    }

    // Then the family-specific cause, consulting only the table matching
    // the actual signal number.
    match family(sig) {
        Some((table, has_addr)) => {
            write_str("  ", fd);
            match lookup_code(table, code_num) {
                Some(code) => {
                    write_str(code.name, fd);
                    write_str(" - ", fd);
                    write_str(code.description, fd);
                }
                None if generic.is_none() => {
                    write_str("Unknown signal code ", fd);
                    write_int(code_num as isize, 10, 0, fd);
                }
                None => {}
            }
            if has_addr {
                write_str(" - Fault occurred at address 0x", fd);
                write_int(fault_addr(info) as isize, 16, 12, fd);
            }
            write_str("\n", fd);
        }
        None => {
            // No family detail; close the generic section if it printed.
            if generic.is_some() {
                write_str("\n", fd);
            }
        }
    }
}
