//! Signal mask and disposition helpers.
//!
//! Signal masks are per thread.
//! All functions here operate on the mask of the calling thread;
//! threads spawned afterwards inherit it.

use {
    os_ext::{
        SIG_BLOCK, SIG_UNBLOCK,
        pthread_sigmask, sigaddset, sigdelset, sigemptyset, sigfillset,
        sigismember, sigpending, sigset_t, sigtimedwait,
    },
    std::{io, time::Duration},
};

/// Signal mask of the calling thread.
pub fn signal_mask() -> io::Result<sigset_t>
{
    pthread_sigmask(SIG_BLOCK, None)
}

/// Whether `signal` is blocked in the calling thread.
pub fn is_signal_blocked(signal: libc::c_int) -> io::Result<bool>
{
    sigismember(&signal_mask()?, signal)
}

/// Whether `signal` is pending for the calling thread or the process.
pub fn is_signal_pending(signal: libc::c_int) -> io::Result<bool>
{
    sigismember(&sigpending()?, signal)
}

/// Block `signal` in the calling thread.
pub fn signal_block(signal: libc::c_int) -> io::Result<()>
{
    change_signal(SIG_BLOCK, signal)
}

/// Unblock `signal` in the calling thread.
pub fn signal_unblock(signal: libc::c_int) -> io::Result<()>
{
    change_signal(SIG_UNBLOCK, signal)
}

fn change_signal(how: libc::c_int, signal: libc::c_int) -> io::Result<()>
{
    let mut set = sigemptyset();
    sigaddset(&mut set, signal)?;
    pthread_sigmask(how, Some(&set))?;
    Ok(())
}

/// Block every signal except the given ones.
///
/// Signals that are already blocked stay blocked,
/// even if they are listed.
pub fn signal_block_all_except(signals: &[libc::c_int]) -> io::Result<()>
{
    let mut set = sigfillset();
    for &signal in signals {
        sigdelset(&mut set, signal)?;
    }
    pthread_sigmask(SIG_BLOCK, Some(&set))?;
    Ok(())
}

/// Wait for a pending instance of `signal` and consume it.
///
/// The signal should be blocked, or it may be delivered
/// to its handler instead.
/// Returns whether a signal was consumed before the timeout.
/// A zero timeout only checks for an already pending signal.
pub fn wait_for_signal(signal: libc::c_int, timeout: Duration)
    -> io::Result<bool>
{
    let mut set = sigemptyset();
    sigaddset(&mut set, signal)?;

    let timeout = libc::timespec{
        tv_sec: timeout.as_secs().try_into().unwrap_or(libc::time_t::MAX),
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };

    Ok(sigtimedwait(&set, &timeout)?.is_some())
}

/// Set the disposition of each of the given signals to `SIG_IGN`.
///
/// Returns the previous actions, so that they can be restored
/// with [`signal_set`].
pub fn signal_ignore(signals: &[libc::c_int])
    -> io::Result<Vec<(libc::c_int, libc::sigaction)>>
{
    // SAFETY: An all-zero sigaction is valid.
    let mut act: libc::sigaction = unsafe { std::mem::zeroed() };
    act.sa_sigaction = libc::SIG_IGN;
    act.sa_mask = sigemptyset();

    signals.iter()
        .map(|&signal| Ok((signal, os_ext::sigaction(signal, &act)?)))
        .collect()
}

/// Install `action` for `signal` and return the previous action.
pub fn signal_set(signal: libc::c_int, action: &libc::sigaction)
    -> io::Result<libc::sigaction>
{
    os_ext::sigaction(signal, action)
}

/// Send `signal` to the process `pid`.
pub fn send_signal(pid: libc::pid_t, signal: libc::c_int) -> io::Result<()>
{
    os_ext::kill(pid, signal)
}
