//! Signal sets, signal masks, and signal delivery.

use std::{io, mem::MaybeUninit, ptr::{null, null_mut}};

/// Call sigemptyset(3) and return the empty set.
pub fn sigemptyset() -> libc::sigset_t
{
    let mut set = MaybeUninit::uninit();
    // SAFETY: sigemptyset cannot fail for a valid pointer.
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        set.assume_init()
    }
}

/// Call sigfillset(3) and return the full set.
pub fn sigfillset() -> libc::sigset_t
{
    let mut set = MaybeUninit::uninit();
    // SAFETY: sigfillset cannot fail for a valid pointer.
    unsafe {
        libc::sigfillset(set.as_mut_ptr());
        set.assume_init()
    }
}

/// Call sigaddset(3) with the given arguments.
pub fn sigaddset(set: &mut libc::sigset_t, signum: libc::c_int) -> io::Result<()>
{
    // SAFETY: set points to an initialized signal set.
    let result = unsafe { libc::sigaddset(set, signum) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call sigdelset(3) with the given arguments.
pub fn sigdelset(set: &mut libc::sigset_t, signum: libc::c_int) -> io::Result<()>
{
    // SAFETY: set points to an initialized signal set.
    let result = unsafe { libc::sigdelset(set, signum) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call sigismember(3) with the given arguments.
pub fn sigismember(set: &libc::sigset_t, signum: libc::c_int) -> io::Result<bool>
{
    // SAFETY: set points to an initialized signal set.
    let result = unsafe { libc::sigismember(set, signum) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(result == 1)
}

/// Call pthread_sigmask(3) with the given arguments.
///
/// If `set` is [`None`], the mask is not changed.
/// Returns the previous signal mask of the calling thread.
pub fn pthread_sigmask(how: libc::c_int, set: Option<&libc::sigset_t>)
    -> io::Result<libc::sigset_t>
{
    let set = set.map_or(null(), |set| set as *const libc::sigset_t);
    let mut oldset = MaybeUninit::uninit();

    // SAFETY: set is null or valid, oldset is large enough.
    let result = unsafe { libc::pthread_sigmask(how, set, oldset.as_mut_ptr()) };

    // pthread_sigmask returns the error number instead of setting errno.
    if result != 0 {
        return Err(io::Error::from_raw_os_error(result));
    }

    // SAFETY: pthread_sigmask initialized oldset.
    Ok(unsafe { oldset.assume_init() })
}

/// Call sigpending(2) and return the set of pending signals.
pub fn sigpending() -> io::Result<libc::sigset_t>
{
    let mut set = MaybeUninit::uninit();

    // SAFETY: set is large enough for a signal set.
    let result = unsafe { libc::sigpending(set.as_mut_ptr()) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: sigpending initialized set.
    Ok(unsafe { set.assume_init() })
}

/// Call sigtimedwait(2) with the given arguments.
///
/// Returns the number of the accepted signal,
/// or [`None`] if the timeout expired (`EAGAIN`).
/// `EINTR` is not retried; see the crate documentation.
pub fn sigtimedwait(set: &libc::sigset_t, timeout: &libc::timespec)
    -> io::Result<Option<libc::c_int>>
{
    // SAFETY: set and timeout are valid, info may be null.
    let result = unsafe { libc::sigtimedwait(set, null_mut(), timeout) };

    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EAGAIN) {
            return Ok(None);
        }
        return Err(err);
    }

    Ok(Some(result))
}

/// Call sigaction(2) with the given arguments.
///
/// Returns the previous action for the signal.
pub fn sigaction(signum: libc::c_int, act: &libc::sigaction)
    -> io::Result<libc::sigaction>
{
    let mut oldact = MaybeUninit::uninit();

    // SAFETY: act is valid, oldact is large enough.
    let result = unsafe { libc::sigaction(signum, act, oldact.as_mut_ptr()) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: sigaction initialized oldact.
    Ok(unsafe { oldact.assume_init() })
}

/// Call kill(2) with the given arguments.
pub fn kill(pid: libc::pid_t, sig: libc::c_int) -> io::Result<()>
{
    // SAFETY: This is always safe.
    let result = unsafe { libc::kill(pid, sig) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call raise(3) with the given signal.
///
/// The signal is directed at the calling thread.
pub fn raise(sig: libc::c_int) -> io::Result<()>
{
    // SAFETY: This is always safe.
    let result = unsafe { libc::raise(sig) };

    if result != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
