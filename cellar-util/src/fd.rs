//! Descriptor housekeeping.

use {
    log::error,
    os_ext::{
        FD_CLOEXEC, O_NONBLOCK, SHUT_RDWR,
        close, dup3, fcntl_getfd, fcntl_getfl, fcntl_setfd, fcntl_setfl,
        getrlimit, setrlimit,
    },
    std::{
        fs, io,
        os::unix::io::{AsRawFd, BorrowedFd, OwnedFd, RawFd},
    },
};

/// Close a descriptor, if there is one.
///
/// Never fails; a failing close(2) is logged.
/// `EINTR` is not retried, because Linux releases the descriptor
/// before reporting the interruption.
pub fn release(fd: Option<OwnedFd>)
{
    let Some(fd) = fd else { return };
    let raw_fd = fd.as_raw_fd();

    match close(fd) {
        Ok(()) => (),
        Err(err) if err.kind() == io::ErrorKind::Interrupted => (),
        Err(err) => error!("Error closing fd {raw_fd}: {err}"),
    }
}

/// Shut down both directions of a socket.
pub fn shutdown(fd: BorrowedFd) -> io::Result<()>
{
    os_ext::shutdown(fd, SHUT_RDWR)
}

/// Set or clear `FD_CLOEXEC` on a descriptor.
pub fn set_close_on_exec(fd: BorrowedFd, close_on_exec: bool) -> io::Result<()>
{
    let flags = fcntl_getfd(fd)?;
    fcntl_setfd(fd, toggle(flags, FD_CLOEXEC, close_on_exec))
}

/// Set or clear `O_NONBLOCK` on a descriptor.
///
/// The deadline-bounded operations in this crate
/// require non-blocking descriptors to honor their timeouts.
pub fn set_non_blocking(fd: BorrowedFd, non_blocking: bool) -> io::Result<()>
{
    let flags = fcntl_getfl(fd)?;
    fcntl_setfl(fd, toggle(flags, O_NONBLOCK, non_blocking))
}

fn toggle(flags: libc::c_int, flag: libc::c_int, set: bool) -> libc::c_int
{
    if set { flags | flag } else { flags & !flag }
}

/// Duplicate `old` onto the descriptor number `new`.
///
/// If `new` was open it is closed first, atomically.
pub fn dup2(old: BorrowedFd, new: RawFd, close_on_exec: bool)
    -> io::Result<OwnedFd>
{
    let flags = if close_on_exec { libc::O_CLOEXEC } else { 0 };
    dup3(old, new, flags)
}

/// The soft limit on the number of open descriptors.
pub fn max_fd_number() -> io::Result<u64>
{
    let rlim = getrlimit(libc::RLIMIT_NOFILE as libc::c_int)?;
    Ok(rlim.rlim_cur as u64)
}

/// Set both limits on the number of open descriptors.
pub fn set_max_fd_number(limit: u64) -> io::Result<()>
{
    let limit = limit as libc::rlim_t;
    let rlim = libc::rlimit{rlim_cur: limit, rlim_max: limit};
    setrlimit(libc::RLIMIT_NOFILE as libc::c_int, &rlim)
}

/// The number of descriptors currently open in this process.
///
/// The descriptor used to list `/proc/self/fd` is included in the count.
pub fn fd_count() -> io::Result<usize>
{
    let mut count = 0;
    for entry in fs::read_dir("/proc/self/fd")? {
        entry?;
        count += 1;
    }
    Ok(count)
}
