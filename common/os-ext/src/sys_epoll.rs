use {
    crate::retry_on_eintr,
    std::{
        io,
        os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
    },
};

/// Call epoll_create1(2) with the given flags.
pub fn epoll_create1(flags: libc::c_int) -> io::Result<OwnedFd>
{
    let flags = flags | libc::EPOLL_CLOEXEC;

    // SAFETY: This is always safe.
    let fd = unsafe { libc::epoll_create1(flags) };

    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: fd is a new, open file descriptor.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Call epoll_ctl(2) with the given arguments.
///
/// For `EPOLL_CTL_DEL`, `event` may be [`None`].
pub fn epoll_ctl(
    epfd:  BorrowedFd,
    op:    libc::c_int,
    fd:    libc::c_int,
    event: Option<libc::epoll_event>,
) -> io::Result<()>
{
    let mut event = event;

    retry_on_eintr(|| {
        let event = event.as_mut()
            .map_or(std::ptr::null_mut(), |e| e as *mut libc::epoll_event);

        // SAFETY: event is null or points to a valid epoll_event.
        let result = unsafe { libc::epoll_ctl(epfd.as_raw_fd(), op, fd, event) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    })
}

/// Call epoll_wait(2) with the given arguments.
///
/// Returns the number of events written to the start of `events`.
/// `EINTR` is not retried; see the crate documentation.
pub fn epoll_wait(
    epfd:    BorrowedFd,
    events:  &mut [libc::epoll_event],
    timeout: libc::c_int,
) -> io::Result<usize>
{
    let maxevents = events.len().min(libc::c_int::MAX as usize) as libc::c_int;

    // SAFETY: events is valid for maxevents entries.
    let result = unsafe {
        libc::epoll_wait(epfd.as_raw_fd(), events.as_mut_ptr(), maxevents, timeout)
    };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(result as usize)
}
