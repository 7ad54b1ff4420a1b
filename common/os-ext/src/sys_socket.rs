use {
    crate::retry_on_eintr,
    std::{
        io,
        os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
    },
};

/// Call socketpair(2) with the given arguments.
pub fn socketpair(
    domain: libc::c_int,
    type_:  libc::c_int,
    protocol: libc::c_int,
) -> io::Result<(OwnedFd, OwnedFd)>
{
    let type_ = type_ | libc::SOCK_CLOEXEC;

    let mut sv = [-1; 2];
    // SAFETY: sv is sufficiently large.
    let result = unsafe {
        libc::socketpair(domain, type_, protocol, sv.as_mut_ptr())
    };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok((
        // SAFETY: These file descriptors are fresh.
        unsafe { OwnedFd::from_raw_fd(sv[0]) },
        unsafe { OwnedFd::from_raw_fd(sv[1]) },
    ))
}

/// Call shutdown(2) with the given arguments.
pub fn shutdown(sockfd: BorrowedFd, how: libc::c_int) -> io::Result<()>
{
    retry_on_eintr(|| {
        // SAFETY: This is always safe.
        let result = unsafe { libc::shutdown(sockfd.as_raw_fd(), how) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    })
}

/// Call sendmsg(2) with the given arguments.
///
/// Returns the number of bytes sent.
/// `EINTR` is not retried; see the crate documentation.
///
/// # Safety
///
/// Every pointer in `msg` must be valid for the length stored next to it.
pub unsafe fn sendmsg(
    sockfd: BorrowedFd,
    msg:    &libc::msghdr,
    flags:  libc::c_int,
) -> io::Result<usize>
{
    let nsent = libc::sendmsg(sockfd.as_raw_fd(), msg, flags);

    if nsent == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(nsent as usize)
}

/// Call recvmsg(2) with the given arguments.
///
/// The `MSG_CMSG_CLOEXEC` flag is added implicitly,
/// so any descriptors received through `SCM_RIGHTS` have `FD_CLOEXEC` set.
/// Returns the number of bytes received.
/// `EINTR` is not retried; see the crate documentation.
///
/// # Safety
///
/// Every pointer in `msg` must be valid for writes
/// of the length stored next to it.
pub unsafe fn recvmsg(
    sockfd: BorrowedFd,
    msg:    &mut libc::msghdr,
    flags:  libc::c_int,
) -> io::Result<usize>
{
    let flags = flags | libc::MSG_CMSG_CLOEXEC;

    let nrecv = libc::recvmsg(sockfd.as_raw_fd(), msg, flags);

    if nrecv == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(nrecv as usize)
}
