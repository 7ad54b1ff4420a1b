use {
    crate::retry_on_eintr,
    std::{io, os::unix::io::{AsRawFd, BorrowedFd}},
};

/// Call fcntl(2) with `F_GETFD`.
pub fn fcntl_getfd(fd: BorrowedFd) -> io::Result<libc::c_int>
{
    fcntl_get(fd, libc::F_GETFD)
}

/// Call fcntl(2) with `F_SETFD` and the given flags.
pub fn fcntl_setfd(fd: BorrowedFd, flags: libc::c_int) -> io::Result<()>
{
    fcntl_set(fd, libc::F_SETFD, flags)
}

/// Call fcntl(2) with `F_GETFL`.
pub fn fcntl_getfl(fd: BorrowedFd) -> io::Result<libc::c_int>
{
    fcntl_get(fd, libc::F_GETFL)
}

/// Call fcntl(2) with `F_SETFL` and the given flags.
pub fn fcntl_setfl(fd: BorrowedFd, flags: libc::c_int) -> io::Result<()>
{
    fcntl_set(fd, libc::F_SETFL, flags)
}

fn fcntl_get(fd: BorrowedFd, cmd: libc::c_int) -> io::Result<libc::c_int>
{
    retry_on_eintr(|| {
        // SAFETY: The get commands take no argument.
        let result = unsafe { libc::fcntl(fd.as_raw_fd(), cmd) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(result)
    })
}

fn fcntl_set(fd: BorrowedFd, cmd: libc::c_int, flags: libc::c_int)
    -> io::Result<()>
{
    retry_on_eintr(|| {
        // SAFETY: The set commands take an int argument.
        let result = unsafe { libc::fcntl(fd.as_raw_fd(), cmd, flags) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    })
}
