use {
    crate::retry_on_eintr,
    std::{
        io,
        os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
    },
};

/// Call signalfd(2) with `-1` to create a new signal file descriptor.
pub fn signalfd(mask: &libc::sigset_t, flags: libc::c_int) -> io::Result<OwnedFd>
{
    let flags = flags | libc::SFD_CLOEXEC;

    retry_on_eintr(|| {
        // SAFETY: mask points to a valid signal set.
        let fd = unsafe { libc::signalfd(-1, mask, flags) };

        if fd == -1 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: fd is a new, open file descriptor.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    })
}

/// Call signalfd(2) to replace the mask of an existing signal file descriptor.
pub fn signalfd_set_mask(fd: BorrowedFd, mask: &libc::sigset_t)
    -> io::Result<()>
{
    retry_on_eintr(|| {
        // SAFETY: mask points to a valid signal set.
        // Flags are ignored when modifying an existing descriptor.
        let result = unsafe { libc::signalfd(fd.as_raw_fd(), mask, 0) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    })
}
