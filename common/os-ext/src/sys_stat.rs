use {
    crate::{retry_on_eintr, stat},
    std::{io, mem::MaybeUninit, os::unix::io::{AsRawFd, BorrowedFd}},
};

/// Call fstat(2) with the given arguments.
pub fn fstat(fd: BorrowedFd) -> io::Result<stat>
{
    let mut statbuf = MaybeUninit::uninit();

    retry_on_eintr(|| {
        // SAFETY: statbuf is large enough for a stat structure.
        let result = unsafe { libc::fstat(fd.as_raw_fd(), statbuf.as_mut_ptr()) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: fstat initialized statbuf.
        Ok(unsafe { statbuf.assume_init() })
    })
}
