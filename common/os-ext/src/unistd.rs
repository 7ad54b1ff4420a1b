use std::{
    io,
    os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd},
};

/// Call close(2) on the given descriptor.
///
/// Unlike dropping an [`OwnedFd`], this reports the error.
/// `EINTR` is not retried, because Linux releases the descriptor
/// before reporting the interruption;
/// a retry could close a descriptor opened by another thread.
pub fn close(fd: OwnedFd) -> io::Result<()>
{
    // SAFETY: fd was owned and is not used afterwards.
    let result = unsafe { libc::close(fd.into_raw_fd()) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Call dup3(2) with the given arguments.
///
/// Unlike the other wrappers, the `O_CLOEXEC` flag is not implied,
/// because the usual reason for duplicating onto a specific descriptor
/// is to have it survive execve(2).
/// The returned descriptor owns `newfd`, which is closed when it is dropped.
pub fn dup3(oldfd: BorrowedFd, newfd: libc::c_int, flags: libc::c_int)
    -> io::Result<OwnedFd>
{
    loop {
        // SAFETY: This is always safe.
        let fd = unsafe { libc::dup3(oldfd.as_raw_fd(), newfd, flags) };

        if fd == -1 {
            let err = io::Error::last_os_error();
            // dup3 may fail with EBUSY on Linux during a race with open(2).
            if matches!(err.raw_os_error(), Some(libc::EINTR | libc::EBUSY)) {
                continue;
            }
            return Err(err);
        }

        // SAFETY: fd is a new, open file descriptor.
        break Ok(unsafe { OwnedFd::from_raw_fd(fd) });
    }
}

/// Call pipe2(2) with the given arguments.
pub fn pipe2(flags: libc::c_int) -> io::Result<(OwnedFd, OwnedFd)>
{
    let flags = flags | libc::O_CLOEXEC;

    let mut pipefd = [-1; 2];
    // SAFETY: pipefd is sufficiently large.
    let result = unsafe { libc::pipe2(pipefd.as_mut_ptr(), flags) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok((
        // SAFETY: These file descriptors are fresh.
        unsafe { OwnedFd::from_raw_fd(pipefd[0]) },
        unsafe { OwnedFd::from_raw_fd(pipefd[1]) }
    ))
}

/// Call read(2) with the given arguments.
///
/// Returns the number of bytes read.
/// `EINTR` is not retried; see the crate documentation.
pub fn read(fd: BorrowedFd, buf: &mut [u8]) -> io::Result<usize>
{
    // SAFETY: buf is valid for buf.len() bytes.
    let nread = unsafe {
        libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len())
    };

    if nread == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(nread as usize)
}

/// Call write(2) with the given arguments.
///
/// Returns the number of bytes written.
/// `EINTR` is not retried; see the crate documentation.
pub fn write(fd: BorrowedFd, buf: &[u8]) -> io::Result<usize>
{
    // SAFETY: buf is valid for buf.len() bytes.
    let nwritten = unsafe {
        libc::write(fd.as_raw_fd(), buf.as_ptr().cast(), buf.len())
    };

    if nwritten == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(nwritten as usize)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::os::unix::io::AsFd;

    #[test]
    fn pipe2_read_write()
    {
        let (r, w) = pipe2(0).unwrap();
        assert_eq!(write(w.as_fd(), b"hello").unwrap(), 5);

        let mut buf = [0; 16];
        let nread = read(r.as_fd(), &mut buf).unwrap();
        assert_eq!(&buf[.. nread], b"hello");

        // Closing the write end makes the read end report end of file.
        drop(w);
        assert_eq!(read(r.as_fd(), &mut buf).unwrap(), 0);
    }

    #[test]
    fn close_reports_success()
    {
        let (r, w) = pipe2(0).unwrap();
        close(w).unwrap();

        let mut buf = [0; 1];
        assert_eq!(read(r.as_fd(), &mut buf).unwrap(), 0);
    }

    #[test]
    fn pipe2_nonblocking_would_block()
    {
        let (r, _w) = pipe2(libc::O_NONBLOCK).unwrap();
        let mut buf = [0; 1];
        let err = read(r.as_fd(), &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
