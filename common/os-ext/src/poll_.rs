use std::io;

/// Call poll(2) with the given arguments.
///
/// Returns the number of entries with nonzero `revents`.
/// Zero means the timeout expired.
/// `EINTR` is not retried; see the crate documentation.
pub fn poll(fds: &mut [libc::pollfd], timeout: libc::c_int) -> io::Result<usize>
{
    let nfds = fds.len() as libc::nfds_t;

    // SAFETY: fds is valid for nfds entries.
    let result = unsafe { libc::poll(fds.as_mut_ptr(), nfds, timeout) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(result as usize)
}
