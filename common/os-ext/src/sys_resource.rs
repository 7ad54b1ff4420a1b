use std::{io, mem::MaybeUninit};

// The resource argument is declared differently across C libraries,
// so the wrappers take a c_int and cast it.

/// Call getrlimit(2) with the given resource.
pub fn getrlimit(resource: libc::c_int) -> io::Result<libc::rlimit>
{
    let mut rlim = MaybeUninit::uninit();

    // SAFETY: rlim is large enough for an rlimit structure.
    let result = unsafe { libc::getrlimit(resource as _, rlim.as_mut_ptr()) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: getrlimit initialized rlim.
    Ok(unsafe { rlim.assume_init() })
}

/// Call setrlimit(2) with the given arguments.
pub fn setrlimit(resource: libc::c_int, rlim: &libc::rlimit)
    -> io::Result<()>
{
    // SAFETY: rlim points to a valid rlimit structure.
    let result = unsafe { libc::setrlimit(resource as _, rlim) };

    if result == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn open_files_limit_round_trips()
    {
        let rlim = getrlimit(libc::RLIMIT_NOFILE as libc::c_int).unwrap();
        assert!(rlim.rlim_cur <= rlim.rlim_max);
        setrlimit(libc::RLIMIT_NOFILE as libc::c_int, &rlim).unwrap();
    }

    #[test]
    fn invalid_resource()
    {
        let err = getrlimit(-1).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }
}
