//! Waiting for descriptor readiness within a deadline.

use {
    crate::error::{Error, Operation, Result},
    log::trace,
    os_ext::{POLLHUP, POLLIN, POLLNVAL, POLLOUT, poll, pollfd},
    std::{
        io::{self, ErrorKind::Interrupted},
        os::unix::io::{AsRawFd, BorrowedFd},
        time::{Duration, Instant},
    },
};

/// Timeout used by callers that have no better bound in mind.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Absolute point in monotonic time by which an operation must finish.
///
/// A deadline is computed once, when an operation starts,
/// and every wait within that operation is measured against it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Deadline(Option<Instant>);

impl Deadline
{
    /// Deadline that lies `timeout` from now.
    ///
    /// [`None`] means the operation may wait forever.
    /// A timeout so large that it cannot be represented is treated likewise.
    pub fn after(timeout: Option<Duration>) -> Self
    {
        Self(timeout.and_then(|t| Instant::now().checked_add(t)))
    }

    /// Deadline that never expires.
    pub fn never() -> Self
    {
        Self(None)
    }

    /// Time left until the deadline.
    ///
    /// Returns [`None`] for a deadline that never expires,
    /// and [`Duration::ZERO`] for one that has passed.
    pub fn remaining(&self) -> Option<Duration>
    {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Timeout argument for poll(2), or [`None`] if the deadline has passed.
    ///
    /// Rounds up to whole milliseconds so that a sub-millisecond remainder
    /// does not turn into a busy loop of zero-timeout polls.
    fn poll_timeout(&self) -> Option<libc::c_int>
    {
        let Some(remaining) = self.remaining() else { return Some(-1) };
        if remaining.is_zero() {
            return None;
        }
        let millis = (remaining.as_nanos() + 999_999) / 1_000_000;
        Some(millis.min(libc::c_int::MAX as u128) as libc::c_int)
    }
}

/// Direction of I/O to wait for.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction
{
    Readable,
    Writable,
}

impl Direction
{
    fn events(self) -> libc::c_short
    {
        match self {
            Self::Readable => POLLIN,
            Self::Writable => POLLOUT,
        }
    }

    fn operation(self) -> Operation
    {
        match self {
            Self::Readable => Operation::Read,
            Self::Writable => Operation::Write,
        }
    }
}

/// Block until `fd` is ready for I/O in the given direction.
///
/// Fails with [`Error::Timeout`] if the deadline passes first,
/// and with [`Error::Disconnected`] if a hang-up is reported
/// while the descriptor is not ready.
/// An error condition (`POLLERR`) counts as ready,
/// so that the subsequent I/O call reports the pending error.
pub fn wait_ready(fd: BorrowedFd, direction: Direction, deadline: Deadline)
    -> Result<()>
{
    wait_ready_for(direction.operation(), fd, direction, deadline)
}

/// Implementation of [`wait_ready`] with a caller-chosen operation name.
pub (crate) fn wait_ready_for(
    op:        Operation,
    fd:        BorrowedFd,
    direction: Direction,
    deadline:  Deadline,
) -> Result<()>
{
    let raw_fd = fd.as_raw_fd();
    let events = direction.events();

    loop {
        // Recompute every iteration; an interrupted poll
        // must not restart the full timeout.
        let timeout = deadline.poll_timeout()
            .ok_or(Error::Timeout{op, fd: raw_fd})?;

        let mut fds = [pollfd{fd: raw_fd, events, revents: 0}];
        match poll(&mut fds, timeout) {
            Ok(0) => return Err(Error::Timeout{op, fd: raw_fd}),
            Ok(_) => (),
            Err(err) if err.kind() == Interrupted => {
                trace!("poll on fd {raw_fd} interrupted, retrying");
                continue;
            },
            Err(source) => return Err(Error::Io{op, fd: raw_fd, source}),
        }

        let revents = fds[0].revents;
        if revents & events != 0 {
            return Ok(());
        }
        if revents & POLLNVAL != 0 {
            let source = io::Error::from_raw_os_error(libc::EBADF);
            return Err(Error::Io{op, fd: raw_fd, source});
        }
        if revents & POLLHUP != 0 {
            return Err(Error::Disconnected{op, fd: raw_fd});
        }
        if revents & libc::POLLERR != 0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::error::ErrorKind,
        os_ext::{O_NONBLOCK, pipe2, write},
        std::os::unix::io::AsFd,
    };

    #[test]
    fn expired_deadline_times_out_without_polling()
    {
        let (r, _w) = pipe2(O_NONBLOCK).unwrap();
        let deadline = Deadline::after(Some(Duration::ZERO));
        let err = wait_ready(r.as_fd(), Direction::Readable, deadline)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn readable_after_write()
    {
        let (r, w) = pipe2(O_NONBLOCK).unwrap();
        write(w.as_fd(), b"x").unwrap();
        let deadline = Deadline::after(Some(DEFAULT_TIMEOUT));
        wait_ready(r.as_fd(), Direction::Readable, deadline).unwrap();
    }

    #[test]
    fn writable_immediately()
    {
        let (_r, w) = pipe2(O_NONBLOCK).unwrap();
        wait_ready(w.as_fd(), Direction::Writable, Deadline::never()).unwrap();
    }

    #[test]
    fn hang_up_is_disconnected()
    {
        let (r, w) = pipe2(O_NONBLOCK).unwrap();
        drop(w);
        let deadline = Deadline::after(Some(DEFAULT_TIMEOUT));
        let err = wait_ready(r.as_fd(), Direction::Readable, deadline)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disconnected);
    }

    #[test]
    fn times_out_within_bound()
    {
        let (r, _w) = pipe2(O_NONBLOCK).unwrap();
        let timeout = Duration::from_millis(50);
        let start = Instant::now();
        let err = wait_ready(r.as_fd(), Direction::Readable,
                             Deadline::after(Some(timeout)))
            .unwrap_err();
        let elapsed = start.elapsed();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(elapsed >= timeout, "{elapsed:?}");
        assert!(elapsed < timeout + Duration::from_millis(500), "{elapsed:?}");
    }

    #[test]
    fn remaining()
    {
        assert_eq!(Deadline::never().remaining(), None);
        assert_eq!(Deadline::after(None), Deadline::never());

        let deadline = Deadline::after(Some(Duration::from_secs(60)));
        let remaining = deadline.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));

        let huge = Deadline::after(Some(Duration::MAX));
        assert_eq!(huge, Deadline::never());
    }
}
