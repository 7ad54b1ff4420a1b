//! Exact-size reads and writes bounded by a deadline.
//!
//! These functions never report a partial transfer as success:
//! either the whole buffer is transferred or an error is returned.
//! After an error the buffer contents must be considered garbage;
//! there is no way to resume a failed transfer.
//!
//! Deadlines are only honored on non-blocking descriptors.
//! On a blocking descriptor the read or write call itself may block
//! for longer than the timeout allows.

use {
    crate::{
        deadline::{Deadline, Direction, wait_ready_for},
        error::{Error, Operation, Result},
    },
    log::trace,
    std::{
        io::{self, ErrorKind::{Interrupted, WouldBlock}},
        os::unix::io::{AsRawFd, BorrowedFd},
        time::Duration,
    },
};

/// Whether an error is transient and the call should be retried.
///
/// Covers `EINTR`, `EAGAIN` and `EWOULDBLOCK`.
pub fn is_transient(err: &io::Error) -> bool
{
    matches!(err.kind(), Interrupted | WouldBlock)
}

/// Read exactly `buf.len()` bytes from `fd`.
///
/// `timeout` bounds the whole call; [`None`] waits forever.
/// Fails with [`Error::Disconnected`] on end of file before
/// the buffer is full and with [`Error::Timeout`] when the deadline passes.
pub fn read_exact(fd: BorrowedFd, buf: &mut [u8], timeout: Option<Duration>)
    -> Result<()>
{
    read_exact_until(fd, buf, Deadline::after(timeout))
}

/// Like [`read_exact`], but with an absolute deadline.
pub fn read_exact_until(fd: BorrowedFd, buf: &mut [u8], deadline: Deadline)
    -> Result<()>
{
    let op = Operation::Read;
    let raw_fd = fd.as_raw_fd();

    let mut offset = 0;
    while offset < buf.len() {
        match os_ext::read(fd, &mut buf[offset ..]) {
            Ok(0) => return Err(Error::Disconnected{op, fd: raw_fd}),
            Ok(n) => { offset += n; continue; },
            Err(err) if is_transient(&err) =>
                trace!("Retrying read on fd {raw_fd}"),
            Err(source) => return Err(Error::Io{op, fd: raw_fd, source}),
        }

        wait_ready_for(op, fd, Direction::Readable, deadline)?;
    }

    Ok(())
}

/// Write exactly `buf.len()` bytes to `fd`.
///
/// `timeout` bounds the whole call; [`None`] waits forever.
/// Fails with [`Error::Timeout`] when the deadline passes
/// before all bytes were accepted.
pub fn write_exact(fd: BorrowedFd, buf: &[u8], timeout: Option<Duration>)
    -> Result<()>
{
    write_exact_until(fd, buf, Deadline::after(timeout))
}

/// Like [`write_exact`], but with an absolute deadline.
pub fn write_exact_until(fd: BorrowedFd, buf: &[u8], deadline: Deadline)
    -> Result<()>
{
    let op = Operation::Write;
    let raw_fd = fd.as_raw_fd();

    let mut offset = 0;
    while offset < buf.len() {
        match os_ext::write(fd, &buf[offset ..]) {
            // Nothing accepted; wait for room below.
            Ok(0) => trace!("Retrying write on fd {raw_fd}"),
            Ok(n) => { offset += n; continue; },
            Err(err) if is_transient(&err) =>
                trace!("Retrying write on fd {raw_fd}"),
            Err(source) => return Err(Error::Io{op, fd: raw_fd, source}),
        }

        wait_ready_for(op, fd, Direction::Writable, deadline)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::{deadline::DEFAULT_TIMEOUT, error::ErrorKind},
        os_ext::{O_NONBLOCK, pipe2, socketpair},
        proptest::{collection::vec as pvec, num::u8::ANY as pu8, proptest},
        std::{
            os::unix::io::{AsFd, OwnedFd},
            thread,
            time::Instant,
        },
    };

    fn nonblocking_pair() -> (OwnedFd, OwnedFd)
    {
        let type_ = libc::SOCK_STREAM | libc::SOCK_NONBLOCK;
        socketpair(libc::AF_UNIX, type_, 0).unwrap()
    }

    #[test]
    fn empty_buffer_needs_no_syscall()
    {
        // Nothing is readable and the deadline has already passed,
        // so any attempt to read or wait would fail.
        let (a, _b) = nonblocking_pair();
        read_exact(a.as_fd(), &mut [], Some(Duration::ZERO)).unwrap();
        write_exact(a.as_fd(), &[], Some(Duration::ZERO)).unwrap();
    }

    #[test]
    fn larger_than_socket_buffer()
    {
        // Far more than fits in a socket buffer,
        // so both sides go through several wait/retry rounds.
        let (a, b) = nonblocking_pair();
        let expected: Vec<u8> = (0 .. 4 << 20).map(|i| i as u8).collect();

        let writer = {
            let expected = expected.clone();
            thread::spawn(move || {
                write_exact(a.as_fd(), &expected, Some(DEFAULT_TIMEOUT))
            })
        };

        let mut actual = vec![0; expected.len()];
        read_exact(b.as_fd(), &mut actual, Some(DEFAULT_TIMEOUT)).unwrap();
        writer.join().unwrap().unwrap();
        assert!(actual == expected);
    }

    #[test]
    fn slow_peer_times_out()
    {
        let (_a, b) = nonblocking_pair();
        let timeout = Duration::from_millis(100);
        let start = Instant::now();
        let mut buf = [0; 4];
        let err = read_exact(b.as_fd(), &mut buf, Some(timeout)).unwrap_err();
        let elapsed = start.elapsed();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(elapsed < timeout + Duration::from_millis(500), "{elapsed:?}");
    }

    #[test]
    fn full_buffer_times_out()
    {
        // Nobody reads from b, so the socket buffer fills up.
        let (a, _b) = nonblocking_pair();
        let data = vec![0; 4 << 20];
        let timeout = Duration::from_millis(100);
        let start = Instant::now();
        let err = write_exact(a.as_fd(), &data, Some(timeout)).unwrap_err();
        let elapsed = start.elapsed();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(elapsed >= timeout, "{elapsed:?}");
        assert!(elapsed < timeout + Duration::from_millis(500), "{elapsed:?}");
    }

    #[test]
    fn partial_then_close_is_disconnected()
    {
        let (a, b) = nonblocking_pair();
        write_exact(a.as_fd(), b"abc", Some(DEFAULT_TIMEOUT)).unwrap();
        drop(a);

        let mut buf = [0; 8];
        let err = read_exact(b.as_fd(), &mut buf, Some(DEFAULT_TIMEOUT))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disconnected);
    }

    #[test]
    fn write_to_closed_pipe_is_io_error()
    {
        // The test harness ignores SIGPIPE, so write(2) reports EPIPE.
        let (r, w) = pipe2(O_NONBLOCK).unwrap();
        drop(r);

        let err = write_exact(w.as_fd(), b"x", Some(DEFAULT_TIMEOUT))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
    }

    proptest!
    {
        #[test]
        fn transfers_exact_size(expected in pvec(pu8, 0 .. 4096))
        {
            let (a, b) = nonblocking_pair();
            write_exact(a.as_fd(), &expected, Some(DEFAULT_TIMEOUT)).unwrap();

            let mut actual = vec![0; expected.len()];
            read_exact(b.as_fd(), &mut actual, Some(DEFAULT_TIMEOUT)).unwrap();
            assert_eq!(actual, expected);

            // Nothing more than requested was consumed or sent.
            drop(a);
            let mut rest = [0; 1];
            let err = read_exact(b.as_fd(), &mut rest, Some(DEFAULT_TIMEOUT))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Disconnected);
        }
    }
}
