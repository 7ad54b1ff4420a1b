//! Passing descriptors over connected local sockets.
//!
//! Every message carries exactly one descriptor in an `SCM_RIGHTS`
//! control message, accompanied by one byte of ordinary payload,
//! because a stream socket does not deliver control data on its own.

use {
    crate::{
        deadline::{Deadline, Direction, wait_ready_for},
        error::{Error, Operation, Result},
        io::is_transient,
    },
    log::trace,
    os_ext::{recvmsg, sendmsg},
    smallvec::SmallVec,
    std::{
        mem::{size_of, zeroed},
        os::unix::io::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
        ptr,
        time::Duration,
    },
};

/// Size of the encoded descriptor in a control message.
const FD_SIZE: libc::c_uint = size_of::<libc::c_int>() as libc::c_uint;

/// Payload byte sent along with the descriptor.
const PAYLOAD: u8 = b'!';

/// Backing storage for control messages, aligned for `cmsghdr`.
/// Large enough for one descriptor with room to spare.
type ControlBuffer = [u64; 8];

/// Send a descriptor over a connected local socket.
///
/// The peer receives a new descriptor referring to the same open file.
/// `fd` itself stays open and usable.
pub fn send_fd(socket: BorrowedFd, fd: BorrowedFd, timeout: Option<Duration>)
    -> Result<()>
{
    let op = Operation::SendFd;
    let raw_socket = socket.as_raw_fd();
    let deadline = Deadline::after(timeout);

    let mut payload = [PAYLOAD];
    let mut iov = libc::iovec{
        iov_base: payload.as_mut_ptr().cast(),
        iov_len:  payload.len(),
    };
    let mut control: ControlBuffer = [0; 8];

    // SAFETY: An all-zero msghdr is valid.
    let mut msg: libc::msghdr = unsafe { zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast();
    msg.msg_controllen = unsafe { libc::CMSG_SPACE(FD_SIZE) } as _;

    // SAFETY: The control buffer has room for one header with one int.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_len   = libc::CMSG_LEN(FD_SIZE) as _;
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type  = libc::SCM_RIGHTS;
        let data = libc::CMSG_DATA(cmsg).cast::<libc::c_int>();
        ptr::write_unaligned(data, fd.as_raw_fd());
    }

    loop {
        // SAFETY: msg points to payload and control, which outlive the call.
        match unsafe { sendmsg(socket, &msg, libc::MSG_NOSIGNAL) } {
            // Only one byte is sent, so any progress completes the message.
            Ok(n) if n > 0 => return Ok(()),
            Ok(_) => trace!("Retrying sendmsg on fd {raw_socket}"),
            Err(err) if is_transient(&err) =>
                trace!("Retrying sendmsg on fd {raw_socket}"),
            Err(source) => return Err(Error::Io{op, fd: raw_socket, source}),
        }

        wait_ready_for(op, socket, Direction::Writable, deadline)?;
    }
}

/// Receive a descriptor sent with [`send_fd`].
///
/// On success the caller is the sole owner of the returned descriptor.
/// Fails with [`Error::Protocol`] unless the message carries
/// exactly one descriptor in a single `SCM_RIGHTS` control message.
/// Descriptors that arrive in a malformed message are closed.
pub fn recv_fd(socket: BorrowedFd, timeout: Option<Duration>)
    -> Result<OwnedFd>
{
    let op = Operation::RecvFd;
    let raw_socket = socket.as_raw_fd();
    let deadline = Deadline::after(timeout);

    let mut payload = [0u8];
    let mut iov = libc::iovec{
        iov_base: payload.as_mut_ptr().cast(),
        iov_len:  payload.len(),
    };
    let mut control: ControlBuffer = [0; 8];

    // SAFETY: An all-zero msghdr is valid.
    let mut msg: libc::msghdr = unsafe { zeroed() };

    loop {
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = unsafe { libc::CMSG_SPACE(FD_SIZE) } as _;
        msg.msg_flags = 0;

        // SAFETY: msg points to payload and control, which outlive the call.
        match unsafe { recvmsg(socket, &mut msg, libc::MSG_WAITALL) } {
            Ok(0) => return Err(Error::Disconnected{op, fd: raw_socket}),
            Ok(_) => break,
            Err(err) if is_transient(&err) =>
                trace!("Retrying recvmsg on fd {raw_socket}"),
            Err(source) => return Err(Error::Io{op, fd: raw_socket, source}),
        }

        wait_ready_for(op, socket, Direction::Readable, deadline)?;
    }

    // SAFETY: recvmsg filled in msg and the control buffer.
    let (received, headers) = unsafe { take_descriptors(&msg) };

    let protocol = |reason| Error::Protocol{op, fd: raw_socket, reason};

    if msg.msg_flags & libc::MSG_CTRUNC != 0 {
        return Err(protocol("control data truncated"));
    }

    let expected_len = unsafe { libc::CMSG_LEN(FD_SIZE) } as usize;
    match headers.as_slice() {
        [] =>
            return Err(protocol("no control message")),
        [_, _, ..] =>
            return Err(protocol("more than one control message")),
        [(len, _, _)] if *len != expected_len =>
            return Err(protocol("bad control message length")),
        [(_, level, _)] if *level != libc::SOL_SOCKET =>
            return Err(protocol("control message level is not SOL_SOCKET")),
        [(_, _, type_)] if *type_ != libc::SCM_RIGHTS =>
            return Err(protocol("control message type is not SCM_RIGHTS")),
        [_] => (),
    }

    received.into_iter().next()
        .ok_or_else(|| protocol("no descriptor in control message"))
}

/// Length, level, and type of a control message header.
type HeaderInfo = (usize, libc::c_int, libc::c_int);

/// Take ownership of every descriptor in the control data of `msg`.
///
/// Also returns a summary of every control message header,
/// so that the caller can validate the message
/// after all descriptors are safely owned.
///
/// # Safety
///
/// `msg` must have been filled in by a successful recvmsg(2).
unsafe fn take_descriptors(msg: &libc::msghdr)
    -> (SmallVec<[OwnedFd; 2]>, SmallVec<[HeaderInfo; 1]>)
{
    let mut fds = SmallVec::new();
    let mut headers = SmallVec::new();

    let data_offset = libc::CMSG_LEN(0) as usize;

    let mut cmsg = libc::CMSG_FIRSTHDR(msg);
    while !cmsg.is_null() {
        let libc::cmsghdr{cmsg_len, cmsg_level, cmsg_type, ..} = *cmsg;
        let cmsg_len = cmsg_len as usize;
        headers.push((cmsg_len, cmsg_level, cmsg_type));

        if cmsg_level == libc::SOL_SOCKET && cmsg_type == libc::SCM_RIGHTS {
            let count = cmsg_len.saturating_sub(data_offset)
                / size_of::<libc::c_int>();
            let data = libc::CMSG_DATA(cmsg).cast::<libc::c_int>();
            for i in 0 .. count {
                let fd = ptr::read_unaligned(data.add(i));
                // SAFETY: The kernel installed this descriptor for us.
                fds.push(OwnedFd::from_raw_fd(fd));
            }
        }

        cmsg = libc::CMSG_NXTHDR(msg, cmsg);
    }

    (fds, headers)
}
