//! Extra items for talking to the operating system.
//!
//! This crate provides a safe, low-level interface to the operating system.
//! The functions in this crate are named after their underlying system calls,
//! and their behavior is identical except for the differences listed below.
//! The exact semantics of each function can be found in their man pages.
//! This is in contrast with the std crate, which gives no such guarantees.
//! This is a trade-off against cross-platform compatibility.
//!
//! # Differences with underlying system calls
//!
//! Errors are reported using [`Result`] rather than
//! through `errno` and an arbitrary return value.
//!
//! When a new file descriptor is created by one of the functions,
//! it is created with the `FD_CLOEXEC` bit set (atomically).
//! That is, the `*_CLOEXEC` flag is set implicitly by the wrapper functions.
//! This ensures no resources are leaked in a threaded program that forks.
//!
//! If the system call fails with `EINTR` (interrupted),
//! the wrapper function automatically retries it.
//! The exceptions are the calls that wait or transfer data
//! ([`poll`], [`epoll_wait`], [`sigtimedwait`], [`read`], [`write`],
//! [`sendmsg`], and [`recvmsg`]); their callers track deadlines
//! and partial progress, so they must observe the interruption themselves.
//! [`close`] is never retried either, since the descriptor is gone
//! even when it fails.
//!
//! [`Result`]: `std::io::Result`

#![warn(missing_docs)]

pub use {
    self::{
        fcntl::*,
        signal::*,
        sys_epoll::*,
        sys_resource::*,
        sys_signalfd::*,
        sys_socket::*,
        sys_stat::*,
        unistd::*,
        poll_::*,
    },
    libc::{
        EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP,
        FD_CLOEXEC, O_NONBLOCK,
        POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT,
        SIG_BLOCK, SIG_SETMASK, SIG_UNBLOCK,
        SHUT_RD, SHUT_RDWR, SHUT_WR,
        pid_t, pollfd, rlim_t, sigset_t, signalfd_siginfo,
    },
};

use std::io::{self, ErrorKind::Interrupted};

mod fcntl;
mod poll_;
mod signal;
mod sys_epoll;
mod sys_resource;
mod sys_signalfd;
mod sys_socket;
mod sys_stat;
mod unistd;

// Cannot `pub use` as that would also export the stat function.
#[allow(missing_docs, non_camel_case_types)]
pub type stat = libc::stat;

/// Call `f` until it no longer fails with `EINTR`.
fn retry_on_eintr<F, T>(mut f: F) -> io::Result<T>
    where F: FnMut() -> io::Result<T>
{
    loop {
        match f() {
            Err(err) if err.kind() == Interrupted => continue,
            result                                => return result,
        }
    }
}
