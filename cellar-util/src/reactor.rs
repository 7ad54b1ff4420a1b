//! Registering descriptors with an event loop.

use {
    bitflags::bitflags,
    log::trace,
    os_ext::{epoll_create1, epoll_ctl, epoll_wait},
    std::{
        collections::HashMap,
        io::{self, ErrorKind::Interrupted},
        os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd},
        sync::{Arc, Mutex, MutexGuard, PoisonError},
        time::Duration,
    },
};

bitflags!
{
    /// Readiness conditions of a watched descriptor.
    pub struct Events: u32
    {
        #[allow(missing_docs)] const READABLE    = libc::EPOLLIN as u32;
        #[allow(missing_docs)] const WRITABLE    = libc::EPOLLOUT as u32;
        #[allow(missing_docs)] const ERROR       = libc::EPOLLERR as u32;
        #[allow(missing_docs)] const HANGUP      = libc::EPOLLHUP as u32;
        #[allow(missing_docs)] const PEER_HANGUP = libc::EPOLLRDHUP as u32;
    }
}

/// Called by the reactor with the conditions that were reported.
pub type WatchCallback = Box<dyn FnMut(Events) + Send>;

/// Event loop that calls back when descriptors become ready.
///
/// A reactor decides when callbacks run;
/// each callback runs to completion on the reactor's thread.
pub trait Reactor
{
    /// Start watching `fd` for the given conditions.
    ///
    /// The descriptor must stay open until [`remove_watch`] is called.
    ///
    /// [`remove_watch`]: `Self::remove_watch`
    fn add_watch(&self, fd: BorrowedFd, events: Events, callback: WatchCallback)
        -> io::Result<()>;

    /// Stop watching `fd` and drop its callback.
    fn remove_watch(&self, fd: RawFd) -> io::Result<()>;
}

/// Reactor backed by epoll(7).
pub struct EventPoll
{
    epoll: OwnedFd,
    watches: Mutex<HashMap<RawFd, Arc<Mutex<WatchCallback>>>>,
}

impl EventPoll
{
    /// Create a reactor with no watches.
    pub fn new() -> io::Result<Self>
    {
        Ok(Self{
            epoll: epoll_create1(0)?,
            watches: Mutex::new(HashMap::new()),
        })
    }

    /// Wait for one event and run its callback.
    ///
    /// Returns whether an event was handled.
    /// Returns `false` when the timeout expires or the wait is interrupted.
    /// [`None`] waits forever.
    ///
    /// The registry is not locked while the callback runs,
    /// so the callback may add and remove watches, including its own.
    pub fn dispatch_iteration(&self, timeout: Option<Duration>)
        -> io::Result<bool>
    {
        let timeout = match timeout {
            None => -1,
            Some(t) => ((t.as_nanos() + 999_999) / 1_000_000)
                .min(libc::c_int::MAX as u128) as libc::c_int,
        };

        let mut events = [libc::epoll_event{events: 0, u64: 0}];
        match epoll_wait(self.epoll.as_fd(), &mut events, timeout) {
            Ok(0) => return Ok(false),
            Ok(_) => (),
            Err(err) if err.kind() == Interrupted => return Ok(false),
            Err(err) => return Err(err),
        }

        // epoll_event is packed, so copy the fields out.
        let event = events[0];
        let (bits, fd) = (event.events, event.u64 as RawFd);

        let callback = self.watches().get(&fd).cloned();
        match callback {
            Some(callback) => {
                let mut callback = callback.lock()
                    .unwrap_or_else(PoisonError::into_inner);
                (*callback)(Events::from_bits_truncate(bits));
            },
            None => trace!("Event for fd {fd} which is no longer watched"),
        }

        Ok(true)
    }

    fn watches(&self)
        -> MutexGuard<HashMap<RawFd, Arc<Mutex<WatchCallback>>>>
    {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Reactor for EventPoll
{
    fn add_watch(&self, fd: BorrowedFd, events: Events, callback: WatchCallback)
        -> io::Result<()>
    {
        let raw_fd = fd.as_raw_fd();
        let mut watches = self.watches();

        let event = libc::epoll_event{events: events.bits(), u64: raw_fd as u64};
        epoll_ctl(self.epoll.as_fd(), libc::EPOLL_CTL_ADD, raw_fd, Some(event))?;

        watches.insert(raw_fd, Arc::new(Mutex::new(callback)));
        Ok(())
    }

    fn remove_watch(&self, fd: RawFd) -> io::Result<()>
    {
        let mut watches = self.watches();
        watches.remove(&fd);
        epoll_ctl(self.epoll.as_fd(), libc::EPOLL_CTL_DEL, fd, None)
    }
}

impl AsFd for EventPoll
{
    fn as_fd(&self) -> BorrowedFd
    {
        self.epoll.as_fd()
    }
}
