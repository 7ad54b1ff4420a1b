//! Turning asynchronous signals into callbacks run by a reactor.
//!
//! A [`SignalBridge`] blocks the signals it is asked to handle,
//! receives them through a signalfd(2) watched by a [`Reactor`],
//! and calls the registered callback for each delivered signal.
//!
//! Blocking changes the mask of the calling thread only.
//! Create the bridge and set its handlers on the main thread
//! before spawning other threads, so that every thread inherits the mask
//! and no thread receives the signals asynchronously.

use {
    crate::{
        deadline::Deadline,
        error::{Error, Operation, Result},
        io::read_exact_until,
        reactor::{Events, Reactor},
        signal::{is_signal_blocked, signal_block, signal_unblock, wait_for_signal},
    },
    log::{debug, warn},
    os_ext::{sigaddset, sigemptyset, signalfd, signalfd_set_mask, signalfd_siginfo, sigset_t},
    smallvec::SmallVec,
    std::{
        collections::HashMap,
        io,
        marker::PhantomData,
        mem::{self, ManuallyDrop, size_of},
        os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
        slice,
        sync::{Arc, Mutex, MutexGuard, PoisonError},
        time::Duration,
    },
};

/// Called with the information about a delivered signal.
pub type SignalCallback = Box<dyn FnMut(&signalfd_siginfo) + Send>;

/// Dispatches signals delivered through a signalfd to callbacks.
///
/// See the [module documentation][`self`] for the threading caveats.
/// The bridge is neither [`Send`] nor [`Sync`]:
/// it blocks and unblocks signals in the mask of the thread it lives on,
/// so it must be used and dropped on that thread.
///
/// ```compile_fail
/// use cellar_util::{EventPoll, SignalBridge};
/// fn assert_send<T: Send>() { }
/// assert_send::<SignalBridge<'static, EventPoll>>();
/// ```
pub struct SignalBridge<'r, R>
    where R: Reactor + ?Sized
{
    reactor: &'r R,

    // Dropped explicitly in the Drop impl, which must control the order.
    shared: ManuallyDrop<Arc<Shared>>,

    // Pins the bridge to the thread whose mask it changes.
    _thread: PhantomData<*const ()>,
}

/// State shared with the callback registered with the reactor.
struct Shared
{
    signalfd: OwnedFd,
    handlers: Mutex<Handlers>,
}

struct Handlers
{
    /// Signals the signalfd reports.
    watched: sigset_t,

    callbacks: HashMap<libc::c_int, SignalCallback>,

    /// Signals this bridge blocked, in the order it blocked them.
    /// Signals that were already blocked are not recorded,
    /// so that they stay blocked after the bridge is dropped.
    blocked: SmallVec<[libc::c_int; 8]>,
}

impl<'r, R> SignalBridge<'r, R>
    where R: Reactor + ?Sized
{
    /// Create a bridge that watches no signals yet,
    /// and register it with the reactor.
    pub fn new(reactor: &'r R) -> Result<Self>
    {
        let signalfd = signalfd(&sigemptyset(), libc::SFD_NONBLOCK)
            .map_err(|source| Error::Construction{
                what: "create signalfd",
                source,
            })?;
        Self::with_signalfd(reactor, signalfd)
    }

    fn with_signalfd(reactor: &'r R, signalfd: OwnedFd) -> Result<Self>
    {
        let shared = Arc::new(Shared{
            signalfd,
            handlers: Mutex::new(Handlers{
                watched:   sigemptyset(),
                callbacks: HashMap::new(),
                blocked:   SmallVec::new(),
            }),
        });

        // A weak reference, so that the reactor cannot keep the bridge alive.
        let weak = Arc::downgrade(&shared);
        let callback = Box::new(move |_: Events| {
            if let Some(shared) = weak.upgrade() {
                if let Err(err) = shared.dispatch() {
                    warn!("Error dispatching signal: {err}");
                }
            }
        });

        // On failure, shared is dropped here and closes the signalfd.
        reactor.add_watch(shared.signalfd.as_fd(), Events::READABLE, callback)
            .map_err(|source| Error::Construction{
                what: "register signalfd with reactor",
                source,
            })?;

        Ok(Self{
            reactor,
            shared: ManuallyDrop::new(shared),
            _thread: PhantomData,
        })
    }

    /// Call `callback` whenever `signal` is delivered.
    ///
    /// Blocks the signal unless it is blocked already.
    /// Replaces any callback previously set for the signal.
    /// `SIGKILL` and `SIGSTOP` cannot be blocked and are rejected
    /// with `EINVAL`.
    /// The callback runs with the bridge locked,
    /// so it must not call back into the bridge.
    pub fn set_handler<F>(&self, signal: libc::c_int, callback: F) -> Result<()>
        where F: 'static + FnMut(&signalfd_siginfo) + Send
    {
        let fd = self.shared.signalfd.as_raw_fd();
        let io_error = |source| Error::Io{op: Operation::SetHandler, fd, source};

        if matches!(signal, libc::SIGKILL | libc::SIGSTOP) {
            return Err(io_error(io::Error::from_raw_os_error(libc::EINVAL)));
        }

        let mut handlers = self.shared.lock();

        let was_blocked = is_signal_blocked(signal).map_err(io_error)?;
        if !was_blocked {
            signal_block(signal).map_err(io_error)?;
            handlers.blocked.push(signal);
        }

        // Signals the kernel refuses to block must never be watched.
        let armed = match is_signal_blocked(signal) {
            Ok(true) => Ok(()),
            Ok(false) => Err(io::Error::from_raw_os_error(libc::EINVAL)),
            Err(err) => Err(err),
        };

        let mut watched = handlers.watched;
        let armed = armed
            .and_then(|()| sigaddset(&mut watched, signal))
            .and_then(|()| signalfd_set_mask(self.shared.signalfd.as_fd(), &watched));

        if let Err(source) = armed {
            if !was_blocked {
                handlers.blocked.pop();
                if let Err(err) = signal_unblock(signal) {
                    warn!("Cannot unblock signal {signal}: {err}");
                }
            }
            return Err(io_error(source));
        }

        handlers.watched = watched;
        handlers.callbacks.insert(signal, Box::new(callback));
        Ok(())
    }

    /// Forget the callback for `signal`.
    ///
    /// The signal stays blocked and watched until the bridge is dropped;
    /// deliveries in the meantime are logged and discarded.
    /// Returns whether a callback was set.
    pub fn remove_handler(&self, signal: libc::c_int) -> bool
    {
        self.shared.lock().callbacks.remove(&signal).is_some()
    }

    /// Read one delivered signal and call its callback.
    ///
    /// Normally called by the reactor when the signalfd is readable.
    /// Waits without bound if no signal is pending.
    pub fn dispatch(&self) -> Result<()>
    {
        self.shared.dispatch()
    }
}

impl Shared
{
    fn lock(&self) -> MutexGuard<Handlers>
    {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self) -> Result<()>
    {
        // SAFETY: signalfd_siginfo is plain old data.
        let mut info: signalfd_siginfo = unsafe { mem::zeroed() };
        let buf = unsafe {
            slice::from_raw_parts_mut(
                (&mut info as *mut signalfd_siginfo).cast::<u8>(),
                size_of::<signalfd_siginfo>(),
            )
        };

        // The reactor reported readability, so this does not block long.
        read_exact_until(self.signalfd.as_fd(), buf, Deadline::never())?;

        let signal = info.ssi_signo as libc::c_int;
        debug!("Got signal {signal}");

        let mut handlers = self.lock();
        match handlers.callbacks.get_mut(&signal) {
            Some(callback) => callback(&info),
            // The handler was removed after the signal was delivered.
            None => warn!("No callback for signal {signal}"),
        }

        Ok(())
    }
}

impl<'r, R> AsFd for SignalBridge<'r, R>
    where R: Reactor + ?Sized
{
    fn as_fd(&self) -> BorrowedFd
    {
        self.shared.signalfd.as_fd()
    }
}

impl<'r, R> Drop for SignalBridge<'r, R>
    where R: Reactor + ?Sized
{
    fn drop(&mut self)
    {
        // SAFETY: self.shared will not be used anymore.
        let shared = unsafe { ManuallyDrop::take(&mut self.shared) };

        // Stop dispatching before anything else,
        // so no signal reaches a half torn down bridge.
        let fd = shared.signalfd.as_raw_fd();
        if let Err(err) = self.reactor.remove_watch(fd) {
            warn!("Cannot remove signalfd {fd} from reactor: {err}");
        }

        let blocked = mem::take(&mut shared.lock().blocked);

        // Closes the signalfd, unless a dispatch on another thread
        // still holds a reference; then it closes when that returns.
        drop(shared);

        for signal in blocked {
            // A pending instance would be delivered as soon as it is
            // unblocked, so consume it first. Another one may be raised
            // in between; that one is delivered normally.
            match wait_for_signal(signal, Duration::ZERO) {
                Ok(true) => debug!("Discarded pending signal {signal}"),
                Ok(false) => (),
                Err(err) => warn!("Cannot drain signal {signal}: {err}"),
            }
            if let Err(err) = signal_unblock(signal) {
                warn!("Cannot unblock signal {signal}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::{
            error::ErrorKind,
            reactor::{EventPoll, WatchCallback},
            signal::is_signal_pending,
        },
        os_ext::{pipe2, raise},
        std::{
            io,
            os::unix::io::RawFd,
            sync::atomic::{AtomicUsize, Ordering::SeqCst},
        },
    };

    // These signals are ignored by default,
    // so a stray delivery after unblocking is harmless.

    const SHORT: Option<Duration> = Some(Duration::from_millis(50));
    const LONG: Option<Duration> = Some(Duration::from_secs(5));

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(&signalfd_siginfo) + Send)
    {
        let count = Arc::new(AtomicUsize::new(0));
        let count_ = count.clone();
        (count, move |_: &signalfd_siginfo| { count_.fetch_add(1, SeqCst); })
    }

    #[test]
    fn handler_runs_once_per_signal()
    {
        let _ = env_logger::builder().is_test(true).try_init();

        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::new(&poll).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_ = seen.clone();
        bridge.set_handler(libc::SIGWINCH, move |info| {
            assert_eq!(info.ssi_signo, libc::SIGWINCH as u32);
            seen_.fetch_add(1, SeqCst);
        }).unwrap();
        assert!(is_signal_blocked(libc::SIGWINCH).unwrap());

        raise(libc::SIGWINCH).unwrap();
        assert!(poll.dispatch_iteration(LONG).unwrap());
        assert_eq!(seen.load(SeqCst), 1);

        assert!(!poll.dispatch_iteration(SHORT).unwrap());
        assert_eq!(seen.load(SeqCst), 1);

        drop(bridge);
        assert!(!is_signal_blocked(libc::SIGWINCH).unwrap());
    }

    #[test]
    fn direct_dispatch()
    {
        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::new(&poll).unwrap();
        let (count, handler) = counter();
        bridge.set_handler(libc::SIGWINCH, handler).unwrap();

        raise(libc::SIGWINCH).unwrap();
        bridge.dispatch().unwrap();
        assert_eq!(count.load(SeqCst), 1);
    }

    #[test]
    fn no_callback_after_drop()
    {
        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::new(&poll).unwrap();
        let (count, handler) = counter();
        bridge.set_handler(libc::SIGWINCH, handler).unwrap();

        // Pending while the bridge is dropped.
        raise(libc::SIGWINCH).unwrap();
        drop(bridge);

        assert!(!is_signal_pending(libc::SIGWINCH).unwrap());
        assert!(!poll.dispatch_iteration(SHORT).unwrap());
        assert_eq!(count.load(SeqCst), 0);

        // Raised after the bridge is gone; ignored by default.
        raise(libc::SIGWINCH).unwrap();
        assert!(!poll.dispatch_iteration(SHORT).unwrap());
        assert_eq!(count.load(SeqCst), 0);
    }

    #[test]
    fn unblockable_signals_are_rejected()
    {
        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::new(&poll).unwrap();

        for signal in [libc::SIGKILL, libc::SIGSTOP] {
            let err = bridge.set_handler(signal, |_| ()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Io);
            assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        }

        let handlers = bridge.shared.lock();
        assert!(handlers.blocked.is_empty());
        assert!(handlers.callbacks.is_empty());
    }

    #[test]
    fn failed_arming_undoes_block()
    {
        // A pipe is not a signalfd, so changing its mask fails
        // after the signal has already been blocked.
        let (r, _w) = pipe2(0).unwrap();
        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::with_signalfd(&poll, r).unwrap();

        let err = bridge.set_handler(libc::SIGWINCH, |_| ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        assert!(!is_signal_blocked(libc::SIGWINCH).unwrap());

        let handlers = bridge.shared.lock();
        assert!(handlers.blocked.is_empty());
        assert!(handlers.callbacks.is_empty());
    }

    #[test]
    fn failed_arming_keeps_earlier_block()
    {
        signal_block(libc::SIGURG).unwrap();

        let (r, _w) = pipe2(0).unwrap();
        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::with_signalfd(&poll, r).unwrap();

        bridge.set_handler(libc::SIGURG, |_| ()).unwrap_err();
        assert!(is_signal_blocked(libc::SIGURG).unwrap());
        drop(bridge);
        assert!(is_signal_blocked(libc::SIGURG).unwrap());

        signal_unblock(libc::SIGURG).unwrap();
    }

    #[test]
    fn restores_only_signals_it_blocked()
    {
        signal_block(libc::SIGURG).unwrap();

        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::new(&poll).unwrap();
        bridge.set_handler(libc::SIGURG, |_| ()).unwrap();
        bridge.set_handler(libc::SIGCHLD, |_| ()).unwrap();
        assert!(is_signal_blocked(libc::SIGCHLD).unwrap());
        drop(bridge);

        assert!(is_signal_blocked(libc::SIGURG).unwrap());
        assert!(!is_signal_blocked(libc::SIGCHLD).unwrap());

        signal_unblock(libc::SIGURG).unwrap();
    }

    #[test]
    fn set_handler_replaces_callback()
    {
        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::new(&poll).unwrap();
        let (first, handler) = counter();
        bridge.set_handler(libc::SIGWINCH, handler).unwrap();
        let (second, handler) = counter();
        bridge.set_handler(libc::SIGWINCH, handler).unwrap();

        raise(libc::SIGWINCH).unwrap();
        assert!(poll.dispatch_iteration(LONG).unwrap());
        assert_eq!(first.load(SeqCst), 0);
        assert_eq!(second.load(SeqCst), 1);
    }

    #[test]
    fn signal_after_remove_handler_is_discarded()
    {
        let _ = env_logger::builder().is_test(true).try_init();

        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::new(&poll).unwrap();
        let (count, handler) = counter();
        bridge.set_handler(libc::SIGWINCH, handler).unwrap();

        raise(libc::SIGWINCH).unwrap();
        assert!(bridge.remove_handler(libc::SIGWINCH));
        assert!(!bridge.remove_handler(libc::SIGWINCH));

        // Still watched, so the signal is read and dropped.
        assert!(poll.dispatch_iteration(LONG).unwrap());
        assert_eq!(count.load(SeqCst), 0);
        assert!(!is_signal_pending(libc::SIGWINCH).unwrap());
    }

    #[test]
    fn invalid_signal_is_rejected()
    {
        let poll = EventPoll::new().unwrap();
        let bridge = SignalBridge::new(&poll).unwrap();
        let err = bridge.set_handler(0x7FFF, |_| ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }

    struct FailingReactor;

    impl Reactor for FailingReactor
    {
        fn add_watch(&self, _: BorrowedFd, _: Events, _: WatchCallback)
            -> io::Result<()>
        {
            Err(io::Error::from_raw_os_error(libc::ENOSPC))
        }

        fn remove_watch(&self, _: RawFd) -> io::Result<()>
        {
            unreachable!()
        }
    }

    #[test]
    fn registration_failure_is_construction_error()
    {
        let err = SignalBridge::new(&FailingReactor).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert_eq!(err.raw_os_error(), Some(libc::ENOSPC));
    }
}
