// SPDX-License-Identifier: MPL-2.0

//! Bridges POSIX termination signals into the GLib main loop.
//!
//! Almost nothing is safe to call from signal context, so the handler only
//! performs an atomic load and a single-byte `write(2)` into a pipe (the
//! self-pipe pattern). A fd watch on the read end runs on the main loop,
//! drains the pipe and asks the window to close. Most notably this lets
//! Ctrl+C in the terminal quit the application gracefully.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};

use eyre::WrapErr;
use gtk::glib;
use gtk::prelude::*;
use nix::fcntl::OFlag;
use tracing::{debug, error};

/// Write end of the signal pipe, or -1 while no bridge is installed.
static SIGNAL_FD: AtomicI32 = AtomicI32::new(-1);

/// Signals that request a graceful shutdown.
const HANDLED_SIGNALS: [libc::c_int; 4] =
    [libc::SIGINT, libc::SIGTERM, libc::SIGQUIT, libc::SIGHUP];

fn signal_name(signal: libc::c_int) -> &'static str {
    match signal {
        libc::SIGINT => "SIGINT",
        libc::SIGTERM => "SIGTERM",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGHUP => "SIGHUP",
        _ => "<unknown>",
    }
}

/// The actual signal handler. Restricted to async-signal-safe calls: one
/// atomic load and one `write(2)`. Everything else happens on the main loop.
extern "C" fn on_signal(_signal: libc::c_int) {
    let fd = SIGNAL_FD.load(Ordering::SeqCst);
    if fd != -1 {
        // SAFETY: write(2) is async-signal-safe and the byte content is
        // irrelevant, only the wakeup matters.
        unsafe {
            libc::write(fd, b"1".as_ptr().cast(), 1);
        }
    }
}

fn query_disposition(signal: libc::c_int) -> io::Result<libc::sigaction> {
    // SAFETY: a null new action only queries the current disposition.
    let mut old: libc::sigaction = unsafe { std::mem::zeroed() };
    if unsafe { libc::sigaction(signal, std::ptr::null(), &mut old) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(old)
}

fn install_handler(signal: libc::c_int) -> io::Result<()> {
    // SAFETY: plain struct fill; sigfillset blocks everything else while the
    // handler runs, and SA_RESTART keeps interrupted syscalls transparent.
    let mut new: libc::sigaction = unsafe { std::mem::zeroed() };
    new.sa_sigaction = on_signal as libc::sighandler_t;
    new.sa_flags = libc::SA_RESTART;
    unsafe {
        libc::sigfillset(&mut new.sa_mask);
    }
    if unsafe { libc::sigaction(signal, &new, std::ptr::null_mut()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Install handlers for [`HANDLED_SIGNALS`], recording the previous
/// dispositions into `saved` for later restoration.
///
/// A signal whose disposition is already `SIG_IGN` stays untouched; the
/// environment asked for it to be ignored and that wish is honored. `saved`
/// is filled as the loop goes, so on error the caller still knows which
/// dispositions were already changed.
fn install_all(saved: &mut Vec<(libc::c_int, libc::sigaction)>) -> eyre::Result<()> {
    for signal in HANDLED_SIGNALS {
        let old = query_disposition(signal)
            .wrap_err_with(|| format!("could not get old {} handler", signal_name(signal)))?;
        if old.sa_sigaction != libc::SIG_IGN {
            install_handler(signal)
                .wrap_err_with(|| format!("could not set up new {} handler", signal_name(signal)))?;
        }
        saved.push((signal, old));
    }
    Ok(())
}

fn restore_all(saved: &[(libc::c_int, libc::sigaction)]) {
    for (signal, old) in saved {
        // SAFETY: restores the disposition that was active before install.
        if unsafe { libc::sigaction(*signal, old, std::ptr::null_mut()) } < 0 {
            error!(
                signal = signal_name(*signal),
                "could not restore signal handler: {}",
                io::Error::last_os_error()
            );
        }
    }
}

/// Keeps signal handlers installed for its own lifetime.
///
/// Dropping the bridge restores every previous disposition, removes the fd
/// watch and closes the pipe; a signal delivered after that is handled the
/// way it was before the bridge existed.
pub struct SignalBridge {
    pipe: (OwnedFd, OwnedFd),
    watch: Option<glib::SourceId>,
    saved: Vec<(libc::c_int, libc::sigaction)>,
}

impl SignalBridge {
    /// Install the termination-signal handlers and arrange for `window` to be
    /// closed on the main loop whenever one of them arrives.
    pub fn install(window: &gtk::ApplicationWindow) -> eyre::Result<Self> {
        let pipe = nix::unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)
            .wrap_err("could not create signal pipe")?;
        SIGNAL_FD.store(pipe.1.as_raw_fd(), Ordering::SeqCst);

        let window = window.downgrade();
        let watch = glib::source::unix_fd_add_local(
            pipe.0.as_raw_fd(),
            glib::IOCondition::IN,
            move |fd, _condition| {
                // Drain everything that accumulated so rapid repeated signals
                // collapse into a single close request.
                let mut buf = [0u8; 16];
                // SAFETY: fd is the read end of our pipe, open as long as the
                // watch exists.
                let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
                match n {
                    n if n >= 1 => debug!(bytes = n, "signal caught, closing window"),
                    0 => return glib::ControlFlow::Continue,
                    _ => {
                        // A broken signal pipe means shutdown requests could
                        // be lost from here on; fail safe toward closing.
                        error!(
                            "error reading from signal pipe: {}",
                            io::Error::last_os_error()
                        );
                    }
                }
                if let Some(window) = window.upgrade() {
                    window.close();
                }
                glib::ControlFlow::Continue
            },
        );

        // If any disposition cannot be installed the partially constructed
        // bridge drops, which restores what was already changed.
        let mut bridge = Self {
            pipe,
            watch: Some(watch),
            saved: Vec::with_capacity(HANDLED_SIGNALS.len()),
        };
        install_all(&mut bridge.saved)?;

        Ok(bridge)
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.remove();
        }
        restore_all(&self.saved);
        // A handler firing from here on sees -1 and does nothing; the pipe
        // fds close when the OwnedFds drop.
        SIGNAL_FD.store(-1, Ordering::SeqCst);
        debug!(fd = self.pipe.1.as_raw_fd(), "signal bridge removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Signal dispositions and SIGNAL_FD are process-global, and the test
    // harness runs tests on threads of one process. Everything touching them
    // lives in a single test each so they cannot race.

    #[test]
    fn handler_writes_into_the_published_pipe_only() {
        // No pipe published: the handler must be a harmless no-op.
        SIGNAL_FD.store(-1, Ordering::SeqCst);
        on_signal(libc::SIGINT);

        let pipe = nix::unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK).unwrap();
        SIGNAL_FD.store(pipe.1.as_raw_fd(), Ordering::SeqCst);
        on_signal(libc::SIGTERM);
        on_signal(libc::SIGTERM);
        SIGNAL_FD.store(-1, Ordering::SeqCst);

        let mut buf = [0u8; 8];
        let n =
            unsafe { libc::read(pipe.0.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        assert_eq!(n, 2, "one byte per received signal");
    }

    #[test]
    fn ignored_signals_are_never_intercepted() {
        // SAFETY: test-local disposition change, restored below.
        unsafe {
            libc::signal(libc::SIGHUP, libc::SIG_IGN);
        }

        let mut saved = Vec::new();
        install_all(&mut saved).unwrap();

        // The ignored signal keeps its disposition while the others got ours.
        let hup = query_disposition(libc::SIGHUP).unwrap();
        assert_eq!(hup.sa_sigaction, libc::SIG_IGN);
        let int = query_disposition(libc::SIGINT).unwrap();
        assert_eq!(int.sa_sigaction, on_signal as libc::sighandler_t);

        restore_all(&saved);

        // Restoration is exact: still ignored afterwards.
        let hup = query_disposition(libc::SIGHUP).unwrap();
        assert_eq!(hup.sa_sigaction, libc::SIG_IGN);
        let int = query_disposition(libc::SIGINT).unwrap();
        assert_ne!(int.sa_sigaction, on_signal as libc::sighandler_t);
    }

    #[test]
    fn every_handled_signal_has_a_name() {
        for signal in HANDLED_SIGNALS {
            assert_ne!(signal_name(signal), "<unknown>");
        }
        assert_eq!(signal_name(libc::SIGUSR1), "<unknown>");
    }
}
