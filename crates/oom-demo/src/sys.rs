use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
};

static SIGNALS: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn signals_received() -> usize {
    SIGNALS.load(Ordering::Relaxed)
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        extern "C" fn on_signal(_signo: libc::c_int) {
            SIGNALS.fetch_add(1, Ordering::Relaxed);
        }

        /// Counts every SIGUSR1 the process receives, returning the signal
        /// number.
        pub(crate) fn count_signals() -> io::Result<i32> {
            let handler = on_signal as extern "C" fn(libc::c_int);
            let previous = unsafe { libc::signal(libc::SIGUSR1, handler as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
            Ok(libc::SIGUSR1)
        }

        pub(crate) fn limit_address_space(bytes: usize) -> io::Result<()> {
            let Ok(bytes) = libc::rlim_t::try_from(bytes) else {
                return Err(io::ErrorKind::InvalidInput.into());
            };
            let limit = libc::rlimit {
                rlim_cur: bytes,
                rlim_max: bytes,
            };
            if unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    } else {
        pub(crate) fn count_signals() -> io::Result<i32> {
            Err(io::ErrorKind::Unsupported.into())
        }

        pub(crate) fn limit_address_space(_bytes: usize) -> io::Result<()> {
            Err(io::ErrorKind::Unsupported.into())
        }
    }
}
