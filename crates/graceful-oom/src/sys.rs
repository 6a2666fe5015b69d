//! Platform glue for the allocation-failure path.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// Raises `signo` in the calling thread.
        ///
        /// The handler, if any, has run by the time this returns. Failures
        /// (such as an invalid signal number) are ignored.
        pub(crate) fn raise(signo: i32) {
            unsafe {
                libc::raise(signo);
            }
        }
    } else {
        pub(crate) fn raise(_signo: i32) {}
    }
}
