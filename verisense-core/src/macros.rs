//! Optional logging
//!
//! Thin wrappers so the crate logs through `log` on hosted targets and
//! compiles the calls away entirely on bare-metal builds without it.

#[cfg(feature = "log")]
macro_rules! vt_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! vt_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! vt_info {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! vt_info {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! vt_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! vt_warn {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! vt_error {
    ($($arg:tt)*) => { log::error!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! vt_error {
    ($($arg:tt)*) => {};
}
