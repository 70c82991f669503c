//! `dev_*!` logging macros, forwarding to the `log` facade.
//!
//! These forward unconditionally rather than being gated behind Cargo
//! features: this crate only ever runs on top of `std` (the byte channel is
//! a real serial port or an in-memory test double, never bare metal), so
//! there's nothing to compile out. Level filtering happens the ordinary
//! way, at the `env_logger`/`flexi_logger` subscriber `serlink-cli`
//! installs.

#[macro_export]
macro_rules! dev_error {
    ($($arg:tt)*) => { $crate::__log::error!($($arg)*) };
}

#[macro_export]
macro_rules! dev_warn {
    ($($arg:tt)*) => { $crate::__log::warn!($($arg)*) };
}

#[macro_export]
macro_rules! dev_info {
    ($($arg:tt)*) => { $crate::__log::info!($($arg)*) };
}

#[macro_export]
macro_rules! dev_debug {
    ($($arg:tt)*) => { $crate::__log::debug!($($arg)*) };
}

#[macro_export]
macro_rules! dev_trace {
    ($($arg:tt)*) => { $crate::__log::trace!($($arg)*) };
}
