//! 讨论串 watch - 把指定讨论串的回复改由调用方回调接收

pub mod registry;
pub mod subscription;

pub use registry::WatchRegistry;
pub use subscription::{check_thread_once, run_watch, WatchCallback, WatchHandle};
