#![allow(unused_macros)]

/// Helper macro for locking items
///
/// ```rust, ignore
///  let mut free = lock!(self.free);
///  free.push(chunk);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().expect("Failed to acquire lock")
    };
}
