pub mod ctcp;
pub mod dcc;
pub mod model;

#[macro_export]
macro_rules! try_lock {
    ($locked: expr) => {
        match $locked.lock() {
            Ok(unlocked) => unlocked,
            Err(e) => {
                tracing::error!("[DCC - MULTITHREAD] Lock poisoned: {}", e);
                e.into_inner()
            }
        }
    };
}
