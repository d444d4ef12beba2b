//! Tracing setup for binaries and tests that host a blur view.
//!
//! The library only emits events; installing a subscriber is left to the
//! application. [`init_tracing`] is a convenience for hosts without one.

/// Installs a formatted subscriber filtered by `RUST_LOG`.
///
/// Without `RUST_LOG` the filter is `error,blurview=info`. Calling it again,
/// or after another subscriber was installed, does nothing.
pub fn init_tracing() {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match tracing_subscriber::EnvFilter::try_new("error,blurview=info") {
            Ok(filter) => filter,
            Err(_) => tracing_subscriber::EnvFilter::new("error"),
        },
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .try_init();
}

/// Spawns a background thread reporting lock deadlocks every ten seconds.
///
/// Only active in debug builds; runs once per process.
pub fn init_deadlock_detection() {
    #[cfg(debug_assertions)]
    {
        use std::{sync::Once, thread, time::Duration};

        use tracing::error;

        static INIT: Once = Once::new();
        INIT.call_once(|| {
            thread::spawn(|| {
                loop {
                    thread::sleep(Duration::from_secs(10));
                    let deadlocks = parking_lot::deadlock::check_deadlock();
                    if deadlocks.is_empty() {
                        continue;
                    }

                    error!("{} deadlocks detected", deadlocks.len());
                    for (idx, threads) in deadlocks.iter().enumerate() {
                        for thread in threads {
                            error!(
                                "Deadlock #{idx}, thread {:?}:\n{:?}",
                                thread.thread_id(),
                                thread.backtrace()
                            );
                        }
                    }
                }
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_tracing();
        init_tracing();
        init_deadlock_detection();
        init_deadlock_detection();
    }
}
