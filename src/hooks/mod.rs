//! Process-wide capture of panics and failed background tasks.

use crate::classify::Captured;
use crate::reporter::ErrorReporting;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt::Display;
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

static INSTALLED: AtomicBool = AtomicBool::new(false);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("Error hooks are already installed for this process")]
    AlreadyInstalled,
    #[error("Cannot change the panic hook from a panicking thread")]
    Panicking,
}

/// Installs the panic hook. The previous hook still runs after ours, so
/// default printing and unwinding are unchanged.
///
/// Only one installation can be active at a time; drop the returned guard to
/// restore the previous hook.
pub fn install<R: ErrorReporting>(reporter: R) -> Result<HookGuard, HookError> {
    if std::thread::panicking() {
        return Err(HookError::Panicking);
    }
    if INSTALLED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(HookError::AlreadyInstalled);
    }

    let reporter: Arc<dyn ErrorReporting> = Arc::new(reporter);
    let previous: Arc<PanicHook> = Arc::new(panic::take_hook());
    let armed = Arc::new(AtomicBool::new(true));

    let hook_reporter = Arc::clone(&reporter);
    let hook_armed = Arc::clone(&armed);
    let chained = Arc::clone(&previous);
    panic::set_hook(Box::new(move |info| {
        if hook_armed.load(Ordering::Acquire) {
            hook_reporter.report(captured_panic(info));
        }
        (*chained)(info);
    }));

    debug!("Panic hook installed");
    Ok(HookGuard {
        reporter,
        previous,
        armed,
    })
}

fn captured_panic(info: &PanicHookInfo<'_>) -> Captured {
    let payload = info.payload();
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::new()
    };

    let location = info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));

    let backtrace = Backtrace::capture();
    let backtrace = (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string());

    Captured::Panic {
        message,
        location,
        backtrace,
    }
}

/// Disposer for [`install`].
pub struct HookGuard {
    reporter: Arc<dyn ErrorReporting>,
    previous: Arc<PanicHook>,
    armed: Arc<AtomicBool>,
}

impl HookGuard {
    /// Watches a spawned task. A task that finishes with `Err` is reported as
    /// an unhandled rejection; task panics already went through the panic
    /// hook and are not reported twice.
    pub fn track<T, E>(&self, task: JoinHandle<Result<T, E>>) -> JoinHandle<()>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let reporter = Arc::clone(&self.reporter);
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    reporter.report(Captured::Rejection {
                        reason: e.to_string(),
                        chain: None,
                    });
                }
                Err(join_error) if join_error.is_panic() => {}
                Err(join_error) => debug!("Tracked task cancelled: {join_error}"),
            }
        })
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        // Stops reporting even when our hook cannot be unset below, so a later
        // install chained on top of it reports each panic once.
        self.armed.store(false, Ordering::Release);

        // set_hook panics on a panicking thread; leave ours in place, disarmed.
        if !std::thread::panicking() {
            let previous = Arc::clone(&self.previous);
            panic::set_hook(Box::new(move |info| (*previous)(info)));
            debug!("Panic hook restored");
        }
        INSTALLED.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for HookGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookGuard").finish_non_exhaustive()
    }
}
