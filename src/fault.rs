//! Fault trapping.
//!
//! A fault is a panic that unwinds out of a handler. [`trap`] runs a closure under
//! `catch_unwind` and returns the payload together with the stack captured at the panic site.
//!
//! The panic-site stack comes from a process-wide panic hook installed on first use. The hook
//! stores a `Backtrace` in a thread-local slot; `catch_unwind` returns on the same thread
//! before any coroutine switch can happen, so [`trap`] always finds the stack of the panic it
//! just caught. Faults forwarded between coroutines are re-raised with [`resume`], which puts
//! the original stack back into the slot of the re-raising thread first, because
//! `resume_unwind` does not run the hook.

use crate::error::{FaultError, MissingKeyFault};
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    static PANIC_SITE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A trapped panic: the raw payload plus the stack it was raised from.
pub struct Fault {
    payload: Box<dyn Any + Send>,
    backtrace: Backtrace,
}

impl Fault {
    /// Panic payload rendered as text.
    #[must_use]
    pub fn message(&self) -> String {
        payload_message(self.payload.as_ref())
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Convert into the value form that travels through error reporting.
    #[must_use]
    pub fn into_error(self) -> FaultError {
        let message = self.message();
        FaultError::new(message, self.backtrace)
    }
}

impl std::fmt::Debug for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fault")
            .field("message", &self.message())
            .finish_non_exhaustive()
    }
}

/// Install the stack-capturing panic hook. Idempotent; the previous hook keeps running.
pub fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            PANIC_SITE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

/// Run `f`, converting a panic into a [`Fault`].
pub fn trap<T>(f: impl FnOnce() -> T) -> Result<T, Fault> {
    install_hook();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let backtrace = PANIC_SITE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(Backtrace::force_capture);
        Fault { payload, backtrace }
    })
}

/// Re-raise a fault trapped elsewhere (typically on another coroutine) on the current stack.
pub fn resume(fault: Fault) -> ! {
    let Fault { payload, backtrace } = fault;
    PANIC_SITE.with(|slot| *slot.borrow_mut() = Some(backtrace));
    panic::resume_unwind(payload)
}

/// Render a panic payload as text.
#[must_use]
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(missing) = payload.downcast_ref::<MissingKeyFault>() {
        missing.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}
