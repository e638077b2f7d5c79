use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;

/// A unit of request logic. `Ok(())` means success; response side effects go through the
/// [`Context`], not the return value.
pub type Handler = Arc<dyn Fn(&Context) -> Result<(), Error> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Context) -> Result<(), Error> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A decorator from one handler to another.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Handler) -> Handler;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Middleware built from a closure that receives the request and the rest of the chain.
pub struct FnMiddleware<F> {
    f: Arc<F>,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&Context, &Handler) -> Result<(), Error> + Send + Sync + 'static,
{
    fn wrap(&self, next: Handler) -> Handler {
        let f = Arc::clone(&self.f);
        Arc::new(move |ctx: &Context| f(ctx, &next))
    }
}

/// Build a middleware from `|ctx, next| { ...; next(ctx) }`.
pub fn from_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(&Context, &Handler) -> Result<(), Error> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware { f: Arc::new(f) })
}

/// Fold `global` then `route` middleware around `terminal`.
///
/// The first registered middleware is the outermost layer: it runs first on the way in and
/// last on the way out. Entering layer `i` advances the request cursor to `i`; the terminal
/// handler is layer `global.len() + route.len()`.
pub fn compose(
    global: &[Arc<dyn Middleware>],
    route: &[Arc<dyn Middleware>],
    terminal: Handler,
) -> Handler {
    let depth = global.len() + route.len();
    let mut next = step(depth, terminal);
    for (idx, mw) in (0..depth).rev().zip(global.iter().chain(route.iter()).rev()) {
        next = step(idx, mw.wrap(next));
    }
    next
}

fn step(idx: usize, inner: Handler) -> Handler {
    Arc::new(move |ctx: &Context| {
        ctx.state().advance_cursor(idx);
        inner(ctx)
    })
}
