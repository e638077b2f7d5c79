//! # Router Module
//!
//! Resolves an incoming `(method, path)` to the handler and middleware the dispatcher should
//! run.
//!
//! The dispatcher only depends on the [`RouteMatcher`] trait. [`RouteTable`] is the
//! implementation shipped with the crate: a radix tree over path segments with `{param}`
//! captures, per-route middleware and prefix groups.
//!
//! ## Lookup outcomes
//!
//! - [`RouteLookup::Matched`]: handler, middleware and extracted path parameters
//! - [`RouteLookup::MethodNotAllowed`]: the path exists under other methods, listed in
//!   registration order (the dispatcher turns this into a `405` with an `Allow` header)
//! - [`RouteLookup::NotFound`]: nothing registered for the path (`404`)
//!
//! ## Matching rules
//!
//! - Paths are split on `/`; empty segments are ignored, so `/users/` matches `/users`
//! - At every depth static segments are tried before parameters
//! - A parameter captures exactly one segment

mod core;
mod radix;
mod table;

pub use self::core::{ParamVec, RouteLookup, RouteMatch, RouteMatcher, MAX_INLINE_PARAMS};
pub use self::table::{RouteGroup, RouteTable};
