//! Command handler middleware.
//!
//! A middleware sees every command on its way to a handler and decides
//! whether, and how, to pass it on. Middleware is attached per aggregate or
//! per command when the engine is wired; the first one listed runs
//! outermost.

use std::sync::Arc;

use async_trait::async_trait;
use eventide_core::command::{Command, CommandHandler};
use eventide_core::context::Context;
use eventide_core::error::DomainError;

/// Wraps command handling with cross-cutting behaviour such as access
/// checks or auditing.
#[async_trait]
pub trait CommandMiddleware: Send + Sync {
    /// Handles `command`, calling `next` to continue down the chain.
    ///
    /// # Errors
    ///
    /// Returns the middleware's own rejection or whatever `next` returns.
    async fn handle(
        &self,
        ctx: &Context,
        command: &dyn Command,
        next: &dyn CommandHandler,
    ) -> Result<(), DomainError>;
}

struct Layered {
    middleware: Arc<dyn CommandMiddleware>,
    next: Arc<dyn CommandHandler>,
}

#[async_trait]
impl CommandHandler for Layered {
    async fn handle_command(&self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
        self.middleware
            .handle(ctx, command, self.next.as_ref())
            .await
    }
}

/// Wraps `handler` in `middleware`, first entry outermost.
#[must_use]
pub fn layer(
    handler: Arc<dyn CommandHandler>,
    middleware: &[Arc<dyn CommandMiddleware>],
) -> Arc<dyn CommandHandler> {
    middleware.iter().rev().fold(handler, |next, middleware| {
        Arc::new(Layered {
            middleware: Arc::clone(middleware),
            next,
        })
    })
}
