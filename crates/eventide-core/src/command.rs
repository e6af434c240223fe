//! Command abstractions.

use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::DomainError;

/// Upcast helper so a `&dyn Command` can be downcast to its concrete type.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Trait that all commands implement.
pub trait Command: AsAny + Send + Sync + Debug {
    /// The aggregate this command targets.
    fn aggregate_id(&self) -> &str;

    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;
}

impl dyn Command {
    /// Downcasts to the concrete command type.
    #[must_use]
    pub fn downcast_ref<C: Command>(&self) -> Option<&C> {
        self.as_any().downcast_ref::<C>()
    }

    /// Returns `true` if the command is of type `C`.
    #[must_use]
    pub fn is<C: Command>(&self) -> bool {
        self.as_any().is::<C>()
    }
}

/// Something that can handle a command end to end.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handles `command` within `ctx`.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler fails with; routers pass it through
    /// unchanged.
    async fn handle_command(&self, ctx: &Context, command: &dyn Command)
    -> Result<(), DomainError>;
}
