//! Command bus: routes each command to the one handler registered for its
//! concrete type.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use eventide_core::command::{Command, CommandHandler};
use eventide_core::context::Context;
use eventide_core::error::DomainError;

struct Route {
    command_type: &'static str,
    handler: Arc<dyn CommandHandler>,
}

/// Returns the unqualified name of `C`.
pub(crate) fn short_type_name<C>() -> &'static str {
    let full = std::any::type_name::<C>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Routing table from command type to handler.
#[derive(Default)]
pub struct CommandBus {
    routes: RwLock<HashMap<TypeId, Route>>,
}

impl CommandBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes commands of type `C` to `handler`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateHandler` if `C` already has a handler.
    pub fn register<C: Command>(&self, handler: Arc<dyn CommandHandler>) -> Result<(), DomainError> {
        let command_type = short_type_name::<C>();
        let mut routes = self.routes.write();
        if routes.contains_key(&TypeId::of::<C>()) {
            return Err(DomainError::DuplicateHandler(command_type));
        }
        routes.insert(
            TypeId::of::<C>(),
            Route {
                command_type,
                handler,
            },
        );
        tracing::debug!(command_type, "command route registered");
        Ok(())
    }

    /// Hands `command` to its handler and returns the handler's result
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NoHandlerRegistered` if nothing handles the
    /// command's type, otherwise whatever the handler returns.
    pub async fn dispatch(&self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
        let handler = self
            .routes
            .read()
            .get(&command.as_any().type_id())
            .map(|route| Arc::clone(&route.handler))
            .ok_or(DomainError::NoHandlerRegistered(command.command_type()))?;
        handler.handle_command(ctx, command).await
    }

    /// Returns the registered command type names, sorted.
    #[must_use]
    pub fn registered_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .routes
            .read()
            .values()
            .map(|route| route.command_type)
            .collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBus")
            .field("commands", &self.registered_commands())
            .finish()
    }
}

#[async_trait]
impl CommandHandler for CommandBus {
    async fn handle_command(&self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
        self.dispatch(ctx, command).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug)]
    struct Open {
        id: String,
    }

    impl Command for Open {
        fn aggregate_id(&self) -> &str {
            &self.id
        }

        fn command_type(&self) -> &'static str {
            "Open"
        }
    }

    #[derive(Debug)]
    struct Close {
        id: String,
    }

    impl Command for Close {
        fn aggregate_id(&self) -> &str {
            &self.id
        }

        fn command_type(&self) -> &'static str {
            "Close"
        }
    }

    #[derive(Debug, Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl CommandHandler for RecordingHandler {
        async fn handle_command(&self, _ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", command.command_type(), command.aggregate_id()));
            if self.fail {
                return Err(DomainError::Validation("refused".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_concrete_type() {
        let bus = CommandBus::new();
        let opens = Arc::new(RecordingHandler::default());
        let closes = Arc::new(RecordingHandler::default());
        bus.register::<Open>(opens.clone()).unwrap();
        bus.register::<Close>(closes.clone()).unwrap();

        bus.dispatch(&Context::new(), &Open { id: "A1".into() }).await.unwrap();
        bus.dispatch(&Context::new(), &Close { id: "A2".into() }).await.unwrap();

        assert_eq!(*opens.seen.lock().unwrap(), vec!["Open:A1"]);
        assert_eq!(*closes.seen.lock().unwrap(), vec!["Close:A2"]);
    }

    #[tokio::test]
    async fn test_dispatch_without_handler_fails() {
        let bus = CommandBus::new();

        let result = bus.dispatch(&Context::new(), &Open { id: "A1".into() }).await;

        assert!(matches!(result, Err(DomainError::NoHandlerRegistered("Open"))));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let bus = CommandBus::new();
        bus.register::<Open>(Arc::new(RecordingHandler::default())).unwrap();

        let result = bus.register::<Open>(Arc::new(RecordingHandler::default()));

        assert!(matches!(result, Err(DomainError::DuplicateHandler("Open"))));
        assert_eq!(bus.registered_commands(), vec!["Open"]);
    }

    #[tokio::test]
    async fn test_handler_error_is_returned_unchanged() {
        let bus = CommandBus::new();
        let handler = Arc::new(RecordingHandler {
            fail: true,
            ..RecordingHandler::default()
        });
        bus.register::<Open>(handler).unwrap();

        let result = bus.dispatch(&Context::new(), &Open { id: "A1".into() }).await;

        assert!(matches!(result, Err(DomainError::Validation(message)) if message == "refused"));
    }

    #[tokio::test]
    async fn test_boxed_command_dispatches_through_deref() {
        let bus = CommandBus::new();
        let opens = Arc::new(RecordingHandler::default());
        bus.register::<Open>(opens.clone()).unwrap();
        let boxed: Box<dyn Command> = Box::new(Open { id: "A1".into() });

        bus.dispatch(&Context::new(), boxed.as_ref()).await.unwrap();

        assert_eq!(opens.seen.lock().unwrap().len(), 1);
    }
}
