//! Action dispatch table.
//!
//! ```text
//!  request {"action": "setpin", "pin": "2", ...}
//!        │
//!        ▼  linear scan over registered names
//!  ┌──────────┬──────────────────────────┐
//!  │ "setpin" │ Box<dyn ActionHandler<C>> │ ──▶ handle(request, conn) -> bool
//!  │ "forget" │ Box<dyn ActionHandler<C>> │
//!  └──────────┴──────────────────────────┘
//! ```
//!
//! The handler's return value is the "stop serving" signal for the server
//! loop that owns the dispatcher.  The connection type `C` is whatever the
//! server's listener produces, so handlers can write their own replies.

use log::{debug, info};

use crate::map::FixedMap;

use super::codec::{ActionMap, Field, field};

/// Request field naming the operation.
pub const ACTION_KEY: &str = "action";

/// Something that can serve one named action.
pub trait ActionHandler<C: ?Sized> {
    /// Handle `request`.  Return `true` to terminate the current server.
    fn handle(&mut self, request: &ActionMap, conn: &mut C) -> bool;
}

impl<C: ?Sized, F> ActionHandler<C> for F
where
    F: FnMut(&ActionMap, &mut C) -> bool,
{
    fn handle(&mut self, request: &ActionMap, conn: &mut C) -> bool {
        self(request, conn)
    }
}

/// Bounded name → handler table.
pub struct ActionDispatcher<C: ?Sized, const N: usize> {
    actions: FixedMap<Field, Box<dyn ActionHandler<C>>, N>,
}

impl<C: ?Sized, const N: usize> ActionDispatcher<C, N> {
    pub fn new() -> Self {
        Self {
            actions: FixedMap::new(),
        }
    }

    /// Register `handler` under `name`, replacing any previous handler of
    /// that name.  `false` when the table is full or the name is too long.
    pub fn register<H>(&mut self, name: &str, handler: H) -> bool
    where
        H: ActionHandler<C> + 'static,
    {
        let Some(key) = field(name) else {
            return false;
        };
        let accepted = self.actions.put(key, Box::new(handler));
        if accepted {
            debug!("dispatch: registered action '{}'", name);
        }
        accepted
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.actions.has(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Invoke the handler named by the request's `"action"` field.
    ///
    /// Returns the handler's verdict, or `false` when the field is missing
    /// or no handler matches.
    pub fn dispatch(&mut self, request: &ActionMap, conn: &mut C) -> bool {
        let Some(action) = request.get_str(ACTION_KEY) else {
            debug!("dispatch: request without an action field");
            return false;
        };
        match self.actions.get_mut(action) {
            Some(handler) => {
                info!("dispatch: running '{}'", action);
                handler.handle(request, conn)
            }
            None => {
                info!("dispatch: unknown action '{}'", action);
                false
            }
        }
    }
}

impl<C: ?Sized, const N: usize> Default for ActionDispatcher<C, N> {
    fn default() -> Self {
        Self::new()
    }
}
