//! Node context injection
//!
//! Thread-local storage for the identity of the node whose callback is
//! running, so every span opened inside the callback can carry `node_id`
//! and `role` without threading them through every call.

use std::cell::RefCell;

use satnet_core::{NodeId, NodeRole};
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    pub node_id: NodeId,
    pub role: NodeRole,
    /// Identifies one simulation run, shared by every node in it
    pub run_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Creating the guard sets the node context for the current thread;
/// dropping it restores whatever was set before.
///
/// # Example
///
/// ```ignore
/// use satnet_logging::context::NodeContextGuard;
/// use satnet_core::{NodeId, NodeRole};
///
/// let _guard = NodeContextGuard::new(NodeId(3), NodeRole::Ground, run_id);
///
/// // Spans opened in this scope carry node_id = 3, role = ground
/// tracing::info!("Deciding");
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    pub fn new(node_id: NodeId, role: NodeRole, run_id: Uuid) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| {
            ctx.borrow_mut().replace(NodeContextData {
                node_id,
                role,
                run_id,
            })
        });
        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current node id (if set)
    pub fn current_node() -> Option<NodeId> {
        Self::current().map(|ctx| ctx.node_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with a node context set
///
/// # Example
///
/// ```ignore
/// with_node_context!(node, role, run_id, {
///     tracing::info!("Measuring");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($node:expr, $role:expr, $run_id:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($node, $role, $run_id);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_context_guard() {
        assert!(NodeContextGuard::current().is_none());

        let run_id = Uuid::new_v4();
        {
            let _guard = NodeContextGuard::new(NodeId(4), NodeRole::Relay, run_id);
            let ctx = NodeContextGuard::current().unwrap();
            assert_eq!(ctx.node_id, NodeId(4));
            assert_eq!(ctx.role, NodeRole::Relay);
            assert_eq!(ctx.run_id, run_id);
        }

        assert!(NodeContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let run_id = Uuid::new_v4();
        {
            let _outer = NodeContextGuard::new(NodeId(1), NodeRole::Orbital, run_id);
            assert_eq!(NodeContextGuard::current_node(), Some(NodeId(1)));

            {
                let _inner = NodeContextGuard::new(NodeId(2), NodeRole::Orbital, run_id);
                assert_eq!(NodeContextGuard::current_node(), Some(NodeId(2)));
            }

            // restored after the inner guard drops
            assert_eq!(NodeContextGuard::current_node(), Some(NodeId(1)));
        }
        assert!(NodeContextGuard::current_node().is_none());
    }

    #[test]
    fn test_macro_scopes_context() {
        let run_id = Uuid::new_v4();
        let seen = crate::with_node_context!(NodeId(7), NodeRole::Ground, run_id, {
            NodeContextGuard::current_node()
        });
        assert_eq!(seen, Some(NodeId(7)));
        assert!(NodeContextGuard::current().is_none());
    }
}
