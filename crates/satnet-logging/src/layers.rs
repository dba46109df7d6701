//! Custom tracing layers for the simulator

use tracing::{Span, Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{NodeContextData, NodeContextGuard};

/// Layer that attaches the active node context to every new span
///
/// The data is stored as a span extension so other layers can read it
/// back with `span.extensions().get::<NodeContextExtension>()`.
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NodeContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id)
            && let Some(node_ctx) = NodeContextGuard::current()
        {
            span.extensions_mut()
                .insert(NodeContextExtension { data: node_ctx });
        }
    }
}

/// Span carrying the active node context as recorded fields, so the JSON
/// formatter prints it with every event inside
pub fn node_span() -> Span {
    match NodeContextGuard::current() {
        Some(ctx) => tracing::info_span!(
            "node",
            node_id = ctx.node_id.raw(),
            role = %ctx.role,
            run_id = %ctx.run_id
        ),
        None => Span::none(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use satnet_core::{NodeId, NodeRole};
    use tracing_subscriber::layer::SubscriberExt;
    use uuid::Uuid;

    use super::*;

    /// Records which node context each new span was tagged with
    struct Recorder(Arc<Mutex<Vec<Option<NodeId>>>>);

    impl<S> Layer<S> for Recorder
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
            let node = ctx.span(id).and_then(|span| {
                span.extensions()
                    .get::<NodeContextExtension>()
                    .map(|ext| ext.data.node_id)
            });
            self.0.lock().unwrap().push(node);
        }
    }

    #[test]
    fn test_spans_tagged_with_active_node() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry()
            .with(NodeContextLayer::new())
            .with(Recorder(Arc::clone(&seen)));

        tracing::subscriber::with_default(subscriber, || {
            let _outside = tracing::info_span!("outside");
            let _guard = NodeContextGuard::new(NodeId(2), NodeRole::Orbital, Uuid::new_v4());
            let _inside = node_span();
        });

        assert_eq!(*seen.lock().unwrap(), vec![None, Some(NodeId(2))]);
    }

    #[test]
    fn test_node_span_without_context_is_disabled() {
        assert!(node_span().is_none());
    }
}
