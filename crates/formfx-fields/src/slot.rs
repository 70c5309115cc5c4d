//! Render-slot resolution for array items.
//!
//! A slot is a named hook in an array item (`addition`, `remove`, ...) that
//! callers can override. Resolution order: custom renderer for the slot,
//! then the fallback `render`, and finally the optional wrapper.

use std::fmt;
use std::rc::Rc;

use formfx_core::collections::map::HashMap;

use crate::array::ArrayContext;

pub type SlotCallback<N> = Rc<dyn Fn(usize, &ArrayContext) -> Option<N>>;

/// Custom renderer registered for a slot.
pub enum SlotRenderer<N> {
    /// Called with the current item index and the array context.
    Callback(SlotCallback<N>),
    /// Ready-made node handed to the fallback render.
    Node(N),
}

impl<N> SlotRenderer<N> {
    pub fn callback(f: impl Fn(usize, &ArrayContext) -> Option<N> + 'static) -> Self {
        SlotRenderer::Callback(Rc::new(f))
    }
}

impl<N: Clone> Clone for SlotRenderer<N> {
    fn clone(&self) -> Self {
        match self {
            SlotRenderer::Callback(f) => SlotRenderer::Callback(Rc::clone(f)),
            SlotRenderer::Node(node) => SlotRenderer::Node(node.clone()),
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for SlotRenderer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRenderer::Callback(_) => f.write_str("Callback(..)"),
            SlotRenderer::Node(node) => f.debug_tuple("Node").field(node).finish(),
        }
    }
}

/// Custom renderers keyed by slot name.
pub type Renders<N> = HashMap<String, SlotRenderer<N>>;

/// What a wrapper receives: the context plus whatever the slot produced.
#[derive(Debug)]
pub struct WrapperProps<'a, N> {
    pub context: &'a ArrayContext,
    pub children: Option<N>,
}

/// Output of a slot. Never "nothing": an empty slot is an explicit
/// placeholder so the tree keeps its shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rendered<N> {
    Node(N),
    Empty,
}

impl<N> Rendered<N> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Rendered::Empty)
    }

    pub fn into_node(self) -> Option<N> {
        match self {
            Rendered::Node(node) => Some(node),
            Rendered::Empty => None,
        }
    }
}

impl<N> From<Option<N>> for Rendered<N> {
    fn from(node: Option<N>) -> Self {
        node.map_or(Rendered::Empty, Rendered::Node)
    }
}

impl ArrayContext {
    /// Resolves slot `name` for the current item.
    ///
    /// `render` is the fallback: it receives the slot's node override, or
    /// `None` when the slot has no override at all. A callback override
    /// bypasses `render`. When `wrapper` is given, its output replaces the
    /// slot output.
    pub fn render_with<N: Clone>(
        &self,
        renders: &Renders<N>,
        name: &str,
        render: impl FnOnce(Option<N>) -> Option<N>,
        wrapper: Option<&dyn Fn(WrapperProps<'_, N>) -> Option<N>>,
    ) -> Rendered<N> {
        let children = match renders.get(name) {
            Some(SlotRenderer::Callback(callback)) => callback(self.current_index, self),
            Some(SlotRenderer::Node(node)) => render(Some(node.clone())),
            None => render(None),
        };
        match wrapper {
            Some(wrapper) => wrapper(WrapperProps {
                context: self,
                children,
            })
            .into(),
            None => children.into(),
        }
    }
}
