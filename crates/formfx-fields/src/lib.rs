//! Derived field state for formfx
//!
//! Everything in this crate is a pure function of its inputs and is meant to
//! be recomputed on every render.

mod array;
mod item;
mod slot;

pub use array::*;
pub use item::*;
pub use slot::*;

pub mod prelude {
    pub use crate::array::{compute_array_context, ArrayBounds, ArrayContext, ArrayFlags};
    pub use crate::item::{compute_help, compute_label, compute_status, ItemProps, ItemStatus};
    pub use crate::slot::{Rendered, Renders, SlotRenderer, WrapperProps};
}
