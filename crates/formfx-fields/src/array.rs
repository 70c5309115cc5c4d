//! Affordances of an array field (can add, can remove, can move).

/// Length bounds of an array field. `None` means unbounded on that side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArrayBounds {
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

impl ArrayBounds {
    pub fn new(min_items: Option<usize>, max_items: Option<usize>) -> Self {
        Self {
            min_items,
            max_items,
        }
    }

    pub fn at_least(min_items: usize) -> Self {
        Self::new(Some(min_items), None)
    }

    pub fn at_most(max_items: usize) -> Self {
        Self::new(None, Some(max_items))
    }

    /// Returns false when `min_items > max_items`.
    pub fn is_consistent(&self) -> bool {
        match (self.min_items, self.max_items) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        }
    }
}

/// Mutability flags of an array field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArrayFlags {
    pub disabled: bool,
    /// `Some(false)` forces the field disabled.
    pub editable: Option<bool>,
    /// Defaults to movable when unset.
    pub movable: Option<bool>,
}

impl ArrayFlags {
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            editable: Some(false),
            ..Self::default()
        }
    }

    pub fn fixed_order() -> Self {
        Self {
            movable: Some(false),
            ..Self::default()
        }
    }

    pub fn is_disable(&self) -> bool {
        self.disabled || self.editable == Some(false)
    }

    pub fn is_movable(&self) -> bool {
        self.movable.unwrap_or(true)
    }
}

/// Derived state of one array field as seen from one item slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayContext {
    pub current_index: usize,
    pub len: usize,
    pub is_empty: bool,
    pub is_disable: bool,
    pub allow_addition: bool,
    pub allow_remove: bool,
    pub allow_move_up: bool,
    pub allow_move_down: bool,
}

impl ArrayContext {
    /// Same derivation, seen from another item of the array.
    pub fn at(&self, current_index: usize) -> Self {
        Self {
            current_index,
            ..*self
        }
    }
}

/// Computes the affordances of an array of `len` items.
///
/// Total over its inputs. Inconsistent bounds (`min_items > max_items`)
/// forbid both adding and removing.
pub fn compute_array_context(
    len: usize,
    bounds: &ArrayBounds,
    flags: &ArrayFlags,
    current_index: usize,
) -> ArrayContext {
    let is_disable = flags.is_disable();
    let can_move = len > 1 && !is_disable && flags.is_movable();

    let (allow_remove, allow_addition) = if bounds.is_consistent() {
        let allow_remove = match bounds.min_items {
            Some(min) => len > min && !is_disable,
            None => !is_disable,
        };
        let allow_addition = match bounds.max_items {
            Some(max) => len < max && !is_disable,
            None => !is_disable,
        };
        (allow_remove, allow_addition)
    } else {
        log::debug!(
            "array bounds are inconsistent (min {:?} > max {:?}); adding and removing disabled",
            bounds.min_items,
            bounds.max_items
        );
        (false, false)
    };

    ArrayContext {
        current_index,
        len,
        is_empty: len == 0,
        is_disable,
        allow_addition,
        allow_remove,
        allow_move_up: can_move,
        allow_move_down: can_move,
    }
}

/// [`compute_array_context`] for a possibly absent value. An absent value
/// counts as empty.
pub fn compute_array_context_for<T>(
    value: Option<&[T]>,
    bounds: &ArrayBounds,
    flags: &ArrayFlags,
    current_index: usize,
) -> ArrayContext {
    compute_array_context(value.map_or(0, <[T]>::len), bounds, flags, current_index)
}

#[cfg(test)]
#[path = "tests/array_tests.rs"]
mod tests;
