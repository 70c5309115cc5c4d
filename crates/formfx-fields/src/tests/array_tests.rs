use super::*;

fn context<T>(value: &[T], bounds: ArrayBounds, flags: ArrayFlags) -> ArrayContext {
    compute_array_context_for(Some(value), &bounds, &flags, 0)
}

#[test]
fn empty_array_without_bounds() {
    let ctx = context::<i32>(&[], ArrayBounds::default(), ArrayFlags::default());
    assert!(ctx.is_empty);
    assert!(ctx.allow_remove);
    assert!(ctx.allow_addition);
    assert!(!ctx.allow_move_up);
    assert!(!ctx.allow_move_down);
}

#[test]
fn absent_value_counts_as_empty() {
    let ctx = compute_array_context_for::<i32>(
        None,
        &ArrayBounds::default(),
        &ArrayFlags::default(),
        0,
    );
    assert!(ctx.is_empty);
    assert_eq!(ctx.len, 0);
}

#[test]
fn full_array_forbids_addition() {
    let ctx = context(
        &[1, 2, 3],
        ArrayBounds::new(Some(1), Some(3)),
        ArrayFlags::default(),
    );
    assert!(ctx.allow_remove);
    assert!(!ctx.allow_addition);
    assert!(ctx.allow_move_up);
    assert!(ctx.allow_move_down);
}

#[test]
fn array_at_minimum_forbids_removal() {
    let ctx = context(&[1], ArrayBounds::at_least(1), ArrayFlags::default());
    assert!(!ctx.allow_remove);
    assert!(ctx.allow_addition);
    assert!(!ctx.allow_move_up);
}

#[test]
fn disabled_array_allows_nothing() {
    let ctx = context(&[1, 2], ArrayBounds::default(), ArrayFlags::disabled());
    assert!(!ctx.is_empty);
    assert!(ctx.is_disable);
    assert!(!ctx.allow_remove);
    assert!(!ctx.allow_addition);
    assert!(!ctx.allow_move_up);
    assert!(!ctx.allow_move_down);
}

#[test]
fn non_editable_array_counts_as_disabled() {
    let ctx = context(&[1, 2], ArrayBounds::default(), ArrayFlags::read_only());
    assert!(ctx.is_disable);
    assert!(!ctx.allow_addition);

    let editable = ArrayFlags {
        editable: Some(true),
        ..ArrayFlags::default()
    };
    assert!(!context(&[1, 2], ArrayBounds::default(), editable).is_disable);
}

#[test]
fn fixed_order_array_cannot_move() {
    let ctx = context(&[1, 2, 3], ArrayBounds::default(), ArrayFlags::fixed_order());
    assert!(!ctx.allow_move_up);
    assert!(!ctx.allow_move_down);
    assert!(ctx.allow_remove);
    assert!(ctx.allow_addition);
}

#[test]
fn move_up_and_down_always_agree() {
    for len in 0..5 {
        for flags in [
            ArrayFlags::default(),
            ArrayFlags::disabled(),
            ArrayFlags::fixed_order(),
        ] {
            for index in 0..len.max(1) {
                let ctx = compute_array_context(len, &ArrayBounds::default(), &flags, index);
                assert_eq!(ctx.allow_move_up, ctx.allow_move_down);
            }
        }
    }
}

#[test]
fn inconsistent_bounds_degrade_to_most_restrictive() {
    let bounds = ArrayBounds::new(Some(5), Some(2));
    assert!(!bounds.is_consistent());

    let ctx = compute_array_context(3, &bounds, &ArrayFlags::default(), 0);
    assert!(!ctx.allow_addition);
    assert!(!ctx.allow_remove);
    assert!(ctx.allow_move_up);
}

#[test]
fn context_is_a_pure_function_of_inputs() {
    let bounds = ArrayBounds::at_most(4);
    let flags = ArrayFlags::default();
    let first = compute_array_context(2, &bounds, &flags, 1);
    let second = compute_array_context(2, &bounds, &flags, 1);
    assert_eq!(first, second);
    assert_eq!(first.at(0).current_index, 0);
    assert_eq!(first.at(0).allow_addition, first.allow_addition);
}
