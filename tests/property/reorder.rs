//! Property tests for drag reordering.
//!
//! Uses proptest to verify:
//! 1. `reorder` keeps every item exactly once and lands the moved item at
//!    its destination, preserving the relative order of everything else.
//! 2. Drops resolved by a drag gesture never panic, whatever the board shape
//!    or hovered slot.
//! 3. A same-column drop always yields a permutation of the column.

use std::collections::BTreeSet;

use proptest::prelude::*;

use kanban::drag::{DragGesture, DropAction, reorder};
use kanban_proto::board::{Board, BoardId, Column, ColumnId, Task, TaskId, UserId};

fn task(id: &str, column: &str) -> Task {
    serde_json::from_value(serde_json::json!({
        "_id": id,
        "columnId": column,
        "title": id,
    }))
    .expect("task fixture should parse")
}

/// A board with one column per entry of `sizes`, tasks named `c{i}t{j}`.
fn board_with(sizes: &[usize]) -> Board {
    let columns = sizes
        .iter()
        .enumerate()
        .map(|(ci, &n)| {
            let column_id = format!("c{ci}");
            Column {
                id: ColumnId::from(column_id.as_str()),
                title: format!("Column {ci}"),
                tasks: (0..n)
                    .map(|ti| task(&format!("c{ci}t{ti}"), &column_id))
                    .collect(),
            }
        })
        .collect();
    Board {
        id: BoardId::from("b1"),
        owner: UserId::from("u1"),
        collaborator_ids: BTreeSet::new(),
        title: "Board".into(),
        columns,
    }
}

fn arb_list_and_indices() -> impl Strategy<Value = (Vec<u32>, usize, usize)> {
    prop::collection::vec(any::<u32>(), 1..32).prop_flat_map(|items| {
        let len = items.len();
        (Just(items), 0..len, 0..len)
    })
}

proptest! {
    /// The moved item ends at `to` and no item is lost or duplicated.
    #[test]
    fn reorder_moves_item_and_keeps_multiset((items, from, to) in arb_list_and_indices()) {
        let out = reorder(&items, from, to);
        prop_assert_eq!(out.len(), items.len());
        prop_assert_eq!(out[to], items[from]);

        let mut sorted_in = items.clone();
        let mut sorted_out = out.clone();
        sorted_in.sort_unstable();
        sorted_out.sort_unstable();
        prop_assert_eq!(sorted_in, sorted_out);
    }

    /// Removing the moved item from both sides leaves identical sequences.
    #[test]
    fn reorder_preserves_relative_order((items, from, to) in arb_list_and_indices()) {
        let out = reorder(&items, from, to);
        let mut rest_in = items.clone();
        rest_in.remove(from);
        let mut rest_out = out;
        rest_out.remove(to);
        prop_assert_eq!(rest_in, rest_out);
    }

    /// Moving an item onto its own slot changes nothing.
    #[test]
    fn reorder_to_same_index_is_identity((items, from, _to) in arb_list_and_indices()) {
        prop_assert_eq!(reorder(&items, from, from), items);
    }

    /// Destinations past the end clamp to the last slot.
    #[test]
    fn reorder_clamps_destination(
        (items, from, _to) in arb_list_and_indices(),
        overshoot in 0usize..100,
    ) {
        let last = items.len() - 1;
        prop_assert_eq!(
            reorder(&items, from, last + overshoot),
            reorder(&items, from, last)
        );
    }

    /// Dropping anywhere on any board never panics.
    #[test]
    fn drop_never_panics(
        sizes in prop::collection::vec(0usize..6, 0..5),
        source in 0usize..6,
        target in 0usize..6,
        task_index in 0usize..8,
        hovered in prop::option::of(0usize..12),
    ) {
        let board = board_with(&sizes);
        let source_column = ColumnId::from(format!("c{source}").as_str());
        let destination = ColumnId::from(format!("c{target}").as_str());

        let mut gesture = DragGesture::begin_task(
            TaskId::from(format!("c{source}t{task_index}").as_str()),
            source_column.clone(),
        );
        if let Some(slot) = hovered {
            gesture.hover_task(slot);
        }
        let _ = gesture.drop_on(&board, &destination);
        let _ = DragGesture::begin_column(source_column).drop_on(&board, &destination);
    }

    /// A same-column task drop is always a permutation of that column.
    #[test]
    fn same_column_drop_is_permutation(
        size in 1usize..10,
        picked in 0usize..10,
        hovered in 0usize..12,
    ) {
        prop_assume!(picked < size);
        let board = board_with(&[size]);
        let column_id = ColumnId::from("c0");
        let mut gesture = DragGesture::begin_task(
            TaskId::from(format!("c0t{picked}").as_str()),
            column_id.clone(),
        );
        gesture.hover_task(hovered);

        match gesture.drop_on(&board, &column_id) {
            None => prop_assert_eq!(picked, hovered.min(size - 1)),
            Some(DropAction::ReorderTasks { column_id: id, new_order }) => {
                prop_assert_eq!(&id, &column_id);
                let before: BTreeSet<_> = board.columns[0].tasks.iter().map(|t| t.id.clone()).collect();
                let after: BTreeSet<_> = new_order.iter().map(|t| t.id.clone()).collect();
                prop_assert_eq!(before, after);
                prop_assert_eq!(new_order.len(), size);
                prop_assert_eq!(new_order[hovered.min(size - 1)].id.as_str(), format!("c0t{picked}"));
            }
            Some(other) => prop_assert!(false, "unexpected action {:?}", other),
        }
    }
}
