// Structural invariants of the block tree, exercised through the public API

mod fixtures;

use assert_matches::assert_matches;
use fixtures::*;
use proptest::prelude::*;
use std::rc::Rc;
use wireblocks::connection::check;
use wireblocks::{
    BlockBuilder, BlockDefinition, BlockError, BlockId, BlockOptions, BlockRegistry, ConnectionId, ConnectionKind,
    EditorConfig, Point, ValidatedWorkspace, Validator, Workspace,
};

fn all_connections(ws: &Workspace, blocks: &[BlockId]) -> Vec<ConnectionId> {
    blocks
        .iter()
        .flat_map(|b| ws.block(*b).unwrap().connections(true))
        .collect()
}

fn is_indexed_anywhere(ws: &Workspace, id: ConnectionId) -> bool {
    ConnectionKind::ALL.iter().any(|kind| ws.index(*kind).contains(id))
}

#[test]
fn test_number_plugs_into_number_slot() {
    let mut ws = Workspace::new();
    let x = ws.new_block("math_number").unwrap();
    let y = ws.new_block("servo").unwrap();

    let output = ws.block(x).unwrap().output_connection().unwrap();
    ws.connect(output, socket(&ws, y, "A")).unwrap();

    assert_eq!(ws.input_target_block(y, "A").unwrap(), Some(x));
    assert_eq!(ws.root_block(x).unwrap(), y);
}

#[test]
fn test_links_are_symmetric() {
    let (mut ws, blink) = create_blink_workspace();
    let wait_prev = ws.block(blink.wait).unwrap().previous_connection().unwrap();
    let on_next = ws.block(blink.on).unwrap().next_connection().unwrap();

    assert_eq!(ws.connection(on_next).unwrap().target(), Some(wait_prev));
    assert_eq!(ws.connection(wait_prev).unwrap().target(), Some(on_next));

    ws.disconnect(on_next).unwrap();
    assert_eq!(ws.connection(on_next).unwrap().target(), None);
    assert_eq!(ws.connection(wait_prev).unwrap().target(), None);
    // The rest of the stack travels with the detached block.
    assert_eq!(ws.next_block(blink.wait).unwrap(), Some(blink.off));
    assert_eq!(ws.top_blocks(true), vec![blink.on, blink.wait]);
}

#[test]
fn test_children_line_up_under_their_sockets() {
    let (ws, blink) = create_blink_workspace();
    for (above, below) in [(blink.on, blink.wait), (blink.wait, blink.off)] {
        let next = ws.block(above).unwrap().next_connection().unwrap();
        let previous = ws.block(below).unwrap().previous_connection().unwrap();
        assert_eq!(
            ws.connection(next).unwrap().position(),
            ws.connection(previous).unwrap().position()
        );
    }
    let delay_out = ws.block(blink.delay).unwrap().output_connection().unwrap();
    assert_eq!(
        ws.connection(delay_out).unwrap().position(),
        ws.connection(socket(&ws, blink.wait, "MS")).unwrap().position()
    );
}

#[test]
fn test_closest_sees_moved_connection_at_new_position() {
    let mut ws = Workspace::new();
    let target = ws.new_block_with("led", BlockOptions::at(0.0, 0.0)).unwrap();
    let probe = ws.new_block_with("led", BlockOptions::at(600.0, 0.0)).unwrap();
    let target_next = ws.block(target).unwrap().next_connection().unwrap();
    let probe_prev = ws.block(probe).unwrap().previous_connection().unwrap();
    let old = ws.connection(target_next).unwrap().position();

    ws.move_block_to(target, Point::new(300.0, 300.0)).unwrap();
    let new = ws.connection(target_next).unwrap().position();
    assert_eq!(new, old.offset(300.0, 300.0));

    let from = ws.connection(probe_prev).unwrap().position();
    let at_old = ws.closest(probe_prev, 10.0, old.x - from.x, old.y - from.y).unwrap();
    assert_eq!(at_old.connection, None);
    let at_new = ws.closest(probe_prev, 10.0, new.x - from.x, new.y - from.y).unwrap();
    assert_eq!(at_new.connection, Some(target_next));
    assert_eq!(at_new.radius, 0.0);

    let entry = ws
        .index(ConnectionKind::NextStatement)
        .entries()
        .iter()
        .find(|e| e.id == target_next)
        .copied()
        .unwrap();
    assert_eq!(entry.position, new);
    assert!(Validator::validate(&ws).is_valid());
}

#[test]
fn test_cycles_are_rejected_at_depth() {
    let mut ws = Workspace::new();
    let outer = ws.new_block("controls_while").unwrap();
    let middle = ws.new_block("controls_while").unwrap();
    let inner = ws.new_block("controls_while").unwrap();
    plug_into(&mut ws, outer, "DO", middle);
    plug_into(&mut ws, middle, "DO", inner);

    let outer_prev = ws.block(outer).unwrap().previous_connection().unwrap();
    assert_matches!(
        ws.connect(socket(&ws, inner, "DO"), outer_prev),
        Err(BlockError::WouldCreateCycle(b)) if b == outer
    );
    let inner_next = ws.block(inner).unwrap().next_connection().unwrap();
    assert_matches!(ws.connect(inner_next, outer_prev), Err(BlockError::WouldCreateCycle(_)));

    let top = ws.new_block("math_arithmetic").unwrap();
    let mid = ws.new_block("math_arithmetic").unwrap();
    let low = ws.new_block("math_arithmetic").unwrap();
    plug_into(&mut ws, top, "A", mid);
    plug_into(&mut ws, mid, "A", low);
    let top_out = ws.block(top).unwrap().output_connection().unwrap();
    assert_matches!(
        ws.connect(socket(&ws, low, "B"), top_out),
        Err(BlockError::WouldCreateCycle(_))
    );

    assert_eq!(ws.top_blocks(false), vec![outer, top]);
    assert!(ws.validate().is_valid());
}

#[test]
fn test_destroy_cascades_through_subtree() {
    let mut ws = Workspace::new();
    let keep = ws.new_block_with("led", BlockOptions::at(500.0, 0.0)).unwrap();
    let loop_block = ws.new_block("controls_while").unwrap();
    let condition = ws.new_block("logic_compare").unwrap();
    let a = number(&mut ws, "1");
    let b = number(&mut ws, "2");
    plug_into(&mut ws, condition, "A", a);
    plug_into(&mut ws, condition, "B", b);
    plug_into(&mut ws, loop_block, "BOOL", condition);
    let body = create_led_stack(&mut ws, 3);
    plug_into(&mut ws, loop_block, "DO", body[0]);

    let doomed = ws.descendants(loop_block).unwrap();
    assert_eq!(doomed.len(), 7);
    let connections = all_connections(&ws, &doomed);
    let before = ws.block_count();

    ws.destroy_block(loop_block, false).unwrap();

    assert_eq!(ws.block_count(), before - doomed.len());
    assert!(doomed.iter().all(|b| !ws.contains_block(*b)));
    for connection in connections {
        assert!(ws.get_connection(connection).is_none());
        assert!(!is_indexed_anywhere(&ws, connection));
    }
    assert_eq!(ws.top_blocks(false), vec![keep]);
    assert_eq!(ws.connection_count(), 2);
    assert!(ws.validate().is_valid());
}

#[test]
fn test_gentle_destroy_heals_gap() {
    let mut ws = Workspace::new();
    let stack = create_led_stack(&mut ws, 3);
    let (a, b, c) = (stack[0], stack[1], stack[2]);

    ws.destroy_block(b, true).unwrap();

    assert!(!ws.contains_block(b));
    assert_eq!(ws.next_block(a).unwrap(), Some(c));
    assert_eq!(ws.block(c).unwrap().parent(), Some(a));
    let a_next = ws.block(a).unwrap().next_connection().unwrap();
    let c_prev = ws.block(c).unwrap().previous_connection().unwrap();
    assert_eq!(ws.connection(a_next).unwrap().position(), ws.connection(c_prev).unwrap().position());
    assert!(ws.validate().is_valid());
}

#[test]
fn test_plain_destroy_takes_rest_of_stack() {
    let mut ws = Workspace::new();
    let stack = create_led_stack(&mut ws, 3);

    ws.destroy_block(stack[1], false).unwrap();

    assert_eq!(ws.block_count(), 1);
    assert_eq!(ws.next_block(stack[0]).unwrap(), None);
}

#[test]
fn test_destroying_procedure_removes_callers() {
    let mut ws = Workspace::new();
    let def = ws.new_block_with("procedures_defnoreturn", BlockOptions::at(400.0, 0.0)).unwrap();
    ws.set_field_value(def, "NAME", "flash").unwrap();

    let stack = create_led_stack(&mut ws, 2);
    let call = ws.new_block("procedures_callnoreturn").unwrap();
    ws.set_field_value(call, "NAME", "Flash").unwrap();
    let previous = ws.block(stack[1]).unwrap().previous_connection().unwrap();
    ws.disconnect(previous).unwrap();
    stack_blocks(&mut ws, &[stack[0], call, stack[1]]);

    assert_eq!(ws.procedure_callers("flash"), vec![call]);
    ws.destroy_block(def, false).unwrap();

    assert!(!ws.contains_block(call));
    assert_eq!(ws.next_block(stack[0]).unwrap(), Some(stack[1]));
    assert_eq!(ws.all_procedures(), (vec![], vec![]));
}

fn stack_blocks(ws: &mut Workspace, blocks: &[BlockId]) {
    for pair in blocks.windows(2) {
        stack(ws, pair[0], pair[1]);
    }
}

#[test]
fn test_collapse_hides_inputs_from_snapping() {
    let mut ws = Workspace::new();
    let loop_block = ws.new_block("controls_while").unwrap();
    let body = create_led_stack(&mut ws, 2);
    plug_into(&mut ws, loop_block, "DO", body[0]);
    let hidden = all_connections(&ws, &body);
    let loop_next = ws.block(loop_block).unwrap().next_connection().unwrap();

    ws.set_collapsed(loop_block, true).unwrap();
    for connection in &hidden {
        assert!(ws.connection(*connection).unwrap().is_hidden());
        assert!(!is_indexed_anywhere(&ws, *connection));
    }
    assert!(ws.connection(loop_next).unwrap().is_indexed());
    assert!(ws.validate().is_valid());

    // A body block pulled out of the fold becomes visible again.
    let tail_prev = ws.block(body[1]).unwrap().previous_connection().unwrap();
    ws.disconnect(tail_prev).unwrap();
    assert!(ws.connection(tail_prev).unwrap().is_indexed());
    assert!(ws.validate().is_valid());

    ws.set_collapsed(loop_block, false).unwrap();
    for connection in all_connections(&ws, &body) {
        assert!(ws.connection(connection).unwrap().is_indexed());
    }
    assert!(ws.validate().is_valid());
}

fn math_negate(block: &mut BlockBuilder) {
    block
        .colour(230)
        .title("-")
        .value_input("NUM", None, check(&["Number"]))
        .output(check(&["Number"]));
}

fn workspace_with_negate() -> Workspace {
    let mut registry = BlockRegistry::with_builtins();
    registry.register(BlockDefinition::new("math_negate", "Math", math_negate));
    Workspace::with_registry(Rc::new(registry), EditorConfig::default())
}

#[test]
fn test_displaced_value_moves_into_single_free_input() {
    let mut ws = workspace_with_negate();
    let slot = ws.new_block("servo").unwrap();
    let x = ws.new_block("math_number").unwrap();
    plug_into(&mut ws, slot, "A", x);

    let z = ws.new_block("math_negate").unwrap();
    let z_out = ws.block(z).unwrap().output_connection().unwrap();
    ws.connect(z_out, socket(&ws, slot, "A")).unwrap();

    assert_eq!(ws.input_target_block(slot, "A").unwrap(), Some(z));
    assert_eq!(ws.input_target_block(z, "NUM").unwrap(), Some(x));
    assert!(ws.scheduler().is_empty());
    assert!(ws.validate().is_valid());
}

#[test]
fn test_displaced_value_with_two_candidates_is_nudged() {
    let mut ws = Workspace::new();
    let slot = ws.new_block("servo").unwrap();
    let x = ws.new_block("math_number").unwrap();
    plug_into(&mut ws, slot, "A", x);

    let z = ws.new_block("math_arithmetic").unwrap();
    let z_out = ws.block(z).unwrap().output_connection().unwrap();
    let slot_socket = socket(&ws, slot, "A");
    ws.connect(z_out, slot_socket).unwrap();

    assert_eq!(ws.block(x).unwrap().parent(), None);
    assert_eq!(ws.input_target_block(z, "A").unwrap(), None);
    assert_eq!(ws.input_target_block(z, "B").unwrap(), None);

    let x_out = ws.block(x).unwrap().output_connection().unwrap();
    let before = ws.connection(x_out).unwrap().position();
    // Not yet: the nudge waits for the bump delay.
    assert_eq!(ws.advance_time(100).unwrap(), 0);
    assert_eq!(ws.advance_time(150).unwrap(), 1);

    let after = ws.connection(x_out).unwrap().position();
    let away = ws.connection(slot_socket).unwrap().position();
    assert_ne!(before, after);
    assert_eq!(after, away.offset(25.0, 50.0));
    assert_eq!(ws.top_blocks(false).last(), Some(&x));
}

#[test]
fn test_splice_into_middle_of_stack() {
    let mut ws = Workspace::new();
    let stack = create_led_stack(&mut ws, 2);
    let inserted = ws.new_block_with("servo", BlockOptions::at(300.0, 300.0)).unwrap();
    let top_next = ws.block(stack[0]).unwrap().next_connection().unwrap();
    let inserted_prev = ws.block(inserted).unwrap().previous_connection().unwrap();

    ws.connect(inserted_prev, top_next).unwrap();

    assert_eq!(ws.next_block(stack[0]).unwrap(), Some(inserted));
    assert_eq!(ws.next_block(inserted).unwrap(), Some(stack[1]));
    assert_eq!(ws.top_blocks(false), vec![stack[0]]);
    assert!(ws.scheduler().is_empty());
    assert!(ws.validate().is_valid());
}

#[test]
fn test_stale_nudge_is_skipped_after_destroy() {
    let mut ws = Workspace::new();
    let slot = ws.new_block("servo").unwrap();
    let x = ws.new_block("math_number").unwrap();
    plug_into(&mut ws, slot, "A", x);
    let z = ws.new_block("math_arithmetic").unwrap();
    let z_out = ws.block(z).unwrap().output_connection().unwrap();
    ws.connect(z_out, socket(&ws, slot, "A")).unwrap();

    ws.destroy_block(x, false).unwrap();
    assert_eq!(ws.flush_tasks().unwrap(), 1);
    assert_eq!(ws.block_count(), 2);
}

const POOL: [&str; 8] = [
    "led",
    "led",
    "servo",
    "controls_while",
    "controls_if",
    "math_number",
    "math_arithmetic",
    "logic_compare",
];

fn superior_connections(ws: &Workspace, block: BlockId) -> Vec<ConnectionId> {
    ws.block(block)
        .unwrap()
        .connections(true)
        .into_iter()
        .filter(|c| ws.connection(*c).unwrap().is_superior())
        .collect()
}

/// One random edit. Rejected edits are fine; they must leave no trace.
fn apply(ws: &mut Workspace, ids: &[BlockId], (op, i, j, k): (u8, usize, usize, usize)) {
    let (a, b) = (ids[i % ids.len()], ids[j % ids.len()]);
    if !ws.contains_block(a) || !ws.contains_block(b) {
        return;
    }
    match op {
        0 | 1 => {
            let Some(plug) = ws.block(a).unwrap().inferior_connection() else {
                return;
            };
            let sockets = superior_connections(ws, b);
            if sockets.is_empty() {
                return;
            }
            let socket = sockets[k % sockets.len()];
            let _ = if op == 0 {
                ws.connect(plug, socket)
            } else {
                ws.connect(socket, plug)
            };
        }
        2 => {
            if let Some(plug) = ws.block(a).unwrap().inferior_connection() {
                let _ = ws.disconnect(plug);
            }
        }
        3 => ws.destroy_block(a, k % 2 == 0).unwrap(),
        4 => ws.set_collapsed(a, k % 2 == 0).unwrap(),
        _ => ws.move_block_by(a, (k as f32) * 40.0, 30.0).unwrap(),
    }
}

fn assert_forest(ws: &Workspace) {
    for id in ws.all_blocks() {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(block) = current {
            steps += 1;
            assert!(steps <= ws.block_count(), "parent chain of {id} does not end");
            current = ws.block(block).unwrap().parent();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_edits_keep_tree_and_indexes_consistent(
        ops in prop::collection::vec((0u8..6, 0usize..8, 0usize..8, 0usize..4), 1..40)
    ) {
        let mut ws = Workspace::new();
        let ids: Vec<BlockId> = POOL
            .iter()
            .enumerate()
            .map(|(n, t)| ws.new_block_with(t, BlockOptions::at(n as f32 * 120.0, 0.0)).unwrap())
            .collect();

        for op in ops {
            apply(&mut ws, &ids, op);
            assert_forest(&ws);
            let result = ws.validate();
            prop_assert!(result.is_valid(), "{:?}", result.errors());
        }

        ws.flush_tasks().unwrap();
        prop_assert!(ws.validate().is_valid());
    }
}
