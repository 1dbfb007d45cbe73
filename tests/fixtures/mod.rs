// Helpers to build test workspaces with common program shapes
#![allow(dead_code)]

use wireblocks::{BlockId, BlockOptions, ConnectionId, PinKind, Workspace};

/// The socket of a named input
pub fn socket(ws: &Workspace, block: BlockId, input: &str) -> ConnectionId {
    ws.block(block)
        .unwrap()
        .get_input(input)
        .and_then(|i| i.connection())
        .unwrap()
}

/// Plug a value or statement block into a named input
pub fn plug_into(ws: &mut Workspace, parent: BlockId, input: &str, child: BlockId) {
    let socket = socket(ws, parent, input);
    let plug = ws.block(child).unwrap().inferior_connection().unwrap();
    ws.connect(socket, plug).unwrap();
}

/// Hang `below` from the next-statement connection of `above`
pub fn stack(ws: &mut Workspace, above: BlockId, below: BlockId) {
    let next = ws.block(above).unwrap().next_connection().unwrap();
    let previous = ws.block(below).unwrap().previous_connection().unwrap();
    ws.connect(next, previous).unwrap();
}

pub fn number(ws: &mut Workspace, value: &str) -> BlockId {
    let id = ws.new_block("math_number").unwrap();
    ws.set_field_value(id, "NUM", value).unwrap();
    id
}

pub fn number_at(ws: &mut Workspace, value: &str, x: f32, y: f32) -> BlockId {
    let id = ws.new_block_with("math_number", BlockOptions::at(x, y)).unwrap();
    ws.set_field_value(id, "NUM", value).unwrap();
    id
}

/// Blocks of the blink program built by `create_blink_workspace`
pub struct Blink {
    pub on: BlockId,
    pub wait: BlockId,
    pub delay: BlockId,
    pub off: BlockId,
}

/// Pin 13 wired to an LED, and one stack switching it on and off with a
/// 500 ms pause in between
pub fn create_blink_workspace() -> (Workspace, Blink) {
    let mut ws = Workspace::new();
    ws.wiring_mut().attach(13, "status", PinKind::Led);

    let on = ws.new_block_with("led", BlockOptions::at(20.0, 20.0)).unwrap();
    let wait = ws.new_block("wiring_delay").unwrap();
    let delay = number(&mut ws, "500");
    plug_into(&mut ws, wait, "MS", delay);
    let off = ws.new_block("led").unwrap();
    ws.set_field_value(off, "VAL", "OFF").unwrap();

    stack(&mut ws, on, wait);
    stack(&mut ws, wait, off);

    (ws, Blink { on, wait, delay, off })
}

/// A stack of `count` LED blocks at the origin, top first
pub fn create_led_stack(ws: &mut Workspace, count: usize) -> Vec<BlockId> {
    let blocks: Vec<BlockId> = (0..count).map(|_| ws.new_block("led").unwrap()).collect();
    for pair in blocks.windows(2) {
        stack(ws, pair[0], pair[1]);
    }
    blocks
}
