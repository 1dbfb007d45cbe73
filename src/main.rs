use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wireblocks::{
    BlockOptions, CGenerator, DragController, EditorConfig, PinKind, Point, PointerButton, Project,
    ValidatedWorkspace, Workspace,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    println!("Wireblocks - block editor walkthrough");
    println!("=====================================\n");

    // Optional first argument: editor config file
    let config = match std::env::args().nth(1) {
        Some(path) => EditorConfig::load_or_default(PathBuf::from(path).as_path())?,
        None => EditorConfig::default(),
    };
    let mut ws = Workspace::with_config(config);
    ws.wiring_mut().attach(13, "status", PinKind::Led);
    ws.wiring_mut().attach(5, "arm", PinKind::Servo);
    println!("✓ Wired {} pins", ws.wiring().len());

    // Blink stack: led on, wait, led off
    let on = ws.new_block_with("led", BlockOptions::at(20.0, 20.0))?;
    let wait = ws.new_block_with("wiring_delay", BlockOptions::at(20.0, 200.0))?;
    let ms = ws.new_block_with("math_number", BlockOptions::at(200.0, 200.0))?;
    ws.set_field_value(ms, "NUM", "500")?;
    let off = ws.new_block_with("led", BlockOptions::at(20.0, 400.0))?;
    ws.set_field_value(off, "VAL", "OFF")?;

    let socket = ws.block(wait)?.get_input("MS").and_then(|i| i.connection());
    let plug = ws.block(ms)?.output_connection();
    if let (Some(socket), Some(plug)) = (socket, plug) {
        ws.connect(socket, plug)?;
    }
    println!("✓ Plugged the delay into its wait block");

    // Drag the wait block under the first led, and the second led under it
    let mut drag = DragController::new();
    for (moving, target) in [(wait, on), (off, wait)] {
        let below = match ws.block(target)?.next_connection() {
            Some(next) => ws.connection(next)?.position(),
            None => continue,
        };
        let grab = ws.block(moving)?.position();
        drag.pointer_down(&mut ws, moving, grab, PointerButton::Primary)?;
        drag.pointer_move(&mut ws, Point::new(grab.x + 30.0, grab.y + 30.0))?;
        drag.pointer_move(&mut ws, below)?;
        let outcome = drag.pointer_up(&mut ws, below)?;
        println!("✓ Dropped block: {:?}", outcome);
    }
    let settled = ws.flush_tasks()?;
    println!("  Deferred tasks run: {}", settled);

    let result = ws.validate();
    println!("\n🔍 Validation:");
    println!("  └─ Errors: {}", result.errors().len());
    println!("  └─ Warnings: {}", result.warnings().len());

    println!("\n📊 Workspace:");
    println!("  └─ Blocks: {}", ws.block_count());
    println!("  └─ Top blocks: {}", ws.top_blocks(false).len());
    println!("  └─ Events logged: {}", ws.events().len());

    let code = CGenerator::workspace_to_code(&ws)?;
    println!("\n📝 Generated C:\n{}", code);

    // Optional second argument: save the program as a project
    if let Some(dir) = std::env::args().nth(2) {
        let dir = PathBuf::from(dir);
        let project = if dir.join("manifest.json").exists() {
            Project::open(&dir)?
        } else {
            Project::create(&dir)?
        };
        project.save(&mut ws)?;
        println!("✓ Saved project to {}", dir.display());
    }

    Ok(())
}
