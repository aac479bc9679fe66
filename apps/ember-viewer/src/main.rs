//! Ember Viewer
//!
//! Draws a textured, slowly rotating model with depth testing.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-viewer -- [ASSETS_DIR] [OPTIONS]
//! ```
//!
//! The assets directory (default `assets`) must contain `models/viking_room.obj`,
//! `textures/viking_room.png` and the compiled shaders `shaders/vert.spv` and
//! `shaders/frag.spv`. Building the viewer compiles the workspace `assets/shaders`
//! sources into those two files.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod args;

use ember_app::{run_app, AppConfig};

use crate::args::ViewerArgs;

fn main() -> anyhow::Result<()> {
    let args = ViewerArgs::parse(std::env::args().skip(1))?;
    if args.help {
        print_help();
        return Ok(());
    }

    run_app(args.apply(AppConfig::default()))
}

fn print_help() {
    eprintln!(
        "Ember Viewer

USAGE:
    cargo run -p ember-viewer -- [ASSETS_DIR] [OPTIONS]

OPTIONS:
    -a, --assets <DIR>        Assets root (default: assets)
    --size <WxH>              Initial window size (default: 800x600)
    --vsync                   Present with FIFO even when mailbox is available
    --validation              Enable the Vulkan validation layer
    --no-validation           Disable the Vulkan validation layer
    --frames-in-flight <N>    Frames recorded ahead of the GPU (default: 2)
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log level (e.g., info, debug, trace)"
    );
}
