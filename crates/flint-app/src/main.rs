// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use flint_core::{init_tracing, DEFAULT_FILTER};
use flint_platform::PlatformWindow;
use flint_render::{FrameOutcome, Mesh, Renderer, RendererDesc, Vertex, WindowSystem};
use flint_render_vk::{builtin_shaders, VkRenderer};
use std::path::PathBuf;
use tracing::{debug, info};

mod config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; defaults apply when it does not exist
    #[arg(long, default_value = config::DEFAULT_CONFIG)]
    config: PathBuf,

    /// Overrides `render.validation` from the config file
    #[arg(long)]
    validation: Option<bool>,
}

fn demo_quad() -> Mesh {
    Mesh::new(
        vec![
            Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0]),
            Vertex::new([0.5, -0.5], [0.0, 1.0, 0.0]),
            Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0]),
            Vertex::new([-0.5, 0.5], [1.0, 1.0, 1.0]),
        ],
        vec![0, 1, 2, 2, 3, 0],
    )
}

fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER);
    let args = Args::parse();

    let mut cfg = config::load(&args.config)?;
    if let Some(validation) = args.validation {
        cfg.render.validation = validation;
    }
    debug!("config: {cfg:?}");

    let desc = RendererDesc {
        app_name: cfg.window.title.clone(),
        validation: cfg.render.validation,
        shaders: cfg.render.shaders(builtin_shaders)?,
        mesh: demo_quad(),
    };

    let mut window = PlatformWindow::open(&cfg.window.title, cfg.window.width, cfg.window.height)?;
    let mut renderer = VkRenderer::new(&window, &desc).context("renderer init")?;

    let mut recreations = 0u64;
    while !window.should_close() {
        match renderer.render(&mut window)? {
            FrameOutcome::PresentedAndRecreated | FrameOutcome::Skipped => {
                recreations += 1;
                let size = renderer.surface_size();
                debug!("drawing at {}x{}", size.width, size.height);
            }
            FrameOutcome::Interrupted => info!("closed while minimized"),
            FrameOutcome::Presented | FrameOutcome::Abandoned => {}
        }
        window.poll_events();
    }

    info!(
        "exiting after {} frames ({recreations} chain rebuilds)",
        renderer.frames_presented()
    );
    // GPU objects reference the surface; they go before the window does.
    drop(renderer);
    drop(window);
    Ok(())
}
