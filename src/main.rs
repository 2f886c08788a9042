use scnodes::cli::{Args, Command};
use scnodes::config::Settings;
use scnodes::core::{AppContext, TaskOutcome};
use scnodes::editor::export::{TileGrid, WorldRect, render_stack};
use scnodes::entities::attrs::AttrValue;
use scnodes::entities::keys::{P_PATH, P_PIXEL_SIZE};
use scnodes::entities::registry;
use scnodes::paths::{self, PathConfig};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{debug, info};
use std::path::Path;

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| paths::data_file("scnodes.log", path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn render(
    ctx: &mut AppContext,
    project: &Path,
    output: &Path,
    pixel_size: f64,
    stack: Option<&Path>,
) -> Result<()> {
    ctx.load_project(project)?;
    if ctx.editor.frame_count() == 0 {
        bail!("Project {} has no frames in the correlation editor", project.display());
    }

    ctx.spawn_scene_export(output.to_path_buf(), pixel_size)?;
    for report in ctx.tasks.wait_all() {
        if let TaskOutcome::Failed(msg) = report.outcome {
            bail!("{}", msg);
        }
    }
    println!("Wrote {}", output.display());

    if let Some(path) = stack {
        let layers = ctx.editor.render_layers();
        let rect = WorldRect::of_layers(&layers).context("All layers are hidden")?;
        let grid = TileGrid::new(rect, pixel_size, ctx.settings.tile_size)?;
        let channels = render_stack(&layers, &grid);
        channels.save_tiff(path)?;
        println!("Wrote {} channel(s) to {}", channels.planes.len(), path.display());
    }
    Ok(())
}

fn process(
    ctx: &mut AppContext,
    input: &Path,
    output: &Path,
    titles: &[String],
    pixel_size: f64,
    save_project: Option<&Path>,
) -> Result<()> {
    let mut last = ctx.graph.create_node("Load data")?;
    ctx.graph.set_param(last, P_PATH, AttrValue::Str(input.display().to_string()))?;
    ctx.graph.set_param(last, P_PIXEL_SIZE, AttrValue::Float(pixel_size))?;

    for title in titles {
        let id = ctx.graph.create_node(title)?;
        ctx.graph
            .connect_auto(last, id)
            .with_context(|| format!("Cannot append '{}' to the pipeline", title))?;
        last = id;
    }
    ctx.tick();

    if let Some(path) = save_project {
        ctx.save_project(path)?;
    }

    let title = titles.last().map(String::as_str).unwrap_or("Load data");
    let prefix = title.to_lowercase().replace(' ', "_");
    let written = ctx.export_node(last, output, &prefix)?;
    println!("Wrote {} frame(s) to {}", written.len(), output.display());
    Ok(())
}

fn list_nodes() {
    for (group, nodes) in registry::by_group() {
        println!("{}", group);
        for n in nodes.iter().filter(|n| n.enabled) {
            println!("  {}", n.title);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());

    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("scnodes {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings = Settings::load(&path_config);
    let Some(command) = args.command else {
        use clap::CommandFactory;
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Nodes => list_nodes(),
        Command::Render { project, output, pixel_size, tile_size, stack } => {
            let mut ctx = AppContext::new(settings)?;
            if let Some(t) = tile_size {
                ctx.settings.tile_size = t.max(1);
            }
            render(&mut ctx, &project, &output, pixel_size, stack.as_deref())?;
        }
        Command::Process { input, output, nodes, pixel_size, save_project } => {
            let ps = pixel_size.unwrap_or(settings.default_pixel_size);
            if !(ps > 0.0) {
                return Err(anyhow!("Pixel size must be positive, got {}", ps));
            }
            let mut ctx = AppContext::new(settings)?;
            process(&mut ctx, &input, &output, &nodes, ps, save_project.as_deref())?;
        }
    }
    Ok(())
}
