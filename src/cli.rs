use clap::{Parser, Subcommand};
use std::path::PathBuf;

const VERSION_INFO: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Target: ",
    env!("CARGO_PKG_NAME"),
    " (headless)"
);

/// CLEM workbench core: node-graph processing and correlation scene export
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable debug logging to file (default: scnodes.log in the data dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render the correlation scene of a project to PNG (tiled)
    Render {
        /// Project JSON file
        #[arg(value_name = "PROJECT")]
        project: PathBuf,

        /// Output PNG path
        #[arg(short = 'o', long = "output", value_name = "PNG")]
        output: PathBuf,

        /// Output pixel size in nm
        #[arg(short = 'p', long = "pixel-size", value_name = "NM", default_value_t = 10.0)]
        pixel_size: f64,

        /// Tile edge in pixels (default: from settings)
        #[arg(short = 't', long = "tile-size", value_name = "PX")]
        tile_size: Option<usize>,

        /// Also write a multi-page grayscale TIFF with one page per layer
        #[arg(long = "stack", value_name = "TIFF")]
        stack: Option<PathBuf>,
    },

    /// Run a linear node pipeline over an image file or directory and write TIFFs
    Process {
        /// Input image file or directory of frames
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output directory
        #[arg(short = 'o', long = "output", value_name = "DIR")]
        output: PathBuf,

        /// Node titles appended after "Load data", in order (e.g. -n "Spatial filter")
        #[arg(short = 'n', long = "node", value_name = "TITLE")]
        nodes: Vec<String>,

        /// Input pixel size in nm (default: from settings)
        #[arg(short = 'p', long = "pixel-size", value_name = "NM")]
        pixel_size: Option<f64>,

        /// Save the built graph as a project file
        #[arg(long = "save-project", value_name = "JSON")]
        save_project: Option<PathBuf>,
    },

    /// List available node types by group
    Nodes,
}
