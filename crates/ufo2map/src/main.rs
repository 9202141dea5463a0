// main.rs -- ufo2map command line

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{error, LevelFilter};
use ufo2map::config::{CompileConfig, DEFAULT_SUBDIVIDE_SIZE};
use ufo2map::qbsp::{bsp_path, compile_map};
use ufo2map_common::bspfile::BspData;
use ufo2map_common::routing::unpack_routing;

#[derive(Parser)]
#[command(name = "ufo2map", version, about = "Compile .map sources into .bsp files")]
struct Cli {
    /// More output; repeat for per-cell routing detail
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a map into <map>.bsp
    Compile {
        map: PathBuf,
        #[command(flatten)]
        options: CompileArgs,
    },
    /// Print the lump sizes of compiled maps
    Info {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct CompileArgs {
    /// Subdivide faces larger than this along a texture axis
    #[arg(long = "subdivide", default_value_t = DEFAULT_SUBDIVIDE_SIZE)]
    subdivide_size: f32,
    /// Keep nodes whose leafs are all solid
    #[arg(long)]
    noprune: bool,
    /// Drop detail brushes
    #[arg(long)]
    nodetail: bool,
    /// Treat detail brushes as structural
    #[arg(long)]
    fulldetail: bool,
    #[arg(long)]
    nomerge: bool,
    /// Drop water, slime and lava brushes
    #[arg(long)]
    nowater: bool,
    #[arg(long)]
    noweld: bool,
    #[arg(long)]
    nosubdiv: bool,
    #[arg(long)]
    notjunc: bool,
    /// Keep faces pointing down
    #[arg(long)]
    nobackclip: bool,
    /// Never share an edge between faces
    #[arg(long)]
    noshare: bool,
    /// Skip maps whose .bsp is newer than the source
    #[arg(long)]
    onlynewer: bool,
    /// Write the routing scan to <map>.route.csv
    #[arg(long)]
    debugtrace: bool,
    /// Skip the routing scan
    #[arg(long)]
    noroute: bool,
    /// Routing worker threads, 0 for one per core
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

impl From<CompileArgs> for CompileConfig {
    fn from(a: CompileArgs) -> Self {
        Self {
            subdivide_size: a.subdivide_size,
            noprune: a.noprune,
            nodetail: a.nodetail,
            fulldetail: a.fulldetail,
            nomerge: a.nomerge,
            nowater: a.nowater,
            noweld: a.noweld,
            nosubdiv: a.nosubdiv,
            notjunc: a.notjunc,
            nobackclip: a.nobackclip,
            noshare: a.noshare,
            onlynewer: a.onlynewer,
            debugtrace: a.debugtrace,
            noroute: a.noroute,
            threads: a.threads,
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Warn,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .init();
}

fn info(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let (bsp, checksum) =
            BspData::load_bsp_file(path).with_context(|| format!("couldn't load {}", path.display()))?;
        println!("{} (checksum {checksum:#06x})", path.display());
        for line in bsp.file_sizes() {
            println!("{line}");
        }
        if bsp.routedata.is_empty() {
            println!("no routing data");
        } else if let Some((_, mins, maxs)) = unpack_routing(&bsp.routedata) {
            println!(
                "routing bounds ({} {} {}) to ({} {} {})",
                mins[0], mins[1], mins[2], maxs[0], maxs[1], maxs[2]
            );
        } else {
            println!("damaged routing data");
        }
        println!();
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Compile { map, options } => {
            let config = CompileConfig::from(options);
            compile_map(&map, &config)
                .with_context(|| format!("compiling {} into {}", map.display(), bsp_path(&map).display()))?;
            Ok(())
        }
        Command::Info { files } => info(&files),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
