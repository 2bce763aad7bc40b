use clap::{Parser, Subcommand};
use fpga_common::db::design::Design;
use fpga_common::db::device::Device;
use fpga_common::util::config::Config;
use fpga_common::util::{check, generator, logger};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Route,
    Generate {
        #[arg(long, default_value_t = 32)]
        width: u16,
        #[arg(long, default_value_t = 32)]
        height: u16,
        #[arg(long, default_value_t = 200)]
        nets: usize,
        #[arg(long, default_value_t = 4)]
        fanout: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value = "inputs")]
        out_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };

    match args.command.unwrap_or(Commands::Route) {
        Commands::Generate {
            width,
            height,
            nets,
            fanout,
            seed,
            out_dir,
        } => {
            let safe_fanout = fanout.max(1);
            std::fs::create_dir_all(&out_dir)?;

            log::info!(
                "Generating random benchmark ({}x{} grid, {} nets, fanout <= {})...",
                width,
                height,
                nets,
                safe_fanout
            );
            let device = generator::grid_device(width, height);
            let design = generator::random_design(&device, nets, safe_fanout, seed);

            let device_path = Path::new(&out_dir).join("device.json");
            let design_path = Path::new(&out_dir).join("design.json");
            save_json(&device, &device_path)?;
            save_json(&design, &design_path)?;
            log::info!("Generated: {:?} and {:?}", device_path, design_path);
        }
        Commands::Route => {
            validate_input_paths(&config)?;
            prepare_output_dir(&config.input.output_file)?;

            if let Err(e) = run_routing(&config) {
                log::error!("Routing failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn validate_input_paths(config: &Config) -> anyhow::Result<()> {
    for path in [&config.input.device_file, &config.input.design_file] {
        if !Path::new(path).exists() {
            return Err(anyhow::anyhow!(
                "Input file missing: '{}'. Did you run 'generate'?",
                path
            ));
        }
    }
    Ok(())
}

fn prepare_output_dir(path_str: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path_str).parent() {
        if !parent.exists() && !parent.as_os_str().is_empty() {
            log::info!("Creating output directory: {:?}", parent);
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn run_routing(config: &Config) -> anyhow::Result<()> {
    log::info!("Loading device: {}", config.input.device_file);
    let mut device: Device = load_json(&config.input.device_file)?;
    device.rebuild_name_map();
    device
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid device file: {}", e))?;
    log::info!(
        "Device '{}': {} nodes on a {}x{} grid.",
        device.name,
        device.num_nodes(),
        device.width,
        device.height
    );

    log::info!("Loading design: {}", config.input.design_file);
    let mut design: Design = load_json(&config.input.design_file)?;
    design.rebuild_name_map();
    log::info!("Design '{}': {} nets.", design.name, design.num_nets());

    let device = Arc::new(device);
    let summary = fpga_router::route(Arc::clone(&device), &mut design, config)
        .map_err(|e| anyhow::anyhow!(e))?;
    log::info!(
        "Pushed {} / popped {} nodes over {} iterations.",
        summary.nodes_pushed,
        summary.nodes_popped,
        summary.iterations
    );

    check::run(&device, &design).map_err(|e| anyhow::anyhow!("Verification Failed: {}", e))?;

    log::info!("Writing routed design to {}", config.input.output_file);
    save_json(&design, Path::new(&config.input.output_file))?;
    Ok(())
}

fn load_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let file = File::open(path).map_err(|e| anyhow::anyhow!("Cannot open '{}': {}", path, e))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| anyhow::anyhow!("Invalid JSON in '{}': {}", path, e))
}

fn save_json<T: serde::Serialize>(value: &T, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).map_err(|e| anyhow::anyhow!("Cannot create {:?}: {}", path, e))?;
    serde_json::to_writer(BufWriter::new(file), value)
        .map_err(|e| anyhow::anyhow!("Cannot serialize to {:?}: {}", path, e))?;
    Ok(())
}
