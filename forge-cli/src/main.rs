// bspforge
// Command-line driver for the map-compilation service

mod profile;

use crate::profile::Profile;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use forge_service::{
    build_edit_run, build_geometry_run, build_inspect_run, build_lighting_run,
    build_visibility_run, log_channel, Artifact, CallerInput, ChainPlan, Controller,
    EditOptions, InitOptions, InspectOptions, StageKind,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bspforge")]
#[command(about = "Quake map compilation driver", version)]
struct Cli {
    /// Profile file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write delivered artifacts here instead of next to the input
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile map geometry (qbsp)
    Bsp {
        map: PathBuf,
        /// Texture WAD staged alongside the map (repeatable)
        #[arg(long)]
        wad: Vec<PathBuf>,
    },
    /// Light a compiled bsp
    Light { bsp: PathBuf },
    /// Compute visibility for a compiled bsp
    Vis {
        bsp: PathBuf,
        /// Portal file from the geometry stage
        #[arg(long)]
        prt: Option<PathBuf>,
    },
    /// Print bsp statistics (bspinfo)
    Info {
        bsp: PathBuf,
        /// Raw flag names forwarded to the tool (repeatable)
        #[arg(long)]
        flag: Vec<String>,
    },
    /// Edit a bsp (bsputil)
    Util {
        bsp: PathBuf,
        /// Print contents instead of editing
        #[arg(long)]
        info: bool,
        /// Check for leaks instead of editing
        #[arg(long)]
        leak_check: bool,
        /// Strip the named lump
        #[arg(long)]
        remove_lump: Option<String>,
        /// Convert to the named format
        #[arg(long)]
        convert: Option<String>,
        /// Merge entities from a second bsp
        #[arg(long)]
        merge: Option<PathBuf>,
        /// Output filename (defaults to the input name)
        #[arg(long)]
        out: Option<String>,
    },
    /// Full compile chain: geometry, lighting, visibility
    Compile {
        map: PathBuf,
        /// Texture WAD staged with the geometry stage (repeatable)
        #[arg(long)]
        wad: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = Profile::load(cli.config.as_deref())?;

    let (log_tx, mut log_rx) = log_channel();
    let printer = tokio::spawn(async move {
        while let Some(line) = log_rx.recv().await {
            if line.is_err {
                eprintln!("[{}] {}", line.unit, line.text);
            } else {
                println!("[{}] {}", line.unit, line.text);
            }
        }
    });

    let mut controller = Controller::new().with_log_sink(log_tx);
    let result = dispatch(&mut controller, &profile, cli.command).await;

    // Dropping the controller closes the log channel; drain the
    // printer before reporting so trailing error lines are not lost.
    drop(controller);
    printer.await?;

    let (input, artifacts) = result?;
    write_artifacts(&artifacts, &input, cli.out_dir.as_deref())?;
    Ok(())
}

async fn dispatch(
    controller: &mut Controller,
    profile: &Profile,
    command: Commands,
) -> Result<(PathBuf, Vec<Artifact>)> {
    match command {
        Commands::Bsp { map, wad } => {
            controller.add_unit(StageKind::Geometry, Arc::new(profile.resolve_tool("qbsp")?));
            controller.wait_until_ready(&["qbsp"]).await?;

            let input = load_artifact(&map)?;
            let wads = load_artifacts(&wad)?;
            let run = build_geometry_run(&input.name, input.bytes, wads, &profile.geometry);
            let artifacts = controller.run_stage("qbsp", run).await?;
            Ok((map, artifacts))
        }
        Commands::Light { bsp } => {
            controller.add_unit(StageKind::Lighting, Arc::new(profile.resolve_tool("light")?));
            controller.wait_until_ready(&["light"]).await?;

            let input = load_artifact(&bsp)?;
            let run = build_lighting_run(&input.name, input.bytes, &profile.lighting);
            let artifacts = controller.run_stage("light", run).await?;
            Ok((bsp, artifacts))
        }
        Commands::Vis { bsp, prt } => {
            controller.add_unit(StageKind::Visibility, Arc::new(profile.resolve_tool("vis")?));
            controller.wait_until_ready(&["vis"]).await?;
            if profile.visibility.debug {
                controller
                    .reinit_unit("vis", InitOptions::debug())
                    .await?;
            }

            let input = load_artifact(&bsp)?;
            let prt = prt.as_deref().map(load_artifact).transpose()?;
            let run = build_visibility_run(&input.name, input.bytes, prt, &profile.visibility);
            let artifacts = controller.run_stage("vis", run).await?;
            Ok((bsp, artifacts))
        }
        Commands::Info { bsp, flag } => {
            controller.add_unit(StageKind::Inspect, Arc::new(profile.resolve_tool("bspinfo")?));
            controller.wait_until_ready(&["bspinfo"]).await?;

            let input = load_artifact(&bsp)?;
            let opts = InspectOptions { flags: flag };
            let run = build_inspect_run(&input.name, input.bytes, &opts);
            let artifacts = controller.run_stage("bspinfo", run).await?;
            Ok((bsp, artifacts))
        }
        Commands::Util {
            bsp,
            info,
            leak_check,
            remove_lump,
            convert,
            merge,
            out,
        } => {
            controller.add_unit(StageKind::Edit, Arc::new(profile.resolve_tool("bsputil")?));
            controller.wait_until_ready(&["bsputil"]).await?;

            let input = load_artifact(&bsp)?;
            let merge = merge.as_deref().map(load_artifact).transpose()?;
            let opts = EditOptions {
                info,
                leak_check,
                remove_lump,
                convert,
                output_name: out,
            };
            let run = build_edit_run(&input.name, input.bytes, merge, &opts);
            let artifacts = controller.run_stage("bsputil", run).await?;
            Ok((bsp, artifacts))
        }
        Commands::Compile { map, wad } => {
            controller.add_unit(StageKind::Geometry, Arc::new(profile.resolve_tool("qbsp")?));
            controller.add_unit(StageKind::Lighting, Arc::new(profile.resolve_tool("light")?));
            controller.add_unit(StageKind::Visibility, Arc::new(profile.resolve_tool("vis")?));
            controller
                .wait_until_ready(&["qbsp", "light", "vis"])
                .await?;

            let primary = load_artifact(&map)?;
            let input = CallerInput {
                name: primary.name,
                bytes: primary.bytes,
                aux: load_artifacts(&wad)?,
            };
            let plan = ChainPlan::classic(
                &input,
                &profile.geometry,
                &profile.lighting,
                &profile.visibility,
            );
            let outcome = controller.run_pipeline(input, &plan).await?;
            Ok((map, outcome.artifacts))
        }
    }
}

fn load_artifact(path: &Path) -> Result<Artifact> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| eyre!("not a usable file name: {}", path.display()))?;
    Ok(Artifact::new(name, std::fs::read(path)?))
}

fn load_artifacts(paths: &[PathBuf]) -> Result<Vec<Artifact>> {
    paths.iter().map(|p| load_artifact(p)).collect()
}

fn write_artifacts(artifacts: &[Artifact], input: &Path, out_dir: Option<&Path>) -> Result<()> {
    if artifacts.is_empty() {
        return Ok(());
    }
    let dir = match out_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            dir.to_path_buf()
        }
        None => input.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };
    for artifact in artifacts {
        let dest = dir.join(&artifact.name);
        std::fs::write(&dest, &artifact.bytes)?;
        println!("wrote {}", dest.display());
    }
    Ok(())
}
