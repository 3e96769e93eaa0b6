//! CLI utility for running crowd scenarios on grid navigation meshes

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use glam::Vec3;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use navcrowd::{AgentParams, Crowd, CrowdAgentState, CrowdConfig, MoveRequestState};
use navcrowd_common::{from_vec3, to_vec3};
use navcrowd_query::{NavMeshQuery, PolyMesh, QueryFilter};

/// A CLI utility for simulating navmesh crowds
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a crowd crossing a grid mesh
    Simulate {
        #[clap(flatten)]
        mesh: MeshArgs,

        /// Number of agents
        #[clap(long, default_value = "8")]
        agents: usize,

        /// Number of simulation ticks
        #[clap(long, default_value = "300")]
        ticks: usize,

        /// Seconds per tick
        #[clap(long, default_value = "0.1")]
        dt: f32,

        /// JSON file with crowd and agent settings
        #[clap(long, value_parser)]
        config: Option<PathBuf>,

        /// Write a JSON trace of every tick
        #[clap(long, value_parser)]
        output: Option<PathBuf>,
    },

    /// Print statistics of a grid mesh
    Info {
        #[clap(flatten)]
        mesh: MeshArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct MeshArgs {
    /// Number of grid columns
    #[clap(long, default_value = "20")]
    cols: usize,

    /// Number of grid rows
    #[clap(long, default_value = "10")]
    rows: usize,

    /// Size of a grid cell
    #[clap(long, default_value = "1.0")]
    cell_size: f32,

    /// Lower corner of the grid (x,y,z)
    #[clap(long, value_parser = parse_vector, default_value = "0,0,0")]
    origin: Vec3,

    /// Cells left out of the mesh (col,row), may be repeated
    #[clap(long = "block", value_parser = parse_cell)]
    blocked: Vec<(usize, usize)>,
}

/// Settings loaded with `--config`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ScenarioConfig {
    crowd: CrowdConfig,
    agent: AgentParams,
}

#[derive(Debug, Serialize)]
struct AgentFrame {
    idx: usize,
    pos: [f32; 3],
    vel: [f32; 3],
    state: CrowdAgentState,
    target_state: MoveRequestState,
}

#[derive(Debug, Serialize)]
struct TraceFrame {
    tick: usize,
    time: f32,
    agents: Vec<AgentFrame>,
}

/// Parse a comma-separated vector
fn parse_vector(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').collect();

    if parts.len() != 3 {
        return Err(format!("Vector must have 3 components, got {}", parts.len()));
    }

    let x = parts[0].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let y = parts[1].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let z = parts[2].trim().parse::<f32>().map_err(|e| e.to_string())?;

    Ok(Vec3::new(x, y, z))
}

/// Parse a `col,row` grid cell
fn parse_cell(s: &str) -> Result<(usize, usize), String> {
    let (col, row) = s
        .split_once(',')
        .ok_or_else(|| format!("Cell must be col,row, got {}", s))?;
    let col = col.trim().parse::<usize>().map_err(|e| e.to_string())?;
    let row = row.trim().parse::<usize>().map_err(|e| e.to_string())?;
    Ok((col, row))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match args.command {
        Commands::Simulate {
            mesh,
            agents,
            ticks,
            dt,
            config,
            output,
        } => simulate(&mesh, agents, ticks, dt, config.as_deref(), output.as_deref()),
        Commands::Info { mesh } => print_info(&mesh),
    }
}

fn build_mesh(args: &MeshArgs) -> Result<PolyMesh> {
    let blocked = &args.blocked;
    PolyMesh::grid(args.cols, args.rows, args.cell_size, args.origin, |c, r| {
        !blocked.contains(&(c, r))
    })
    .map_err(|e| anyhow!("Failed to build grid mesh: {}", e))
}

fn load_config(path: Option<&Path>) -> Result<ScenarioConfig> {
    let Some(path) = path else {
        return Ok(ScenarioConfig::default());
    };
    let file = File::open(path).with_context(|| format!("Failed to open config file: {}", path.display()))?;
    let config = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    debug!("Loaded scenario config {:?}", config);
    Ok(config)
}

/// Run a crowd crossing the mesh from left to right
fn simulate(
    mesh_args: &MeshArgs,
    agent_count: usize,
    ticks: usize,
    dt: f32,
    config_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    if dt <= 0.0 || !dt.is_finite() {
        bail!("Time step must be positive, got {}", dt);
    }

    let mut scenario = load_config(config_path)?;
    scenario.crowd.max_agents = scenario.crowd.max_agents.max(agent_count);
    scenario.crowd.max_agent_radius = scenario.crowd.max_agent_radius.max(scenario.agent.radius);

    let mesh = build_mesh(mesh_args)?;
    let mut crowd =
        Crowd::with_config(scenario.crowd.clone(), mesh).map_err(|e| anyhow!("Failed to create crowd: {}", e))?;

    // Spawn along the left edge, each heading to the mirrored spot on the right edge
    let cs = mesh_args.cell_size;
    let origin = mesh_args.origin;
    let width = mesh_args.cols as f32 * cs;
    let depth = mesh_args.rows as f32 * cs;
    let filter = QueryFilter::default();
    let half_extents = *crowd.get_query_half_extents();

    let mut spawned = Vec::with_capacity(agent_count);
    for i in 0..agent_count {
        let dz = (i as f32 + 0.5) * depth / agent_count as f32;
        let start = origin + Vec3::new(cs * 0.5, 0.0, dz);
        let goal = origin + Vec3::new(width - cs * 0.5, 0.0, depth - dz);

        let idx = match crowd.add_agent(&from_vec3(start), &scenario.agent) {
            Ok(idx) => idx,
            Err(e) => {
                warn!("Skipping agent at {}: {}", start, e);
                continue;
            }
        };
        let target = crowd
            .get_nav_query()
            .find_nearest_poly(&from_vec3(goal), &half_extents, &filter);
        match target {
            Ok((target_ref, target_pos)) if target_ref.is_valid() => {
                crowd
                    .request_move_target(idx, target_ref, &target_pos)
                    .map_err(|e| anyhow!("Failed to request target for agent {}: {}", idx, e))?;
            }
            _ => warn!("Agent {} has no reachable target near {}", idx, goal),
        }
        spawned.push(idx);
    }

    info!(
        "Simulating {} agents on a {}x{} grid for {} ticks",
        spawned.len(),
        mesh_args.cols,
        mesh_args.rows,
        ticks
    );

    let mut trace = Vec::new();
    for tick in 0..ticks {
        crowd.update(dt, None);
        if output.is_some() {
            trace.push(TraceFrame {
                tick,
                time: (tick + 1) as f32 * dt,
                agents: snapshot(&crowd),
            });
        }
    }

    println!("Final agent positions after {:.2}s:", ticks as f32 * dt);
    for frame in snapshot(&crowd) {
        println!(
            "{:>4}: {:>8.3},{:>8.3},{:>8.3}  {:?}/{:?}",
            frame.idx, frame.pos[0], frame.pos[1], frame.pos[2], frame.state, frame.target_state
        );
    }

    if let Some(output_path) = output {
        println!("Saving trace to {}...", output_path.display());
        let file = File::create(output_path)
            .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
        serde_json::to_writer(BufWriter::new(file), &trace)
            .with_context(|| format!("Failed to write trace: {}", output_path.display()))?;
    }

    Ok(())
}

fn snapshot<Q: NavMeshQuery>(crowd: &Crowd<Q>) -> Vec<AgentFrame> {
    crowd
        .get_active_agents()
        .into_iter()
        .filter_map(|idx| {
            let ag = crowd.get_agent(idx)?;
            Some(AgentFrame {
                idx,
                pos: ag.get_pos(),
                vel: ag.get_vel(),
                state: ag.get_state(),
                target_state: ag.get_target_state(),
            })
        })
        .collect()
}

/// Print statistics of the grid mesh
fn print_info(mesh_args: &MeshArgs) -> Result<()> {
    let mesh = build_mesh(mesh_args)?;
    let stats = mesh.stats();

    println!("Grid: {}x{} cells of {}", mesh_args.cols, mesh_args.rows, mesh_args.cell_size);
    println!("Blocked cells: {}", mesh_args.blocked.len());
    println!("Ground polygons: {}", stats.ground_polys);
    println!("Off-mesh connections: {}", stats.off_mesh_connections);
    println!("Links: {}", stats.links);
    println!(
        "Bounds: min={}, max={}",
        to_vec3(&stats.bmin),
        to_vec3(&stats.bmax)
    );

    Ok(())
}
