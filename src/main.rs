use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use twenty48::builder::{LayerBuilder, ModelManifest, WIN_STATES_FILE};
use twenty48::config::{BuilderConfig, ModelConfig, ResolverStrategy, SimulatorConfig, SolverConfig};
use twenty48::layers::{LayerFolder, PartFile};
use twenty48::resolver::{load_or_build_resolver, Resolver};
use twenty48::simulator::Simulator;
use twenty48::solver::{LayerSolver, Solution};

#[derive(Debug, Parser)]
#[command(name = "twenty48", about = "Build, solve and simulate exact 2048 layer models")]
struct Cli {
    /// Directory holding one folder per model
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,
    /// Hide progress bars
    #[arg(long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Enumerate every reachable layer of a model
    Build {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        resolver: ResolverArgs,
        /// States held per output part before a fragment is flushed
        #[arg(long, default_value_t = BuilderConfig::default().max_states)]
        max_states: usize,
        /// Tranches per input part
        #[arg(long, default_value_t = BuilderConfig::default().partitions)]
        partitions: usize,
        /// Worker threads (0 = all cores)
        #[arg(long, default_value_t = 0)]
        threads: usize,
        #[arg(long, default_value_t = BuilderConfig::default().index_stride)]
        index_stride: usize,
    },
    /// Solve a built model by backward induction
    Solve {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        solver: SolverArgs,
    },
    /// Play games with a solved policy
    Simulate {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        solver: SolverArgs,
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
        #[arg(long, default_value_t = 1)]
        batches: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Pick uniformly among near-optimal actions
        #[arg(long)]
        alternate_actions: bool,
        /// Write the report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the resolver's win states for each horizon
    Resolve {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        resolver: ResolverArgs,
    },
}

#[derive(Debug, Args)]
struct ModelArgs {
    #[arg(long, default_value_t = 2)]
    board_size: usize,
    #[arg(long, default_value_t = 5)]
    max_exponent: u8,
    #[arg(long, default_value_t = 0)]
    max_depth: u8,
}

impl ModelArgs {
    fn config(&self) -> Result<ModelConfig> {
        Ok(ModelConfig::new(self.board_size, self.max_exponent, self.max_depth)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Exact,
    Bounded,
    UnknownZeros,
}

#[derive(Debug, Args)]
struct ResolverArgs {
    #[arg(long, value_enum, default_value_t = StrategyArg::Exact)]
    strategy: StrategyArg,
    /// Node budget per query for the bounded strategy
    #[arg(long, default_value_t = 10_000)]
    max_expansions: u64,
}

impl ResolverArgs {
    fn strategy(&self) -> ResolverStrategy {
        match self.strategy {
            StrategyArg::Exact => ResolverStrategy::Exact,
            StrategyArg::Bounded => ResolverStrategy::Bounded { max_expansions: self.max_expansions },
            StrategyArg::UnknownZeros => ResolverStrategy::UnknownZeros,
        }
    }
}

#[derive(Debug, Args)]
struct SolverArgs {
    #[arg(long, default_value_t = SolverConfig::default().discount)]
    discount: f64,
    #[arg(long, default_value_t = SolverConfig::default().alternate_action_tolerance)]
    tolerance: f64,
    /// Also write per-action values
    #[arg(long)]
    q_values: bool,
}

impl SolverArgs {
    fn config(&self) -> SolverConfig {
        SolverConfig {
            discount: self.discount,
            alternate_action_tolerance: self.tolerance,
            write_q_values: self.q_values,
            ..SolverConfig::default()
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let board_size = match &cli.cmd {
        Cmd::Build { model, .. } | Cmd::Solve { model, .. } | Cmd::Simulate { model, .. } | Cmd::Resolve { model, .. } => {
            model.board_size
        }
    };
    match board_size {
        2 => run::<2>(&cli),
        3 => run::<3>(&cli),
        4 => run::<4>(&cli),
        n => bail!("unsupported board size {}", n),
    }
}

fn run<const N: usize>(cli: &Cli) -> Result<()> {
    match &cli.cmd {
        Cmd::Build { model, resolver, max_states, partitions, threads, index_stride } => {
            let config = BuilderConfig {
                max_states: *max_states,
                partitions: *partitions,
                threads: *threads,
                index_stride: *index_stride,
                ..BuilderConfig::default()
            };
            build::<N>(cli, model.config()?, resolver.strategy(), config)
        }
        Cmd::Solve { model, solver } => {
            solve::<N>(cli, model.config()?, solver.config())?;
            Ok(())
        }
        Cmd::Simulate { model, solver, batch_size, batches, seed, alternate_actions, report } => {
            let config = SimulatorConfig {
                batch_size: *batch_size,
                batches: *batches,
                seed: *seed,
                use_alternate_actions: *alternate_actions,
                ..SimulatorConfig::default()
            };
            simulate::<N>(cli, model.config()?, solver.config(), config, report.as_deref())
        }
        Cmd::Resolve { model, resolver } => resolve::<N>(cli, model.config()?, resolver.strategy()),
    }
}

fn model_folder(cli: &Cli, model: &ModelConfig) -> Result<LayerFolder> {
    let path = cli.data_dir.join(model.folder_name());
    LayerFolder::create(&path).with_context(|| format!("creating {}", path.display()))
}

fn open_resolver<const N: usize>(
    folder: &LayerFolder,
    model: ModelConfig,
    strategy: ResolverStrategy,
) -> Result<Box<dyn Resolver<N>>> {
    let started = Instant::now();
    let resolver = load_or_build_resolver::<N>(model, strategy, &folder.path().join(WIN_STATES_FILE))?;
    log::info!("resolver ready in {:.2?}", started.elapsed());
    Ok(resolver)
}

/// The resolver a model folder was built with.
fn built_resolver<const N: usize>(folder: &LayerFolder, model: ModelConfig) -> Result<Box<dyn Resolver<N>>> {
    let manifest = ModelManifest::read(folder.path())
        .with_context(|| format!("{} has not been built", folder.path().display()))?;
    if manifest.model != model {
        bail!("{} was built for {:?}", folder.path().display(), manifest.model);
    }
    open_resolver::<N>(folder, model, manifest.strategy)
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {elapsed_precise} | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn build<const N: usize>(cli: &Cli, model: ModelConfig, strategy: ResolverStrategy, config: BuilderConfig) -> Result<()> {
    let folder = model_folder(cli, &model)?;
    let resolver = open_resolver::<N>(&folder, model, strategy)?;
    let builder = LayerBuilder::new(folder, resolver.as_ref(), config)?;
    builder.build_start_state_layers()?;

    let pb = spinner(cli.quiet);
    let mut total = 0u64;
    let stats = builder.build_with_progress(|layer| {
        total += layer.completed_states;
        pb.set_message(format!("layer {} | {} states so far", layer.sum + 2, total));
    })?;
    pb.finish_and_clear();

    let parts = builder.folder().parts(PartFile::States)?.len();
    let states: u64 = stats.iter().map(|s| s.input_states).sum();
    println!("Built {} layers, {} parts, {} states in {}", stats.len(), parts, states, builder.folder().path().display());
    Ok(())
}

fn solve<const N: usize>(cli: &Cli, model: ModelConfig, config: SolverConfig) -> Result<Solution<N>> {
    let folder = model_folder(cli, &model)?;
    let resolver = built_resolver::<N>(&folder, model)?;
    let parts = folder.parts(PartFile::States)?.len() as u64;
    let solver = LayerSolver::new(folder, resolver.as_ref(), config)?;

    let pb = if cli.quiet { ProgressBar::hidden() } else { ProgressBar::new(parts) };
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} parts | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let solution = solver.solve_with_progress(|part| {
        pb.inc(1);
        pb.set_message(format!("sum {} max {}", part.part.sum, part.part.max_value));
    })?;
    pb.finish_and_clear();

    println!("Start value: {:.9} ({})", solution.start_value()?, solution.folder().path().display());
    Ok(solution)
}

fn simulate<const N: usize>(
    cli: &Cli,
    model: ModelConfig,
    solver: SolverConfig,
    config: SimulatorConfig,
    report_path: Option<&Path>,
) -> Result<()> {
    let folder = model_folder(cli, &model)?;
    let resolver = built_resolver::<N>(&folder, model)?;
    let solution_folder = LayerFolder::new(folder.path().join(solver.folder_name()));
    let solution = Solution::<N>::open(folder, solution_folder)
        .context("model has not been solved with these parameters")?;

    let pb = spinner(cli.quiet);
    pb.set_message(format!("{} games", config.batch_size * config.batches));
    let report = Simulator::new(&solution, resolver.as_ref(), config).run()?;
    pb.finish_and_clear();

    println!(
        "Games: {} | wins: {} ({} resolved) | losses: {} | win rate: {:.6} | mean moves: {:.2}",
        report.games,
        report.wins,
        report.resolved_wins,
        report.losses,
        report.win_rate(),
        report.mean_moves()
    );
    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn resolve<const N: usize>(cli: &Cli, model: ModelConfig, strategy: ResolverStrategy) -> Result<()> {
    let folder = model_folder(cli, &model)?;
    let resolver = open_resolver::<N>(&folder, model, strategy)?;
    for (moves, state) in resolver.win_states().iter().enumerate() {
        println!("win in {}: {:?}", moves, state.cells());
    }
    println!("lose state: {:?}", resolver.lose_state().cells());
    Ok(())
}
