#![forbid(unsafe_code)]
use std::path::PathBuf;

use anyhow::{ Context, Result };
use clap::Parser;
use clap_verbosity_flag::Verbosity;
use log::{ debug, error };

use jobshop::config::SolverConfig;
use jobshop::problem::{ Problem, ProblemSolver };
use jobshop::schedule::Schedule;
use jobshop::shifting_bottleneck::ShiftingBottleneck;

#[derive(Debug, Parser)]
/// Job shop scheduler using the shifting bottleneck procedure
struct App {
    #[command(flatten)]
    verbose: Verbosity,

    /// Instance file: jobs, machines and best known makespan, then processing times and machines per job
    path: PathBuf,

    /// Maximum number of search nodes per single machine problem
    #[arg(long)]
    node_budget: Option<usize>,

    /// Solve the single machine problems one after the other
    #[arg(long)]
    sequential: bool,
}

fn run(args: &App) -> Result<()> {
    let problem = Problem::read(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;

    let config = SolverConfig {
        node_budget: args.node_budget,
        parallel: !args.sequential,
    };
    let solution = ShiftingBottleneck::new(config)
        .solve(&problem)
        .context("shifting bottleneck")?;

    for step in &solution.steps {
        debug!("{:?}", step);
    }

    let schedule = Schedule::from_graph(&problem, &solution.graph);
    println!("{}", schedule);

    if let Some(optimal) = problem.optimal {
        let gap = 100.0 * (solution.makespan as f64 - optimal as f64) / optimal as f64;
        println!("Best known: {}, gap {:.2}%", optimal, gap);
    }

    Ok(())
}

fn main() {
    let args: App = App::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    debug!("{args:?}");

    if let Err(err) = run(&args) {
        error!("An error occurred: {:#}", err);
        std::process::exit(1);
    }
}
