//! Demesim CLI - run forward-time Wright-Fisher simulations.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use demesim::base::{FitnessDistribution, MutationType};
use demesim::genome::{Chromosome, RecombinationMap};
use demesim::simulation::{SexOptions, Simulation, SimulationParams};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};

/// Demesim - forward-time population-genetics simulator
#[derive(Parser, Debug)]
#[command(name = "demesim")]
#[command(author, version, about = "Forward-time population-genetics simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulation and dump the final state
    Run {
        /// Number of diploid individuals per subpopulation
        #[arg(short = 'n', long, default_value = "100")]
        population_size: usize,

        /// Number of subpopulations
        #[arg(long, default_value = "1")]
        subpops: usize,

        /// Number of generations
        #[arg(short = 'g', long, default_value = "1000")]
        generations: i32,

        /// Chromosome length in sites
        #[arg(short = 'L', long, default_value = "100000")]
        chromosome_length: i64,

        /// Per-site mutation rate per generation
        #[arg(long, default_value = "1e-7")]
        mutation_rate: f64,

        /// Per-site recombination rate per generation
        #[arg(long, default_value = "1e-8")]
        recomb_rate: f64,

        /// Selection coefficient of new mutations (0 = neutral)
        #[arg(long, default_value = "0.0")]
        selection_coeff: f64,

        /// Dominance coefficient of new mutations
        #[arg(long, default_value = "0.5")]
        dominance: f64,

        /// Selfing fraction of every subpopulation
        #[arg(long, default_value = "0.0")]
        selfing: f64,

        /// Symmetric migration fraction between neighboring subpopulations
        #[arg(long, default_value = "0.0")]
        migration: f64,

        /// Model separate sexes with this fraction of males
        #[arg(long)]
        sex_ratio: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Print an ms-format sample of this many genomes instead of the
        /// full dump
        #[arg(long)]
        sample: Option<usize>,

        /// Show progress bar
        #[arg(long, default_value = "true")]
        progress: bool,

        /// Echo the run parameters as JSON before running
        #[arg(long)]
        show_params: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            population_size,
            subpops,
            generations,
            chromosome_length,
            mutation_rate,
            recomb_rate,
            selection_coeff,
            dominance,
            selfing,
            migration,
            sex_ratio,
            seed,
            sample,
            progress,
            show_params,
        } => {
            if subpops == 0 {
                bail!("at least one subpopulation is required");
            }
            if sex_ratio.is_some() && selfing > 0.0 {
                bail!("selfing is only available in models without sexes");
            }

            let mutation_type = MutationType::new(
                1,
                dominance,
                FitnessDistribution::Fixed(selection_coeff),
            );
            let chromosome = Chromosome::new(
                chromosome_length - 1,
                mutation_rate,
                RecombinationMap::uniform(chromosome_length - 1, recomb_rate),
                vec![(mutation_type, 1.0)],
            )
            .context("invalid chromosome parameters")?;

            let params = SimulationParams::new(generations, seed);
            if show_params {
                println!("{}", serde_json::to_string_pretty(&params)?);
            }

            let sex = sex_ratio.map(|_| SexOptions::autosomal());
            let mut sim = Simulation::without_callbacks(chromosome, params, sex);

            for index in 0..subpops {
                let id = index as i32 + 1;
                sim.population_mut()
                    .add_subpopulation(id, population_size, sex_ratio)
                    .context("failed to add subpopulation")?;
                if selfing > 0.0 {
                    sim.population_mut().set_selfing(id, selfing)?;
                }
            }
            if migration > 0.0 && subpops > 1 {
                for index in 0..subpops {
                    let id = index as i32 + 1;
                    let next = (index as i32 + 1) % subpops as i32 + 1;
                    sim.population_mut().set_migration(id, next, migration)?;
                }
            }

            let bar = if progress {
                let bar = ProgressBar::new(generations as u64);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} generations",
                    )
                    .expect("static template is valid"),
                );
                Some(bar)
            } else {
                None
            };

            for _ in 0..generations {
                sim.step().context("simulation step failed")?;
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
            }
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }

            let stdout = io::stdout();
            let mut out = stdout.lock();
            match sample {
                Some(sample_size) => {
                    let chromosome = sim.chromosome().clone();
                    let population = sim.population();
                    let mut rng = rand::rng();
                    population
                        .print_sample_ms(&mut out, 1, sample_size, &chromosome, None, &mut rng)
                        .context("sample dump failed")?;
                }
                None => {
                    sim.population()
                        .print_all(&mut out)
                        .context("population dump failed")?;
                }
            }
            out.flush()?;

            eprintln!(
                "{} segregating mutations, {} substitutions after {} generations",
                sim.population().registry().len(),
                sim.population().substitutions().len(),
                generations,
            );
        }
    }

    Ok(())
}
