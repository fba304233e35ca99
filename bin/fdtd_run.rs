//! FDTD run driver
//!
//! Reads a tagged-record definition (or builds a small demo scene), runs it
//! and prints a summary of the sensor traces and field extents.

use clap::Parser;
use fdtd_hsg::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for an FDTD run
#[derive(Parser, Debug)]
#[command(name = "fdtd_run")]
#[command(about = "2-D FDTD simulation with PML, TF/SF plane waves and implicit subgrids", long_about = None)]
struct Args {
    /// Definition file in tagged-record format; a demo scene is used if omitted
    input: Option<PathBuf>,

    /// Override the number of time steps
    #[arg(long)]
    steps: Option<usize>,

    /// Override the number of worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Stop cooperatively after this many steps
    #[arg(long)]
    cancel_after: Option<usize>,

    /// Write the effective definition to this file before running
    #[arg(long)]
    save: Option<PathBuf>,

    /// Print a progress line every N steps (0 = never)
    #[arg(long, default_value_t = 100)]
    progress: usize,
}

/// A gaussian line source next to a dielectric block, with one refined box
fn demo_scene() -> SimulationBuilder {
    let settings = Settings { cells_x: 120, cells_y: 120, steps: 400, threads: 4, ..Default::default() };
    SimulationBuilder::new(settings)
        .source(CurrentSource::gaussian(Point::new(-0.25, 0.0), Polarization::Y, 1.0E9, 1.0, 0.0, 0.2E-9))
        .material(MaterialRegion::new(vec![Point::new(0.05, -0.2), Point::new(0.25, 0.2)], 4.0, 1.0, 0.0))
        .subgrid(SubgridDefinition::new(Point::new(-0.1, -0.1), Point::new(0.0, 0.1), 2, 2))
        .sensor(Sensor::new(-0.05, 0.0))
        .sensor(Sensor::new(0.35, 0.0))
}

fn load(args: &Args) -> Result<SimulationBuilder, Box<dyn std::error::Error>> {
    let mut builder = match &args.input {
        Some(path) => read_records(&std::fs::read_to_string(path)?)?,
        None => demo_scene(),
    };
    if let Some(steps) = args.steps {
        builder.settings.steps = steps;
    }
    if let Some(threads) = args.threads {
        builder.settings.threads = threads;
    }
    if let Some(path) = &args.save {
        std::fs::write(path, write_records(&builder))?;
    }
    Ok(builder)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let builder = load(args)?;
    let simulation = builder.build()?;
    let d = simulation.differentials();
    println!("\nFDTD run");
    println!("========\n");
    println!(
        "Grid: {} x {} cells + {} PML layers, dx = {:.4e} m, dy = {:.4e} m, dt = {:.4e} s",
        simulation.settings().cells_x,
        simulation.settings().cells_y,
        simulation.settings().pml_layers,
        d.dx,
        d.dy,
        d.dt
    );

    let (events, receiver) = crossbeam_channel::unbounded();
    let cancel = CancelToken::new();
    let output = std::thread::scope(|s| {
        let runner = s.spawn({
            let cancel = cancel.clone();
            move || simulation.run(&events, &cancel)
        });

        for event in receiver.iter() {
            match event {
                RunEvent::StepFinished { step, subgrid_converged, .. } => {
                    if args.cancel_after.is_some_and(|limit| step + 1 >= limit) {
                        cancel.cancel();
                    }
                    if args.progress > 0 && (step + 1) % args.progress == 0 {
                        println!("  step {:>6}{}", step + 1, if subgrid_converged { "" } else { "  (subgrid solve missed)" });
                    }
                }
                RunEvent::Fault { step, message } => eprintln!("Fault at step {step}: {message}"),
                RunEvent::Cancelled { step } => println!("Cancelled after step {step}"),
                RunEvent::Started { .. } | RunEvent::Finished { .. } => {}
            }
        }
        runner.join().map_err(|_| SimError::WorkerPanicked(0))?
    })?;

    let extents = output.extents();
    println!("\nCompleted {} of {} steps", output.steps_completed(), output.settings.steps);
    println!("Ex range: [{:.4e}, {:.4e}]", extents.ex.0, extents.ex.1);
    println!("Ey range: [{:.4e}, {:.4e}]", extents.ey.0, extents.ey.1);
    println!("Hz range: [{:.4e}, {:.4e}]", extents.hz.0, extents.hz.1);

    for (k, trace) in output.sensors().iter().enumerate() {
        let peak = trace.hz.iter().filter(|v| v.is_finite()).fold(0.0_f64, |m, v| m.max(v.abs()));
        println!("Sensor {k} at cell ({}, {}): peak |Hz| = {:.4e} A/m", trace.i, trace.j, peak);
    }
    for (k, subgrid) in output.subgrids().iter().enumerate() {
        let (solves, missed) = subgrid.solve_counts();
        println!("Subgrid {k}: {solves} solves, {missed} above tolerance");
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
