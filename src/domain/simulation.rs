//! High-level simulation interface: setup, lockstep time loop and results
//!
//! A run spawns one thread per configured worker. With a single thread
//! that worker owns the interior and the PML rim; otherwise the interior
//! is split among `threads - 1` patch workers and the last worker owns
//! the rim. All workers meet at three barriers per step:
//!
//! 1. after the E half step; the opening thread moves the oldest finished
//!    work slot into the output history,
//! 2. after the H half step,
//! 3. after sensors and subgrid bookkeeping; the opening thread reports
//!    the step and decides whether the run goes on.

use crate::constants::WORK_BUFFER_SLOTS;
use crate::domain::domain_trait::{FieldUpdate, StepSlots};
use crate::domain::field::{FieldEngine, GridContext, OwnedSensor};
use crate::domain::iteration::SolverConfig;
use crate::domain::pml::PmlBoundary;
use crate::domain::subgrid::{SubgridField, SubgridInterface};
use crate::domain_decomposition::Partition;
use crate::engine::array::try_field_sets;
use crate::engine::{FieldExtents, FieldSet, RawSlot, SharedCell, StepBarrier};
use crate::error::{Result, SimError};
use crate::settings::{Differentials, Settings};
use crate::utilities::materials::{resolve_materials, MaterialGrid, MaterialRegion};
use crate::utilities::plane_wave::PlaneWave;
use crate::utilities::sensors::{Sensor, SensorTrace};
use crate::utilities::sources::CurrentSource;
use crate::utilities::subgrid::SubgridDefinition;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Everything a run is built from, in definition order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationBuilder {
    pub settings: Settings,
    pub sources: Vec<CurrentSource>,
    pub plane_waves: Vec<PlaneWave>,
    pub materials: Vec<MaterialRegion>,
    pub sensors: Vec<Sensor>,
    pub subgrids: Vec<SubgridDefinition>,
    pub solver: SolverConfig,
}

impl SimulationBuilder {
    pub fn new(settings: Settings) -> Self {
        Self { settings, ..Default::default() }
    }

    pub fn source(mut self, source: CurrentSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn plane_wave(mut self, wave: PlaneWave) -> Self {
        self.plane_waves.push(wave);
        self
    }

    pub fn material(mut self, region: MaterialRegion) -> Self {
        self.materials.push(region);
        self
    }

    pub fn sensor(mut self, sensor: Sensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    pub fn subgrid(mut self, subgrid: SubgridDefinition) -> Self {
        self.subgrids.push(subgrid);
        self
    }

    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn build(self) -> Result<Simulation> {
        Simulation::new(self)
    }
}

/// Progress and outcome notifications, strictly ordered by step
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started { steps: usize, threads: usize, dt: f64 },
    StepFinished {
        step: usize,
        /// Live-redraw cadence reached
        redraw: bool,
        /// Every subgrid solve of this step met its tolerance
        subgrid_converged: bool,
    },
    /// Non-finite field values; the run stops after this step
    Fault { step: usize, message: String },
    Cancelled { step: usize },
    Finished { steps_completed: usize, extents: FieldExtents },
}

/// Cooperative cancellation flag, polled once per step
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A validated, fully allocated run
#[derive(Debug)]
pub struct Simulation {
    ctx: GridContext,
    partition: Partition,
    sensors: Vec<(usize, OwnedSensor)>,
    subgrids: Vec<SubgridInterface>,
    work: Vec<FieldSet>,
    output: Vec<FieldSet>,
}

impl Simulation {
    /// Validate and resolve every definition, then allocate all buffers
    ///
    /// Nothing is spawned here; every configuration or allocation error
    /// surfaces before a worker exists.
    pub fn new(builder: SimulationBuilder) -> Result<Self> {
        let SimulationBuilder { settings, sources, plane_waves, materials, sensors, subgrids, solver } = builder;
        settings.validate()?;
        let d = settings.differentials();

        let materials = resolve_materials(&materials)?;
        let sources = sources.iter().map(|s| s.resolve(&settings, &d)).collect::<Result<Vec<_>>>()?;
        let plane_waves = plane_waves
            .iter()
            .map(|w| w.resolve(&settings, &d))
            .collect::<Result<Vec<_>>>()?;
        let placements = subgrids
            .iter()
            .map(|s| s.resolve(&settings, &d))
            .collect::<Result<Vec<_>>>()?;

        let patch_workers = if settings.threads == 1 { 1 } else { settings.threads - 1 };
        let footprints: Vec<_> = placements.iter().map(|p| p.footprint()).collect();
        let partition = Partition::new(&settings, &footprints, patch_workers)?;
        let spawned = partition.workers() + usize::from(settings.threads > 1);
        if spawned != settings.threads {
            return Err(SimError::ThreadMismatch { configured: settings.threads, spawned });
        }

        let mut owned_sensors = Vec::with_capacity(sensors.len());
        for (index, sensor) in sensors.iter().enumerate() {
            let resolved = sensor.resolve(&settings, &d)?;
            let owner = partition.owner_of(resolved.i, resolved.j).ok_or(SimError::OutsideGrid {
                entity: "sensor",
                x: sensor.position.x,
                y: sensor.position.y,
            })?;
            let trace = SensorTrace::new(&resolved, settings.steps);
            owned_sensors.push((owner, OwnedSensor { index, sensor: resolved, trace }));
        }

        let grid = MaterialGrid::build(&settings, &d, &materials)?;
        let subgrids = placements
            .into_iter()
            .map(|p| SubgridInterface::new(p, &settings, &d, &materials, solver.clone()))
            .collect::<Result<Vec<_>>>()?;

        let shape = (settings.total_x(), settings.total_y());
        let work = try_field_sets(WORK_BUFFER_SLOTS, shape)?;
        let output = try_field_sets(settings.samples(), shape)?;

        tracing::info!(
            cells_x = settings.cells_x,
            cells_y = settings.cells_y,
            pml = settings.pml_layers,
            dt = d.dt,
            threads = settings.threads,
            patches = partition.patches.iter().map(Vec::len).sum::<usize>(),
            subgrids = subgrids.len(),
            samples = output.len(),
            "simulation prepared"
        );

        Ok(Self {
            ctx: GridContext { settings, d, materials: grid, sources, plane_waves },
            partition,
            sensors: owned_sensors,
            subgrids,
            work,
            output,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.ctx.settings
    }

    pub fn differentials(&self) -> Differentials {
        self.ctx.d
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn materials(&self) -> &MaterialGrid {
        &self.ctx.materials
    }

    /// Run to completion without listening to events
    pub fn run_to_end(self) -> Result<RunOutput> {
        let (events, _receiver) = crossbeam_channel::unbounded();
        self.run(&events, &CancelToken::new())
    }

    /// Step the configured number of times, reporting over `events`
    ///
    /// Sending never blocks; a dropped receiver only silences the events.
    pub fn run(self, events: &Sender<RunEvent>, cancel: &CancelToken) -> Result<RunOutput> {
        let Simulation { ctx, partition, sensors, subgrids, mut work, output } = self;
        let settings = ctx.settings.clone();
        let threads = settings.threads;

        let mut owned_subgrids: Vec<Vec<(usize, SubgridInterface)>> =
            (0..partition.workers()).map(|_| Vec::new()).collect();
        for (owner, subgrid) in partition.footprints.iter().zip(subgrids) {
            owned_subgrids[owner.worker].push((owner.subgrid, subgrid));
        }
        let mut owned_sensors: Vec<Vec<OwnedSensor>> = (0..partition.workers()).map(|_| Vec::new()).collect();
        for (owner, sensor) in sensors {
            owned_sensors[owner].push(sensor);
        }

        let mut workers: Vec<Worker<'_>> = owned_subgrids
            .into_iter()
            .zip(owned_sensors)
            .enumerate()
            .map(|(k, (subgrids, sensors))| Worker {
                engine: Some(FieldEngine::new(&ctx, partition.areas_of(k), subgrids, sensors)),
                boundary: None,
            })
            .collect();
        let boundary = PmlBoundary::new(&settings, ctx.d)?;
        if threads > 1 {
            workers.push(Worker { engine: None, boundary: Some(boundary) });
        } else if let Some(worker) = workers.first_mut() {
            worker.boundary = Some(boundary);
        }
        if workers.len() != threads {
            return Err(SimError::ThreadMismatch { configured: threads, spawned: workers.len() });
        }
        for (k, worker) in workers.iter_mut().enumerate() {
            let mut cells = 0;
            worker.for_each_update(|u| cells += u.areas().iter().map(|a| a.cells()).sum::<usize>());
            tracing::debug!(worker = k, cells, "worker layout");
        }

        let ring: Vec<RawSlot> = work.iter_mut().map(RawSlot::of).collect();
        let shared = Shared {
            barrier: StepBarrier::new(threads),
            ring: SharedCell::new(ring),
            work: SharedCell::new(work),
            output: SharedCell::new(output),
            stop: AtomicBool::new(false),
            fault: AtomicBool::new(false),
            subgrid_missed: AtomicBool::new(false),
            completed: AtomicUsize::new(0),
            events,
            cancel,
            steps: settings.steps,
            sample_distance: settings.sample_distance,
            draw_every: settings.draw_every,
        };

        let _ = events.send(RunEvent::Started { steps: settings.steps, threads, dt: ctx.d.dt });
        tracing::info!(steps = settings.steps, threads, "run started");

        let finished = std::thread::scope(|s| {
            let handles: Vec<_> = workers
                .into_iter()
                .map(|mut worker| {
                    let shared = &shared;
                    s.spawn(move || {
                        worker.run(shared);
                        worker
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(k, h)| h.join().map_err(|_| SimError::WorkerPanicked(k)))
                .collect::<Result<Vec<_>>>()
        })?;

        let completed = shared.completed.load(Ordering::Acquire);
        let faulted = shared.fault.load(Ordering::Acquire);
        let Shared { work, output, .. } = shared;
        let mut work = work.into_inner();
        let mut samples = output.into_inner();

        // the ring still holds the newest steps
        if let Some(last) = completed.checked_sub(1) {
            let first = (last + 2).saturating_sub(WORK_BUFFER_SLOTS);
            for m in (first..=last).filter(|m| m % settings.sample_distance == 0) {
                if let Some(sample) = samples.get_mut(m / settings.sample_distance) {
                    std::mem::swap(sample, &mut work[m % WORK_BUFFER_SLOTS]);
                }
            }
        }

        let mut extents = FieldExtents::default();
        let mut traces = Vec::new();
        let mut fine = Vec::new();
        for worker in finished {
            if let Some(engine) = worker.engine {
                let (sensors, subgrids, engine_extents) = engine.into_parts();
                extents.merge(&engine_extents);
                traces.extend(sensors.into_iter().map(|s| (s.index, s.trace)));
                fine.extend(subgrids);
            }
        }
        traces.sort_by_key(|(index, _)| *index);
        fine.sort_by_key(|(index, _)| *index);

        let mut subgrid_fields = Vec::with_capacity(fine.len());
        for (index, mut subgrid) in fine {
            if let Some(last) = completed.checked_sub(1) {
                subgrid.finish(last);
            }
            let (solves, missed) = subgrid.field().solve_counts();
            if missed > 0 {
                tracing::warn!(subgrid = index, solves, missed, "subgrid solves missed their tolerance");
            }
            extents.merge(&subgrid.field().extents());
            subgrid_fields.push(subgrid.into_field());
        }

        let _ = events.send(RunEvent::Finished { steps_completed: completed, extents });
        tracing::info!(steps_completed = completed, faulted, "run finished");

        Ok(RunOutput {
            settings,
            d: ctx.d,
            samples,
            sensors: traces.into_iter().map(|(_, t)| t).collect(),
            subgrids: subgrid_fields,
            extents,
            steps_completed: completed,
            faulted,
        })
    }
}

/// Build and run in one call
pub fn simulate(builder: SimulationBuilder) -> Result<RunOutput> {
    builder.build()?.run_to_end()
}

/// State shared by the workers of one run
struct Shared<'s> {
    barrier: StepBarrier,
    ring: SharedCell<Vec<RawSlot>>,
    work: SharedCell<Vec<FieldSet>>,
    output: SharedCell<Vec<FieldSet>>,
    stop: AtomicBool,
    fault: AtomicBool,
    subgrid_missed: AtomicBool,
    completed: AtomicUsize,
    events: &'s Sender<RunEvent>,
    cancel: &'s CancelToken,
    steps: usize,
    sample_distance: usize,
    draw_every: usize,
}

impl Shared<'_> {
    /// Move the work slot of step `m` into its output sample
    ///
    /// # Safety
    /// Only from a barrier action, while every other worker is parked.
    unsafe fn transfer(&self, m: usize) {
        if m % self.sample_distance != 0 {
            return;
        }
        let work = self.work.get_mut();
        let output = self.output.get_mut();
        let slot = m % WORK_BUFFER_SLOTS;
        if let Some(sample) = output.get_mut(m / self.sample_distance) {
            std::mem::swap(sample, &mut work[slot]);
            self.ring.get_mut()[slot] = RawSlot::of(&mut work[slot]);
        }
    }

    /// Report step `n` and decide whether the run continues
    fn close_step(&self, n: usize) {
        let missed = self.subgrid_missed.swap(false, Ordering::AcqRel);
        let redraw = self.draw_every > 0 && (n + 1) % self.draw_every == 0;
        let _ = self.events.send(RunEvent::StepFinished { step: n, redraw, subgrid_converged: !missed });
        self.completed.store(n + 1, Ordering::Release);

        if self.fault.load(Ordering::Acquire) {
            tracing::warn!(step = n, "non-finite field values, stopping");
            let _ = self.events.send(RunEvent::Fault {
                step: n,
                message: format!("non-finite field values after step {n}"),
            });
            self.stop.store(true, Ordering::Release);
        } else if self.cancel.is_cancelled() && n + 1 < self.steps {
            tracing::info!(step = n, "run cancelled");
            let _ = self.events.send(RunEvent::Cancelled { step: n });
            self.stop.store(true, Ordering::Release);
        }
    }
}

/// The engines one thread drives
#[derive(Debug)]
struct Worker<'a> {
    engine: Option<FieldEngine<'a>>,
    boundary: Option<PmlBoundary>,
}

impl Worker<'_> {
    fn for_each_update(&mut self, mut f: impl FnMut(&mut dyn FieldUpdate)) {
        if let Some(engine) = self.engine.as_mut() {
            f(engine);
        }
        if let Some(boundary) = self.boundary.as_mut() {
            f(boundary);
        }
    }

    fn run(&mut self, shared: &Shared<'_>) {
        for n in 0..shared.steps {
            if shared.stop.load(Ordering::Acquire) {
                break;
            }
            // SAFETY: the ring changes only inside barrier actions
            let slots = StepSlots::at(n, unsafe { shared.ring.get() });

            let mut converged = true;
            self.for_each_update(|u| converged &= u.update_e(&slots));
            if !converged {
                shared.subgrid_missed.store(true, Ordering::Release);
            }
            shared.barrier.wait_with(|| {
                // slot of step n + 1 - W is reused next step
                if let Some(m) = (n + 1).checked_sub(WORK_BUFFER_SLOTS) {
                    // SAFETY: every other worker is parked
                    unsafe { shared.transfer(m) };
                }
            });

            self.for_each_update(|u| u.update_h(&slots));
            shared.barrier.wait();

            let mut fault = false;
            self.for_each_update(|u| {
                u.finish_step(&slots);
                fault |= u.extents().non_finite;
            });
            if fault {
                shared.fault.store(true, Ordering::Release);
            }
            shared.barrier.wait_with(|| shared.close_step(n));
        }
    }
}

/// Results of a run
#[derive(Debug)]
pub struct RunOutput {
    pub settings: Settings,
    pub d: Differentials,
    samples: Vec<FieldSet>,
    sensors: Vec<SensorTrace>,
    subgrids: Vec<SubgridField>,
    extents: FieldExtents,
    steps_completed: usize,
    faulted: bool,
}

impl RunOutput {
    /// Decimated field history, sample `k` taken after step `k * sample_distance`
    pub fn samples(&self) -> &[FieldSet] {
        &self.samples
    }

    pub fn ex(&self, k: usize, i: usize, j: usize) -> f64 {
        self.samples[k].ex.data[[i, j]]
    }

    pub fn ey(&self, k: usize, i: usize, j: usize) -> f64 {
        self.samples[k].ey.data[[i, j]]
    }

    pub fn hz(&self, k: usize, i: usize, j: usize) -> f64 {
        self.samples[k].hz.data[[i, j]]
    }

    /// Physical time of output sample `k` in seconds
    pub fn sample_time(&self, k: usize) -> f64 {
        (k * self.settings.sample_distance) as f64 * self.d.dt
    }

    /// Sensor time series in definition order
    pub fn sensors(&self) -> &[SensorTrace] {
        &self.sensors
    }

    /// Fine-grid histories in definition order
    pub fn subgrids(&self) -> &[SubgridField] {
        &self.subgrids
    }

    /// Min/max over the interior and every subgrid
    pub fn extents(&self) -> FieldExtents {
        self.extents
    }

    pub fn steps_completed(&self) -> usize {
        self.steps_completed
    }

    pub fn is_complete(&self) -> bool {
        self.steps_completed == self.settings.steps
    }

    pub fn faulted(&self) -> bool {
        self.faulted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::utilities::sources::Polarization;

    fn builder(threads: usize) -> SimulationBuilder {
        let settings = Settings {
            cells_x: 16,
            cells_y: 16,
            pml_layers: 4,
            steps: 12,
            threads,
            sample_distance: 2,
            ..Default::default()
        };
        SimulationBuilder::new(settings)
            .source(CurrentSource::sinusoidal(Point::new(0.0, 0.0), Polarization::X, 1.0E9, 1.0))
            .sensor(Sensor::new(0.1, 0.05))
    }

    #[test]
    fn test_events_are_ordered() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let output = builder(3).build().unwrap().run(&tx, &CancelToken::new()).unwrap();
        drop(tx);
        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events[0], RunEvent::Started { steps: 12, threads: 3, .. }));
        let steps: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::StepFinished { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(steps, (0..12).collect::<Vec<_>>());
        assert!(matches!(events.last(), Some(RunEvent::Finished { steps_completed: 12, .. })));
        assert!(output.is_complete());
        assert_eq!(output.samples().len(), 6);
        assert!(output.sensors()[0].is_complete());
    }

    #[test]
    fn test_cancel_stops_at_step_boundary() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = CancelToken::new();
        cancel.cancel();
        let output = builder(2).build().unwrap().run(&tx, &cancel).unwrap();
        drop(tx);
        assert_eq!(output.steps_completed(), 1);
        assert!(rx.iter().any(|e| e == RunEvent::Cancelled { step: 0 }));
    }

    #[test]
    fn test_output_keeps_every_sampled_step() {
        let output = builder(1).build().unwrap().run_to_end().unwrap();
        let trace = &output.sensors()[0];
        let (i, j) = (trace.i, trace.j);
        for k in 0..output.samples().len() {
            let n = k * 2;
            assert_eq!(output.ex(k, i, j), trace.ex[n], "sample {k}");
            assert_eq!(output.hz(k, i, j), trace.hz[n], "sample {k}");
        }
        assert!((output.sample_time(3) - 6.0 * output.d.dt).abs() < 1e-24);
    }

    #[test]
    fn test_fault_is_reported() {
        let mut b = builder(2);
        b.sources[0] = CurrentSource::sinusoidal(Point::new(0.0, 0.0), Polarization::Y, 1.0E9, f64::INFINITY);
        let (tx, rx) = crossbeam_channel::unbounded();
        let output = b.build().unwrap().run(&tx, &CancelToken::new()).unwrap();
        drop(tx);
        assert!(output.faulted());
        assert!(output.steps_completed() < 12);
        assert!(rx.iter().any(|e| matches!(e, RunEvent::Fault { .. })));
    }

    #[test]
    fn test_invalid_settings_fail_before_run() {
        let mut b = builder(2);
        b.settings.cells_x = 0;
        assert!(matches!(b.build(), Err(SimError::InvalidSettings(_))));
    }
}
