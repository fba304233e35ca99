//! End-to-end runs: thread-count invariance, cancellation, stability and
//! sensor recording

use fdtd_hsg::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source, plane wave, dielectric, subgrid and sensors in one small grid
fn scene(threads: usize, steps: usize) -> SimulationBuilder {
    let settings = Settings {
        cells_x: 40,
        cells_y: 40,
        pml_layers: 6,
        steps,
        threads,
        sample_distance: 3,
        ..Default::default()
    };
    SimulationBuilder::new(settings)
        .source(CurrentSource::gaussian(Point::new(-0.2, -0.1), Polarization::Y, 1.0E9, 1.0, 0.0, 0.2E-9))
        .plane_wave(PlaneWave {
            corner_a: Point::new(-0.3, -0.3),
            corner_b: Point::new(0.3, 0.3),
            angle: 30.0,
            time_delay: 0.0,
            pulse_width: 0.3E-9,
            center_frequency: 1.0E9,
            amplitude: 1.0,
        })
        .material(MaterialRegion::new(
            vec![Point::new(-0.1, 0.15), Point::new(0.05, 0.25), Point::new(-0.15, 0.28)],
            3.0,
            1.0,
            0.01,
        ))
        .subgrid(SubgridDefinition::new(Point::new(0.05, 0.05), Point::new(0.15, 0.15), 2, 3))
        .sensor(Sensor::new(-0.3, 0.0))
        .sensor(Sensor::new(0.1, 0.1))
}

#[test]
fn test_results_do_not_depend_on_thread_count() {
    let reference = simulate(scene(1, 60)).unwrap();
    assert!(reference.is_complete());
    assert!(!reference.faulted());

    for threads in [2, 4, 8] {
        let output = simulate(scene(threads, 60)).unwrap();
        assert_eq!(output.samples(), reference.samples(), "{threads} threads");
        assert_eq!(output.sensors(), reference.sensors(), "{threads} threads");
        assert_eq!(output.extents(), reference.extents(), "{threads} threads");

        let (fine, fine_ref) = (&output.subgrids()[0], &reference.subgrids()[0]);
        let layout = *fine.layout();
        for k in 0..fine.samples() {
            for i in 0..layout.size_hzx {
                for j in 0..layout.size_hzy {
                    assert_eq!(fine.sample_hz(k, i, j), fine_ref.sample_hz(k, i, j));
                }
            }
        }
    }
}

#[test]
fn test_sensor_traces_are_complete() {
    let output = simulate(scene(3, 30)).unwrap();
    assert_eq!(output.sensors().len(), 2);
    for trace in output.sensors() {
        assert_eq!(trace.len(), 30);
        assert!(trace.is_complete());
    }
    // the second sensor sits in the refined box and reads the fine Hz
    assert!(output.sensors()[1].hz.iter().any(|v| *v != 0.0));
}

#[test]
fn test_outer_ring_stays_zero() {
    let output = simulate(scene(2, 40)).unwrap();
    let (nx, ny) = (output.settings.total_x(), output.settings.total_y());
    for sample in output.samples() {
        for i in 0..nx {
            assert_eq!(sample.ex.data[[i, 0]], 0.0);
            assert_eq!(sample.ex.data[[i, ny - 1]], 0.0);
        }
        for j in 0..ny {
            assert_eq!(sample.ey.data[[0, j]], 0.0);
            assert_eq!(sample.ey.data[[nx - 1, j]], 0.0);
        }
    }
}

#[test]
fn test_cancellation_keeps_completed_steps() {
    let full = simulate(scene(4, 1500)).unwrap();

    let (events, receiver) = crossbeam_channel::unbounded();
    let cancel = CancelToken::new();
    let simulation = scene(4, 1500).build().unwrap();
    let output = std::thread::scope(|s| {
        let runner = s.spawn({
            let cancel = cancel.clone();
            move || simulation.run(&events, &cancel)
        });
        let mut cancelled_at = None;
        for event in receiver.iter() {
            match event {
                RunEvent::StepFinished { step: 10, .. } => cancel.cancel(),
                RunEvent::Cancelled { step } => cancelled_at = Some(step),
                _ => {}
            }
        }
        let output = runner.join().unwrap().unwrap();
        assert_eq!(cancelled_at.map(|s| s + 1), Some(output.steps_completed()));
        output
    });

    let completed = output.steps_completed();
    assert!(completed > 10 && completed < 1500, "stopped after {completed} steps");
    assert!(!output.is_complete());
    // every sample taken before the stop matches the uninterrupted run
    for k in 0..output.samples().len() {
        if k * 3 < completed {
            assert_eq!(output.samples()[k], full.samples()[k], "sample {k}");
        }
    }
    let trace = &output.sensors()[0];
    assert_eq!(trace.hz[..completed], full.sensors()[0].hz[..completed]);
    assert!(trace.hz[completed..].iter().all(|v| v.is_nan()));
}

#[test]
fn test_pulse_leaves_through_pml() {
    let settings = Settings { cells_x: 40, cells_y: 40, pml_layers: 10, steps: 500, threads: 2, ..Default::default() };
    let output = simulate(
        SimulationBuilder::new(settings)
            .source(CurrentSource::gaussian(Point::new(0.0, 0.0), Polarization::X, 1.0E9, 1.0, 0.0, 0.2E-9))
            .sensor(Sensor::new(0.1, 0.1)),
    )
    .unwrap();
    assert!(!output.faulted());

    let hz = &output.sensors()[0].hz;
    let peak = hz.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let tail = hz[400..].iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    assert!(peak > 0.0);
    assert!(tail < 0.05 * peak, "tail {tail:e} vs peak {peak:e}");

    let last = output.samples().last().unwrap();
    assert!(last.hz.data.iter().all(|v| v.is_finite()));
}

#[test]
fn test_thread_count_beyond_columns_is_fine() {
    let settings = Settings { cells_x: 6, cells_y: 6, pml_layers: 3, steps: 10, threads: 12, ..Default::default() };
    let builder = SimulationBuilder::new(settings)
        .source(CurrentSource::sinusoidal(Point::new(0.0, 0.0), Polarization::Y, 1.0E9, 1.0));
    let many = simulate(builder.clone()).unwrap();
    let mut single = builder;
    single.settings.threads = 1;
    assert_eq!(many.samples(), simulate(single).unwrap().samples());
}

#[test]
fn test_random_configurations_stay_bounded() {
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..8 {
        let settings = Settings {
            cells_x: rng.gen_range(10..30),
            cells_y: rng.gen_range(10..30),
            pml_layers: rng.gen_range(2..9),
            courant: rng.gen_range(0.5..0.9999),
            sigma_x_max: rng.gen_range(0.5..3.0),
            sigma_y_max: rng.gen_range(0.5..3.0),
            steps: 150,
            threads: rng.gen_range(1..5),
            ..Default::default()
        };

        // without excitation the grid stays exactly at rest
        let quiet = simulate(SimulationBuilder::new(settings.clone())).unwrap();
        assert!(quiet.samples().iter().all(|s| s.hz.data.iter().all(|&v| v == 0.0)));

        let pulsed = simulate(
            SimulationBuilder::new(settings)
                .source(CurrentSource::gaussian(Point::new(0.0, 0.0), Polarization::X, 1.0E9, 1.0, 0.0, 0.2E-9)),
        )
        .unwrap();
        let extents = pulsed.extents();
        assert!(!pulsed.faulted() && !extents.non_finite);
        let bound = 10.0 * extents.ex.1.abs().max(extents.ex.0.abs());
        let last = pulsed.samples().last().unwrap();
        assert!(last.ex.data.iter().all(|v| v.abs() <= bound));
    }
}
