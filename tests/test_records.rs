//! Tagged-record definitions driven through a full run

use approx::assert_relative_eq;
use fdtd_hsg::prelude::*;

const DEFINITION: &str = "
-1
30 30 0.75 0.75 0.95 1.91 1.91 3.5 40 2 6 240 180 4 0
2 2
0.1 -0.2 0.3 0.2 2.5 1 0 1
0
1000 1 -0.2 0 y s 0 0 0 0 0 0 x
3
0.2 0.0
3
-0.1 0.1
4
-0.15 -0.15 0.0 0.0 2 2
";

#[test]
fn test_definition_runs() {
    let builder = read_records(DEFINITION).unwrap();
    assert_eq!(builder.settings.cells_x, 30);
    assert_relative_eq!(builder.settings.courant, 0.95);
    assert_eq!(builder.sensors.len(), 2);

    let output = simulate(builder).unwrap();
    assert!(output.is_complete());
    assert_eq!(output.samples().len(), 10);
    assert_eq!(output.subgrids().len(), 1);
    assert_relative_eq!(output.sample_time(2), 8.0 * output.d.dt);
    assert!(output.sensors().iter().all(|t| t.is_complete()));
}

#[test]
fn test_saved_definition_reproduces_run() {
    let builder = read_records(DEFINITION).unwrap();
    let path = std::env::temp_dir().join(format!("fdtd_hsg_records_{}.txt", std::process::id()));
    std::fs::write(&path, write_records(&builder)).unwrap();
    let reloaded = read_records(&std::fs::read_to_string(&path).unwrap()).unwrap();
    std::fs::remove_file(&path).ok();

    let (a, b) = (simulate(builder).unwrap(), simulate(reloaded).unwrap());
    assert_eq!(a.samples(), b.samples());
    assert_eq!(a.sensors(), b.sensors());
}

#[test]
fn test_invalid_entities_surface_before_run() {
    // Yu-Mittra on a conducting region
    let lossy = DEFINITION.replace("2.5 1 0 1", "2.5 1 0.5 1");
    assert!(matches!(read_records(&lossy).unwrap().build(), Err(SimError::InvalidMaterial(_))));

    // source outside the interior
    let outside = DEFINITION.replace("1000 1 -0.2 0", "1000 1 -0.9 0");
    assert!(matches!(read_records(&outside).unwrap().build(), Err(SimError::OutsideGrid { .. })));
}
