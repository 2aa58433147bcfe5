pub mod bc;
pub mod block;
pub mod domain;
pub mod flux;
pub mod gas;
pub mod geometry;
pub mod io;
pub mod post;

pub use bc::{BoundaryCondition, BoundaryPatch, FlowConditions};
pub use block::{Block, CellRef, Side, SideKind};
pub use domain::{CaseConditions, Domain, EdgeRange, InitialField, JointSpec};
pub use flux::FluxScheme;
pub use gas::State;

use crate::error::SolverResult;
use crate::global_variables::*;
use crate::Residuals;
use colored::*;
use glam::DVec2;
use std::path::Path;
use std::time::Instant;

#[derive(Clone, Debug)]
pub struct Cell {
    pub center: DVec2,
    pub volume: Float,
    pub size: Float,
    pub primitive: State,
    pub conserved: State,
    pub residual: State,
    pub dt: Float,
}

impl Cell {
    pub fn new(vertices: &[DVec2; 4]) -> Self {
        Self {
            center: geometry::center(vertices),
            volume: geometry::volume(vertices),
            size: geometry::size(vertices),
            primitive: [0.0; 4],
            conserved: [0.0; 4],
            residual: [0.0; 4],
            dt: 0.0,
        }
    }

    pub fn set_primitive(&mut self, p: State) {
        self.primitive = p;
        self.conserved = gas::primitive_to_conserved(&p);
        self.residual = [0.0; 4];
    }

    pub fn time_step(&mut self) -> Float {
        let p = &self.primitive;
        self.dt = self.size / (gas::velocity(p).length() + gas::sound_speed(p));
        self.dt
    }

    pub fn update_conserved(&mut self, dt: Float) {
        let factor = dt / self.volume;
        for k in 0..4 {
            self.conserved[k] += factor * self.residual[k];
        }
        self.residual = [0.0; 4];
    }

    pub fn recover_primitive(&mut self) -> Result<(), (&'static str, Float)> {
        let p = gas::conserved_to_primitive(&self.conserved);
        if !(p[0] > 0.0 && p[0].is_finite()) {
            return Err(("density", p[0]));
        }
        if !(p[3] > 0.0 && p[3].is_finite()) {
            return Err(("pressure", p[3]));
        }
        if !(p[1].is_finite() && p[2].is_finite()) {
            return Err(("velocity", gas::velocity(&p).length()));
        }
        self.primitive = p;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunParameters {
    pub case_name: String,
    pub cfl: Float,
    pub time_target: Option<Float>,
    pub iter_target: Option<usize>,
    pub write_field_frequency_time: Option<Float>,
    pub write_field_frequency_iter: Option<usize>,
    pub print_frequency_iter: usize,
    pub flux: FluxScheme,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            case_name: String::from(CASE_NAME),
            cfl: CFL,
            time_target: None,
            iter_target: None,
            write_field_frequency_time: None,
            write_field_frequency_iter: None,
            print_frequency_iter: PRINT_FREQUENCY_ITER,
            flux: FluxScheme::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Initializing,
    Iterating,
    Terminated,
}

#[derive(Clone, Debug)]
pub struct Simulation {
    pub parameters: RunParameters,
    pub iteration: usize,
    pub time: Float,
    pub stage: Stage,
    pub simulation_time: Instant,
    printed_lines: usize,
}

impl Simulation {
    pub fn new(parameters: RunParameters) -> Self {
        Self {
            parameters,
            iteration: 0,
            time: 0.0,
            stage: Stage::Initializing,
            simulation_time: Instant::now(),
            printed_lines: 0,
        }
    }

    pub fn restart(&mut self, iteration: usize, time: Float) {
        self.iteration = iteration;
        self.time = time;
    }

    pub fn stop_condition(&self) -> bool {
        let time_reached = self
            .parameters
            .time_target
            .is_some_and(|target| self.time >= target);
        let iter_reached = self
            .parameters
            .iter_target
            .is_some_and(|target| self.iteration >= target);
        time_reached || iter_reached
    }

    pub fn clip_time_step(&self, dt: Float) -> Float {
        match self.parameters.time_target {
            Some(target) if self.time + dt > target => target - self.time,
            _ => dt,
        }
    }

    pub fn next_step(&mut self, dt: Float) {
        self.iteration += 1;
        self.time += dt;
        if let Some(target) = self.parameters.time_target {
            if (target - self.time).abs() <= 4.0 * Float::EPSILON * target.abs() {
                self.time = target;
            }
        }
    }

    pub fn write_field_condition(&self, dt: Float) -> bool {
        let by_iteration = self
            .parameters
            .write_field_frequency_iter
            .is_some_and(|n| n > 0 && self.iteration % n == 0);
        let by_time = self
            .parameters
            .write_field_frequency_time
            .is_some_and(|f| f > 0.0 && (self.time / f).floor() > ((self.time - dt) / f).floor());
        by_iteration || by_time
    }

    pub fn print_condition(&self) -> bool {
        let n = self.parameters.print_frequency_iter.max(1);
        self.iteration % n == 0
    }

    pub fn solve(&mut self, domain: &mut Domain, case_path: &Path) -> SolverResult<()> {
        self.stage = Stage::Iterating;
        log::info!(
            "Iterating from iteration {} at time {:e} s with the {} flux.",
            self.iteration,
            self.time,
            self.parameters.flux.name().yellow().bold()
        );
        while !self.stop_condition() {
            let dt = self.clip_time_step(domain.set_time_step(self.parameters.cfl));
            let residuals =
                domain.iteration(&self.parameters.flux, dt, self.iteration + 1, self.time + dt)?;
            self.next_step(dt);
            log::debug!(
                "iteration: {}, dt: {:e}, time: {:e}",
                self.iteration,
                dt,
                self.time
            );

            if self.print_condition() {
                self.report(domain, case_path, dt, &residuals)?;
            }

            if !self.stop_condition() && self.write_field_condition(dt) {
                log::info!(
                    "Writing the field at iteration {}, time {:e} s.",
                    self.iteration,
                    self.time
                );
                domain.write_field(case_path, self.iteration, self.time)?;
            }
        }
        self.stage = Stage::Terminated;
        domain.write_field(case_path, self.iteration, self.time)?;
        log::info!(
            "Terminated at iteration {}, time {:e} s, after {:.2} s.",
            self.iteration,
            self.time,
            self.simulation_time.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn report(
        &mut self,
        domain: &Domain,
        case_path: &Path,
        dt: Float,
        residuals: &Residuals,
    ) -> SolverResult<()> {
        self.print_residuals(dt, residuals);
        self.printed_lines += 1;
        self.write_residuals(case_path, dt, residuals)?;
        self.write_post_processing(case_path, domain, post::compute_total_mass, "total_mass.dat")?;
        self.write_post_processing(case_path, domain, post::compute_max_mach, "max_mach.dat")?;
        Ok(())
    }
}

pub fn build_domain(case_path: &Path) -> SolverResult<Domain> {
    let case = CaseConditions::build_case_conditions(case_path)?;
    let zones = crate::io::import_mesh(&case_path.join(&case.mesh_file))?;
    Domain::new(&zones, case)
}

pub fn init(case_path: &Path) -> SolverResult<()> {
    let start = Instant::now();
    crate::io::create_case_directories(case_path)?;
    let mut domain = build_domain(case_path)?;
    domain.init_field()?;
    domain.write_field(case_path, 0, 0.0)?;
    log::info!(
        "Initial field written in {:.3} s.",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

pub fn run(case_path: &Path) -> SolverResult<()> {
    let mut simulation = Simulation::build_case_setup(case_path)?;
    let mut domain = build_domain(case_path)?;
    domain.run(&mut simulation, case_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> [DVec2; 4] {
        [
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(1.0, 1.0),
            DVec2::new(0.0, 1.0),
        ]
    }

    fn simulation(parameters: RunParameters) -> Simulation {
        Simulation::new(parameters)
    }

    #[test]
    fn recovered_state_matches_conserved() {
        let mut cell = Cell::new(&unit_square());
        cell.set_primitive([1.2, 100.0, -20.0, 9.0e4]);
        cell.residual = [0.01, 3.0, -1.0, 500.0];
        cell.update_conserved(1.0e-3);
        assert_eq!(cell.residual, [0.0; 4]);
        cell.recover_primitive().unwrap();
        let conserved = gas::primitive_to_conserved(&cell.primitive);
        for k in 0..4 {
            assert!((conserved[k] - cell.conserved[k]).abs() <= 1e-10 * conserved[k].abs().max(1.0));
        }
    }

    #[test]
    fn negative_pressure_is_reported() {
        let mut cell = Cell::new(&unit_square());
        cell.set_primitive([1.0, 0.0, 0.0, 1.0]);
        cell.residual = [0.0, 0.0, 0.0, -10.0];
        cell.update_conserved(1.0);
        match cell.recover_primitive() {
            Err(("pressure", value)) => assert!(value < 0.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn time_step_is_clipped_onto_target() {
        let mut sim = simulation(RunParameters {
            time_target: Some(0.0005),
            ..Default::default()
        });
        let mut steps = 0;
        while !sim.stop_condition() {
            let dt = sim.clip_time_step(0.00003);
            sim.next_step(dt);
            steps += 1;
        }
        assert_eq!(sim.time, 0.0005);
        assert_eq!(steps, 17);
        assert_eq!(sim.iteration, 17);
    }

    #[test]
    fn iteration_target_stops_the_run() {
        let mut sim = simulation(RunParameters {
            iter_target: Some(3),
            ..Default::default()
        });
        while !sim.stop_condition() {
            sim.next_step(1.0);
        }
        assert_eq!(sim.iteration, 3);
        sim.restart(0, 0.0);
        assert!(!sim.stop_condition());
    }

    #[test]
    fn snapshot_fires_once_per_time_period() {
        let mut sim = simulation(RunParameters {
            write_field_frequency_time: Some(0.1),
            ..Default::default()
        });
        let mut writes = 0;
        let dt = 0.0137;
        while sim.time < 1.0 {
            sim.next_step(dt);
            if sim.write_field_condition(dt) {
                writes += 1;
            }
        }
        // periods ending at 0.1, 0.2, ..., 1.0; the loop stops just past 1.0
        assert_eq!(writes, 10);
    }

    #[test]
    fn snapshot_fires_every_n_iterations() {
        let mut sim = simulation(RunParameters {
            write_field_frequency_iter: Some(4),
            ..Default::default()
        });
        let fired: Vec<usize> = (0..12)
            .filter_map(|_| {
                sim.next_step(1.0e-3);
                sim.write_field_condition(1.0e-3).then_some(sim.iteration)
            })
            .collect();
        assert_eq!(fired, vec![4, 8, 12]);
    }

    #[test]
    fn breakdown_names_the_failing_step() {
        let zones = vec![crate::euler::domain::tests::zone("1", 0.0, 3, 2, 1.0, 1.0)];
        let mut domain = Domain::new(&zones, CaseConditions::default()).unwrap();
        domain.blocks[0].cells[0].set_primitive([1.0, 0.0, 0.0, 1.0e5]);
        domain.blocks[0].cells[1].set_primitive([1.0, 0.0, 0.0, 1.0e-3]);
        let cfl = 10.0;
        let dt = domain.set_time_step(cfl);

        let mut sim = simulation(RunParameters {
            cfl,
            ..Default::default()
        });
        sim.restart(3, 0.25);
        let dir = crate::io::tests::scratch_dir("breakdown");
        match sim.solve(&mut domain, &dir) {
            Err(crate::SolverError::NumericalBreakdown {
                iteration, time, ..
            }) => {
                assert_eq!(iteration, 4);
                assert_eq!(time, 0.25 + dt);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
