use super::bc::{BlockBoundaryConditions, FlowConditions};
use super::block::{Block, CellRef, SideKind, EDGES};
use super::flux::FluxScheme;
use super::gas::{self, State};
use super::Simulation;
use crate::error::{SolverError, SolverResult};
use crate::global_variables::*;
use crate::io::Zone;
use crate::Residuals;
use colored::*;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeRange {
    pub block: usize,
    pub edge: usize,
    pub start: Option<usize>,
    pub end: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JointSpec {
    pub a: EdgeRange,
    pub b: EdgeRange,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum InitialField {
    #[default]
    Freestream,
    Uniform(State),
    ShockTube { left: State, right: State },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaseConditions {
    pub mesh_file: PathBuf,
    pub conditions: FlowConditions,
    pub initial_field: InitialField,
    pub boundary_conditions: Vec<BlockBoundaryConditions>,
    pub joints: Vec<JointSpec>,
}

pub struct Domain {
    pub blocks: Vec<Block>,
    pub conditions: FlowConditions,
    pub initial_field: InitialField,
    pub time_step_global: Float,
    flux_buffer: Vec<(CellRef, CellRef, State)>,
}

impl Domain {
    pub fn new(zones: &[Zone], case: CaseConditions) -> SolverResult<Self> {
        let mut names = HashSet::new();
        let mut blocks = Vec::with_capacity(zones.len());
        for (id, zone) in zones.iter().enumerate() {
            if !names.insert(zone.name.as_str()) {
                return Err(SolverError::config(
                    "mesh_file",
                    format!("zone name `{}` is used by more than one block", zone.name),
                ));
            }
            blocks.push(Block::new(id, zone)?);
        }
        if case.boundary_conditions.len() > blocks.len() {
            return Err(SolverError::config(
                format!("block_{}", case.boundary_conditions.len() - 1),
                format!("the mesh has {} blocks", blocks.len()),
            ));
        }
        log::info!(
            "Domain of {} blocks and {} cells.",
            blocks.len().to_string().yellow().bold(),
            blocks
                .iter()
                .map(|block| block.cells.len())
                .sum::<usize>()
                .to_string()
                .yellow()
                .bold()
        );
        if let Some(p) = case.conditions.freestream {
            let (rho_t, p_t, t_t) = gas::total_conditions(&p);
            log::info!(
                "Freestream: rho = {:.6e}, u = {:.6e}, v = {:.6e}, p = {:.6e}, Mach = {:.4}, T = {:.2} K (total: rho = {:.6e}, p = {:.6e}, T = {:.2} K).",
                p[0],
                p[1],
                p[2],
                p[3],
                gas::mach(&p),
                gas::temperature(&p),
                rho_t,
                p_t,
                t_t
            );
        }
        let mut domain = Self {
            blocks,
            conditions: case.conditions,
            initial_field: case.initial_field,
            time_step_global: 0.0,
            flux_buffer: Vec::new(),
        };
        domain.resolve_joints(&case.joints)?;
        domain.set_boundary_conditions(&case.boundary_conditions)?;
        Ok(domain)
    }

    fn check_edge(&self, joint: usize, range: &EdgeRange) -> SolverResult<()> {
        if range.block >= self.blocks.len() {
            return Err(SolverError::JointIndex {
                joint,
                message: format!(
                    "block {} does not exist ({} blocks)",
                    range.block,
                    self.blocks.len()
                ),
            });
        }
        if range.edge >= EDGES {
            return Err(SolverError::JointIndex {
                joint,
                message: format!("edge {} does not exist", range.edge),
            });
        }
        Ok(())
    }

    fn joint_faces(&self, joint: usize, range: &EdgeRange) -> SolverResult<Vec<usize>> {
        self.check_edge(joint, range)?;
        let block = &self.blocks[range.block];
        let positions = block.edge_range(range.edge, range.start, range.end)?;
        let faces = block.bounds[range.edge][positions.clone()].to_vec();
        for (position, &s) in positions.zip(&faces) {
            if block.sides[s].kind != SideKind::Boundary {
                return Err(SolverError::JointIndex {
                    joint,
                    message: format!(
                        "face {position} of block {} edge {} is already joined",
                        range.block, range.edge
                    ),
                });
            }
        }
        Ok(faces)
    }

    pub fn resolve_joints(&mut self, joints: &[JointSpec]) -> SolverResult<()> {
        for (k, joint) in joints.iter().enumerate() {
            let (a, b) = (&joint.a, &joint.b);
            let faces_a = self.joint_faces(k, a)?;
            let faces_b = self.joint_faces(k, b)?;
            if faces_a.len() != faces_b.len() {
                return Err(SolverError::JointRangeMismatch {
                    joint: k,
                    left: faces_a.len(),
                    right: faces_b.len(),
                });
            }
            if a.block == b.block && faces_a.iter().any(|s| faces_b.contains(s)) {
                return Err(SolverError::JointIndex {
                    joint: k,
                    message: "a face cannot be joined to itself".to_string(),
                });
            }

            let slot = a.edge % 2;
            let partner_slot = (b.edge + 1) % 2;
            for (&s_a, &s_b) in faces_a.iter().zip(&faces_b) {
                let partner = self.blocks[b.block].sides[s_b].cells[partner_slot];
                let block_a = &mut self.blocks[a.block];
                let side = &mut block_a.sides[s_a];
                side.cells[slot] = partner;
                side.kind = SideKind::Joined;
                block_a.inner_sides.push(s_a);
            }
            for &s_b in &faces_b {
                self.blocks[b.block].sides[s_b].kind = SideKind::JointPartner;
            }
            log::info!(
                "Joint {}: block {} edge {} <-> block {} edge {} ({} faces).",
                k,
                a.block,
                a.edge,
                b.block,
                b.edge,
                faces_a.len()
            );
        }
        Ok(())
    }

    pub fn set_boundary_conditions(
        &mut self,
        assignments: &[BlockBoundaryConditions],
    ) -> SolverResult<()> {
        for (b, block) in self.blocks.iter_mut().enumerate() {
            match assignments.get(b) {
                Some(assignment) => block.set_boundary_conditions(assignment, &self.conditions)?,
                None => log::warn!("Block {b} has no boundary conditions."),
            }
        }
        Ok(())
    }

    pub fn init_field(&mut self) -> SolverResult<()> {
        match self.initial_field {
            InitialField::Freestream => {
                let p = self.conditions.freestream.ok_or_else(|| {
                    SolverError::config("initial_field", "`freestream` is not defined")
                })?;
                self.blocks.iter_mut().for_each(|block| block.init_field(p));
            }
            InitialField::Uniform(p) => {
                self.blocks.iter_mut().for_each(|block| block.init_field(p));
            }
            InitialField::ShockTube { left, right } => {
                for block in self.blocks.iter_mut() {
                    let ni = block.ni;
                    block
                        .cells
                        .par_iter_mut()
                        .enumerate()
                        .for_each(|(index, cell)| {
                            let p = if index % ni < ni / 2 { left } else { right };
                            cell.set_primitive(p);
                        });
                }
            }
        }
        log::info!("Field initialized from {:?}.", self.initial_field);
        Ok(())
    }

    pub fn set_time_step(&mut self, cfl: Float) -> Float {
        let min = self
            .blocks
            .iter_mut()
            .map(|block| block.time_step())
            .fold(Float::INFINITY, Float::min);
        self.time_step_global = cfl * min;
        self.time_step_global
    }

    pub fn flux_bound_sides(&mut self, scheme: &FluxScheme) {
        let conditions = &self.conditions;
        for block in self.blocks.iter_mut() {
            block.flux_bound_sides(scheme, conditions);
        }
    }

    pub fn flux_inner_sides(&mut self, scheme: &FluxScheme) {
        let Domain {
            blocks,
            flux_buffer,
            ..
        } = self;
        let field: &Vec<Block> = blocks;
        flux_buffer.clear();
        flux_buffer.par_extend(field.par_iter().flat_map(move |block| {
            block.inner_sides.par_iter().filter_map(move |&s| {
                let side = &block.sides[s];
                let (left, right) = (side.left()?, side.right()?);
                let p_left = &field[left.block].cells[left.cell].primitive;
                let p_right = &field[right.block].cells[right.cell].primitive;
                Some((left, right, scheme.flux(side, p_left, p_right)))
            })
        }));
        for (left, right, flux) in flux_buffer.iter() {
            let cell = &mut blocks[left.block].cells[left.cell];
            for k in 0..4 {
                cell.residual[k] -= flux[k];
            }
            let cell = &mut blocks[right.block].cells[right.cell];
            for k in 0..4 {
                cell.residual[k] += flux[k];
            }
        }
    }

    pub fn compute_residuals(&self) -> Residuals {
        let sums = self
            .blocks
            .par_iter()
            .flat_map(|block| block.cells.par_iter())
            .map(|cell| cell.residual.map(|r| (r / cell.volume).powi(2)))
            .reduce(
                || [0.0; 4],
                |a, b| [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]],
            );
        Residuals {
            density: sums[0].sqrt(),
            momentum: [sums[1].sqrt(), sums[2].sqrt()],
            energy: sums[3].sqrt(),
        }
    }

    pub fn iteration(
        &mut self,
        scheme: &FluxScheme,
        dt: Float,
        iteration: usize,
        time: Float,
    ) -> SolverResult<Residuals> {
        self.flux_bound_sides(scheme);
        self.flux_inner_sides(scheme);
        let residuals = self.compute_residuals();
        for block in self.blocks.iter_mut() {
            block.new_conserved(dt);
        }
        for block in self.blocks.iter_mut() {
            block.new_primitive(iteration, time)?;
        }
        Ok(residuals)
    }

    pub fn run(&mut self, simulation: &mut Simulation, case_path: &Path) -> SolverResult<()> {
        crate::io::create_case_directories(case_path)?;
        self.recover_snapshot(case_path)?;
        let state_path = case_path
            .join(crate::io::DATA_PATH)
            .join(crate::io::STATE_FILE);
        if state_path.exists() {
            let (iteration, time) = self.read_field(case_path)?;
            simulation.restart(iteration, time);
        } else {
            log::warn!(
                "No run state in {}, starting from the initial field.",
                state_path.display().to_string().yellow().bold()
            );
            self.init_field()?;
            simulation.restart(0, 0.0);
        }
        simulation.solve(self, case_path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::euler::bc::{BoundaryCondition, BoundaryPatch};
    use glam::DVec2;

    pub(crate) fn zone(name: &str, x0: Float, ni: usize, nj: usize, dx: Float, dy: Float) -> Zone {
        let mut nodes = Vec::new();
        for j in 0..nj {
            for i in 0..ni {
                // a mild shear keeps the cells general quadrilaterals
                let y = j as Float * dy;
                nodes.push(DVec2::new(x0 + i as Float * dx + 0.1 * y, y));
            }
        }
        Zone::new(name.to_string(), ni, nj, nodes).unwrap()
    }

    fn all_edges(rule: BoundaryCondition) -> BlockBoundaryConditions {
        [
            vec![BoundaryPatch::full(rule)],
            vec![BoundaryPatch::full(rule)],
            vec![BoundaryPatch::full(rule)],
            vec![BoundaryPatch::full(rule)],
        ]
    }

    fn full_edge(block: usize, edge: usize) -> EdgeRange {
        EdgeRange {
            block,
            edge,
            start: None,
            end: None,
        }
    }

    fn two_blocks(rule: BoundaryCondition) -> CaseConditions {
        let mut left = all_edges(rule);
        left[1] = vec![BoundaryPatch::full(BoundaryCondition::Joint)];
        let mut right = all_edges(rule);
        right[0] = vec![BoundaryPatch::full(BoundaryCondition::Joint)];
        CaseConditions {
            boundary_conditions: vec![left, right],
            joints: vec![JointSpec {
                a: full_edge(0, 1),
                b: full_edge(1, 0),
            }],
            ..Default::default()
        }
    }

    fn split_zones() -> Vec<Zone> {
        vec![
            zone("1", 0.0, 4, 4, 0.1, 0.1),
            zone("2", 0.3, 3, 4, 0.1, 0.1),
        ]
    }

    fn smooth_field(center: DVec2) -> State {
        [
            1.0 + 0.2 * center.x + 0.1 * center.y,
            30.0 * center.y,
            -20.0 * center.x,
            1.0e5 * (1.0 + 0.3 * center.x * center.y),
        ]
    }

    fn set_field(domain: &mut Domain, field: impl Fn(DVec2) -> State) {
        for block in domain.blocks.iter_mut() {
            for cell in block.cells.iter_mut() {
                cell.set_primitive(field(cell.center));
            }
        }
    }

    #[test]
    fn joined_faces_become_interior() {
        let domain = Domain::new(&split_zones(), two_blocks(BoundaryCondition::Symmetry)).unwrap();
        let left = &domain.blocks[0];
        for &s in &left.bounds[1] {
            let side = &left.sides[s];
            assert_eq!(side.kind, SideKind::Joined);
            assert!(left.inner_sides.contains(&s));
            let partner = side.right().unwrap();
            assert_eq!(partner.block, 1);
            let d = domain.blocks[1].cells[partner.cell].center - left.cells[side.left().unwrap().cell].center;
            assert!(d.dot(side.normal) > 0.0);
        }
        let right = &domain.blocks[1];
        assert!(right.bounds[0]
            .iter()
            .all(|&s| right.sides[s].kind == SideKind::JointPartner));
    }

    #[test]
    fn closed_domain_conserves_mass_and_energy() {
        let mut domain = Domain::new(&split_zones(), two_blocks(BoundaryCondition::Symmetry)).unwrap();
        set_field(&mut domain, smooth_field);
        for scheme in [FluxScheme::default(), FluxScheme::Rusanov] {
            domain.flux_bound_sides(&scheme);
            domain.flux_inner_sides(&scheme);
            let (mut mass, mut energy, mut scale) = (0.0, 0.0, 0.0);
            for block in domain.blocks.iter_mut() {
                for cell in block.cells.iter_mut() {
                    mass += cell.residual[0];
                    energy += cell.residual[3];
                    scale += cell.residual[0].abs() + cell.residual[3].abs();
                    cell.residual = [0.0; 4];
                }
            }
            assert!(scale > 0.0);
            assert!(mass.abs() <= 1e-12 * scale, "{}: mass {mass}", scheme.name());
            assert!(energy.abs() <= 1e-12 * scale, "{}: energy {energy}", scheme.name());
        }
    }

    #[test]
    fn inner_fluxes_cancel_for_any_field() {
        let mut domain = Domain::new(&split_zones(), two_blocks(BoundaryCondition::Null)).unwrap();
        set_field(&mut domain, smooth_field);
        for scheme in [FluxScheme::default(), FluxScheme::Rusanov] {
            domain.flux_inner_sides(&scheme);
            let mut total = [0.0; 4];
            let mut scale = [0.0; 4];
            for block in domain.blocks.iter_mut() {
                for cell in block.cells.iter_mut() {
                    for k in 0..4 {
                        total[k] += cell.residual[k];
                        scale[k] += cell.residual[k].abs();
                    }
                    cell.residual = [0.0; 4];
                }
            }
            for k in 0..4 {
                assert!(total[k].abs() <= 1e-12 * scale[k].max(1.0), "{k}: {}", total[k]);
            }
        }
    }

    #[test]
    fn two_joined_blocks_match_one_block() {
        let single_zone = vec![zone("1", 0.0, 6, 4, 0.1, 0.1)];
        let single_case = CaseConditions {
            boundary_conditions: vec![all_edges(BoundaryCondition::Symmetry)],
            ..Default::default()
        };
        let mut single = Domain::new(&single_zone, single_case).unwrap();
        let mut split = Domain::new(&split_zones(), two_blocks(BoundaryCondition::Symmetry)).unwrap();
        set_field(&mut single, smooth_field);
        set_field(&mut split, smooth_field);

        let scheme = FluxScheme::default();
        for iteration in 0..5 {
            let dt_single = single.set_time_step(0.8);
            let dt_split = split.set_time_step(0.8);
            assert!((dt_single - dt_split).abs() <= 1e-12 * dt_single);
            single.iteration(&scheme, dt_single, iteration, 0.0).unwrap();
            split.iteration(&scheme, dt_single, iteration, 0.0).unwrap();
        }

        let whole = &single.blocks[0];
        for j in 0..whole.nj {
            for i in 0..whole.ni {
                let expected = whole.get_cell(j, i).primitive;
                let actual = if i < 3 {
                    split.blocks[0].get_cell(j, i).primitive
                } else {
                    split.blocks[1].get_cell(j, i - 3).primitive
                };
                for k in 0..4 {
                    assert!(
                        (expected[k] - actual[k]).abs() <= 1e-10 * expected[k].abs().max(1.0),
                        "cell ({j}, {i}) component {k}: {} != {}",
                        expected[k],
                        actual[k]
                    );
                }
            }
        }
    }

    #[test]
    fn global_time_step_is_bounded_by_every_cell() {
        let mut domain = Domain::new(&split_zones(), two_blocks(BoundaryCondition::Null)).unwrap();
        set_field(&mut domain, smooth_field);
        let cfl = 0.7;
        let dt = domain.set_time_step(cfl);
        let mut min: Float = Float::INFINITY;
        for block in &domain.blocks {
            for cell in &block.cells {
                let p = &cell.primitive;
                let bound = cell.size / (gas::velocity(p).length() + gas::sound_speed(p));
                assert!(dt <= cfl * bound * (1.0 + 1e-15));
                min = min.min(bound);
            }
        }
        assert_eq!(dt, cfl * min);
        assert_eq!(domain.time_step_global, dt);
    }

    #[test]
    fn mismatched_joint_ranges_are_rejected() {
        let mut case = two_blocks(BoundaryCondition::Null);
        case.joints[0].b = EdgeRange {
            block: 1,
            edge: 0,
            start: Some(1),
            end: None,
        };
        assert!(matches!(
            Domain::new(&split_zones(), case),
            Err(SolverError::JointRangeMismatch {
                joint: 0,
                left: 3,
                right: 2
            })
        ));
    }

    #[test]
    fn joint_indices_are_checked() {
        let mut case = two_blocks(BoundaryCondition::Null);
        case.joints[0].b.block = 2;
        assert!(matches!(
            Domain::new(&split_zones(), case),
            Err(SolverError::JointIndex { joint: 0, .. })
        ));

        let mut case = two_blocks(BoundaryCondition::Null);
        case.joints[0].a.edge = 4;
        assert!(matches!(
            Domain::new(&split_zones(), case),
            Err(SolverError::JointIndex { joint: 0, .. })
        ));

        let mut case = two_blocks(BoundaryCondition::Null);
        let repeated = case.joints[0];
        case.joints.push(repeated);
        assert!(matches!(
            Domain::new(&split_zones(), case),
            Err(SolverError::JointIndex { joint: 1, .. })
        ));
    }

    #[test]
    fn active_rule_on_joined_face_is_rejected() {
        let mut case = two_blocks(BoundaryCondition::Null);
        case.boundary_conditions[0][1] = vec![BoundaryPatch::full(BoundaryCondition::Symmetry)];
        assert!(matches!(
            Domain::new(&split_zones(), case),
            Err(SolverError::Config { .. })
        ));
    }

    #[test]
    fn duplicate_zone_names_are_rejected() {
        let zones = vec![
            zone("1", 0.0, 3, 3, 0.1, 0.1),
            zone("1", 0.2, 3, 3, 0.1, 0.1),
        ];
        assert!(matches!(
            Domain::new(&zones, CaseConditions::default()),
            Err(SolverError::Config { .. })
        ));
    }

    #[test]
    fn shock_tube_splits_each_row() {
        let zones = vec![zone("1", 0.0, 7, 3, 0.1, 0.1)];
        let left = [1.0, 0.0, 0.0, 101325.0];
        let right = [0.1, 0.0, 0.0, 10132.5];
        let case = CaseConditions {
            initial_field: InitialField::ShockTube { left, right },
            ..Default::default()
        };
        let mut domain = Domain::new(&zones, case).unwrap();
        domain.init_field().unwrap();
        let block = &domain.blocks[0];
        for j in 0..block.nj {
            for i in 0..block.ni {
                let expected = if i < 3 { left } else { right };
                assert_eq!(block.get_cell(j, i).primitive, expected);
            }
        }
    }

    #[test]
    fn freestream_initial_field_needs_freestream() {
        let zones = vec![zone("1", 0.0, 3, 3, 0.1, 0.1)];
        let mut domain = Domain::new(&zones, CaseConditions::default()).unwrap();
        assert!(matches!(
            domain.init_field(),
            Err(SolverError::Config { .. })
        ));
    }
}
