use super::bc::{BlockBoundaryConditions, BoundaryCondition, FlowConditions};
use super::flux::FluxScheme;
use super::gas::State;
use super::{geometry, Cell};
use crate::error::{SolverError, SolverResult};
use crate::global_variables::*;
use crate::io::Zone;
use glam::DVec2;
use rayon::prelude::*;
use std::ops::Range;

pub const EDGES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub block: usize,
    pub cell: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SideKind {
    Interior,
    Boundary,
    Joined,
    JointPartner,
}

/// A cell face. `cells[0]` is the left cell and `cells[1]` the right one;
/// the normal points from left to right.
#[derive(Clone, Debug)]
pub struct Side {
    pub area: Float,
    pub normal: DVec2,
    pub cells: [Option<CellRef>; 2],
    pub kind: SideKind,
}

impl Side {
    pub fn new(side_vector: DVec2, cells: [Option<CellRef>; 2], kind: SideKind) -> Self {
        Self {
            area: geometry::area(side_vector),
            normal: geometry::normal(side_vector),
            cells,
            kind,
        }
    }

    pub fn left(&self) -> Option<CellRef> {
        self.cells[0]
    }

    pub fn right(&self) -> Option<CellRef> {
        self.cells[1]
    }
}

/// A structured zone of `nj x ni` cells.
///
/// Boundary edges, in order:
///
/// ```text
///                 bound_3
///              <----------
///          ^                 ^
///  bound_0 |   inner_sides   | bound_1
///              <----------
///                 bound_2
/// ```
#[derive(Clone, Debug)]
pub struct Block {
    pub id: usize,
    pub name: String,
    pub ni: usize,
    pub nj: usize,
    pub nodes: Vec<DVec2>,
    pub cells: Vec<Cell>,
    pub sides: Vec<Side>,
    pub bounds: [Vec<usize>; EDGES],
    pub inner_sides: Vec<usize>,
    pub boundary_conditions: [Vec<(BoundaryCondition, Range<usize>)>; EDGES],
}

impl Block {
    pub fn new(id: usize, zone: &Zone) -> SolverResult<Self> {
        let ni = zone.ni - 1;
        let nj = zone.nj - 1;
        let mut block = Self {
            id,
            name: zone.name.clone(),
            ni,
            nj,
            nodes: zone.nodes.clone(),
            cells: Vec::with_capacity(ni * nj),
            sides: Vec::with_capacity(2 * ni * nj + ni + nj),
            bounds: Default::default(),
            inner_sides: Vec::new(),
            boundary_conditions: Default::default(),
        };
        block.set_cells()?;
        block.set_sides();
        Ok(block)
    }

    pub fn node(&self, j: usize, i: usize) -> DVec2 {
        self.nodes[j * (self.ni + 1) + i]
    }

    pub fn vertices(&self, j: usize, i: usize) -> [DVec2; 4] {
        [
            self.node(j, i),
            self.node(j, i + 1),
            self.node(j + 1, i + 1),
            self.node(j + 1, i),
        ]
    }

    pub fn cell_index(&self, j: usize, i: usize) -> usize {
        j * self.ni + i
    }

    pub fn cell_position(&self, index: usize) -> (usize, usize) {
        (index / self.ni, index % self.ni)
    }

    pub fn get_cell(&self, j: usize, i: usize) -> &Cell {
        &self.cells[self.cell_index(j, i)]
    }

    fn cell_ref(&self, j: usize, i: usize) -> Option<CellRef> {
        Some(CellRef {
            block: self.id,
            cell: self.cell_index(j, i),
        })
    }

    fn set_cells(&mut self) -> SolverResult<()> {
        for j in 0..self.nj {
            for i in 0..self.ni {
                let vertices = self.vertices(j, i);
                let volume = geometry::signed_volume(&vertices);
                if !(volume > 0.0) {
                    return Err(SolverError::DegenerateCell {
                        block: self.id,
                        j,
                        i,
                        volume,
                    });
                }
                self.cells.push(Cell::new(&vertices));
            }
        }
        Ok(())
    }

    fn set_sides(&mut self) {
        let (ni, nj) = (self.ni, self.nj);
        let vertical = |block: &Block, j: usize, i: usize| block.node(j + 1, i) - block.node(j, i);
        let horizontal =
            |block: &Block, j: usize, i: usize| block.node(j, i) - block.node(j, i + 1);

        for j in 0..nj {
            let side = Side::new(
                vertical(self, j, 0),
                [None, self.cell_ref(j, 0)],
                SideKind::Boundary,
            );
            self.push_bound(0, side);
        }
        for j in 0..nj {
            let side = Side::new(
                vertical(self, j, ni),
                [self.cell_ref(j, ni - 1), None],
                SideKind::Boundary,
            );
            self.push_bound(1, side);
        }
        for i in 0..ni {
            let side = Side::new(
                horizontal(self, 0, i),
                [None, self.cell_ref(0, i)],
                SideKind::Boundary,
            );
            self.push_bound(2, side);
        }
        for i in 0..ni {
            let side = Side::new(
                horizontal(self, nj, i),
                [self.cell_ref(nj - 1, i), None],
                SideKind::Boundary,
            );
            self.push_bound(3, side);
        }

        for j in 1..nj {
            for i in 0..ni {
                let side = Side::new(
                    horizontal(self, j, i),
                    [self.cell_ref(j - 1, i), self.cell_ref(j, i)],
                    SideKind::Interior,
                );
                self.push_inner(side);
            }
        }
        for i in 1..ni {
            for j in 0..nj {
                let side = Side::new(
                    vertical(self, j, i),
                    [self.cell_ref(j, i - 1), self.cell_ref(j, i)],
                    SideKind::Interior,
                );
                self.push_inner(side);
            }
        }
    }

    fn push_bound(&mut self, edge: usize, side: Side) {
        self.bounds[edge].push(self.sides.len());
        self.sides.push(side);
    }

    fn push_inner(&mut self, side: Side) {
        self.inner_sides.push(self.sides.len());
        self.sides.push(side);
    }

    pub fn edge_range(
        &self,
        edge: usize,
        start: Option<usize>,
        end: Option<usize>,
    ) -> SolverResult<Range<usize>> {
        let faces = self.bounds[edge].len();
        let range = start.unwrap_or(0)..end.unwrap_or(faces);
        if range.start > range.end || range.end > faces {
            return Err(SolverError::BoundaryRange {
                block: self.id,
                edge,
                start,
                end,
                faces,
            });
        }
        Ok(range)
    }

    pub fn set_boundary_conditions(
        &mut self,
        assignment: &BlockBoundaryConditions,
        conditions: &FlowConditions,
    ) -> SolverResult<()> {
        let mut boundary_conditions: [Vec<(BoundaryCondition, Range<usize>)>; EDGES] =
            Default::default();
        for (edge, patches) in assignment.iter().enumerate() {
            for patch in patches {
                let range = self.edge_range(edge, patch.start, patch.end)?;
                patch.rule.check_conditions(conditions)?;
                let mut unjoined = 0;
                for position in range.clone() {
                    match self.sides[self.bounds[edge][position]].kind {
                        SideKind::Joined | SideKind::JointPartner if !patch.rule.is_passive() => {
                            return Err(SolverError::config(
                                format!("block_{}_edge_{}", self.id, edge),
                                format!(
                                    "face {position} belongs to a joint and cannot carry `{}`",
                                    patch.rule.name()
                                ),
                            ));
                        }
                        SideKind::Boundary => unjoined += 1,
                        _ => {}
                    }
                }
                if patch.rule == BoundaryCondition::Joint && unjoined > 0 {
                    log::warn!(
                        "Block {} edge {}: {} faces carry `joint` without a joint, they receive no flux.",
                        self.id,
                        edge,
                        unjoined
                    );
                }
                boundary_conditions[edge].push((patch.rule, range));
            }
        }
        self.boundary_conditions = boundary_conditions;
        Ok(())
    }

    pub fn init_field(&mut self, p: State) {
        self.cells
            .par_iter_mut()
            .for_each(|cell| cell.set_primitive(p));
    }

    pub fn time_step(&mut self) -> Float {
        self.cells
            .par_iter_mut()
            .map(|cell| cell.time_step())
            .reduce(|| Float::INFINITY, Float::min)
    }

    pub fn flux_bound_sides(&mut self, scheme: &FluxScheme, conditions: &FlowConditions) {
        let Block {
            cells,
            sides,
            bounds,
            boundary_conditions,
            ..
        } = self;
        for (edge, patches) in boundary_conditions.iter().enumerate() {
            let ic = (edge + 1) % 2;
            for (rule, range) in patches {
                for &s in &bounds[edge][range.clone()] {
                    let side = &sides[s];
                    if side.kind != SideKind::Boundary {
                        continue;
                    }
                    let Some(inner) = side.cells[ic] else {
                        continue;
                    };
                    let cell = &mut cells[inner.cell];
                    if let Some(flux) = rule.flux(side, ic, &cell.primitive, scheme, conditions)
                    {
                        for k in 0..4 {
                            cell.residual[k] += flux[k];
                        }
                    }
                }
            }
        }
    }

    pub fn new_conserved(&mut self, dt: Float) {
        self.cells
            .par_iter_mut()
            .for_each(|cell| cell.update_conserved(dt));
    }

    pub fn new_primitive(&mut self, iteration: usize, time: Float) -> SolverResult<()> {
        let (block, ni) = (self.id, self.ni);
        self.cells
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(index, cell)| {
                cell.recover_primitive()
                    .map_err(|(quantity, value)| SolverError::NumericalBreakdown {
                        block,
                        j: index / ni,
                        i: index % ni,
                        iteration,
                        time,
                        quantity,
                        value,
                    })
            })
    }

    pub fn field(&self) -> Vec<State> {
        self.cells.iter().map(|cell| cell.primitive).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::euler::bc::BoundaryPatch;

    fn zone(ni: usize, nj: usize, dx: Float, dy: Float) -> Zone {
        let mut nodes = Vec::new();
        for j in 0..nj {
            for i in 0..ni {
                nodes.push(DVec2::new(i as Float * dx, j as Float * dy));
            }
        }
        Zone::new("1".to_string(), ni, nj, nodes).unwrap()
    }

    #[test]
    fn structured_counts() {
        let block = Block::new(0, &zone(5, 4, 1.0, 1.0)).unwrap();
        assert_eq!((block.ni, block.nj), (4, 3));
        assert_eq!(block.cells.len(), 12);
        assert_eq!(block.bounds[0].len(), 3);
        assert_eq!(block.bounds[1].len(), 3);
        assert_eq!(block.bounds[2].len(), 4);
        assert_eq!(block.bounds[3].len(), 4);
        // (nj-1)*ni horizontal + (ni-1)*nj vertical
        assert_eq!(block.inner_sides.len(), 2 * 4 + 3 * 3);
    }

    #[test]
    fn every_cell_has_four_faces() {
        let block = Block::new(0, &zone(5, 4, 1.0, 0.5)).unwrap();
        let mut faces = vec![0; block.cells.len()];
        for side in &block.sides {
            for cell in side.cells.iter().flatten() {
                faces[cell.cell] += 1;
            }
        }
        assert!(faces.iter().all(|&n| n == 4));
    }

    #[test]
    fn normals_point_from_left_to_right_cell() {
        let block = Block::new(0, &zone(4, 4, 0.3, 0.7)).unwrap();
        for side in &block.sides {
            if let (Some(l), Some(r)) = (side.left(), side.right()) {
                let d = block.cells[r.cell].center - block.cells[l.cell].center;
                assert!(d.dot(side.normal) > 0.0);
                let (lj, li) = block.cell_position(l.cell);
                let (rj, ri) = block.cell_position(r.cell);
                assert_eq!((rj - lj) + (ri - li), 1);
            }
        }
        // edge 0 normals point into the block, edge 1 normals point out of it
        let first = &block.sides[block.bounds[0][0]];
        let last = &block.sides[block.bounds[1][0]];
        assert_eq!(first.normal, DVec2::new(1.0, 0.0));
        assert_eq!(last.normal, DVec2::new(1.0, 0.0));
        assert_eq!(block.sides[block.bounds[2][0]].normal, DVec2::new(0.0, 1.0));
    }

    #[test]
    fn inverted_mesh_is_rejected() {
        let mut nodes = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                nodes.push(DVec2::new(i as Float, -(j as Float)));
            }
        }
        let zone = Zone::new("1".to_string(), 3, 3, nodes).unwrap();
        match Block::new(0, &zone) {
            Err(SolverError::DegenerateCell { j: 0, i: 0, .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn boundary_ranges_are_checked() {
        let mut block = Block::new(0, &zone(5, 3, 1.0, 1.0)).unwrap();
        let conditions = FlowConditions::default();
        let mut assignment: BlockBoundaryConditions = Default::default();
        assignment[2] = vec![
            BoundaryPatch::new(BoundaryCondition::Symmetry, None, Some(2)),
            BoundaryPatch::new(BoundaryCondition::NoSlip, Some(2), None),
        ];
        block
            .set_boundary_conditions(&assignment, &conditions)
            .unwrap();
        assert_eq!(block.boundary_conditions[2][1].1, 2..4);

        assignment[2] = vec![BoundaryPatch::new(
            BoundaryCondition::Symmetry,
            Some(1),
            Some(5),
        )];
        assert!(matches!(
            block.set_boundary_conditions(&assignment, &conditions),
            Err(SolverError::BoundaryRange { faces: 4, .. })
        ));
    }

    #[test]
    fn time_step_uses_size_over_wave_speed() {
        let mut block = Block::new(0, &zone(3, 3, 2.0, 1.0)).unwrap();
        let p = [1.0, 3.0, 4.0, 1.0 / GAMMA];
        block.init_field(p);
        // a = 1, |V| = 5, size = 1
        assert!((block.time_step() - 1.0 / 6.0).abs() < 1e-14);
    }
}
