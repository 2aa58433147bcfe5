use super::block::Side;
use super::flux::FluxScheme;
use super::gas::{self, State};
use crate::error::{SolverError, SolverResult};
use crate::global_variables::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryCondition {
    SupersonicInflow,
    SupersonicOutflow,
    NoSlip,
    Symmetry,
    Farfield,
    Outflow,
    Inflow,
    Joint,
    Null,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryPatch {
    pub rule: BoundaryCondition,
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl BoundaryPatch {
    pub fn new(rule: BoundaryCondition, start: Option<usize>, end: Option<usize>) -> Self {
        Self { rule, start, end }
    }

    pub fn full(rule: BoundaryCondition) -> Self {
        Self::new(rule, None, None)
    }
}

pub type BlockBoundaryConditions = [Vec<BoundaryPatch>; 4];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlowConditions {
    pub freestream: Option<State>,
    pub exit_pressure: Option<Float>,
}

impl BoundaryCondition {
    pub fn from_name(name: &str) -> Option<Self> {
        let rule = match name {
            "supersonic_inflow" => BoundaryCondition::SupersonicInflow,
            "supersonic_outflow" => BoundaryCondition::SupersonicOutflow,
            "no_slip" => BoundaryCondition::NoSlip,
            "symmetry" | "slip" => BoundaryCondition::Symmetry,
            "farfield" => BoundaryCondition::Farfield,
            "outflow" => BoundaryCondition::Outflow,
            "inflow" => BoundaryCondition::Inflow,
            "joint" => BoundaryCondition::Joint,
            "null" => BoundaryCondition::Null,
            _ => return None,
        };
        Some(rule)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoundaryCondition::SupersonicInflow => "supersonic_inflow",
            BoundaryCondition::SupersonicOutflow => "supersonic_outflow",
            BoundaryCondition::NoSlip => "no_slip",
            BoundaryCondition::Symmetry => "symmetry",
            BoundaryCondition::Farfield => "farfield",
            BoundaryCondition::Outflow => "outflow",
            BoundaryCondition::Inflow => "inflow",
            BoundaryCondition::Joint => "joint",
            BoundaryCondition::Null => "null",
        }
    }

    pub fn is_passive(&self) -> bool {
        matches!(self, BoundaryCondition::Joint | BoundaryCondition::Null)
    }

    pub fn check_conditions(&self, conditions: &FlowConditions) -> SolverResult<()> {
        let needs_freestream = matches!(
            self,
            BoundaryCondition::SupersonicInflow
                | BoundaryCondition::Farfield
                | BoundaryCondition::Inflow
        );
        if needs_freestream && conditions.freestream.is_none() {
            return Err(SolverError::config(
                "freestream",
                format!("required by the `{}` boundary condition", self.name()),
            ));
        }
        if *self == BoundaryCondition::Outflow && conditions.exit_pressure.is_none() {
            return Err(SolverError::config(
                "exit_pressure",
                "required by the `outflow` boundary condition",
            ));
        }
        Ok(())
    }

    /// Flux through `side` for the interior cell at `ic` (0: left, 1: right),
    /// already signed for accumulation into that cell's residual.
    pub fn flux(
        &self,
        side: &Side,
        ic: usize,
        p_in: &State,
        scheme: &FluxScheme,
        conditions: &FlowConditions,
    ) -> Option<State> {
        let flux = match self {
            BoundaryCondition::SupersonicOutflow => {
                gas::analytic_flux(p_in, side.normal, side.area)
            }
            BoundaryCondition::Joint | BoundaryCondition::Null => return None,
            // walls carry pressure only
            BoundaryCondition::NoSlip | BoundaryCondition::Symmetry => {
                let p_b = self.boundary_state(side, p_in, conditions)?;
                gas::analytic_flux(&p_b, side.normal, side.area)
            }
            _ => {
                let p_out = self.boundary_state(side, p_in, conditions)?;
                if ic == 1 {
                    scheme.flux(side, &p_out, p_in)
                } else {
                    scheme.flux(side, p_in, &p_out)
                }
            }
        };
        let sign = sign_ic(ic);
        Some(flux.map(|f| sign * f))
    }

    fn boundary_state(
        &self,
        side: &Side,
        p_in: &State,
        conditions: &FlowConditions,
    ) -> Option<State> {
        let n = side.normal;
        let state = match self {
            BoundaryCondition::SupersonicInflow | BoundaryCondition::Farfield => {
                conditions.freestream?
            }
            BoundaryCondition::NoSlip => [p_in[0], 0.0, 0.0, p_in[3]],
            BoundaryCondition::Symmetry => {
                let v_in = gas::velocity(p_in);
                let v_b = v_in - v_in.dot(n) * n;
                [p_in[0], v_b.x, v_b.y, p_in[3]]
            }
            BoundaryCondition::Outflow => {
                let p_exit = conditions.exit_pressure?;
                let rho_b = p_in[0] * (p_exit / p_in[3]).powf(1.0 / GAMMA);
                let a_b = (GAMMA * p_exit / rho_b).sqrt();
                let v_in = gas::velocity(p_in);
                let vn_in = v_in.dot(n);
                let r_plus = vn_in + 2.0 * gas::sound_speed(p_in) / GAMMA_M1;
                let vn_b = r_plus - 2.0 * a_b / GAMMA_M1;
                let v_b = v_in + (vn_b - vn_in) * n;
                [rho_b, v_b.x, v_b.y, p_exit]
            }
            BoundaryCondition::Inflow => {
                let p_e = conditions.freestream?;
                if gas::mach(p_in) >= 1.0 {
                    p_e
                } else {
                    let v_e = gas::velocity(&p_e);
                    let vn_in = gas::velocity(p_in).dot(n);
                    let vn_e = v_e.dot(n);
                    let r_plus = vn_e + 2.0 * gas::sound_speed(&p_e) / GAMMA_M1;
                    let r_minus = vn_in - 2.0 * gas::sound_speed(p_in) / GAMMA_M1;
                    let vn_b = 0.5 * (r_plus + r_minus);
                    let a_b = 0.25 * GAMMA_M1 * (r_plus - r_minus);
                    let v_b = v_e + (vn_b - vn_e) * n;
                    let entropy = p_e[3] / p_e[0].powf(GAMMA);
                    let rho_b = (a_b * a_b / (GAMMA * entropy)).powf(1.0 / GAMMA_M1);
                    let p_b = entropy * rho_b.powf(GAMMA);
                    [rho_b, v_b.x, v_b.y, p_b]
                }
            }
            BoundaryCondition::SupersonicOutflow
            | BoundaryCondition::Joint
            | BoundaryCondition::Null => return None,
        };
        Some(state)
    }
}

pub fn sign_ic(ic: usize) -> Float {
    if ic == 0 {
        -1.0
    } else {
        1.0
    }
}
