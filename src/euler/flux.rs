use super::block::Side;
use super::gas::{self, State};
use crate::global_variables::*;
use glam::DVec2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FluxScheme {
    Roe { entropy_fix: Float },
    Rusanov,
}

impl Default for FluxScheme {
    fn default() -> Self {
        FluxScheme::Roe {
            entropy_fix: ROE_ENTROPY_FIX,
        }
    }
}

impl FluxScheme {
    pub fn name(&self) -> &'static str {
        match self {
            FluxScheme::Roe { .. } => "roe",
            FluxScheme::Rusanov => "rusanov",
        }
    }

    pub fn flux(&self, side: &Side, p_left: &State, p_right: &State) -> State {
        self.flux_through(side.normal, side.area, p_left, p_right)
    }

    pub fn flux_through(
        &self,
        normal: DVec2,
        area: Float,
        p_left: &State,
        p_right: &State,
    ) -> State {
        match *self {
            FluxScheme::Roe { entropy_fix } => roe(normal, area, p_left, p_right, entropy_fix),
            FluxScheme::Rusanov => rusanov(normal, area, p_left, p_right),
        }
    }
}

fn harten(lambda: Float, delta: Float) -> Float {
    let abs = lambda.abs();
    if abs < delta {
        (lambda * lambda + delta * delta) / (2.0 * delta)
    } else {
        abs
    }
}

pub fn roe(
    normal: DVec2,
    area: Float,
    p_left: &State,
    p_right: &State,
    entropy_fix: Float,
) -> State {
    let (nx, ny) = (normal.x, normal.y);

    let vn_l = p_left[1] * nx + p_left[2] * ny;
    let vn_r = p_right[1] * nx + p_right[2] * ny;
    let vt_l = -p_left[1] * ny + p_left[2] * nx;
    let vt_r = -p_right[1] * ny + p_right[2] * nx;

    // Roe averages
    let sqrt_l = p_left[0].sqrt();
    let sqrt_r = p_right[0].sqrt();
    let w = sqrt_l / (sqrt_l + sqrt_r);
    let rho = sqrt_l * sqrt_r;
    let u = w * p_left[1] + (1.0 - w) * p_right[1];
    let v = w * p_left[2] + (1.0 - w) * p_right[2];
    let h = w * gas::total_enthalpy(p_left) + (1.0 - w) * gas::total_enthalpy(p_right);
    let q2 = u * u + v * v;
    let a2 = GAMMA_M1 * (h - 0.5 * q2);
    let a = a2.sqrt();
    let vn = u * nx + v * ny;
    let vt = -u * ny + v * nx;

    // wave strengths
    let d_rho = p_right[0] - p_left[0];
    let d_p = p_right[3] - p_left[3];
    let d_vn = vn_r - vn_l;
    let d_vt = vt_r - vt_l;
    let alpha_1 = (d_p - rho * a * d_vn) / (2.0 * a2);
    let alpha_2 = d_rho - d_p / a2;
    let alpha_3 = rho * d_vt;
    let alpha_4 = (d_p + rho * a * d_vn) / (2.0 * a2);

    // contact and shear waves are left untouched so a stationary contact stays sharp
    let delta = entropy_fix * (vn.abs() + a);
    let lambda_1 = harten(vn - a, delta);
    let lambda_2 = vn.abs();
    let lambda_4 = harten(vn + a, delta);

    let r_1 = [1.0, u - a * nx, v - a * ny, h - a * vn];
    let r_2 = [1.0, u, v, 0.5 * q2];
    let r_3 = [0.0, -ny, nx, vt];
    let r_4 = [1.0, u + a * nx, v + a * ny, h + a * vn];

    let f_l = gas::analytic_flux(p_left, normal, 1.0);
    let f_r = gas::analytic_flux(p_right, normal, 1.0);
    let mut f = [0.0; 4];
    for k in 0..4 {
        let dissipation = lambda_1 * alpha_1 * r_1[k]
            + lambda_2 * (alpha_2 * r_2[k] + alpha_3 * r_3[k])
            + lambda_4 * alpha_4 * r_4[k];
        f[k] = (0.5 * (f_l[k] + f_r[k]) - 0.5 * dissipation) * area;
    }
    f
}

pub fn rusanov(normal: DVec2, area: Float, p_left: &State, p_right: &State) -> State {
    let speed = |p: &State| gas::velocity(p).dot(normal).abs() + gas::sound_speed(p);
    let s_max = speed(p_left).max(speed(p_right));
    let u_l = gas::primitive_to_conserved(p_left);
    let u_r = gas::primitive_to_conserved(p_right);
    let f_l = gas::analytic_flux(p_left, normal, 1.0);
    let f_r = gas::analytic_flux(p_right, normal, 1.0);
    let mut f = [0.0; 4];
    for k in 0..4 {
        f[k] = (0.5 * (f_l[k] + f_r[k]) - 0.5 * s_max * (u_r[k] - u_l[k])) * area;
    }
    f
}
