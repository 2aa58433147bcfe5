use crate::global_variables::*;
use glam::DVec2;

pub type State = [Float; 4];

pub fn primitive_to_conserved(p: &State) -> State {
    [
        p[0],
        p[0] * p[1],
        p[0] * p[2],
        p[3] / GAMMA_M1 + 0.5 * p[0] * (p[1] * p[1] + p[2] * p[2]),
    ]
}

pub fn conserved_to_primitive(u: &State) -> State {
    let rho = u[0];
    let vx = u[1] / rho;
    let vy = u[2] / rho;
    [rho, vx, vy, (u[3] - 0.5 * rho * (vx * vx + vy * vy)) * GAMMA_M1]
}

pub fn analytic_flux(p: &State, normal: DVec2, area: Float) -> State {
    let vn = p[1] * normal.x + p[2] * normal.y;
    let mass = p[0] * vn;
    [
        mass * area,
        (mass * p[1] + p[3] * normal.x) * area,
        (mass * p[2] + p[3] * normal.y) * area,
        mass * total_enthalpy(p) * area,
    ]
}

pub fn total_enthalpy(p: &State) -> Float {
    GAMMA / GAMMA_M1 * p[3] / p[0] + 0.5 * (p[1] * p[1] + p[2] * p[2])
}

pub fn velocity(p: &State) -> DVec2 {
    DVec2::new(p[1], p[2])
}

pub fn sound_speed(p: &State) -> Float {
    (GAMMA * p[3] / p[0]).sqrt()
}

pub fn mach(p: &State) -> Float {
    velocity(p).length() / sound_speed(p)
}

pub fn temperature(p: &State) -> Float {
    p[3] / (R_GAS * p[0])
}

pub fn density(temperature: Float, pressure: Float) -> Float {
    pressure / (R_GAS * temperature)
}

pub fn from_static(mach: Float, temperature: Float, pressure: Float, alpha: Float) -> State {
    let rho = density(temperature, pressure);
    let speed = mach * (GAMMA * pressure / rho).sqrt();
    let alpha = alpha.to_radians();
    [rho, speed * alpha.cos(), speed * alpha.sin(), pressure]
}

pub fn from_total(
    mach: Float,
    total_temperature: Float,
    total_pressure: Float,
    alpha: Float,
) -> State {
    let m = 1.0 / (1.0 + 0.5 * GAMMA_M1 * mach * mach);
    let temperature = total_temperature * m;
    let pressure = total_pressure * m.powf(GAMMA / GAMMA_M1);
    from_static(mach, temperature, pressure, alpha)
}

pub fn total_conditions(p: &State) -> (Float, Float, Float) {
    let mach = mach(p);
    let m = 1.0 + 0.5 * GAMMA_M1 * mach * mach;
    (
        p[0] * m.powf(1.0 / GAMMA_M1),
        p[3] * m.powf(GAMMA / GAMMA_M1),
        temperature(p) * m,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conserved_round_trip() {
        let states = [
            [1.0, 0.0, 0.0, 101325.0],
            [0.1, 250.0, -30.0, 10132.5],
            [1.204, 680.0, 12.0, 101325.0],
        ];
        for p in states {
            let back = conserved_to_primitive(&primitive_to_conserved(&p));
            for k in 0..4 {
                assert!(
                    (back[k] - p[k]).abs() <= 1e-12 * p[k].abs().max(1.0),
                    "{k}: {} != {}",
                    back[k],
                    p[k]
                );
            }
        }
    }

    #[test]
    fn static_conditions_give_requested_mach() {
        let p = from_static(2.0, 293.15, 101325.0, 30.0);
        assert!((mach(&p) - 2.0).abs() < 1e-12);
        assert!((temperature(&p) - 293.15).abs() < 1e-9);
        assert!((p[2] / p[1] - 30.0_f64.to_radians().tan()).abs() < 1e-12);
    }

    #[test]
    fn total_conditions_invert_from_total() {
        let p = from_total(0.5, 300.0, 2.0e5, 0.0);
        let (_, total_pressure, total_temperature) = total_conditions(&p);
        assert!((total_pressure - 2.0e5).abs() < 1e-6);
        assert!((total_temperature - 300.0).abs() < 1e-9);
    }

    #[test]
    fn flux_of_gas_at_rest_is_pressure_only() {
        let p = [1.0, 0.0, 0.0, 1.0e5];
        let f = analytic_flux(&p, DVec2::new(0.6, 0.8), 2.0);
        let expected = [0.0, 1.2e5, 1.6e5, 0.0];
        for k in 0..4 {
            assert!((f[k] - expected[k]).abs() < 1e-9);
        }
    }
}
