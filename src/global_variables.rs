pub const CASE_NAME: &'static str = "Case Test";

pub type Float = f64;

pub const GAMMA: Float = 1.4;

pub const GAMMA_M1: Float = GAMMA - 1.0;

pub const R_GAS: Float = 287.0;

pub const CFL: Float = 1.0;

pub const PRINT_FREQUENCY_ITER: usize = 100;

pub const ROE_ENTROPY_FIX: Float = 0.1;
