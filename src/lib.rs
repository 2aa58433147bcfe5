pub mod error;
pub mod euler;
pub mod global_variables;
pub mod io;
pub mod post;

pub use error::{SolverError, SolverResult};
pub use global_variables::*;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Residuals {
    pub density: Float,
    pub momentum: [Float; 2],
    pub energy: Float,
}
