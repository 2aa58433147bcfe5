pub mod tecplot;

use super::domain::Domain;
use super::gas;
use crate::global_variables::*;
use crate::post::PostResult;
use rayon::prelude::*;

pub fn compute_total_mass(domain: &Domain) -> Vec<PostResult> {
    let mass = domain
        .blocks
        .par_iter()
        .flat_map(|block| block.cells.par_iter())
        .map(|cell| cell.primitive[0] * cell.volume)
        .sum::<Float>();
    let energy = domain
        .blocks
        .par_iter()
        .flat_map(|block| block.cells.par_iter())
        .map(|cell| cell.conserved[3] * cell.volume)
        .sum::<Float>();
    vec![
        PostResult::new(
            "total_mass".to_string(),
            "total mass".to_string(),
            mass,
            Some("kg/m".to_string()),
        ),
        PostResult::new(
            "total_energy".to_string(),
            "total energy".to_string(),
            energy,
            Some("J/m".to_string()),
        ),
    ]
}

pub fn compute_max_mach(domain: &Domain) -> Vec<PostResult> {
    let max_mach = domain
        .blocks
        .par_iter()
        .flat_map(|block| block.cells.par_iter())
        .map(|cell| gas::mach(&cell.primitive))
        .reduce_with(|a, b| a.max(b))
        .unwrap_or(0.0);
    let max_mach_result: PostResult = PostResult::new(
        "max_mach".to_string(),
        "maximum Mach number".to_string(),
        max_mach,
        None,
    );
    vec![max_mach_result]
}
