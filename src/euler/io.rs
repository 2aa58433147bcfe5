use super::bc::{BlockBoundaryConditions, BoundaryCondition, BoundaryPatch, FlowConditions};
use super::block::EDGES;
use super::domain::{CaseConditions, Domain, EdgeRange, InitialField, JointSpec};
use super::flux::FluxScheme;
use super::gas::{self, State};
use super::{RunParameters, Simulation};
use crate::error::{SolverError, SolverResult};
use crate::global_variables::*;
use crate::io::{parse_optional_token, parse_parameter, parse_token};
use crate::Residuals;
use colored::*;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const SETUP_KEYS: [&'static str; 8] = [
    "case_name",
    "cfl",
    "time_target",
    "iter_target",
    "write_field_frequency_time",
    "write_field_frequency_iter",
    "print_frequency_iter",
    "flux",
];

impl Simulation {
    pub fn build_case_setup(case_path: &Path) -> SolverResult<Simulation> {
        crate::io::create_case_directories(case_path)?;
        let case_setup_path = case_path
            .join(crate::io::PRE_PROCESSING_PATH)
            .join(crate::io::CASE_SETUP_FILE);
        let parameters = if case_setup_path.exists() {
            log::info!(
                "Reading the case setup file: {}.",
                case_setup_path.display().to_string().yellow().bold()
            );
            RunParameters::from_setup(crate::io::read_case_setup(case_path)?)?
        } else {
            log::warn!(
                "No case setup file at {}, using the default parameters.",
                case_setup_path.display().to_string().yellow().bold()
            );
            RunParameters::default()
        };
        if parameters.time_target.is_none() && parameters.iter_target.is_none() {
            log::warn!("Neither `time_target` nor `iter_target` is set: the run only stops when interrupted.");
        }
        Ok(Simulation::new(parameters))
    }
}

impl RunParameters {
    pub fn from_setup(parameters: HashMap<String, String>) -> SolverResult<Self> {
        for key in parameters.keys() {
            if !SETUP_KEYS.contains(&key.as_str()) {
                log::warn!("Unknown case setup key `{key}` is ignored.");
            }
        }
        let defaults = RunParameters::default();
        let case_name = parameters
            .get("case_name")
            .cloned()
            .unwrap_or(defaults.case_name);
        let cfl = parse_parameter::<Float>(&parameters, "cfl")?.unwrap_or(defaults.cfl);
        if !(cfl > 0.0) {
            return Err(SolverError::config("cfl", "must be positive"));
        }
        let time_target = parse_parameter(&parameters, "time_target")?;
        let iter_target = parse_parameter(&parameters, "iter_target")?;
        let write_field_frequency_time =
            parse_parameter::<Float>(&parameters, "write_field_frequency_time")?;
        if write_field_frequency_time.is_some_and(|f| !(f > 0.0)) {
            return Err(SolverError::config(
                "write_field_frequency_time",
                "must be positive",
            ));
        }
        let write_field_frequency_iter =
            parse_parameter::<usize>(&parameters, "write_field_frequency_iter")?;
        if write_field_frequency_iter == Some(0) {
            return Err(SolverError::config(
                "write_field_frequency_iter",
                "must be positive",
            ));
        }
        let print_frequency_iter = parse_parameter::<usize>(&parameters, "print_frequency_iter")?
            .unwrap_or(defaults.print_frequency_iter)
            .max(1);
        let flux = match parameters.get("flux") {
            Some(value) => parse_flux(value)?,
            None => defaults.flux,
        };
        Ok(Self {
            case_name,
            cfl,
            time_target,
            iter_target,
            write_field_frequency_time,
            write_field_frequency_iter,
            print_frequency_iter,
            flux,
        })
    }
}

fn parse_flux(value: &str) -> SolverResult<FluxScheme> {
    let tokens = value.split_whitespace().collect::<Vec<&str>>();
    match tokens[..] {
        ["roe"] => Ok(FluxScheme::default()),
        ["roe", entropy_fix] => Ok(FluxScheme::Roe {
            entropy_fix: parse_token("flux", entropy_fix)?,
        }),
        ["rusanov"] => Ok(FluxScheme::Rusanov),
        _ => Err(SolverError::config(
            "flux",
            format!("expected `roe [entropy_fix]` or `rusanov`, got `{value}`"),
        )),
    }
}

impl Simulation {
    pub fn print_residuals(&self, dt: Float, residuals: &Residuals) {
        if self.printed_lines % 10 == 0 {
            let duration = self.simulation_time.elapsed().as_secs_f64();
            println!("\n{} {:.2} s.", "Elapsed time:".cyan().bold(), duration);
            println!(
                "\n{:>8} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14}\n",
                "iter".cyan().bold(),
                "time".cyan().bold(),
                "dt".cyan().bold(),
                "density".cyan().bold(),
                "momentum_x".cyan().bold(),
                "momentum_y".cyan().bold(),
                "energy".cyan().bold()
            );
        }
        println!(
            "{:>8} {:>14.6e} {:>14.6e} {:>14.6e} {:>14.6e} {:>14.6e} {:>14.6e}",
            self.iteration,
            self.time,
            dt,
            residuals.density,
            residuals.momentum[0],
            residuals.momentum[1],
            residuals.energy
        );
    }

    pub fn write_residuals(
        &self,
        case_path: &Path,
        dt: Float,
        residuals: &Residuals,
    ) -> io::Result<()> {
        let path = case_path
            .join(crate::io::POST_PROCESSING_PATH)
            .join(crate::io::RESIDUALS_FILE);
        let new_file = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if new_file {
            writeln!(
                file,
                "{:>8} {:>16} {:>16} {:>16} {:>16} {:>16} {:>16}",
                "iter", "time", "dt", "density", "momentum_x", "momentum_y", "energy"
            )?;
        }
        writeln!(
            file,
            "{:>8} {:>16.8e} {:>16.8e} {:>16.8e} {:>16.8e} {:>16.8e} {:>16.8e}",
            self.iteration,
            self.time,
            dt,
            residuals.density,
            residuals.momentum[0],
            residuals.momentum[1],
            residuals.energy
        )?;
        Ok(())
    }

    pub fn write_post_processing<F>(
        &self,
        case_path: &Path,
        domain: &Domain,
        function: F,
        file_name: &str,
    ) -> io::Result<()>
    where
        F: Fn(&Domain) -> Vec<crate::post::PostResult>,
    {
        let post_results = function(domain);
        let path = case_path
            .join(crate::io::POST_PROCESSING_PATH)
            .join(file_name);
        let new_file = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if new_file {
            write!(file, "{:>8} {:>16}", "iter", "time")?;
            for post_result in &post_results {
                write!(file, " {:>16}", post_result.name)?;
            }
            writeln!(file)?;
        }
        write!(file, "{:>8} {:>16.8e}", self.iteration, self.time)?;
        for post_result in &post_results {
            log::debug!("{post_result}");
            write!(file, " {:>16.8e}", post_result.value)?;
        }
        writeln!(file)?;
        Ok(())
    }
}

impl CaseConditions {
    pub fn build_case_conditions(case_path: &Path) -> SolverResult<CaseConditions> {
        let path = case_path
            .join(crate::io::PRE_PROCESSING_PATH)
            .join(crate::io::CASE_CONDITIONS_FILE);
        log::info!(
            "Reading the case conditions file: {}.",
            path.display().to_string().yellow().bold()
        );
        let parameters = crate::io::read_case_conditions(case_path)?;
        CaseConditions::from_conditions(parameters)
    }

    pub fn from_conditions(parameters: HashMap<String, String>) -> SolverResult<Self> {
        let mesh_file = parameters
            .get("mesh_file")
            .map(PathBuf::from)
            .ok_or_else(|| SolverError::config("mesh_file", "missing"))?;
        let freestream = match parameters.get("freestream") {
            Some(value) => parse_freestream(value)?,
            None => None,
        };
        let exit_pressure = parse_parameter::<Float>(&parameters, "exit_pressure")?;
        if exit_pressure.is_some_and(|p| !(p > 0.0)) {
            return Err(SolverError::config("exit_pressure", "must be positive"));
        }
        let initial_field = match parameters.get("initial_field") {
            Some(value) => parse_initial_field(value)?,
            None => InitialField::Freestream,
        };

        let mut boundary_conditions: Vec<BlockBoundaryConditions> = Vec::new();
        let mut joints: Vec<(usize, JointSpec)> = Vec::new();
        for (key, value) in &parameters {
            if let Some((block, edge)) = boundary_key(key)? {
                if boundary_conditions.len() <= block {
                    boundary_conditions.resize_with(block + 1, Default::default);
                }
                boundary_conditions[block][edge] = parse_patches(key, value)?;
            } else if let Some(index) = key.strip_prefix("joint_") {
                let index = parse_token::<usize>(key, index)?;
                joints.push((index, parse_joint(key, value)?));
            } else if ![
                "mesh_file",
                "freestream",
                "exit_pressure",
                "initial_field",
            ]
            .contains(&key.as_str())
            {
                log::warn!("Unknown case conditions key `{key}` is ignored.");
            }
        }
        joints.sort_by_key(|(index, _)| *index);

        Ok(Self {
            mesh_file,
            conditions: FlowConditions {
                freestream,
                exit_pressure,
            },
            initial_field,
            boundary_conditions,
            joints: joints.into_iter().map(|(_, joint)| joint).collect(),
        })
    }
}

fn parse_values<const N: usize>(key: &str, tokens: &[&str]) -> SolverResult<[Float; N]> {
    if tokens.len() != N {
        return Err(SolverError::config(
            key,
            format!("expected {N} values, got {}", tokens.len()),
        ));
    }
    let mut values = [0.0; N];
    for (value, token) in values.iter_mut().zip(tokens) {
        *value = parse_token(key, token)?;
    }
    Ok(values)
}

fn check_state(key: &str, p: State) -> SolverResult<State> {
    if p[0] > 0.0 && p[3] > 0.0 && p.iter().all(|x| x.is_finite()) {
        Ok(p)
    } else {
        Err(SolverError::config(
            key,
            "density and pressure must be positive",
        ))
    }
}

fn parse_freestream(value: &str) -> SolverResult<Option<State>> {
    let key = "freestream";
    let tokens = value.split_whitespace().collect::<Vec<&str>>();
    let state = match tokens.split_first() {
        Some((&"none", [])) => return Ok(None),
        Some((&"primitive", rest)) => parse_values::<4>(key, rest)?,
        Some((&"mach", rest)) => {
            let [mach, temperature, pressure, alpha] = parse_values::<4>(key, rest)?;
            gas::from_static(mach, temperature, pressure, alpha)
        }
        Some((&"total", rest)) => {
            let [mach, total_temperature, total_pressure, alpha] = parse_values::<4>(key, rest)?;
            gas::from_total(mach, total_temperature, total_pressure, alpha)
        }
        _ => {
            return Err(SolverError::config(
                key,
                format!("expected `primitive ρ u v p`, `mach M T p α` or `total M Tt pt α`, got `{value}`"),
            ))
        }
    };
    check_state(key, state).map(Some)
}

fn parse_initial_field(value: &str) -> SolverResult<InitialField> {
    let key = "initial_field";
    let tokens = value.split_whitespace().collect::<Vec<&str>>();
    match tokens.split_first() {
        Some((&"freestream", [])) => Ok(InitialField::Freestream),
        Some((&"primitive", rest)) => Ok(InitialField::Uniform(check_state(
            key,
            parse_values::<4>(key, rest)?,
        )?)),
        Some((&"shock_tube", rest)) => {
            let values = parse_values::<8>(key, rest)?;
            Ok(InitialField::ShockTube {
                left: check_state(key, [values[0], values[1], values[2], values[3]])?,
                right: check_state(key, [values[4], values[5], values[6], values[7]])?,
            })
        }
        _ => Err(SolverError::config(
            key,
            format!("expected `freestream`, `primitive ρ u v p` or `shock_tube` with 8 values, got `{value}`"),
        )),
    }
}

fn boundary_key(key: &str) -> SolverResult<Option<(usize, usize)>> {
    let Some(rest) = key.strip_prefix("block_") else {
        return Ok(None);
    };
    let Some((block, edge)) = rest.split_once("_edge_") else {
        return Err(SolverError::config(key, "expected `block_<b>_edge_<e>`"));
    };
    let block = parse_token::<usize>(key, block)?;
    let edge = parse_token::<usize>(key, edge)?;
    if edge >= EDGES {
        return Err(SolverError::config(key, format!("edge {edge} does not exist")));
    }
    Ok(Some((block, edge)))
}

fn parse_rule(key: &str, name: &str) -> SolverResult<BoundaryCondition> {
    BoundaryCondition::from_name(name)
        .ok_or_else(|| SolverError::config(key, format!("unknown boundary condition `{name}`")))
}

fn parse_patches(key: &str, value: &str) -> SolverResult<Vec<BoundaryPatch>> {
    value
        .split(',')
        .map(|patch| {
            let tokens = patch.split_whitespace().collect::<Vec<&str>>();
            match tokens[..] {
                [rule] => Ok(BoundaryPatch::full(parse_rule(key, rule)?)),
                [rule, start, end] => Ok(BoundaryPatch::new(
                    parse_rule(key, rule)?,
                    parse_optional_token(key, start)?,
                    parse_optional_token(key, end)?,
                )),
                _ => Err(SolverError::config(
                    key,
                    format!("expected `rule` or `rule start end`, got `{}`", patch.trim()),
                )),
            }
        })
        .collect()
}

fn parse_joint(key: &str, value: &str) -> SolverResult<JointSpec> {
    let tokens = value.split_whitespace().collect::<Vec<&str>>();
    let [block_a, edge_a, start_a, end_a, block_b, edge_b, start_b, end_b] = tokens[..] else {
        return Err(SolverError::config(
            key,
            format!("expected 8 values `block_a edge_a start_a end_a block_b edge_b start_b end_b`, got `{value}`"),
        ));
    };
    let range = |block: &str, edge: &str, start: &str, end: &str| -> SolverResult<EdgeRange> {
        Ok(EdgeRange {
            block: parse_token(key, block)?,
            edge: parse_token(key, edge)?,
            start: parse_optional_token(key, start)?,
            end: parse_optional_token(key, end)?,
        })
    };
    Ok(JointSpec {
        a: range(block_a, edge_a, start_a, end_a)?,
        b: range(block_b, edge_b, start_b, end_b)?,
    })
}

impl Domain {
    fn field_path(case_path: &Path, block_name: &str) -> PathBuf {
        case_path
            .join(crate::io::DATA_PATH)
            .join(format!("{block_name}.{}", crate::io::FIELD_EXTENSION))
    }

    fn field_paths(&self, case_path: &Path) -> Vec<PathBuf> {
        self.blocks
            .iter()
            .map(|block| Domain::field_path(case_path, &block.name))
            .collect()
    }

    pub fn write_field(&self, case_path: &Path, iteration: usize, time: Float) -> SolverResult<()> {
        crate::io::create_case_directories(case_path)?;
        let fields = self
            .field_paths(case_path)
            .into_iter()
            .zip(&self.blocks)
            .map(|(path, block)| (path, block.field()))
            .collect::<Vec<_>>();
        crate::io::write_snapshot(&case_path.join(crate::io::DATA_PATH), &fields, iteration, time)?;
        log::info!(
            "Field written at iteration {}, time {:e} s.",
            iteration.to_string().yellow().bold(),
            time
        );
        Ok(())
    }

    pub fn recover_snapshot(&self, case_path: &Path) -> SolverResult<()> {
        crate::io::recover_snapshot(
            &case_path.join(crate::io::DATA_PATH),
            &self.field_paths(case_path),
        )
    }

    pub fn read_field(&mut self, case_path: &Path) -> SolverResult<(usize, Float)> {
        self.recover_snapshot(case_path)?;
        for block in self.blocks.iter_mut() {
            let path = Domain::field_path(case_path, &block.name);
            let field = crate::io::read_field_file(&path, block.cells.len())?;
            for (index, (cell, p)) in block.cells.iter_mut().zip(field).enumerate() {
                if !(p[0] > 0.0 && p[3] > 0.0 && p.iter().all(|x| x.is_finite())) {
                    return Err(SolverError::Snapshot {
                        path,
                        message: format!("cell {index} holds the non-physical state {p:?}"),
                    });
                }
                cell.set_primitive(p);
            }
        }
        let state_path = case_path
            .join(crate::io::DATA_PATH)
            .join(crate::io::STATE_FILE);
        let (iteration, time) = crate::io::read_state_file(&state_path)?;
        log::info!(
            "Field restored at iteration {}, time {:e} s.",
            iteration.to_string().yellow().bold(),
            time
        );
        Ok((iteration, time))
    }
}
