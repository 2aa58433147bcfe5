use crate::error::{SolverError, SolverResult};
use crate::global_variables::*;
use colored::*;
use glam::DVec2;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DATA_PATH: &'static str = "data";

pub const PRE_PROCESSING_PATH: &'static str = "pre_processing";

pub const POST_PROCESSING_PATH: &'static str = "post_processing";

pub const CASE_SETUP_FILE: &'static str = "case_setup.jou";

pub const CASE_CONDITIONS_FILE: &'static str = "case_conditions.jou";

pub const STATE_FILE: &'static str = "solver.state";

pub const COMMIT_FILE: &'static str = "solver.commit";

pub const FIELD_EXTENSION: &'static str = "field";

pub const RESIDUALS_FILE: &'static str = "residuals.dat";

pub fn create_case_directories(case_path: &Path) -> io::Result<()> {
    for path_str in [DATA_PATH, POST_PROCESSING_PATH] {
        let path = case_path.join(path_str);
        if !path.exists() {
            log::info!("Creating the {} path.", path_str.yellow().bold());
            fs::create_dir_all(&path)?;
        } else {
            log::debug!("The {} path already exists.", path_str.yellow().bold());
        }
    }
    Ok(())
}

pub fn read_case_setup(case_path: &Path) -> io::Result<HashMap<String, String>> {
    read_parameters(&case_path.join(PRE_PROCESSING_PATH).join(CASE_SETUP_FILE))
}

pub fn read_case_conditions(case_path: &Path) -> io::Result<HashMap<String, String>> {
    read_parameters(&case_path.join(PRE_PROCESSING_PATH).join(CASE_CONDITIONS_FILE))
}

fn read_parameters(path: &Path) -> io::Result<HashMap<String, String>> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(extract_parameters(&contents))
}

pub fn extract_parameters(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.starts_with("#"))
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut parts = line.splitn(2, "=");
            let key = parts.next().unwrap_or("").trim().to_string();
            let value = parts.next().unwrap_or("").trim().to_string();
            (key, value)
        })
        .collect::<HashMap<String, String>>()
}

pub fn parse_token<T: FromStr>(key: &str, token: &str) -> SolverResult<T> {
    token
        .parse::<T>()
        .map_err(|_| SolverError::config(key, format!("cannot parse `{token}`")))
}

pub fn parse_optional_token<T: FromStr>(key: &str, token: &str) -> SolverResult<Option<T>> {
    if token.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse_token(key, token).map(Some)
    }
}

pub fn parse_parameter<T: FromStr>(
    parameters: &HashMap<String, String>,
    key: &str,
) -> SolverResult<Option<T>> {
    match parameters.get(key) {
        Some(value) => parse_optional_token(key, value),
        None => Ok(None),
    }
}

#[derive(Clone, Debug)]
pub struct Zone {
    pub name: String,
    pub ni: usize,
    pub nj: usize,
    pub nodes: Vec<DVec2>,
}

impl Zone {
    pub fn new(name: String, ni: usize, nj: usize, nodes: Vec<DVec2>) -> SolverResult<Self> {
        if ni < 2 || nj < 2 {
            return Err(SolverError::MeshFormat {
                file: name,
                line: 0,
                message: format!("zone needs at least 2x2 nodes, got I={ni}, J={nj}"),
            });
        }
        if nodes.len() != ni * nj {
            return Err(SolverError::MeshFormat {
                file: name,
                line: 0,
                message: format!("expected {} nodes, got {}", ni * nj, nodes.len()),
            });
        }
        Ok(Self {
            name,
            ni,
            nj,
            nodes,
        })
    }
}

fn zone_header(line: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    let mut rest = line.trim_start_matches("ZONE");
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq]
            .trim_end()
            .rsplit(|c: char| c == ',' || c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();
        let after = rest[eq + 1..].trim_start();
        let (value, tail) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            },
            None => {
                let end = after
                    .find(|c: char| c == ',' || c.is_whitespace())
                    .unwrap_or(after.len());
                (&after[..end], &after[end..])
            }
        };
        entries.insert(key, value.trim().to_string());
        rest = tail;
    }
    entries
}

pub fn import_mesh(path: &Path) -> SolverResult<Vec<Zone>> {
    let file_name = path.display().to_string();
    log::info!("Importing the mesh from {}.", file_name.yellow().bold());
    let reader = BufReader::new(File::open(path)?);
    let format_error = |line: usize, message: String| SolverError::MeshFormat {
        file: file_name.clone(),
        line,
        message,
    };

    struct Pending {
        name: String,
        ni: usize,
        nj: usize,
        line: usize,
        nodes: Vec<DVec2>,
    }

    let mut zones = Vec::new();
    let mut pending: Option<Pending> = None;
    let finish = |pending: Option<Pending>, zones: &mut Vec<Zone>| -> SolverResult<()> {
        if let Some(zone) = pending {
            if zone.nodes.len() != zone.ni * zone.nj {
                return Err(format_error(
                    zone.line,
                    format!(
                        "zone {} declares {} nodes but {} were read",
                        zone.name,
                        zone.ni * zone.nj,
                        zone.nodes.len()
                    ),
                ));
            }
            zones.push(Zone::new(zone.name, zone.ni, zone.nj, zone.nodes)?);
        }
        Ok(())
    };

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let number = number + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("ZONE") {
            finish(pending.take(), &mut zones)?;
            let header = zone_header(trimmed);
            let size = |key: &str| header.get(key).and_then(|value| value.parse::<usize>().ok());
            let (Some(name), Some(ni), Some(nj)) = (header.get("T"), size("I"), size("J")) else {
                return Err(format_error(
                    number,
                    format!("expected `ZONE T=\"<id>\", I=<nodes>, J=<nodes>`, got `{trimmed}`"),
                ));
            };
            pending = Some(Pending {
                name: name.clone(),
                ni,
                nj,
                line: number,
                nodes: Vec::with_capacity(ni * nj),
            });
            continue;
        }
        let Some(zone) = pending.as_mut() else {
            // header lines before the first zone
            continue;
        };
        let mut values = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<Float>());
        match (values.next(), values.next()) {
            (Some(Ok(x)), Some(Ok(y))) => {
                if zone.nodes.len() == zone.ni * zone.nj {
                    return Err(format_error(
                        number,
                        format!("zone {} has more than {} nodes", zone.name, zone.ni * zone.nj),
                    ));
                }
                zone.nodes.push(DVec2::new(x, y));
            }
            _ => {
                return Err(format_error(
                    number,
                    format!("cannot read node coordinates from `{trimmed}`"),
                ))
            }
        }
    }
    finish(pending.take(), &mut zones)?;
    if zones.is_empty() {
        return Err(format_error(0, "no ZONE found".to_string()));
    }
    Ok(zones)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

pub fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = tmp_path(path);
    write_synced(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn field_bytes(field: &[[Float; 4]]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(field.len() * 4 * 8);
    for value in field.iter().flatten() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn write_field_file(path: &Path, field: &[[Float; 4]]) -> io::Result<()> {
    write_atomically(path, &field_bytes(field))
}

/// Replaces every field file of `fields` and the run state as one unit.
///
/// The fields go to temporary files first. The commit file then records the
/// run state they belong to, and only after that are the fields renamed into
/// place. A crash before the commit leaves the previous snapshot untouched, a
/// crash after it is completed by `recover_snapshot`.
pub fn write_snapshot(
    data_path: &Path,
    fields: &[(PathBuf, Vec<[Float; 4]>)],
    iteration: usize,
    time: Float,
) -> io::Result<()> {
    for (path, field) in fields {
        write_synced(&tmp_path(path), &field_bytes(field))?;
    }
    let commit_path = data_path.join(COMMIT_FILE);
    write_state_file(&commit_path, iteration, time)?;
    for (path, _) in fields {
        fs::rename(tmp_path(path), path)?;
    }
    write_state_file(&data_path.join(STATE_FILE), iteration, time)?;
    fs::remove_file(commit_path)
}

pub fn recover_snapshot(data_path: &Path, fields: &[PathBuf]) -> SolverResult<()> {
    let commit_path = data_path.join(COMMIT_FILE);
    if commit_path.exists() {
        let (iteration, time) = read_state_file(&commit_path)?;
        log::warn!(
            "Completing the snapshot of iteration {} left by an interrupted run.",
            iteration.to_string().yellow().bold()
        );
        for path in fields {
            let tmp = tmp_path(path);
            if tmp.exists() {
                fs::rename(tmp, path)?;
            }
        }
        write_state_file(&data_path.join(STATE_FILE), iteration, time)?;
        fs::remove_file(commit_path)?;
    } else {
        for path in fields {
            let tmp = tmp_path(path);
            if tmp.exists() {
                log::warn!(
                    "Discarding the unfinished field {}.",
                    tmp.display().to_string().yellow().bold()
                );
                fs::remove_file(tmp)?;
            }
        }
    }
    Ok(())
}

pub fn read_field_file(path: &Path, cells: usize) -> SolverResult<Vec<[Float; 4]>> {
    let bytes = fs::read(path)?;
    if bytes.len() != cells * 4 * 8 {
        return Err(SolverError::Snapshot {
            path: path.to_path_buf(),
            message: format!(
                "expected {} bytes for {} cells, found {}",
                cells * 32,
                cells,
                bytes.len()
            ),
        });
    }
    let field = bytes
        .chunks_exact(32)
        .map(|cell| {
            let mut state = [0.0; 4];
            for (k, value) in cell.chunks_exact(8).enumerate() {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(value);
                state[k] = Float::from_le_bytes(raw);
            }
            state
        })
        .collect();
    Ok(field)
}

pub fn write_state_file(path: &Path, iteration: usize, time: Float) -> io::Result<()> {
    write_atomically(path, format!("iter time:\n{iteration} {time:e}\n").as_bytes())
}

pub fn read_state_file(path: &Path) -> SolverResult<(usize, Float)> {
    let contents = fs::read_to_string(path)?;
    let snapshot_error = |message: &str| SolverError::Snapshot {
        path: path.to_path_buf(),
        message: message.to_string(),
    };
    let line = contents
        .lines()
        .nth(1)
        .ok_or_else(|| snapshot_error("missing `<iteration> <time>` line"))?;
    let mut parts = line.split_whitespace();
    let iteration = parts
        .next()
        .and_then(|x| x.parse::<usize>().ok())
        .ok_or_else(|| snapshot_error("invalid iteration"))?;
    let time = parts
        .next()
        .and_then(|x| x.parse::<Float>().ok())
        .ok_or_else(|| snapshot_error("invalid time"))?;
    Ok((iteration, time))
}
