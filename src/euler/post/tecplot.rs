use crate::error::SolverResult;
use crate::euler::domain::Domain;
use crate::euler::gas;
use crate::global_variables::*;
use colored::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FIELD_FILE_SUFFIX: &'static str = "field_bd.dat";

const VALUES_PER_LINE: usize = 8;

fn write_values<W, I>(file: &mut W, values: I) -> io::Result<()>
where
    W: Write,
    I: Iterator<Item = Float>,
{
    for (k, value) in values.enumerate() {
        if k > 0 && k % VALUES_PER_LINE == 0 {
            writeln!(file)?;
        }
        write!(file, "{value:>.8e} ")?;
    }
    writeln!(file)
}

pub fn write_block_data<P>(domain: &Domain, title: &str, path: P) -> io::Result<()>
where
    P: AsRef<Path>,
{
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "TITLE = \"{title}\"")?;
    writeln!(
        file,
        "VARIABLES = \"X\", \"Y\", \"rho\", \"u\", \"v\", \"p\", \"Mach\", \"T\""
    )?;
    for block in &domain.blocks {
        writeln!(
            file,
            "ZONE T=\"{}\", I={}, J={}, DATAPACKING=BLOCK, VARLOCATION=([3,4,5,6,7,8]=CELLCENTERED)",
            block.name,
            block.ni + 1,
            block.nj + 1
        )?;
        write_values(&mut file, block.nodes.iter().map(|node| node.x))?;
        write_values(&mut file, block.nodes.iter().map(|node| node.y))?;
        for k in 0..4 {
            write_values(&mut file, block.cells.iter().map(|cell| cell.primitive[k]))?;
        }
        write_values(
            &mut file,
            block.cells.iter().map(|cell| gas::mach(&cell.primitive)),
        )?;
        write_values(
            &mut file,
            block.cells.iter().map(|cell| gas::temperature(&cell.primitive)),
        )?;
    }
    file.flush()
}

pub fn run_tecplot_post_processing(case_path: &Path) -> SolverResult<PathBuf> {
    let case_setup = crate::io::read_case_setup(case_path).unwrap_or_default();
    let case_name = case_setup
        .get("case_name")
        .cloned()
        .unwrap_or_else(|| CASE_NAME.to_string());
    let mut domain = crate::euler::build_domain(case_path)?;
    let (iteration, time) = domain.read_field(case_path)?;
    crate::io::create_case_directories(case_path)?;
    let file_name = format!(
        "{}_{FIELD_FILE_SUFFIX}",
        case_name.replace(" ", "_").to_lowercase()
    );
    let path = case_path
        .join(crate::io::POST_PROCESSING_PATH)
        .join(&file_name);
    log::info!(
        "Writing {} for iteration {} (time {:e} s).",
        file_name.yellow().bold(),
        iteration.to_string().yellow().bold(),
        time
    );
    write_block_data(&domain, &case_name, &path)?;
    Ok(path)
}
