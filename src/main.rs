use clap::{arg, command, value_parser, ArgAction, Command};
use euler_fv::euler;
use euler_fv::SolverResult;
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use std::process;

fn main() {
    let matches = command!()
        .arg(
            arg!(
                -n --number_of_threads <NUMBER_OF_THREADS> "Sets the number of threads: 1, 2, 4, 8, 16 or 32"
            )
            .required(false)
            .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(
                -c --case <CASE> "Sets the case directory"
            )
            .required(false)
            .default_value(".")
            .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(
                -v --verbose "Raises the log level: -v for debug, -vv for trace"
            )
            .action(ArgAction::Count),
        )
        .subcommand(
            Command::new("init").about("Writes the initial field and a fresh run state"),
        )
        .subcommand(
            Command::new("run").about("Runs the simulation from the last field written"),
        )
        .subcommand(
            Command::new("post")
                .about("Runs the post-processing: writes the Tecplot block data file"),
        )
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Some(&num_threads) = matches.get_one::<usize>("number_of_threads") {
        if let Err(e) = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
        {
            log::error!("Error while building the thread pool: {e}.");
            process::exit(1);
        }
    }

    let case_path = matches
        .get_one::<PathBuf>("case")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let result: SolverResult<()> = match matches.subcommand() {
        Some(("init", _)) => euler::init(&case_path),
        Some(("run", _)) => euler::run(&case_path),
        Some(("post", _)) => {
            euler::post::tecplot::run_tecplot_post_processing(&case_path).map(|_| ())
        }
        _ => {
            log::error!("Error: no subcommand given. Please, use init, run or post.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        log::error!("Error: {e}.");
        process::exit(1);
    }
}
