#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![cfg(not(target_os = "none"))]

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use link_dryrun::Scenario;
use log::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let matches = Command::new("link-dryrun")
        .version("0.1")
        .about("Run GMSL link bring-up against a simulated bus and print the register trace")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("Scenario file (TOML)")
                .required(true),
        )
        .arg(
            Arg::new("runs")
                .short('n')
                .long("runs")
                .value_name("N")
                .help("Override the number of consecutive bring-up runs")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .help("Only print the result of each run")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let path = PathBuf::from(
        matches
            .get_one::<String>("scenario")
            .ok_or("missing scenario")?,
    );
    let mut scenario = Scenario::load(&path)?;
    if let Some(runs) = matches.get_one::<u8>("runs") {
        scenario.runs = *runs;
    }
    let summary = matches.get_flag("summary");

    let report = scenario.run()?;
    info!("{}: {} run(s)", report.chip, report.runs.len());

    for (n, run) in report.runs.iter().enumerate() {
        println!("== run {n}: {:?}", run.result);
        if !summary {
            for t in &run.trace {
                println!("   {t}");
            }
        }
        println!(
            "   state {:?}, {} transaction(s), {} write(s)",
            run.state,
            run.trace.len(),
            run.writes()
        );
    }

    if let Some((result, trace)) = &report.format {
        println!("== set_format: {result:?}");
        if !summary {
            for t in trace {
                println!("   {t}");
            }
        }
    }

    if !report.succeeded() {
        error!("Dry run finished with errors");
        return Err("bring-up failed".into());
    }
    Ok(())
}
