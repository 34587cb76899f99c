use std::process::ExitCode;

use serde::Serialize;
use varblock_core::{DescriptorConfig, PointMassBlock, VariableDescriptor};

fn usage() {
    eprintln!("usage: varblock-cli summary <blocks.json> [--json]");
    eprintln!("       varblock-cli diagonal <blocks.json> [scale]");
}

#[derive(Debug, Serialize)]
struct BlockSetSummary {
    blocks: usize,
    active_blocks: usize,
    total_dofs: usize,
    point_masses: usize,
    total_mass: f64,
    mass_nnz: usize,
}

impl BlockSetSummary {
    fn from_descriptor(descriptor: &VariableDescriptor) -> Result<Self, String> {
        let mut point_masses = 0;
        let mut total_mass = 0.0;
        for (id, block) in descriptor.iter() {
            if !block.is_active() {
                continue;
            }
            if let Some(node) = descriptor.get_as::<PointMassBlock>(id) {
                point_masses += 1;
                total_mass += node.mass();
            }
        }
        let mass_nnz = descriptor
            .mass_matrix(1.0)
            .map_err(|err| format!("assembly error: {err}"))?
            .nnz();
        Ok(Self {
            blocks: descriptor.len(),
            active_blocks: descriptor.active_count(),
            total_dofs: descriptor.total_dofs(),
            point_masses,
            total_mass,
            mass_nnz,
        })
    }
}

fn print_summary(summary: &BlockSetSummary) {
    println!("blocks: {}", summary.blocks);
    println!("active_blocks: {}", summary.active_blocks);
    println!("total_dofs: {}", summary.total_dofs);
    println!("point_masses: {}", summary.point_masses);
    println!("total_mass: {}", summary.total_mass);
    println!("mass_nnz: {}", summary.mass_nnz);
}

fn load(path: &str) -> Result<VariableDescriptor, ExitCode> {
    match varblock_io::load_block_set(path, DescriptorConfig::default()) {
        Ok(mut descriptor) => {
            descriptor.update_offsets();
            Ok(descriptor)
        }
        Err(err) => {
            eprintln!("load error: {err}");
            Err(ExitCode::from(1))
        }
    }
}

fn run_summary(path: &str, json: bool) -> ExitCode {
    let descriptor = match load(path) {
        Ok(descriptor) => descriptor,
        Err(code) => return code,
    };
    let summary = match BlockSetSummary::from_descriptor(&descriptor) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("json error: {err}");
                return ExitCode::from(1);
            }
        }
    } else {
        print_summary(&summary);
    }
    ExitCode::SUCCESS
}

fn run_diagonal(path: &str, scale: f64) -> ExitCode {
    let descriptor = match load(path) {
        Ok(descriptor) => descriptor,
        Err(code) => return code,
    };
    let mut diag = vec![0.0; descriptor.total_dofs()];
    if let Err(err) = descriptor.build_diagonal(&mut diag, scale) {
        eprintln!("assembly error: {err}");
        return ExitCode::from(1);
    }
    for (i, value) in diag.iter().enumerate() {
        println!("{i} {value}");
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("summary") if args.len() == 3 => run_summary(&args[2], false),
        Some("summary") if args.len() == 4 && args[3] == "--json" => run_summary(&args[2], true),
        Some("diagonal") if args.len() == 3 => run_diagonal(&args[2], 1.0),
        Some("diagonal") if args.len() == 4 => match args[3].parse::<f64>() {
            Ok(scale) => run_diagonal(&args[2], scale),
            Err(_) => {
                eprintln!("invalid scale: {}", args[3]);
                usage();
                ExitCode::from(2)
            }
        },
        _ => {
            usage();
            ExitCode::from(2)
        }
    }
}
