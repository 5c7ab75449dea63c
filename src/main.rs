mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use clipforge::pipeline;
use clipforge_media::{probe, Atom, CutReport, EditListPolicy, RemuxOptions};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive defaults from --verbose.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforge=trace,clipforge_media=trace".to_string()
        } else {
            "clipforge=info,clipforge_media=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::Cut {
            input,
            start_sec,
            end_sec,
            output,
            keep_edit_list,
        } => cut_command(&input, start_sec, end_sec, &output, keep_edit_list),
        Commands::Version => {
            println!("clipforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(path: &Path, json: bool) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let atoms = probe(&mut reader).context("probe failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&atoms)?);
        return Ok(());
    }

    print_tree(&atoms, 0);

    let mut types = Vec::new();
    collect_types(&atoms, &mut types);
    println!();
    println!("All found atoms: {}", types.join(" "));

    let has = |t: &str| types.iter().any(|x| x == t);
    println!("Critical check: ctts={}, edts={}", has("ctts"), has("edts"));
    Ok(())
}

fn print_tree(atoms: &[Atom], depth: usize) {
    for atom in atoms {
        println!("{:indent$}{atom}", "", indent = depth * 2);
        print_tree(&atom.children, depth + 1);
    }
}

fn collect_types(atoms: &[Atom], out: &mut Vec<String>) {
    for atom in atoms {
        out.push(atom.atom_type.to_string());
        collect_types(&atom.children, out);
    }
}

fn cut_command(
    input: &Path,
    start_sec: f64,
    end_sec: f64,
    output: &Path,
    keep_edit_list: bool,
) -> Result<()> {
    let options = RemuxOptions {
        edit_list: if keep_edit_list {
            EditListPolicy::Preserve
        } else {
            EditListPolicy::Drop
        },
    };

    let reports = pipeline::cut_file(input, output, start_sec, end_sec, options)?;

    for report in &reports {
        print_report(report);
    }
    println!("Created {}", output.display());
    Ok(())
}

fn print_report(report: &CutReport) {
    if report.is_empty() {
        println!(
            "  - {} track: nothing to keep in the requested window",
            report.kind
        );
        return;
    }
    if report.keyframe_adjusted {
        println!(
            "  ! {} start moved to keyframe: requested {:.3}s, actual {:.3}s ({:+.1} ms)",
            report.kind, report.requested_start, report.actual_start, report.delta_start_ms
        );
    }
    println!(
        "  - {} track: {} samples [{:.3}s -> {:.3}s] (start {:+.1} ms, end {:+.1} ms)",
        report.kind,
        report.samples_included,
        report.actual_start,
        report.actual_end,
        report.delta_start_ms,
        report.delta_end_ms
    );
}
