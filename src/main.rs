use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::time::Instant;

use portrait_pipeline::cli::{Args, Commands};
use portrait_pipeline::hasher::hash_name;
use portrait_pipeline::json_output::JsonMessage;
use portrait_pipeline::lookup::{looks_like_digest, lookup};
use portrait_pipeline::mapping::MappingStore;
use portrait_pipeline::pipeline::{Pipeline, PipelineConfig};
use portrait_pipeline::report::{
    print_mapping_table, print_pipeline_report, OutputMode, Reporter, StageSummary,
};
use portrait_pipeline::stages::{ingest, normalize_to_single_format, process, restore};
use portrait_pipeline::utils::{error_println, format_duration};

fn main() {
    let args = Args::parse();

    if let Err(message) = args.validate() {
        error_println(&message);
        std::process::exit(2);
    }

    match run(&args) {
        Ok(failures) if failures > 0 => std::process::exit(1),
        Ok(_) => {}
        Err(e) => {
            error_println(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}

/// Dispatch the chosen command, returning the number of per-file failures
fn run(args: &Args) -> Result<usize> {
    let start_time = Instant::now();
    let mode = if args.json_progress {
        OutputMode::Json
    } else {
        OutputMode::Console
    };
    let reporter = Reporter::new(mode, args.verbose);

    if reporter.is_console() {
        println!("{}", style("Portrait Pipeline").bold().blue());
        println!("{}", style("Anonymised batch portrait processing").dim());
        println!();
    }

    let config = args.load_config().context("Invalid configuration")?;
    if reporter.is_console() && reporter.is_verbose() {
        print_configuration(&config);
    }
    if config.dry_run && reporter.is_console() {
        println!("{}", style("Dry run: no files will be written").bold().yellow());
        println!();
    }

    let options = config.options();
    let failures = match &args.command {
        Commands::Ingest => {
            let summary = ingest(
                &config.source_dir,
                &config.intermediate_dir,
                &config.mapping_file,
                options,
                &reporter,
            )
            .context("Ingest failed")?;
            summary.failures().len()
        }
        Commands::Process => {
            let processor = config.build_processor()?;
            let summary = process(
                &config.intermediate_dir,
                &config.processed_dir,
                &processor,
                options,
                &reporter,
            )
            .context("Processing failed")?;
            summary.failures().len()
        }
        Commands::Restore => {
            let summary = restore(
                &config.processed_dir,
                &config.final_dir,
                &config.mapping_path(),
                options,
                &reporter,
            )
            .context("Restore failed")?;
            summary.failures().len()
        }
        Commands::Normalize => {
            let summary = normalize_to_single_format(
                &config.final_dir,
                config.target_format,
                config.jpeg_quality,
                options,
                &reporter,
            )
            .context("Normalization failed")?;
            summary.failures().len()
        }
        Commands::Run => {
            let processor = config.build_processor()?;
            let pipeline = Pipeline::new(config, processor, &reporter);
            let report = pipeline.run().context("Pipeline run failed")?;
            if args.report {
                match reporter.mode() {
                    OutputMode::Console => print_pipeline_report(&report),
                    OutputMode::Json => JsonMessage::pipeline_report(&report),
                    OutputMode::Silent => {}
                }
            }
            if reporter.is_console() {
                println!(
                    "{} {}",
                    style("Portraits in:").bold(),
                    pipeline.config().final_dir.display()
                );
            }
            report.failure_count()
        }
        Commands::Lookup { name, all } => {
            handle_lookup(&config, name.as_deref(), *all)?;
            0
        }
    };

    if reporter.is_console() {
        println!(
            "{} {}",
            style("Total time:").bold(),
            style(format_duration(start_time.elapsed())).dim()
        );
        if failures > 0 {
            println!(
                "{}",
                style(format!("⚠ {} files failed", failures)).bold().red()
            );
        }
    }

    Ok(failures)
}

fn handle_lookup(config: &PipelineConfig, query: Option<&str>, all: bool) -> Result<()> {
    let mapping_path = config.mapping_path();
    let mapping = MappingStore::load(&mapping_path)
        .with_context(|| format!("Failed to load mapping from {}", mapping_path.display()))?;

    if all {
        println!(
            "{} {} ({} entries)",
            style("Mapping:").bold(),
            mapping_path.display(),
            mapping.len()
        );
        print_mapping_table(mapping.records());
        return Ok(());
    }

    let Some(query) = query else {
        return Ok(());
    };

    match lookup(&mapping, query) {
        Some(record) => {
            println!("{}", style("✓ Found").bold().green());
            println!("  Hashed name:   {}", style(&record.hashed_name).dim());
            println!("  Original name: {}", style(&record.original_name).bold());
        }
        None => {
            println!(
                "{} {}",
                style("✗ Not found:").bold().red(),
                style(query.trim()).bold()
            );
            if !looks_like_digest(query.trim()) {
                println!(
                    "  '{}' would be ingested as {}",
                    query.trim(),
                    style(hash_name(query.trim())).dim()
                );
            }
        }
    }

    Ok(())
}

fn print_configuration(config: &PipelineConfig) {
    println!("{}", style("Configuration:").bold());
    println!("  Source: {}", config.source_dir.display());
    println!("  Intermediate: {}", config.intermediate_dir.display());
    println!("  Processed: {}", config.processed_dir.display());
    println!("  Final: {}", config.final_dir.display());
    println!("  Mapping: {}", config.mapping_path().display());
    println!(
        "  Target size: {}x{}",
        config.target_width, config.target_height
    );
    println!(
        "  Output format: {} (JPEG quality {})",
        config.target_format, config.jpeg_quality
    );
    println!(
        "  Face script: {} {} (min confidence {})",
        config.detection.python,
        config.detection.face_script.display(),
        config.detection.min_confidence
    );
    println!("  Background remover: {}", config.detection.remover);
    println!("  Timeout: {}s", config.detection.timeout.as_secs());
    if let Some(dir) = &config.debug_dir {
        println!("  Debug overlays: {}", dir.display());
    }
    println!("  Force: {}", config.force);
    println!();
}
