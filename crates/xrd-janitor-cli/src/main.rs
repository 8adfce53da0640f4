mod commands;
mod logging;
mod progress;
mod prompt;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use prompt::{prompt_confirm, TerminalDecider};
use tracing::{error, info, warn};

use xrd_janitor_core::config::{default_concurrency, load_configuration};
use xrd_janitor_core::consistency::reconcile::{remove_duplicate_groups, remove_paths};
use xrd_janitor_core::consistency::{NamespaceView, RemovalOutcome};
use xrd_janitor_core::decision::resolve_findings;
use xrd_janitor_core::dedup::{
    collect_lists, emit_entries, find_duplicates, remove_on_server, HostEntrySource,
    LocalEntrySource, RemoteEntrySource, ServerSpec,
};
use xrd_janitor_core::export::{save_candidates, CandidateRow};
use xrd_janitor_core::scanner::prune_empty_dirs;
use xrd_janitor_core::transport::{running_daemons, Host, OwnerGroup, RemoteShell, ShellTransport};
use xrd_janitor_core::{
    AppConfig, Category, ConsistencyEngine, ConsistencyReport, Decider, DrainConfig, Drainer,
    DuplicatePolicy,
};

const ALL_CATEGORIES: [Category; 4] = [
    Category::DarkData,
    Category::Illegal,
    Category::Dangling,
    Category::Duplicate,
];

fn main() -> ExitCode {
    dotenv().ok();

    let args = Cli::parse();
    let stdout_is_data = matches!(args.command, Some(Commands::EmitEntries { .. }));
    let _guard = logging::init_logger(stdout_is_data);

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> anyhow::Result<ExitCode> {
    let config = load_configuration().context("Error loading configuration")?;
    let threads = args.threads.unwrap_or_else(default_concurrency).max(1);

    match args.command {
        Some(Commands::NsClean {
            namespace,
            duplicate_policy,
            save_to,
        }) => run_ns_clean(&config, &namespace, duplicate_policy.into(), save_to, threads),
        Some(Commands::DarkData {
            namespace,
            data,
            extra_namespaces,
            duplicate_policy,
            save_to,
        }) => {
            let mut namespaces = vec![namespace];
            namespaces.extend(extra_namespaces);
            run_dark_data(&config, &namespaces, &data, duplicate_policy.into(), save_to, threads)
        }
        Some(Commands::Drain {
            source_namespace,
            source_data,
            destination,
            destination_namespace,
            destination_data,
            owner,
            source_pattern,
        }) => {
            let owner: OwnerGroup = owner.parse()?;
            let host = Host::parse(&destination, &config.default_user, config.default_port)?;
            let mut drain_config = DrainConfig::new(
                &source_namespace,
                &source_data,
                &destination_namespace,
                &destination_data,
                owner,
            );
            drain_config.threads = threads;
            drain_config.pacing_cap = Duration::from_secs(config.pacing_cap_secs);
            drain_config.progress_every = config.progress_every;
            if let Some(pattern) = source_pattern {
                drain_config = drain_config.with_source_pattern(&pattern)?;
            }
            run_drain(&config, drain_config, host)
        }
        Some(Commands::SeDedup { servers, save_to }) => {
            run_se_dedup(&config, &parse_servers(&config, &servers)?, save_to, threads)
        }
        Some(Commands::Collect {
            servers,
            output_dir,
        }) => {
            let servers = parse_servers(&config, &servers)?;
            let summary = collect_lists(
                &servers,
                &entry_source(&config, threads),
                &output_dir,
                chrono::Local::now(),
            )?;
            for (server, path, count) in &summary.server_files {
                info!("{}: {} entries in {}", server, count.to_string().cyan(), path.display());
            }
            info!(
                "{} distinct entries in {}",
                summary.distinct_entries.to_string().cyan(),
                summary.all_servers_file.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::EmitEntries { namespace }) => {
            emit_entries(&namespace, threads, io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse_servers(config: &AppConfig, specs: &[String]) -> anyhow::Result<Vec<ServerSpec>> {
    let servers = specs
        .iter()
        .map(|spec| ServerSpec::parse(spec, &config.default_user, config.default_port))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(servers)
}

fn entry_source(config: &AppConfig, threads: usize) -> HostEntrySource {
    HostEntrySource {
        local: LocalEntrySource::new(threads),
        remote: RemoteEntrySource::new(
            RemoteShell::from_config(config),
            config.remote_lister.clone(),
        ),
    }
}

fn run_ns_clean(
    config: &AppConfig,
    namespace: &Path,
    policy: DuplicatePolicy,
    save_to: Option<PathBuf>,
    threads: usize,
) -> anyhow::Result<ExitCode> {
    let reporter = CliReporter::new();
    let view = NamespaceView::collect(namespace, threads, config.progress_every, &reporter)?;
    let report = ConsistencyReport::from_views(std::slice::from_ref(&view));
    print_findings(&report, &[Category::Illegal, Category::Dangling, Category::Duplicate]);

    if let Some(path) = save_to {
        save_report(
            &path,
            &report,
            &[Category::Illegal, Category::Dangling, Category::Duplicate],
            policy,
        )?;
        return Ok(ExitCode::SUCCESS);
    }
    if report.is_clean() {
        return Ok(ExitCode::SUCCESS);
    }

    let daemons = running_daemons(&config.daemon_names);
    if !daemons.is_empty() {
        warn!("{} running on this host", daemons.join(", "));
        let question = format!(
            "{} is running. Modify the name space anyway?",
            daemons.join(", ")
        );
        if !prompt_confirm(&question, Some(false))? {
            return Ok(ExitCode::SUCCESS);
        }
    }

    let mut outcome = remove_paths(&report.dangling);
    info!("Removed {} dangling links", outcome.removed + outcome.already_gone);
    outcome.merge(remove_duplicate_groups(&report.duplicates, policy));
    outcome.merge(reconcile_category(
        &mut TerminalDecider,
        &report,
        Category::Illegal,
        policy,
    ));

    let pruned = prune_empty_dirs(&view.root, threads)?;
    info!("Removed {} empty directories", pruned);
    Ok(finish_removal(&outcome))
}

fn run_dark_data(
    config: &AppConfig,
    namespaces: &[PathBuf],
    data: &[PathBuf],
    policy: DuplicatePolicy,
    save_to: Option<PathBuf>,
    threads: usize,
) -> anyhow::Result<ExitCode> {
    let engine = ConsistencyEngine::new(namespaces, data)?
        .with_concurrency(threads)
        .with_progress_every(config.progress_every);
    let reporter = CliReporter::new();
    let report = engine.check(&reporter)?;
    print_findings(&report, &ALL_CATEGORIES);

    if let Some(path) = save_to {
        save_report(&path, &report, &ALL_CATEGORIES, policy)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut decider = TerminalDecider;
    let mut outcome = RemovalOutcome::default();
    for category in ALL_CATEGORIES {
        outcome.merge(reconcile_category(&mut decider, &report, category, policy));
    }

    for data_root in engine.data_roots() {
        let pruned = prune_empty_dirs(data_root, threads)?;
        info!("Removed {} empty directories below {}", pruned, data_root.display());
    }
    Ok(finish_removal(&outcome))
}

fn run_drain(config: &AppConfig, drain_config: DrainConfig, host: Host) -> anyhow::Result<ExitCode> {
    let transport = Arc::new(ShellTransport::new(config, host));
    let drainer = Drainer::new(drain_config, transport)?;
    drainer
        .check_preconditions()
        .context("Refusing to start the migration")?;

    let shutdown = drainer.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing queued units...");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("Error setting Ctrl-C handler")?;

    let reporter = CliReporter::new();
    let report = drainer.run(&reporter)?;
    reporter.finish();

    println!();
    info!(
        "Run {}: {} migrated, {} failed, {} dangling links removed in {}",
        report.run_id,
        report.migrated.to_string().green(),
        report.failed.len().to_string().red(),
        report.dangling_removed,
        format!("{:.2}s", report.duration.as_secs_f64()).green(),
    );
    if report.skipped_links + report.unreadable_links > 0 {
        info!(
            "{} links outside the source data store, {} unreadable",
            report.skipped_links, report.unreadable_links
        );
    }
    for failed in &report.failed {
        println!(
            "{} {} -> {} ({}: {})",
            "FAILED".red().bold(),
            failed.source_link.display(),
            failed.source_file.display(),
            failed.stage,
            failed.reason
        );
    }
    if report.interrupted {
        warn!("Migration was interrupted; run again to move the remaining units");
    }

    let illegal = &report.illegal_entries;
    let tidy = drainer.tidy_source(&mut TerminalDecider, illegal, || {
        for path in illegal {
            println!("{}", path.display());
        }
    })?;
    if !illegal.is_empty() {
        finish_removal(&tidy.illegal);
    }

    Ok(if report.is_success() && tidy.illegal.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_se_dedup(
    config: &AppConfig,
    servers: &[ServerSpec],
    save_to: Option<PathBuf>,
    threads: usize,
) -> anyhow::Result<ExitCode> {
    let reporter = CliReporter::new();
    let plan = find_duplicates(servers, &entry_source(config, threads), &reporter)?;
    reporter.finish();

    for (server, removals) in servers.iter().zip(&plan.removals) {
        info!(
            "{}: {} duplicate entries",
            server.name(),
            removals.len().to_string().red()
        );
    }

    if let Some(path) = save_to {
        let rows = servers.iter().zip(&plan.removals).flat_map(|(server, removals)| {
            removals
                .iter()
                .map(move |entry| CandidateRow::remote("duplicate", server.name(), entry))
        });
        let saved = save_candidates(&path, rows)?;
        info!("Saved {} candidates to {}", saved, path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let shell = RemoteShell::from_config(config);
    let mut failed = 0;
    resolve_findings(
        &mut TerminalDecider,
        "duplicate",
        plan.total_removals(),
        || {
            for (server, removals) in servers.iter().zip(&plan.removals) {
                for entry in removals {
                    println!("{}:{}", server.name(), entry);
                }
            }
        },
        || {
            for (server, removals) in servers.iter().zip(&plan.removals) {
                failed += remove_on_server(
                    &shell,
                    server,
                    removals,
                    config.removal_batch_size,
                    &reporter,
                );
            }
        },
    );
    reporter.finish();

    if failed > 0 {
        error!("{} entries could not be removed", failed);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn reconcile_category(
    decider: &mut dyn Decider,
    report: &ConsistencyReport,
    category: Category,
    policy: DuplicatePolicy,
) -> RemovalOutcome {
    let candidates = report.candidates(category, policy);
    let mut outcome = RemovalOutcome::default();
    resolve_findings(
        decider,
        category.label(),
        report.count(category),
        || {
            for path in &candidates {
                println!("{}", path.display());
            }
        },
        || outcome = remove_paths(&candidates),
    );
    outcome
}

fn print_findings(report: &ConsistencyReport, categories: &[Category]) {
    for category in categories {
        let count = report.count(*category);
        let count = if count == 0 {
            count.to_string().green()
        } else {
            count.to_string().red()
        };
        info!("{}: {}", category.label(), count);
    }
    if report.unresolved + report.scan_errors > 0 {
        warn!(
            "{} links could not be resolved and {} directories could not be read; they were left alone",
            report.unresolved, report.scan_errors
        );
    }
}

fn save_report(
    path: &Path,
    report: &ConsistencyReport,
    categories: &[Category],
    policy: DuplicatePolicy,
) -> anyhow::Result<()> {
    let rows = categories.iter().flat_map(|category| {
        report
            .candidates(*category, policy)
            .into_iter()
            .map(move |candidate| CandidateRow::local(category.label(), &candidate))
    });
    let saved = save_candidates(path, rows)
        .with_context(|| format!("Error writing {}", path.display()))?;
    info!("Saved {} candidates to {}", saved, path.display());
    Ok(())
}

fn finish_removal(outcome: &RemovalOutcome) -> ExitCode {
    info!(
        "{} removed, {} already gone, {} failed",
        outcome.removed.to_string().green(),
        outcome.already_gone,
        outcome.failed.len().to_string().red()
    );
    if outcome.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
