//! Command implementations
//!
//! Each command writes its output to the given sink so it can be exercised
//! without a terminal.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::Context;
use evlog_archive::{ArchiveBuilder, ArchiveDescriptor, ArchiveSettings, open_archive};
use evlog_core::RawEventRecord;
use evlog_storage::{
    ConflictPolicy, Direction, EventStore, HeaderFilter, ImportSummary, ScanOptions, StoreConfig,
};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{ArchiveCommand, Command, EvlogConfig};

/// Process status of a successful command
pub const EXIT_OK: u8 = 0;

/// Process status of `archive plan` when the request does not validate
pub const EXIT_INVALID_PLAN: u8 = 2;

/// Options of the `import` command
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub policy: ConflictPolicy,
    pub limit: Option<usize>,
    pub above_max: bool,
}

/// Options of the `scan` command
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub options: ScanOptions,
    pub filter: HeaderFilter,
    pub payloads: bool,
}

/// Run one command, returning the process status to exit with
pub fn run(command: Command, config: &EvlogConfig, out: &mut impl Write) -> anyhow::Result<u8> {
    match command {
        Command::Init => init(&config.store, out)?,

        Command::Import {
            input,
            policy,
            limit,
            above_max,
        } => {
            let options = ImportOptions {
                policy,
                limit,
                above_max,
            };
            import(&config.store, &input, &options, out)?;
        }

        Command::Scan {
            from,
            to,
            descending,
            limit,
            event_id,
            provider_id,
            task_id,
            payloads,
        } => {
            let mut options = ScanOptions::range(from, to).with_direction(direction(descending));
            options.limit = limit;
            let request = ScanRequest {
                options,
                filter: HeaderFilter {
                    event_id,
                    provider_id,
                    task_id,
                    ..Default::default()
                },
                payloads,
            };
            scan(&config.store, &request, out)?;
        }

        Command::Info => info(&config.store, out)?,

        Command::Archive(command) => match command {
            ArchiveCommand::Plan { start, end } => {
                if !archive_plan(&config.store, &config.archive, start, end, out)? {
                    return Ok(EXIT_INVALID_PLAN);
                }
            }
            ArchiveCommand::Build { start, end } => {
                archive_build(&config.store, &config.archive, start, end, out)?
            }
            ArchiveCommand::List => archive_list(&config.archive, out)?,
            ArchiveCommand::Dump { file } => {
                archive_dump(&config.archive, &file, out)?;
            }
        },
    }
    Ok(EXIT_OK)
}

pub fn open_store(config: &StoreConfig, writable: bool) -> anyhow::Result<EventStore> {
    let mut config = config.clone();
    config.writable |= writable;
    let path = config.db_path.clone();
    EventStore::open(config).with_context(|| format!("opening store {}", path.display()))
}

pub fn init(config: &StoreConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let mut config = config.clone();
    config.create = true;
    let store = open_store(&config, true)?;
    writeln!(out, "Initialized store at {}", store.config().db_path.display())?;
    Ok(())
}

/// Import JSON lines of raw records from `input` (`-` reads stdin)
pub fn import(
    config: &StoreConfig,
    input: &Path,
    options: &ImportOptions,
    out: &mut impl Write,
) -> anyhow::Result<ImportSummary> {
    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
        Box::new(BufReader::new(file))
    };
    let store = open_store(config, true)?;
    let summary = import_lines(&store, reader, options)?;
    writeln!(out, "{}", serde_json::to_string(&summary)?)?;
    Ok(summary)
}

pub fn import_lines(
    store: &EventStore,
    reader: impl BufRead,
    options: &ImportOptions,
) -> anyhow::Result<ImportSummary> {
    let floor = if options.above_max {
        store.max_record_id()?
    } else {
        None
    };
    let mut job = store.import_job(options.policy)?;
    let mut unreadable = 0usize;
    let mut below_floor = 0usize;

    for (index, line) in reader.lines().enumerate() {
        if options.limit.is_some_and(|limit| job.summary().inserted >= limit) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RawEventRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(err) => {
                warn!(line = index + 1, error = %err, "Skipping unreadable record");
                unreadable += 1;
                continue;
            }
        };
        if let (Some(floor), Some(rid)) = (floor, record.rid)
            && rid <= floor
        {
            below_floor += 1;
            continue;
        }
        job.process_record(&record)
            .with_context(|| format!("importing line {}", index + 1))?;
    }

    let mut summary = job.commit()?;
    summary.malformed += unreadable;
    summary.skipped += below_floor;
    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        malformed = summary.malformed,
        "Import finished"
    );
    Ok(summary)
}

pub fn scan(config: &StoreConfig, request: &ScanRequest, out: &mut impl Write) -> anyhow::Result<usize> {
    let store = open_store(config, false)?;
    let mut options = request.options;
    options.chunk_size = config.chunk_size;
    let mut count = 0;
    if request.payloads {
        for row in store.scan_payloads(options) {
            let row = row?;
            writeln!(out, "{}", json!({ "rid": row.rid, "payload": row.payload }))?;
            count += 1;
        }
    } else {
        for header in store.scan_headers(options, request.filter) {
            writeln!(out, "{}", serde_json::to_string(&header?)?)?;
            count += 1;
        }
    }
    Ok(count)
}

pub fn info(config: &StoreConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let store = open_store(config, false)?;
    writeln!(out, "records:    {}", store.record_count()?)?;
    if let (Some(min), Some(max)) = (store.min_record_id()?, store.max_record_id()?) {
        writeln!(out, "record ids: {min}-{max}")?;
    }
    writeln!(out, "tasks:      {}", store.all_tasks()?.len())?;
    writeln!(out, "operations: {}", store.all_operations()?.len())?;
    let mut providers = store.all_providers()?;
    providers.sort_by_key(|p| p.provider_id);
    writeln!(out, "providers:  {}", providers.len())?;
    for provider in providers {
        writeln!(
            out,
            "  {:>4} {} {}",
            provider.provider_id,
            provider.name,
            provider.guid.as_deref().unwrap_or("-")
        )?;
    }
    let overview = store.overview()?;
    writeln!(out, "events:     {}", overview.len())?;
    for row in overview {
        writeln!(
            out,
            "  {:>6} {:>6} {:>8} {}-{} {:>10} {}",
            row.event_id,
            row.task_id,
            row.count,
            row.rid_min,
            row.rid_max,
            row.total_size,
            row.task_label.as_deref().unwrap_or("-")
        )?;
    }
    Ok(())
}

/// Validate an archive request and print the plan; returns whether it is valid
pub fn archive_plan(
    store_config: &StoreConfig,
    settings: &ArchiveSettings,
    start: i64,
    end: Option<i64>,
    out: &mut impl Write,
) -> anyhow::Result<bool> {
    let store = open_store(store_config, false)?;
    let mut builder = ArchiveBuilder::new(&store, settings.clone(), start, end);
    match builder.validate()? {
        Ok(plan) => {
            writeln!(out, "records: {}-{}", plan.rid_min, plan.rid_max)?;
            writeln!(out, "target:  {}", plan.target.display())?;
            Ok(true)
        }
        Err(failure) => {
            writeln!(out, "invalid: {failure}")?;
            Ok(false)
        }
    }
}

pub fn archive_build(
    store_config: &StoreConfig,
    settings: &ArchiveSettings,
    start: i64,
    end: Option<i64>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let store = open_store(store_config, false)?;
    let mut builder = ArchiveBuilder::new(&store, settings.clone(), start, end);
    builder.validate()??;
    let summary = builder.build()?;
    writeln!(
        out,
        "{}",
        json!({
            "path": summary.path,
            "archive": summary.descriptor.to_string(),
            "stats": summary.stats,
        })
    )?;
    Ok(())
}

pub fn archive_list(settings: &ArchiveSettings, out: &mut impl Write) -> anyhow::Result<()> {
    let archives =
        ArchiveDescriptor::find_archives(&settings.archive_dir, &settings.job, &settings.machine)?;
    for archive in archives {
        writeln!(out, "{archive}")?;
    }
    Ok(())
}

pub fn archive_dump(settings: &ArchiveSettings, file: &Path, out: &mut impl Write) -> anyhow::Result<usize> {
    let mut count = 0;
    for blob in open_archive(file, settings.framing)? {
        writeln!(out, "{}", blob?)?;
        count += 1;
    }
    Ok(count)
}

pub fn direction(descending: bool) -> Direction {
    if descending {
        Direction::Descending
    } else {
        Direction::Ascending
    }
}
