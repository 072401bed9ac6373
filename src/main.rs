use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

mod catalog;
mod emit;
mod header;
mod id;
mod layout;
mod lineage;
mod night;
mod select;
mod tree;

pub type Result<T> = anyhow::Result<T>;

use emit::{EmitOptions, Emitter, write_line};
use lineage::{FsLister, Selection};
use select::report::{PostFilter, Predicate, ReportStore};
use select::scan::ScanCriteria;

#[derive(Parser)]
#[command(name = "ocacollect")]
#[command(about = "OCA FITS collection toolkit", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect observations by scanning the storage tree.
    Collect(CollectArgs),
    /// Collect observations from per-telescope report files.
    Query(QueryArgs),
    /// Add calibration files to a list of science frames.
    Calib(CalibArgs),
    /// Convert an indented file list to structured JSON.
    Json(JsonArgs),
    /// Display FITS headers of listed files as a table.
    List(ListArgs),
    /// Download files from the remote catalog.
    Fetch(FetchArgs),
}

#[derive(Args)]
struct CollectArgs {
    /// Object name or alias (glob-style).
    #[arg(short, long, default_value = "*", value_name = "TARGET")]
    object: String,

    /// Telescope name.
    #[arg(short, long, default_value = "*")]
    telescope: String,

    /// Filter name.
    #[arg(short, long, default_value = "*")]
    filter: String,

    /// Date (single value) or date range (two values), ISO or OCA
    /// Julian night.
    #[arg(short, long, num_args = 1..=2)]
    date: Vec<String>,

    /// RAW files instead of calibrated ZDFs.
    #[arg(short, long)]
    raw: bool,

    /// Print filenames only instead of absolute paths.
    #[arg(short, long)]
    name: bool,

    /// Output a file only after checking it exists.
    #[arg(short, long)]
    check: bool,

    /// Root FITS dir (default: autodetect).
    #[arg(short = 'D', long)]
    dir: Option<PathBuf>,
}

#[derive(Args)]
struct QueryArgs {
    /// Object name (OBJECT column, glob-style).
    #[arg(short, long)]
    object: Option<String>,

    /// Telescope name (e.g. zb08).
    #[arg(short, long)]
    telescope: Option<String>,

    /// Filter name (FILTER column).
    #[arg(short, long)]
    filter: Option<String>,

    /// PI name.
    #[arg(short, long)]
    pi: Option<String>,

    /// Science program (SCIPROG).
    #[arg(short = 'P', long)]
    sciprog: Option<String>,

    /// DATE-OBS range: one value (single night) or two (from-to), ISO.
    #[arg(short, long, num_args = 1..=2)]
    date: Vec<String>,

    /// IMAGETYP value; empty disables the filter.
    #[arg(long, default_value = "science")]
    imagetyp: String,

    #[arg(long)]
    min_exptime: Option<f64>,
    #[arg(long)]
    max_exptime: Option<f64>,
    #[arg(long)]
    min_airmass: Option<f64>,
    #[arg(long)]
    max_airmass: Option<f64>,

    /// Minimum FWHM (mean of x/y components).
    #[arg(long)]
    min_fwhm: Option<f64>,
    /// Maximum FWHM (mean of x/y components).
    #[arg(long)]
    max_fwhm: Option<f64>,

    /// Exclude ZDF files from output.
    #[arg(short = 'Z', long)]
    exclude_zdf: bool,

    /// Include raw files in output.
    #[arg(short, long)]
    raw: bool,

    /// Output a file only after checking it exists.
    #[arg(short, long)]
    check: bool,

    /// Print filenames only, not full paths.
    #[arg(short, long)]
    name: bool,

    /// Extra columns to print after the path (tab-separated).
    #[arg(long, num_args = 1.., value_name = "COL")]
    cols: Vec<String>,

    /// Print unique values of a column instead of file paths.
    #[arg(long, value_name = "COL")]
    values: Option<String>,

    /// Analytic dir with report files (default: autodetect).
    #[arg(short = 'A', long)]
    analytic_dir: Option<PathBuf>,

    /// Root FITS dir (default: autodetect).
    #[arg(short = 'D', long)]
    dir: Option<PathBuf>,
}

#[derive(Args)]
#[command(after_help = "examples:

    Add master calibration files:
        ocacollect collect -o ngc300 -f V | ocacollect calib --master-calib

    Add only master zeros and darks:
        ocacollect calib --master-zero --master-dark file1.fits file2.fits
")]
struct CalibArgs {
    /// FITS files (reads from stdin if not provided).
    files: Vec<String>,

    /// Include raw calibration (implies --raw-zero, --raw-dark, --raw-flat).
    #[arg(short = 'R', long)]
    raw_calib: bool,

    /// Include raw ZERO (bias) images.
    #[arg(long)]
    raw_zero: bool,

    /// Include raw DARK images.
    #[arg(long)]
    raw_dark: bool,

    /// Include raw FLAT images.
    #[arg(long)]
    raw_flat: bool,

    /// Include master calibration (implies --master-zero, --master-dark,
    /// --master-flat).
    #[arg(short = 'M', long)]
    master_calib: bool,

    /// Include master ZERO images.
    #[arg(long)]
    master_zero: bool,

    /// Include master DARK images.
    #[arg(long)]
    master_dark: bool,

    /// Include master FLAT images.
    #[arg(long)]
    master_flat: bool,

    /// Do not output the original input files.
    #[arg(short = 's', long)]
    skip_source: bool,

    /// Skip duplicate files across the whole run.
    #[arg(short = 'd', long)]
    skip_duplicates: bool,

    /// Print filenames only, not full paths.
    #[arg(short = 'n', long)]
    names: bool,

    /// Do not indent output to show dependency structure.
    #[arg(short = 'N', long)]
    no_indent: bool,

    /// Root FITS dir (default: autodetect).
    #[arg(short = 'D', long)]
    dir: Option<PathBuf>,
}

#[derive(Args)]
struct JsonArgs {
    /// FITS files (reads from stdin if not provided).
    files: Vec<String>,

    /// Root FITS dir (default: autodetect).
    #[arg(short = 'D', long)]
    dir: Option<PathBuf>,
}

#[derive(Args)]
struct ListArgs {
    /// FITS files (reads from stdin if not provided).
    files: Vec<String>,
}

#[derive(Args)]
struct FetchArgs {
    /// Catalog username.
    #[arg(short, long)]
    username: String,

    /// Catalog password.
    #[arg(short, long)]
    password: String,

    /// List all available observations instead of downloading.
    #[arg(short, long)]
    list: bool,

    /// Find and display one observation by filename.
    #[arg(short, long)]
    filename: Option<String>,

    /// Batch size for download-URL requests.
    #[arg(long, default_value_t = catalog::DEFAULT_CHUNK_SIZE)]
    chunksize: usize,

    /// Catalog service base URL.
    #[arg(long, default_value = "https://ocadb.onrender.com")]
    url: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Commands::Collect(args) => run_collect(args),
        Commands::Query(args) => run_query(args),
        Commands::Calib(args) => run_calib(args),
        Commands::Json(args) => run_json(args),
        Commands::List(args) => run_list(args),
        Commands::Fetch(args) => run_fetch(args),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

/// Positional arguments if given, otherwise stdin one-per-line. Leading
/// whitespace is preserved — it carries tree depth for the json stage.
fn input_lines(files: Vec<String>) -> Result<Vec<String>> {
    if !files.is_empty() {
        return Ok(files);
    }
    let mut lines = Vec::new();
    for line in io::stdin().lock().lines() {
        lines.push(line?);
    }
    Ok(lines)
}

fn run_collect(args: CollectArgs) -> Result<()> {
    let root = layout::resolve_root(args.dir.as_deref())?;
    let criteria = ScanCriteria {
        object: args.object,
        telescope: args.telescope,
        filter: args.filter,
        nights: night::parse_range(&args.date)?,
    };
    let mut out = io::stdout().lock();
    for obs in select::scan::scan(&root, &criteria)? {
        let path = if args.raw {
            layout::raw_file(&obs, &root)
        } else {
            layout::zdf_file(&obs, &root)
        };
        if args.check && !path.exists() {
            log::warn!("file {} does not exist", path.display());
            continue;
        }
        write_line(&mut out, &render_path(&path, args.name))?;
    }
    Ok(())
}

fn run_query(args: QueryArgs) -> Result<()> {
    let store = ReportStore::new(layout::resolve_analytic(args.analytic_dir.as_deref())?);
    let root = layout::resolve_root(args.dir.as_deref())?;

    // Equality/range predicates go to the store; wildcarded PI/SCIPROG
    // are pattern predicates and must wait for the post pass.
    let mut pushdown = Vec::new();
    if !args.imagetyp.is_empty() {
        pushdown.push(Predicate::ImageTyp(args.imagetyp.clone()));
    }
    if let Some(filter) = &args.filter {
        pushdown.push(Predicate::Filter(filter.clone()));
    }
    if let Some(pi) = &args.pi {
        if !pi.contains('*') {
            pushdown.push(Predicate::Pi(pi.clone()));
        }
    }
    if let Some(sciprog) = &args.sciprog {
        if !sciprog.contains('*') {
            pushdown.push(Predicate::SciProg(sciprog.clone()));
        }
    }
    if let Some(v) = args.min_exptime {
        pushdown.push(Predicate::MinExpTime(v));
    }
    if let Some(v) = args.max_exptime {
        pushdown.push(Predicate::MaxExpTime(v));
    }
    if let Some(v) = args.min_airmass {
        pushdown.push(Predicate::MinAirmass(v));
    }
    if let Some(v) = args.max_airmass {
        pushdown.push(Predicate::MaxAirmass(v));
    }
    match args.date.as_slice() {
        [] => {}
        [single] => pushdown.extend(Predicate::date_range(single, single)),
        [from, to] => pushdown.extend(Predicate::date_range(from, to)),
        _ => unreachable!("clap caps --date at two values"),
    }

    let post = PostFilter {
        object: args.object.clone(),
        pi: args.pi.clone(),
        sciprog: args.sciprog.clone(),
        min_fwhm: args.min_fwhm,
        max_fwhm: args.max_fwhm,
    };

    let rows = select::report::query(&store, args.telescope.as_deref(), &pushdown, &post)?;
    let mut out = io::stdout().lock();

    if let Some(column) = &args.values {
        if !select::report::COLUMNS.contains(&column.as_str()) {
            anyhow::bail!(
                "column not found: {column}. Available: {}",
                select::report::COLUMNS.join(", ")
            );
        }
        let mut values: Vec<String> = rows.iter().filter_map(|r| r.column(column)).collect();
        values.sort();
        values.dedup();
        for value in values {
            write_line(&mut out, &value)?;
        }
        return Ok(());
    }

    let mut count = 0u64;
    let mut skipped = 0u64;
    for row in &rows {
        let obs = match id::parse_basename(&row.id) {
            Ok(obs) => obs,
            Err(err) => {
                log::warn!("bad report id: {err}");
                continue;
            }
        };
        let mut files = Vec::new();
        if args.raw {
            files.push(layout::raw_file(&obs, &root));
        }
        if !args.exclude_zdf {
            files.push(layout::zdf_file(&obs, &root));
        }
        for path in files {
            if args.check && !path.exists() {
                skipped += 1;
                log::debug!("file not found, skipping: {}", path.display());
                continue;
            }
            let mut line = render_path(&path, args.name);
            if !args.cols.is_empty() {
                let extra: Vec<String> = args
                    .cols
                    .iter()
                    .map(|c| row.column(c).unwrap_or_default())
                    .collect();
                line = format!("{line}\t{}", extra.join("\t"));
            }
            write_line(&mut out, &line)?;
            count += 1;
        }
    }
    if skipped > 0 {
        log::info!("files output: {count}, skipped (not found): {skipped}");
    } else {
        log::info!("files output: {count}");
    }
    Ok(())
}

fn run_calib(args: CalibArgs) -> Result<()> {
    let root = layout::resolve_root(args.dir.as_deref())?;
    let policy = Selection {
        raw_zero: args.raw_zero || args.raw_calib,
        raw_dark: args.raw_dark || args.raw_calib,
        raw_flat: args.raw_flat || args.raw_calib,
        master_zero: args.master_zero || args.master_calib,
        master_dark: args.master_dark || args.master_calib,
        master_flat: args.master_flat || args.master_calib,
    };
    let opts = EmitOptions {
        skip_source: args.skip_source,
        skip_duplicates: args.skip_duplicates,
        names_only: args.names,
        no_indent: args.no_indent,
    };
    let lines = input_lines(args.files)?;
    let mut emitter = Emitter::new(io::stdout().lock(), opts);
    let lister = FsLister;

    for line in &lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = id::parse(line);
        let source_kind = emit::source_kind(parsed.as_ref().ok().map(|(_, kind)| kind));
        emitter.emit_source(line, source_kind)?;

        let (obs, kind) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("cannot extract basename from {line}: {err}");
                continue;
            }
        };
        for node in lineage::walk(0, &obs, &kind, &root, &policy, &lister) {
            emitter.emit_node(&node)?;
        }
    }

    log::info!("{}", emitter.summary());
    Ok(())
}

fn run_json(args: JsonArgs) -> Result<()> {
    let root = match &args.dir {
        Some(dir) => Some(dir.clone()),
        None => match layout::resolve_root(None) {
            Ok(root) => Some(root),
            Err(_) => {
                log::warn!("cannot detect storage root, paths will not be reconstructed");
                None
            }
        },
    };
    let lines = input_lines(args.files)?;
    let observations = tree::structure(&lines, root.as_deref());
    let mut out = io::stdout().lock();
    let json = serde_json::to_string_pretty(&observations)?;
    write_line(&mut out, &json)
}

fn run_list(args: ListArgs) -> Result<()> {
    let lines = input_lines(args.files)?;
    let rows: Vec<(String, Option<header::Header>)> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| (l.to_string(), header::read_header(Path::new(l))))
        .collect();
    let mut out = io::stdout().lock();
    header::print_table(&mut out, &rows)
}

fn run_fetch(args: FetchArgs) -> Result<()> {
    let mut client = catalog::CatalogClient::connect(&args.url, &args.username, &args.password)?;
    let mut out = io::stdout().lock();

    if args.list {
        let records = client.list_observations()?;
        for record in &records {
            write_line(&mut out, &record.filename)?;
        }
        log::info!("{} FITS files listed", records.len());
        return Ok(());
    }

    if let Some(filename) = &args.filename {
        let found = client.find_by_filename(filename)?;
        return write_line(&mut out, &serde_json::to_string_pretty(&found)?);
    }

    // Download queue from stdin; only the file name matters to the catalog.
    let queue: Vec<String> = input_lines(Vec::new())?
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| {
            Path::new(l)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| l.to_string())
        })
        .collect();

    let total = queue.len();
    let mut done = 0usize;
    for chunk in catalog::chunked(&queue, args.chunksize) {
        for file in client.batch_urls(chunk)? {
            done += 1;
            log::info!("downloading {} [{done}/{total}]", file.description);
            client.download(&file, Path::new("."))?;
        }
    }
    Ok(())
}

fn render_path(path: &Path, name_only: bool) -> String {
    if name_only {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    } else {
        path.display().to_string()
    }
}
