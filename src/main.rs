mod break_detect;
mod config;
mod driver;
mod error;
mod graph;
mod layout;
mod link_matrix;
mod link_store;
mod norm;
mod restriction;
mod seq_dict;
mod union_find;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use layout::Layout;
use log::{error, info};
use seq_dict::SeqDict;
use std::io::Write as _;
use std::path::PathBuf;

/// Hi-C scaffolding engine: joins and orders contigs using proximity-ligation link
/// evidence, with mis-assembly break detection and iterative resolution escalation.
#[derive(Parser, Debug)]
#[clap(name = "hicscaf", author, version, about, long_about = None)]
struct Args {
    // ============================================================================
    // Input/Output
    // ============================================================================
    /// FASTA index (.fai) of the contigs being scaffolded
    #[clap(value_name = "CONTIGS_FAI")]
    contigs_fai: PathBuf,

    /// Binary Hi-C link dump (17-byte little-endian records, no header)
    #[clap(value_name = "LINKS")]
    links: PathBuf,

    /// Seed layout as an AGP file (defaults to one scaffold per contig)
    #[clap(short = 'a', long = "agp", help_heading = "Input/Output")]
    agp: Option<PathBuf>,

    /// Output prefix for the final AGP and any diagnostics
    #[clap(short = 'o', long = "out-prefix", default_value = "hicscaf_out", help_heading = "Input/Output")]
    out_prefix: String,

    // ============================================================================
    // Scaffolding parameters
    // ============================================================================
    /// Comma-separated ascending bin resolutions to scaffold at
    #[clap(short = 'r', long = "resolutions", value_delimiter = ',', help_heading = "Scaffolding parameters")]
    resolutions: Option<Vec<u32>>,

    /// Restriction enzyme recognition site(s), comma-separated, `N` wildcards allowed
    #[clap(short = 'e', long = "enzyme", help_heading = "Scaffolding parameters")]
    enzyme: Option<String>,

    /// Minimum contig length kept in the dictionary
    #[clap(short = 'l', long = "min-length", help_heading = "Scaffolding parameters")]
    min_length: Option<u64>,

    /// Minimum mapping quality for a link record to be counted
    #[clap(short = 'q', long = "min-mapq", help_heading = "Scaffolding parameters")]
    min_mapq: Option<u8>,

    /// Nominal AGP gap length between joined segments
    #[clap(long = "gap-length", help_heading = "Scaffolding parameters")]
    gap_length: Option<u32>,

    /// Hard ceiling on scaffold count before aborting
    #[clap(long = "scaffold-ceiling", help_heading = "Scaffolding parameters")]
    scaffold_ceiling: Option<usize>,

    // ============================================================================
    // Stage toggles
    // ============================================================================
    /// Skip the initial contig-internal break detection stage
    #[clap(long = "no-contig-ec", help_heading = "Stage toggles")]
    no_contig_ec: bool,

    /// Skip scaffold-joint break detection after each scaffolding round
    #[clap(long = "no-scaffold-ec", help_heading = "Stage toggles")]
    no_scaffold_ec: bool,

    /// Skip the memory-budget estimate before each matrix build
    #[clap(long = "no-mem-check", help_heading = "Stage toggles")]
    no_mem_check: bool,

    /// Resident-set budget (accepts k/m/g suffixes, e.g. `32g`)
    #[clap(long = "rss-limit", help_heading = "Stage toggles")]
    rss_limit: Option<String>,

    // ============================================================================
    // Diagnostics
    // ============================================================================
    /// Increase logging verbosity (repeatable: -v info, -vv debug, -vvv trace)
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Diagnostics")]
    verbose: u8,
}

/// Parse a byte-count flag with an optional `k`/`m`/`g` suffix (base 1024), matching
/// the teacher's metric-suffix argument convention.
fn parse_metric_bytes(s: &str) -> Result<u64> {
    let s = s.trim();
    let (digits, mult) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1024u64),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    let value: u64 = digits.parse().with_context(|| format!("invalid byte size '{s}'"))?;
    Ok(value * mult)
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            let tag = match record.level() {
                log::Level::Error => "E",
                log::Level::Warn => "W",
                log::Level::Info => "I",
                log::Level::Debug => "D",
                log::Level::Trace => "T",
            };
            writeln!(buf, "[{}::{}] {}", tag, record.target(), record.args())
        })
        .init();
}

fn build_config(args: &Args) -> Result<Config> {
    let mut config = Config::default();
    if let Some(resolutions) = &args.resolutions {
        config.resolutions = resolutions.clone();
    }
    if let Some(enzyme) = &args.enzyme {
        config.enzyme_motifs = config::expand_enzyme_motifs(enzyme);
    }
    if let Some(min_length) = args.min_length {
        config.min_contig_length = min_length;
    }
    if let Some(min_mapq) = args.min_mapq {
        config.min_mapq = min_mapq;
    }
    if let Some(gap_length) = args.gap_length {
        config.gap_length = gap_length;
    }
    if let Some(scaffold_ceiling) = args.scaffold_ceiling {
        config.scaffold_ceiling = scaffold_ceiling;
    }
    config.run_contig_break = !args.no_contig_ec;
    config.run_scaffold_break = !args.no_scaffold_ec;
    config.check_memory = !args.no_mem_check;
    if let Some(rss) = &args.rss_limit {
        config.rss_limit_bytes = parse_metric_bytes(rss)?;
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;

    let dict = SeqDict::from_fai(&args.contigs_fai, config.min_contig_length)
        .with_context(|| format!("loading contig index {}", args.contigs_fai.display()))?;
    if dict.is_empty() {
        anyhow::bail!("no contigs survived the length filter");
    }
    info!("loaded {} contigs", dict.len());

    let seed_layout = match &args.agp {
        Some(path) => Layout::from_agp(path, &dict).with_context(|| format!("loading seed AGP {}", path.display()))?,
        None => Layout::identity(&dict),
    };

    let mut reader =
        link_store::open_link_store(&args.links).with_context(|| format!("opening link store {}", args.links.display()))?;
    let mut links = Vec::new();
    let total = link_store::scan(&mut reader, &seed_layout, config.min_mapq, |link| links.push(link))?;
    info!("scanned {total} raw link records, {} survived filtering", links.len());

    let sites = if config.enzyme_motifs.is_empty() {
        restriction::RestrictionSites::default()
    } else {
        let fasta_path = args
            .contigs_fai
            .to_str()
            .and_then(|s| s.strip_suffix(".fai"))
            .map(PathBuf::from)
            .with_context(|| {
                format!(
                    "cannot derive a sequence file from {}: expected a '.fai' suffix to locate the FASTA it indexes",
                    args.contigs_fai.display()
                )
            })?;
        let sites = restriction::scan_fasta_for_motifs(&fasta_path, &dict, &config.enzyme_motifs)
            .with_context(|| format!("scanning {} for restriction motifs", fasta_path.display()))?;
        info!("scanned {} for {} restriction motif(s)", fasta_path.display(), config.enzyme_motifs.len());
        sites
    };

    let (final_layout, report) = driver::run(&dict, links, &sites, &config)?;
    info!(
        "pipeline complete: {} contig-break rounds, {} scaffold rounds, final resolution {}",
        report.contig_break_rounds, report.scaffold_rounds, report.final_resolution
    );

    let agp_path = format!("{}.agp", args.out_prefix);
    final_layout
        .write_agp(&agp_path, &dict)
        .with_context(|| format!("writing AGP {agp_path}"))?;
    info!("wrote {} scaffolds to {agp_path}", final_layout.scaffolds.len());

    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(args) {
        error!("{err:#}");
        let code = error::downcast(&err).map(|e| e.exit_code()).unwrap_or(1);
        std::process::exit(code);
    }
}
