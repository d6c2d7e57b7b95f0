use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rawmap::index::FmIndex;
use rawmap::io::fasta::{FastaReader, FastaRecord};
use rawmap::model::KmerModel;
use rawmap::util::dna;

#[derive(Parser, Debug)]
#[command(name = "rawmap", author, version, about = "Inspect the indexes and k-mer models used by a streaming raw-signal mapper", arg_required_else_help = true)]
struct Cli {
    /// Debug-level logging (overridden by RAWMAP_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the size, contigs and metadata of a prebuilt index
    IndexInfo {
        /// Index prefix ({prefix}.bwt / .sa / .ann)
        prefix: PathBuf,
    },
    /// Exact-match search of a DNA pattern and its reverse complement against an index
    Search {
        /// Index prefix ({prefix}.bwt / .sa / .ann)
        #[arg(short = 'i', long = "index")]
        prefix: PathBuf,
        /// Pattern over ACGT
        pattern: String,
        /// Print at most this many hit positions
        #[arg(short = 'n', long = "max-hits", default_value_t = 20)]
        max_hits: u64,
    },
    /// Print summary statistics of a k-mer model table
    ModelInfo {
        model: PathBuf,
        /// Load as the complement-strand table
        #[arg(long)]
        complement: bool,
    },
    /// Encode the records of a FASTA file into k-mer ids (forward and reverse complement)
    Encode {
        /// k-mer model table
        #[arg(short, long)]
        model: PathBuf,
        /// Reference FASTA file
        reference: PathBuf,
        /// Output path (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Write every id instead of per-record counts
        #[arg(long)]
        ids: bool,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("RAWMAP_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("rawmap=debug,info")
        } else {
            EnvFilter::new("rawmap=warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::IndexInfo { prefix } => run_index_info(&prefix),
        Commands::Search { prefix, pattern, max_hits } => run_search(&prefix, &pattern, max_hits),
        Commands::ModelInfo { model, complement } => run_model_info(&model, complement),
        Commands::Encode { model, reference, out, ids, threads } => {
            run_encode(&model, &reference, out.as_deref(), ids, threads)
        }
    }
}

fn run_index_info(prefix: &Path) -> Result<()> {
    let index = FmIndex::load(prefix).with_context(|| format!("cannot load index '{}'", prefix.display()))?;
    println!("size: {}", index.size());
    println!("contigs: {}", index.contigs().len());
    let meta = index.meta();
    if let Some(reference) = &meta.reference_file {
        println!("reference: {}", reference);
    }
    if let Some(built_at) = &meta.built_at {
        println!("built_at: {}", built_at.to_rfc3339());
    }
    for c in index.contigs() {
        println!("{}\t{}\t{}", c.name, c.offset, c.len);
    }
    Ok(())
}

fn run_search(prefix: &Path, pattern: &str, max_hits: u64) -> Result<()> {
    let fwd = dna::encode_seq(pattern.as_bytes())
        .map_err(|i| anyhow::anyhow!("pattern has non-ACGT character at position {}", i))?;
    let rev = dna::encode_seq(&dna::revcomp(pattern.as_bytes()))
        .map_err(|i| anyhow::anyhow!("reverse complement has non-ACGT character at position {}", i))?;
    let index = FmIndex::load(prefix).with_context(|| format!("cannot load index '{}'", prefix.display()))?;

    for (strand, codes) in [('+', &fwd), ('-', &rev)] {
        let range = index.backward_search(codes);
        println!("{}\tinterval: {}\thits: {}", strand, range, range.len());
        for slot in range.slots().take(max_hits as usize) {
            let pos = index.suffix_position(slot)?;
            match index.translate_position(pos) {
                Some(loc) => println!("{}\t{}\t{}\t{}", strand, slot, loc.name, loc.offset),
                None => println!("{}\t{}\t*\t{}", strand, slot, pos),
            }
        }
    }
    Ok(())
}

fn run_model_info(path: &Path, complement: bool) -> Result<()> {
    let model = KmerModel::load(path, complement)?;
    println!("k: {}", model.kmer_len());
    println!("kmers: {}", model.kmer_count());
    println!("complement: {}", model.is_complement());
    println!("model_mean: {:.4}", model.model_mean());
    println!("model_stdv: {:.4}", model.model_stdv());
    println!("lambda: {:.4}", model.lambda());
    Ok(())
}

struct EncodedRecord {
    id: String,
    len: usize,
    fwd: Vec<u16>,
    rev: Vec<u16>,
}

fn run_encode(model_path: &Path, reference: &Path, out: Option<&Path>, ids: bool, threads: usize) -> Result<()> {
    let model = KmerModel::load(model_path, false)?;

    let fh = File::open(reference)
        .with_context(|| format!("cannot open reference FASTA '{}'", reference.display()))?;
    let records = FastaReader::new(BufReader::new(fh)).collect::<Result<Vec<FastaRecord>>>()?;
    if records.is_empty() {
        bail!("FASTA file '{}' contains no sequences", reference.display());
    }

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads.max(1)).build()?;
    let encoded: Vec<EncodedRecord> = pool.install(|| {
        records
            .par_iter()
            .map(|rec| {
                let (fwd, rev) = model.encode_reference(&rec.seq);
                EncodedRecord { id: rec.id.clone(), len: rec.seq.len(), fwd: fwd.collect(), rev: rev.collect() }
            })
            .collect()
    });
    info!(records = encoded.len(), threads, "encoded reference");

    let mut writer: Box<dyn Write> = match out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    for rec in &encoded {
        if ids {
            writeln!(writer, ">{}\t+\t{}", rec.id, join_ids(&rec.fwd))?;
            writeln!(writer, ">{}\t-\t{}", rec.id, join_ids(&rec.rev))?;
        } else {
            writeln!(writer, "{}\t{}\t{}\t{}", rec.id, rec.len, rec.fwd.len(), rec.rev.len())?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn join_ids(ids: &[u16]) -> String {
    ids.iter().map(u16::to_string).collect::<Vec<_>>().join(" ")
}
