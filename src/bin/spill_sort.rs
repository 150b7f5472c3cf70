use clap::Parser;
use spillbag::{
    BagError, BincodeCodec, Comparator, ConfiguredPolicy, SpillBag, SpillConfig, init_tracing,
};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

const DEFAULT_THRESHOLD: usize = 100_000;

#[derive(Parser)]
#[command(name = "spill_sort")]
#[command(about = "Sort newline-delimited records with bounded memory", long_about = None)]
struct Cli {
    /// Input file; reads stdin when omitted
    input: Option<PathBuf>,

    /// Emit each distinct line once
    #[arg(long)]
    distinct: bool,

    /// Sort in descending order
    #[arg(long)]
    reverse: bool,

    /// Lines held in memory before spilling
    #[arg(long)]
    threshold: Option<usize>,

    /// Spill files merged at once before premerging kicks in
    #[arg(long)]
    max_spill_files: Option<usize>,

    /// Directory for spill files
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// JSON config file, applied before the flags above
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn spill_config(&self) -> Result<SpillConfig, BagError> {
        let mut config = match &self.config {
            Some(path) => SpillConfig::from_json_file(path)?,
            None => SpillConfig::from_env()?,
        };
        if let Some(threshold) = self.threshold {
            config = config.with_spill_threshold(threshold);
        } else if config.spill_threshold.is_none() {
            config = config.with_spill_threshold(DEFAULT_THRESHOLD);
        }
        if let Some(max) = self.max_spill_files {
            config = config.with_max_spill_files(max);
        }
        if let Some(dir) = &self.temp_dir {
            config = config.with_temp_dir(dir);
        }
        config.validate()?;
        Ok(config)
    }
}

fn sort_lines<O: Comparator<String>>(
    input: Box<dyn BufRead>,
    comparator: O,
    distinct: bool,
    config: &SpillConfig,
) -> Result<(), BagError> {
    let policy = ConfiguredPolicy::from_config(config);
    let codec = BincodeCodec::<String>::new();
    let mut bag = if distinct {
        SpillBag::distinct(policy, codec, comparator, config)?
    } else {
        SpillBag::sorted(policy, codec, comparator, config)?
    };

    for line in input.lines() {
        bag.add(line?)?;
    }
    info!(
        "read {} lines, {} spill files",
        bag.len(),
        bag.spill_file_count()
    );

    let mut out = BufWriter::new(io::stdout().lock());
    let mut written = 0usize;
    for line in bag.read()? {
        writeln!(out, "{}", line?)?;
        written += 1;
    }
    out.flush()?;
    bag.close()?;
    info!("wrote {} lines", written);
    Ok(())
}

fn main() -> Result<(), BagError> {
    init_tracing("spill_sort");
    let cli = Cli::parse();
    let config = cli.spill_config()?;

    let input: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin().lock())),
    };

    if cli.reverse {
        let descending = |a: &String, b: &String| -> Ordering { b.cmp(a) };
        sort_lines(input, descending, cli.distinct, &config)
    } else {
        sort_lines(input, spillbag::NaturalOrder, cli.distinct, &config)
    }
}
