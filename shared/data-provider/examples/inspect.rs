use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sluice_core::{init_logging, LogOutput};
use sluice_data_provider::{
    Config, DataPathResolver, DataStream, DataStreamExt, Dataset, DatasetStream, SequentialScheme,
    Shuffle, ShuffledScheme, SourceData, SplitDataset, SplitDatasetConfig,
};
use tracing::{info, Level};

/// Prints the first few batches of one split of a container file.
#[derive(Parser, Debug)]
struct Args {
    /// Container file, absolute or relative to the configured data path.
    file: PathBuf,

    #[arg(long, default_value = "train")]
    split: String,

    /// Sources to read, all of them when omitted.
    #[arg(long, value_delimiter = ',')]
    sources: Option<Vec<String>>,

    #[arg(long, default_value_t = 4)]
    batch_size: usize,

    /// Shuffle instead of reading in order.
    #[arg(long)]
    shuffle: bool,

    /// Seed for --shuffle, the configured default seed when omitted.
    #[arg(long, requires = "shuffle")]
    seed: Option<u64>,

    #[arg(long)]
    in_memory: bool,

    /// Read through a background prefetcher.
    #[arg(long)]
    prefetch: bool,

    /// Batches the prefetcher keeps ready, the configured size when omitted.
    #[arg(long, requires = "prefetch")]
    max_batches: Option<usize>,

    #[arg(long, default_value_t = 3)]
    batches: usize,

    #[arg(long, value_enum, default_value_t = LogOutput::Console)]
    log_output: LogOutput,
}

fn describe(source: &str, data: &SourceData) -> String {
    match data {
        SourceData::Array(array) => format!("{source}: {} {:?}", array.dtype(), array.shape()),
        SourceData::List(rows) => {
            let shapes: Vec<_> = rows.iter().map(|row| row.shape().to_vec()).collect();
            format!("{source}: {} rows with shapes {shapes:?}", rows.len())
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_output, Level::INFO)?;

    let config = Config::load()?;
    let mut dataset_config =
        SplitDatasetConfig::new(&args.file, &args.split).load_in_memory(args.in_memory);
    if let Some(sources) = args.sources {
        dataset_config = dataset_config.with_sources(sources);
    }
    let resolver = DataPathResolver::from_config(&config);
    let dataset = SplitDataset::with_resolver(dataset_config, &resolver)?;
    let num_examples = dataset.num_examples();
    info!(path = %dataset.path().display(), num_examples, "opened split {}", args.split);

    let stream = if args.shuffle {
        let shuffle = args.seed.map_or_else(|| config.shuffle(), Shuffle::from_u64);
        DatasetStream::new(
            dataset,
            ShuffledScheme::new(num_examples, args.batch_size, shuffle)?,
        )?
        .boxed()
    } else {
        DatasetStream::new(dataset, SequentialScheme::new(num_examples, args.batch_size)?)?
            .boxed()
    };
    let mut stream = if args.prefetch {
        stream.prefetch(args.max_batches)?.boxed()
    } else {
        stream
    };

    let sources = stream.sources().to_vec();
    for (i, batch) in stream.get_epoch_iterator()?.take(args.batches).enumerate() {
        let batch = batch?;
        println!("batch {i}");
        for (source, data) in sources.iter().zip(&batch) {
            println!("  {}", describe(source, data));
        }
    }
    stream.close()?;
    Ok(())
}
