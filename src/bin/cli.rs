use anyhow::Result;
use colored::*;
use insider::{
    core::types::select_top,
    edgar::discovery::Strategy,
    sink::{CsvSink, TransactionSink},
    utils::dirs,
    Pipeline, PipelineConfig, ProgressTracker,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "insider-cli",
    about = "Find open-market purchases by chief executives in recent Form 4 filings"
)]
struct Opt {
    /// Number of calendar days to look back, today included
    #[structopt(short, long, default_value = "3")]
    days: u32,

    /// Discovery strategy: feed, index or api
    #[structopt(short, long, default_value = "index")]
    strategy: Strategy,

    /// Worker count (1-4); overrides INSIDER_WORKERS
    #[structopt(short, long)]
    workers: Option<usize>,

    /// How many of the largest purchases to print
    #[structopt(short, long, default_value = "20")]
    top: usize,

    /// Data directory; overrides INSIDER_DATA_DIR
    #[structopt(long, parse(from_os_str))]
    data_dir: Option<PathBuf>,

    /// Directory for the CSV output (default: <data dir>/insider_ceo)
    #[structopt(long, parse(from_os_str))]
    output_dir: Option<PathBuf>,

    /// Do not write a CSV file
    #[structopt(long)]
    no_csv: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::debug!("Logger initialized");

    let opt = Opt::from_args();

    let mut config = PipelineConfig::from_env()?;
    if let Some(workers) = opt.workers {
        config = config.with_workers(workers);
    }
    if let Some(data_dir) = opt.data_dir.clone() {
        config = config.with_data_dir(data_dir);
    }

    let pipeline = Pipeline::from_config(&config)?;
    let source = opt.strategy.build(pipeline.fetcher(), &config)?;

    println!(
        "{} {} discovery over the last {} day(s)",
        "Running".green().bold(),
        opt.strategy.to_string().cyan(),
        opt.days
    );

    let progress = if std::io::stdout().is_terminal() {
        ProgressTracker::new("Form 4 filings")
    } else {
        ProgressTracker::hidden()
    };

    let report = pipeline.run(source.as_ref(), opt.days, &progress).await;

    if report.is_empty() {
        println!("{}", "No CEO open-market purchases found (no data today).".yellow());
        println!("{}", report.summary().dimmed());
        return Ok(());
    }

    if !opt.no_csv {
        let dir = opt
            .output_dir
            .clone()
            .unwrap_or_else(|| dirs::output_dir(&config.data_dir));
        if let Some(path) = CsvSink::new(dir).write(&report.records)? {
            println!("{} {}", "Saved".green(), path.display());
        }
    }

    println!("\n{}", format!("Top {} CEO purchases by shares", opt.top).bold());
    for (rank, record) in select_top(&report.records, opt.top).iter().enumerate() {
        println!(
            "{:>3}. {:<6} {:<30} {:>12} @ ${:<10} {}  {}",
            rank + 1,
            record.ticker.cyan().bold(),
            record.insider_name,
            format!("+{}", record.shares).green(),
            record.price,
            record.trade_date,
            record.filing_url.dimmed()
        );
    }

    println!("\n{}", report.summary().dimmed());
    Ok(())
}
