use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Cli {
    /// Genealogy file in newick format
    #[arg(short, long, value_name = "TREE_FILE")]
    pub(super) tree_file: PathBuf,

    /// Effective population size at time zero
    #[arg(short = 'n', long, default_value_t = 1.0)]
    pub(super) pop_size: f64,

    /// Exponential growth rate, constant population size when omitted
    #[arg(short, long)]
    pub(super) growth_rate: Option<f64>,

    /// Integrate the population size out analytically under a flat prior
    /// instead of using a demographic model
    #[arg(short, long, default_value_t = false)]
    pub(super) analytical: bool,
}
