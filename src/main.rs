use std::result::Result::Ok;

use anyhow::Error;
use clap::Parser;
use ftail::Ftail;
use log::{info, LevelFilter};

use coalescent::coalescent::CoalescentLikelihoodBuilder;
use coalescent::demographic::ExponentialGrowth;
use coalescent::io::read_newick_from_file;

mod cli;
use crate::cli::Cli;

type Result<T> = std::result::Result<T, Error>;

fn main() -> Result<()> {
    Ftail::new().console(LevelFilter::Info).init()?;
    let cli = match Cli::try_parse() {
        Ok(cli) => {
            info!("Successfully parsed the command line parameters");
            cli
        }
        Err(error) => {
            error.print()?;
            std::process::exit(1);
        }
    };

    let genealogies = read_newick_from_file(&cli.tree_file)?;
    for (index, genealogy) in genealogies.into_iter().enumerate() {
        let mut builder = CoalescentLikelihoodBuilder::<ExponentialGrowth>::new(genealogy);
        if !cli.analytical {
            let demographic =
                ExponentialGrowth::new(cli.pop_size, cli.growth_rate.unwrap_or(0.0))?;
            builder = builder.demographic(demographic);
        }
        let mut likelihood = builder.build()?;
        let logl = likelihood.log_likelihood()?;
        info!(
            "Genealogy {}: {} intervals over total height {}",
            index,
            likelihood.interval_count()?,
            likelihood.total_height()?
        );
        println!("{}", logl);
    }
    Ok(())
}
