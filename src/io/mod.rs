use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::bail;
use log::info;

use crate::tree::{from_newick, Genealogy};
use crate::Result;

pub(crate) struct DataError {
    pub(crate) message: String,
}
impl fmt::Debug for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl Error for DataError {}

/// Reads genealogies from a newick file.
pub fn read_newick_from_file(path: &Path) -> Result<Vec<Genealogy>> {
    info!("Reading genealogies from file {}", path.display());
    let newick_string = fs::read_to_string(path)?;
    let genealogies = from_newick(&newick_string)?;
    if genealogies.is_empty() {
        bail!(DataError {
            message: String::from("No genealogies found in file")
        });
    }
    info!("Read {} genealogies", genealogies.len());
    Ok(genealogies)
}

/// Writes genealogies to a newick file, one per line, with branch lengths
/// recomputed from node heights.
pub fn write_newick_to_file(genealogies: &[Genealogy], path: &Path) -> Result<()> {
    info!("Writing genealogies to file {}", path.display());
    let mut output = File::create(path)?;
    for genealogy in genealogies {
        writeln!(output, "{}", genealogy.to_newick()?)?;
    }
    info!("Wrote {} genealogies", genealogies.len());
    Ok(())
}
