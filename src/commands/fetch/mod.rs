mod download;
mod export;
mod metadata;
mod resolve;
mod run;
#[cfg(test)]
mod tests;

pub use run::run;

use download::*;
use export::*;
use metadata::*;
use resolve::*;
