use lakecommit_core::{
    catalog::CatalogError, config::ConfigError, metadata::MetadataError,
    pipeline::PipelineError,
};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    #[snafu(display("Failed to initialize catalog: {source}"))]
    Catalog {
        #[snafu(source(from(CatalogError, Box::new)))]
        source: Box<CatalogError>,
    },

    #[snafu(display("Invalid table schema: {source}"))]
    Schema { source: MetadataError },

    #[snafu(display("Run failed for table {table}: {source}"))]
    Pipeline {
        table: String,
        #[snafu(source(from(PipelineError, Box::new)))]
        source: Box<PipelineError>,
    },
}
