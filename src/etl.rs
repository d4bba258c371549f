pub mod extract;
pub mod load;
pub mod transform;

use jiff::Zoned;
use log::{info, warn};

use self::extract::DataSource;
use self::load::{load_data, TableSink};
use self::transform::transform_data;

/// How a single pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    AbortedAtExtract,
    AbortedAtTransform,
    LoadFailed,
    Loaded(usize),
}

/// Extract, transform and load once.  Stops early if a stage produced no
/// data.  Never fails, everything is logged.
pub fn run_etl_pipeline(
    source: &dyn DataSource,
    sink: &dyn TableSink,
    table_name: &str,
) -> RunOutcome {
    info!("ETL pipeline started at {}", Zoned::now().strftime("%a %b %e %T %Y"));

    let Some(raw_data) = source.extract() else {
        warn!("ETL pipeline aborted due to extraction errors.");
        return RunOutcome::AbortedAtExtract;
    };

    let Some(transformed_data) = transform_data(Some(raw_data)) else {
        warn!("ETL pipeline aborted due to transformation errors.");
        return RunOutcome::AbortedAtTransform;
    };

    let outcome = match load_data(Some(&transformed_data), sink, table_name) {
        Some(n) => RunOutcome::Loaded(n),
        None => RunOutcome::LoadFailed,
    };

    info!("ETL pipeline finished at {}", Zoned::now().strftime("%a %b %e %T %Y"));
    outcome
}
