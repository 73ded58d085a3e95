//! The single entry point tying extraction, shuffling, partitioning, workbook
//! generation, packaging and delivery together.

use crate::config::GeneratorConfig;
use crate::error::Failure;
use crate::error::RosterError;
use crate::package::package;
use crate::roster::extract::extract_records;
use crate::roster::partition::partition;
use crate::roster::partition::TeamNames;
use crate::roster::shuffle::shuffle;
use crate::spreadsheet::SourceFormat;
use crate::transport::deliver;
use crate::transport::new_run_id;
use crate::transport::TeamsResult;
use crate::workbook::builder::build_workbooks;
use rand::Rng;
use tracing::debug;
use tracing::info;
use tracing::instrument;

pub const FILE_REQUIRED_MESSAGE: &str = "File is required.";
pub const TOO_FEW_TEAMS_MESSAGE: &str = "Must have at least 2 teams.";

/// One request to split an uploaded roster into teams.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeamRequest {
    pub team_count: usize,
    /// Raw upload
    pub file_bytes: Vec<u8>,
    /// Comma-separated custom team names
    pub team_names: Option<String>,
    /// Container format, sniffed from the bytes when absent
    pub format: Option<SourceFormat>,
}

/// Splits the uploaded roster into `team_count` random, balanced teams and
/// returns the generated workbooks and archive.
///
/// The request is validated before the file is parsed. Failures carry a
/// caller-facing kind and message; unexpected ones are logged and reported with
/// a generic message.
#[instrument(
    level = "info",
    skip_all,
    fields(team_count = request.team_count, file_len = request.file_bytes.len())
)]
pub fn generate_teams<R: Rng + ?Sized>(
    request: TeamRequest,
    config: &GeneratorConfig,
    rng: &mut R,
) -> Result<TeamsResult, Failure> {
    run(request, config, rng).map_err(Failure::from)
}

/// [`generate_teams`] with the thread-local random source.
pub fn generate_teams_with_thread_rng(request: TeamRequest, config: &GeneratorConfig) -> Result<TeamsResult, Failure> {
    generate_teams(request, config, &mut rand::thread_rng())
}

fn run<R: Rng + ?Sized>(request: TeamRequest, config: &GeneratorConfig, rng: &mut R) -> Result<TeamsResult, RosterError> {
    config.validate()?;
    validate(&request, config)?;

    let records = extract_records(&request.file_bytes, request.format)?;
    let total = records.len();
    debug!(records = total, "extracted records");

    let records = shuffle(records, rng);
    let names = TeamNames::parse(request.team_names.as_deref());
    let teams = partition(records, request.team_count, &names)?;

    let workbooks = build_workbooks(&teams);
    let reserved = [config.combined_file_name.as_str(), config.archive_file_name.as_str()];
    let package = package(&workbooks, config.compression, &reserved)?;

    let run_id = new_run_id(rng);
    let result = deliver(package, run_id, config)?;
    info!(
        run_id = %result.run_id,
        records = total,
        teams = result.teams.len(),
        "generated teams"
    );
    Ok(result)
}

/// The file is checked first so that a missing file is reported even when the team count is also wrong.
fn validate(request: &TeamRequest, config: &GeneratorConfig) -> Result<(), RosterError> {
    if request.file_bytes.is_empty() {
        Err(RosterError::InvalidInput(FILE_REQUIRED_MESSAGE.to_owned()))?
    }
    if request.team_count < 2 {
        Err(RosterError::InvalidInput(TOO_FEW_TEAMS_MESSAGE.to_owned()))?
    }
    if let Some(max_teams) = config.max_teams {
        if request.team_count > max_teams {
            Err(RosterError::InvalidInput(format!("Must have at most {} teams.", max_teams)))?
        }
    }
    Ok(())
}
