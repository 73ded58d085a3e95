//! Serializes the generated workbooks and packs the per-team files into one archive.

use crate::error::RosterError;
use crate::helpers::zip::Compression;
use crate::helpers::zip::ZipBuilder;
use crate::workbook::builder::TeamWorkbooks;
use crate::workbook::writer::write_xlsx;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Extension of every generated workbook file
pub const WORKBOOK_EXTENSION: &str = "xlsx";

/// Stem used when a team name has no letters or digits
const DEFAULT_FILE_STEM: &str = "team";

static NON_WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("Hardcode regex pattern"));

/// One serialized file with its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackagedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// All bytes produced for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Package {
    /// Workbook with one sheet per team
    pub combined: Vec<u8>,
    /// Zip archive holding every file of `teams`
    pub archive: Vec<u8>,
    /// Per-team workbooks, named as their archive entries
    pub teams: Vec<PackagedFile>,
}

/// Replaces every run of characters other than ASCII letters and digits with a
/// single `_`. Underscores count as separators too, so `a__b` becomes `a_b`.
pub fn sanitize_file_stem(name: &str) -> String {
    NON_WORD_RUN.replace_all(name, "_").into_owned()
}

/// Archive entry names for `team_names`, in order: sanitized stems plus `.xlsx`,
/// with `_2`, `_3`, ... appended to stems already taken. Empty stems become `team`.
/// Names in `reserved` count as taken but are not returned.
pub fn entry_names<'a>(team_names: impl IntoIterator<Item = &'a str>, reserved: &[&str]) -> Vec<String> {
    let mut names: Vec<String> = reserved.iter().map(|name| name.to_string()).collect();
    for team_name in team_names {
        let stem = sanitize_file_stem(team_name);
        let stem = if stem.is_empty() { DEFAULT_FILE_STEM.to_owned() } else { stem };
        let is_taken = |candidate: &str| names.iter().any(|name| name.eq_ignore_ascii_case(candidate));
        let mut name = format!("{}.{}", stem, WORKBOOK_EXTENSION);
        let mut counter = 2usize;
        while is_taken(&name) {
            name = format!("{}_{}.{}", stem, counter, WORKBOOK_EXTENSION);
            counter += 1;
        }
        names.push(name);
    }
    names.split_off(reserved.len())
}

/// Serializes every workbook and builds the archive. Per-team files never take a
/// name listed in `reserved`, so they can sit next to the combined files.
/// Any failure here is reported as `Serialization`.
pub fn package(workbooks: &TeamWorkbooks, compression: Compression, reserved: &[&str]) -> Result<Package, RosterError> {
    build_package(workbooks, compression, reserved).map_err(RosterError::into_serialization)
}

fn build_package(workbooks: &TeamWorkbooks, compression: Compression, reserved: &[&str]) -> Result<Package, RosterError> {
    let combined = write_xlsx(&workbooks.combined, compression)?;

    let names = entry_names(workbooks.teams.iter().map(|(team_name, _)| team_name.as_str()), reserved);
    let mut archive = ZipBuilder::new(compression);
    let mut teams = Vec::with_capacity(workbooks.teams.len());
    for (name, (_, workbook)) in names.into_iter().zip(&workbooks.teams) {
        let bytes = write_xlsx(workbook, compression)?;
        archive.add(&name, &bytes)?;
        teams.push(PackagedFile { name, bytes });
    }
    let archive = archive.finish()?;

    debug!(
        combined = combined.len(),
        archive = archive.len(),
        files = teams.len(),
        "packaged workbooks"
    );
    Ok(Package { combined, archive, teams })
}
