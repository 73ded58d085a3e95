//! Builds the combined workbook and the per-team workbooks from partitioned teams.

use crate::roster::CellValue;
use crate::roster::Team;
use crate::workbook::Workbook;
use tracing::debug;

/// Workbooks generated for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct TeamWorkbooks {
    /// One sheet per non-empty team, in team order
    pub combined: Workbook,
    /// One single-sheet workbook per non-empty team, paired with the team name
    pub teams: Vec<(String, Workbook)>,
}

/// Builds workbooks for every non-empty team; empty teams produce nothing.
pub fn build_workbooks(teams: &[Team]) -> TeamWorkbooks {
    let mut combined = Workbook::new();
    let mut individual = Vec::with_capacity(teams.len());
    for team in teams {
        if team.is_empty() {
            debug!(team = %team.name, "skipping empty team");
            continue;
        }
        let (columns, rows) = team_table(team);
        combined.add_sheet(&team.name, columns.clone(), rows.clone());

        let mut workbook = Workbook::new();
        workbook.add_sheet(&team.name, columns, rows);
        individual.push((team.name.to_owned(), workbook));
    }
    TeamWorkbooks { combined, teams: individual }
}

/// Header and rows of a team's sheet, in member order.
fn team_table(team: &Team) -> (Vec<String>, Vec<Vec<CellValue>>) {
    let columns = team.columns();
    let rows = team.members
        .iter()
        .map(|member| {
            columns.iter()
                .map(|column| member.get(column).unwrap_or_default())
                .collect()
        })
        .collect();
    (columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::partition::partition;
    use crate::roster::partition::TeamNames;
    use crate::roster::Record;

    fn records(names: &[&str]) -> Vec<Record> {
        names.iter()
            .map(|name| Record::new(vec![
                ("Name".to_owned(), CellValue::from(*name)),
                ("Email".to_owned(), CellValue::Empty),
            ]))
            .collect()
    }

    #[test]
    fn one_sheet_per_non_empty_team() {
        let teams = partition(records(&["Ada", "Grace", "Linus"]), 4, &TeamNames::parse(Some("Red, Blue"))).unwrap();
        let workbooks = build_workbooks(&teams);

        let names: Vec<&str> = workbooks.combined.sheets().iter().map(|sheet| sheet.name.as_str()).collect();
        assert_eq!(names, vec!["Red", "Blue", "Team 3"]);
        assert_eq!(workbooks.teams.len(), 3);
        assert!(workbooks.teams.iter().all(|(_, workbook)| workbook.sheets().len() == 1));

        let sheet = &workbooks.combined.sheets()[1];
        assert_eq!(sheet.columns, vec!["Name", "Email", "TeamIndex", "TeamName"]);
        assert_eq!(
            sheet.rows,
            vec![vec![CellValue::from("Grace"), CellValue::Empty, CellValue::Number(2.0), CellValue::from("Blue")]]
        );
        assert_eq!(workbooks.teams[1].1.sheets()[0], *sheet);
    }

    #[test]
    fn duplicate_team_names_stay_distinct_in_combined() {
        let teams = partition(records(&["a", "b"]), 2, &TeamNames::parse(Some("Same, same"))).unwrap();
        let workbooks = build_workbooks(&teams);
        let names: Vec<&str> = workbooks.combined.sheets().iter().map(|sheet| sheet.name.as_str()).collect();
        assert_eq!(names, vec!["Same", "same (2)"]);
        assert_eq!(workbooks.teams[1].1.sheets()[0].name, "same");
    }
}
