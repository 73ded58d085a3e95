//! Balanced partitioning of shuffled records into teams.

use crate::error::RosterError;
use crate::roster::Record;
use crate::roster::Team;
use crate::roster::TeamMember;
use tracing::debug;

/// Ordered custom team names parsed from a comma-separated list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeamNames {
    names: Vec<String>,
}

impl TeamNames {
    /// Splits on commas, trims each piece and drops empty pieces.
    /// Position `i` of the result names team `i`.
    pub fn parse(names: Option<&str>) -> Self {
        let names = names
            .map(|names| {
                names.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        TeamNames { names }
    }

    /// Custom name at `index`, or `Team {index + 1}`
    pub fn name_for(&self, index: usize) -> String {
        self.names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Team {}", index + 1))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Size of each of `team_count` teams for `total` records.
///
/// Greedy ceiling division over what is left: earlier teams take the larger
/// size when `total` is not a multiple of `team_count`.
pub fn team_sizes(total: usize, team_count: usize) -> Vec<usize> {
    let mut consumed = 0usize;
    (0..team_count)
        .map(|index| {
            let remaining_members = total - consumed;
            let remaining_teams = team_count - index;
            let size = remaining_members.div_ceil(remaining_teams);
            consumed += size;
            size
        })
        .collect()
}

/// Deals `records` into `team_count` contiguous, near-equal teams.
///
/// Every record ends up in exactly one team, tagged with its 1-based team index
/// and team name. Trailing teams are empty when there are more teams than records.
pub fn partition(records: Vec<Record>, team_count: usize, names: &TeamNames) -> Result<Vec<Team>, RosterError> {
    if team_count == 0 {
        Err(RosterError::InvalidInput("Must have at least 1 team to partition into.".to_owned()))?
    }

    let sizes = team_sizes(records.len(), team_count);
    let mut records = records.into_iter();
    let teams: Vec<Team> = sizes
        .into_iter()
        .enumerate()
        .map(|(index, size)| {
            let name = names.name_for(index);
            let members = records
                .by_ref()
                .take(size)
                .map(|record| TeamMember {
                    record,
                    team_index: index + 1,
                    team_name: name.clone(),
                })
                .collect();
            Team { index, name, members }
        })
        .collect();

    let empty = teams.iter().filter(|team| team.is_empty()).count();
    if empty > 0 {
        debug!(empty, team_count, "more teams than records, trailing teams left empty");
    }
    Ok(teams)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::CellValue;

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|id| Record::new(vec![("Id".to_owned(), CellValue::Number(id as f64))]))
            .collect()
    }

    fn ids(team: &Team) -> Vec<f64> {
        team.members
            .iter()
            .map(|member| match member.record.get("Id") {
                Some(CellValue::Number(id)) => *id,
                other => panic!("unexpected id {:?}", other),
            })
            .collect()
    }

    #[test]
    fn seven_records_three_teams() {
        let teams = partition(records(7), 3, &TeamNames::default()).unwrap();
        let sizes: Vec<usize> = teams.iter().map(Team::len).collect();
        assert_eq!(sizes, vec![3, 2, 2]);
        assert_eq!(ids(&teams[0]), vec![0.0, 1.0, 2.0]);
        assert_eq!(ids(&teams[1]), vec![3.0, 4.0]);
        assert_eq!(ids(&teams[2]), vec![5.0, 6.0]);
        for team in &teams {
            for member in &team.members {
                assert_eq!(member.team_index, team.index + 1);
                assert_eq!(member.team_name, format!("Team {}", team.index + 1));
            }
        }
    }

    #[test]
    fn sizes_are_balanced_larger_first() {
        for total in 0..40 {
            for team_count in 2..12 {
                let sizes = team_sizes(total, team_count);
                let floor = total / team_count;
                let ceil = total.div_ceil(team_count);
                assert_eq!(sizes.len(), team_count);
                assert_eq!(sizes.iter().sum::<usize>(), total);
                assert!(sizes.iter().all(|size| *size == floor || *size == ceil));
                let larger = total % team_count;
                if larger != 0 {
                    assert!(sizes[..larger].iter().all(|size| *size == ceil));
                    assert!(sizes[larger..].iter().all(|size| *size == floor));
                }
            }
        }
    }

    #[test]
    fn every_record_lands_in_one_team() {
        let teams = partition(records(23), 5, &TeamNames::default()).unwrap();
        let mut all: Vec<f64> = teams.iter().flat_map(ids).collect();
        all.sort_by(f64::total_cmp);
        let expected: Vec<f64> = (0..23).map(|id| id as f64).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn more_teams_than_records() {
        let teams = partition(records(2), 4, &TeamNames::default()).unwrap();
        let sizes: Vec<usize> = teams.iter().map(Team::len).collect();
        assert_eq!(sizes, vec![1, 1, 0, 0]);
        assert_eq!(teams[3].name, "Team 4");
    }

    #[test]
    fn custom_names_fall_back() {
        let names = TeamNames::parse(Some("Red, Blue"));
        let teams = partition(records(6), 3, &names).unwrap();
        let team_names: Vec<&str> = teams.iter().map(|team| team.name.as_str()).collect();
        assert_eq!(team_names, vec!["Red", "Blue", "Team 3"]);
        assert_eq!(teams[0].members[0].team_name, "Red");
    }

    #[test]
    fn parse_team_names() {
        assert!(TeamNames::parse(None).is_empty());
        assert!(TeamNames::parse(Some(" , ,")).is_empty());
        let names = TeamNames::parse(Some(" Alpha ,, Beta,"));
        assert_eq!(names.len(), 2);
        assert_eq!(names.name_for(0), "Alpha");
        assert_eq!(names.name_for(1), "Beta");
        assert_eq!(names.name_for(2), "Team 3");
    }

    #[test]
    fn zero_teams_rejected() {
        assert!(matches!(
            partition(records(3), 0, &TeamNames::default()),
            Err(RosterError::InvalidInput(_))
        ));
    }
}
