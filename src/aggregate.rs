//! Derived statistics over a record set: per-project efficiency, designer
//! details, team ranking and the dashboard headline numbers.
//!
//! Everything here reads the canonical field names produced by the parser,
//! so callers never need to look up more than one spelling of a column.

use crate::record::{
    ACTUAL_HOURS, BENCHMARK_HOURS, DESIGNER_NAME, END_DATE, Record, START_DATE, TEAM_NAME,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;

/// Teams shown in the ranking.
pub const TEAM_RANKING_LIMIT: usize = 15;
/// Teams shown in the actual vs benchmark hours comparison.
pub const TEAM_HOURS_LIMIT: usize = 8;

const UNKNOWN: &str = "Unknown";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse the timestamp formats seen in the start/end columns.
///
/// Offsets in RFC 3339 input are dropped; the wall-clock time is kept.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| parse_date(s).map(|d| d.and_time(NaiveTime::MIN)))
}

/// Parse a calendar date (`2024-03-01`, `03/01/2024`, `2024/03/01`).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

/// `actual / benchmark * 100`, or zero when there is no benchmark.
pub fn efficiency(actual_hours: f64, benchmark_hours: f64) -> f64 {
    if benchmark_hours > 0.0 {
        actual_hours / benchmark_hours * 100.0
    } else {
        0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BudgetStatus {
    #[serde(rename = "On Track")]
    OnTrack,
    #[serde(rename = "Over Budget")]
    OverBudget,
}

impl BudgetStatus {
    pub fn classify(efficiency: f64) -> Self {
        if efficiency <= 100.0 {
            BudgetStatus::OnTrack
        } else {
            BudgetStatus::OverBudget
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BudgetStatus::OnTrack => "On Track",
            BudgetStatus::OverBudget => "Over Budget",
        }
    }
}

/// Typed view over the well-known columns of a record.
#[derive(Clone, Copy, Debug)]
pub struct Project<'a>(pub &'a Record);

impl<'a> Project<'a> {
    pub fn designer(&self) -> Option<String> {
        self.0.text(DESIGNER_NAME)
    }

    pub fn team(&self) -> Option<String> {
        self.0.text(TEAM_NAME)
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.0.text(START_DATE).as_deref().and_then(parse_timestamp)
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.0.text(END_DATE).as_deref().and_then(parse_timestamp)
    }

    pub fn actual_hours(&self) -> f64 {
        self.0.number_or_zero(ACTUAL_HOURS)
    }

    pub fn benchmark_hours(&self) -> f64 {
        self.0.number_or_zero(BENCHMARK_HOURS)
    }

    pub fn efficiency(&self) -> f64 {
        efficiency(self.actual_hours(), self.benchmark_hours())
    }

    pub fn status(&self) -> BudgetStatus {
        BudgetStatus::classify(self.efficiency())
    }
}

/// Dashboard filters. Unset fields do not filter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectFilter {
    /// Case-insensitive substring of the designer name.
    pub designer: Option<String>,
    /// Projects starting on or after this day.
    pub start: Option<NaiveDate>,
    /// Projects ending on or before this day.
    pub end: Option<NaiveDate>,
    /// Case-insensitive substring of designer or team.
    pub search: Option<String>,
}

impl ProjectFilter {
    pub fn is_empty(&self) -> bool {
        self.designer.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.search.is_none()
    }

    pub fn matches(&self, record: &Record) -> bool {
        let project = Project(record);
        let designer = project.designer().unwrap_or_default().to_lowercase();

        if let Some(wanted) = &self.designer {
            if !designer.contains(&wanted.to_lowercase()) {
                return false;
            }
        }
        if let Some(from) = self.start {
            match project.start() {
                Some(start) if start.date() >= from => {}
                _ => return false,
            }
        }
        if let Some(until) = self.end {
            match project.end() {
                Some(end) if end.date() <= until => {}
                _ => return false,
            }
        }
        if let Some(query) = &self.search {
            let query = query.to_lowercase();
            let team = project.team().unwrap_or_default().to_lowercase();
            if !designer.contains(&query) && !team.contains(&query) {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStats {
    pub name: String,
    /// `total benchmark / total actual * 100`
    pub efficiency: f64,
    pub actual_hours: f64,
    pub benchmark_hours: f64,
    pub projects: usize,
}

// Per-team sums in first-seen order. Records without a team count under
// "Unknown".
fn team_totals(records: &[&Record]) -> Vec<TeamStats> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, (f64, f64, usize)> = HashMap::new();
    for record in records {
        let project = Project(*record);
        let team = project.team().unwrap_or_else(|| UNKNOWN.to_string());
        let entry = totals.entry(team.clone()).or_insert_with(|| {
            order.push(team);
            (0.0, 0.0, 0)
        });
        entry.0 += project.actual_hours();
        entry.1 += project.benchmark_hours();
        entry.2 += 1;
    }

    order
        .into_iter()
        .filter_map(|name| {
            let (actual, benchmark, projects) = totals.get(&name).copied()?;
            let efficiency = if actual > 0.0 {
                benchmark / actual * 100.0
            } else {
                0.0
            };
            Some(TeamStats {
                name,
                efficiency,
                actual_hours: actual,
                benchmark_hours: benchmark,
                projects,
            })
        })
        .collect()
}

/// Teams ordered by efficiency, best first, limited to
/// [`TEAM_RANKING_LIMIT`]. Teams without a name or with no positive
/// efficiency are left out.
pub fn team_ranking(records: &[&Record]) -> Vec<TeamStats> {
    let mut ranking: Vec<TeamStats> = team_totals(records)
        .into_iter()
        .filter(|team| team.name != UNKNOWN && team.efficiency > 0.0)
        .collect();
    ranking.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency));
    ranking.truncate(TEAM_RANKING_LIMIT);
    ranking
}

/// Short display form of a designer identity: `jane.doe@corp.com` becomes
/// `Jane`; anything that is not an e-mail address is returned unchanged.
pub fn display_name(designer: &str) -> String {
    if designer == UNKNOWN || !designer.contains('@') {
        return designer.to_string();
    }
    let local = designer.split('@').next().unwrap_or_default();
    let first = local.split('.').next().unwrap_or_default();
    let mut chars = first.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => designer.to_string(),
    }
}

/// Designer with the most projects; ties go to the one seen first.
pub fn top_performer(records: &[&Record]) -> Option<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records {
        let designer = Project(*record)
            .designer()
            .unwrap_or_else(|| UNKNOWN.to_string());
        *counts.entry(designer.clone()).or_insert_with(|| {
            order.push(designer);
            0
        }) += 1;
    }

    let mut best: Option<(&String, usize)> = None;
    for name in &order {
        let count = counts[name];
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| display_name(name))
}

/// Distinct designer names in first-seen order.
pub fn unique_designers(records: &[&Record]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for record in records {
        if let Some(designer) = Project(*record).designer() {
            if !seen.contains(&designer) {
                seen.push(designer);
            }
        }
    }
    seen
}

/// Teams with the most booked hours first, limited to [`TEAM_HOURS_LIMIT`].
/// Unlike the ranking, every team is kept, including "Unknown".
pub fn team_hours(records: &[&Record]) -> Vec<TeamStats> {
    let mut teams = team_totals(records);
    teams.sort_by(|a, b| b.actual_hours.total_cmp(&a.actual_hours));
    teams.truncate(TEAM_HOURS_LIMIT);
    teams
}

/// Booked hours split by budget status. Projects without a benchmark are
/// not counted on either side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursDistribution {
    pub on_track_hours: f64,
    pub over_budget_hours: f64,
}

pub fn hours_distribution(records: &[&Record]) -> HoursDistribution {
    let mut dist = HoursDistribution::default();
    for record in records {
        let project = Project(*record);
        if project.benchmark_hours() <= 0.0 {
            continue;
        }
        match project.status() {
            BudgetStatus::OnTrack => dist.on_track_hours += project.actual_hours(),
            BudgetStatus::OverBudget => dist.over_budget_hours += project.actual_hours(),
        }
    }
    dist
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_projects: usize,
    pub total_designers: usize,
    pub top_performer: Option<String>,
    pub completed_today: usize,
    pub designers: Vec<String>,
    pub teams: Vec<TeamStats>,
    pub best_team: Option<TeamStats>,
    pub average_team_efficiency: f64,
    pub ranked_team_projects: usize,
    pub ranked_team_hours: f64,
    pub hours_distribution: HoursDistribution,
    pub team_hours: Vec<TeamStats>,
}

/// Headline numbers for a (possibly filtered) record set. `today` decides
/// which projects count as completed today.
pub fn summarize(records: &[&Record], today: NaiveDate) -> DashboardSummary {
    let designers = unique_designers(records);
    let teams = team_ranking(records);
    let average_team_efficiency = if teams.is_empty() {
        0.0
    } else {
        teams.iter().map(|t| t.efficiency).sum::<f64>() / teams.len() as f64
    };
    let completed_today = records
        .iter()
        .filter(|r| Project(**r).end().is_some_and(|end| end.date() == today))
        .count();

    DashboardSummary {
        total_projects: records.len(),
        total_designers: designers.len(),
        top_performer: top_performer(records),
        completed_today,
        best_team: teams.first().cloned(),
        average_team_efficiency,
        ranked_team_projects: teams.iter().map(|t| t.projects).sum(),
        ranked_team_hours: teams.iter().map(|t| t.actual_hours).sum(),
        hours_distribution: hours_distribution(records),
        team_hours: team_hours(records),
        designers,
        teams,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignerProject {
    pub team: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub actual_hours: f64,
    pub benchmark_hours: f64,
    pub efficiency: f64,
    pub status: BudgetStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamCount {
    pub name: String,
    pub value: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignerStats {
    pub designer: String,
    pub total_projects: usize,
    pub on_track: usize,
    pub over_budget: usize,
    /// Mean of the per-project efficiencies.
    pub efficiency: f64,
    pub teams: Vec<TeamCount>,
    pub projects: Vec<DesignerProject>,
}

/// Per-designer breakdown. Matches the designer name exactly; `None` when
/// the designer has no projects.
pub fn designer_stats(records: &[Record], designer: &str) -> Option<DesignerStats> {
    let mine: Vec<Project<'_>> = records
        .iter()
        .map(Project)
        .filter(|p| p.designer().as_deref() == Some(designer))
        .collect();
    if mine.is_empty() {
        return None;
    }

    let mut teams: Vec<TeamCount> = Vec::new();
    let mut projects = Vec::with_capacity(mine.len());
    for project in &mine {
        let team = project.team();
        let team_name = team.clone().unwrap_or_else(|| UNKNOWN.to_string());
        match teams.iter_mut().find(|t| t.name == team_name) {
            Some(t) => t.value += 1,
            None => teams.push(TeamCount {
                name: team_name,
                value: 1,
            }),
        }
        projects.push(DesignerProject {
            team,
            start: project.0.text(START_DATE),
            end: project.0.text(END_DATE),
            actual_hours: project.actual_hours(),
            benchmark_hours: project.benchmark_hours(),
            efficiency: project.efficiency(),
            status: project.status(),
        });
    }

    let on_track = projects
        .iter()
        .filter(|p| p.status == BudgetStatus::OnTrack)
        .count();
    let total = projects.len();
    let efficiency = projects.iter().map(|p| p.efficiency).sum::<f64>() / total as f64;

    Some(DesignerStats {
        designer: designer.to_string(),
        total_projects: total,
        on_track,
        over_budget: total - on_track,
        efficiency,
        teams,
        projects,
    })
}
