//! Match records produced by the calendar and detail scrapers.
//!
//! Every field is optional on the wire: absent values are omitted from the
//! JSON output rather than serialized as `null`.

use serde::{Deserialize, Serialize};

/// Date/time fields shared by summaries and details.
///
/// `time` holds the raw cell text until the normalizer rewrites it to `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_label: Option<String>,
    /// Original label when it carried a weekday prefix ("Sa, 18.05.2024")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_label_long: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime_iso: Option<String>,
}

/// One row of the match calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MatchSummary {
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub age_group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub league: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub home: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub away: String,
    /// Normalized "H:A"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    /// Group id, only set when the row links to a staffel instead of a match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staffel_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,
}

impl MatchSummary {
    /// A row is worth keeping only if it names a team or a match.
    pub fn is_match(&self) -> bool {
        !self.home.is_empty() || !self.away.is_empty() || self.game_id.is_some()
    }
}

/// Everything recoverable from a single match page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MatchDetail {
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spielnummer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staffelnummer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staffel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_2: Option<String>,
}

impl MatchDetail {
    /// True when nothing at all was recovered from the page.
    pub fn is_empty(&self) -> bool {
        *self == MatchDetail::default()
    }

    /// Fill fields the detail page didn't provide from its calendar row
    pub fn fill_from_summary(&mut self, summary: &MatchSummary) {
        fn fill(field: &mut Option<String>, value: &str) {
            if field.is_none() && !value.trim().is_empty() {
                *field = Some(value.to_string());
            }
        }

        fill(&mut self.schedule.date_label, summary.schedule.date_label.as_deref().unwrap_or(""));
        fill(&mut self.schedule.time, summary.schedule.time.as_deref().unwrap_or(""));
        fill(&mut self.age_group, &summary.age_group);
        fill(&mut self.league, &summary.league);
        fill(&mut self.home, &summary.home);
        fill(&mut self.away, &summary.away);
        fill(&mut self.score, summary.score.as_deref().unwrap_or(""));
        fill(&mut self.game_id, summary.game_id.as_deref().unwrap_or(""));
        fill(&mut self.staffel_id, summary.staffel_id.as_deref().unwrap_or(""));
        fill(&mut self.link, &summary.link);
        if self.league_label.is_none() {
            self.league_label = self.competition.clone().or_else(|| self.league.clone());
        }
    }
}

impl From<&MatchSummary> for MatchDetail {
    fn from(summary: &MatchSummary) -> Self {
        let mut detail = MatchDetail::default();
        detail.fill_from_summary(summary);
        detail
    }
}
