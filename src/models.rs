//! Shared data model for the crawl → normalize → encode → predict / score
//! pipeline: month axis arithmetic, the 16 canonical channels, the monthly
//! panel and text corpus, and the record types that cross subsystem
//! boundaries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar month, `YYYY-MM`. Ordered, displayable, and arithmetic over
/// whole months so axis checks and window splits never touch raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        assert!((1..=12).contains(&month), "month out of range: {month}");
        Self { year, month }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month immediately following this one.
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    /// The month immediately preceding this one.
    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    /// Number of whole months from `self` to `other` (may be negative).
    pub fn months_between(&self, other: &Self) -> i64 {
        (other.year as i64 - self.year as i64) * 12 + (other.month as i64 - self.month as i64)
    }

    /// The contiguous, gap-free sequence from `self` to `other` inclusive.
    pub fn axis_to(&self, other: &Self) -> Vec<MonthKey> {
        let n = self.months_between(other);
        if n < 0 {
            return Vec::new();
        }
        let mut cur = *self;
        let mut out = Vec::with_capacity(n as usize + 1);
        for _ in 0..=n {
            out.push(cur);
            cur = cur.succ();
        }
        out
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid month key: {s:?}"))?;
        let year: i32 = y.parse().map_err(|_| format!("invalid year in {s:?}"))?;
        let month: u32 = m.parse().map_err(|_| format!("invalid month in {s:?}"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in {s:?}"));
        }
        Ok(MonthKey::new(year, month))
    }
}

impl TryFrom<String> for MonthKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

/// The 16 canonical metrics, in contract order. Reordering or renaming a
/// variant is a breaking change to the forecaster's fixed-width vector and
/// to every persisted `panel.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    OpenRank,
    Activity,
    Stars,
    Forks,
    Attention,
    Participants,
    NewContributors,
    Contributors,
    InactiveContributors,
    BusFactor,
    NewIssues,
    ClosedIssues,
    IssueComments,
    ChangeRequests,
    AcceptedChangeRequests,
    ChangeRequestReviews,
}

impl Channel {
    pub const ALL: [Channel; 16] = [
        Channel::OpenRank,
        Channel::Activity,
        Channel::Stars,
        Channel::Forks,
        Channel::Attention,
        Channel::Participants,
        Channel::NewContributors,
        Channel::Contributors,
        Channel::InactiveContributors,
        Channel::BusFactor,
        Channel::NewIssues,
        Channel::ClosedIssues,
        Channel::IssueComments,
        Channel::ChangeRequests,
        Channel::AcceptedChangeRequests,
        Channel::ChangeRequestReviews,
    ];

    pub const COUNT: usize = Channel::ALL.len();

    pub fn as_index(&self) -> usize {
        Channel::ALL.iter().position(|c| c == self).expect("Channel::ALL is exhaustive")
    }

    pub fn from_index(idx: usize) -> Option<Channel> {
        Channel::ALL.get(idx).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::OpenRank => "OpenRank",
            Channel::Activity => "Activity",
            Channel::Stars => "Stars",
            Channel::Forks => "Forks",
            Channel::Attention => "Attention",
            Channel::Participants => "Participants",
            Channel::NewContributors => "NewContributors",
            Channel::Contributors => "Contributors",
            Channel::InactiveContributors => "InactiveContributors",
            Channel::BusFactor => "BusFactor",
            Channel::NewIssues => "NewIssues",
            Channel::ClosedIssues => "ClosedIssues",
            Channel::IssueComments => "IssueComments",
            Channel::ChangeRequests => "ChangeRequests",
            Channel::AcceptedChangeRequests => "AcceptedChangeRequests",
            Channel::ChangeRequestReviews => "ChangeRequestReviews",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-repository month → channel → value table. Absence is distinct from
/// zero: a missing cell is `None`, never coerced to `0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyPanel {
    pub axis: Vec<MonthKey>,
    /// One entry per `Channel`; `channels[c.as_index()][i]` aligns with
    /// `axis[i]`.
    pub channels: BTreeMap<String, Vec<Option<f64>>>,
}

impl MonthlyPanel {
    pub fn new(axis: Vec<MonthKey>) -> Self {
        let mut channels = BTreeMap::new();
        for c in Channel::ALL {
            channels.insert(c.as_str().to_string(), vec![None; axis.len()]);
        }
        Self { axis, channels }
    }

    pub fn len(&self) -> usize {
        self.axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    /// Gap-free axis invariant: consecutive months differ by exactly one.
    pub fn is_gap_free(&self) -> bool {
        self.axis.windows(2).all(|w| w[0].months_between(&w[1]) == 1)
    }

    pub fn channel_series(&self, channel: Channel) -> Vec<Option<f64>> {
        self.channels
            .get(channel.as_str())
            .cloned()
            .unwrap_or_else(|| vec![None; self.axis.len()])
    }

    pub fn set(&mut self, channel: Channel, index: usize, value: Option<f64>) {
        let series = self
            .channels
            .entry(channel.as_str().to_string())
            .or_insert_with(|| vec![None; self.axis.len()]);
        if index >= series.len() {
            series.resize(index + 1, None);
        }
        series[index] = value;
    }

    pub fn axis(&self) -> &[MonthKey] {
        &self.axis
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub message: String,
    pub author_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub top_comments: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub comments_count: u64,
    #[serde(default)]
    pub reactions_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub name: String,
    pub body: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MonthlyText {
    #[serde(default)]
    pub commits: Vec<CommitRecord>,
    #[serde(default)]
    pub issues: Vec<IssueRecord>,
    #[serde(default)]
    pub releases: Vec<ReleaseRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticDocs {
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub docs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TextCorpus {
    #[serde(rename = "static")]
    pub static_docs: StaticDocs,
    pub monthly: BTreeMap<MonthKey, MonthlyText>,
}

impl TextCorpus {
    /// Flattens a month's text into a single string for encoding; returns
    /// `None` if the month has nothing to contribute beyond static docs.
    pub fn flatten_month(&self, month: &MonthKey) -> Option<String> {
        let monthly = self.monthly.get(month)?;
        let mut buf = String::new();
        for c in &monthly.commits {
            buf.push_str(&c.message);
            buf.push(' ');
        }
        for i in &monthly.issues {
            buf.push_str(&i.title);
            buf.push(' ');
            buf.push_str(&i.body);
            buf.push(' ');
            for tc in &i.top_comments {
                buf.push_str(tc);
                buf.push(' ');
            }
        }
        for r in &monthly.releases {
            buf.push_str(&r.name);
            buf.push(' ');
            buf.push_str(&r.body);
            buf.push(' ');
        }
        if buf.trim().is_empty() {
            None
        } else {
            Some(buf)
        }
    }
}

/// Ranking statistic for `HeatSelector`; never persisted as a model
/// feature.
#[derive(Debug, Clone, Copy)]
pub struct HeatScore {
    pub comments_count: u64,
    pub reactions_count: u64,
}

impl HeatScore {
    pub fn value(&self) -> u64 {
        self.comments_count + self.reactions_count
    }
}

/// Per-channel mean/std fit over a repository's training window only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub per_channel: BTreeMap<String, ChannelStats>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64,
}

/// A training tuple: standardized history, the text valid as of the
/// history's last month, and the standardized target.
#[derive(Debug, Clone)]
pub struct Sample {
    pub hist: Vec<Vec<f64>>,
    pub hist_mask: Vec<Vec<bool>>,
    pub text: Option<String>,
    pub target: Vec<Vec<f64>>,
    pub hist_axis: Vec<MonthKey>,
    pub target_axis: Vec<MonthKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub horizon_months: usize,
    pub predictions: BTreeMap<String, BTreeMap<String, f64>>,
    pub confidence: f64,
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub per_month: BTreeMap<String, BTreeMap<String, f64>>,
    pub aggregate: BTreeMap<String, f64>,
    pub overall: f64,
    pub months_evaluated: usize,
    pub outliers_attenuated: BTreeMap<String, usize>,
    pub data_quality_fraction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_key_arithmetic() {
        let m = MonthKey::new(2023, 11);
        assert_eq!(m.succ(), MonthKey::new(2023, 12));
        assert_eq!(m.succ().succ(), MonthKey::new(2024, 1));
        assert_eq!(m.pred(), MonthKey::new(2023, 10));
        assert_eq!(MonthKey::new(2023, 1).pred(), MonthKey::new(2022, 12));
    }

    #[test]
    fn month_key_display_and_parse_round_trip() {
        let m = MonthKey::new(2023, 5);
        assert_eq!(m.to_string(), "2023-05");
        assert_eq!("2023-05".parse::<MonthKey>().unwrap(), m);
    }

    #[test]
    fn months_between_and_axis_to() {
        let a = MonthKey::new(2023, 1);
        let b = MonthKey::new(2023, 4);
        assert_eq!(a.months_between(&b), 3);
        assert_eq!(a.axis_to(&b).len(), 4);
    }

    #[test]
    fn channel_index_round_trip() {
        for c in Channel::ALL {
            assert_eq!(Channel::from_index(c.as_index()), Some(c));
        }
    }

    #[test]
    fn channel_order_is_pinned() {
        assert_eq!(Channel::ALL[0], Channel::OpenRank);
        assert_eq!(Channel::ALL[15], Channel::ChangeRequestReviews);
    }

    #[test]
    fn panel_gap_free_detection() {
        let axis = vec![MonthKey::new(2023, 1), MonthKey::new(2023, 2), MonthKey::new(2023, 3)];
        let p = MonthlyPanel::new(axis);
        assert!(p.is_gap_free());

        let axis_gap = vec![MonthKey::new(2023, 1), MonthKey::new(2023, 3)];
        let p2 = MonthlyPanel::new(axis_gap);
        assert!(!p2.is_gap_free());
    }
}
