//! C12 dimension tables: which channels feed which of the six
//! community-health dimensions, and with what weight.

use crate::models::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Activity,
    Contributors,
    Responsiveness,
    Quality,
    Risk,
    CommunityInterest,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Activity,
        Dimension::Contributors,
        Dimension::Responsiveness,
        Dimension::Quality,
        Dimension::Risk,
        Dimension::CommunityInterest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Activity => "Activity",
            Dimension::Contributors => "Contributors",
            Dimension::Responsiveness => "Responsiveness",
            Dimension::Quality => "Quality",
            Dimension::Risk => "Risk",
            Dimension::CommunityInterest => "CommunityInterest",
        }
    }

    /// Channels feeding this dimension with their weight. "Code-churn
    /// proxies when present" for Quality has no channel counterpart
    /// among the pinned 16, so Quality is driven solely by
    /// `ChangeRequestReviews` here.
    pub fn channel_weights(&self) -> &'static [(Channel, f64)] {
        match self {
            Dimension::Activity => &[
                (Channel::OpenRank, 1.5),
                (Channel::Activity, 1.5),
                (Channel::ChangeRequests, 1.0),
                (Channel::AcceptedChangeRequests, 1.0),
                (Channel::NewIssues, 1.0),
            ],
            Dimension::Contributors => &[
                (Channel::Participants, 1.3),
                (Channel::Contributors, 1.3),
                (Channel::NewContributors, 1.0),
            ],
            Dimension::Responsiveness => {
                &[(Channel::ClosedIssues, 1.0), (Channel::IssueComments, 1.0)]
            }
            Dimension::Quality => &[(Channel::ChangeRequestReviews, 1.0)],
            Dimension::Risk => &[(Channel::BusFactor, 1.0)],
            Dimension::CommunityInterest => &[(Channel::Stars, 1.0), (Channel::Forks, 1.0)],
        }
    }

    /// `c` for IQR outlier bounds in window aggregation: 2.0 for
    /// `Activity` (intrinsically more volatile), 1.5 elsewhere.
    pub fn iqr_c(&self) -> f64 {
        match self {
            Dimension::Activity => 2.0,
            _ => 1.5,
        }
    }
}

/// "Growth-type" channels substitute `max(current, mean of last 3 months)`
/// before ranking, to prevent transient dips from penalizing long-lived
/// projects.
pub fn is_growth_type(channel: Channel) -> bool {
    matches!(
        channel,
        Channel::Stars | Channel::Forks | Channel::Contributors | Channel::NewContributors
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dimension_has_at_least_one_channel() {
        for dim in Dimension::ALL {
            assert!(!dim.channel_weights().is_empty(), "{} has no channels", dim.as_str());
        }
    }

    #[test]
    fn activity_uses_wider_iqr_band() {
        assert_eq!(Dimension::Activity.iqr_c(), 2.0);
        assert_eq!(Dimension::Risk.iqr_c(), 1.5);
    }
}
