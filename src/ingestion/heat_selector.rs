//! C4: deterministic top-K issue selection by heat score, to cap API cost
//! per month.

use crate::models::{HeatScore, IssueRecord};

pub struct HeatSelector {
    pub top_k: usize,
}

impl HeatSelector {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    /// Ranks `issues` by heat score, breaking ties by higher comment count,
    /// then more recent creation, then lexical issue identifier, and keeps
    /// the top `top_k`.
    pub fn select<'a>(&self, issues: &'a [IssueRecord]) -> Vec<&'a IssueRecord> {
        let mut ranked: Vec<&IssueRecord> = issues.iter().collect();
        ranked.sort_by(|a, b| {
            let heat_a = heat(a);
            let heat_b = heat(b);
            heat_b
                .value()
                .cmp(&heat_a.value())
                .then_with(|| b.comments_count.cmp(&a.comments_count))
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(self.top_k);
        ranked
    }
}

fn heat(issue: &IssueRecord) -> HeatScore {
    HeatScore { comments_count: issue.comments_count, reactions_count: issue.reactions_count }
}
