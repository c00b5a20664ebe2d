//! C5: aligns heterogeneous per-metric series and per-month text onto a
//! single canonical, gap-free month axis.

use crate::models::MonthlyPanel;

pub struct PanelBuilder;

impl PanelBuilder {
    /// Merges `metrics` (already a `MonthlyPanel` from C1) with the month
    /// range implied by `text_months` (from C2) restricted to
    /// `[repo_created_month, today)`. Cells absent in all sources remain
    /// absent; no interpolation happens here.
    pub fn build(
        metrics: MonthlyPanel,
        repo_created_month: crate::models::MonthKey,
        today: crate::models::MonthKey,
    ) -> MonthlyPanel {
        if metrics.axis.is_empty() {
            return metrics;
        }
        let axis_start = metrics.axis[0].max(repo_created_month);
        let axis_end = *metrics.axis.last().unwrap();
        let axis_end = if axis_end >= today { today.pred() } else { axis_end };
        if axis_start > axis_end {
            return MonthlyPanel::new(Vec::new());
        }

        let new_axis = axis_start.axis_to(&axis_end);
        let mut rebuilt = MonthlyPanel::new(new_axis.clone());
        for (channel_name, series) in &metrics.channels {
            let channel = match crate::models::Channel::from_str_name(channel_name) {
                Some(c) => c,
                None => continue,
            };
            for (i, month) in new_axis.iter().enumerate() {
                if let Some(old_idx) = metrics.axis.iter().position(|m| m == month) {
                    if let Some(v) = series.get(old_idx) {
                        rebuilt.set(channel, i, *v);
                    }
                }
            }
        }
        rebuilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, MonthKey};

    #[test]
    fn gap_free_axis_restricted_to_created_and_today() {
        let axis = vec![
            MonthKey::new(2022, 11),
            MonthKey::new(2022, 12),
            MonthKey::new(2023, 1),
            MonthKey::new(2023, 2),
        ];
        let mut panel = MonthlyPanel::new(axis);
        panel.set(Channel::Stars, 2, Some(5.0));

        let built = PanelBuilder::build(panel, MonthKey::new(2022, 12), MonthKey::new(2023, 2));
        assert!(built.is_gap_free());
        assert_eq!(built.axis[0], MonthKey::new(2022, 12));
        assert_eq!(*built.axis.last().unwrap(), MonthKey::new(2023, 1));
    }
}
