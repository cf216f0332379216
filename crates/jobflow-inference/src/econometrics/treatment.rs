//! Treatment assignment: label panel rows treated/control and pre/post.

use chrono::NaiveDate;
use jobflow_core::{Panel, TreatmentConfig};
use serde::Serialize;

/// Panel row with DiD indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DidRow {
    /// First-of-month date.
    pub date: NaiveDate,
    /// Class label.
    pub class: String,
    /// Net job flow (outcome).
    pub net_jobs: i64,
    /// 1 if `class` is in the treatment set.
    pub treated: u8,
    /// 1 if `date >= treatment_start`.
    pub post: u8,
    /// `treated * post`.
    pub treated_post: u8,
}

/// Label every panel row.
///
/// Total and deterministic. Treatment classes missing from the panel are allowed
/// (they are logged); the estimator reports the resulting lack of variation.
pub fn assign(panel: &Panel, config: &TreatmentConfig) -> Vec<DidRow> {
    let present = panel.classes();
    for class in config.treatment_classes() {
        if !present.contains(&class.as_str()) {
            tracing::warn!(class = %class, "treatment class not present in panel");
        }
    }

    panel
        .rows()
        .iter()
        .map(|row| {
            let treated = u8::from(config.is_treated(&row.class));
            let post = u8::from(config.is_post(row.date));
            DidRow {
                date: row.date,
                class: row.class.clone(),
                net_jobs: row.net_jobs,
                treated,
                post,
                treated_post: treated * post,
            }
        })
        .collect()
}
