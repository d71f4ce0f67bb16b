//! Coefficient extraction.
//!
//! Flattens a fitted model into one record per model term. Term names come
//! from the design assembler's canonical column names, so records from
//! different estimators always group consistently.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::fit::FittedModel;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRecord {
    pub combo_index: usize,
    pub combo: BTreeMap<String, String>,
    pub replication: usize,
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub statistic: f64,
    pub p_value: f64,
}

pub fn extract_records(
    model: &FittedModel,
    combo_index: usize,
    combo: &BTreeMap<String, String>,
    replication: usize,
) -> Vec<CoefficientRecord> {
    model
        .terms
        .iter()
        .enumerate()
        .map(|(j, term)| CoefficientRecord {
            combo_index,
            combo: combo.clone(),
            replication,
            term: term.clone(),
            estimate: model.estimates[j],
            std_error: model.std_errors[j],
            statistic: model.statistics[j],
            p_value: model.p_values[j],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::extract_records;
    use crate::fit::FittedModel;

    #[test]
    fn one_record_per_term_with_shared_tags() {
        let model = FittedModel {
            terms: vec!["intercept".to_string(), "dose".to_string()],
            estimates: vec![0.2, 1.4],
            std_errors: vec![0.1, 0.3],
            statistics: vec![2.0, 4.67],
            p_values: vec![0.045, 0.0001],
            df_resid: 98.0,
        };
        let mut combo = BTreeMap::new();
        combo.insert("sample_size".to_string(), "100".to_string());

        let records = extract_records(&model, 3, &combo, 17);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].term, "intercept");
        assert_eq!(records[1].term, "dose");
        for r in &records {
            assert_eq!(r.combo_index, 3);
            assert_eq!(r.replication, 17);
            assert_eq!(r.combo.get("sample_size").unwrap(), "100");
        }
        assert_eq!(records[1].estimate, 1.4);
        assert_eq!(records[1].std_error, 0.3);
    }
}
