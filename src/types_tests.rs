//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;

    #[test]
    fn test_risk_level_from_probability() {
        assert_eq!(RiskLevel::from_probability(0.90), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_probability(0.70), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.40), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.10), RiskLevel::Low);
    }

    #[test]
    fn test_risk_level_boundaries_inclusive() {
        assert_eq!(RiskLevel::from_probability(0.85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_probability(0.65), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.35), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_probability(0.3499), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(1.0), RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_monotonic() {
        let mut previous = RiskLevel::Low;
        for i in 0..=100 {
            let level = RiskLevel::from_probability(i as f64 / 100.0);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn test_risk_level_from_score_right_inclusive() {
        assert_eq!(RiskLevel::from_score(35.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(35.1), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(65.0), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(85.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(99.0), RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_labels() {
        assert_eq!(RiskLevel::Critical.label(), 1);
        assert_eq!(RiskLevel::High.label(), 1);
        assert_eq!(RiskLevel::Moderate.label(), 0);
        assert_eq!(RiskLevel::Low.label(), 0);
    }

    #[test]
    fn test_risk_level_serialization() {
        assert_eq!(serde_json::to_string(&RiskLevel::Critical).unwrap(), "\"critical\"");
        let parsed: RiskLevel = serde_json::from_str("\"moderate\"").unwrap();
        assert_eq!(parsed, RiskLevel::Moderate);
        assert_eq!(RiskLevel::parse(" HIGH "), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("severe"), None);
    }

    #[test]
    fn test_risk_score_rounding() {
        assert_eq!(risk_score(0.12345), 12.3);
        assert_eq!(risk_score(1.0), 100.0);
        assert_eq!(risk_score(0.0), 0.0);
        assert_eq!(round3(0.98765), 0.988);
    }

    #[test]
    fn test_field_value_parse() {
        assert_eq!(FieldValue::parse("12.5"), FieldValue::Numeric(12.5));
        assert_eq!(FieldValue::parse(""), FieldValue::Missing);
        assert_eq!(FieldValue::parse("NaN"), FieldValue::Missing);
        assert_eq!(FieldValue::parse("NA"), FieldValue::Missing);
        assert_eq!(
            FieldValue::parse("Type 2"),
            FieldValue::Categorical("Type 2".to_string())
        );
    }

    #[test]
    fn test_patient_record_absent_field_is_missing() {
        let record = PatientRecord::new().with("age", FieldValue::Numeric(60.0));
        assert_eq!(record.get("age").as_f64(), Some(60.0));
        assert!(record.get("bmi").is_missing());
    }
}
