use crate::domain::DomainError;
use garde::{Report, Validate};

/// Run garde validation and fold the report into a single `ValidationError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(describe_report(&report)))
}

fn describe_report(report: &Report) -> String {
    let mut parts = Vec::new();
    for (path, error) in report.iter() {
        let path = path.to_string();
        if path.is_empty() {
            parts.push(error.message().to_string());
        } else {
            parts.push(format!("{}: {}", path, error.message()));
        }
    }
    parts.join(", ")
}
