//! Deterministic hard filters, evaluated before any weighted scoring.
//!
//! Runs locally and in a fixed order; the first rule that fires disqualifies
//! the candidate and the semantic scorer is skipped entirely:
//! 1. Onsite role, location mismatch
//! 2. Disqualified employer (case-insensitive substring, either direction)
//! 3. Disqualified title (case-insensitive substring)
//! 4. Chronic job-hopping (>=3 roles, none over 12 months)
//! 5. Missing required certification

use tracing::debug;

use crate::campaigns::JobSpec;
use crate::candidates::Candidate;

/// Minimum recorded roles before the job-hopping rule applies.
const JOB_HOP_MIN_ROLES: usize = 3;

/// A single role must exceed this tenure to clear the job-hopping rule.
const JOB_HOP_TENURE_MONTHS: u32 = 12;

/// Ordered deterministic disqualification rules.
pub struct HardFilter;

impl HardFilter {
    /// Evaluate a candidate against a job spec.
    ///
    /// Returns `Some(reason)` for the first rule that disqualifies, `None`
    /// if the candidate passes all hard filters.
    pub fn evaluate(candidate: &Candidate, spec: &JobSpec) -> Option<String> {
        if let Some(reason) = Self::check_location(candidate, spec) {
            return Some(reason);
        }
        if let Some(reason) = Self::check_employer(candidate, spec) {
            return Some(reason);
        }
        if let Some(reason) = Self::check_title(candidate, spec) {
            return Some(reason);
        }
        if let Some(reason) = Self::check_tenure(candidate) {
            return Some(reason);
        }
        if let Some(reason) = Self::check_certifications(candidate, spec) {
            return Some(reason);
        }
        None
    }

    fn check_location(candidate: &Candidate, spec: &JobSpec) -> Option<String> {
        if !spec.onsite_required {
            return None;
        }
        let required = spec.required_location.as_deref()?;
        let matches = candidate
            .location
            .as_deref()
            .is_some_and(|loc| contains_ci(loc, required) || contains_ci(required, loc));
        if matches {
            None
        } else {
            debug!(candidate = %candidate.id, required, "Onsite location mismatch");
            Some(format!("location mismatch for onsite role: {required}"))
        }
    }

    fn check_employer(candidate: &Candidate, spec: &JobSpec) -> Option<String> {
        let company = candidate.current_company.as_deref()?;
        for blocked in &spec.disqualify_companies {
            if contains_ci(company, blocked) || contains_ci(blocked, company) {
                debug!(candidate = %candidate.id, company, blocked, "Disqualified employer");
                return Some(format!("employer match: {blocked}"));
            }
        }
        None
    }

    fn check_title(candidate: &Candidate, spec: &JobSpec) -> Option<String> {
        let title = candidate.current_title.as_deref()?;
        for pattern in &spec.disqualify_titles {
            if contains_ci(title, pattern) {
                debug!(candidate = %candidate.id, title, pattern, "Disqualified title");
                return Some(format!("title match: {pattern}"));
            }
        }
        None
    }

    fn check_tenure(candidate: &Candidate) -> Option<String> {
        if candidate.positions.len() < JOB_HOP_MIN_ROLES {
            return None;
        }
        let longest = candidate
            .positions
            .iter()
            .map(|p| p.months)
            .max()
            .unwrap_or(0);
        if longest <= JOB_HOP_TENURE_MONTHS {
            debug!(candidate = %candidate.id, longest, "Job-hopping pattern");
            Some(format!(
                "job hopping: {} roles, longest tenure {longest} months",
                candidate.positions.len()
            ))
        } else {
            None
        }
    }

    fn check_certifications(candidate: &Candidate, spec: &JobSpec) -> Option<String> {
        for required in &spec.required_certifications {
            let held = candidate
                .certifications
                .iter()
                .any(|c| contains_ci(c, required));
            if !held {
                debug!(candidate = %candidate.id, required, "Missing certification");
                return Some(format!("missing certification: {required}"));
            }
        }
        None
    }
}

/// Case-insensitive substring check.
fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::Position;
    use uuid::Uuid;

    fn candidate() -> Candidate {
        let mut c = Candidate::new(Uuid::new_v4(), "ext-1", "Jane Doe");
        c.location = Some("Austin, TX".into());
        c.current_company = Some("Initech".into());
        c.current_title = Some("Senior Backend Engineer".into());
        c
    }

    #[test]
    fn passes_empty_spec() {
        assert!(HardFilter::evaluate(&candidate(), &JobSpec::default()).is_none());
    }

    #[test]
    fn onsite_location_mismatch_disqualifies() {
        let spec = JobSpec {
            onsite_required: true,
            required_location: Some("New York".into()),
            ..Default::default()
        };
        let reason = HardFilter::evaluate(&candidate(), &spec).unwrap();
        assert!(reason.starts_with("location mismatch"));
    }

    #[test]
    fn onsite_location_match_passes() {
        let spec = JobSpec {
            onsite_required: true,
            required_location: Some("austin".into()),
            ..Default::default()
        };
        assert!(HardFilter::evaluate(&candidate(), &spec).is_none());
    }

    #[test]
    fn remote_role_ignores_location() {
        let spec = JobSpec {
            onsite_required: false,
            required_location: Some("New York".into()),
            ..Default::default()
        };
        assert!(HardFilter::evaluate(&candidate(), &spec).is_none());
    }

    #[test]
    fn employer_substring_either_direction() {
        // Candidate at "Acme Corp", list carries "acme"
        let mut c = candidate();
        c.current_company = Some("Acme Corp".into());
        let spec = JobSpec {
            disqualify_companies: vec!["acme".into()],
            ..Default::default()
        };
        let reason = HardFilter::evaluate(&c, &spec).unwrap();
        assert_eq!(reason, "employer match: acme");

        // Reverse direction: list carries the longer string
        let mut c2 = candidate();
        c2.current_company = Some("Acme".into());
        let spec2 = JobSpec {
            disqualify_companies: vec!["Acme Corporation Holdings".into()],
            ..Default::default()
        };
        assert!(HardFilter::evaluate(&c2, &spec2).is_some());
    }

    #[test]
    fn title_pattern_disqualifies() {
        let spec = JobSpec {
            disqualify_titles: vec!["backend".into()],
            ..Default::default()
        };
        let reason = HardFilter::evaluate(&candidate(), &spec).unwrap();
        assert_eq!(reason, "title match: backend");
    }

    #[test]
    fn job_hopping_needs_three_roles() {
        let mut c = candidate();
        c.positions = vec![
            Position { title: "Dev".into(), company: "A".into(), months: 6 },
            Position { title: "Dev".into(), company: "B".into(), months: 8 },
        ];
        // Only two roles recorded, rule does not apply
        assert!(HardFilter::evaluate(&c, &JobSpec::default()).is_none());
    }

    #[test]
    fn job_hopping_disqualifies() {
        let mut c = candidate();
        c.positions = vec![
            Position { title: "Dev".into(), company: "A".into(), months: 6 },
            Position { title: "Dev".into(), company: "B".into(), months: 12 },
            Position { title: "Dev".into(), company: "C".into(), months: 9 },
        ];
        let reason = HardFilter::evaluate(&c, &JobSpec::default()).unwrap();
        assert!(reason.starts_with("job hopping"));
    }

    #[test]
    fn one_long_tenure_clears_job_hopping() {
        let mut c = candidate();
        c.positions = vec![
            Position { title: "Dev".into(), company: "A".into(), months: 6 },
            Position { title: "Dev".into(), company: "B".into(), months: 40 },
            Position { title: "Dev".into(), company: "C".into(), months: 9 },
        ];
        assert!(HardFilter::evaluate(&c, &JobSpec::default()).is_none());
    }

    #[test]
    fn missing_certification_disqualifies() {
        let spec = JobSpec {
            required_certifications: vec!["CISSP".into()],
            ..Default::default()
        };
        let reason = HardFilter::evaluate(&candidate(), &spec).unwrap();
        assert_eq!(reason, "missing certification: CISSP");
    }

    #[test]
    fn held_certification_passes() {
        let mut c = candidate();
        c.certifications = vec!["cissp (2021)".into()];
        let spec = JobSpec {
            required_certifications: vec!["CISSP".into()],
            ..Default::default()
        };
        assert!(HardFilter::evaluate(&c, &spec).is_none());
    }

    #[test]
    fn rules_fire_in_order() {
        // Candidate fails both employer and title rules; employer wins.
        let mut c = candidate();
        c.current_company = Some("Acme".into());
        let spec = JobSpec {
            disqualify_companies: vec!["acme".into()],
            disqualify_titles: vec!["backend".into()],
            ..Default::default()
        };
        let reason = HardFilter::evaluate(&c, &spec).unwrap();
        assert!(reason.starts_with("employer match"));
    }
}
