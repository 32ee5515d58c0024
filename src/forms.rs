use crate::error::SubmitError;
use crate::models::{RatingGroup, SurveyPayload};

/// Fixed college → program catalog used to cross-check the two dropdowns.
pub fn programs_for(college: &str) -> Option<&'static [&'static str]> {
    let programs: &'static [&'static str] = match college {
        "COLLEGE OF COMPUTER STUDIES" => &[
            "BS Computer Science",
            "BS Information Technology",
            "BS Information Systems",
        ],
        "COLLEGE OF ENGINEERING AND ARCHITECTURE" => &[
            "BS Civil Engineering",
            "BS Electrical Engineering",
            "BS Mechanical Engineering",
            "BS Architecture",
        ],
        "COLLEGE OF BUSINESS AND ACCOUNTANCY" => &[
            "BS Accountancy",
            "BS Business Administration",
            "BS Hospitality Management",
        ],
        "COLLEGE OF ARTS AND SCIENCES" => &["BA Communication", "BS Psychology", "BS Biology"],
        "COLLEGE OF EDUCATION" => &[
            "Bachelor of Elementary Education",
            "Bachelor of Secondary Education",
        ],
        _ => return None,
    };
    Some(programs)
}

/// Validate a payload before it reaches the submission engine. Fails closed:
/// on any violation nothing is submitted.
pub fn validate_payload(payload: &SurveyPayload) -> Result<(), SubmitError> {
    match payload {
        SurveyPayload::StudentSurvey(p) => {
            require_fields(&[
                ("studentName", &p.student_name),
                ("companyName", &p.company_name),
                ("program", &p.program),
                ("schoolYear", &p.school_year),
                ("semester", &p.semester),
                ("section", &p.section),
                ("college", &p.college),
            ])?;
            check_college_program(&p.college, &p.program)?;
            require_complete_groups(&p.groups)
        }
        SurveyPayload::CompanySurvey(p) => {
            require_fields(&[
                ("companyName", &p.company_name),
                ("adviserName", &p.adviser_name),
                ("schoolYear", &p.school_year),
                ("semester", &p.semester),
            ])?;
            require_complete_groups(&p.groups)
        }
        SurveyPayload::CompanyEvaluation(p) => {
            require_fields(&[
                ("studentName", &p.student_name),
                ("companyName", &p.company_name),
                ("evaluatorName", &p.evaluator_name),
                ("program", &p.program),
                ("schoolYear", &p.school_year),
                ("semester", &p.semester),
                ("section", &p.section),
                ("college", &p.college),
            ])?;
            check_college_program(&p.college, &p.program)?;
            require_completion_rate(&p.groups)
        }
        SurveyPayload::ConcernsFeedback(p) => require_fields(&[
            ("studentName", &p.student_name),
            ("schoolYear", &p.school_year),
            ("semester", &p.semester),
            ("concerns", &p.concerns),
        ]),
    }
}

fn require_fields(fields: &[(&str, &String)]) -> Result<(), SubmitError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SubmitError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

fn check_college_program(college: &str, program: &str) -> Result<(), SubmitError> {
    if college.is_empty() || program.is_empty() {
        return Ok(());
    }
    // Only cataloged colleges are cross-checked; custom entries pass through.
    if let Some(programs) = programs_for(college) {
        if !programs.contains(&program) {
            return Err(SubmitError::Validation(format!(
                "program '{program}' does not belong to college '{college}'"
            )));
        }
    }
    Ok(())
}

fn check_rating_ranges(groups: &[RatingGroup]) -> Result<(), SubmitError> {
    for group in groups {
        for (item, rating) in &group.ratings {
            if let Some(r) = rating {
                if *r < 1 || *r > group.scale_max {
                    return Err(SubmitError::Validation(format!(
                        "rating for '{item}' in group '{}' must be between 1 and {}",
                        group.name, group.scale_max
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Student and adviser surveys require every item answered.
fn require_complete_groups(groups: &[RatingGroup]) -> Result<(), SubmitError> {
    check_rating_ranges(groups)?;
    for group in groups {
        if group.filled_count() < group.item_count() {
            return Err(SubmitError::Validation(format!(
                "rating group '{}' has unanswered items",
                group.name
            )));
        }
    }
    Ok(())
}

/// The company evaluation tolerates partial answers: mentors must fill at
/// least 80% of the items across all groups.
fn require_completion_rate(groups: &[RatingGroup]) -> Result<(), SubmitError> {
    check_rating_ranges(groups)?;
    let total: usize = groups.iter().map(RatingGroup::item_count).sum();
    let filled: usize = groups.iter().map(RatingGroup::filled_count).sum();
    if total == 0 {
        return Err(SubmitError::Validation(
            "no rating items present".to_string(),
        ));
    }
    if filled * 5 < total * 4 {
        return Err(SubmitError::Validation(format!(
            "only {filled} of {total} rating items answered; at least 80% required"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompanyEvaluation, EvaluationMode, StudentSurvey};
    use std::collections::BTreeMap;

    fn group(name: &str, filled: usize, unfilled: usize) -> RatingGroup {
        let mut ratings = BTreeMap::new();
        for i in 0..filled {
            ratings.insert(format!("{name} item {i}"), Some(4));
        }
        for i in 0..unfilled {
            ratings.insert(format!("{name} blank {i}"), None);
        }
        RatingGroup {
            name: name.to_string(),
            scale_max: 5,
            ratings,
        }
    }

    fn evaluation_with(filled: usize) -> CompanyEvaluation {
        // 20 items spread across 4 groups of 5.
        let mut groups = Vec::new();
        let mut remaining = filled;
        for name in ["attitude", "competence", "output", "conduct"] {
            let take = remaining.min(5);
            groups.push(group(name, take, 5 - take));
            remaining -= take;
        }
        CompanyEvaluation {
            student_name: "Alyssa Ramos".to_string(),
            student_id: "2021-00123".to_string(),
            company_name: "Cloudtech Solutions Inc.".to_string(),
            evaluator_name: "Marco Reyes".to_string(),
            program: "BS Information Technology".to_string(),
            school_year: "2024-2025".to_string(),
            semester: "1st".to_string(),
            section: "BSIT-4A".to_string(),
            college: "COLLEGE OF COMPUTER STUDIES".to_string(),
            evaluation_mode: Some(EvaluationMode::Final),
            access_key: "FIN-ALR-3349".to_string(),
            groups,
        }
    }

    fn student_survey() -> StudentSurvey {
        StudentSurvey {
            student_name: "Alyssa Ramos".to_string(),
            student_id: "2021-00123".to_string(),
            company_name: "Cloudtech Solutions Inc.".to_string(),
            program: "BS Computer Science".to_string(),
            school_year: "2024-2025".to_string(),
            semester: "1st".to_string(),
            section: "BSCS-4A".to_string(),
            college: "COLLEGE OF COMPUTER STUDIES".to_string(),
            evaluation_mode: Some(EvaluationMode::Final),
            access_key: "FIN-ALR-3349".to_string(),
            groups: vec![group("experience", 5, 0)],
        }
    }

    #[test]
    fn sixteen_of_twenty_items_passes_the_threshold() {
        let payload = SurveyPayload::CompanyEvaluation(evaluation_with(16));
        assert!(validate_payload(&payload).is_ok());
    }

    #[test]
    fn fifteen_of_twenty_items_fails_the_threshold() {
        let payload = SurveyPayload::CompanyEvaluation(evaluation_with(15));
        let err = validate_payload(&payload).unwrap_err();
        assert!(err.to_string().contains("80%"), "unexpected error: {err}");
    }

    #[test]
    fn program_outside_college_is_rejected_naming_both() {
        let mut survey = student_survey();
        survey.program = "BS Architecture".to_string();
        let err = validate_payload(&SurveyPayload::StudentSurvey(survey)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("BS Architecture"));
        assert!(message.contains("COLLEGE OF COMPUTER STUDIES"));
    }

    #[test]
    fn program_inside_college_passes() {
        let survey = student_survey();
        assert!(validate_payload(&SurveyPayload::StudentSurvey(survey)).is_ok());
    }

    #[test]
    fn student_survey_requires_every_item_answered() {
        let mut survey = student_survey();
        survey.groups = vec![group("experience", 4, 1)];
        let err = validate_payload(&SurveyPayload::StudentSurvey(survey)).unwrap_err();
        assert!(err.to_string().contains("unanswered"));
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let mut survey = student_survey();
        survey.groups[0]
            .ratings
            .insert("experience item 0".to_string(), Some(9));
        let err = validate_payload(&SurveyPayload::StudentSurvey(survey)).unwrap_err();
        assert!(err.to_string().contains("between 1 and 5"));
    }

    #[test]
    fn missing_identity_fields_are_listed() {
        let mut survey = student_survey();
        survey.company_name.clear();
        survey.section.clear();
        let err = validate_payload(&SurveyPayload::StudentSurvey(survey)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("companyName"));
        assert!(message.contains("section"));
    }
}
