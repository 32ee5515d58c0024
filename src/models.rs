use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which snapshot of the internship is being assessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvaluationMode {
    Midterm,
    Final,
}

impl EvaluationMode {
    /// Suffix used by the flat per-period survey collections.
    pub fn flat_suffix(self) -> &'static str {
        match self {
            EvaluationMode::Midterm => "midterm",
            EvaluationMode::Final => "final",
        }
    }

    /// The adviser collections use the pluralized period names.
    pub fn adviser_suffix(self) -> &'static str {
        match self {
            EvaluationMode::Midterm => "midterms",
            EvaluationMode::Final => "finals",
        }
    }

    /// Singular form of the adviser suffix, used by the retry after a failed
    /// primary adviser write.
    pub fn flipped_adviser_suffix(self) -> &'static str {
        match self {
            EvaluationMode::Midterm => "midterm",
            EvaluationMode::Final => "final",
        }
    }

    /// StudentRecord field holding this period's access key.
    pub fn key_field(self) -> &'static str {
        match self {
            EvaluationMode::Midterm => "midtermsKey",
            EvaluationMode::Final => "finalsKey",
        }
    }
}

impl FromStr for EvaluationMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "midterm" | "midterms" => Ok(EvaluationMode::Midterm),
            "final" | "finals" => Ok(EvaluationMode::Final),
            other => Err(format!("unknown evaluation mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyRole {
    Student,
    Company,
    Concerns,
}

impl SurveyRole {
    /// Base name of the flat submission collections checked for duplicates.
    /// Concerns feedback merges into the student record instead, so it has no
    /// submission collection of its own.
    pub fn submission_base(self) -> Option<&'static str> {
        match self {
            SurveyRole::Student => Some("studentSurveys"),
            SurveyRole::Company => Some("companyEvaluations"),
            SurveyRole::Concerns => None,
        }
    }
}

impl FromStr for SurveyRole {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "student" => Ok(SurveyRole::Student),
            "company" => Ok(SurveyRole::Company),
            "concerns" => Ok(SurveyRole::Concerns),
            other => Err(format!("unknown survey role '{other}'")),
        }
    }
}

impl std::fmt::Display for SurveyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SurveyRole::Student => "student",
            SurveyRole::Company => "company",
            SurveyRole::Concerns => "concerns",
        };
        f.write_str(label)
    }
}

/// Authoritative record of a student's academic and company context, owned by
/// the admin workflow and read-only to this core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentRecord {
    pub name: String,
    pub student_id: String,
    pub section: String,
    pub college: String,
    pub program: String,
    pub school_year: String,
    pub semester: String,
    pub company_name: String,
    pub midterms_key: String,
    pub finals_key: String,
    /// Legacy single-key field, still honored as a lookup fallback.
    pub access_key: String,
    pub start_date: String,
}

#[derive(Debug, Clone)]
pub struct StudentContext {
    pub doc_id: String,
    pub record: StudentRecord,
}

#[derive(Debug, Clone)]
pub struct PreviousSubmission {
    pub survey_id: String,
    pub submitted_on: Option<String>,
    pub submitter_name: Option<String>,
}

/// Outcome of validating an access key for a role and period.
#[derive(Debug, Clone)]
pub enum KeyValidation {
    Invalid {
        reason: String,
    },
    Fresh {
        student: StudentContext,
    },
    AlreadySubmitted {
        student: StudentContext,
        previous: PreviousSubmission,
    },
}

/// A named block of rating items. `None` marks an unanswered item; answered
/// items hold 1..=scale_max.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingGroup {
    pub name: String,
    pub scale_max: u32,
    pub ratings: BTreeMap<String, Option<u32>>,
}

impl RatingGroup {
    pub fn item_count(&self) -> usize {
        self.ratings.len()
    }

    pub fn filled_count(&self) -> usize {
        self.ratings.values().filter(|r| r.is_some()).count()
    }

    pub fn total_score(&self) -> u32 {
        self.ratings.values().flatten().sum()
    }

    pub fn max_possible_score(&self) -> u32 {
        self.item_count() as u32 * self.scale_max
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentSurvey {
    pub student_name: String,
    pub student_id: String,
    pub company_name: String,
    pub program: String,
    pub school_year: String,
    pub semester: String,
    pub section: String,
    pub college: String,
    pub evaluation_mode: Option<EvaluationMode>,
    pub access_key: String,
    pub groups: Vec<RatingGroup>,
}

/// Adviser's assessment of a partner company, collected during the company
/// interview visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanySurvey {
    pub company_name: String,
    pub adviser_name: String,
    pub school_year: String,
    pub semester: String,
    pub evaluation_mode: Option<EvaluationMode>,
    pub access_key: String,
    pub groups: Vec<RatingGroup>,
}

/// Company mentor's rating of a student trainee.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyEvaluation {
    pub student_name: String,
    pub student_id: String,
    pub company_name: String,
    pub evaluator_name: String,
    pub program: String,
    pub school_year: String,
    pub semester: String,
    pub section: String,
    pub college: String,
    pub evaluation_mode: Option<EvaluationMode>,
    pub access_key: String,
    pub groups: Vec<RatingGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConcernsFeedback {
    pub student_doc_id: String,
    pub student_name: String,
    pub student_id: String,
    pub company_name: String,
    pub school_year: String,
    pub semester: String,
    pub access_key: String,
    pub concerns: String,
    pub solutions: String,
    pub recommendations: String,
    pub evaluation: String,
    pub submitted_by: String,
}

/// The four survey kinds share almost no behavior beyond the fan-out shape,
/// so they are a sum type dispatched by pattern match in the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SurveyPayload {
    StudentSurvey(StudentSurvey),
    CompanySurvey(CompanySurvey),
    CompanyEvaluation(CompanyEvaluation),
    ConcernsFeedback(ConcernsFeedback),
}

impl SurveyPayload {
    pub fn evaluation_mode(&self) -> EvaluationMode {
        let mode = match self {
            SurveyPayload::StudentSurvey(p) => p.evaluation_mode,
            SurveyPayload::CompanySurvey(p) => p.evaluation_mode,
            SurveyPayload::CompanyEvaluation(p) => p.evaluation_mode,
            SurveyPayload::ConcernsFeedback(_) => Some(EvaluationMode::Final),
        };
        mode.unwrap_or(EvaluationMode::Final)
    }

    pub fn access_key(&self) -> &str {
        match self {
            SurveyPayload::StudentSurvey(p) => &p.access_key,
            SurveyPayload::CompanySurvey(p) => &p.access_key,
            SurveyPayload::CompanyEvaluation(p) => &p.access_key,
            SurveyPayload::ConcernsFeedback(p) => &p.access_key,
        }
    }

    /// Role used for the access-key gate, when the kind is key-gated at all.
    /// The adviser assessment is collected in person and carries no key.
    pub fn key_role(&self) -> Option<SurveyRole> {
        match self {
            SurveyPayload::StudentSurvey(_) => Some(SurveyRole::Student),
            SurveyPayload::CompanySurvey(_) => None,
            SurveyPayload::CompanyEvaluation(_) => Some(SurveyRole::Company),
            SurveyPayload::ConcernsFeedback(_) => Some(SurveyRole::Concerns),
        }
    }
}

/// Derived scores for one rating group as stored in the submission document.
/// Only answered items are persisted; the max still counts every item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupScores {
    pub ratings: BTreeMap<String, u32>,
    pub total_score: u32,
    pub max_possible_score: u32,
}

/// Canonical stored form of a survey submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDocument {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub student_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub student_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub company_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub adviser_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub evaluator_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub program: String,
    pub school_year: String,
    pub semester: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub section: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub college: String,
    pub evaluation_mode: EvaluationMode,
    pub access_key: String,
    pub access_key_used: bool,
    pub groups: BTreeMap<String, GroupScores>,
    pub total_score: u32,
    pub max_possible_score: u32,
    pub submitted_at: serde_json::Value,
    /// Same token as `submitted_at`; older reporting tools read this name.
    pub timestamp: serde_json::Value,
    pub status: String,
}

/// Global lock flags read from the settings document. A missing document
/// means everything is unlocked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessSettings {
    pub lock_student_access: bool,
    pub lock_company_access: bool,
}
