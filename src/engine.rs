use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::SubmitError;
use crate::models::{
    ConcernsFeedback, EvaluationMode, GroupScores, RatingGroup, SubmissionDocument, SurveyPayload,
};
use crate::store::{DocumentStore, STUDENTS};

/// Preference order for the concerns audit copy; the first collection that
/// accepts the write wins.
const CONCERNS_AUDIT_COLLECTIONS: [&str; 4] =
    ["concerns_solutions", "ojtAdvisers", "student_feedback", "feedback"];

#[derive(Debug, Clone)]
pub struct ConcernsOutcome {
    pub student_data_updated: bool,
    pub concerns_saved: bool,
    pub doc_id: Option<String>,
}

/// Persist a validated survey payload, fanning the document out across the
/// configured collection layouts. The submission succeeds if at least one
/// write lands; per-target failures are logged and absorbed.
pub async fn submit(
    store: &dyn DocumentStore,
    payload: &SurveyPayload,
    custom_doc_id: Option<&str>,
) -> Result<String, SubmitError> {
    if let SurveyPayload::ConcernsFeedback(fields) = payload {
        let student_doc_id = custom_doc_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                let id = fields.student_doc_id.trim();
                (!id.is_empty()).then_some(id)
            });
        let outcome = submit_concerns(store, student_doc_id, fields).await?;
        return Ok(outcome
            .doc_id
            .or_else(|| student_doc_id.map(str::to_string))
            .unwrap_or_default());
    }

    let mode = payload.evaluation_mode();
    let submitted_at = timestamp_token(store).await;
    let doc = assemble(payload, mode, submitted_at);
    check_required(payload, &doc)?;

    let value = serde_json::to_value(&doc)
        .map_err(|e| SubmitError::Terminal(format!("encode failed: {e}")))?;
    let doc_id = match custom_doc_id {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => synthesize_doc_id(payload),
    };

    match payload {
        SurveyPayload::StudentSurvey(_) | SurveyPayload::CompanyEvaluation(_) => {
            let base = if matches!(payload, SurveyPayload::StudentSurvey(_)) {
                "studentSurveys"
            } else {
                "companyEvaluations"
            };
            submit_fan_out(store, base, mode, &doc, &value, &doc_id).await
        }
        SurveyPayload::CompanySurvey(_) => submit_adviser(store, mode, &value, &doc_id).await,
        SurveyPayload::ConcernsFeedback(_) => unreachable!("handled above"),
    }
}

/// Merge concerns fields onto the student record and append a best-effort
/// audit copy. Succeeds when either path lands.
pub async fn submit_concerns(
    store: &dyn DocumentStore,
    student_doc_id: Option<&str>,
    fields: &ConcernsFeedback,
) -> Result<ConcernsOutcome, SubmitError> {
    let token = timestamp_token(store).await;

    let mut student_data_updated = false;
    if let Some(doc_id) = student_doc_id {
        let merge_with = |ts: Value| {
            json!({
                "concerns": fields.concerns,
                "solutions": fields.solutions,
                "recommendations": fields.recommendations,
                "evaluation": fields.evaluation,
                "updatedAt": ts,
                "updatedBy": fields.submitted_by,
            })
        };
        match store
            .set_doc(STUDENTS, doc_id, &merge_with(token.clone()), true)
            .await
        {
            Ok(()) => student_data_updated = true,
            Err(e) => {
                // Some backends reject the server token inside a merge;
                // retry once with a plain ISO-8601 string.
                warn!(doc_id, error = %e, "concerns merge failed, retrying with client timestamp");
                let fallback = Value::String(Utc::now().to_rfc3339());
                match store.set_doc(STUDENTS, doc_id, &merge_with(fallback), true).await {
                    Ok(()) => student_data_updated = true,
                    Err(e) => warn!(doc_id, error = %e, "concerns merge retry failed"),
                }
            }
        }
    }

    let audit = json!({
        "studentDocId": student_doc_id.unwrap_or_default(),
        "studentName": fields.student_name,
        "studentId": fields.student_id,
        "companyName": fields.company_name,
        "schoolYear": fields.school_year,
        "semester": fields.semester,
        "accessKey": fields.access_key,
        "concerns": fields.concerns,
        "solutions": fields.solutions,
        "recommendations": fields.recommendations,
        "evaluation": fields.evaluation,
        "submittedBy": fields.submitted_by,
        "submittedAt": token,
        "timestamp": token,
        "status": "submitted",
    });
    let mut audit_id = None;
    for collection in CONCERNS_AUDIT_COLLECTIONS {
        match store.add_doc(collection, &audit).await {
            Ok(id) => {
                audit_id = Some(id);
                break;
            }
            Err(e) => warn!(collection, error = %e, "concerns audit write failed"),
        }
    }

    if !student_data_updated && audit_id.is_none() {
        return Err(SubmitError::Terminal(
            "concerns feedback could not be saved anywhere".to_string(),
        ));
    }
    Ok(ConcernsOutcome {
        student_data_updated,
        concerns_saved: audit_id.is_some(),
        doc_id: audit_id,
    })
}

/// Fan out a student survey or company evaluation: per-period flat
/// collection, combined flat collection, and the hierarchical mirror under
/// departments. Falls back to the legacy collection only when every target
/// rejected.
async fn submit_fan_out(
    store: &dyn DocumentStore,
    base: &str,
    mode: EvaluationMode,
    doc: &SubmissionDocument,
    value: &Value,
    doc_id: &str,
) -> Result<String, SubmitError> {
    let student_segment = if doc.student_id.is_empty() {
        normalize_id_part(&doc.student_name)
    } else {
        doc.student_id.clone()
    };
    let targets = [
        format!("{base}_{}", mode.flat_suffix()),
        base.to_string(),
        format!(
            "departments/{}/sections/{}/students/{}/evaluations_{}",
            doc.college,
            doc.section,
            student_segment,
            mode.flat_suffix()
        ),
    ];

    let mut any_ok = false;
    for collection in &targets {
        match store.set_doc(collection, doc_id, value, false).await {
            Ok(()) => any_ok = true,
            Err(e) => warn!(collection = collection.as_str(), doc_id, error = %e, "fan-out write failed"),
        }
    }
    if any_ok {
        return Ok(doc_id.to_string());
    }

    let legacy = format!("{base}_legacy");
    match store.set_doc(&legacy, doc_id, value, false).await {
        Ok(()) => Ok(doc_id.to_string()),
        Err(e) => {
            warn!(collection = legacy.as_str(), doc_id, error = %e, "legacy fallback write failed");
            Err(SubmitError::Terminal(
                "all storage targets rejected the submission".to_string(),
            ))
        }
    }
}

/// The adviser assessment uses its own, simpler chain: primary per-period
/// write, a retry with the pluralization-flipped period name, and the
/// unsuffixed collection as both best-effort secondary and final fallback.
async fn submit_adviser(
    store: &dyn DocumentStore,
    mode: EvaluationMode,
    value: &Value,
    doc_id: &str,
) -> Result<String, SubmitError> {
    let primary = format!("OJTadvisers_{}", mode.adviser_suffix());
    let mut primary_saved = match store.set_doc(&primary, doc_id, value, false).await {
        Ok(()) => true,
        Err(e) => {
            warn!(collection = primary.as_str(), doc_id, error = %e, "adviser primary write failed");
            false
        }
    };
    if !primary_saved {
        let flipped = format!("OJTadvisers_{}", mode.flipped_adviser_suffix());
        primary_saved = match store.set_doc(&flipped, doc_id, value, false).await {
            Ok(()) => true,
            Err(e) => {
                warn!(collection = flipped.as_str(), doc_id, error = %e, "adviser flipped-period retry failed");
                false
            }
        };
    }

    match store.set_doc("OJTadvisers", doc_id, value, false).await {
        Ok(()) => Ok(doc_id.to_string()),
        Err(e) if primary_saved => {
            warn!(doc_id, error = %e, "adviser combined write failed");
            Ok(doc_id.to_string())
        }
        Err(e) => {
            warn!(doc_id, error = %e, "adviser fallback write failed");
            Err(SubmitError::Terminal(
                "all adviser storage targets rejected the submission".to_string(),
            ))
        }
    }
}

async fn timestamp_token(store: &dyn DocumentStore) -> Value {
    match store.server_timestamp().await {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "server timestamp unavailable, using client clock");
            Value::String(Utc::now().to_rfc3339())
        }
    }
}

fn assemble(payload: &SurveyPayload, mode: EvaluationMode, submitted_at: Value) -> SubmissionDocument {
    let empty = || String::new();
    let (
        student_name,
        student_id,
        company_name,
        adviser_name,
        evaluator_name,
        program,
        school_year,
        semester,
        section,
        college,
        access_key,
        groups,
    ) = match payload {
        SurveyPayload::StudentSurvey(p) => (
            p.student_name.clone(),
            p.student_id.clone(),
            p.company_name.clone(),
            empty(),
            empty(),
            p.program.clone(),
            p.school_year.clone(),
            p.semester.clone(),
            p.section.clone(),
            p.college.clone(),
            p.access_key.clone(),
            &p.groups,
        ),
        SurveyPayload::CompanySurvey(p) => (
            empty(),
            empty(),
            p.company_name.clone(),
            p.adviser_name.clone(),
            empty(),
            empty(),
            p.school_year.clone(),
            p.semester.clone(),
            empty(),
            empty(),
            p.access_key.clone(),
            &p.groups,
        ),
        SurveyPayload::CompanyEvaluation(p) => (
            p.student_name.clone(),
            p.student_id.clone(),
            p.company_name.clone(),
            empty(),
            p.evaluator_name.clone(),
            p.program.clone(),
            p.school_year.clone(),
            p.semester.clone(),
            p.section.clone(),
            p.college.clone(),
            p.access_key.clone(),
            &p.groups,
        ),
        SurveyPayload::ConcernsFeedback(_) => unreachable!("concerns use the merge path"),
    };

    let (groups, total_score, max_possible_score) = score_groups(groups);
    let access_key_used = !access_key.trim().is_empty();
    SubmissionDocument {
        student_name,
        student_id,
        company_name,
        adviser_name,
        evaluator_name,
        program,
        school_year,
        semester,
        section,
        college,
        evaluation_mode: mode,
        access_key,
        access_key_used,
        groups,
        total_score,
        max_possible_score,
        timestamp: submitted_at.clone(),
        submitted_at,
        status: "submitted".to_string(),
    }
}

fn score_groups(groups: &[RatingGroup]) -> (BTreeMap<String, GroupScores>, u32, u32) {
    let mut scored = BTreeMap::new();
    let mut total = 0u32;
    let mut max = 0u32;
    for group in groups {
        let group_total = group.total_score();
        let group_max = group.max_possible_score();
        total += group_total;
        max += group_max;
        scored.insert(
            group.name.clone(),
            GroupScores {
                ratings: group
                    .ratings
                    .iter()
                    .filter_map(|(item, rating)| rating.map(|r| (item.clone(), r)))
                    .collect(),
                total_score: group_total,
                max_possible_score: group_max,
            },
        );
    }
    (scored, total, max)
}

/// Defensive presence check on the assembled document, independent of the
/// form-layer validation.
fn check_required(payload: &SurveyPayload, doc: &SubmissionDocument) -> Result<(), SubmitError> {
    let required: Vec<(&str, &str)> = match payload {
        SurveyPayload::StudentSurvey(_) | SurveyPayload::CompanyEvaluation(_) => vec![
            ("studentName", doc.student_name.as_str()),
            ("companyName", doc.company_name.as_str()),
            ("schoolYear", doc.school_year.as_str()),
            ("semester", doc.semester.as_str()),
            ("section", doc.section.as_str()),
            ("college", doc.college.as_str()),
        ],
        SurveyPayload::CompanySurvey(_) => vec![
            ("companyName", doc.company_name.as_str()),
            ("adviserName", doc.adviser_name.as_str()),
            ("schoolYear", doc.school_year.as_str()),
            ("semester", doc.semester.as_str()),
        ],
        SurveyPayload::ConcernsFeedback(_) => Vec::new(),
    };
    let missing: Vec<&str> = required
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

fn synthesize_doc_id(payload: &SurveyPayload) -> String {
    let (primary, secondary) = match payload {
        SurveyPayload::StudentSurvey(p) => (p.student_name.as_str(), p.company_name.as_str()),
        SurveyPayload::CompanySurvey(p) => (p.company_name.as_str(), p.adviser_name.as_str()),
        SurveyPayload::CompanyEvaluation(p) => (p.student_name.as_str(), p.company_name.as_str()),
        SurveyPayload::ConcernsFeedback(p) => (p.student_name.as_str(), p.company_name.as_str()),
    };
    format!(
        "{}_{}_{}",
        normalize_id_part(primary),
        normalize_id_part(secondary),
        Utc::now().timestamp_millis()
    )
}

fn normalize_id_part(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = true;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
