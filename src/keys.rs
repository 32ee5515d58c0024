use serde_json::Value;
use tracing::warn;

use crate::models::{
    EvaluationMode, KeyValidation, PreviousSubmission, StudentContext, StudentRecord, SurveyRole,
};
use crate::store::{DocumentStore, StoredDoc, STUDENTS};

/// Resolve an access key to a student context and detect reuse.
///
/// The key field is chosen by period; the concerns role always matches the
/// finals key since concerns/solutions is a final-period-only feature. A
/// legacy `accessKey` field is tried when the period field finds nothing.
pub async fn validate(
    store: &dyn DocumentStore,
    role: SurveyRole,
    mode: EvaluationMode,
    raw_key: &str,
) -> KeyValidation {
    let key = raw_key.trim();
    if key.is_empty() {
        return KeyValidation::Invalid {
            reason: "empty key".to_string(),
        };
    }

    let key_field = match role {
        SurveyRole::Concerns => EvaluationMode::Final.key_field(),
        _ => mode.key_field(),
    };

    // Ordered lookup strategies, first match wins. Keys shared by several
    // records resolve to whichever document the store returns first.
    let mut found = None;
    for field in [key_field, "accessKey"] {
        match store.query_eq(STUDENTS, field, key).await {
            Ok(mut docs) if !docs.is_empty() => {
                found = Some(docs.remove(0));
                break;
            }
            Ok(_) => {}
            Err(e) => {
                return KeyValidation::Invalid {
                    reason: e.to_string(),
                }
            }
        }
    }

    let Some(doc) = found else {
        return KeyValidation::Invalid {
            reason: "key not found".to_string(),
        };
    };

    let record: StudentRecord = match serde_json::from_value(doc.data) {
        Ok(record) => record,
        Err(e) => {
            return KeyValidation::Invalid {
                reason: format!("malformed student record: {e}"),
            }
        }
    };
    let student = StudentContext {
        doc_id: doc.id,
        record,
    };

    if role == SurveyRole::Concerns {
        // Concerns feedback needs the internship start date to anchor the
        // reported period; it merges into the record, so no reuse check.
        if student.record.start_date.trim().is_empty() {
            return KeyValidation::Invalid {
                reason: "start date not set".to_string(),
            };
        }
        return KeyValidation::Fresh { student };
    }

    match already_submitted(store, role, mode, &student, key).await {
        Some(previous) => KeyValidation::AlreadySubmitted { student, previous },
        None => KeyValidation::Fresh { student },
    }
}

/// Two independent conditions mark a key as spent: a submission for the same
/// student and semester, or any submission carrying the same key string.
/// Check failures are logged and ignored so a flaky duplicate lookup never
/// blocks a legitimate submission.
async fn already_submitted(
    store: &dyn DocumentStore,
    role: SurveyRole,
    mode: EvaluationMode,
    student: &StudentContext,
    key: &str,
) -> Option<PreviousSubmission> {
    let base = role.submission_base()?;
    let collection = format!("{base}_{}", mode.flat_suffix());

    let (field, value) = if student.record.student_id.is_empty() {
        ("studentName", student.record.name.as_str())
    } else {
        ("studentId", student.record.student_id.as_str())
    };
    match store.query_eq(&collection, field, value).await {
        Ok(docs) => {
            let semester = student.record.semester.as_str();
            if let Some(doc) = docs
                .iter()
                .find(|d| d.data.get("semester").and_then(Value::as_str) == Some(semester))
            {
                return Some(previous_from(doc));
            }
        }
        Err(e) => {
            warn!(collection = collection.as_str(), error = %e, "duplicate check by student failed, treating as fresh");
        }
    }

    match store.query_eq(&collection, "accessKey", key).await {
        Ok(docs) => {
            if let Some(doc) = docs.first() {
                return Some(previous_from(doc));
            }
        }
        Err(e) => {
            warn!(collection = collection.as_str(), error = %e, "duplicate check by key failed, treating as fresh");
        }
    }

    None
}

fn previous_from(doc: &StoredDoc) -> PreviousSubmission {
    let submitted_on = ["timestamp", "createdAt", "submittedAt"]
        .iter()
        .find_map(|field| doc.data.get(*field))
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    let submitter_name = doc
        .data
        .get("studentName")
        .and_then(Value::as_str)
        .map(str::to_string);
    PreviousSubmission {
        survey_id: doc.id.clone(),
        submitted_on,
        submitter_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use serde_json::json;

    async fn seed_student(store: &MemoryStore) {
        store
            .set_doc(
                STUDENTS,
                "stu1",
                &json!({
                    "name": "Alyssa Ramos",
                    "studentId": "2021-00123",
                    "section": "BSIT-4A",
                    "college": "COLLEGE OF COMPUTER STUDIES",
                    "program": "BS Information Technology",
                    "schoolYear": "2024-2025",
                    "semester": "1st",
                    "companyName": "Cloudtech Solutions Inc.",
                    "midtermsKey": "MID-ALR-7781",
                    "finalsKey": "ABC123",
                    "startDate": "2024-06-01"
                }),
                false,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn valid_fresh_key_resolves_student_context() {
        let store = MemoryStore::new();
        seed_student(&store).await;

        let result = validate(&store, SurveyRole::Student, EvaluationMode::Final, "ABC123").await;
        match result {
            KeyValidation::Fresh { student } => {
                assert_eq!(student.doc_id, "stu1");
                assert_eq!(student.record.student_id, "2021-00123");
            }
            other => panic!("expected Fresh, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reused_key_string_reports_prior_submission() {
        let store = MemoryStore::new();
        seed_student(&store).await;
        store
            .set_doc(
                "studentSurveys_final",
                "prior-1",
                &json!({
                    "studentName": "Someone Else",
                    "studentId": "2021-99999",
                    "semester": "2nd",
                    "accessKey": "ABC123",
                    "timestamp": "2025-01-10T08:00:00Z"
                }),
                false,
            )
            .await
            .unwrap();

        let result = validate(&store, SurveyRole::Student, EvaluationMode::Final, "ABC123").await;
        match result {
            KeyValidation::AlreadySubmitted { previous, .. } => {
                assert_eq!(previous.survey_id, "prior-1");
                assert_eq!(previous.submitted_on.as_deref(), Some("2025-01-10T08:00:00Z"));
                assert_eq!(previous.submitter_name.as_deref(), Some("Someone Else"));
            }
            other => panic!("expected AlreadySubmitted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_student_and_semester_counts_as_submitted() {
        let store = MemoryStore::new();
        seed_student(&store).await;
        store
            .set_doc(
                "studentSurveys_final",
                "prior-2",
                &json!({
                    "studentId": "2021-00123",
                    "semester": "1st",
                    "accessKey": "a-different-key",
                    "createdAt": "2025-01-11T08:00:00Z"
                }),
                false,
            )
            .await
            .unwrap();

        let result = validate(&store, SurveyRole::Student, EvaluationMode::Final, "ABC123").await;
        match result {
            KeyValidation::AlreadySubmitted { previous, .. } => {
                assert_eq!(previous.survey_id, "prior-2");
                assert_eq!(previous.submitted_on.as_deref(), Some("2025-01-11T08:00:00Z"));
            }
            other => panic!("expected AlreadySubmitted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_key_is_invalid() {
        let store = MemoryStore::new();
        let result = validate(&store, SurveyRole::Student, EvaluationMode::Final, "   ").await;
        match result {
            KeyValidation::Invalid { reason } => assert_eq!(reason, "empty key"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_key_is_invalid() {
        let store = MemoryStore::new();
        seed_student(&store).await;
        let result = validate(&store, SurveyRole::Student, EvaluationMode::Final, "NOPE").await;
        match result {
            KeyValidation::Invalid { reason } => assert_eq!(reason, "key not found"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn legacy_access_key_field_is_a_fallback() {
        let store = MemoryStore::new();
        store
            .set_doc(
                STUDENTS,
                "stu2",
                &json!({
                    "name": "Jomar Cruz",
                    "accessKey": "LEGACY-42",
                    "semester": "1st",
                    "startDate": "2024-06-15"
                }),
                false,
            )
            .await
            .unwrap();

        let result = validate(&store, SurveyRole::Student, EvaluationMode::Final, "LEGACY-42").await;
        assert!(matches!(result, KeyValidation::Fresh { .. }));
    }

    #[tokio::test]
    async fn concerns_role_matches_finals_key_even_in_midterm_mode() {
        let store = MemoryStore::new();
        seed_student(&store).await;

        let result =
            validate(&store, SurveyRole::Concerns, EvaluationMode::Midterm, "ABC123").await;
        assert!(matches!(result, KeyValidation::Fresh { .. }));

        // The midterm key is not accepted for concerns.
        let result =
            validate(&store, SurveyRole::Concerns, EvaluationMode::Midterm, "MID-ALR-7781").await;
        assert!(matches!(result, KeyValidation::Invalid { .. }));
    }

    #[tokio::test]
    async fn concerns_without_start_date_is_invalid() {
        let store = MemoryStore::new();
        store
            .set_doc(
                STUDENTS,
                "stu3",
                &json!({
                    "name": "Bea Santos",
                    "finalsKey": "FIN-BEA-1",
                    "startDate": ""
                }),
                false,
            )
            .await
            .unwrap();

        let result = validate(&store, SurveyRole::Concerns, EvaluationMode::Final, "FIN-BEA-1").await;
        match result {
            KeyValidation::Invalid { reason } => assert_eq!(reason, "start date not set"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    /// Store whose submission-collection queries always fail while student
    /// lookups keep working.
    struct FlakySubmissionQueries {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for FlakySubmissionQueries {
        async fn get_doc(
            &self,
            collection: &str,
            id: &str,
        ) -> Result<Option<serde_json::Value>, StoreError> {
            self.inner.get_doc(collection, id).await
        }

        async fn query_eq(
            &self,
            collection: &str,
            field: &str,
            value: &str,
        ) -> Result<Vec<StoredDoc>, StoreError> {
            if collection.starts_with("studentSurveys") {
                return Err(StoreError("query timed out".to_string()));
            }
            self.inner.query_eq(collection, field, value).await
        }

        async fn set_doc(
            &self,
            collection: &str,
            id: &str,
            data: &serde_json::Value,
            merge: bool,
        ) -> Result<(), StoreError> {
            self.inner.set_doc(collection, id, data, merge).await
        }

        async fn add_doc(
            &self,
            collection: &str,
            data: &serde_json::Value,
        ) -> Result<String, StoreError> {
            self.inner.add_doc(collection, data).await
        }

        async fn server_timestamp(&self) -> Result<serde_json::Value, StoreError> {
            self.inner.server_timestamp().await
        }
    }

    #[tokio::test]
    async fn failing_duplicate_check_still_validates_the_key() {
        let inner = MemoryStore::new();
        seed_student(&inner).await;
        let store = FlakySubmissionQueries { inner };

        let result = validate(&store, SurveyRole::Student, EvaluationMode::Final, "ABC123").await;
        assert!(matches!(result, KeyValidation::Fresh { .. }));
    }
}
