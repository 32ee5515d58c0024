use crate::models::{AccessSettings, SurveyRole};
use crate::store::{DocumentStore, StoreError};

const SETTINGS_COLLECTION: &str = "settings";
const SETTINGS_DOC: &str = "access";

/// Read the global lock flags. A missing settings document means unlocked.
pub async fn fetch(store: &dyn DocumentStore) -> Result<AccessSettings, StoreError> {
    match store.get_doc(SETTINGS_COLLECTION, SETTINGS_DOC).await? {
        Some(data) => Ok(serde_json::from_value(data).unwrap_or_default()),
        None => Ok(AccessSettings::default()),
    }
}

pub fn locked_for(settings: &AccessSettings, role: SurveyRole) -> bool {
    match role {
        SurveyRole::Student => settings.lock_student_access,
        SurveyRole::Company => settings.lock_company_access,
        SurveyRole::Concerns => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn missing_document_means_unlocked() {
        let store = MemoryStore::new();
        let settings = fetch(&store).await.unwrap();
        assert!(!locked_for(&settings, SurveyRole::Student));
        assert!(!locked_for(&settings, SurveyRole::Company));
    }

    #[tokio::test]
    async fn lock_flags_gate_their_role_only() {
        let store = MemoryStore::new();
        store
            .set_doc(
                "settings",
                "access",
                &json!({"lockStudentAccess": true, "lockCompanyAccess": false}),
                false,
            )
            .await
            .unwrap();

        let settings = fetch(&store).await.unwrap();
        assert!(locked_for(&settings, SurveyRole::Student));
        assert!(!locked_for(&settings, SurveyRole::Company));
        assert!(!locked_for(&settings, SurveyRole::Concerns));
    }
}
