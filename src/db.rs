use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::store::{DocumentStore, StoreError, StoredDoc, STUDENTS};

/// Document-store adapter over a single Postgres JSONB table. Collections are
/// plain names; the hierarchical mirror paths are stored as slash-joined
/// collection names.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    StoreError(e.to_string())
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get_doc(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = $1 AND doc_id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(|r| r.get("data")))
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<StoredDoc>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc_id, data FROM documents \
             WHERE collection = $1 AND data->>$2 = $3 \
             ORDER BY created_at",
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .into_iter()
            .map(|row| StoredDoc {
                id: row.get("doc_id"),
                data: row.get("data"),
            })
            .collect())
    }

    async fn set_doc(
        &self,
        collection: &str,
        id: &str,
        data: &Value,
        merge: bool,
    ) -> Result<(), StoreError> {
        let statement = if merge {
            "INSERT INTO documents (collection, doc_id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, doc_id) \
             DO UPDATE SET data = documents.data || EXCLUDED.data"
        } else {
            "INSERT INTO documents (collection, doc_id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, doc_id) \
             DO UPDATE SET data = EXCLUDED.data"
        };
        sqlx::query(statement)
            .bind(collection)
            .bind(id)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn add_doc(&self, collection: &str, data: &Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.set_doc(collection, &id, data, false).await?;
        Ok(id)
    }

    async fn server_timestamp(&self) -> Result<Value, StoreError> {
        let row = sqlx::query("SELECT now() AS now")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        let now: DateTime<Utc> = row.get("now");
        Ok(Value::String(now.to_rfc3339()))
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            data JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (collection, doc_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents (collection)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn seed(store: &PgStore) -> anyhow::Result<()> {
    let students = vec![
        (
            "2021-00123",
            json!({
                "name": "Alyssa Ramos",
                "studentId": "2021-00123",
                "section": "BSIT-4A",
                "college": "COLLEGE OF COMPUTER STUDIES",
                "program": "BS Information Technology",
                "schoolYear": "2024-2025",
                "semester": "1st",
                "companyName": "Cloudtech Solutions Inc.",
                "midtermsKey": "MID-ALR-7781",
                "finalsKey": "FIN-ALR-3349",
                "startDate": "2024-08-05"
            }),
        ),
        (
            "2021-00456",
            json!({
                "name": "Jomar Cruz",
                "studentId": "2021-00456",
                "section": "BSCS-4B",
                "college": "COLLEGE OF COMPUTER STUDIES",
                "program": "BS Computer Science",
                "schoolYear": "2024-2025",
                "semester": "1st",
                "companyName": "Harborline Logistics Corp.",
                "midtermsKey": "MID-JMC-1204",
                "finalsKey": "FIN-JMC-8872",
                "startDate": "2024-08-12"
            }),
        ),
        (
            // Older record still on the single-key layout, start date unset.
            "2020-00789",
            json!({
                "name": "Bea Santos",
                "studentId": "2020-00789",
                "section": "BSA-4A",
                "college": "COLLEGE OF BUSINESS AND ACCOUNTANCY",
                "program": "BS Accountancy",
                "schoolYear": "2024-2025",
                "semester": "1st",
                "companyName": "Meridian Audit Partners",
                "accessKey": "OJT-BEA-2020",
                "startDate": ""
            }),
        ),
    ];

    for (doc_id, record) in students {
        store.set_doc(STUDENTS, doc_id, &record, false).await?;
    }

    store
        .set_doc(
            "settings",
            "access",
            &json!({"lockStudentAccess": false, "lockCompanyAccess": false}),
            false,
        )
        .await?;

    Ok(())
}

pub async fn import_csv(store: &PgStore, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        student_id: String,
        section: String,
        college: String,
        program: String,
        school_year: String,
        semester: String,
        company_name: String,
        midterms_key: String,
        finals_key: String,
        start_date: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let doc_id = if row.student_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            row.student_id.clone()
        };

        let record = json!({
            "name": row.name,
            "studentId": row.student_id,
            "section": row.section,
            "college": row.college,
            "program": row.program,
            "schoolYear": row.school_year,
            "semester": row.semester,
            "companyName": row.company_name,
            "midtermsKey": row.midterms_key,
            "finalsKey": row.finals_key,
            "startDate": row.start_date.unwrap_or_default()
        });
        store.set_doc(STUDENTS, &doc_id, &record, false).await?;
        imported += 1;
    }

    Ok(imported)
}
