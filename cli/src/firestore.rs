use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use reqwest::{RequestBuilder, Response, StatusCode, Url};

use goalseed_core::firestore::{
    CommitRequest, DatabaseName, ListDocumentsResponse, WireDocument, Write, build_create_write,
    build_set_write, decode_document,
};
use goalseed_core::models::{Document, Fields};
use goalseed_core::store::{DocumentStore, Page, SetMode};

const API_URL: &str = "https://firestore.googleapis.com/v1";
const EMULATOR_TOKEN: &str = "owner";
const AUTO_ID_LEN: usize = 20;

/// Firestore over its REST API, authenticated with a bearer token.
pub struct FirestoreClient {
    client: reqwest::Client,
    base_url: String,
    db: DatabaseName,
    token: String,
}

impl FirestoreClient {
    /// Connect to `project_id`. With `emulator_host` set, talk plain HTTP to the
    /// local emulator, which accepts the `owner` token.
    pub fn new(
        project_id: &str,
        access_token: Option<String>,
        emulator_host: Option<&str>,
    ) -> Result<Self> {
        let access_token = access_token.filter(|t| !t.trim().is_empty());
        let (base_url, token) = match emulator_host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(host) => (
                format!("http://{}/v1", host.trim_end_matches('/')),
                access_token.unwrap_or_else(|| EMULATOR_TOKEN.to_string()),
            ),
            None => {
                let token = access_token.context(
                    "No Firestore access token. Pass --access-token or set GOALSEED_ACCESS_TOKEN",
                )?;
                (API_URL.to_string(), token)
            }
        };

        let client = reqwest::Client::builder()
            .user_agent(format!("goalseed/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            db: DatabaseName::new(project_id),
            token,
        })
    }

    /// URL of a document or collection. Each path segment is percent-encoded,
    /// so ids containing `#`, `?` or `%` address the right document.
    fn document_url(&self, path: &str) -> Result<Url> {
        let root = format!("{}/{}", self.base_url, self.db.documents_root());
        let mut url =
            Url::parse(&root).with_context(|| format!("Invalid Firestore URL: {root}"))?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("Firestore URL cannot hold a path: {root}"))?
            .extend(path.split('/'));
        Ok(url)
    }

    fn commit_url(&self) -> String {
        format!("{}/{}:commit", self.base_url, self.db.documents_root())
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        req.bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to reach Firestore ({what})"))
    }

    async fn commit(&self, write: Write, what: &str) -> Result<()> {
        let req = self.client.post(self.commit_url()).json(&CommitRequest {
            writes: vec![write],
        });
        let resp = self.send(req, what).await?;
        ensure_success(resp, what).await?;
        Ok(())
    }
}

async fn ensure_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("Firestore {what} failed with HTTP {status}: {}", body.trim())
}

/// 20-character alphanumeric id, the same shape Firestore's client SDKs generate.
fn auto_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn list_documents(
        &self,
        collection: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page> {
        let what = format!("list of {collection}");
        let mut req = self
            .client
            .get(self.document_url(collection)?)
            .query(&[("pageSize", page_size.to_string())]);
        if let Some(token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }

        let resp = ensure_success(self.send(req, &what).await?, &what).await?;
        let body: ListDocumentsResponse = resp
            .json()
            .await
            .context("Failed to parse Firestore list response")?;

        let documents = body
            .documents
            .into_iter()
            .map(|d| decode_document(&self.db, d))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            documents,
            next_page_token: body.next_page_token,
        })
    }

    async fn get_document(&self, path: &str) -> Result<Option<Document>> {
        let what = format!("read of {path}");
        let resp = self
            .send(self.client.get(self.document_url(path)?), &what)
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = ensure_success(resp, &what).await?;
        let doc: WireDocument = resp
            .json()
            .await
            .context("Failed to parse Firestore document")?;
        Ok(Some(decode_document(&self.db, doc)?))
    }

    async fn set_document(&self, path: &str, fields: &Fields, mode: SetMode) -> Result<()> {
        let write = build_set_write(&self.db.document_name(path), fields, mode)?;
        self.commit(write, &format!("write of {path}")).await
    }

    async fn add_document(&self, collection: &str, fields: &Fields) -> Result<String> {
        let id = auto_id();
        let name = self.db.document_name(&format!("{collection}/{id}"));
        let write = build_create_write(&name, fields)?;
        self.commit(write, &format!("create in {collection}")).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goalseed_core::models::{GoalField, Value, user_goals_path, user_path};
    use goalseed_core::reconcile::{GoalReconciler, ReconcileOptions};

    #[test]
    fn test_requires_token_without_emulator() {
        let err = FirestoreClient::new("demo", None, None).err().unwrap();
        assert!(err.to_string().contains("access token"));

        assert!(FirestoreClient::new("demo", Some("  ".to_string()), None).is_err());
    }

    #[test]
    fn test_emulator_defaults() {
        let client = FirestoreClient::new("demo", None, Some("localhost:8080/")).unwrap();
        assert_eq!(client.token, "owner");
        assert_eq!(
            client.document_url("users/u1/goals/main").unwrap().as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/users/u1/goals/main"
        );
        assert_eq!(
            client.commit_url(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents:commit"
        );
    }

    #[test]
    fn test_production_urls() {
        let client = FirestoreClient::new("demo", Some("ya29.token".to_string()), Some("")).unwrap();
        assert_eq!(client.token, "ya29.token");
        assert_eq!(
            client.document_url("users").unwrap().as_str(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents/users"
        );
    }

    #[test]
    fn test_document_url_escapes_user_ids() {
        let client = FirestoreClient::new("demo", None, Some("localhost:8080")).unwrap();
        let root = "/v1/projects/demo/databases/(default)/documents";

        for (user_id, escaped) in [("a#b", "a%23b"), ("a?b", "a%3Fb"), ("a%2Fb", "a%252Fb")] {
            let url = client.document_url(&user_goals_path(user_id)).unwrap();
            assert_eq!(url.path(), format!("{root}/users/{escaped}/goals/main"));
            assert!(url.query().is_none());
            assert!(url.fragment().is_none());

            // The server decodes each segment back to the original id.
            let segments: Vec<_> = url.path_segments().unwrap().collect();
            assert_eq!(segments[segments.len() - 3], escaped);
        }

        let url = client.document_url("users").unwrap();
        assert_eq!(url.path(), format!("{root}/users"));
    }

    #[test]
    fn test_auto_id_shape() {
        let a = auto_id();
        let b = auto_id();
        assert_eq!(a.len(), AUTO_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    // --- Integration tests (need a running Firestore emulator) ---

    fn emulator_client() -> FirestoreClient {
        let host = std::env::var("FIRESTORE_EMULATOR_HOST")
            .expect("FIRESTORE_EMULATOR_HOST must point at a running emulator");
        FirestoreClient::new(&format!("goalseed-test-{}", auto_id().to_lowercase()), None, Some(&host))
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "needs the Firestore emulator"]
    async fn test_emulator_round_trip() {
        let client = emulator_client();
        assert!(client.get_document("users/u1").await.unwrap().is_none());

        let mut fields = Fields::new();
        fields.insert("calorieGoal".to_string(), Value::Integer(1800));
        client
            .set_document(&user_goals_path("u1"), &fields, SetMode::Overwrite)
            .await
            .unwrap();
        client
            .set_document(&user_path("u1"), &Fields::new(), SetMode::Merge)
            .await
            .unwrap();

        let report = GoalReconciler::new(&client, ReconcileOptions::default())
            .run()
            .await
            .unwrap();
        assert_eq!(report.updated, 1);

        let doc = client
            .get_document(&user_goals_path("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.fields["calorieGoal"], Value::Integer(1800));
        assert_eq!(
            doc.fields[GoalField::Carb.key()],
            Value::Integer(GoalField::Carb.default_value())
        );
    }

    #[tokio::test]
    #[ignore = "needs the Firestore emulator"]
    async fn test_emulator_add_and_page() {
        let client = emulator_client();
        for i in 0..5 {
            let mut fields = Fields::new();
            fields.insert("n".to_string(), Value::Integer(i));
            client.add_document("foods", &fields).await.unwrap();
        }

        let mut seen = 0;
        let mut token: Option<String> = None;
        loop {
            let page = client
                .list_documents("foods", 2, token.as_deref())
                .await
                .unwrap();
            seen += page.documents.len();
            match page.next_page_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }
        assert_eq!(seen, 5);
    }
}
