//! HTTP implementation of the remote repository over the Xray and Jira REST APIs.
//!
//! Every request uses basic auth. A status other than the one the endpoint answers
//! with on success becomes [`RemoteError::Transport`] with the raw response body.

use crate::config::Config;
use async_trait::async_trait;
use beams_core::fields::{CustomField, CustomFieldMap};
use beams_core::model::{
    FieldDescriptor, Folder, IssueRecord, PreconditionPayload, RemoteTest, TestPayload,
};
use beams_core::remote::{
    precondition_fields, test_fields, RemoteError, RemoteRepository, Result,
    PRECONDITION_ISSUE_TYPE, TEST_ISSUE_TYPE,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    project_key: String,
    username: String,
    password: String,
    orphans_jql: String,
}

#[derive(Deserialize)]
struct TestList {
    #[serde(default)]
    tests: Vec<RemoteTest>,
}

#[derive(Deserialize)]
struct OrphanPage {
    #[serde(default)]
    total: u64,
    #[serde(default, rename = "testIssues")]
    test_issues: Vec<OrphanIssue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrphanIssue {
    id: i64,
    key: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    workflow_status_name: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    components: Vec<String>,
    #[serde(default)]
    test_type: String,
}

impl From<OrphanIssue> for RemoteTest {
    fn from(issue: OrphanIssue) -> Self {
        RemoteTest {
            id: issue.id,
            key: issue.key,
            summary: issue.summary,
            assignee: issue.assignee,
            rank: 0,
            workflow_status: issue.workflow_status_name,
            labels: issue.labels,
            components: issue.components,
            test_type: issue.test_type,
        }
    }
}

#[derive(Deserialize)]
struct SearchResult {
    #[serde(default)]
    issues: Vec<IssueRecord>,
}

#[derive(Deserialize)]
struct CreatedIssue {
    key: String,
}

impl JiraClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.jira_url(),
            project_key: config.project_key.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            orphans_jql: config.orphans_jql.clone(),
        })
    }

    fn folders_url(&self, tail: &str) -> String {
        format!(
            "{}/rest/raven/1.0/api/testrepository/{}/folders{}",
            self.base_url, self.project_key, tail
        )
    }

    fn structure_url(&self, endpoint: &str) -> String {
        format!("{}/rest/raven/1.0/folderStructure/{}", self.base_url, endpoint)
    }

    fn issue_url(&self, tail: &str) -> String {
        format!("{}/rest/api/2/{}", self.base_url, tail)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn send(&self, request: RequestBuilder, expected: StatusCode) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        let status = response.status();
        if status != expected {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Transport {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, expected: StatusCode) -> Result<T> {
        self.send(request, expected)
            .await?
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn search(&self, jql: &str, fields: &[&str], max_results: usize) -> Result<Vec<IssueRecord>> {
        let request = self.request(Method::GET, &self.issue_url("search")).query(&[
            ("jql", jql.to_string()),
            ("fields", fields.join(",")),
            ("maxResults", max_results.to_string()),
        ]);
        let result: SearchResult = self.send_json(request, StatusCode::OK).await?;
        Ok(result.issues)
    }

    fn issue_body(&self, issue_type: &str, mut fields: Map<String, Value>) -> Value {
        fields.insert("project".into(), json!({ "key": self.project_key }));
        fields.insert("issuetype".into(), json!({ "name": issue_type }));
        json!({ "fields": fields })
    }

    async fn create(&self, issue_type: &str, fields: Map<String, Value>) -> Result<String> {
        let request = self
            .request(Method::POST, &self.issue_url("issue"))
            .json(&self.issue_body(issue_type, fields));
        let created: CreatedIssue = self.send_json(request, StatusCode::CREATED).await?;
        Ok(created.key)
    }

    async fn update(&self, key: &str, fields: Map<String, Value>) -> Result<()> {
        let request = self
            .request(Method::PUT, &self.issue_url(&format!("issue/{}", key)))
            .json(&json!({ "fields": fields }));
        self.send(request, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteRepository for JiraClient {
    async fn get_fields(&self) -> Result<Vec<FieldDescriptor>> {
        let request = self.request(Method::GET, &self.issue_url("field"));
        self.send_json(request, StatusCode::OK).await
    }

    async fn get_folders(&self) -> Result<Vec<Folder>> {
        let request = self.request(Method::GET, &self.folders_url(""));
        let root: Folder = self.send_json(request, StatusCode::OK).await?;
        Ok(root.folders)
    }

    async fn create_folder(&self, parent_id: i64, name: &str) -> Result<Folder> {
        let request = self
            .request(Method::POST, &self.folders_url(&format!("/{}", parent_id)))
            .json(&json!({ "name": name }));
        self.send_json(request, StatusCode::OK).await
    }

    async fn update_folder(&self, id: i64, name: &str, rank: u32) -> Result<()> {
        let request = self
            .request(Method::PUT, &self.folders_url(&format!("/{}", id)))
            .json(&json!({ "name": name, "rank": rank }));
        self.send(request, StatusCode::OK).await?;
        Ok(())
    }

    async fn move_folder(&self, id: i64, destination_id: i64) -> Result<()> {
        let request = self
            .request(Method::PUT, &self.structure_url("moveFolders"))
            .query(&[
                ("destination", destination_id.to_string()),
                ("entityKey", self.project_key.clone()),
            ])
            .json(&[id]);
        self.send(request, StatusCode::OK).await?;
        Ok(())
    }

    async fn delete_folder(&self, id: i64) -> Result<()> {
        let request = self.request(Method::DELETE, &self.folders_url(&format!("/{}", id)));
        self.send(request, StatusCode::OK).await?;
        Ok(())
    }

    async fn get_tests(&self, folder_id: i64) -> Result<Vec<RemoteTest>> {
        let request = self.request(Method::GET, &self.folders_url(&format!("/{}/tests", folder_id)));
        let list: TestList = self.send_json(request, StatusCode::OK).await?;
        Ok(list.tests.into_iter().filter(RemoteTest::is_text_based).collect())
    }

    async fn get_orphans(&self) -> Result<Vec<RemoteTest>> {
        // A zero-size page reports the total; the second request fetches all of it.
        let page = |size: u64| {
            self.request(Method::GET, &self.structure_url("allOrphanTests"))
                .query(&[
                    ("entityKey", self.project_key.clone()),
                    ("pageStart", "0".to_string()),
                    ("pageSize", size.to_string()),
                    ("jql", self.orphans_jql.clone()),
                ])
        };
        let first: OrphanPage = self.send_json(page(0), StatusCode::OK).await?;
        if first.total == 0 {
            return Ok(Vec::new());
        }
        let full: OrphanPage = self.send_json(page(first.total), StatusCode::OK).await?;
        Ok(full.test_issues.into_iter().map(RemoteTest::from).collect())
    }

    async fn update_folder_tests(&self, folder_id: i64, add: &[String], remove: &[String])
    -> Result<()> {
        let request = self
            .request(Method::PUT, &self.folders_url(&format!("/{}/tests", folder_id)))
            .json(&json!({ "add": add, "remove": remove }));
        self.send(request, StatusCode::OK).await?;
        Ok(())
    }

    async fn sort_tests(&self, folder_id: i64, target_leaf: i64, test_ids: &[i64]) -> Result<()> {
        let request = self
            .request(Method::PUT, &self.structure_url("sortTests"))
            .query(&[
                ("folderId", folder_id.to_string()),
                ("targetLeaf", target_leaf.to_string()),
            ])
            .json(test_ids);
        self.send(request, StatusCode::OK).await?;
        Ok(())
    }

    async fn get_issues(&self, fields: &CustomFieldMap, keys: &[String])
    -> Result<Vec<IssueRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let jql = format!("project={} and key in ({})", self.project_key, keys.join(","));
        self.search(
            &jql,
            &[
                "issuetype",
                "summary",
                "description",
                "labels",
                fields.id(CustomField::TestRepositoryPath),
                fields.id(CustomField::TestType),
                fields.id(CustomField::ScenarioType),
                fields.id(CustomField::ScenarioSteps),
                fields.id(CustomField::PreconditionType),
                fields.id(CustomField::Conditions),
            ],
            keys.len(),
        )
        .await
    }

    async fn create_issue(&self, fields: &CustomFieldMap, test: &TestPayload) -> Result<String> {
        self.create(TEST_ISSUE_TYPE, test_fields(fields, test)).await
    }

    async fn update_issue(&self, fields: &CustomFieldMap, key: &str, test: &TestPayload)
    -> Result<()> {
        self.update(key, test_fields(fields, test)).await
    }

    async fn find_preconditions(&self, fields: &CustomFieldMap, label: Option<&str>)
    -> Result<Vec<IssueRecord>> {
        let mut jql = format!(
            "project={} and issuetype=\"{}\"",
            self.project_key, PRECONDITION_ISSUE_TYPE
        );
        if let Some(label) = label {
            jql.push_str(&format!(" and labels=\"{}\"", label));
        }
        let issues = self
            .search(
                &jql,
                &[
                    "issuetype",
                    "summary",
                    "description",
                    "labels",
                    fields.id(CustomField::PreconditionType),
                    fields.id(CustomField::Conditions),
                ],
                1000,
            )
            .await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.is_text_precondition(fields))
            .collect())
    }

    async fn create_precondition(&self, fields: &CustomFieldMap, pre: &PreconditionPayload)
    -> Result<String> {
        self.create(PRECONDITION_ISSUE_TYPE, precondition_fields(fields, pre))
            .await
    }

    async fn update_precondition(
        &self,
        fields: &CustomFieldMap,
        key: &str,
        pre: &PreconditionPayload,
    ) -> Result<()> {
        self.update(key, precondition_fields(fields, pre)).await
    }

    async fn set_labels(&self, key: &str, labels: &[String]) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("labels".into(), json!(labels));
        self.update(key, fields).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client() -> JiraClient {
        let config = Config {
            base_url: "https://jira.example.com/".to_string(),
            port: Some(8443),
            project_key: "BUG".to_string(),
            ..Config::default()
        };
        JiraClient::new(&config).unwrap()
    }

    /// Answer one request on a random local port with a canned response.
    async fn serve_once(status_line: &'static str, body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let port = listener.local_addr().expect("Failed to get local addr").port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("Failed to accept");
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.expect("Failed to read request");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let Some(header_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let headers = String::from_utf8_lossy(&request[..header_end]).to_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + content_length {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket
                .write_all(response.as_bytes())
                .await
                .expect("Failed to write response");
            socket.shutdown().await.ok();
        });
        port
    }

    fn local_client(port: u16) -> JiraClient {
        let config = Config {
            base_url: "http://127.0.0.1".to_string(),
            port: Some(port),
            username: "tester".to_string(),
            password: "secret".to_string(),
            project_key: "BUG".to_string(),
            ..Config::default()
        };
        JiraClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_error_status_keeps_response_body() {
        let body = r#"{"errorMessages":["Project BUG does not exist"]}"#;
        let port = serve_once("404 Not Found", body).await;

        let err = local_client(port).get_folders().await.unwrap_err();
        match err {
            RemoteError::Transport { status, body: raw } => {
                assert_eq!(status, 404);
                assert_eq!(raw, body);
            }
            other => panic!("Expected a transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_expects_no_content() {
        let port = serve_once("200 OK", "{}").await;
        let err = local_client(port)
            .set_labels("BUG-1", &["smoke".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_success_status_decodes_body() {
        let port = serve_once("200 OK", r#"{"tests":[]}"#).await;
        let tests = local_client(port).get_tests(7).await.unwrap();
        assert!(tests.is_empty());
    }

    #[test]
    fn test_endpoint_urls() {
        let client = client();
        assert_eq!(
            client.folders_url("/12/tests"),
            "https://jira.example.com:8443/rest/raven/1.0/api/testrepository/BUG/folders/12/tests"
        );
        assert_eq!(
            client.structure_url("sortTests"),
            "https://jira.example.com:8443/rest/raven/1.0/folderStructure/sortTests"
        );
        assert_eq!(
            client.issue_url("issue/BUG-1"),
            "https://jira.example.com:8443/rest/api/2/issue/BUG-1"
        );
    }

    #[test]
    fn test_issue_body_carries_project_and_type() {
        let client = client();
        let mut fields = Map::new();
        fields.insert("summary".into(), json!("s"));
        let body = client.issue_body(TEST_ISSUE_TYPE, fields);
        assert_eq!(body["fields"]["project"]["key"], "BUG");
        assert_eq!(body["fields"]["issuetype"]["name"], "Test");
        assert_eq!(body["fields"]["summary"], "s");
    }

    #[test]
    fn test_orphan_page_decodes() {
        let json = r#"{"total":1,"testIssues":[{"id":5,"key":"BUG-5","summary":"lost",
            "workflowStatusName":"Open","labels":[],"components":[],"testType":"Cucumber"}]}"#;
        let page: OrphanPage = serde_json::from_str(json).unwrap();
        let tests: Vec<RemoteTest> = page.test_issues.into_iter().map(RemoteTest::from).collect();
        assert_eq!(tests[0].key, "BUG-5");
        assert_eq!(tests[0].workflow_status, "Open");
        assert!(tests[0].is_text_based());
    }
}
