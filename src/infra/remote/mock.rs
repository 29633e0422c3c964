//! wiremock-based mock server for both repository backends.
//!
//! Direct API mocks go through the builder API:
//!
//! ```ignore
//! let mock = RemoteMockServer::start().await;
//! let ctx = mock.repo("acme", "docs");
//!
//! ctx.contents("a.xml").get("main", "blob-1", "<topic/>").await;
//! ctx.contents("a.xml").put_expecting_sha("blob-1", "commit-2", "blob-2").await;
//! ctx.git_ref("main", "head-1").await;
//! ctx.branch("feature-1").await;
//! ctx.fork_into("me").await;
//! ```
//!
//! Gateway mocks answer one endpoint with a status-tagged envelope:
//!
//! ```ignore
//! mock.gateway("commit", json!({"status": "ok", "commitSha": "c1", "fileSha": "b1"})).await;
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{Committer, DirectClient, GatewayClient};

const GATEWAY_PREFIX: &str = "/gateway";

pub struct RemoteMockServer {
    server: MockServer,
}

impl RemoteMockServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn direct_client(&self) -> DirectClient {
        DirectClient::new(&self.server.uri(), "test-token").unwrap()
    }

    pub fn gateway_url(&self) -> String {
        format!("{}{GATEWAY_PREFIX}", self.server.uri())
    }

    pub fn gateway_client(&self) -> GatewayClient {
        GatewayClient::new(
            &self.gateway_url(),
            Committer {
                name: "Test User".into(),
                email: "test@example.com".into(),
            },
        )
        .unwrap()
    }

    pub fn repo<'a>(&'a self, owner: &'a str, repo: &'a str) -> MockRepoContext<'a> {
        MockRepoContext {
            server: &self.server,
            owner,
            repo,
        }
    }

    /// Mock `POST /gateway/{endpoint}` answering 200 with `reply`.
    pub async fn gateway(&self, endpoint: &str, reply: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(format!("{GATEWAY_PREFIX}/{endpoint}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&self.server)
            .await;
    }

    /// Like [`Self::gateway`], but only for requests whose body contains `needle`.
    pub async fn gateway_matching(&self, endpoint: &str, needle: &str, reply: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(format!("{GATEWAY_PREFIX}/{endpoint}")))
            .and(body_string_contains(needle))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&self.server)
            .await;
    }

    /// Like [`Self::gateway`], but only for requests carrying `token` as a bearer.
    pub async fn gateway_with_token(&self, endpoint: &str, token: &str, reply: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(format!("{GATEWAY_PREFIX}/{endpoint}")))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply))
            .mount(&self.server)
            .await;
    }

    /// Mock `POST /gateway/{endpoint}` failing with `status` for the first
    /// request only. Mount it before the mock that should answer afterwards.
    pub async fn gateway_http_status_once(&self, endpoint: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(format!("{GATEWAY_PREFIX}/{endpoint}")))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Mock `POST /gateway/{endpoint}` failing with an HTTP status.
    pub async fn gateway_http_status(&self, endpoint: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(format!("{GATEWAY_PREFIX}/{endpoint}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }
}

pub struct MockRepoContext<'a> {
    server: &'a MockServer,
    owner: &'a str,
    repo: &'a str,
}

impl<'a> MockRepoContext<'a> {
    fn url(&self, rest: &str) -> String {
        format!("/repos/{}/{}/{rest}", self.owner, self.repo)
    }

    pub fn contents(&self, file_path: &'a str) -> MockContentsBuilder<'a> {
        MockContentsBuilder {
            server: self.server,
            owner: self.owner,
            repo: self.repo,
            path: file_path,
        }
    }

    /// Mock `GET git/ref/heads/{branch}`.
    pub async fn git_ref(&self, branch: &str, sha: &str) {
        Mock::given(method("GET"))
            .and(path(self.url(&format!("git/ref/heads/{branch}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ref": format!("refs/heads/{branch}"),
                "object": { "sha": sha, "type": "commit" }
            })))
            .mount(self.server)
            .await;
    }

    /// Every `GET git/ref/heads/*` answers 404.
    pub async fn git_ref_not_found(&self) {
        Mock::given(method("GET"))
            .and(path_regex(format!(
                "^/repos/{}/{}/git/ref/heads/.*$",
                self.owner, self.repo
            )))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })),
            )
            .mount(self.server)
            .await;
    }

    pub async fn create_ref_already_exists(&self) {
        Mock::given(method("POST"))
            .and(path(self.url("git/refs")))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Reference already exists"
            })))
            .mount(self.server)
            .await;
    }

    /// Mock `POST git/refs` that only succeeds for the given source sha.
    pub async fn create_ref_expecting_sha(&self, sha: &str) {
        Mock::given(method("POST"))
            .and(path(self.url("git/refs")))
            .and(body_string_contains(format!(r#""sha":"{sha}""#)))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "ref": "refs/heads/new",
                "object": { "sha": sha, "type": "commit" }
            })))
            .expect(1)
            .mount(self.server)
            .await;
    }

    /// Mock `GET branches/{name}` for an existing branch.
    pub async fn branch(&self, name: &str) {
        Mock::given(method("GET"))
            .and(path(self.url(&format!("branches/{name}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": name })))
            .mount(self.server)
            .await;
    }

    pub async fn branch_missing(&self, name: &str) {
        Mock::given(method("GET"))
            .and(path(self.url(&format!("branches/{name}"))))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Branch not found" })),
            )
            .mount(self.server)
            .await;
    }

    /// Mock `POST forks` creating the fork under `owner`.
    pub async fn fork_into(&self, owner: &str) {
        Mock::given(method("POST"))
            .and(path(self.url("forks")))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "full_name": format!("{owner}/{}", self.repo),
                "html_url": format!("https://github.com/{owner}/{}", self.repo),
            })))
            .mount(self.server)
            .await;
    }

    /// Mock `POST pulls` for a pull request from `head` into `base`.
    pub async fn pull_request(&self, head: &str, base: &str, number: u64) {
        Mock::given(method("POST"))
            .and(path(self.url("pulls")))
            .and(body_string_contains(format!(r#""head":"{head}""#)))
            .and(body_string_contains(format!(r#""base":"{base}""#)))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "number": number,
                "html_url": format!("https://github.com/{}/{}/pull/{number}", self.owner, self.repo),
            })))
            .mount(self.server)
            .await;
    }

    /// Mock the blob/tree/commit calls that stage a commit on `head`.
    pub async fn stage_objects(&self, head: &str, staged: &str) {
        Mock::given(method("GET"))
            .and(path(self.url(&format!("git/commits/{head}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": head,
                "tree": { "sha": "tree-0" }
            })))
            .mount(self.server)
            .await;
        Mock::given(method("POST"))
            .and(path(self.url("git/blobs")))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "blob-staged" })))
            .mount(self.server)
            .await;
        Mock::given(method("POST"))
            .and(path(self.url("git/trees")))
            .and(body_string_contains(r#""base_tree":"tree-0""#))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "tree-1" })))
            .mount(self.server)
            .await;
        Mock::given(method("POST"))
            .and(path(self.url("git/commits")))
            .and(body_string_contains(format!(r#""parents":["{head}"]"#)))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": staged })))
            .mount(self.server)
            .await;
    }

    /// Mock a readable parent commit whose object writes answer 404, as GitHub
    /// does for tokens without push access.
    pub async fn stage_objects_denied(&self, head: &str) {
        Mock::given(method("GET"))
            .and(path(self.url(&format!("git/commits/{head}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": head,
                "tree": { "sha": "tree-0" }
            })))
            .mount(self.server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(format!(
                r"^/repos/{}/{}/git/(blobs|trees|commits)$",
                self.owner, self.repo
            )))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })),
            )
            .mount(self.server)
            .await;
    }

    /// Mock `GET compare/{from}...{to}` with one changed file.
    pub async fn compare(&self, from: &str, to: &str) {
        Mock::given(method("GET"))
            .and(path(self.url(&format!("compare/{from}...{to}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "html_url": format!("https://github.com/{}/{}/compare/{from}...{to}", self.owner, self.repo),
                "permalink_url": format!(
                    "https://github.com/{o}/{r}/compare/{o}:{from}...{o}:{to}",
                    o = self.owner,
                    r = self.repo
                ),
                "files": [{
                    "filename": "topics/a.xml",
                    "status": "modified",
                    "patch": "@@ -1 +1 @@\n-old\n+new"
                }]
            })))
            .mount(self.server)
            .await;
    }
}

pub struct MockContentsBuilder<'a> {
    server: &'a MockServer,
    owner: &'a str,
    repo: &'a str,
    path: &'a str,
}

impl MockContentsBuilder<'_> {
    fn url(&self) -> String {
        format!("/repos/{}/{}/contents/{}", self.owner, self.repo, self.path)
    }

    /// Mock `GET contents/{path}?ref={branch}`.
    pub async fn get(&self, branch: &str, sha: &str, content: &str) {
        // The API wraps base64 content at 60 columns.
        let encoded = STANDARD.encode(content.as_bytes());
        let wrapped = encoded
            .as_bytes()
            .chunks(60)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join("\n");

        Mock::given(method("GET"))
            .and(path(self.url()))
            .and(query_param("ref", branch))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "file",
                "encoding": "base64",
                "path": self.path,
                "sha": sha,
                "content": format!("{wrapped}\n"),
            })))
            .mount(self.server)
            .await;
    }

    pub async fn get_not_found(&self) {
        Mock::given(method("GET"))
            .and(path(self.url()))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })),
            )
            .mount(self.server)
            .await;
    }

    /// Mock a `PUT contents/{path}` that must carry the expected blob sha.
    pub async fn put_expecting_sha(&self, expected: &str, commit_sha: &str, blob_sha: &str) {
        Mock::given(method("PUT"))
            .and(path(self.url()))
            .and(body_string_contains(format!(r#""sha":"{expected}""#)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": { "sha": blob_sha, "path": self.path },
                "commit": {
                    "sha": commit_sha,
                    "html_url": format!("https://github.com/{}/{}/commit/{commit_sha}", self.owner, self.repo),
                }
            })))
            .expect(1)
            .mount(self.server)
            .await;
    }

    pub async fn put_fails(&self, status: u16, body: &str) {
        Mock::given(method("PUT"))
            .and(path(self.url()))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(self.server)
            .await;
    }
}
