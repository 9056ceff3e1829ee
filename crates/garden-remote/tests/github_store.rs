//! HTTP-level tests for `GithubStore` against a local mock server.

use garden_remote::{
    blob_hash, DeleteFileRequest, GithubConfig, GithubStore, NewTreeEntry, ObjectKind,
    PutFileRequest, RemoteError, RemoteStore,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPO: &str = "/repos/alice/garden";

fn sha(content: &str) -> String {
    blob_hash(content.as_bytes()).to_string()
}

async fn setup() -> (MockServer, GithubStore) {
    let server = MockServer::start().await;
    let store = GithubStore::new(
        GithubConfig::new("alice", "garden", "t0k3n").with_api_base_url(server.uri()),
    )
    .unwrap();
    (server, store)
}

#[tokio::test]
async fn list_tree_is_recursive_and_authenticated() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/git/trees/HEAD")))
        .and(query_param("recursive", "true"))
        .and(header("authorization", "Bearer t0k3n"))
        .and(header_exists("if-none-match"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": sha("root"),
            "truncated": false,
            "tree": [
                {"path": "src", "mode": "040000", "type": "tree", "sha": sha("dir")},
                {"path": "src/a.md", "mode": "100644", "type": "blob", "sha": sha("a"), "size": 1},
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = store.list_tree("HEAD").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, ObjectKind::Tree);
    assert_eq!(entries[1].path, "src/a.md");
    assert_eq!(entries[1].hash, blob_hash(b"a"));
}

#[tokio::test]
async fn get_file_returns_hash_and_payload() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/contents/notes/a.md")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "file",
            "path": "notes/a.md",
            "sha": sha("hi"),
            "encoding": "base64",
            "content": "aGk=\n",
        })))
        .mount(&server)
        .await;

    let file = store.get_file("notes/a.md", None).await.unwrap();
    assert_eq!(file.hash, blob_hash(b"hi"));
    assert_eq!(file.content_base64, "aGk=\n");
}

#[tokio::test]
async fn get_file_passes_ref_and_rejects_directories() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/contents/notes")))
        .and(query_param("ref", "gh-pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "file", "path": "notes/a.md", "sha": sha("a")}
        ])))
        .mount(&server)
        .await;

    let err = store.get_file("notes", Some("gh-pages")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/contents/nope.md")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    assert!(store.get_file("nope.md", None).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn put_file_sends_base64_and_concurrency_token() {
    let (server, store) = setup().await;
    Mock::given(method("PUT"))
        .and(path(format!("{REPO}/contents/notes/a.md")))
        .and(body_json(json!({
            "message": "Update content notes/a.md",
            "content": "aGkgdGhlcmU=",
            "sha": sha("hi"),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": {"sha": sha("hi there"), "path": "notes/a.md"},
            "commit": {"sha": sha("commit")},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let hash = store
        .put_file(PutFileRequest {
            path: "notes/a.md".into(),
            message: "Update content notes/a.md".into(),
            content_base64: "aGkgdGhlcmU=".into(),
            expected_hash: Some(blob_hash(b"hi")),
            branch: None,
        })
        .await
        .unwrap();
    assert_eq!(hash, blob_hash(b"hi there"));
}

#[tokio::test]
async fn stale_put_is_a_conflict() {
    let (server, store) = setup().await;
    Mock::given(method("PUT"))
        .and(path(format!("{REPO}/contents/notes/a.md")))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "does not match"})),
        )
        .mount(&server)
        .await;

    let err = store
        .put_file(PutFileRequest {
            path: "notes/a.md".into(),
            message: "Update content notes/a.md".into(),
            content_base64: "eA==".into(),
            expected_hash: Some(blob_hash(b"old")),
            branch: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Conflict { .. }));
}

#[tokio::test]
async fn delete_file_carries_sha() {
    let (server, store) = setup().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{REPO}/contents/notes/old.md")))
        .and(body_json(json!({"message": "Delete content notes/old.md", "sha": sha("old")})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": null})))
        .expect(1)
        .mount(&server)
        .await;

    store
        .delete_file(DeleteFileRequest {
            path: "notes/old.md".into(),
            message: "Delete content notes/old.md".into(),
            expected_hash: blob_hash(b"old"),
            branch: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn object_api_round() {
    let (server, store) = setup().await;

    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/blobs")))
        .and(body_json(json!({"content": "# A\n", "encoding": "utf-8"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sha": sha("# A\n")})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/trees")))
        .and(body_json(json!({
            "base_tree": sha("base"),
            "tree": [{"path": "notes/a.md", "mode": "100644", "type": "blob", "sha": sha("# A\n")}],
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sha": sha("tree")})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/commits")))
        .and(body_json(json!({
            "message": "Published multiple files",
            "tree": sha("tree"),
            "parents": [sha("head")],
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sha": sha("commit")})))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{REPO}/git/refs/heads/main")))
        .and(body_json(json!({"sha": sha("commit")})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ref": "refs/heads/main"})))
        .expect(1)
        .mount(&server)
        .await;

    let blob = store.create_blob("# A\n").await.unwrap();
    assert_eq!(blob, blob_hash(b"# A\n"));

    let tree = store
        .create_tree(&blob_hash(b"base"), &[NewTreeEntry::blob("notes/a.md", blob)])
        .await
        .unwrap();
    let commit = store
        .create_commit("Published multiple files", &tree, &[blob_hash(b"head")])
        .await
        .unwrap();
    store.update_ref("main", &commit).await.unwrap();
}

#[tokio::test]
async fn repository_metadata_and_head() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path(REPO))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": "alice/garden",
            "default_branch": "trunk",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/commits/HEAD")))
        .and(header_exists("if-none-match"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": sha("head"),
            "commit": {"message": "x", "tree": {"sha": sha("tree")}},
        })))
        .mount(&server)
        .await;

    assert_eq!(store.default_branch().await.unwrap(), "trunk");
    let head = store.latest_commit("HEAD").await.unwrap();
    assert_eq!(head.commit, blob_hash(b"head"));
    assert_eq!(head.tree, blob_hash(b"tree"));
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path(REPO))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&server)
        .await;

    let err = store.default_branch().await.unwrap_err();
    assert!(matches!(err, RemoteError::Unauthorized { status: 401, .. }));
}

#[tokio::test]
async fn garbage_body_is_malformed() {
    let (server, store) = setup().await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/git/blobs")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sha": "not-a-hash"})))
        .mount(&server)
        .await;

    let err = store.create_blob("x").await.unwrap_err();
    assert!(matches!(err, RemoteError::Malformed(_)), "got {err:?}");
}
