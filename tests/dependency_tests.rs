//! Dependency check endpoint tests.

mod common;

use axum::http::StatusCode;
use common::{sha256_hex, spawn_app, spawn_upstream};
use model_registry::models::NewModelFile;
use serde_json::json;

#[tokio::test]
async fn mixed_state_manifest_reports_missing_and_existing() {
    let app = spawn_app().await;

    // Seed: H1 registered at checkpoints/a.safetensors
    let h1 = sha256_hex(b"model one");
    let h2 = sha256_hex(b"model two");
    let dir = app.model_path("checkpoints");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("a.safetensors"), b"model one")
        .await
        .unwrap();
    app.state
        .catalog
        .insert_artifact(&NewModelFile {
            sha256: h1.clone(),
            file_path: "checkpoints/a.safetensors".into(),
            size_bytes: 9,
            source_url: None,
            metadata: json!({}),
        })
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .post(app.url("/models/check-dependencies"))
        .json(&json!({
            "dependencies": {
                "checkpoints": [
                    {
                        "filename": "b.safetensors",
                        "sha256": h1,
                        "size": 9,
                        "urls": ["https://huggingface.co/x/b.safetensors"],
                    },
                    {
                        "filename": "c.safetensors",
                        "sha256": h2,
                        "size": 250,
                        "urls": ["https://huggingface.co/x/c.safetensors"],
                        "requires_auth": true,
                        "auth_provider": "huggingface",
                    },
                ]
            }
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();

    let existing = body["existing"].as_array().unwrap();
    assert_eq!(existing.len(), 1);
    assert_eq!(existing[0]["filename"], "b.safetensors");
    assert_eq!(existing[0]["exists_at"], "checkpoints/a.safetensors");
    assert_eq!(existing[0]["type"], "checkpoints");
    assert_eq!(existing[0]["sha256"], h1);
    assert_eq!(existing[0]["action"], "symlink");

    let missing = body["missing"].as_array().unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0]["filename"], "c.safetensors");
    assert_eq!(missing[0]["type"], "checkpoints");
    assert_eq!(missing[0]["sha256"], h2);
    assert_eq!(missing[0]["requires_auth"], true);
    assert_eq!(missing[0]["auth_provider"], "huggingface");
    assert_eq!(
        missing[0]["urls"],
        json!(["https://huggingface.co/x/c.safetensors"])
    );

    assert_eq!(body["total_download_size"], 250);
    assert_eq!(body["total_saved_size"], 9);
}

#[tokio::test]
async fn resolver_does_not_mutate_state() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(app.url("/models/check-dependencies"))
        .json(&json!({
            "dependencies": {
                "loras": [{
                    "filename": "style.safetensors",
                    "sha256": sha256_hex(b"style"),
                    "size": 123,
                    "urls": ["https://civitai.com/api/download/models/1"],
                }]
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Nothing was written anywhere
    let stats: serde_json::Value = reqwest::get(app.url("/models/registry/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["artifact_count"], 0);
    assert_eq!(stats["alias_count"], 0);
    assert!(!app.model_path("loras/style.safetensors").exists());
}

#[tokio::test]
async fn forbidden_urls_are_not_handed_back() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(app.url("/models/check-dependencies"))
        .json(&json!({
            "dependencies": {
                "vae": [{
                    "filename": "v.safetensors",
                    "sha256": sha256_hex(b"vae"),
                    "size": 5,
                    "urls": [
                        "https://evil.example/v.safetensors",
                        "https://huggingface.co/x/v.safetensors",
                    ],
                }]
            }
        }))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["missing"][0]["urls"],
        json!(["https://huggingface.co/x/v.safetensors"])
    );
}

#[tokio::test]
async fn check_then_download_then_recheck_roundtrip() {
    let app = spawn_app().await;
    let payload = b"roundtrip payload".to_vec();
    let stub = spawn_upstream(payload.clone()).await;
    let sha = sha256_hex(&payload);
    let client = reqwest::Client::new();

    let manifest = json!({
        "dependencies": {
            "checkpoints": [{
                "filename": "rt.safetensors",
                "sha256": sha,
                "size": payload.len(),
                "urls": [stub.file_url("rt.safetensors")],
            }]
        }
    });

    // Initially missing
    let before: serde_json::Value = client
        .post(app.url("/models/check-dependencies"))
        .json(&manifest)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before["missing"].as_array().unwrap().len(), 1);
    assert_eq!(before["total_download_size"], payload.len() as u64);

    // Download it
    let download = client
        .post(app.url("/models/download"))
        .json(&json!({
            "url": stub.file_url("rt.safetensors"),
            "folder": "checkpoints",
            "filename": "rt.safetensors",
            "sha256": sha,
            "size": payload.len(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::OK);
    download.text().await.unwrap();

    // Now canonical under the requested name
    let after: serde_json::Value = client
        .post(app.url("/models/check-dependencies"))
        .json(&manifest)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(after["missing"].as_array().unwrap().is_empty());
    assert_eq!(after["existing"][0]["action"], "canonical");
    assert_eq!(after["total_download_size"], 0);
    assert_eq!(after["total_saved_size"], 0);
}
