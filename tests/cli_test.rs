//! Command Line Tests
//!
//! Runs the `cms-admin` binary against temporary configs, registries and
//! templates.

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn cms_admin() -> Command {
    let mut cmd = cargo_bin_cmd!("cms-admin");
    cmd.env_remove("RUST_LOG").args(["--log-level", "warn"]);
    cmd
}

/// Config with two registries, the second overriding the footer
fn widget_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("registries")).unwrap();

    fs::write(
        dir.path().join("registries/default.yaml"),
        r#"
name: default
priority: 100
widgets:
  core.Footer:
    component: DefaultFooter
    metadata:
      name: Footer
      category: layout
  core.Gallery:
    component: Gallery
    metadata:
      name: Gallery
      category: media
      tags: [images]
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("registries/brand.json"),
        json!({
            "name": "brand",
            "priority": 200,
            "widgets": {
                "core.Footer": {
                    "component": "BrandFooter",
                    "defaultConfig": {"columns": 4},
                    "metadata": {"name": "Brand Footer", "category": "branding"}
                }
            }
        })
        .to_string(),
    )
    .unwrap();

    fs::write(
        dir.path().join("cms-admin.yaml"),
        "registries:\n  - registries/default.yaml\n  - registries/brand.json\n",
    )
    .unwrap();

    dir
}

fn config_arg(dir: &Path) -> String {
    dir.join("cms-admin.yaml").display().to_string()
}

// =============================================================================
// Basics
// =============================================================================

#[test]
fn test_help_lists_subcommands() {
    cms_admin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("widgets"))
        .stdout(predicate::str::contains("render"));
}

#[test]
fn test_invalid_log_format_fails() {
    cms_admin()
        .args(["--log-format", "xml", "render", "missing.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log format"));
}

// =============================================================================
// Widgets
// =============================================================================

#[test]
fn test_widgets_list() {
    let dir = widget_project();
    cms_admin()
        .args(["--config", &config_arg(dir.path()), "widgets", "list"])
        .assert()
        .success()
        .stdout("core.Footer\ncore.Gallery\n");
}

#[test]
fn test_widgets_resolve_uses_override() {
    let dir = widget_project();
    cms_admin()
        .args([
            "--config",
            &config_arg(dir.path()),
            "widgets",
            "resolve",
            "core.Footer",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("BrandFooter"))
        .stdout(predicate::str::contains("\"columns\": 4"));
}

#[test]
fn test_widgets_resolve_unknown_type_fails() {
    let dir = widget_project();
    cms_admin()
        .args([
            "--config",
            &config_arg(dir.path()),
            "widgets",
            "resolve",
            "core.Missing",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Widget type 'core.Missing' is not supported",
        ));
}

#[test]
fn test_widgets_search_and_category() {
    let dir = widget_project();
    let config = config_arg(dir.path());

    cms_admin()
        .args(["--config", &config, "widgets", "search", "IMAGES"])
        .assert()
        .success()
        .stdout("core.Gallery\n");

    cms_admin()
        .args(["--config", &config, "widgets", "category", "branding"])
        .assert()
        .success()
        .stdout("core.Footer\n");
}

#[test]
fn test_widgets_info_is_json() {
    let dir = widget_project();
    let output = cms_admin()
        .args(["--config", &config_arg(dir.path()), "widgets", "info"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let info: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(info[0]["name"], "brand");
    assert_eq!(info[1]["name"], "default");
    assert_eq!(info[1]["widgetCount"], 2);
}

#[test]
fn test_missing_config_fails() {
    cms_admin()
        .args(["--config", "/nonexistent/cms-admin.yaml", "widgets", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

// =============================================================================
// Render
// =============================================================================

#[test]
fn test_render_template_with_context() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("gallery.html");
    let context = dir.path().join("context.json");

    fs::write(
        &template,
        "<h1>{{title}}</h1>{{#images}}<img src=\"{{src}}\" alt=\"{{alt}}\">{{/images}}{{^images}}empty{{/images}}",
    )
    .unwrap();
    fs::write(
        &context,
        json!({
            "title": "Cats & Dogs",
            "images": [{"src": "a.png", "alt": "A"}, {"src": "b.png", "alt": "<B>"}]
        })
        .to_string(),
    )
    .unwrap();

    cms_admin()
        .arg("render")
        .arg(&template)
        .arg("--context")
        .arg(&context)
        .assert()
        .success()
        .stdout(
            "<h1>Cats &amp; Dogs</h1><img src=\"a.png\" alt=\"A\"><img src=\"b.png\" alt=\"&lt;B&gt;\">",
        );
}

#[test]
fn test_render_without_context_uses_empty_object() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("empty.html");
    fs::write(&template, "{{^images}}No images{{/images}}").unwrap();

    cms_admin()
        .arg("render")
        .arg(&template)
        .assert()
        .success()
        .stdout("No images");
}

#[test]
fn test_render_invalid_template_fails() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("broken.html");
    fs::write(&template, "{{#images}}<img>").unwrap();

    cms_admin()
        .arg("render")
        .arg(&template)
        .assert()
        .failure()
        .stderr(predicate::str::contains("never closed"));
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_against_mock_endpoint() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = dir.path().join("cms-admin.yaml");
    fs::write(
        &config,
        format!(
            "upload:\n  pump_delay_ms: 1\ntransport:\n  endpoint: \"{}/upload\"\n",
            server.uri()
        ),
    )
    .unwrap();
    let first = dir.path().join("one.png");
    let second = dir.path().join("two.png");
    fs::write(&first, vec![1u8; 64]).unwrap();
    fs::write(&second, vec![2u8; 64]).unwrap();

    // The binary blocks, so keep it off the runtime serving the mock
    let output = tokio::task::spawn_blocking(move || {
        cms_admin()
            .arg("--config")
            .arg(&config)
            .args(["upload", "--namespace", "media"])
            .arg(&first)
            .arg(&second)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    output
        .assert()
        .success()
        .stdout(predicate::str::contains("one.png\tcompleted"))
        .stdout(predicate::str::contains("two.png\tcompleted"));
}

#[test]
fn test_upload_requires_transport_section() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("cms-admin.yaml");
    fs::write(&config, "upload:\n  max_retries: 1\n").unwrap();
    let file = dir.path().join("a.png");
    fs::write(&file, b"png").unwrap();

    cms_admin()
        .arg("--config")
        .arg(&config)
        .args(["upload", "--namespace", "media"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("transport section"));
}
