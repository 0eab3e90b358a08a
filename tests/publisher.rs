//! CommandPublisher against real child processes.
#![cfg(unix)]

use themeforge::agent_core::{ArtifactBundle, CommandPublisher, Publisher};

fn bundle() -> ArtifactBundle {
    [
        ("layout/theme.liquid", "{{ content_for_layout }}"),
        ("assets/style.css", "body { margin: 0; }"),
    ]
    .into_iter()
    .collect()
}

fn sh(script: &str) -> CommandPublisher {
    CommandPublisher {
        program: "sh".into(),
        verb: vec!["-c".into(), script.into()],
        store: String::new(),
        fallback_dir: None,
    }
}

#[tokio::test]
async fn non_zero_exit_preserves_output_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("theme");
    let publisher = sh("printf 'Pushing theme...\\n'; printf 'Error: store  not found\\n' >&2; exit 3");

    let outcome = publisher.publish(&bundle(), &root).await;

    assert!(!outcome.success);
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.stdout, "Pushing theme...\n");
    assert_eq!(outcome.stderr, "Error: store  not found\n");
    assert!(outcome.diagnostic.is_none());
    // Files were still written.
    assert!(root.join("assets/style.css").is_file());
}

#[tokio::test]
async fn store_is_passed_as_flag() {
    let dir = tempfile::tempdir().unwrap();
    // `sh -c script arg0 arg1...`: positional args after the script.
    let publisher = CommandPublisher {
        program: "sh".into(),
        verb: vec!["-c".into(), "echo \"$@\"".into(), "publish".into()],
        store: "bakery.myshopify.com".into(),
        fallback_dir: None,
    };

    let outcome = publisher.publish(&bundle(), &dir.path().join("theme")).await;
    assert!(outcome.success);
    assert_eq!(outcome.stdout, "--store bakery.myshopify.com\n");
}

#[tokio::test]
async fn existing_files_are_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("theme");
    std::fs::create_dir_all(root.join("assets")).unwrap();
    std::fs::write(root.join("assets/style.css"), "stale").unwrap();

    let outcome = sh("cat assets/style.css").publish(&bundle(), &root).await;
    assert!(outcome.success);
    assert_eq!(outcome.stdout, "body { margin: 0; }");
}

#[tokio::test]
async fn escaping_key_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("theme");
    let escaping: ArtifactBundle = [("../evil.liquid", "x"), ("layout/theme.liquid", "y")]
        .into_iter()
        .collect();

    let outcome = sh("true").publish(&escaping, &root).await;
    assert!(!outcome.success);
    assert!(outcome.exit_code.is_none());
    assert!(!dir.path().join("evil.liquid").exists());
    assert!(!root.exists());
}

#[tokio::test]
async fn partly_written_root_is_not_published() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("theme");
    let marker = dir.path().join("ran");
    std::fs::create_dir_all(&root).unwrap();
    // A plain file where the layout directory has to go.
    std::fs::write(root.join("layout"), "not a directory").unwrap();

    let outcome = sh(&format!("touch {}", marker.display()))
        .publish(&bundle(), &root)
        .await;

    assert!(!outcome.success);
    assert!(outcome.exit_code.is_none());
    assert!(outcome.diagnostic.unwrap().contains("layout"));
    assert!(!marker.exists());
}

#[tokio::test]
async fn uncreatable_root_publishes_from_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "a file, not a directory").unwrap();
    let fallback = dir.path().join("fallback");
    std::fs::create_dir_all(&fallback).unwrap();

    let publisher = CommandPublisher {
        fallback_dir: Some(fallback.clone()),
        ..sh("pwd -P")
    };
    let outcome = publisher.publish(&bundle(), &blocker.join("theme")).await;

    assert!(outcome.success);
    assert_eq!(
        outcome.stdout.trim_end(),
        fallback.canonicalize().unwrap().display().to_string()
    );
    let diagnostic = outcome.diagnostic.unwrap();
    assert!(diagnostic.starts_with("failed to write"));
    assert!(diagnostic.contains("blocker"));
}
