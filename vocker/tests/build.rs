//! Integration tests for building scripts end to end with recording
//! collaborators.

use vocker::build::LayerMetadata;
use vocker::disk::Qcow2Helper;
use vocker::{BuildOptions, VockerError};
use vocker_test_utils::{EditorCall, RecordingEditor, RecordingFetcher, TestHome};

fn image_path(home: &TestHome, name: &str) -> std::path::PathBuf {
    home.images_dir().join(format!("{}.qcow2", name))
}

// ============================================================================
// END TO END
// ============================================================================

#[tokio::test]
async fn env_then_run_builds_three_layers() {
    let home = TestHome::new();
    let runtime = home.runtime();

    let outcome = runtime
        .build("FROM base\nENV X=1\nRUN echo $X\n", &BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.layers.len(), 3);
    assert_eq!(outcome.layers[0], "base");
    assert_eq!(outcome.layer, outcome.layers[2]);
    assert!(outcome.parse_errors.is_empty());
    assert_eq!(home.fetcher.templates(), vec!["base"]);

    // ENV produces its own image without touching the guest
    let env_image = image_path(&home, &outcome.layers[1]);
    assert!(env_image.is_file());
    assert!(home.editor.calls().iter().all(|c| c.image() != env_image));

    assert_eq!(home.editor.scripts(), vec!["export X=1 ; echo $X"]);
    assert_eq!(outcome.stats.cache_misses, 3);
}

#[tokio::test]
async fn layers_form_a_backing_chain() {
    let home = TestHome::new();
    let outcome = home
        .runtime()
        .build("FROM fedora:23\nRUN a\nRUN b\n", &BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.layers[0], "fedora-23");
    assert_eq!(home.fetcher.templates(), vec!["fedora-23"]);

    for pair in outcome.layers.windows(2) {
        let backing = Qcow2Helper::backing_file(&image_path(&home, &pair[1]))
            .unwrap()
            .unwrap();
        assert_eq!(
            backing,
            std::fs::canonicalize(image_path(&home, &pair[0])).unwrap()
        );
    }
}

#[tokio::test]
async fn cmd_installs_startup_script() {
    let home = TestHome::new();
    home.runtime()
        .build(
            "FROM base\nENV PORT 8080\nCMD /usr/bin/app --port $PORT\n",
            &BuildOptions::default(),
        )
        .await
        .unwrap();

    let calls = home.editor.calls();
    let EditorCall::Write { path, content, .. } = &calls[0] else {
        panic!("expected rc.local write first, got {:?}", calls[0]);
    };
    assert_eq!(path, "/etc/rc.d/rc.local");
    assert_eq!(
        content,
        "#!/bin/bash\n\nexport PORT=8080\n\n/usr/bin/app --port $PORT"
    );
    assert!(home.editor.scripts().iter().any(|s| s.contains("autologin")));
}

// ============================================================================
// TOLERATED INPUT
// ============================================================================

#[tokio::test]
async fn unknown_directive_is_skipped() {
    let home = TestHome::new();
    let outcome = home
        .runtime()
        .build(
            "FROM base\nRUN one\nCOPY app /srv\nRUN two\nCMD app\n",
            &BuildOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.layers.len(), 4);
    assert_eq!(outcome.parse_errors.len(), 1);
    assert_eq!(outcome.parse_errors[0].line, 3);

    let scripts = home.editor.scripts();
    assert!(scripts.contains(&"one".to_string()));
    assert!(scripts.contains(&"two".to_string()));
    assert!(
        home.editor
            .calls()
            .iter()
            .any(|c| matches!(c, EditorCall::Write { content, .. } if content.ends_with("app")))
    );
}

#[tokio::test]
async fn bad_port_is_logged_and_build_continues() {
    let home = TestHome::new();
    let outcome = home
        .runtime()
        .build("FROM base\nEXPOSE http\nEXPOSE 8080\n", &BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.layers.len(), 3);
    assert!(image_path(&home, &outcome.layers[1]).is_file());
    assert_eq!(
        home.editor.scripts(),
        vec!["firewall-offline-cmd --add-port=8080/tcp"]
    );

    // The skipped step is still a complete, cacheable layer
    let meta = LayerMetadata::load(&home.images_dir(), &outcome.layers[1])
        .unwrap()
        .unwrap();
    assert!(meta.complete);
}

#[tokio::test]
async fn ignored_directives_make_no_guest_calls() {
    let home = TestHome::new();
    let outcome = home
        .runtime()
        .build(
            "FROM base\nMAINTAINER someone\nLABEL a=b\n",
            &BuildOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.layers.len(), 3);
    assert_eq!(home.editor.call_count(), 0);
}

// ============================================================================
// REJECTED INPUT
// ============================================================================

#[tokio::test]
async fn script_must_start_with_from() {
    let home = TestHome::new();
    let err = home
        .runtime()
        .build("RUN true\n", &BuildOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, VockerError::InvalidArgument(_)));
    assert_eq!(home.fetcher.call_count(), 0);
}

#[tokio::test]
async fn second_from_is_rejected() {
    let home = TestHome::new();
    let err = home
        .runtime()
        .build("FROM a\nRUN true\nFROM b\n", &BuildOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, VockerError::InvalidArgument(_)));
    assert_eq!(home.editor.call_count(), 0);
}

#[tokio::test]
async fn empty_script_is_rejected() {
    let home = TestHome::new();
    let err = home
        .runtime()
        .build("# nothing here\n", &BuildOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, VockerError::InvalidArgument(_)));
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn failed_guest_edit_leaves_nothing_cached() {
    let home = TestHome::with_fakes(RecordingFetcher::new(), RecordingEditor::failing_on("boom"));
    let script = "FROM base\nRUN ok\nRUN boom\n";

    let err = home
        .runtime()
        .build(script, &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VockerError::GuestAccess(_)));

    let plan = home.runtime().plan(script, &BuildOptions::default()).unwrap();
    let failed = &plan.layers[2];
    assert!(!failed.cached);
    assert!(!image_path(&home, &failed.name).exists());
    assert!(
        LayerMetadata::load(&home.images_dir(), &failed.name)
            .unwrap()
            .is_none()
    );

    // Layers before the failure are kept
    assert!(plan.layers[1].cached);

    // A working editor picks up at the failed step
    let editor = std::sync::Arc::new(RecordingEditor::new());
    let outcome = home
        .runtime_with_editor(editor.clone())
        .build(script, &BuildOptions::default())
        .await
        .unwrap();
    assert_eq!(editor.scripts(), vec!["boom"]);
    assert_eq!(outcome.layer, failed.name);
}

#[tokio::test]
async fn unavailable_template_aborts() {
    let home = TestHome::with_fakes(RecordingFetcher::failing(), RecordingEditor::new());
    let err = home
        .runtime()
        .build("FROM nope\nRUN true\n", &BuildOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, VockerError::Provisioning(_)));
    assert!(!image_path(&home, "nope").exists());
    assert_eq!(home.editor.call_count(), 0);
}

// ============================================================================
// TAGS AND LISTING
// ============================================================================

#[tokio::test]
async fn tag_derives_from_result() {
    let home = TestHome::new();
    let options = BuildOptions {
        tag: Some("web".into()),
        ..Default::default()
    };

    let outcome = home
        .runtime()
        .build("FROM base\nRUN make\n", &options)
        .await
        .unwrap();

    assert_eq!(outcome.tag.as_deref(), Some("web"));
    assert_eq!(outcome.identity(), "web");

    let backing = Qcow2Helper::backing_file(&image_path(&home, "web"))
        .unwrap()
        .unwrap();
    assert_eq!(
        backing,
        std::fs::canonicalize(image_path(&home, &outcome.layer)).unwrap()
    );

    // Tagging again recreates the tag on top of the new result
    let outcome = home
        .runtime()
        .build("FROM base\nRUN make install\n", &options)
        .await
        .unwrap();
    let backing = Qcow2Helper::backing_file(&image_path(&home, "web"))
        .unwrap()
        .unwrap();
    assert_eq!(
        backing,
        std::fs::canonicalize(image_path(&home, &outcome.layer)).unwrap()
    );
}

#[tokio::test]
async fn invalid_tag_is_rejected() {
    let home = TestHome::new();
    let options = BuildOptions {
        tag: Some("../escape".into()),
        ..Default::default()
    };

    let err = home
        .runtime()
        .build("FROM base\n", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, VockerError::InvalidArgument(_)));
    assert_eq!(home.fetcher.call_count(), 0);
}

#[tokio::test]
async fn tag_cannot_overwrite_base_of_chain() {
    let home = TestHome::new();
    let options = BuildOptions {
        tag: Some("base".into()),
        ..Default::default()
    };

    let err = home
        .runtime()
        .build("FROM base\nRUN make\n", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, VockerError::InvalidArgument(_)));

    // The base image is still a standalone image
    assert_eq!(
        Qcow2Helper::backing_file(&image_path(&home, "base")).unwrap(),
        None
    );

    let outcome = home
        .runtime()
        .build("FROM base\nRUN other\n", &BuildOptions::default())
        .await
        .unwrap();
    let backing = Qcow2Helper::backing_file(&image_path(&home, &outcome.layer))
        .unwrap()
        .unwrap();
    assert_eq!(
        backing,
        std::fs::canonicalize(image_path(&home, "base")).unwrap()
    );
    assert_eq!(home.fetcher.call_count(), 1);
}

#[tokio::test]
async fn tag_cannot_overwrite_other_base() {
    let home = TestHome::new();
    home.runtime()
        .build("FROM other\n", &BuildOptions::default())
        .await
        .unwrap();

    let options = BuildOptions {
        tag: Some("other".into()),
        ..Default::default()
    };
    let err = home
        .runtime()
        .build("FROM base\nRUN make\n", &options)
        .await
        .unwrap_err();

    assert!(matches!(err, VockerError::InvalidArgument(_)));
    assert_eq!(
        Qcow2Helper::backing_file(&image_path(&home, "other")).unwrap(),
        None
    );
    let meta = LayerMetadata::load(&home.images_dir(), "other").unwrap().unwrap();
    assert_eq!(meta.instruction, "FROM other");
}

#[tokio::test]
async fn tag_cannot_take_a_layer_name() {
    let home = TestHome::new();
    let first = home
        .runtime()
        .build("FROM base\nRUN make\n", &BuildOptions::default())
        .await
        .unwrap();

    let options = BuildOptions {
        tag: Some(first.layer.clone()),
        ..Default::default()
    };
    let err = home
        .runtime()
        .build("FROM base\nRUN other\n", &options)
        .await
        .unwrap_err();

    assert!(matches!(err, VockerError::InvalidArgument(_)));
    assert_eq!(home.editor.scripts(), vec!["make"]);
    assert!(home.runtime().plan("FROM base\n", &options).is_err());
}

#[tokio::test]
async fn images_lists_built_layers() {
    let home = TestHome::new();
    let options = BuildOptions {
        tag: Some("web".into()),
        ..Default::default()
    };
    let outcome = home
        .runtime()
        .build("FROM base\nRUN make\n", &options)
        .await
        .unwrap();

    let images = home.runtime().images().unwrap();
    let names: Vec<_> = images.iter().map(|m| m.name.as_str()).collect();

    assert!(names.contains(&"base"));
    assert!(names.contains(&outcome.layer.as_str()));

    let tag = images.iter().find(|m| m.name == "web").unwrap();
    assert_eq!(tag.instruction, "TAG web");
    assert_eq!(tag.parent.as_deref(), Some(outcome.layer.as_str()));
    assert!(images.iter().all(|m| m.complete));
}

#[tokio::test]
async fn build_file_reads_script_from_disk() {
    let home = TestHome::new();
    let script = home.dir.path().join("Dockerfile");
    std::fs::write(&script, "FROM base\nRUN \\\n  make\n").unwrap();

    let outcome = home
        .runtime()
        .build_file(&script, &BuildOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.layers.len(), 2);
    assert_eq!(home.editor.scripts(), vec!["make"]);
}
