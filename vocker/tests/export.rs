//! Integration tests for flattening layers with qemu-img.

use vocker::{BuildOptions, DiskFormat, VockerError};
use vocker_test_utils::{TestHome, recording_tool};

async fn built_home(script: &str, tag: Option<&str>) -> (TestHome, String) {
    let home = TestHome::new();
    let options = BuildOptions {
        tag: tag.map(str::to_string),
        ..Default::default()
    };
    let outcome = home.runtime().build(script, &options).await.unwrap();
    let name = outcome.identity().to_string();
    (home, name)
}

fn runtime_with_qemu_img(home: &TestHome, status: i32) -> (vocker::VockerRuntime, std::path::PathBuf) {
    let log = home.dir.path().join("qemu-img.log");
    let tool = recording_tool(home.dir.path(), "qemu-img", &log, status);

    let mut options = home.options();
    options.tools.qemu_img = tool.to_string_lossy().into_owned();
    (home.runtime_with_options(options), log)
}

#[tokio::test]
async fn export_converts_layer_to_raw() {
    let (home, name) = built_home("FROM base\nRUN make\n", None).await;
    let (runtime, log) = runtime_with_qemu_img(&home, 0);
    let dest = home.dir.path().join("out.img");

    runtime.export(&name, &dest, DiskFormat::Raw).await.unwrap();

    let source = home.images_dir().join(format!("{}.qcow2", name));
    let calls = std::fs::read_to_string(&log).unwrap();
    assert_eq!(
        calls.trim_end(),
        format!("convert -O raw {} {}", source.display(), dest.display())
    );
}

#[tokio::test]
async fn export_tag_as_qcow2() {
    let (home, name) = built_home("FROM base\nRUN make\n", Some("web")).await;
    assert_eq!(name, "web");

    let (runtime, log) = runtime_with_qemu_img(&home, 0);
    let dest = home.dir.path().join("web.qcow2");

    runtime.export("web", &dest, DiskFormat::Qcow2).await.unwrap();

    let calls = std::fs::read_to_string(&log).unwrap();
    let source = home.images_dir().join("web.qcow2");
    assert!(calls.starts_with("convert -O qcow2 "));
    assert!(calls.contains(&source.display().to_string()));
}

#[tokio::test]
async fn export_tool_failure_is_storage_error() {
    let (home, name) = built_home("FROM base\n", None).await;
    let (runtime, log) = runtime_with_qemu_img(&home, 1);

    let err = runtime
        .export(&name, &home.dir.path().join("out.img"), DiskFormat::Raw)
        .await
        .unwrap_err();

    assert!(matches!(err, VockerError::Storage(_)));
    assert!(err.to_string().contains(&name));
    assert!(log.exists());
}

#[tokio::test]
async fn export_skips_incomplete_layer() {
    let (home, name) = built_home("FROM base\nRUN make\n", None).await;
    let (runtime, log) = runtime_with_qemu_img(&home, 0);

    let mut meta = vocker::build::LayerMetadata::load(&home.images_dir(), &name)
        .unwrap()
        .unwrap();
    meta.complete = false;
    meta.save(&home.images_dir()).unwrap();

    let err = runtime
        .export(&name, &home.dir.path().join("out.img"), DiskFormat::Raw)
        .await
        .unwrap_err();

    assert!(matches!(err, VockerError::NotFound(_)));
    assert!(!log.exists());
}
