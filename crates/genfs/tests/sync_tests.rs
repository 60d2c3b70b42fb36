//! Sync engine: authoritative materialization into a sink.

use std::io;

use genfs::{Fs, GenFs, MemoryFs, WritableFs};

fn register_app(gfs: &GenFs) {
    gfs.generate_dir("bud/view", |_fs, mut dir| async move {
        dir.generate_file("index.svelte", |_fs, mut file| async move {
            file.data = b"<h1>index</h1>".to_vec();
            Ok(file)
        });
        dir.generate_file("about/about.svelte", |_fs, mut file| async move {
            file.data = b"<h2>about</h2>".to_vec();
            Ok(file)
        });
        Ok(dir)
    });
}

#[tokio::test]
async fn test_sync_writes_subtree() {
    let gfs = GenFs::new(MemoryFs::new());
    register_app(&gfs);

    let out = MemoryFs::new();
    gfs.sync(&out, "bud").await.unwrap();

    assert_eq!(out.read("bud/view/index.svelte").await.unwrap(), b"<h1>index</h1>");
    assert_eq!(
        out.read("bud/view/about/about.svelte").await.unwrap(),
        b"<h2>about</h2>"
    );
    assert!(out.stat("bud/view/about").await.unwrap().is_dir());
}

#[tokio::test]
async fn test_sync_includes_base_files() {
    let base = MemoryFs::from_files(&[("static/logo.svg", b"<svg/>".as_slice())]).await;
    let gfs = GenFs::new(base);
    register_app(&gfs);

    let out = MemoryFs::new();
    gfs.sync(&out, ".").await.unwrap();

    assert_eq!(out.read("static/logo.svg").await.unwrap(), b"<svg/>");
    assert_eq!(out.read("bud/view/index.svelte").await.unwrap(), b"<h1>index</h1>");
}

#[tokio::test]
async fn test_sync_is_authoritative() {
    let gfs = GenFs::new(MemoryFs::new());
    register_app(&gfs);

    let out = MemoryFs::new();
    out.write_file("bud/view/stale.svelte", b"stale", 0).await.unwrap();
    out.write_file("bud/view/old/gone.txt", b"gone", 0).await.unwrap();
    out.write_file("untouched.txt", b"keep", 0).await.unwrap();

    gfs.sync(&out, "bud").await.unwrap();

    // Stale entries under the prefix are pruned, including empty dirs.
    assert!(!out.exists("bud/view/stale.svelte").await);
    assert!(!out.exists("bud/view/old").await);
    // Entries outside the prefix are untouched.
    assert_eq!(out.read("untouched.txt").await.unwrap(), b"keep");
    // The synced view is complete.
    assert_eq!(out.read("bud/view/index.svelte").await.unwrap(), b"<h1>index</h1>");
}

#[tokio::test]
async fn test_sync_prefix_scopes_walk() {
    let gfs = GenFs::new(MemoryFs::new());
    register_app(&gfs);
    gfs.generate_file("outside.txt", |_fs, mut file| async move {
        file.data = b"outside".to_vec();
        Ok(file)
    });

    let out = MemoryFs::new();
    gfs.sync(&out, "bud/view").await.unwrap();

    assert!(out.exists("bud/view/index.svelte").await);
    assert!(!out.exists("outside.txt").await);
}

#[tokio::test]
async fn test_sync_preserves_mode() {
    let gfs = GenFs::new(MemoryFs::new());
    gfs.generate_file("bin/run.sh", |_fs, mut file| async move {
        file.data = b"#!/bin/sh\n".to_vec();
        file.mode = 0o755;
        Ok(file)
    });

    let out = MemoryFs::new();
    gfs.sync(&out, ".").await.unwrap();

    let stat = out.stat("bin/run.sh").await.unwrap();
    assert_eq!(stat.mode, 0o755);
}

#[tokio::test]
async fn test_sync_missing_prefix_fails() {
    let gfs = GenFs::new(MemoryFs::new());
    let out = MemoryFs::new();
    let err = gfs.sync(&out, "nope").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}

#[tokio::test]
async fn test_sync_aborts_on_generator_failure() {
    let gfs = GenFs::new(MemoryFs::new());
    gfs.generate_file("bud/broken.txt", |_fs, _file| async move {
        Err(io::Error::other("boom"))
    });
    let out = MemoryFs::new();
    let err = gfs.sync(&out, "bud").await.unwrap_err();
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_sync_file_prefix() {
    let gfs = GenFs::new(MemoryFs::new());
    gfs.generate_file("go.mod", |_fs, mut file| async move {
        file.data = b"module app.com".to_vec();
        Ok(file)
    });

    let out = MemoryFs::new();
    gfs.sync(&out, "go.mod").await.unwrap();
    assert_eq!(out.read("go.mod").await.unwrap(), b"module app.com");
}

#[tokio::test]
async fn test_repeated_sync_converges() {
    let base = MemoryFs::from_files(&[("assets/a.css", b"a{}".as_slice())]).await;
    let gfs = GenFs::new(base);
    register_app(&gfs);

    let out = MemoryFs::new();
    gfs.sync(&out, ".").await.unwrap();
    gfs.sync(&out, ".").await.unwrap();

    assert_eq!(out.read("assets/a.css").await.unwrap(), b"a{}");
    assert_eq!(out.read("bud/view/index.svelte").await.unwrap(), b"<h1>index</h1>");

    let names: Vec<_> = out
        .read_dir(".")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["assets", "bud"]);
}
