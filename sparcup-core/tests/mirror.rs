use sparcup_core::config::UploadConfig;
use sparcup_core::manifest::ManifestRow;
use sparcup_core::mirror::{DirRemote, PackageMeta, PACKAGE_FILES, PACKAGE_META};
use sparcup_core::orchestrate::{CancelToken, RunContext, Uploader};
use sparcup_core::remote::{Channel, Remote, UploadReceipt};
use std::fs;
use std::path::Path;

fn read_meta(path: &Path) -> PackageMeta {
    serde_json::from_reader(fs::File::open(path.join(PACKAGE_META)).unwrap()).unwrap()
}

fn mirror_with_dataset(name: &str) -> (tempfile::TempDir, DirRemote) {
    let td = tempfile::tempdir().unwrap();
    fs::create_dir_all(td.path().join("mirror").join(name)).unwrap();
    let remote = DirRemote::open(&td.path().join("mirror")).unwrap();
    (td, remote)
}

#[test]
fn unknown_dataset_is_not_found() {
    let (_td, mut remote) = mirror_with_dataset("DS");
    assert!(remote.dataset("Other").is_err());
    assert!(remote.dataset("..").is_err());
    assert!(remote.dataset("DS").unwrap().is_collection());
}

#[test]
fn upload_run_writes_packages_and_renames_them() {
    let (td, mut remote) = mirror_with_dataset("DS");
    let src = td.path().join("src");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("img1.nii"), b"nifti").unwrap();
    fs::write(src.join("a.txt"), b"a").unwrap();
    fs::write(src.join("b.txt"), b"b").unwrap();
    let rows = vec![
        ManifestRow {
            line: 5,
            top: Some("primary".into()),
            subject: Some("S01".into()),
            folder: Some("anat".into()),
            source: Some("img1.nii".into()),
            ..Default::default()
        },
        ManifestRow { line: 6, source: Some("[a.txt,b.txt]".into()), ..Default::default() },
    ];
    let cfg = UploadConfig::default().without_delays();
    let root = remote.dataset("DS").unwrap();

    let mut ctx = RunContext::new(CancelToken::new());
    let s = Uploader::new(&mut remote, &cfg, root, &src).run(&rows, &mut ctx);

    assert!(s.completed());
    assert_eq!(s.uploaded, 3);
    assert_eq!(s.conform.renamed, 2);
    let anat = td.path().join("mirror/DS/primary/sub-S01/anat");
    let first = read_meta(&anat.join("pkg-00001"));
    assert_eq!(first.name, "sub-S01_img1.nii");
    assert_eq!(first.channel, Channel::Api);
    assert!(chrono::DateTime::parse_from_rfc3339(&first.created_utc).is_ok());
    assert_eq!(fs::read(anat.join("pkg-00001/files/img1.nii")).unwrap(), b"nifti");
    let group = read_meta(&anat.join("pkg-00002"));
    assert_eq!(group.name, "sub-S01_a.txt_txt");
    assert_eq!(group.sources.len(), 2);

    // A second pass finds both packages and leaves them alone.
    let root = remote.dataset("DS").unwrap();
    let mut ctx = RunContext::new(CancelToken::new());
    let s = Uploader::new(&mut remote, &cfg, root, &src).run(&rows, &mut ctx);
    assert_eq!(s.uploaded, 0);
    assert_eq!(s.duplicates, 2);
    assert!(!anat.join("pkg-00003").exists());
}

#[test]
fn rename_to_a_taken_name_is_rejected() {
    let (td, mut remote) = mirror_with_dataset("DS");
    let f = td.path().join("x.txt");
    fs::write(&f, b"x").unwrap();
    let UploadReceipt::Packages(a) = remote.upload_single(&"DS".to_string(), &f, Channel::Api).unwrap() else {
        panic!("expected package ids")
    };
    let UploadReceipt::Packages(b) = remote.upload_single(&"DS".to_string(), &f, Channel::Api).unwrap() else {
        panic!("expected package ids")
    };

    remote.rename(&a[0], "taken").unwrap();
    let err = remote.rename(&b[0], "taken").unwrap_err();
    assert!(err.to_string().contains("already exists"), "{err}");
    remote.rename(&a[0], "taken").unwrap();
}

#[test]
fn collection_names_cannot_escape_the_mirror() {
    let (_td, mut remote) = mirror_with_dataset("DS");
    let ds = "DS".to_string();
    assert!(remote.create_collection(&ds, "..").is_err());
    assert!(remote.create_collection(&ds, "a/b").is_err());
    assert!(remote.get(&"DS/../DS".to_string()).is_err());
    remote.create_collection(&ds, "primary").unwrap();
    assert!(remote.create_collection(&ds, "primary").is_err());
}

#[test]
fn agent_channel_returns_no_ids() {
    let (td, mut remote) = mirror_with_dataset("DS");
    let f = td.path().join("x.txt");
    fs::write(&f, b"x").unwrap();
    let receipt = remote.upload_group(&"DS".to_string(), &[f], Channel::Agent).unwrap();
    assert_eq!(receipt, UploadReceipt::Detached);
    let kids = remote.list_children(&"DS".to_string()).unwrap();
    assert_eq!(kids.len(), 1);
    assert_eq!(kids[0].source_names().collect::<Vec<_>>(), vec!["x.txt"]);
}

#[test]
fn group_with_repeated_file_names_is_refused() {
    let (td, mut remote) = mirror_with_dataset("DS");
    let a = td.path().join("a");
    let b = td.path().join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    fs::write(a.join("x.txt"), b"first").unwrap();
    fs::write(b.join("x.txt"), b"second").unwrap();

    let err = remote.upload_group(&"DS".to_string(), &[a.join("x.txt"), b.join("x.txt")], Channel::Api).unwrap_err();

    assert!(err.to_string().contains("x.txt"), "{err}");
    assert!(remote.list_children(&"DS".to_string()).unwrap().is_empty());
    assert!(!td.path().join("mirror/DS/pkg-00001").exists());
}

#[test]
fn uploaded_file_named_like_the_metadata_is_kept() {
    let (td, mut remote) = mirror_with_dataset("DS");
    let f = td.path().join(PACKAGE_META);
    fs::write(&f, b"USERDATA").unwrap();

    let UploadReceipt::Packages(ids) = remote.upload_single(&"DS".to_string(), &f, Channel::Api).unwrap() else {
        panic!("expected package ids")
    };

    let pkg_dir = td.path().join("mirror").join(&ids[0]);
    assert_eq!(fs::read(pkg_dir.join(PACKAGE_FILES).join(PACKAGE_META)).unwrap(), b"USERDATA");
    let meta = read_meta(&pkg_dir);
    assert_eq!(meta.name, PACKAGE_META);
    assert_eq!(meta.sources, vec![format!("{}/{PACKAGE_FILES}/{PACKAGE_META}", ids[0])]);
    let node = remote.get(&ids[0]).unwrap();
    assert!(!node.is_collection());
    assert_eq!(node.source_names().collect::<Vec<_>>(), vec![PACKAGE_META]);
}
