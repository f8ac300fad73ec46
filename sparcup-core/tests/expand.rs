use sparcup_core::error::FileIssue;
use sparcup_core::expand::{expand, preflight, UploadUnit};
use sparcup_core::manifest::Manifest;
use std::fs;
use std::path::Path;

fn touch(dir: &Path, names: &[&str]) {
    for n in names {
        let p = dir.join(n);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(p, n.as_bytes()).unwrap();
    }
}

#[test]
fn wildcard_matches_are_sorted_singles() {
    let td = tempfile::tempdir().unwrap();
    touch(td.path(), &["run2.nii", "run1.nii", "notes.txt", ".hidden.nii"]);
    fs::create_dir(td.path().join("dir.nii")).unwrap();

    let x = expand("run*.nii", td.path());

    assert!(x.issues.is_empty());
    assert_eq!(
        x.units,
        vec![UploadUnit::Single(td.path().join("run1.nii")), UploadUnit::Single(td.path().join("run2.nii"))]
    );
    assert_eq!(expand("*.nii", td.path()).units.len(), 2);
}

#[test]
fn bracketed_expressions_pool_into_one_group() {
    let td = tempfile::tempdir().unwrap();
    touch(td.path(), &["eeg/a.edf", "eeg/b.edf", "eeg/a.json"]);

    let x = expand("[eeg/*.edf, eeg/a.json]", td.path());

    assert_eq!(x.units.len(), 1);
    let UploadUnit::Group(files) = &x.units[0] else { panic!("expected a group, got {:?}", x.units) };
    let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
    assert_eq!(names, vec!["a.edf", "b.edf", "a.json"]);
}

#[test]
fn plain_list_uploads_each_match_alone() {
    let td = tempfile::tempdir().unwrap();
    touch(td.path(), &["a.txt", "b.txt"]);

    let x = expand(" a.txt , ,b.txt ", td.path());

    assert_eq!(x.units, vec![UploadUnit::Single(td.path().join("a.txt")), UploadUnit::Single(td.path().join("b.txt"))]);
}

#[test]
fn missing_members_are_reported_and_the_rest_kept() {
    let td = tempfile::tempdir().unwrap();
    touch(td.path(), &["a.txt"]);

    let x = expand("[a.txt,gone.txt,*.zip]", td.path());

    assert_eq!(x.units, vec![UploadUnit::Group(vec![td.path().join("a.txt")])]);
    assert_eq!(
        x.issues,
        vec![FileIssue::NoMatch { expr: "gone.txt".into() }, FileIssue::NoMatch { expr: "*.zip".into() }]
    );
}

#[test]
fn hidden_files_need_an_explicit_dot() {
    let td = tempfile::tempdir().unwrap();
    touch(td.path(), &[".env.txt"]);

    assert!(expand("*.txt", td.path()).units.is_empty());
    assert_eq!(expand(".*.txt", td.path()).units.len(), 1);
}

#[test]
fn preflight_lists_every_problem_with_its_line() {
    let td = tempfile::tempdir().unwrap();
    touch(td.path(), &["data/a.txt"]);
    let manifest = td.path().join("manifest.csv");
    fs::write(
        &manifest,
        "x,,,,\nx,,,,\nx,,,,\nDS,,,,\nprimary,S01,,,data/a.txt\n,,,,data/b.txt\n,,,,d*/a.txt\n",
    )
    .unwrap();
    let m = Manifest::read(&manifest).unwrap();

    let issues = preflight(&m, td.path());

    assert_eq!(
        issues,
        vec![
            (6, FileIssue::NoMatch { expr: "data/b.txt".into() }),
            (7, FileIssue::WildcardInDirectory { expr: "d*/a.txt".into() }),
        ]
    );
}
