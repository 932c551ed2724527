use camino::Utf8PathBuf;
use kiosk_core::fingerprint::fingerprint_of;
use kiosk_core::formats::v2::{FileV2, IndexV2, ManifestV2, PackageV2, VersionV2};
use kiosk_core::repo::{Authentication, Repo};
use kiosk_persistence::{FileIndexStore, FileRepoStore, IndexStore, RepoStore, StatePaths};
use tempfile::tempdir;

fn temp_paths(dir: &tempfile::TempDir) -> StatePaths {
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    StatePaths::rooted(root.join("data"), root.join("cache"))
}

fn sample_repo(id: i64) -> Repo {
    let mut repo = Repo::new(id, format!("https://example.org/repo/{id}"));
    repo.name = format!("Repo {id}");
    repo.authentication = Some(Authentication {
        username: "user".to_string(),
        password: "secret".to_string(),
    });
    repo
}

fn sample_index() -> IndexV2 {
    let mut index = IndexV2::default();
    index.repo.address = "https://example.org/repo".to_string();
    index.repo.timestamp = 1_700_000_000_000;
    index.packages.insert(
        "org.example.app".to_string(),
        PackageV2 {
            metadata: Default::default(),
            versions: [(
                "aabb".to_string(),
                VersionV2 {
                    file: FileV2 {
                        name: "/app.apk".to_string(),
                        sha256: Some("aabb".to_string()),
                        size: Some(10),
                        ipfs_cid_v1: None,
                    },
                    manifest: ManifestV2 {
                        version_name: "1.0".to_string(),
                        version_code: 1,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )]
            .into(),
        },
    );
    index
}

#[test]
fn repo_list_round_trips() {
    let dir = tempdir().unwrap();
    let store = FileRepoStore::new(temp_paths(&dir));

    let mut first = sample_repo(1);
    let fp = fingerprint_of(&[3u8; 512]).unwrap();
    first.update(&fp, Some(1_700_000_000_000), Some("\"tag\"".to_string()));
    let second = sample_repo(2);

    store.save_all(&[first.clone(), second.clone()]).unwrap();
    let loaded = store.load_all().unwrap();
    assert_eq!(loaded, vec![first, second]);
}

#[test]
fn missing_repo_file_is_an_empty_list() {
    let dir = tempdir().unwrap();
    let store = FileRepoStore::new(temp_paths(&dir));
    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn unreadable_repo_list_is_an_error() {
    let dir = tempdir().unwrap();
    let paths = temp_paths(&dir);
    paths.ensure_dirs().unwrap();
    std::fs::write(paths.repos_file(), "{not json").unwrap();

    let store = FileRepoStore::new(paths);
    assert!(store.load_all().is_err());
}

#[test]
fn update_replaces_matching_record() {
    let dir = tempdir().unwrap();
    let store = FileRepoStore::new(temp_paths(&dir));
    store.save_all(&[sample_repo(1), sample_repo(2)]).unwrap();

    let mut changed = sample_repo(1);
    let fp = fingerprint_of(&[5u8; 512]).unwrap();
    changed.update(&fp, Some(42), None);
    store.update(&changed).unwrap();

    let loaded = store.load_all().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].version_info.timestamp, 42);
    assert_eq!(loaded[0].fingerprint, Some(fp));
    assert_eq!(loaded[1].version_info.timestamp, 0);
}

#[test]
fn update_appends_unknown_record() {
    let dir = tempdir().unwrap();
    let store = FileRepoStore::new(temp_paths(&dir));
    store.save_all(&[sample_repo(1)]).unwrap();

    store.update(&sample_repo(9)).unwrap();
    let loaded = store.load_all().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1].id, 9);
}

#[test]
fn index_round_trips() {
    let dir = tempdir().unwrap();
    let store = FileIndexStore::new(temp_paths(&dir));
    let index = sample_index();

    store.save(3, &index).unwrap();
    assert_eq!(store.load(3).unwrap(), Some(index));
    assert_eq!(store.load(4).unwrap(), None);
}

#[test]
fn corrupt_index_is_quarantined() {
    let dir = tempdir().unwrap();
    let paths = temp_paths(&dir);
    paths.ensure_dirs().unwrap();
    std::fs::write(paths.index_file(3), "][").unwrap();

    let store = FileIndexStore::new(paths.clone());
    assert_eq!(store.load(3).unwrap(), None);
    assert!(
        !paths.index_file(3).exists(),
        "quarantine must drop the unreadable file"
    );
}

#[test]
fn index_remove_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = FileIndexStore::new(temp_paths(&dir));
    store.save(3, &sample_index()).unwrap();

    store.remove(3).unwrap();
    store.remove(3).unwrap();
    assert_eq!(store.load(3).unwrap(), None);
}
