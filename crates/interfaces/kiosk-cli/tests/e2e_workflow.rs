use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::{body::Body, routing::get, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use camino::Utf8PathBuf;
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use const_oid::db::{rfc5911, rfc5912};
use der::asn1::{Any, BitString, OctetString, SetOfVec};
use der::Encode;
use kiosk_cli::commands;
use kiosk_cli::repos::{NewRepo, RepoManager};
use kiosk_persistence::{FileIndexStore, IndexStore, StatePaths};
use sha2::{Digest, Sha256};
use tempfile::tempdir;
use x509_cert::certificate::{Certificate, TbsCertificate, Version};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::Validity;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn test_certificate() -> Certificate {
    let signature_alg = AlgorithmIdentifierOwned {
        oid: rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
        parameters: None,
    };
    let name = Name::from_str("CN=E2E Index Signer").unwrap();
    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[1]).unwrap(),
        signature: signature_alg.clone(),
        issuer: name.clone(),
        validity: Validity::from_now(std::time::Duration::from_secs(3600)).unwrap(),
        subject: name,
        subject_public_key_info: SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: rfc5912::RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            subject_public_key: BitString::from_bytes(&[0xAB; 300]).unwrap(),
        },
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    Certificate {
        tbs_certificate: tbs,
        signature_algorithm: signature_alg,
        signature: BitString::from_bytes(&[0x47; 64]).unwrap(),
    }
}

fn signature_block() -> Vec<u8> {
    let digest_alg = AlgorithmIdentifierOwned {
        oid: rfc5912::ID_SHA_256,
        parameters: None,
    };
    let signer = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: Name::from_str("CN=E2E Index Signer").unwrap(),
            serial_number: SerialNumber::new(&[1]).unwrap(),
        }),
        digest_alg: digest_alg.clone(),
        signed_attrs: None,
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: None,
        },
        signature: OctetString::new(vec![0x51; 64]).unwrap(),
        unsigned_attrs: None,
    };
    let signed = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![digest_alg]).unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: rfc5911::ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(
            SetOfVec::try_from(vec![CertificateChoices::Certificate(test_certificate())]).unwrap(),
        )),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer]).unwrap()),
    };
    let content = ContentInfo {
        content_type: rfc5911::ID_SIGNED_DATA,
        content: Any::encode_from(&signed).unwrap(),
    };
    content.to_der().unwrap()
}

fn build_entry_jar(entry_json: &[u8]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let manifest = format!(
        "Manifest-Version: 1.0\r\n\r\nName: entry.json\r\nSHA-256-Digest: {}\r\n\r\n",
        BASE64.encode(Sha256::digest(entry_json))
    );
    writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
    writer.write_all(manifest.as_bytes()).unwrap();

    writer.start_file("META-INF/CERT.RSA", options).unwrap();
    writer.write_all(&signature_block()).unwrap();

    writer.start_file("entry.json", options).unwrap();
    writer.write_all(entry_json).unwrap();

    writer.finish().unwrap().into_inner()
}

fn remote_index(address: &str) -> Vec<u8> {
    format!(
        r#"{{
            "repo": {{
                "name": {{"en-US": "E2E Repo"}},
                "address": "{address}",
                "timestamp": 1000
            }},
            "packages": {{
                "org.example.app": {{
                    "metadata": {{
                        "name": {{"en-US": "Example App"}},
                        "summary": {{"en-US": "Does example things"}}
                    }},
                    "versions": {{
                        "aabb": {{
                            "added": 1,
                            "file": {{"name": "/app.apk", "sha256": "aabb", "size": 10}},
                            "manifest": {{"versionName": "1.0", "versionCode": 1}}
                        }}
                    }}
                }}
            }}
        }}"#
    )
    .into_bytes()
}

fn local_index(address: &str) -> Vec<u8> {
    format!(
        r#"{{
            "repo": {{
                "name": {{"en-US": "E2E Repo"}},
                "address": "{address}",
                "timestamp": 9000
            }},
            "packages": {{
                "org.example.app": {{
                    "metadata": {{"name": {{"en-US": "Example App"}}}},
                    "versions": {{
                        "ccdd": {{
                            "added": 2,
                            "file": {{"name": "/app-2.apk", "sha256": "ccdd", "size": 20}},
                            "manifest": {{"versionName": "1.1", "versionCode": 2}}
                        }}
                    }}
                }},
                "org.example.extra": {{
                    "metadata": {{
                        "name": {{"en-US": "Extra App"}},
                        "summary": {{"en-US": "An extra tool"}}
                    }},
                    "versions": {{
                        "eeff": {{
                            "added": 3,
                            "file": {{"name": "/extra.apk", "sha256": "eeff", "size": 30}},
                            "manifest": {{"versionName": "0.3", "versionCode": 3}}
                        }}
                    }}
                }}
            }}
        }}"#
    )
    .into_bytes()
}

fn entry_json(index_bytes: &[u8]) -> Vec<u8> {
    format!(
        r#"{{
            "timestamp": 1000,
            "version": 20002,
            "index": {{
                "name": "/index-v2.json",
                "sha256": "{}",
                "size": {},
                "numPackages": 1
            }},
            "diffs": {{}}
        }}"#,
        hex::encode(Sha256::digest(index_bytes)),
        index_bytes.len()
    )
    .into_bytes()
}

async fn start_mock_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let address = format!("http://{addr}/fdroid/repo");
    let index = Arc::new(remote_index(&address));
    let entry_jar = Arc::new(build_entry_jar(&entry_json(&index)));

    let app = Router::new()
        .route(
            "/fdroid/repo/entry.jar",
            get({
                let entry_jar = entry_jar.clone();
                move || async move { Body::from(entry_jar.as_ref().clone()) }
            }),
        )
        .route(
            "/fdroid/repo/index-v2.json",
            get({
                let index = index.clone();
                move || async move { Body::from(index.as_ref().clone()) }
            }),
        );

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, handle)
}

#[tokio::test]
async fn full_user_lifecycle_workflow() {
    let (addr, server_handle) = start_mock_server().await;
    let address = format!("http://{addr}/fdroid/repo");

    let work_dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap();
    let paths = StatePaths::rooted(root.join("data"), root.join("cache"));

    // Phase 1: configure the repo, no fingerprint given
    let mgr = RepoManager::new(paths.clone());
    let repo = mgr
        .add(NewRepo {
            address: address.clone(),
            name: Some("E2E".to_string()),
            fingerprint: None,
            username: None,
            password: None,
            mirrors: vec![format!("http://{addr}/mirror")],
            supports_diff: true,
        })
        .expect("Phase 1 add failed");
    assert_eq!(repo.id, 1);
    assert!(repo.fingerprint.is_none());

    // Phase 2: first sync downloads, verifies and pins
    let outcomes = commands::cmd_sync(paths.clone(), vec![])
        .await
        .expect("Phase 2 sync failed");
    assert_eq!(outcomes.len(), 1);
    let report = outcomes[0].1.as_ref().expect("Phase 2 repo sync failed");
    assert!(report.updated);
    assert_eq!(report.packages, 1);

    let repo = mgr.find(1).unwrap();
    assert!(repo.fingerprint.is_some(), "First sync must pin the signer");
    assert_eq!(repo.version_info.timestamp, 1000);
    assert!(
        paths.index_file(1).exists(),
        "Merged index must be persisted"
    );

    // Phase 3: warm sync is a no-op
    let outcomes = commands::cmd_sync(paths.clone(), vec![])
        .await
        .expect("Phase 3 sync failed");
    let report = outcomes[0].1.as_ref().expect("Phase 3 repo sync failed");
    assert!(!report.updated, "Same timestamp should change nothing");

    // Phase 4: the stored index answers queries offline
    let rows = commands::query_apps(paths.clone(), None, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].package, "org.example.app");
    assert_eq!(rows[0].name, "Example App");
    assert_eq!(rows[0].version, "1.0");
    assert_eq!(rows[0].size, Some(10));

    // Phase 5: a local file refreshes the index without the network
    let import_file = root.join("local-index.json");
    std::fs::write(import_file.as_std_path(), local_index(&address)).unwrap();
    let report = commands::cmd_import(paths.clone(), 1, &import_file)
        .await
        .expect("Phase 5 import failed");
    assert_eq!(report.packages, 2);
    assert_eq!(mgr.find(1).unwrap().version_info.timestamp, 9000);

    let rows = commands::query_apps(paths.clone(), Some(1), Some("extra")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].package, "org.example.extra");
    assert_eq!(rows[0].version, "0.3");

    // Phase 6: a disabled repo is skipped by the default selection
    mgr.set_enabled(1, false).unwrap();
    let outcomes = commands::cmd_sync(paths.clone(), vec![])
        .await
        .expect("Phase 6 sync failed");
    assert!(outcomes.is_empty(), "Disabled repos must not be selected");

    // Phase 7: removal drops the record and the stored index
    mgr.remove(1).expect("Phase 7 remove failed");
    assert!(mgr.list().unwrap().is_empty());
    let index_store = FileIndexStore::new(paths.clone());
    assert!(index_store.load(1).unwrap().is_none());

    server_handle.abort();
}

fn new_repo(address: &str, fingerprint: &str) -> NewRepo {
    NewRepo {
        address: address.to_string(),
        name: None,
        fingerprint: Some(fingerprint.to_string()),
        username: None,
        password: None,
        mirrors: Vec::new(),
        supports_diff: true,
    }
}

#[test]
fn pasted_fingerprint_forms_are_accepted() {
    let dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let paths = StatePaths::rooted(root.join("data"), root.join("cache"));
    let mgr = RepoManager::new(paths);

    // Digest broken into colon-separated pairs, as shown in QR dialogs.
    let coloned = (0..32).map(|_| "ab").collect::<Vec<_>>().join(":");
    let repo = mgr
        .add(new_repo("https://one.example.org/fdroid/repo", &coloned))
        .unwrap();
    assert_eq!(repo.fingerprint.unwrap().as_str(), "AB".repeat(32));

    // A whole signing key pasted as hex hashes down to its digest.
    let key_hex = "cd".repeat(300);
    let expected = hex::encode_upper(Sha256::digest([0xcd; 300]));
    let repo = mgr
        .add(new_repo("https://two.example.org/fdroid/repo", &key_hex))
        .unwrap();
    assert_eq!(repo.fingerprint.unwrap().as_str(), expected);

    let err = mgr
        .add(new_repo("https://three.example.org/fdroid/repo", "not hex"))
        .unwrap_err();
    assert!(err.to_string().contains("Invalid fingerprint"));
}
