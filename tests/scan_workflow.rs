// tests/scan_workflow.rs

//! End-to-end scans over directories and nested archives

mod common;

use common::{rpm_package, sample_cpio};
use crypto_detector::compression::CompressionFormat;
use crypto_detector::packages::{ArchiveFormat, classify};
use crypto_detector::{MethodRegistry, OutputExisting, ScanConfig, Scanner};
use std::fs;
use std::path::Path;

fn config(output: &Path) -> ScanConfig {
    ScanConfig {
        output: output.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn test_archive_detection() {
    let dir = tempfile::tempdir().unwrap();
    let cpio = sample_cpio();
    let cases = [
        ("pkg.rpm", rpm_package(4, &common::gzip(&cpio)), ArchiveFormat::Rpm),
        (
            "src.tar.bz2",
            common::bzip2(&common::tar(&[("a.c", &b"int main;"[..])])),
            ArchiveFormat::Tar(CompressionFormat::Bzip2),
        ),
        (
            "src.tar.xz",
            common::xz(&common::tar(&[("a.c", &b"int main;"[..])])),
            ArchiveFormat::Tar(CompressionFormat::Xz),
        ),
        ("notes.lzma", common::lzma(b"plain text, long enough"), ArchiveFormat::Lzma),
        ("notes.gz", common::gzip(b"plain text, long enough"), ArchiveFormat::Gzip),
        ("tiny.gz", common::gzip(b"abc"), ArchiveFormat::None),
        ("source.c", b"#include <openssl/evp.h>\n".to_vec(), ArchiveFormat::None),
    ];

    for (name, bytes, expected) in cases {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        assert_eq!(classify(&path).unwrap(), expected, "{}", name);
    }
}

#[test]
fn test_scan_rpm_inside_tarball() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let rpm = rpm_package(4, &common::xz(&sample_cpio()));
    let tarball = common::gzip(&common::tar(&[
        ("bundle/libcrypt.rpm", &rpm[..]),
        (
            "bundle/aes.c",
            &b"#include <openssl/aes.h>\nAES_encrypt(in, out, &key);\n"[..],
        ),
    ]));
    let archive = dir.path().join("bundle.tar.gz");
    fs::write(&archive, tarball).unwrap();

    let registry = MethodRegistry::builtin().unwrap();
    let scanner = Scanner::new(config(out.path()), &registry)
        .unwrap()
        .with_scratch_dir(scratch.path());
    let summary = scanner
        .scan(&[archive.to_string_lossy().into_owned()])
        .unwrap();

    assert_eq!(summary.package_count, 1);
    let report = &summary.reports[0];
    assert_eq!(report.package_name, "bundle.tar.gz");

    let archive_display = std::path::absolute(&archive).unwrap();
    let readme = format!(
        "{}/bundle/libcrypt.rpm/usr/share/doc/libcrypt/README",
        archive_display.display()
    );
    let source = format!("{}/bundle/aes.c", archive_display.display());

    let readme_report = report.files.get(&readme).expect("README inside the rpm");
    assert!(readme_report
        .matches
        .iter()
        .any(|m| m.matched_text == "bcrypt" && m.evidence_type == "algorithm/key-derivation"));

    let source_report = report.files.get(&source).expect("aes.c in the tarball");
    assert_eq!(source_report.language, "c");
    let methods: Vec<&str> = source_report
        .matches
        .iter()
        .map(|m| m.detection_method.as_str())
        .collect();
    assert!(methods.contains(&"keyword"));
    assert!(methods.contains(&"api"));

    // Plain-text script: source-only keywords do not apply
    assert!(!report.files.keys().any(|k| k.ends_with("usr/bin/mkpasswd")));
    // Four regular files from the rpm (symlink skipped) plus aes.c
    assert_eq!(report.stats.file_count, 5);

    // Report written, scratch space gone
    let written = out.path().join("bundle.tar.gz.crypto");
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(written).unwrap()).unwrap();
    assert_eq!(json["package_name"], "bundle.tar.gz");
    assert_eq!(json["files"][source.as_str()]["language"], "c");
    assert_eq!(json["scan_settings"]["methods"], serde_json::json!(["keyword", "api"]));
    assert_eq!(json["scan_settings"]["quick"], false);
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_corrupt_nested_rpm_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let pkg = dir.path().join("project");
    fs::create_dir(&pkg).unwrap();

    // Headers intact, payload cut right after the gzip header
    let headers = rpm_package(4, &[]).len();
    let mut rpm = rpm_package(4, &common::gzip(&sample_cpio()));
    rpm.truncate(headers + 10);
    fs::write(pkg.join("broken.rpm"), rpm).unwrap();
    fs::write(pkg.join("hash.py"), b"import hashlib\nhashlib.sha256(data)\n").unwrap();

    let registry = MethodRegistry::builtin().unwrap();
    let scanner = Scanner::new(config(out.path()), &registry).unwrap().without_output();
    let summary = scanner
        .scan(&[pkg.to_string_lossy().into_owned()])
        .unwrap();

    let report = &summary.reports[0];
    assert!(report.files.keys().any(|k| k.ends_with("project/hash.py")));
    assert!(!report.files.keys().any(|k| k.contains("broken.rpm/")));
}

#[test]
fn test_skip_existing_and_quick_mode() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let pkg = dir.path().join("zlib");
    fs::create_dir(&pkg).unwrap();
    fs::write(pkg.join("crc.c"), b"uint32_t crc32(void);\n").unwrap();
    let other = dir.path().join("gnupg");
    fs::create_dir(&other).unwrap();
    fs::write(other.join("cipher.c"), b"/* Blowfish */\n").unwrap();

    let registry = MethodRegistry::builtin().unwrap();
    let packages = vec![
        pkg.to_string_lossy().into_owned(),
        other.to_string_lossy().into_owned(),
    ];

    let quick = ScanConfig {
        quick: true,
        ..config(out.path())
    };
    let summary = Scanner::new(quick, &registry).unwrap().scan(&packages).unwrap();
    assert_eq!(
        summary.quick_results,
        vec![("zlib".to_string(), false), ("gnupg".to_string(), true)]
    );
    let text = fs::read_to_string(out.path().join("quick-scan-result.txt")).unwrap();
    assert!(text.contains("    gnupg\n"));
    assert!(!text.contains("zlib"));

    fs::write(out.path().join("gnupg.crypto"), b"{}").unwrap();
    let skip = ScanConfig {
        output_existing: OutputExisting::Skip,
        ..config(out.path())
    };
    let summary = Scanner::new(skip, &registry).unwrap().scan(&packages).unwrap();
    assert_eq!(summary.package_count, 1);
    assert_eq!(summary.reports[0].package_name, "zlib");
    assert_eq!(fs::read(out.path().join("gnupg.crypto")).unwrap(), b"{}");
    assert!(out.path().join("zlib.crypto").is_file());
}
