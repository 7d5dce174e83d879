use std::path::PathBuf;

use super::*;

fn all_archive_types() -> [ArchiveType; 5] {
    [
        ArchiveType::Deb,
        ArchiveType::TarGz,
        ArchiveType::TarXz,
        ArchiveType::TarZst,
        ArchiveType::Zip,
    ]
}

fn classified(err: &anyhow::Error) -> &ProvisionError {
    ProvisionError::find_in(err).expect("error should carry a ProvisionError")
}

#[test]
fn default_config_matches_pinned_cluebotng_release() {
    let config = ProvisionConfig::default();
    config.validate().expect("defaults must validate");

    let version = config.version().expect("default version parses");
    assert_eq!(version.release.to_string(), "1.0.3");
    assert_eq!(version.patch, "3");
    assert_eq!(
        config.archive_url().expect("url renders"),
        "https://launchpad.net/~damianzaremba/+archive/ubuntu/cluebotng-core/+files/cluebotng-core_1.0.3-3_amd64.deb"
    );
    assert_eq!(
        config.archive_path().expect("path renders"),
        PathBuf::from("/tmp/cluebotng-core-1.0.3-3.amd64.deb")
    );
    assert_eq!(config.archive_type().expect("type infers"), ArchiveType::Deb);
    assert_eq!(
        config.layout.executables,
        vec!["cluebotng", "create_ann", "create_bayes_db", "print_bayes_db"]
    );
    assert_eq!(
        config.databases.pairs,
        vec![
            DatabasePair::new("bayes.db", "main_bayes_train.dat"),
            DatabasePair::new("two_bayes.db", "two_bayes_train.dat"),
        ]
    );
    assert_eq!(config.databases.rebuild, RebuildPolicy::Always);
}

#[test]
fn empty_toml_yields_defaults() {
    let parsed = ProvisionConfig::from_toml_str("").expect("empty config should parse");
    assert_eq!(parsed, ProvisionConfig::default());
}

#[test]
fn parse_full_config() {
    let content = r#"
[package]
name = "cluebotng-core"
release = "1.0.4"
patch = "1"
url_template = "https://mirror.example.test/pool/cluebotng-core_{release}-{patch}_amd64.deb"
sha256 = "ABCDEF0123456789abcdef0123456789abcdef0123456789abcdef0123456789"

[paths]
archive = "/var/tmp/cbng-{release}.deb"
staging = "/var/tmp/staging"
workspace = "/srv/bot"

[layout]
executables = ["cluebotng", "create_bayes_db"]
marker_dir = "cbng_core_installed"
marker_file = ".marker"

[databases]
rebuild = "when-source-changed"

[[databases.pairs]]
target = "bayes.db"
source = "main_bayes_train.dat"
"#;

    let parsed = ProvisionConfig::from_toml_str(content).expect("config should parse");
    assert_eq!(
        parsed.archive_url().expect("url"),
        "https://mirror.example.test/pool/cluebotng-core_1.0.4-1_amd64.deb"
    );
    assert_eq!(
        parsed.archive_path().expect("path"),
        PathBuf::from("/var/tmp/cbng-1.0.4.deb")
    );
    assert_eq!(parsed.paths.workspace, PathBuf::from("/srv/bot"));
    assert_eq!(parsed.layout.primary_binary, "cluebotng");
    assert_eq!(parsed.layout.payload_root, "opt/cbng-core");
    assert_eq!(parsed.layout.marker_file, ".marker");
    assert_eq!(parsed.databases.builder, "create_bayes_db");
    assert_eq!(parsed.databases.pairs.len(), 1);
    assert_eq!(parsed.databases.rebuild, RebuildPolicy::WhenSourceChanged);
}

#[test]
fn reject_non_semver_release() {
    let err = ProvisionConfig::from_toml_str("[package]\nrelease = \"one\"\n")
        .expect_err("release must be semver");
    assert_eq!(classified(&err).kind(), "config");
    assert!(err.to_string().contains("invalid configuration"));
}

#[test]
fn reject_patch_with_path_separator() {
    let err = PinnedVersion::new("1.0.3", "3/../../etc").expect_err("patch must be a token");
    assert!(err.to_string().contains("invalid character '/'"));
    assert!(PinnedVersion::new("1.0.3", "   ").is_err());
    assert!(PinnedVersion::new("1.0.3", "3ubuntu1~22.04").is_ok());
}

#[test]
fn reject_short_sha256() {
    let err = ProvisionConfig::from_toml_str("[package]\nsha256 = \"abc\"\n")
        .expect_err("short digest must fail");
    assert!(err.to_string().contains("64 hex characters"));
}

#[test]
fn reject_signature_without_public_key() {
    let err = ProvisionConfig::from_toml_str("[package]\nsignature = \"00\"\n")
        .expect_err("signature alone must fail");
    assert!(err.to_string().contains("requires package.public_key"));
}

#[test]
fn reject_staging_equal_to_workspace() {
    let err = ProvisionConfig::from_toml_str(
        "[paths]\nstaging = \"/workspace\"\nworkspace = \"/workspace\"\n",
    )
    .expect_err("staging must differ");
    assert!(err.to_string().contains("must differ"));
}

#[test]
fn reject_payload_root_escaping_staging() {
    let err = ProvisionConfig::from_toml_str("[layout]\npayload_root = \"../opt\"\n")
        .expect_err("parent traversal must fail");
    assert!(err.to_string().contains("layout.payload_root"));
}

#[test]
fn reject_executable_with_slash_and_duplicates() {
    let err = ProvisionConfig::from_toml_str("[layout]\nexecutables = [\"bin/cluebotng\"]\n")
        .expect_err("nested executable must fail");
    assert!(err.to_string().contains("single path component"));

    let err = ProvisionConfig::from_toml_str(
        "[layout]\nexecutables = [\"cluebotng\", \"cluebotng\"]\n",
    )
    .expect_err("duplicate executable must fail");
    assert!(err.to_string().contains("duplicate executable"));
}

#[test]
fn reject_duplicate_database_targets() {
    let content = r#"
[[databases.pairs]]
target = "bayes.db"
source = "a.dat"

[[databases.pairs]]
target = "bayes.db"
source = "b.dat"
"#;
    let err = ProvisionConfig::from_toml_str(content).expect_err("duplicate targets must fail");
    assert!(err.to_string().contains("duplicate database target"));
}

#[test]
fn reject_unknown_rebuild_policy() {
    let err = ProvisionConfig::from_toml_str("[databases]\nrebuild = \"sometimes\"\n")
        .expect_err("unknown policy must fail");
    assert!(err.to_string().contains("failed to parse provision config"));
}

#[test]
fn explicit_archive_type_overrides_url_inference() {
    let content = r#"
[package]
url_template = "https://example.test/download?id={release}"
archive = "tar.xz"
"#;
    let parsed = ProvisionConfig::from_toml_str(content).expect("config should parse");
    assert_eq!(parsed.archive_type().expect("type"), ArchiveType::TarXz);
}

#[test]
fn uninferable_url_without_archive_type_is_rejected() {
    let content = "[package]\nurl_template = \"https://example.test/download?id={release}\"\n";
    let err = ProvisionConfig::from_toml_str(content).expect_err("must require archive type");
    assert!(err.to_string().contains("set package.archive explicitly"));
}

#[test]
fn archive_type_parse_round_trips_display_tokens() {
    for archive_type in all_archive_types() {
        assert_eq!(ArchiveType::parse(archive_type.as_str()), Some(archive_type));
    }
    assert_eq!(ArchiveType::parse(" TGZ "), Some(ArchiveType::TarGz));
    assert_eq!(ArchiveType::parse("rpm"), None);
}

#[test]
fn archive_type_infers_from_url_ignoring_query_and_fragment() {
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/pkg_1.0_amd64.DEB?sig=1#x"),
        Some(ArchiveType::Deb)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/pkg.tgz"),
        Some(ArchiveType::TarGz)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/pkg.tar.zst"),
        Some(ArchiveType::TarZst)
    );
    assert_eq!(ArchiveType::infer_from_url("https://example.test/pkg"), None);
}

#[test]
fn pinned_version_display_and_render() {
    let version = PinnedVersion::new("1.0.3", "3").expect("valid version");
    assert_eq!(version.to_string(), "1.0.3-3");
    assert_eq!(
        version.render("cluebotng-core_{release}-{patch}_amd64.deb"),
        "cluebotng-core_1.0.3-3_amd64.deb"
    );
}

#[test]
fn spawn_failure_is_external_process_and_keeps_io_source() {
    let err: anyhow::Error = ProvisionError::CommandSpawn {
        context: "failed to build database 'bayes.db'".to_string(),
        program: "\"/workspace/create_bayes_db\"".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
    }
    .into();

    assert_eq!(classified(&err).kind(), "external-process");
    assert!(err.chain().any(|cause| cause
        .downcast_ref::<std::io::Error>()
        .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)));
    assert!(err.to_string().contains("command failed to start"));
}

#[test]
fn stale_workspace_names_both_versions() {
    let err = ProvisionError::StaleWorkspace {
        path: PathBuf::from("/workspace"),
        installed: "1.0.3-3".to_string(),
        requested: "1.0.4-1".to_string(),
    };
    assert_eq!(err.kind(), "inconsistent-state");
    let rendered = err.to_string();
    assert!(rendered.contains("1.0.3-3"));
    assert!(rendered.contains("1.0.4-1"));
}
