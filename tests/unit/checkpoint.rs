use super::*;

fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "discoart_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::write(&path, bytes).unwrap();
    path
}

const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

#[test]
fn hashes_known_vector() {
    assert_eq!(sha256_hex(b"abc"), ABC_SHA256);
}

#[test]
fn file_digest_matches_in_memory_digest() {
    let path = temp_file("ckpt_digest", b"abc");
    assert_eq!(file_sha256(&path).unwrap(), ABC_SHA256);
    assert_eq!(
        verify_file(&path, &ABC_SHA256.to_uppercase()).unwrap(),
        Verification::Match
    );
    match verify_file(&path, DIFFUSION_512_SHA256).unwrap() {
        Verification::Mismatch { actual } => assert_eq!(actual, ABC_SHA256),
        Verification::Match => panic!("digest should not match"),
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = file_sha256("/definitely/not/here.pt").unwrap_err();
    assert!(err.to_string().starts_with("io error:"));
}
