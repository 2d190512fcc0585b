use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(DiscoError::config("x").to_string().contains("config error:"));
    assert!(DiscoError::model("x").to_string().contains("model error:"));
    assert!(
        DiscoError::numerical("x")
            .to_string()
            .contains("numerical error:")
    );
    assert!(
        DiscoError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
    assert!(DiscoError::io("x").to_string().contains("io error:"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = DiscoError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn tensor_errors_convert() {
    let err: DiscoError = candle_core::Error::Msg("shape mismatch".to_owned()).into();
    assert!(matches!(err, DiscoError::Tensor(_)));
    assert!(err.to_string().contains("shape mismatch"));
}
