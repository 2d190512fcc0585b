use super::*;
use crate::config::prompt::parse_prompt;
use crate::models::reference::PatchEmbedder;

fn ensemble() -> Vec<Arc<dyn EmbeddingModel>> {
    vec![
        Arc::new(PatchEmbedder::new("ViTB32", 8, 2, 6, &Device::Cpu).unwrap()),
        Arc::new(PatchEmbedder::new("RN50", 16, 4, 10, &Device::Cpu).unwrap()),
    ]
}

fn prompts(raw: &[&str]) -> Vec<WeightedPrompt> {
    raw.iter().map(|p| parse_prompt(p).unwrap()).collect()
}

#[test]
fn builds_one_state_per_enabled_model_in_order() {
    let ctx = GuidanceContext::build(
        &ensemble(),
        &["RN50".to_owned(), "ViTB32".to_owned()],
        &prompts(&["sunset:2", "sea:2"]),
        &Device::Cpu,
    )
    .unwrap();
    let ids: Vec<&str> = ctx.states().iter().map(|s| s.model().id()).collect();
    assert_eq!(ids, vec!["RN50", "ViTB32"]);
    assert_eq!(ctx.states()[0].target_embeds().dims(), &[2, 10]);
    assert_eq!(ctx.states()[1].target_embeds().dims(), &[2, 6]);
    let w: Vec<f32> = ctx.states()[0].weights().to_vec1().unwrap();
    assert_eq!(w, vec![0.5, 0.5]);
}

#[test]
fn unknown_model_id_is_a_config_error() {
    let err = GuidanceContext::build(
        &ensemble(),
        &["ViTL14".to_owned()],
        &prompts(&["sunset"]),
        &Device::Cpu,
    )
    .unwrap_err();
    assert!(err.to_string().starts_with("config error:"));
    assert!(err.to_string().contains("ViTL14"));
}

#[test]
fn weights_summing_to_zero_are_rejected() {
    let err = GuidanceContext::build(
        &ensemble(),
        &["ViTB32".to_owned()],
        &prompts(&["a:1", "b:-1"]),
        &Device::Cpu,
    );
    assert!(err.is_err());
}

#[test]
fn negative_sum_keeps_signs() {
    let ctx = GuidanceContext::build(
        &ensemble(),
        &["ViTB32".to_owned()],
        &prompts(&["a:-3", "b:1"]),
        &Device::Cpu,
    )
    .unwrap();
    let w: Vec<f32> = ctx.states()[0].weights().to_vec1().unwrap();
    assert_eq!(w, vec![-1.5, 0.5]);
}
