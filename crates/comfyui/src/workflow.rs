//! API-format workflow graph for reference-guided image generation.
//!
//! Nodes are keyed by string ids; an input of the form `[node, index]`
//! wires in output `index` of another node.

use genqueue_core::GenerationParams;
use serde_json::{json, Value};

// Sampler settings.
pub const SAMPLER_STEPS: u32 = 15;
pub const SAMPLER_CFG: f64 = 2.5;
pub const SAMPLER_NAME: &str = "dpmpp_3m_sde_gpu";
pub const SAMPLER_SCHEDULER: &str = "exponential";

// Reference-image adapter settings.
pub const IPADAPTER_PRESET: &str = "PLUS (high strength)";
pub const IPADAPTER_WEIGHT_TYPE: &str = "style transfer";
pub const PAG_SCALE: u32 = 3;

const CHECKPOINT: &str = "1";
const POSITIVE: &str = "2";
const NEGATIVE: &str = "3";
const LATENT: &str = "4";
const REFERENCE: &str = "5";
const IPADAPTER_LOADER: &str = "6";
const IPADAPTER: &str = "7";
const PAG: &str = "8";
const AUTO_CFG: &str = "9";
const SAMPLER: &str = "10";
const DECODE: &str = "11";
/// Id of the SaveImage node, whose outputs hold the result filenames.
pub const SAVE_NODE: &str = "12";

/// Build the workflow for `params`.
///
/// * `checkpoint` - checkpoint file resolved from the model selector.
/// * `seed` - sampler seed.
/// * `filename_prefix` - prefix for the saved image, relative to
///   ComfyUI's output directory.
pub fn build_workflow(
    params: &GenerationParams,
    checkpoint: &str,
    seed: u64,
    filename_prefix: &str,
) -> Value {
    json!({
        CHECKPOINT: {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": checkpoint },
        },
        POSITIVE: {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": params.positive_prompt, "clip": [CHECKPOINT, 1] },
        },
        NEGATIVE: {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": params.negative_prompt, "clip": [CHECKPOINT, 1] },
        },
        LATENT: {
            "class_type": "EmptyLatentImage",
            "inputs": { "width": params.width, "height": params.height, "batch_size": 1 },
        },
        REFERENCE: {
            "class_type": "LoadImageFromPath",
            "inputs": { "image": params.reference_image_path.to_string_lossy() },
        },
        IPADAPTER_LOADER: {
            "class_type": "IPAdapterUnifiedLoader",
            "inputs": { "preset": IPADAPTER_PRESET, "model": [CHECKPOINT, 0] },
        },
        IPADAPTER: {
            "class_type": "IPAdapterAdvanced",
            "inputs": {
                "weight": params.reference_weight,
                "weight_type": IPADAPTER_WEIGHT_TYPE,
                "combine_embeds": "concat",
                "start_at": 0,
                "end_at": 1,
                "embeds_scaling": "V only",
                "model": [IPADAPTER_LOADER, 0],
                "ipadapter": [IPADAPTER_LOADER, 1],
                "image": [REFERENCE, 0],
            },
        },
        PAG: {
            "class_type": "PerturbedAttentionGuidance",
            "inputs": { "scale": PAG_SCALE, "model": [IPADAPTER, 0] },
        },
        AUTO_CFG: {
            "class_type": "Automatic CFG",
            "inputs": { "hard_mode": true, "boost": true, "model": [PAG, 0] },
        },
        SAMPLER: {
            "class_type": "KSampler",
            "inputs": {
                "seed": seed,
                "steps": SAMPLER_STEPS,
                "cfg": SAMPLER_CFG,
                "sampler_name": SAMPLER_NAME,
                "scheduler": SAMPLER_SCHEDULER,
                "denoise": 1,
                "model": [AUTO_CFG, 0],
                "positive": [POSITIVE, 0],
                "negative": [NEGATIVE, 0],
                "latent_image": [LATENT, 0],
            },
        },
        DECODE: {
            "class_type": "VAEDecode",
            "inputs": { "samples": [SAMPLER, 0], "vae": [CHECKPOINT, 2] },
        },
        SAVE_NODE: {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": filename_prefix, "images": [DECODE, 0] },
        },
    })
}

/// Unique output prefix for one generation, e.g. `ComfyUI_anime_1a2b3c4d`.
pub fn output_prefix(model_style: &str) -> String {
    format!("ComfyUI_{model_style}_{:08x}", rand::random::<u32>())
}

/// A seed in ComfyUI's accepted 32-bit range.
pub fn random_seed() -> u64 {
    u64::from(rand::random::<u32>())
}
