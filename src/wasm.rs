use js_sys::{Array, Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;

use crate::codec::OutputFormat;
use crate::range::{ClusterRange, CLUSTER_CEILING};
use crate::style_bytes;
use crate::styler::Styler;

/// Stylize an encoded image for every cluster count in
/// `cluster_min..=cluster_max`.
///
/// The range goes through the same normalization as the upload form. The
/// result is an array of `{ clusters, image, palette }` objects in ascending
/// cluster order, where `image` is a PNG `Uint8Array` and `palette` holds
/// `RRGGBB` strings.
#[wasm_bindgen]
pub fn style_variants(
    input: Vec<u8>,
    cluster_min: i32,
    cluster_max: i32,
    seed: Option<u32>,
) -> Result<Array, JsValue> {
    let range = ClusterRange::normalize(cluster_min as i64, cluster_max as i64, CLUSTER_CEILING)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let mut styler = Styler::new();
    if let Some(seed) = seed {
        styler = styler.with_seed(seed as u64);
    }

    let variants = style_bytes(&input, range, &styler, OutputFormat::Png)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let result = Array::new();
    for variant in variants {
        let palette_js = Array::new();
        for hex in &variant.palette {
            palette_js.push(&JsValue::from_str(hex));
        }

        let entry = Object::new();
        Reflect::set(
            &entry,
            &JsValue::from_str("clusters"),
            &JsValue::from_f64(variant.clusters as f64),
        )?;
        Reflect::set(
            &entry,
            &JsValue::from_str("image"),
            &Uint8Array::from(variant.bytes.as_slice()),
        )?;
        Reflect::set(&entry, &JsValue::from_str("palette"), &palette_js)?;
        result.push(&entry);
    }

    Ok(result)
}
