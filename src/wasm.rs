use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn compile_source_to_sb3(source: &str) -> Result<Vec<u8>, JsValue> {
    compile_source_to_sb3_with_options(source, true)
}

/// Sources compiled in the browser cannot reference costume files.
#[wasm_bindgen]
pub fn compile_source_to_sb3_with_options(source: &str, scale_svgs: bool) -> Result<Vec<u8>, JsValue> {
    crate::compile_source_to_sb3_bytes(source, None, scale_svgs).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Rendered diagnostics for a source, empty when it compiles cleanly.
#[wasm_bindgen]
pub fn check_source(source: &str) -> String {
    crate::compile_source(source, &crate::CompileOptions::default()).render_diagnostics(false)
}
