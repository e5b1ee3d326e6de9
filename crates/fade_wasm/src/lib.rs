//! WebAssembly bridge for the FADE engine.
//!
//! Requests and responses cross the boundary as plain JS objects with the
//! camelCase field names of [`fade_core::SolveRequest`].

mod runner;

pub use runner::WasmEngine;

use fade_core::engine::SolveContext;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

/// Solves one request on a fresh context and returns the response object.
#[wasm_bindgen]
pub fn solve(request: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let ctx = SolveContext::new(runner::default_config());
    let response = runner::respond(runner::decode_request(request), &ctx);
    to_value(&response).map_err(|e| JsValue::from_str(&format!("Failed to encode response: {}", e)))
}
