//! Long-lived engine handle for callers that issue many solves.

use anyhow::{anyhow, Context};
use fade_core::engine::{handle_request, EngineConfig, SolveContext, SolveRequest, SolveResponse};
use fade_core::error::ErrorKind;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Browsers cannot spawn rayon workers, so wasm builds run batches inline.
pub(crate) fn default_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.executor.sequential = cfg!(target_arch = "wasm32");
    config
}

pub(crate) fn decode_request(value: JsValue) -> anyhow::Result<SolveRequest> {
    from_value(value)
        .map_err(|e| anyhow!(e.to_string()))
        .context("Invalid solve request")
}

/// Turns a decoded (or undecodable) request into a response.
pub(crate) fn respond(request: anyhow::Result<SolveRequest>, ctx: &SolveContext) -> SolveResponse {
    match request {
        Ok(request) => handle_request(&request, ctx),
        Err(err) => {
            log::warn!("rejecting request: {:#}", err);
            SolveResponse::failure(ErrorKind::InvalidRequest, format!("{:#}", err))
        }
    }
}

#[wasm_bindgen]
pub struct WasmEngine {
    config: EngineConfig,
    solves: u32,
}

#[wasm_bindgen]
impl WasmEngine {
    /// `config` may be `undefined` or a partial `EngineConfig` object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmEngine, JsValue> {
        console_error_panic_hook::set_once();
        let config = if config.is_undefined() || config.is_null() {
            default_config()
        } else {
            from_value(config)
                .map_err(|e| JsValue::from_str(&format!("Invalid engine config: {}", e)))?
        };
        Ok(WasmEngine { config, solves: 0 })
    }

    pub fn solve(&mut self, request: JsValue) -> Result<JsValue, JsValue> {
        let ctx = SolveContext::new(self.config);
        let response = respond(decode_request(request), &ctx);
        self.solves += 1;
        to_value(&response)
            .map_err(|e| JsValue::from_str(&format!("Failed to encode response: {}", e)))
    }

    pub fn solves(&self) -> u32 {
        self.solves
    }
}
