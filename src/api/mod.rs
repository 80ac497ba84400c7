//! Pattern Editor WASM API
//!
//! # Module Structure
//!
//! - `helpers`: JsValue conversion and error mapping
//! - `session`: the editing session driven by the exported functions
//! - `core`: the `#[wasm_bindgen]` functions over the stored session

pub mod helpers;
pub mod session;
pub mod core;

pub use self::core::*;
pub use session::{EditorSession, Operation, OperationResult};
