pub mod discovery;
pub mod intent;
pub mod json_extract;
pub mod pipeline;
