#[allow(dead_code)]
#[path = "../../src/test_support.rs"]
mod fixtures;

pub(crate) use fixtures::text_pdf;
