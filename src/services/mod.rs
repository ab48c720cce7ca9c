pub mod ai_service;
pub mod document_service;
pub mod embed_service;
pub mod parser_service;
pub mod pipeline_service;
pub mod quiz_store;
pub mod repair_service;
pub mod similarity_service;
