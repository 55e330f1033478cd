pub mod ai;
pub mod booking;
pub mod conversation_store;
pub mod extractor;
pub mod intent;
pub mod messaging;
pub mod orchestrator;
pub mod slots;
