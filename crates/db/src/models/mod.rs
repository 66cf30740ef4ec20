pub mod approval;
pub mod chat_message;
pub mod product;
pub mod revision;
pub mod tech_pack;
