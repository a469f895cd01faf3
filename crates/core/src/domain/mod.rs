pub mod chat;
pub mod document;
pub mod order;
pub mod product;
