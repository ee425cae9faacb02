pub mod article;
pub mod information;
pub mod information_table;
pub mod knowledge_base;
