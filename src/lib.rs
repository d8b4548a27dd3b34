pub mod api;
pub mod auth;
pub mod chat;
pub mod chunking;
pub mod config;
pub mod db;
pub mod document;
pub mod indexer;
pub mod openai;
pub mod providers;
pub mod retriever;
pub mod storage;
pub mod title;
pub mod vector_store;
