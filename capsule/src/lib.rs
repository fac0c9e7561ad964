pub mod board;
pub mod clock;
pub mod comments;
pub mod config;
pub mod draft;
pub mod engagement;
pub mod engine;
pub mod ledger;
pub mod lock;
pub mod model;
pub mod notice;
pub mod pager;
pub mod store;
pub mod timeline;
