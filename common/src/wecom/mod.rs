// WeCom (enterprise WeChat) application API

pub mod client;
pub mod token;

pub use client::WeComClient;
pub use token::AccessToken;
